//! The per-handle notification listener table
//!
//! Handle Value Notification (opcode `0x1B`) carries no request/response pairing of its own - it
//! arrives whenever the peer feels like sending it, dispatched here by handle rather than through
//! the transaction slot. Kept as a single mutex-guarded map, same as the source's
//! `NotificationMap` plus its lock: the contention here is trivial (a lookup and, rarely, an
//! insert) and the lock is never held across the listener callback.

use std::collections::HashMap;
use std::sync::Mutex;

type Listener = Box<dyn FnMut(&[u8]) + Send>;

/// Registered notification listeners, keyed by attribute handle
pub(crate) struct NotificationTable {
    listeners: Mutex<HashMap<u16, Listener>>,
}

impl NotificationTable {
    pub(crate) fn new() -> Self {
        NotificationTable { listeners: Mutex::new(HashMap::new()) }
    }

    /// Registers `listener` for `handle`, replacing any prior registration
    pub(crate) fn subscribe(&self, handle: u16, listener: Listener) {
        self.listeners.lock().expect("notification table poisoned").insert(handle, listener);
    }

    /// Dispatches `value` to the listener registered for `handle`
    ///
    /// Returns `false` (and invokes nothing) if no listener is registered - the caller surfaces
    /// that case on the engine's error channel. The listener is removed from the table before
    /// it's invoked and put back afterward, so the lock is never held across the callback - a
    /// listener that re-enters the table (e.g. subscribing from inside its own callback) neither
    /// deadlocks nor gets clobbered by the re-insert.
    pub(crate) fn dispatch(&self, handle: u16, value: &[u8]) -> bool {
        let mut listener = match self.listeners.lock().expect("notification table poisoned").remove(&handle) {
            Some(l) => l,
            None => return false,
        };

        listener(value);

        self.listeners
            .lock()
            .expect("notification table poisoned")
            .entry(handle)
            .or_insert(listener);

        true
    }

    /// Empties the table. Called once when the owning engine is dropped.
    pub(crate) fn clear(&self) {
        self.listeners.lock().expect("notification table poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn dispatch_invokes_registered_listener() {
        let table = NotificationTable::new();
        let (tx, rx) = mpsc::channel();

        table.subscribe(0x0025, Box::new(move |value: &[u8]| tx.send(value.to_vec()).unwrap()));

        assert!(table.dispatch(0x0025, &[0xDE, 0xAD, 0xBE, 0xEF]));
        assert_eq!(rx.recv().unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn dispatch_to_unregistered_handle_reports_false() {
        let table = NotificationTable::new();
        assert!(!table.dispatch(0x0099, &[0x01]));
    }

    #[test]
    fn subscribe_replaces_prior_registration() {
        let table = NotificationTable::new();
        let (tx, rx) = mpsc::channel();

        table.subscribe(0x0010, Box::new(|_: &[u8]| panic!("stale listener invoked")));

        let tx2 = tx.clone();
        table.subscribe(0x0010, Box::new(move |value: &[u8]| tx2.send(value.to_vec()).unwrap()));

        table.dispatch(0x0010, &[0x01]);
        assert_eq!(rx.recv().unwrap(), vec![0x01]);
    }

    #[test]
    fn listener_may_subscribe_a_new_handle_without_deadlocking() {
        use std::sync::Arc;

        let table = Arc::new(NotificationTable::new());
        let (tx, rx) = mpsc::channel();

        let inner = table.clone();
        table.subscribe(
            0x0001,
            Box::new(move |_: &[u8]| {
                // Re-enters the table from inside the callback - would deadlock if `dispatch`
                // still held the lock here.
                inner.subscribe(0x0002, Box::new(|_: &[u8]| {}));
                tx.send(()).unwrap();
            }),
        );

        assert!(table.dispatch(0x0001, &[0xFF]));
        rx.recv().unwrap();
        assert!(table.dispatch(0x0002, &[0xAA]));
    }
}
