//! The public client-side ATT engine
//!
//! `Engine` ties the transaction slot, the discovery procedures, and the notification table to
//! one transport and presents the callback-based surface an embedder drives: every method here
//! returns immediately, completion arrives on the supplied closure, rather than through an
//! `async fn` client.

use crate::codec;
use crate::discovery;
use crate::error::Error;
use crate::notify::NotificationTable;
use crate::transaction::{HandleOutcome, Payload, Slot};
use crate::uuid::Uuid;
use std::sync::{Arc, Mutex, Weak};

/// What `Engine` needs from whatever carries PDUs for it
///
/// Implemented by [`crate::link::Link`] for production use and by a hand-rolled in-memory double
/// in this crate's own tests (§4.8-style, no mocking crate).
pub trait Transport: Send + Sync {
    fn submit(&self, pdu: &[u8]) -> Result<(), Error>;
    fn mtu(&self) -> u16;
    /// Raises the negotiated MTU after a successful `exchange_mtu` handshake
    fn set_mtu(&self, mtu: u16);
    fn set_on_recv(&self, cb: Box<dyn FnMut(&[u8]) + Send>);
    fn set_on_error(&self, cb: Box<dyn Fn(&Error) + Send>);
    fn close(&self);
}

impl Transport for crate::link::Link {
    fn submit(&self, pdu: &[u8]) -> Result<(), Error> {
        crate::link::Link::submit(self, pdu)
    }

    fn mtu(&self) -> u16 {
        crate::link::Link::mtu(self)
    }

    fn set_mtu(&self, mtu: u16) {
        crate::link::Link::set_mtu(self, mtu)
    }

    fn set_on_recv(&self, cb: Box<dyn FnMut(&[u8]) + Send>) {
        crate::link::Link::set_on_recv(self, cb)
    }

    fn set_on_error(&self, cb: Box<dyn Fn(&Error) + Send>) {
        crate::link::Link::set_on_error(self, cb)
    }

    fn close(&self) {
        crate::link::Link::close(self)
    }
}

struct Inner<C: Transport> {
    channel: C,
    slot: Slot,
    notifications: NotificationTable,
    on_error: Mutex<Option<Box<dyn Fn(&Error) + Send>>>,
}

impl<C: Transport> Drop for Inner<C> {
    fn drop(&mut self) {
        self.channel.close();
        self.slot.abort();
        self.notifications.clear();
    }
}

/// Extracts `T` out of a completed [`Payload`], falling back to `T::default()` for errors (whose
/// message is carried separately) - every operation's `on_result` callback gets a value of its
/// expected type even on failure, so callers never have to special-case "no payload".
fn deliver<T, F>(result: Result<Payload, Error>, extract: F, on_result: impl FnOnce(u8, T, Option<String>))
where
    T: Default,
    F: FnOnce(Payload) -> Option<T>,
{
    match result {
        Ok(payload) => {
            let value = extract(payload).unwrap_or_default();
            on_result(0, value, None);
        }
        Err(e) => {
            let message = e.to_string();
            on_result(e.status_code(), T::default(), Some(message));
        }
    }
}

/// The client-side Attribute Protocol engine
pub struct Engine<C: Transport> {
    inner: Arc<Inner<C>>,
}

impl<C: Transport + 'static> Engine<C> {
    /// Wraps `channel`, installing this engine's recv/error dispatch as the channel's sole
    /// callbacks.
    pub fn new(channel: C) -> Engine<C> {
        let inner = Arc::new(Inner {
            channel,
            slot: Slot::new(),
            notifications: NotificationTable::new(),
            on_error: Mutex::new(None),
        });

        // The channel holds only a `Weak` reference back to `Inner` so that dropping the last
        // `Engine` handle actually drops `Inner` (and with it, closes the channel) instead of the
        // two keeping each other alive forever.
        let recv_inner: Weak<Inner<C>> = Arc::downgrade(&inner);
        inner.channel.set_on_recv(Box::new(move |bytes: &[u8]| {
            if let Some(inner) = recv_inner.upgrade() {
                Self::dispatch(&inner, bytes);
            }
        }));

        let err_inner: Weak<Inner<C>> = Arc::downgrade(&inner);
        inner.channel.set_on_error(Box::new(move |e: &Error| {
            if let Some(inner) = err_inner.upgrade() {
                Self::handle_link_error(&inner, e);
            }
        }));

        Engine { inner }
    }

    /// The current negotiated ATT MTU
    pub fn mtu(&self) -> u16 {
        self.inner.channel.mtu()
    }

    /// Registers the out-of-band error sink: protocol violations, unsolicited notifications, and
    /// link errors with no outstanding request to carry them all land here.
    pub fn on_error<F>(&self, cb: F)
    where
        F: Fn(&Error) + Send + 'static,
    {
        *self.inner.on_error.lock().expect("engine error sink poisoned") = Some(Box::new(cb));
    }

    fn surface(inner: &Inner<C>, err: &Error) {
        log::warn!("(engine) {}", err);

        if let Ok(guard) = inner.on_error.lock() {
            if let Some(cb) = guard.as_ref() {
                cb(err);
            }
        }
    }

    /// Handles a link-reported I/O error (peer close, read/write failure): delivers it to the
    /// outstanding request's callback if one exists (§4.6, §7 - "I/O errors travel on the
    /// callback of the outstanding request"), falling back to the engine-wide error sink only
    /// when no request was pending to receive it.
    fn handle_link_error(inner: &Inner<C>, err: &Error) {
        log::warn!("(engine) {}", err);

        if !inner.slot.fail_current(err.clone()) {
            if let Ok(guard) = inner.on_error.lock() {
                if let Some(cb) = guard.as_ref() {
                    cb(err);
                }
            }
        }
    }

    fn submit_or_abort(inner: &Inner<C>, pdu: Vec<u8>) {
        if let Err(e) = inner.channel.submit(&pdu) {
            inner.slot.fail_current(e);
        }
    }

    fn dispatch(inner: &Arc<Inner<C>>, bytes: &[u8]) {
        if bytes.is_empty() {
            Self::surface(inner, &Error::Codec(codec::CodecError::TooShort));
            return;
        }

        let opcode = bytes[0];
        let body = &bytes[1..];

        if opcode == codec::opcode::HANDLE_VALUE_NOTIFICATION {
            if body.len() < 2 {
                Self::surface(inner, &Error::Codec(codec::CodecError::TooShort));
                return;
            }

            let handle = u16::from_le_bytes([body[0], body[1]]);
            let value = &body[2..];

            if !inner.notifications.dispatch(handle, value) {
                Self::surface(inner, &Error::UnsolicitedNotification(handle));
            }

            return;
        }

        if opcode == codec::opcode::HANDLE_VALUE_INDICATION {
            Self::surface(inner, &Error::UnknownOpcode(opcode));
            return;
        }

        match inner.slot.try_handle(opcode, body) {
            HandleOutcome::Completed => {}
            HandleOutcome::Resubmit(pdu) => Self::submit_or_abort(inner, pdu),
            HandleOutcome::NotOurs => {
                if opcode == codec::opcode::ERROR_RESPONSE {
                    match codec::parse_error_response(body) {
                        Ok((req_opcode, _handle, _code)) => {
                            Self::surface(inner, &Error::UnmatchedErrorResponse(req_opcode));
                        }
                        Err(e) => Self::surface(inner, &Error::Codec(e)),
                    }
                } else {
                    Self::surface(inner, &Error::UnknownOpcode(opcode));
                }
            }
        }
    }

    /// Discovers the (handle, type) pairs in `[start, end]`, continuing across rounds until the
    /// peer's list reaches `end` or returns `ATTRIBUTE_NOT_FOUND`.
    pub fn find_information<F>(&self, start: u16, end: u16, on_result: F)
    where
        F: FnOnce(u8, Vec<codec::AttributeInfo>, Option<String>) + Send + 'static,
    {
        let mtu = self.inner.channel.mtu() as usize;
        let first_pdu = discovery::FindInformationHandler::first_pdu(start, end, mtu);
        let handler = discovery::FindInformationHandler::new(end, mtu);

        let claimed = self.inner.slot.claim(
            codec::opcode::FIND_INFORMATION_REQUEST,
            codec::opcode::FIND_INFORMATION_RESPONSE,
            Box::new(handler),
            Box::new(move |result| {
                deliver(
                    result,
                    |p| match p {
                        Payload::AttributeInfoList(l) => Some(l),
                        _ => None,
                    },
                    on_result,
                )
            }),
        );

        if claimed {
            Self::submit_or_abort(&self.inner, first_pdu);
        }
    }

    /// Discovers the handles of attributes whose type and value both match, continuing across
    /// rounds the same way as [`Engine::find_information`].
    pub fn find_by_type_value<F>(&self, start: u16, end: u16, type_uuid: u16, value: Vec<u8>, on_result: F)
    where
        F: FnOnce(u8, Vec<codec::HandlesInfo>, Option<String>) + Send + 'static,
    {
        let mtu = self.inner.channel.mtu() as usize;
        let first_pdu = discovery::FindByTypeValueHandler::first_pdu(start, end, type_uuid, &value, mtu);
        let handler = discovery::FindByTypeValueHandler::new(end, type_uuid, value, mtu);

        let claimed = self.inner.slot.claim(
            codec::opcode::FIND_BY_TYPE_VALUE_REQUEST,
            codec::opcode::FIND_BY_TYPE_VALUE_RESPONSE,
            Box::new(handler),
            Box::new(move |result| {
                deliver(
                    result,
                    |p| match p {
                        Payload::HandlesInfoList(l) => Some(l),
                        _ => None,
                    },
                    on_result,
                )
            }),
        );

        if claimed {
            Self::submit_or_abort(&self.inner, first_pdu);
        }
    }

    /// Reads every attribute of `type_uuid` in `[start, end]`. Single-shot: only the first
    /// response is delivered, even if the peer's list doesn't reach `end` (see the Design Note on
    /// this procedure's narrowed continuation behavior).
    pub fn read_by_type<F>(&self, start: u16, end: u16, type_uuid: Uuid, on_result: F)
    where
        F: FnOnce(u8, Vec<codec::AttributeData>, Option<String>) + Send + 'static,
    {
        let mtu = self.inner.channel.mtu() as usize;
        let first_pdu = discovery::ReadByTypeHandler::first_pdu(start, end, &type_uuid, mtu);

        let claimed = self.inner.slot.claim(
            codec::opcode::READ_BY_TYPE_REQUEST,
            codec::opcode::READ_BY_TYPE_RESPONSE,
            Box::new(discovery::ReadByTypeHandler),
            Box::new(move |result| {
                deliver(
                    result,
                    |p| match p {
                        Payload::AttributeDataList(l) => Some(l),
                        _ => None,
                    },
                    on_result,
                )
            }),
        );

        if claimed {
            Self::submit_or_abort(&self.inner, first_pdu);
        }
    }

    /// Discovers attribute groups (e.g. primary services) of `type_uuid` in `[start, end]`,
    /// continuing across rounds the same way as [`Engine::find_information`].
    pub fn read_by_group_type<F>(&self, start: u16, end: u16, type_uuid: Uuid, on_result: F)
    where
        F: FnOnce(u8, Vec<codec::GroupAttributeData>, Option<String>) + Send + 'static,
    {
        let mtu = self.inner.channel.mtu() as usize;
        let first_pdu = discovery::ReadByGroupTypeHandler::first_pdu(start, end, &type_uuid, mtu);
        let handler = discovery::ReadByGroupTypeHandler::new(end, type_uuid, mtu);

        let claimed = self.inner.slot.claim(
            codec::opcode::READ_BY_GROUP_TYPE_REQUEST,
            codec::opcode::READ_BY_GROUP_TYPE_RESPONSE,
            Box::new(handler),
            Box::new(move |result| {
                deliver(
                    result,
                    |p| match p {
                        Payload::GroupAttributeDataList(l) => Some(l),
                        _ => None,
                    },
                    on_result,
                )
            }),
        );

        if claimed {
            Self::submit_or_abort(&self.inner, first_pdu);
        }
    }

    /// Reads the value of a single attribute by handle
    pub fn read_attribute<F>(&self, handle: u16, on_result: F)
    where
        F: FnOnce(u8, Vec<u8>, Option<String>) + Send + 'static,
    {
        let mtu = self.inner.channel.mtu() as usize;
        let pdu = codec::encode_handle_op(codec::opcode::READ_REQUEST, handle, None, mtu);

        let claimed = self.inner.slot.claim(
            codec::opcode::READ_REQUEST,
            codec::opcode::READ_RESPONSE,
            Box::new(crate::transaction::SimpleHandler::new(|body: &[u8]| Ok(Payload::Bytes(body.to_vec())))),
            Box::new(move |result| {
                deliver(
                    result,
                    |p| match p {
                        Payload::Bytes(b) => Some(b),
                        _ => None,
                    },
                    on_result,
                )
            }),
        );

        if claimed {
            Self::submit_or_abort(&self.inner, pdu);
        }
    }

    /// Writes `value` to `handle` with no response expected. Slot-free: this never blocks a
    /// concurrent request.
    pub fn write_command<F>(&self, handle: u16, value: &[u8], on_sent: Option<F>)
    where
        F: FnOnce() + Send + 'static,
    {
        let mtu = self.inner.channel.mtu() as usize;
        let pdu = codec::encode_handle_op(codec::opcode::WRITE_COMMAND, handle, Some(value), mtu);

        match self.inner.channel.submit(&pdu) {
            Ok(()) => {
                if let Some(cb) = on_sent {
                    cb();
                }
            }
            Err(e) => Self::surface(&self.inner, &e),
        }
    }

    /// Writes `value` to `handle`, expecting a Write Response. Unlike the source this crate is
    /// derived from, this claims the transaction slot (Design Note, §9 Open Question 2) - the
    /// response is matched like any other, not silently absorbed.
    pub fn write_request<F>(&self, handle: u16, value: &[u8], on_result: F)
    where
        F: FnOnce(u8, Option<String>) + Send + 'static,
    {
        let mtu = self.inner.channel.mtu() as usize;
        let pdu = codec::encode_handle_op(codec::opcode::WRITE_REQUEST, handle, Some(value), mtu);

        let claimed = self.inner.slot.claim(
            codec::opcode::WRITE_REQUEST,
            codec::opcode::WRITE_RESPONSE,
            Box::new(crate::transaction::SimpleHandler::new(|_body: &[u8]| Ok(Payload::Unit))),
            Box::new(move |result| match result {
                Ok(_) => on_result(0, None),
                Err(e) => on_result(e.status_code(), Some(e.to_string())),
            }),
        );

        if claimed {
            Self::submit_or_abort(&self.inner, pdu);
        }
    }

    /// Registers `on_notify` for Handle Value Notifications on `handle`, replacing any prior
    /// registration.
    pub fn subscribe_notifications<F>(&self, handle: u16, on_notify: F)
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.inner.notifications.subscribe(handle, Box::new(on_notify));
    }

    /// Runs the MTU Exchange handshake and, on success, raises this engine's negotiated MTU to
    /// `min(desired, peer's offer)`.
    pub fn exchange_mtu<F>(&self, desired: u16, on_result: F)
    where
        F: FnOnce(u8, u16, Option<String>) + Send + 'static,
    {
        let pdu = codec::encode_mtu_exchange_request(desired);
        let inner = self.inner.clone();

        let claimed = self.inner.slot.claim(
            codec::opcode::EXCHANGE_MTU_REQUEST,
            codec::opcode::EXCHANGE_MTU_RESPONSE,
            Box::new(crate::transaction::SimpleHandler::new(move |body: &[u8]| {
                let peer_mtu = codec::parse_mtu_exchange_response(body)?;
                let negotiated = desired.min(peer_mtu);
                Ok(Payload::Mtu(negotiated))
            })),
            Box::new(move |result| match result {
                Ok(Payload::Mtu(negotiated)) => {
                    inner.channel.set_mtu(negotiated);
                    on_result(0, negotiated, None);
                }
                Ok(_) => on_result(0, desired, None),
                Err(e) => on_result(e.status_code(), 0, Some(e.to_string())),
            }),
        );

        if claimed {
            Self::submit_or_abort(&self.inner, pdu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    /// A hand-rolled in-memory transport double: `submit` appends to an outbound log instead of
    /// touching a socket, and `inject` feeds bytes straight to the installed recv callback.
    struct TestChannel {
        mtu: Mutex<u16>,
        outbound: Mutex<Vec<Vec<u8>>>,
        on_recv: Mutex<Option<Box<dyn FnMut(&[u8]) + Send>>>,
        on_error: Mutex<Option<Box<dyn Fn(&Error) + Send>>>,
    }

    impl TestChannel {
        fn new(mtu: u16) -> Arc<Self> {
            Arc::new(TestChannel {
                mtu: Mutex::new(mtu),
                outbound: Mutex::new(Vec::new()),
                on_recv: Mutex::new(None),
                on_error: Mutex::new(None),
            })
        }

        fn inject(&self, bytes: &[u8]) {
            if let Ok(mut guard) = self.on_recv.lock() {
                if let Some(cb) = guard.as_mut() {
                    cb(bytes);
                }
            }
        }

        fn inject_error(&self, err: &Error) {
            if let Ok(guard) = self.on_error.lock() {
                if let Some(cb) = guard.as_ref() {
                    cb(err);
                }
            }
        }

        fn take_outbound(&self) -> Vec<Vec<u8>> {
            std::mem::take(&mut self.outbound.lock().unwrap())
        }
    }

    impl Transport for Arc<TestChannel> {
        fn submit(&self, pdu: &[u8]) -> Result<(), Error> {
            self.outbound.lock().unwrap().push(pdu.to_vec());
            Ok(())
        }

        fn mtu(&self) -> u16 {
            *self.mtu.lock().unwrap()
        }

        fn set_mtu(&self, mtu: u16) {
            *self.mtu.lock().unwrap() = mtu;
        }

        fn set_on_recv(&self, cb: Box<dyn FnMut(&[u8]) + Send>) {
            *self.on_recv.lock().unwrap() = Some(cb);
        }

        fn set_on_error(&self, cb: Box<dyn Fn(&Error) + Send>) {
            *self.on_error.lock().unwrap() = Some(cb);
        }

        fn close(&self) {}
    }

    #[test]
    fn s1_read_attribute_by_handle() {
        let channel = TestChannel::new(23);
        let engine = Engine::new(channel.clone());
        let (tx, rx) = mpsc::channel();

        engine.read_attribute(0x0001, move |status, value, msg| tx.send((status, value, msg)).unwrap());

        assert_eq!(channel.take_outbound(), vec![vec![0x0A, 0x01, 0x00]]);

        channel.inject(&[0x0B, 0x28, 0x00, 0x18]);

        let (status, value, msg) = rx.recv().unwrap();
        assert_eq!(status, 0);
        assert_eq!(value, vec![0x28, 0x00, 0x18]);
        assert!(msg.is_none());
    }

    #[test]
    fn s2_find_information_two_rounds() {
        let channel = TestChannel::new(23);
        let engine = Engine::new(channel.clone());
        let (tx, rx) = mpsc::channel();

        engine.find_information(0x0001, 0x000A, move |status, list, msg| tx.send((status, list, msg)).unwrap());

        assert_eq!(channel.take_outbound(), vec![vec![0x04, 0x01, 0x00, 0x0A, 0x00]]);

        channel.inject(&[0x05, 0x01, 0x01, 0x00, 0x00, 0x28, 0x02, 0x00, 0x01, 0x28]);

        assert_eq!(channel.take_outbound(), vec![vec![0x04, 0x03, 0x00, 0x0A, 0x00]]);

        channel.inject(&[0x01, 0x04, 0x03, 0x00, 0x0A]);

        let (status, list, msg) = rx.recv().unwrap();
        assert_eq!(status, 0);
        assert_eq!(list.len(), 2);
        assert!(msg.is_none());
    }

    #[test]
    fn s3_already_pending_rejection() {
        let channel = TestChannel::new(23);
        let engine = Engine::new(channel.clone());
        let (tx1, rx1) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();

        engine.read_attribute(0x0005, move |status, value, msg| tx1.send((status, value, msg)).unwrap());
        engine.read_attribute(0x0006, move |status, value, msg| tx2.send((status, value, msg)).unwrap());

        let (status, _value, msg) = rx2.recv().unwrap();
        assert_ne!(status, 0);
        assert!(msg.unwrap().starts_with("Request already pending: read request"));

        // first request is still outstanding
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn s4_notification_dispatch() {
        let channel = TestChannel::new(23);
        let engine = Engine::new(channel.clone());
        let (tx, rx) = mpsc::channel();

        engine.subscribe_notifications(0x0025, move |value: &[u8]| tx.send(value.to_vec()).unwrap());

        channel.inject(&[0x1B, 0x25, 0x00, 0xDE, 0xAD, 0xBE, 0xEF]);

        assert_eq!(rx.recv().unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn s5_write_command_is_slot_free() {
        let channel = TestChannel::new(23);
        let engine = Engine::new(channel.clone());
        let (tx, rx) = mpsc::channel();

        engine.write_command(0x0010, &[0xAA, 0xBB], Some(|| {}));
        assert_eq!(channel.take_outbound(), vec![vec![0x52, 0x10, 0x00, 0xAA, 0xBB]]);

        engine.read_attribute(0x0011, move |status, _value, _msg| tx.send(status).unwrap());
        assert_eq!(channel.take_outbound(), vec![vec![0x0A, 0x11, 0x00]]);

        channel.inject(&[0x0B]);
        assert_eq!(rx.recv().unwrap(), 0);
    }

    #[test]
    fn s6_peer_error_mid_discovery() {
        let channel = TestChannel::new(23);
        let engine = Engine::new(channel.clone());
        let (tx, rx) = mpsc::channel();

        engine.read_by_group_type(0x0001, 0xFFFF, Uuid::from_u16(0x2800), move |status, list, msg| {
            tx.send((status, list, msg)).unwrap()
        });

        assert_eq!(channel.take_outbound(), vec![vec![0x10, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28]]);

        channel.inject(&[0x01, 0x10, 0x01, 0x00, 0x05]);

        let (status, list, msg) = rx.recv().unwrap();
        assert_eq!(status, 0x05);
        assert!(list.is_empty());
        assert_eq!(msg.unwrap(), "Authentication required");
    }

    #[test]
    fn s7_mtu_exchange() {
        let channel = TestChannel::new(23);
        let engine = Engine::new(channel.clone());
        let (tx, rx) = mpsc::channel();

        engine.exchange_mtu(185, move |status, mtu, msg| tx.send((status, mtu, msg)).unwrap());
        assert_eq!(channel.take_outbound(), vec![vec![0x02, 0xB9, 0x00]]);

        channel.inject(&[0x03, 0xC0, 0x00]);

        let (status, mtu, msg) = rx.recv().unwrap();
        assert_eq!(status, 0);
        assert_eq!(mtu, 185);
        assert!(msg.is_none());
        assert_eq!(engine.mtu(), 185);
    }

    #[test]
    fn s8_write_request_claims_the_slot() {
        let channel = TestChannel::new(23);
        let engine = Engine::new(channel.clone());
        let (tx, rx) = mpsc::channel();
        let (tx2, rx2) = mpsc::channel();

        engine.write_request(0x0030, &[0x01], move |status, msg| tx.send((status, msg)).unwrap());
        assert_eq!(channel.take_outbound(), vec![vec![0x12, 0x30, 0x00, 0x01]]);

        channel.inject(&[0x13]);

        let (status, msg) = rx.recv().unwrap();
        assert_eq!(status, 0);
        assert!(msg.is_none());

        engine.read_attribute(0x0031, move |status, _value, _msg| tx2.send(status).unwrap());
        assert_eq!(channel.take_outbound(), vec![vec![0x0A, 0x31, 0x00]]);
        channel.inject(&[0x0B]);
        assert_eq!(rx2.recv().unwrap(), 0);
    }

    /// A link I/O error must resolve the outstanding request's own callback, not only the
    /// engine-wide error sink - otherwise a peer close mid-request hangs the caller forever.
    #[test]
    fn link_io_error_delivers_to_the_outstanding_callback() {
        let channel = TestChannel::new(23);
        let engine = Engine::new(channel.clone());
        let (tx, rx) = mpsc::channel();
        let (err_tx, err_rx) = mpsc::channel();

        engine.on_error(move |e: &Error| err_tx.send(e.to_string()).unwrap());
        engine.read_attribute(0x0001, move |status, _value, msg| tx.send((status, msg)).unwrap());
        assert_eq!(channel.take_outbound(), vec![vec![0x0A, 0x01, 0x00]]);

        channel.inject_error(&Error::Io("channel closed by peer".to_string()));

        let (status, msg) = rx.recv().unwrap();
        assert_eq!(status, 0x80);
        assert_eq!(msg.unwrap(), "channel closed by peer");

        // the slot was the error's only destination - the engine-wide sink stays silent
        assert!(err_rx.try_recv().is_err());
    }

    /// With no request outstanding, a link I/O error has nowhere else to go but the error sink.
    #[test]
    fn link_io_error_falls_back_to_error_sink_when_nothing_is_pending() {
        let channel = TestChannel::new(23);
        let engine = Engine::new(channel.clone());
        let (err_tx, err_rx) = mpsc::channel();

        engine.on_error(move |e: &Error| err_tx.send(e.to_string()).unwrap());

        channel.inject_error(&Error::Io("channel closed by peer".to_string()));

        assert_eq!(err_rx.recv().unwrap(), "channel closed by peer");
    }
}
