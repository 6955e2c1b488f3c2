//! The single-outstanding-transaction slot
//!
//! ATT allows exactly one request awaiting its response at a time; everything else (commands,
//! notifications) is slot-free. This module is the sum-type cell that enforces that, replacing
//! the raw-pointer compare-and-swap of the source this crate is derived from with an
//! `Option<TxDescriptor>` behind a `Mutex` - the contract (one outstanding; synchronous rejection
//! on conflict) is what's load bearing, not a literal lock-free CAS instruction.

use crate::codec;
use crate::error::{AttErrorCode, Error};
use std::sync::Mutex;

/// Whatever a completed or still-running request hands back to its caller
///
/// Replaces the source's `void*`-plus-cast polymorphism with a tagged union the compiler checks.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Unit,
    Bytes(Vec<u8>),
    AttributeInfoList(Vec<codec::AttributeInfo>),
    HandlesInfoList(Vec<codec::HandlesInfo>),
    AttributeDataList(Vec<codec::AttributeData>),
    GroupAttributeDataList(Vec<codec::GroupAttributeData>),
    Mtu(u16),
}

/// What a [`ResponseHandler`] decided to do with one inbound PDU
pub(crate) enum Outcome {
    /// The transaction is finished; release the slot and hand `result` to the caller's callback
    Complete(Result<Payload, Error>),
    /// Re-submit `next_pdu` and keep the slot occupied with the same handler
    Continue(Vec<u8>),
}

/// Per-operation logic for interpreting responses and errors against the accumulated state
///
/// Simple operations (Read Request, Write Request, MTU Exchange, ...) always return
/// [`Outcome::Complete`] on the first call. Discovery procedures ([`crate::discovery`]) hold an
/// accumulator and may return [`Outcome::Continue`] across several rounds.
pub(crate) trait ResponseHandler: Send {
    fn on_response(&mut self, body: &[u8]) -> Outcome;
    fn on_error(&mut self, code: AttErrorCode) -> Outcome;
}

/// A handler for operations that complete on their first response, with no discovery-style
/// continuation.
pub(crate) struct SimpleHandler<F>
where
    F: FnOnce(&[u8]) -> Result<Payload, Error> + Send,
{
    parse: Option<F>,
}

impl<F> SimpleHandler<F>
where
    F: FnOnce(&[u8]) -> Result<Payload, Error> + Send,
{
    pub(crate) fn new(parse: F) -> Self {
        SimpleHandler { parse: Some(parse) }
    }
}

impl<F> ResponseHandler for SimpleHandler<F>
where
    F: FnOnce(&[u8]) -> Result<Payload, Error> + Send,
{
    fn on_response(&mut self, body: &[u8]) -> Outcome {
        let parse = self.parse.take().expect("SimpleHandler polled after completion");
        Outcome::Complete(parse(body))
    }

    fn on_error(&mut self, code: AttErrorCode) -> Outcome {
        Outcome::Complete(Err(Error::Att(code)))
    }
}

struct TxDescriptor {
    request_opcode: u8,
    expected_response_opcode: u8,
    handler: Box<dyn ResponseHandler>,
    completion: Box<dyn FnOnce(Result<Payload, Error>) + Send>,
}

/// What happened when an inbound PDU was offered to the slot
pub(crate) enum HandleOutcome {
    /// No transaction was pending, or the PDU didn't match the one that is - the caller should
    /// treat this as a protocol violation.
    NotOurs,
    /// The transaction finished; its callback has already been invoked.
    Completed,
    /// The transaction continues; resubmit these bytes on the link.
    Resubmit(Vec<u8>),
}

/// The transaction slot
pub(crate) struct Slot {
    inner: Mutex<Option<TxDescriptor>>,
}

impl Slot {
    pub(crate) fn new() -> Self {
        Slot { inner: Mutex::new(None) }
    }

    /// Attempts to claim the slot for `request_opcode`, expecting `expected_response_opcode` back.
    ///
    /// On success the descriptor is stored and `true` is returned. On conflict, `completion` is
    /// invoked synchronously with `Error::AlreadyPending` (never returned to the caller as a
    /// `Result` - the contract is that every submission resolves through the supplied callback)
    /// and `false` is returned.
    pub(crate) fn claim(
        &self,
        request_opcode: u8,
        expected_response_opcode: u8,
        handler: Box<dyn ResponseHandler>,
        completion: Box<dyn FnOnce(Result<Payload, Error>) + Send>,
    ) -> bool {
        let mut guard = self.inner.lock().expect("transaction slot poisoned");

        if guard.is_some() {
            drop(guard);
            let attempted = codec::opcode_name(request_opcode).unwrap_or("request");
            log::debug!("(transaction) claim rejected, slot occupied, attempted {}", attempted);
            completion(Err(Error::AlreadyPending { attempted }));
            return false;
        }

        *guard = Some(TxDescriptor { request_opcode, expected_response_opcode, handler, completion });
        log::debug!("(transaction) claimed slot for opcode {:#04x}", request_opcode);
        true
    }

    /// Offers one inbound PDU (opcode + body, opcode already stripped from `body`) to the slot.
    ///
    /// Matches an Error Response only if it carries the slot's own request opcode; matches a
    /// normal response only if its opcode is the slot's expected response opcode. Anything else
    /// yields [`HandleOutcome::NotOurs`] and leaves the slot untouched.
    pub(crate) fn try_handle(&self, opcode: u8, body: &[u8]) -> HandleOutcome {
        enum Action {
            Complete(Box<dyn FnOnce(Result<Payload, Error>) + Send>, Result<Payload, Error>),
            Continue(Vec<u8>),
        }

        let action = {
            let mut guard = self.inner.lock().expect("transaction slot poisoned");

            let desc = match guard.as_mut() {
                Some(d) => d,
                None => return HandleOutcome::NotOurs,
            };

            let outcome = if opcode == codec::opcode::ERROR_RESPONSE {
                match codec::parse_error_response(body) {
                    Ok((req_opcode, _handle, code)) if req_opcode == desc.request_opcode => {
                        desc.handler.on_error(AttErrorCode::from_raw(code))
                    }
                    _ => return HandleOutcome::NotOurs,
                }
            } else if opcode == desc.expected_response_opcode {
                desc.handler.on_response(body)
            } else {
                return HandleOutcome::NotOurs;
            };

            match outcome {
                Outcome::Complete(result) => {
                    let desc = guard.take().expect("slot checked Some above");
                    Action::Complete(desc.completion, result)
                }
                Outcome::Continue(next_pdu) => Action::Continue(next_pdu),
            }
        };

        match action {
            Action::Complete(completion, result) => {
                completion(result);
                HandleOutcome::Completed
            }
            Action::Continue(next_pdu) => HandleOutcome::Resubmit(next_pdu),
        }
    }

    /// Forcibly empties the slot, invoking whatever completion is currently installed with
    /// `error`. Used to abandon an outstanding request (`Error::Aborted`, on engine drop; a link
    /// I/O error, from `engine`'s link-error handler) and to unwind a just-claimed slot whose
    /// first submit failed before any response could arrive (`Error::Io`).
    ///
    /// Returns `true` if a request was actually outstanding and its completion was invoked,
    /// `false` if the slot was already empty.
    pub(crate) fn fail_current(&self, error: Error) -> bool {
        let taken = self.inner.lock().expect("transaction slot poisoned").take();

        match taken {
            Some(desc) => {
                (desc.completion)(Err(error));
                true
            }
            None => false,
        }
    }

    /// Forcibly empties the slot, invoking its completion with `Error::Aborted` if one was
    /// outstanding. Called once when the owning engine is dropped.
    pub(crate) fn abort(&self) {
        self.fail_current(Error::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn claim_twice_rejects_second() {
        let slot = Slot::new();

        let claimed_first = slot.claim(
            codec::opcode::READ_REQUEST,
            codec::opcode::READ_RESPONSE,
            Box::new(SimpleHandler::new(|body: &[u8]| Ok(Payload::Bytes(body.to_vec())))),
            Box::new(|_| {}),
        );
        assert!(claimed_first);

        let (tx, rx) = mpsc::channel();
        let claimed_second = slot.claim(
            codec::opcode::READ_REQUEST,
            codec::opcode::READ_RESPONSE,
            Box::new(SimpleHandler::new(|body: &[u8]| Ok(Payload::Bytes(body.to_vec())))),
            Box::new(move |result| tx.send(result).unwrap()),
        );
        assert!(!claimed_second);

        let result = rx.recv().unwrap();
        match result {
            Err(Error::AlreadyPending { attempted }) => assert_eq!(attempted, "read request"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn response_completes_and_frees_slot() {
        let slot = Slot::new();
        let (tx, rx) = mpsc::channel();

        slot.claim(
            codec::opcode::READ_REQUEST,
            codec::opcode::READ_RESPONSE,
            Box::new(SimpleHandler::new(|body: &[u8]| Ok(Payload::Bytes(body.to_vec())))),
            Box::new(move |result| tx.send(result).unwrap()),
        );

        let outcome = slot.try_handle(codec::opcode::READ_RESPONSE, &[0x28, 0x00, 0x18]);
        assert!(matches!(outcome, HandleOutcome::Completed));

        assert_eq!(rx.recv().unwrap().unwrap(), Payload::Bytes(vec![0x28, 0x00, 0x18]));

        // slot is free again
        let claimed = slot.claim(
            codec::opcode::READ_REQUEST,
            codec::opcode::READ_RESPONSE,
            Box::new(SimpleHandler::new(|body: &[u8]| Ok(Payload::Bytes(body.to_vec())))),
            Box::new(|_| {}),
        );
        assert!(claimed);
    }

    #[test]
    fn unmatched_error_response_is_not_ours() {
        let slot = Slot::new();

        slot.claim(
            codec::opcode::READ_REQUEST,
            codec::opcode::READ_RESPONSE,
            Box::new(SimpleHandler::new(|body: &[u8]| Ok(Payload::Bytes(body.to_vec())))),
            Box::new(|_| {}),
        );

        // error response naming a different request opcode
        let body = [codec::opcode::WRITE_REQUEST, 0x01, 0x00, 0x0A];
        let outcome = slot.try_handle(codec::opcode::ERROR_RESPONSE, &body);
        assert!(matches!(outcome, HandleOutcome::NotOurs));
    }

    #[test]
    fn abort_delivers_aborted_error() {
        let slot = Slot::new();
        let (tx, rx) = mpsc::channel();

        slot.claim(
            codec::opcode::READ_REQUEST,
            codec::opcode::READ_RESPONSE,
            Box::new(SimpleHandler::new(|body: &[u8]| Ok(Payload::Bytes(body.to_vec())))),
            Box::new(move |result| tx.send(result).unwrap()),
        );

        slot.abort();

        assert!(matches!(rx.recv().unwrap(), Err(Error::Aborted)));
    }
}
