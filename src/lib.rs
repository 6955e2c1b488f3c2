//! A client-side implementation of the Bluetooth Low Energy Attribute Protocol (ATT)
//!
//! The Attribute Protocol is the wire protocol Generic Attribute Profile (GATT) clients use to
//! read, write, and discover attributes on a peer device. This crate implements the client half
//! only, over the LE-U fixed ATT channel (`l2cap` CID `0x0004`): [`engine::Engine`] drives
//! requests and receives responses, notifications, and discovery results through callbacks rather
//! than futures, matching the callback-oriented API this crate's design is derived from.
//!
//! This is implementation of the Attribute Protocol as defined in the Bluetooth Specification
//! (version 5.0), Vol. 3, Part F, restricted to the client role.
//!
//! # Layout
//!
//! - [`uuid`] - the 16/32/128 bit Bluetooth UUID tagged union.
//! - [`codec`] - PDU encoding/decoding, independent of any transport or connection state.
//! - [`l2cap`] - the fixed-channel framing contract ATT rides on.
//! - [`link`] - the concrete, std/epoll-backed transport.
//! - [`error`] - the crate-wide error taxonomy.
//! - [`engine`] - the public client API tying the above together.

pub mod codec;
pub mod engine;
pub mod error;
pub mod l2cap;
pub mod link;
pub mod uuid;

mod discovery;
mod notify;
mod transaction;

pub use engine::{Engine, Transport};
pub use error::Error;
pub use transaction::Payload;
pub use uuid::Uuid;
