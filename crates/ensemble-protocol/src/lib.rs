//! Message protocol for ensemble graph engines.
//!
//! - [`Message`]: the closed set of requests, responses and errors
//! - [`Status`]: outcome codes carried in responses
//! - [`Interface`] / [`InterfaceExt`]: the endpoint contract and typed senders
//! - [`ChannelClient`]: an in-process client backed by `crossbeam-channel`

pub mod client;
pub mod interface;
pub mod message;
pub mod status;

pub use client::{ChannelClient, Mailbox, MailboxExt};
pub use interface::{Interface, InterfaceExt, SequenceCounter};
pub use message::{Message, Seq};
pub use status::Status;
