//! Integration test modules for ensemble
//!
//! - graph: object model, routing and signal flow
//! - undo: history of edits
//! - protocol: the request/response contract
//! - scheduler: worker threads and frame-accurate edits
//! - notifications: values reported back from the audio thread

pub mod graph;
pub mod notifications;
pub mod protocol;
pub mod scheduler;
pub mod undo;
