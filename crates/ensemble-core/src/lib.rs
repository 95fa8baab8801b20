//! Realtime kernel for live-editable audio graphs.
//!
//! # Primary API
//!
//! - [`Atom`] / [`Properties`]: typed values and multi-valued property maps
//! - [`Buffer`] / [`BufferFactory`]: per-port memory and its recycling pool
//! - [`RunContext`]: one worker's view of the current cycle
//! - [`TaskGraph`] / [`WorkerPool`]: dependency-counted, work-stealing execution
//! - [`Notifier`] / [`NotificationHub`]: realtime to non-realtime value channel
//! - [`EngineConfig`]: validated engine settings
//!
//! # Example
//!
//! ```ignore
//! use ensemble_core::prelude::*;
//!
//! let (notifier, reader) = notification_channel(1024);
//! let mut root = RunContext::new(0, 48000, notifier, Arc::new(RtErrors::default()));
//! root.locate(0, 512);
//!
//! let graph = Arc::new(TaskGraph::new(tasks, &edges, 1)?);
//! let pool = WorkerPool::new(Vec::new())?;
//! pool.run_cycle(&graph, &mut root);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::EngineConfig;

pub mod atom;
pub use atom::{types, Atom, Primitive, INLINE_CAPACITY};

mod uri;
pub use uri::{is_valid_symbol, Path, Uri, UriMap, Urid};

pub mod uris;

mod properties;
pub use properties::{Context, Properties, Property};

pub mod buffer;
pub use buffer::{Buffer, BufferFactory, BufferKind, BufferRef, PoolKey};

mod lockfree;
pub use lockfree::{AtomicFlag, AtomicFloat};

pub mod notify;
pub use notify::{notification_channel, Notification, NotificationHub, NotificationReader, Notifier, RtErrors, SubjectId};

mod run_context;
pub use run_context::{CycleTiming, RunContext};

mod task;
pub use task::{Feedback, TaskBody, TaskGraph};

mod worker;
pub use worker::{CycleWork, WorkerPool};

pub mod prelude {
    pub use crate::{
        notification_channel, Atom, Buffer, BufferFactory, BufferKind, Context, EngineConfig,
        Path, Properties, Property, RtErrors, RunContext, TaskBody, TaskGraph, Uri, WorkerPool,
    };
    pub use std::sync::Arc;
}
