//! # Ensemble - Live-Editable Audio Graph Host
//!
//! A real-time audio graph that can be edited while it plays.
//!
//! ## Architecture
//!
//! Ensemble is an umbrella crate that coordinates:
//! - **ensemble-core** - Realtime kernel (atoms, properties, buffers, run contexts, work-stealing scheduler)
//! - **ensemble-protocol** - Edit messages, status codes, client interfaces
//! - **ensemble-engine** - Object store, event pipeline, undo/redo, compiled graphs
//!
//! Edits are messages. Each one is validated and prepared off the audio
//! thread, swapped in at an exact frame without blocking, and then answered,
//! broadcast to every registered client, and recorded for undo.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ensemble::prelude::*;
//!
//! let engine = EngineBuilder::new()
//!     .block_length(256)
//!     .factory(Arc::new(MyPlugins))
//!     .build()?;
//!
//! let (ui, inbox) = ChannelClient::new("app:ui");
//! let ui = Arc::new(ui);
//! engine.register_client(ui.clone());
//!
//! let session = engine.interface(Some(ui));
//! session.put("/osc", Properties::new()
//!     .with(uris::TYPE, Atom::uri(uris::BLOCK))
//!     .with(uris::PROTOTYPE, Atom::uri("my:Osc")), Context::Default);
//! session.put("/out", Properties::new()
//!     .with(uris::TYPE, Atom::uri(uris::OUTPUT_PORT))
//!     .with(uris::TYPE, Atom::uri(uris::AUDIO_PORT)), Context::Default);
//! session.connect(Path::new("/osc/out").unwrap(), Path::new("/out").unwrap());
//! engine.flush()?;
//!
//! // On the audio thread
//! let mut handle = engine.take_process_handle().unwrap();
//! handle.run_cycle(256)?;
//! handle.read_output(0, &mut samples)?;
//! ```

/// Re-export of ensemble-core for direct access
pub use ensemble_core as core;
/// Re-export of ensemble-protocol for direct access
pub use ensemble_protocol as protocol;
/// Re-export of ensemble-engine for direct access
pub use ensemble_engine as engine;

// Values and object model
pub use ensemble_core::{uris, Atom, Context, EngineConfig, Path, Properties, Property, Uri, UriMap};

// Realtime kernel
pub use ensemble_core::{Buffer, BufferFactory, BufferKind, RunContext, TaskGraph, WorkerPool};

// Protocol
pub use ensemble_protocol::{
    ChannelClient, Interface, InterfaceExt, Mailbox, MailboxExt, Message, Seq, SequenceCounter,
    Status,
};

// Engine
pub use ensemble_engine::{
    BlockFactory, BlockIo, Broadcaster, Direction, Engine, EngineInterface, FactoryChain,
    InstantiateError, InternalFactory, PluginInstance, PortInfo, PortKind, ProcessHandle,
};

mod builder;
pub use builder::EngineBuilder;

mod error;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{Engine, EngineBuilder, EngineInterface, ProcessHandle};

    // Values
    pub use crate::{uris, Atom, Context, Path, Properties, Uri};

    // Clients
    pub use crate::{ChannelClient, Interface, InterfaceExt, Mailbox, MailboxExt, Message, Status};

    // Writing blocks
    pub use crate::{BlockFactory, BlockIo, Direction, InstantiateError, PluginInstance, PortInfo, PortKind};
    pub use crate::RunContext;

    pub use std::sync::Arc;
}
