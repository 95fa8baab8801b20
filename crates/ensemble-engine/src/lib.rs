//! Live-editable audio graph engine.
//!
//! # Primary API
//!
//! - [`Engine`]: object store, event pipeline, undo/redo, client fan-out
//! - [`EngineInterface`]: a client session that sends requests in
//! - [`ProcessHandle`]: the realtime half, driven once per audio cycle
//! - [`BlockFactory`] / [`PluginInstance`]: how blocks are created and run
//!
//! # Example
//!
//! ```ignore
//! use ensemble_engine::prelude::*;
//!
//! let engine = Engine::new(EngineConfig::default(), vec![Arc::new(MyFactory)])?;
//! let session = engine.interface(None);
//! session.put("/amp", gain_properties, Context::Default);
//! session.connect(Path::new("/in").unwrap(), Path::new("/amp/in").unwrap());
//! engine.flush()?;
//! ```

pub mod broadcaster;
pub use broadcaster::{Broadcaster, Transfer};

mod compiled;
pub use compiled::CompiledGraph;

mod engine;
pub use engine::{Engine, EngineInterface, ProcessHandle};

pub(crate) mod events;
pub use events::Plan;

pub mod factory;
pub use factory::{
    BlockFactory, BlockIo, Direction, FactoryChain, InstantiateError, InternalFactory,
    PluginInstance, PortInfo, PortKind,
};

pub mod internals;

mod runtime;
pub use runtime::{BlockRuntime, GraphRuntime, NotifyKeys, PortRuntime};

pub(crate) mod store;

pub mod undo;
pub use undo::{History, UndoEntry, UndoStack};

pub use ensemble_core::{Error, Result};

pub mod prelude {
    pub use crate::{BlockFactory, BlockIo, Engine, EngineInterface, PluginInstance, PortInfo};
    pub use ensemble_core::prelude::*;
    pub use ensemble_protocol::{ChannelClient, Interface, InterfaceExt, Message, Status};
}
