//! Builder for configuring and constructing an [`Engine`].

use crate::Result;
use ensemble_core::EngineConfig;
use ensemble_engine::{BlockFactory, Engine};
use std::sync::Arc;

/// Prototypes resolve through the added factories in order, then through
/// the engine's built-in blocks.
///
/// # Example
///
/// ```ignore
/// use ensemble::prelude::*;
///
/// let engine = EngineBuilder::new()
///     .sample_rate(44100)
///     .block_length(256)
///     .num_threads(4)
///     .factory(Arc::new(MyPlugins))
///     .build()?;
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    factories: Vec<Arc<dyn BlockFactory>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every setting at once.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 48000
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.config.sample_rate = rate;
        self
    }

    /// Default: 512
    pub fn block_length(mut self, frames: u32) -> Self {
        self.config.block_length = frames;
        self
    }

    /// Run contexts including the audio thread. Default: 1
    pub fn num_threads(mut self, n: usize) -> Self {
        self.config.num_threads = n;
        self
    }

    pub fn sequence_capacity(mut self, bytes: usize) -> Self {
        self.config.sequence_capacity = bytes;
        self
    }

    pub fn notification_capacity(mut self, records: usize) -> Self {
        self.config.notification_capacity = records;
        self
    }

    pub fn event_queue_capacity(mut self, events: usize) -> Self {
        self.config.event_queue_capacity = events;
        self
    }

    pub fn buffer_pool_capacity(mut self, buffers: usize) -> Self {
        self.config.buffer_pool_capacity = buffers;
        self
    }

    /// Default: 256
    pub fn undo_depth(mut self, entries: usize) -> Self {
        self.config.undo_depth = entries;
        self
    }

    pub fn factory(mut self, factory: Arc<dyn BlockFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;
        tracing::debug!(factories = self.factories.len(), "building engine");
        Ok(Engine::new(self.config, self.factories)?)
    }
}
