//! Engine configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Largest supported block length in frames.
pub const MAX_BLOCK_LENGTH: u32 = 8192;

/// Largest supported number of run contexts (root plus workers).
pub const MAX_THREADS: usize = 64;

/// Configuration for the graph engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Frames per cycle; every driver cycle must fit in this.
    pub block_length: u32,
    /// Run contexts including the root (audio) context.
    pub num_threads: usize,
    /// Capacity in bytes of event-sequence port buffers.
    pub sequence_capacity: usize,
    /// Records per notification ring (one ring per run context).
    pub notification_capacity: usize,
    /// Prepared events that may be in flight between pre- and post-processing.
    pub event_queue_capacity: usize,
    /// Recycled buffers retained per pool key.
    pub buffer_pool_capacity: usize,
    /// Undo entries retained before the oldest is discarded.
    pub undo_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_length: 512,
            num_threads: 1,
            sequence_capacity: 4096,
            notification_capacity: 1024,
            event_queue_capacity: 256,
            buffer_pool_capacity: 256,
            undo_depth: 256,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8000..=384000).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.block_length == 0 || self.block_length > MAX_BLOCK_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "block_length {} out of range (1-{MAX_BLOCK_LENGTH})",
                self.block_length
            )));
        }
        if self.num_threads == 0 || self.num_threads > MAX_THREADS {
            return Err(Error::InvalidConfig(format!(
                "num_threads {} out of range (1-{MAX_THREADS})",
                self.num_threads
            )));
        }
        let min_sequence = crate::buffer::sequence::event_footprint(8);
        if self.sequence_capacity < min_sequence {
            return Err(Error::InvalidConfig(format!(
                "sequence_capacity {} cannot hold a single event ({min_sequence} bytes)",
                self.sequence_capacity
            )));
        }
        for (name, value) in [
            ("notification_capacity", self.notification_capacity),
            ("event_queue_capacity", self.event_queue_capacity),
            ("buffer_pool_capacity", self.buffer_pool_capacity),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }

    /// Duration of one full cycle in seconds.
    pub fn block_duration(&self) -> f64 {
        self.block_length as f64 / self.sample_rate as f64
    }
}
