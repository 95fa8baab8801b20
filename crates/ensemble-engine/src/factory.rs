//! Block instantiation.
//!
//! A [`BlockFactory`] turns a prototype URI into a [`PluginInstance`]. The
//! engine creates one instance per voice while pre-processing an edit, so
//! factories may allocate freely; [`PluginInstance::run`] is called on the
//! realtime thread and must not.

use crate::internals::{Controller, Delay, Note, Trigger};
use ensemble_core::{uris, BufferKind, BufferRef, Buffer, RunContext};
use std::sync::Arc;
use thiserror::Error;

/// Signal kind of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    Audio,
    Control,
    Cv,
    Atom,
}

impl PortKind {
    pub fn buffer_kind(self) -> BufferKind {
        match self {
            PortKind::Audio | PortKind::Cv => BufferKind::Audio,
            PortKind::Control => BufferKind::Control,
            PortKind::Atom => BufferKind::Sequence,
        }
    }

    pub fn class_uri(self) -> &'static str {
        match self {
            PortKind::Audio => uris::AUDIO_PORT,
            PortKind::Control => uris::CONTROL_PORT,
            PortKind::Cv => uris::CV_PORT,
            PortKind::Atom => uris::ATOM_PORT,
        }
    }

    pub fn from_class(uri: &str) -> Option<Self> {
        match uri {
            uris::AUDIO_PORT => Some(PortKind::Audio),
            uris::CONTROL_PORT => Some(PortKind::Control),
            uris::CV_PORT => Some(PortKind::Cv),
            uris::ATOM_PORT => Some(PortKind::Atom),
            _ => None,
        }
    }

    /// Audio, CV and control ports all carry one float per frame or cycle.
    pub fn is_numeric(self) -> bool {
        !matches!(self, PortKind::Atom)
    }

    /// Whether an arc from a `self` port may feed a `head` port.
    pub fn can_feed(self, head: PortKind) -> bool {
        match (self, head) {
            (a, b) if a.is_numeric() && b.is_numeric() => true,
            (PortKind::Atom, _) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn class_uri(self) -> &'static str {
        match self {
            Direction::Input => uris::INPUT_PORT,
            Direction::Output => uris::OUTPUT_PORT,
        }
    }
}

/// Static description of one port of a block.
#[derive(Debug, Clone, PartialEq)]
pub struct PortInfo {
    pub symbol: &'static str,
    pub name: &'static str,
    pub kind: PortKind,
    pub direction: Direction,
    pub default: f32,
    pub min: f32,
    pub max: f32,
}

impl PortInfo {
    pub const fn new(symbol: &'static str, kind: PortKind, direction: Direction) -> Self {
        Self {
            symbol,
            name: symbol,
            kind,
            direction,
            default: 0.0,
            min: 0.0,
            max: 1.0,
        }
    }

    pub const fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub const fn range(mut self, default: f32, min: f32, max: f32) -> Self {
        self.default = default;
        self.min = min;
        self.max = max;
        self
    }
}

/// Port buffers of one voice, indexed like the block's ports.
pub struct BlockIo<'a> {
    buffers: &'a mut [BufferRef],
}

impl<'a> BlockIo<'a> {
    pub(crate) fn new(buffers: &'a mut [BufferRef]) -> Self {
        Self { buffers }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    #[inline]
    pub fn input(&self, port: usize) -> &Buffer {
        &self.buffers[port]
    }

    #[inline]
    pub fn output(&mut self, port: usize) -> &mut Buffer {
        &mut self.buffers[port]
    }

    /// Borrow an input and a distinct output at once.
    pub fn split(&mut self, input: usize, output: usize) -> (&Buffer, &mut Buffer) {
        assert_ne!(input, output, "input and output must differ");
        if input < output {
            let (lo, hi) = self.buffers.split_at_mut(output);
            (&lo[input], &mut hi[0])
        } else {
            let (lo, hi) = self.buffers.split_at_mut(input);
            (&hi[0], &mut lo[output])
        }
    }
}

/// One running instance of a block prototype (one voice).
pub trait PluginInstance: Send {
    fn num_ports(&self) -> usize;

    fn port(&self, index: usize) -> Option<PortInfo>;

    /// Process `ctx.nframes()` frames starting at `ctx.offset()`.
    ///
    /// Input buffers are already filled for the slice; output buffers of
    /// signal and sequence kind have been cleared. Realtime safe.
    fn run(&mut self, ctx: &RunContext, io: &mut BlockIo<'_>);

    /// Tell a new instance which of the block's `voices` it runs. Called
    /// once, before the first [`run`](Self::run).
    fn assign_voice(&mut self, _voice: usize, _voices: usize) {}
}

/// Failure to create a block instance.
#[derive(Debug, Error)]
pub enum InstantiateError {
    #[error("unknown prototype: {0}")]
    UnknownPrototype(String),

    #[error("failed to instantiate {prototype}: {reason}")]
    Failed { prototype: String, reason: String },
}

/// Creates block instances from prototype URIs.
pub trait BlockFactory: Send + Sync {
    /// Prototype URIs this factory knows.
    fn prototypes(&self) -> Vec<String>;

    fn instantiate(
        &self,
        prototype: &str,
        sample_rate: u32,
        block_length: usize,
    ) -> Result<Box<dyn PluginInstance>, InstantiateError>;
}

/// Blocks built into the engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct InternalFactory;

impl InternalFactory {
    pub const CONTROLLER: &'static str = "ens:internals/Controller";
    pub const DELAY: &'static str = "ens:internals/Delay";
    pub const NOTE: &'static str = "ens:internals/Note";
    pub const TRIGGER: &'static str = "ens:internals/Trigger";
}

impl BlockFactory for InternalFactory {
    fn prototypes(&self) -> Vec<String> {
        [Self::CONTROLLER, Self::DELAY, Self::NOTE, Self::TRIGGER]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn instantiate(
        &self,
        prototype: &str,
        sample_rate: u32,
        _block_length: usize,
    ) -> Result<Box<dyn PluginInstance>, InstantiateError> {
        match prototype {
            Self::CONTROLLER => Ok(Box::new(Controller::new())),
            Self::DELAY => Ok(Box::new(Delay::new(sample_rate))),
            Self::NOTE => Ok(Box::new(Note::new())),
            Self::TRIGGER => Ok(Box::new(Trigger::new())),
            other => Err(InstantiateError::UnknownPrototype(other.to_string())),
        }
    }
}

/// Tries each factory in turn; the first that knows the prototype wins.
#[derive(Clone, Default)]
pub struct FactoryChain {
    factories: Vec<Arc<dyn BlockFactory>>,
}

impl FactoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, factory: Arc<dyn BlockFactory>) {
        self.factories.push(factory);
    }

    pub fn with(mut self, factory: Arc<dyn BlockFactory>) -> Self {
        self.push(factory);
        self
    }
}

impl BlockFactory for FactoryChain {
    fn prototypes(&self) -> Vec<String> {
        self.factories.iter().flat_map(|f| f.prototypes()).collect()
    }

    fn instantiate(
        &self,
        prototype: &str,
        sample_rate: u32,
        block_length: usize,
    ) -> Result<Box<dyn PluginInstance>, InstantiateError> {
        for factory in &self.factories {
            match factory.instantiate(prototype, sample_rate, block_length) {
                Err(InstantiateError::UnknownPrototype(_)) => continue,
                other => return other,
            }
        }
        Err(InstantiateError::UnknownPrototype(prototype.to_string()))
    }
}

/// Port table of an instance.
pub(crate) fn port_infos(instance: &dyn PluginInstance) -> Vec<PortInfo> {
    (0..instance.num_ports())
        .filter_map(|i| instance.port(i))
        .collect()
}
