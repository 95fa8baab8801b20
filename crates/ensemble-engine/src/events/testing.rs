//! Shared fixtures for event tests.

use super::{pre_process, Outcome, PreContext};
use crate::factory::{
    BlockFactory, BlockIo, Direction, FactoryChain, InstantiateError, InternalFactory,
    PluginInstance, PortInfo, PortKind,
};
use crate::runtime::{GraphRuntime, NotifyKeys};
use crate::store::Store;
use ensemble_core::{
    notification_channel, uris, Atom, AtomicFlag, BufferFactory, Context, Path, Properties, RtErrors,
    RunContext, Uri,
};
use ensemble_protocol::Message;
use std::sync::Arc;

pub const SOURCE: &str = "test:Source";
pub const GAIN: &str = "test:Gain";
pub const BROKEN: &str = "test:Broken";

const SOURCE_PORTS: [PortInfo; 2] = [
    PortInfo::new("level", PortKind::Control, Direction::Input).range(0.0, -1.0e3, 1.0e3),
    PortInfo::new("out", PortKind::Audio, Direction::Output),
];

const GAIN_PORTS: [PortInfo; 3] = [
    PortInfo::new("in", PortKind::Audio, Direction::Input),
    PortInfo::new("gain", PortKind::Control, Direction::Input).range(1.0, 0.0, 10.0),
    PortInfo::new("out", PortKind::Audio, Direction::Output),
];

/// Outputs its `level` control as a constant signal.
pub struct Source;

impl PluginInstance for Source {
    fn num_ports(&self) -> usize {
        SOURCE_PORTS.len()
    }

    fn port(&self, index: usize) -> Option<PortInfo> {
        SOURCE_PORTS.get(index).cloned()
    }

    fn run(&mut self, ctx: &RunContext, io: &mut BlockIo<'_>) {
        let level = io.input(0).value_at(0);
        let start = ctx.offset() as usize;
        io.output(1).set_block(level, start, start + ctx.nframes() as usize);
    }
}

/// Multiplies `in` by `gain`.
pub struct Gain;

impl PluginInstance for Gain {
    fn num_ports(&self) -> usize {
        GAIN_PORTS.len()
    }

    fn port(&self, index: usize) -> Option<PortInfo> {
        GAIN_PORTS.get(index).cloned()
    }

    fn run(&mut self, ctx: &RunContext, io: &mut BlockIo<'_>) {
        let gain = io.input(1).value_at(0);
        let start = ctx.offset() as usize;
        let end = start + ctx.nframes() as usize;
        let (input, output) = io.split(0, 2);
        let samples = input.samples();
        for (i, out) in output.samples_mut()[start..end].iter_mut().enumerate() {
            *out = samples[start + i] * gain;
        }
    }
}

pub struct TestFactory;

impl BlockFactory for TestFactory {
    fn prototypes(&self) -> Vec<String> {
        vec![SOURCE.into(), GAIN.into(), BROKEN.into()]
    }

    fn instantiate(
        &self,
        prototype: &str,
        _sample_rate: u32,
        _block_length: usize,
    ) -> Result<Box<dyn PluginInstance>, InstantiateError> {
        match prototype {
            SOURCE => Ok(Box::new(Source)),
            GAIN => Ok(Box::new(Gain)),
            BROKEN => Err(InstantiateError::Failed {
                prototype: prototype.into(),
                reason: "always fails".into(),
            }),
            other => Err(InstantiateError::UnknownPrototype(other.into())),
        }
    }
}

pub struct Fixture {
    pub store: Store,
    pub factory: FactoryChain,
    pub buffers: BufferFactory,
    pub keys: NotifyKeys,
    pub ctx: RunContext,
}

impl Fixture {
    pub fn new() -> Self {
        let root = Properties::new().with(uris::TYPE, Atom::uri(uris::GRAPH));
        let (notifier, _reader) = notification_channel(16);
        let mut ctx = RunContext::new(0, 48000, notifier, Arc::new(RtErrors::default()));
        ctx.locate(0, 64);
        Self {
            store: Store::new(Arc::new(GraphRuntime::new()), root),
            factory: FactoryChain::new()
                .with(Arc::new(TestFactory))
                .with(Arc::new(InternalFactory)),
            buffers: BufferFactory::new(64, 1024, 16),
            keys: NotifyKeys {
                value: 100,
                activity: 101,
                monitor_all: Arc::new(AtomicFlag::new(false)),
            },
            ctx,
        }
    }

    pub fn apply(&mut self, msg: &Message) -> Outcome {
        let mut pre = PreContext {
            store: &mut self.store,
            factory: &self.factory,
            buffers: &self.buffers,
            sample_rate: 48000,
            contexts: 1,
            keys: self.keys.clone(),
        };
        pre_process(&mut pre, msg)
    }

    /// Pre-process and execute, returning the prepared event.
    pub fn run(&mut self, msg: &Message) -> Outcome {
        let mut prepared = self.apply(msg)?;
        prepared.plan.execute(&self.ctx);
        Ok(prepared)
    }

    /// Apply each message of `inverse` in order, returning the messages
    /// that undo the replay.
    pub fn replay(&mut self, inverse: &[Message]) -> Vec<Message> {
        let mut redo = Vec::new();
        for msg in inverse {
            let prepared = self.run(msg).expect("inverse applies");
            redo.push(prepared.inverse);
        }
        redo.into_iter().rev().flatten().collect()
    }

    pub fn props(&self, at: &str) -> &Properties {
        &self.store.get(&path(at)).expect("object exists").properties
    }
}

pub fn path(s: &str) -> Path {
    Path::new(s).expect("valid path")
}

pub fn put(at: &str, properties: Properties) -> Message {
    Message::Put {
        seq: 1,
        uri: Uri::from(at),
        properties,
        ctx: Context::Default,
    }
}

pub fn put_block(at: &str, prototype: &str) -> Message {
    put(
        at,
        Properties::new()
            .with(uris::TYPE, Atom::uri(uris::BLOCK))
            .with(uris::PROTOTYPE, Atom::uri(prototype)),
    )
}

pub fn put_graph(at: &str) -> Message {
    put(at, Properties::new().with(uris::TYPE, Atom::uri(uris::GRAPH)))
}

pub fn put_port(at: &str, direction: &str, kind: &str) -> Message {
    put(
        at,
        Properties::new()
            .with(uris::TYPE, Atom::uri(direction))
            .with(uris::TYPE, Atom::uri(kind)),
    )
}

pub fn connect(tail: &str, head: &str) -> Message {
    Message::Connect {
        seq: 1,
        tail: path(tail),
        head: path(head),
    }
}

pub fn disconnect(tail: &str, head: &str) -> Message {
    Message::Disconnect {
        seq: 1,
        tail: path(tail),
        head: path(head),
    }
}

pub fn set(subject: &str, key: &str, value: Atom) -> Message {
    Message::SetProperty {
        seq: 1,
        subject: Uri::from(subject),
        key: Uri::from(key),
        value,
        ctx: Context::Default,
    }
}
