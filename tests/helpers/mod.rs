//! Test helpers and fixtures for ensemble integration tests
//!
//! Every test drives the engine by hand: requests go in through a session,
//! [`Harness::flush`] runs cycles until they are answered, and audio is read
//! back from root output ports. No audio device is involved.
//!
//! ## Tolerance Levels
//!
//! - `FLOAT_EPSILON` (1e-6): exact operations (passthrough, unity gain, sums)

#![allow(dead_code)]

use ensemble::prelude::*;
use ensemble::Seq;
use std::sync::Once;

/// Floating point rounding errors (for passthrough, exact gain).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Standard cycle size for deterministic testing
pub const TEST_BLOCK_LENGTH: u32 = 64;

pub const SOURCE: &str = "test:Source";
pub const GAIN: &str = "test:Gain";

static TRACING: Once = Once::new();

/// Route `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

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
struct Source;

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
struct Gain;

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

pub struct TestPlugins;

impl BlockFactory for TestPlugins {
    fn prototypes(&self) -> Vec<String> {
        vec![SOURCE.into(), GAIN.into()]
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
            other => Err(InstantiateError::UnknownPrototype(other.into())),
        }
    }
}

/// An engine with one session and one registered broadcast listener.
pub struct Harness {
    pub engine: Engine,
    pub session: Arc<EngineInterface>,
    /// Responses and replies to `session`.
    pub inbox: Mailbox,
    /// Everything broadcast to registered clients.
    pub monitor: Mailbox,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    pub fn with_threads(num_threads: usize) -> Self {
        init_tracing();
        let engine = EngineBuilder::new()
            .block_length(TEST_BLOCK_LENGTH)
            .num_threads(num_threads)
            .factory(Arc::new(TestPlugins))
            .build()
            .expect("Failed to create test engine");

        let (respondee, inbox) = ChannelClient::new("test:session");
        let session = engine.interface(Some(Arc::new(respondee)));
        let (listener, monitor) = ChannelClient::new("test:monitor");
        engine.register_client(Arc::new(listener));
        Self {
            engine,
            session,
            inbox,
            monitor,
        }
    }

    /// Run until every request so far has been answered.
    pub fn flush(&self) {
        self.engine.flush().expect("flush");
    }

    /// One full cycle plus post-processing.
    pub fn cycle(&self) {
        self.engine.run_cycle(TEST_BLOCK_LENGTH).expect("cycle");
        self.engine.post_process();
    }

    /// Flush, then return the status of request `seq`.
    pub fn status(&self, seq: Seq) -> Status {
        self.flush();
        self.inbox
            .drain()
            .into_iter()
            .find_map(|msg| match msg {
                Message::Response { id, status, .. } if id == seq => Some(status),
                _ => None,
            })
            .expect("request was answered")
    }

    pub fn exists(&self, at: &str) -> bool {
        self.engine.contains(&path(at))
    }

    pub fn props(&self, at: &str) -> Properties {
        self.engine.properties(&path(at)).expect("object exists")
    }

    /// Samples of root output port `index` from the last cycle.
    pub fn output(&self, index: usize) -> Vec<f32> {
        let mut out = vec![0.0; TEST_BLOCK_LENGTH as usize];
        let n = self.engine.read_output(index, &mut out).expect("output port");
        out.truncate(n);
        out
    }

    pub fn add_block(&self, at: &str, prototype: &str) -> Seq {
        self.session.put(at, block(prototype), Context::Default)
    }

    pub fn add_port(&self, at: &str, direction: &str, kind: &str) -> Seq {
        self.session.put(at, port(direction, kind), Context::Default)
    }

    pub fn connect(&self, tail: &str, head: &str) -> Seq {
        self.session.connect(path(tail), path(head))
    }

    pub fn set_value(&self, at: &str, value: f32) -> Seq {
        self.session
            .set_property(at, uris::VALUE, Atom::float(value), Context::Default)
    }
}

pub fn path(s: &str) -> Path {
    Path::new(s).expect("valid path")
}

pub fn block(prototype: &str) -> Properties {
    Properties::new()
        .with(uris::TYPE, Atom::uri(uris::BLOCK))
        .with(uris::PROTOTYPE, Atom::uri(prototype))
}

pub fn graph() -> Properties {
    Properties::new().with(uris::TYPE, Atom::uri(uris::GRAPH))
}

pub fn port(direction: &str, kind: &str) -> Properties {
    Properties::new()
        .with(uris::TYPE, Atom::uri(direction))
        .with(uris::TYPE, Atom::uri(kind))
}

/// `/src` (Source) into `/amp` (Gain) into root audio output `/out`.
pub fn build_chain(h: &Harness, level: f32, gain: f32) {
    h.add_block("/src", SOURCE);
    h.add_block("/amp", GAIN);
    h.add_port("/out", uris::OUTPUT_PORT, uris::AUDIO_PORT);
    h.connect("/src/out", "/amp/in");
    h.connect("/amp/out", "/out");
    h.set_value("/src/level", level);
    h.set_value("/amp/gain", gain);
    h.flush();
    h.inbox.drain();
    h.monitor.drain();
}
