//! Variable delay line.

use crate::factory::{BlockIo, Direction, PluginInstance, PortInfo, PortKind};
use ensemble_core::RunContext;

/// Longest delay in seconds.
pub const MAX_DELAY_SECONDS: f32 = 8.0;

const INPUT: usize = 0;
const DELAY: usize = 1;
const OUTPUT: usize = 2;

const PORTS: [PortInfo; 3] = [
    PortInfo::new("in", PortKind::Audio, Direction::Input).named("In"),
    PortInfo::new("delay", PortKind::Control, Direction::Input)
        .named("Delay")
        .range(1.0, 0.0, MAX_DELAY_SECONDS),
    PortInfo::new("out", PortKind::Audio, Direction::Output).named("Out"),
];

/// Delays its input by the `delay` control, in seconds.
///
/// The history buffer is a power of two at least [`MAX_DELAY_SECONDS`] long
/// and is allocated at instantiation.
pub struct Delay {
    history: Box<[f32]>,
    mask: usize,
    write: usize,
    rate: f32,
}

impl Delay {
    pub fn new(sample_rate: u32) -> Self {
        let len = ((MAX_DELAY_SECONDS * sample_rate as f32) as usize)
            .max(2)
            .next_power_of_two();
        Self {
            history: vec![0.0; len].into_boxed_slice(),
            mask: len - 1,
            write: 0,
            rate: sample_rate as f32,
        }
    }

    fn delay_samples(&self, seconds: f32) -> usize {
        let samples = (seconds * self.rate).round().clamp(1.0, self.history.len() as f32 - 1.0);
        samples as usize
    }
}

impl PluginInstance for Delay {
    fn num_ports(&self) -> usize {
        PORTS.len()
    }

    fn port(&self, index: usize) -> Option<PortInfo> {
        PORTS.get(index).cloned()
    }

    fn run(&mut self, ctx: &RunContext, io: &mut BlockIo<'_>) {
        let delay = self.delay_samples(io.input(DELAY).value_at(0));
        let start = ctx.offset() as usize;
        let end = start + ctx.nframes() as usize;

        let (input, output) = io.split(INPUT, OUTPUT);
        let end = end.min(input.samples().len()).min(output.capacity());
        let out = output.samples_mut();
        for i in start..end {
            self.history[self.write & self.mask] = input.samples()[i];
            let read = self.write.wrapping_sub(delay) & self.mask;
            out[i] = self.history[read];
            self.write = self.write.wrapping_add(1);
        }
    }
}
