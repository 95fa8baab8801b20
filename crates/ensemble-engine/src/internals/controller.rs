//! MIDI controller to control-value converter.

use crate::factory::{BlockIo, Direction, PluginInstance, PortInfo, PortKind};
use ensemble_core::{types, RunContext};

const INPUT: usize = 0;
const CONTROLLER: usize = 1;
const LOGARITHMIC: usize = 2;
const MINIMUM: usize = 3;
const MAXIMUM: usize = 4;
const OUTPUT: usize = 5;

const PORTS: [PortInfo; 6] = [
    PortInfo::new("input", PortKind::Atom, Direction::Input).named("Input"),
    PortInfo::new("controller", PortKind::Control, Direction::Input)
        .named("Controller")
        .range(0.0, 0.0, 127.0),
    PortInfo::new("logarithmic", PortKind::Control, Direction::Input)
        .named("Logarithmic")
        .range(0.0, 0.0, 1.0),
    PortInfo::new("minimum", PortKind::Control, Direction::Input)
        .named("Minimum")
        .range(0.0, -1.0e6, 1.0e6),
    PortInfo::new("maximum", PortKind::Control, Direction::Input)
        .named("Maximum")
        .range(1.0, -1.0e6, 1.0e6),
    PortInfo::new("output", PortKind::Control, Direction::Output).named("Output"),
];

/// Maps one MIDI continuous controller onto `[minimum, maximum]`.
///
/// The output holds the last mapped value until the next matching event.
#[derive(Debug, Default)]
pub struct Controller;

impl Controller {
    pub fn new() -> Self {
        Self
    }

    /// Map a 7-bit controller value onto the configured range.
    pub fn scale(value: u8, min: f32, max: f32, logarithmic: bool) -> f32 {
        let normal = value as f32 / 127.0;
        if logarithmic {
            let offset = if min < 0.0 { min.abs() } else { 0.0 };
            let lo = (min + 1.0 + offset).ln();
            let hi = (max + 1.0 + offset).ln();
            (normal * (hi - lo) + lo).exp() - 1.0 - offset
        } else {
            normal * (max - min) + min
        }
    }
}

impl PluginInstance for Controller {
    fn num_ports(&self) -> usize {
        PORTS.len()
    }

    fn port(&self, index: usize) -> Option<PortInfo> {
        PORTS.get(index).cloned()
    }

    fn run(&mut self, _ctx: &RunContext, io: &mut BlockIo<'_>) {
        let number = io.input(CONTROLLER).value_at(0);
        let logarithmic = io.input(LOGARITHMIC).value_at(0) > 0.0;
        let min = io.input(MINIMUM).value_at(0);
        let max = io.input(MAXIMUM).value_at(0);

        let mut latest = None;
        for event in io.input(INPUT).events() {
            let body = event.body;
            if event.atom_type != types::MIDI_EVENT || body.len() < 3 {
                continue;
            }
            if body[0] & 0xF0 == 0xB0 && f32::from(body[1]) == number {
                latest = Some(Self::scale(body[2], min, max, logarithmic));
            }
        }

        if let Some(value) = latest {
            io.output(OUTPUT).samples_mut()[0] = value;
        }
    }
}
