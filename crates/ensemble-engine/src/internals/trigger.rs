//! Single-note trigger.

use super::midi::{self, MidiMessage, MAX_MESSAGES};
use crate::factory::{BlockIo, Direction, PluginInstance, PortInfo, PortKind};
use ensemble_core::RunContext;

const INPUT: usize = 0;
const NOTE: usize = 1;
const GATE: usize = 2;
const TRIGGER: usize = 3;
const VELOCITY: usize = 4;

const PORTS: [PortInfo; 5] = [
    PortInfo::new("input", PortKind::Atom, Direction::Input).named("Input"),
    PortInfo::new("note", PortKind::Control, Direction::Input)
        .named("Note")
        .range(60.0, 0.0, 127.0),
    PortInfo::new("gate", PortKind::Cv, Direction::Output)
        .named("Gate")
        .range(0.0, 0.0, 1.0),
    PortInfo::new("trigger", PortKind::Cv, Direction::Output)
        .named("Trigger")
        .range(0.0, 0.0, 1.0),
    PortInfo::new("velocity", PortKind::Cv, Direction::Output)
        .named("Velocity")
        .range(0.0, 0.0, 1.0),
];

/// Raises `gate` and pulses `trigger` while the note set on `note` is held.
#[derive(Debug)]
pub struct Trigger {
    gate: f32,
    velocity: f32,
    messages: Vec<(usize, MidiMessage)>,
}

impl Trigger {
    pub fn new() -> Self {
        Self {
            gate: 0.0,
            velocity: 0.0,
            messages: Vec::with_capacity(MAX_MESSAGES),
        }
    }

    /// The note selected by a `note` control value, if it names one.
    fn selected(value: f32) -> Option<u8> {
        let note = value.round();
        (0.0..=127.0).contains(&note).then_some(note as u8)
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginInstance for Trigger {
    fn num_ports(&self) -> usize {
        PORTS.len()
    }

    fn port(&self, index: usize) -> Option<PortInfo> {
        PORTS.get(index).cloned()
    }

    fn run(&mut self, ctx: &RunContext, io: &mut BlockIo<'_>) {
        let start = ctx.offset() as usize;
        let end = start + ctx.nframes() as usize;
        let selected = Self::selected(io.input(NOTE).value_at(0));
        if !midi::collect(io.input(INPUT), start, end, &mut self.messages) {
            ctx.report_error("trigger: MIDI events dropped");
        }

        io.output(GATE).set_block(self.gate, start, end);
        io.output(TRIGGER).set_block(0.0, start, end);
        io.output(VELOCITY).set_block(self.velocity, start, end);

        for &(frame, message) in &self.messages {
            match message {
                MidiMessage::NoteOn { note, velocity } if Some(note) == selected => {
                    self.gate = 1.0;
                    self.velocity = f32::from(velocity) / 127.0;
                    io.output(GATE).set_block(1.0, frame, end);
                    io.output(VELOCITY).set_block(self.velocity, frame, end);
                    io.output(TRIGGER).set_block(1.0, frame, frame + 1);
                }
                MidiMessage::NoteOff { note } if Some(note) == selected => {
                    self.gate = 0.0;
                    io.output(GATE).set_block(0.0, frame, end);
                }
                MidiMessage::AllNotesOff => {
                    self.gate = 0.0;
                    io.output(GATE).set_block(0.0, frame, end);
                }
                _ => {}
            }
        }
    }
}
