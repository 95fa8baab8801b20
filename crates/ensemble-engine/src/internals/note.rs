//! MIDI note to CV converter with voice allocation.

use super::midi::{self, MidiMessage, MAX_MESSAGES};
use crate::factory::{BlockIo, Direction, PluginInstance, PortInfo, PortKind};
use ensemble_core::RunContext;

const INPUT: usize = 0;
const FREQUENCY: usize = 1;
const NUMBER: usize = 2;
const VELOCITY: usize = 3;
const GATE: usize = 4;
const TRIGGER: usize = 5;

const OUTPUTS: [usize; 5] = [FREQUENCY, NUMBER, VELOCITY, GATE, TRIGGER];

const PORTS: [PortInfo; 6] = [
    PortInfo::new("input", PortKind::Atom, Direction::Input).named("Input"),
    PortInfo::new("frequency", PortKind::Cv, Direction::Output)
        .named("Frequency")
        .range(440.0, 16.0, 25088.0),
    PortInfo::new("number", PortKind::Cv, Direction::Output)
        .named("Number")
        .range(0.0, 0.0, 127.0),
    PortInfo::new("velocity", PortKind::Cv, Direction::Output)
        .named("Velocity")
        .range(0.0, 0.0, 1.0),
    PortInfo::new("gate", PortKind::Cv, Direction::Output)
        .named("Gate")
        .range(0.0, 0.0, 1.0),
    PortInfo::new("trigger", PortKind::Cv, Direction::Output)
        .named("Trigger")
        .range(0.0, 0.0, 1.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Off,
    /// Held and sounding on a voice.
    Assigned(usize),
    /// Held, but its voice was stolen.
    Unassigned,
}

#[derive(Debug, Clone, Copy)]
struct Key {
    state: KeyState,
    time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Free,
    Active,
    /// Released while the sustain pedal is down.
    Holding,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: VoiceState,
    note: u8,
    time: u64,
}

const FREE: Slot = Slot {
    state: VoiceState::Free,
    note: 0,
    time: 0,
};

/// Assigns held keys to a fixed set of voices.
///
/// New notes take the first free voice, or steal the oldest one. When a
/// voice frees up it goes to the newest key still held without a voice,
/// keeping its gate high.
#[derive(Debug, Clone)]
pub struct Allocator {
    keys: [Key; 128],
    voices: Vec<Slot>,
    sustain: bool,
    clock: u64,
}

impl Allocator {
    pub fn new(voices: usize) -> Self {
        Self {
            keys: [Key {
                state: KeyState::Off,
                time: 0,
            }; 128],
            voices: vec![FREE; voices],
            sustain: false,
            clock: 0,
        }
    }

    pub fn voice_state(&self, voice: usize) -> Option<VoiceState> {
        self.voices.get(voice).map(|slot| slot.state)
    }

    /// Voice sounding `note`, if any.
    pub fn voice_of(&self, note: u8) -> Option<usize> {
        match self.keys.get(note as usize)?.state {
            KeyState::Assigned(voice) => Some(voice),
            _ => None,
        }
    }

    /// Apply `message`, reporting every output change as
    /// `(voice, port, value)`.
    pub fn handle(&mut self, message: MidiMessage, emit: &mut impl FnMut(usize, usize, f32)) {
        match message {
            MidiMessage::NoteOn { note, velocity } => self.note_on(note, velocity, emit),
            MidiMessage::NoteOff { note } => self.note_off(note, emit),
            MidiMessage::Sustain(true) => self.sustain = true,
            MidiMessage::Sustain(false) => {
                self.sustain = false;
                for voice in 0..self.voices.len() {
                    if self.voices[voice].state == VoiceState::Holding {
                        self.free_voice(voice, emit);
                    }
                }
            }
            MidiMessage::AllNotesOff => {
                for (voice, slot) in self.voices.iter_mut().enumerate() {
                    *slot = FREE;
                    emit(voice, GATE, 0.0);
                }
                for key in &mut self.keys {
                    key.state = KeyState::Off;
                }
            }
        }
    }

    fn note_on(&mut self, note: u8, velocity: u8, emit: &mut impl FnMut(usize, usize, f32)) {
        let key = note as usize;
        if self.keys[key].state != KeyState::Off {
            return;
        }
        let free = self.voices.iter().position(|slot| slot.state == VoiceState::Free);
        let oldest = || {
            self.voices
                .iter()
                .enumerate()
                .min_by_key(|(_, slot)| slot.time)
                .map(|(voice, _)| voice)
        };
        let Some(voice) = free.or_else(oldest) else {
            return;
        };

        let stolen = self.voices[voice];
        if stolen.state == VoiceState::Active {
            self.keys[stolen.note as usize].state = KeyState::Unassigned;
        }

        self.clock += 1;
        self.keys[key] = Key {
            state: KeyState::Assigned(voice),
            time: self.clock,
        };
        self.voices[voice] = Slot {
            state: VoiceState::Active,
            note,
            time: self.clock,
        };

        emit(voice, FREQUENCY, midi::note_to_freq(note));
        emit(voice, NUMBER, f32::from(note));
        emit(voice, VELOCITY, f32::from(velocity) / 127.0);
        emit(voice, GATE, 1.0);
        emit(voice, TRIGGER, 1.0);
    }

    fn note_off(&mut self, note: u8, emit: &mut impl FnMut(usize, usize, f32)) {
        let key = note as usize;
        if let KeyState::Assigned(voice) = self.keys[key].state {
            let slot = self.voices[voice];
            if slot.state == VoiceState::Active && slot.note == note {
                if self.sustain {
                    self.voices[voice].state = VoiceState::Holding;
                } else {
                    self.free_voice(voice, emit);
                }
            }
        }
        self.keys[key].state = KeyState::Off;
    }

    /// Hand `voice` to the newest voiceless key, or silence it.
    fn free_voice(&mut self, voice: usize, emit: &mut impl FnMut(usize, usize, f32)) {
        let waiting = (0..self.keys.len())
            .filter(|&key| self.keys[key].state == KeyState::Unassigned)
            .max_by_key(|&key| self.keys[key].time);

        let Some(key) = waiting else {
            self.voices[voice].state = VoiceState::Free;
            emit(voice, GATE, 0.0);
            return;
        };

        let previous = self.voices[voice].note as usize;
        if self.keys[previous].state == KeyState::Assigned(voice) {
            self.keys[previous].state = KeyState::Unassigned;
        }
        self.keys[key].state = KeyState::Assigned(voice);
        // key < 128
        let note = key as u8;
        self.voices[voice].note = note;
        self.voices[voice].state = VoiceState::Active;
        emit(voice, FREQUENCY, midi::note_to_freq(note));
        emit(voice, NUMBER, f32::from(note));
    }
}

/// Turns MIDI notes into frequency, velocity, gate and trigger signals.
///
/// Every voice of a polyphonic block runs the same allocator over the same
/// input and writes only the outputs of its own voice, so feed the input
/// from a mono source.
pub struct Note {
    voice: usize,
    allocator: Allocator,
    /// Output levels carried from one run to the next.
    held: [f32; PORTS.len()],
    messages: Vec<(usize, MidiMessage)>,
}

impl Note {
    pub fn new() -> Self {
        let mut held = [0.0; PORTS.len()];
        held[FREQUENCY] = PORTS[FREQUENCY].default;
        Self {
            voice: 0,
            allocator: Allocator::new(1),
            held,
            messages: Vec::with_capacity(MAX_MESSAGES),
        }
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }
}

impl Default for Note {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginInstance for Note {
    fn num_ports(&self) -> usize {
        PORTS.len()
    }

    fn port(&self, index: usize) -> Option<PortInfo> {
        PORTS.get(index).cloned()
    }

    fn assign_voice(&mut self, voice: usize, voices: usize) {
        self.voice = voice;
        self.allocator = Allocator::new(voices.max(1));
    }

    fn run(&mut self, ctx: &RunContext, io: &mut BlockIo<'_>) {
        let start = ctx.offset() as usize;
        let end = start + ctx.nframes() as usize;
        if !midi::collect(io.input(INPUT), start, end, &mut self.messages) {
            ctx.report_error("note: MIDI events dropped");
        }

        for port in OUTPUTS {
            io.output(port).set_block(self.held[port], start, end);
        }

        let Self {
            voice,
            allocator,
            held,
            messages,
        } = self;
        for &(frame, message) in messages.iter() {
            allocator.handle(message, &mut |v, port, value| {
                if v != *voice {
                    return;
                }
                if port == TRIGGER {
                    if let Some(sample) = io.output(TRIGGER).samples_mut().get_mut(frame) {
                        *sample = value;
                    }
                } else {
                    held[port] = value;
                    io.output(port).set_block(value, frame, end);
                }
            });
        }
    }
}
