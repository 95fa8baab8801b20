//! Channel messages the note internals react to.

use ensemble_core::{types, Buffer};

/// Decoded messages kept per run before the rest are dropped.
pub const MAX_MESSAGES: usize = 128;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROLLER: u8 = 0xB0;
const CC_SUSTAIN: u8 = 0x40;
const CC_ALL_SOUNDS_OFF: u8 = 0x78;
const CC_ALL_NOTES_OFF: u8 = 0x7B;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    Sustain(bool),
    AllNotesOff,
}

impl MidiMessage {
    /// Decode a three-byte channel message. Anything else is `None`.
    pub fn parse(body: &[u8]) -> Option<Self> {
        let [status, data1, data2, ..] = *body else {
            return None;
        };
        let note = data1 & 0x7F;
        match status & 0xF0 {
            NOTE_ON if data2 == 0 => Some(Self::NoteOff { note }),
            NOTE_ON => Some(Self::NoteOn {
                note,
                velocity: data2 & 0x7F,
            }),
            NOTE_OFF => Some(Self::NoteOff { note }),
            CONTROLLER => match data1 {
                CC_SUSTAIN => Some(Self::Sustain(data2 > 63)),
                CC_ALL_NOTES_OFF | CC_ALL_SOUNDS_OFF => Some(Self::AllNotesOff),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Decode the MIDI events of `input` timed inside `[start, end)` into `out`.
///
/// Returns false if some were dropped because `out` was full.
pub fn collect(input: &Buffer, start: usize, end: usize, out: &mut Vec<(usize, MidiMessage)>) -> bool {
    out.clear();
    let mut complete = true;
    for event in input.events() {
        if event.atom_type != types::MIDI_EVENT {
            continue;
        }
        let frame = usize::try_from(event.time).unwrap_or(0);
        if frame < start || frame >= end {
            continue;
        }
        let Some(message) = MidiMessage::parse(event.body) else {
            continue;
        };
        if out.len() == out.capacity() {
            complete = false;
            break;
        }
        out.push((frame, message));
    }
    complete
}

/// Frequency in Hz of a note number, with note 57 at 440 Hz.
pub fn note_to_freq(note: u8) -> f32 {
    440.0 * 2.0f32.powf((f32::from(note) - 57.0) / 12.0)
}
