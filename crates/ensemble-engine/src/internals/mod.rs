//! Blocks implemented inside the engine.

mod controller;
mod delay;
mod midi;
mod note;
mod trigger;

pub use controller::Controller;
pub use delay::Delay;
pub use midi::{note_to_freq, MidiMessage};
pub use note::{Allocator, Note, VoiceState};
pub use trigger::Trigger;
