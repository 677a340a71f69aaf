// src/command.rs

use crate::controls::CcBinding;
use crate::library::Library;

/// Everything the MIDI thread and management thread can ask the audio
/// thread to do. Sent over an mpsc channel and drained at the top of the
/// mix callback. `SwapLibrary` carries ownership of a freshly built library
/// so the handoff on the audio thread is a single move, never a partial
/// view.
pub enum EngineCommand {
    NoteOn { key: i32, velocity: u8 },
    NoteOff { key: i32 },
    ControlChange { cc: u8, value: u8 },
    PitchBend { value: i16 },
    SetParameter { line: String },
    BindCc(CcBinding),
    SwapLibrary(Box<Library>),
    Mute(bool),
}
