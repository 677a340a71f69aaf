// src/midi_io.rs

use crate::command::EngineCommand;
use anyhow::{Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use std::sync::mpsc::Sender;

/// The four event kinds the core dispatcher understands, translated from
/// raw MIDI bytes by the status nibble.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MidiEvent {
    NoteOn { key: i32, velocity: u8 },
    NoteOff { key: i32 },
    ControlChange { cc: u8, value: u8 },
    PitchBend { value: i16 },
}

pub fn parse_midi_bytes(bytes: &[u8]) -> Option<MidiEvent> {
    if bytes.len() < 2 {
        return None;
    }
    let status = bytes[0] & 0xF0;
    match status {
        0x90 if bytes.len() >= 3 => {
            let key = bytes[1] as i32;
            let velocity = bytes[2];
            if velocity == 0 {
                Some(MidiEvent::NoteOff { key })
            } else {
                Some(MidiEvent::NoteOn { key, velocity })
            }
        }
        0x80 if bytes.len() >= 3 => Some(MidiEvent::NoteOff {
            key: bytes[1] as i32,
        }),
        0xB0 if bytes.len() >= 3 => Some(MidiEvent::ControlChange {
            cc: bytes[1],
            value: bytes[2],
        }),
        0xE0 if bytes.len() >= 3 => {
            let raw = ((bytes[2] as i32) << 7) | bytes[1] as i32;
            Some(MidiEvent::PitchBend {
                value: (raw - 8192) as i16,
            })
        }
        _ => None,
    }
}

fn event_to_command(event: MidiEvent) -> EngineCommand {
    match event {
        MidiEvent::NoteOn { key, velocity } => EngineCommand::NoteOn { key, velocity },
        MidiEvent::NoteOff { key } => EngineCommand::NoteOff { key },
        MidiEvent::ControlChange { cc, value } => EngineCommand::ControlChange { cc, value },
        MidiEvent::PitchBend { value } => EngineCommand::PitchBend { value },
    }
}

pub fn list_ports() -> Result<Vec<(String, MidiInputPort)>> {
    let midi_in = MidiInput::new("polysampler-list")?;
    let ports = midi_in.ports();
    let mut result = Vec::new();
    for port in ports {
        let name = midi_in
            .port_name(&port)
            .unwrap_or_else(|_| "<unnamed>".to_string());
        result.push((name, port));
    }
    Ok(result)
}

pub fn connect(
    port: &MidiInputPort,
    sender: Sender<EngineCommand>,
) -> Result<MidiInputConnection<()>> {
    let midi_in = MidiInput::new("polysampler-input")?;
    let port_name = midi_in.port_name(port).unwrap_or_default();
    midi_in
        .connect(
            port,
            "polysampler-input-port",
            move |_stamp, bytes, _| {
                if let Some(event) = parse_midi_bytes(bytes) {
                    if sender.send(event_to_command(event)).is_err() {
                        eprintln!("midi event dropped: engine command queue closed");
                    }
                }
            },
            (),
        )
        .map_err(|e| anyhow::anyhow!("failed to connect to MIDI port: {e}"))
        .context(port_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_note_on() {
        assert_eq!(
            parse_midi_bytes(&[0x90, 60, 100]),
            Some(MidiEvent::NoteOn {
                key: 60,
                velocity: 100
            })
        );
    }

    #[test]
    fn note_on_with_zero_velocity_is_note_off() {
        assert_eq!(
            parse_midi_bytes(&[0x90, 60, 0]),
            Some(MidiEvent::NoteOff { key: 60 })
        );
    }

    #[test]
    fn parses_control_change() {
        assert_eq!(
            parse_midi_bytes(&[0xB0, 7, 64]),
            Some(MidiEvent::ControlChange { cc: 7, value: 64 })
        );
    }

    #[test]
    fn parses_pitch_bend_centered_as_zero() {
        assert_eq!(
            parse_midi_bytes(&[0xE0, 0, 64]),
            Some(MidiEvent::PitchBend { value: 0 })
        );
    }
}
