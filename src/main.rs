// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use polysampler::command::EngineCommand;
use polysampler::config::EngineDefaults;
use polysampler::decode::HoundDecoder;
use polysampler::engine::Engine;
use polysampler::library::Library;
use polysampler::{audio_io, config, midi_io};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;

const LIBRARY_SAMPLE_RATE: u32 = 48_000;

#[derive(Parser, Debug)]
#[command(name = "polysampler", about = "Polyphonic, velocity-layered multi-sample engine")]
struct Cli {
    /// Directory containing defaults.json, optional tuning.json, and samples/.
    sample_dir: Option<PathBuf>,

    /// MIDI input port name to connect to; omit to run with MIDI disabled.
    #[arg(long)]
    midi_port: Option<String>,

    /// Output audio device name; omit to use the host default.
    #[arg(long)]
    output_device: Option<String>,

    /// Path to a MIDI CC mapping file (JSON list of bindings).
    #[arg(long)]
    midi_mapping: Option<PathBuf>,

    #[arg(long)]
    list_devices: bool,

    #[arg(long)]
    list_midi_ports: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_devices {
        for name in audio_io::list_output_devices()? {
            println!("{name}");
        }
        return Ok(());
    }
    if cli.list_midi_ports {
        for (name, _) in midi_io::list_ports()? {
            println!("{name}");
        }
        return Ok(());
    }

    let sample_dir = cli.sample_dir.context(
        "a sample directory is required unless --list-devices/--list-midi-ports is given",
    )?;

    let defaults_path = sample_dir.join("defaults.json");
    let defaults = if defaults_path.exists() {
        EngineDefaults::load(&defaults_path)?
    } else {
        eprintln!(
            "no defaults.json found at {}, using built-in defaults",
            defaults_path.display()
        );
        EngineDefaults::default()
    };
    let polyphony = defaults.polyphony;
    let rr_borrow = defaults.rr_borrow;
    let crop_thresh = defaults.crop_thresh;
    let rms_time = defaults.rms_time;
    let controls = defaults.into_controls();

    let tuning_path = sample_dir.join("tuning.json");
    let tuning = if tuning_path.exists() {
        config::load_tuning_file(&tuning_path)?
    } else {
        Default::default()
    };

    let samples_path = sample_dir.join("samples");
    println!("loading sample library from {}", samples_path.display());
    let library = Library::build(
        &samples_path,
        &HoundDecoder,
        &tuning,
        LIBRARY_SAMPLE_RATE,
        crop_thresh,
        rms_time,
        rr_borrow,
        polyphony,
    )?;
    println!(
        "library loaded: {} of 128 keys populated",
        library.keys.iter().filter(|k| k.is_some()).count()
    );

    let mut cc_table = polysampler::controls::CcTable::new();
    if let Some(mapping_path) = &cli.midi_mapping {
        for binding in config::load_midi_mapping_file(mapping_path)? {
            cc_table.set(binding)?;
        }
    }

    let (device, device_config, sample_format) =
        audio_io::resolve_output_device(cli.output_device.as_deref())
            .context("resolving audio output device")?;
    let host_rate = device_config.sample_rate.0;

    let (tx, rx) = mpsc::channel::<EngineCommand>();
    let engine = Engine::new(
        library,
        controls,
        cc_table,
        rx,
        host_rate,
        LIBRARY_SAMPLE_RATE,
    );

    let stream = audio_io::start_output_stream(&device, &device_config, sample_format, engine)
        .context("starting audio output stream")?;
    println!("audio output running at {host_rate} Hz");

    let _midi_connection = if let Some(port_name) = &cli.midi_port {
        let ports = midi_io::list_ports()?;
        let port = ports
            .iter()
            .find(|(name, _)| name == port_name)
            .map(|(_, p)| p.clone())
            .context("requested MIDI port not found")?;
        println!("connecting to MIDI port '{port_name}'");
        Some(midi_io::connect(&port, tx.clone())?)
    } else {
        eprintln!("no --midi-port given; running with MIDI input disabled");
        None
    };

    println!("ready. type 'Name=value' to set a parameter, or 'quit' to exit.");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        if tx
            .send(EngineCommand::SetParameter {
                line: line.to_string(),
            })
            .is_err()
        {
            break;
        }
    }

    drop(stream);
    Ok(())
}
