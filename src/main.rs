//! keybus demo: a simulated module wired to the host's audio output,
//! playing a short scripted sequence on its own key panel.

use std::error::Error;
use std::thread;
use std::time::Duration;

use kb_audio::CpalSink;
use kb_core::{Waveform, SAMPLE_RATE};
use kb_module::sim::{FixedJoystick, LogDisplay, LoopbackBus, SimPanel};
use kb_module::{ModuleConfig, ModuleHardware, SynthModule};
use simple_logger::SimpleLogger;

fn main() {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .unwrap();

    if let Err(e) = run() {
        eprintln!("keybus demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let (panel, matrix) = SimPanel::new();
    // The stream half stays on this thread; dropping it ends playback.
    let (sink, _stream) = CpalSink::new(SAMPLE_RATE)?;

    let hw = ModuleHardware {
        matrix: Box::new(matrix),
        joystick: Box::new(FixedJoystick::centered()),
        display: Box::new(LogDisplay::new()),
        sink: Box::new(sink),
    };
    let module = SynthModule::start(ModuleConfig::default(), hw, |completion, inbound| {
        Box::new(LoopbackBus::new(completion, inbound))
    })?;

    log::info!("playing arpeggio (sawtooth)");
    play_arpeggio(&panel);

    log::info!("switching to piano voices");
    module.controls().set_waveform(Waveform::Piano);
    play_chord(&panel);

    thread::sleep(Duration::from_secs(2));
    module.stop();
    Ok(())
}

fn play_arpeggio(panel: &SimPanel) {
    for &note in &[0usize, 4, 7, 11, 7, 4, 0] {
        panel.press_key(note);
        thread::sleep(Duration::from_millis(250));
        panel.release_key(note);
        thread::sleep(Duration::from_millis(50));
    }
}

fn play_chord(panel: &SimPanel) {
    for &note in &[0usize, 4, 7] {
        panel.press_key(note);
        thread::sleep(Duration::from_millis(60));
    }
    thread::sleep(Duration::from_millis(400));
    for &note in &[0usize, 4, 7] {
        panel.release_key(note);
    }
}
