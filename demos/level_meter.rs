//! Level meter example.
//!
//! Taps the default input device through a voice effect, plays the result
//! back, and draws the mouth-opening level as a bar until Ctrl+C.
//!
//! Run with: cargo run --example level_meter -- [natural|deep|high|radio] [device name]
//!
//! Set `RUST_LOG=voice_tap=debug` to see graph wiring and session events.

use std::io::Write;

use tracing_subscriber::EnvFilter;
use voice_tap::host::{CpalHost, DeviceSelection};
use voice_tap::{list_input_devices, CaptureEvent, CaptureManager, VoiceEffect};

const BAR_WIDTH: usize = 40;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "voice_tap=info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = std::env::args().skip(1);
    let effect: VoiceEffect = match args.next() {
        Some(name) => name.parse()?,
        None => VoiceEffect::Natural,
    };
    let selection = match args.next() {
        Some(name) => DeviceSelection::ByName(name),
        None => DeviceSelection::DefaultInput,
    };

    println!("Input devices:");
    for name in list_input_devices()? {
        println!("  {name}");
    }

    let manager = CaptureManager::builder()
        .host(CpalHost::new(selection))
        .voice_effect(effect)
        .on_event(|event| match event {
            CaptureEvent::BufferOverflow { dropped_frames } => {
                eprintln!("\nwarning: dropped {dropped_frames} frames");
            }
            CaptureEvent::SessionStopped { reason } => eprintln!("\nstopped: {reason:?}"),
            other => tracing::debug!(?other, "capture event"),
        })
        .build()?;

    if let Err(e) = manager.start().await {
        eprintln!("{}", manager.status());
        return Err(e.into());
    }
    println!("Live with the {effect} voice. Press Ctrl+C to stop.");

    let mut snapshots = manager.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if !snapshot.is_live {
                    break;
                }
                let filled = (snapshot.volume * BAR_WIDTH as f32).round() as usize;
                print!(
                    "\r[{}{}] {:.2}",
                    "#".repeat(filled),
                    " ".repeat(BAR_WIDTH - filled.min(BAR_WIDTH)),
                    snapshot.volume
                );
                std::io::stdout().flush()?;
            }
        }
    }

    manager.stop();
    println!("\n{}", manager.status());
    Ok(())
}
