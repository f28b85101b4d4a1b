//! Headless render host.
//!
//! Reads [`protocol::HostCommand`]s from stdin, writes [`protocol::HostEvent`]s to stdout. Logs
//! go to stderr so stdout stays a clean message channel.

pub(crate) mod page;
pub(crate) mod protocol;
pub(crate) mod route;

use std::io::BufRead as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use crate::capture::mime::FfmpegEncoders;
use crate::capture::stream::FfmpegCaptureStream;
use crate::config::{ClockMode, SpinloopConfig};
use crate::foundation::error::SpinloopResult;
use crate::render::backend::{BackendKind, create_backend};
use page::{RecordPage, clock_for};
use protocol::{EventWriter, HostCommand, HostEvent, decode_command};

/// Serve navigation commands until `shutdown` or end of input.
///
/// Each navigation gets a fresh `backend` render surface sized to the scene canvas.
#[tracing::instrument(skip_all)]
pub fn run_host(
    cfg: &SpinloopConfig,
    clock: ClockMode,
    backend: BackendKind,
) -> SpinloopResult<()> {
    cfg.scene.validate()?;
    let events = EventWriter::stdout();
    let shutdown = Arc::new(AtomicBool::new(false));
    let commands = spawn_command_reader(Arc::clone(&shutdown), events.clone());

    let encoders = FfmpegEncoders::detect();
    tracing::info!(
        encoders = encoders.len(),
        ?clock,
        backend = backend.as_str(),
        "render host up"
    );

    while let Ok(cmd) = commands.recv() {
        match cmd {
            HostCommand::Shutdown => break,
            HostCommand::Navigate { url } => {
                let booted = create_backend(
                    backend,
                    cfg.scene.canvas,
                    cfg.scene.camera_tilt_deg,
                )
                .and_then(|renderer| {
                    RecordPage::boot(
                        &url,
                        &cfg.scene,
                        renderer,
                        FfmpegCaptureStream::new(),
                        Box::new(encoders.clone()),
                        events.clone(),
                    )
                });
                let result = booted.and_then(|mut page| {
                    let mut clock = clock_for(clock, cfg.scene.fps);
                    page.run(clock.as_mut(), &shutdown)
                });
                if let Err(e) = result {
                    tracing::error!(%url, error = %e, "page failed");
                    events.send(&HostEvent::Error {
                        message: e.to_string(),
                    })?;
                }
            }
        }
    }
    tracing::info!("render host exiting");
    Ok(())
}

/// Forward stdin commands to a channel. Raises `shutdown` on a shutdown command or end of input
/// so a running page stops at its next tick.
fn spawn_command_reader(
    shutdown: Arc<AtomicBool>,
    events: EventWriter,
) -> mpsc::Receiver<HostCommand> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match decode_command(&line) {
                Ok(cmd) => {
                    let stop = cmd == HostCommand::Shutdown;
                    if stop {
                        shutdown.store(true, Ordering::Relaxed);
                    }
                    if tx.send(cmd).is_err() || stop {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed command");
                    let _ = events.send(&HostEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
        }
        shutdown.store(true, Ordering::Relaxed);
        let _ = tx.send(HostCommand::Shutdown);
    });
    rx
}
