//! Capture streams turn rendered frames into encoded chunks.
//!
//! A stream is started once, fed one frame per render tick, and asked to stop once. Encoded
//! bytes come back asynchronously as [`StreamEvent::Chunk`]s in the order the encoder produced
//! them, followed by exactly one terminal event (`Stopped` or `Failed`) from the stream itself.
//! Callers must still tolerate seeing the terminal signal more than once.

use std::io::{Read, Write as _};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::JoinHandle;

use crate::capture::mime::EncodingProfile;
use crate::foundation::core::{Canvas, Fps};
use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::foundation::math::mul_div255_u16;
use crate::render::backend::FrameRGBA;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Inactive,
    Recording,
    Stopping,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(Vec<u8>),
    Stopped,
    Failed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopping,
    /// The stream was not recording; nothing happened.
    NotRecording(StreamState),
}

/// Parameters fixed when a stream starts.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamConfig {
    pub canvas: Canvas,
    pub fps: Fps,
    pub profile: EncodingProfile,
    /// Straight-alpha background used to flatten translucent pixels.
    pub bg_rgba: [u8; 4],
}

pub trait CaptureStream: Send {
    fn start(&mut self, cfg: &StreamConfig) -> SpinloopResult<()>;
    fn push_frame(&mut self, frame: &FrameRGBA) -> SpinloopResult<()>;
    fn request_stop(&mut self) -> StopOutcome;
    fn state(&self) -> StreamState;
    /// Drain events that arrived since the last call, without blocking.
    fn poll_events(&mut self) -> Vec<StreamEvent>;
}

/// Stream that pipes raw frames through the system `ffmpeg` and reads the muxed output back
/// from its stdout.
pub struct FfmpegCaptureStream {
    state: StreamState,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    chunks: Option<Receiver<std::io::Result<Vec<u8>>>>,
    stdout_drain: Option<JoinHandle<()>>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    cfg: Option<StreamConfig>,
    scratch: Vec<u8>,
}

impl Default for FfmpegCaptureStream {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCaptureStream {
    pub fn new() -> Self {
        Self {
            state: StreamState::Inactive,
            child: None,
            stdin: None,
            chunks: None,
            stdout_drain: None,
            stderr_drain: None,
            cfg: None,
            scratch: Vec::new(),
        }
    }

    fn build_command(cfg: &StreamConfig) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.canvas.width, cfg.canvas.height),
            "-r",
            &cfg.fps.ffmpeg_rate(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            cfg.profile.codec.encoder(),
        ]);
        cmd.args(cfg.profile.codec.encoder_args());
        cmd.args(["-pix_fmt", "yuv420p", "-f", cfg.profile.container.muxer()]);
        cmd.args(cfg.profile.container.streaming_flags());
        cmd.arg("pipe:1");
        cmd
    }

    /// Wait for the encoder after its output ended and report how it went.
    fn reap(&mut self) -> StreamEvent {
        self.state = StreamState::Stopped;
        if let Some(handle) = self.stdout_drain.take() {
            let _ = handle.join();
        }
        let Some(mut child) = self.child.take() else {
            return StreamEvent::Failed("ffmpeg capture stream not started".to_owned());
        };
        let status = match child.wait() {
            Ok(status) => status,
            Err(e) => return StreamEvent::Failed(format!("failed to wait for ffmpeg: {e}")),
        };
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => match handle.join() {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => format!("ffmpeg stderr read failed: {e}").into_bytes(),
                Err(_) => b"ffmpeg stderr drain thread panicked".to_vec(),
            },
            None => Vec::new(),
        };
        if status.success() {
            StreamEvent::Stopped
        } else {
            StreamEvent::Failed(format!(
                "ffmpeg exited with status {}: {}",
                status,
                String::from_utf8_lossy(&stderr_bytes).trim()
            ))
        }
    }
}

impl CaptureStream for FfmpegCaptureStream {
    fn start(&mut self, cfg: &StreamConfig) -> SpinloopResult<()> {
        if self.state != StreamState::Inactive {
            return Err(SpinloopError::capture("capture stream already started"));
        }
        cfg.canvas.validate()?;
        if !is_ffmpeg_on_path() {
            return Err(SpinloopError::capture(
                "ffmpeg is required for capture, but was not found on PATH",
            ));
        }

        let mut child = Self::build_command(cfg).spawn().map_err(|e| {
            SpinloopError::capture(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SpinloopError::capture("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpinloopError::capture("failed to open ffmpeg stdout (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SpinloopError::capture("failed to open ffmpeg stderr (unexpected)"))?;

        // Single writer, append-only: chunks reach the receiver in the order ffmpeg wrote them.
        let (tx, rx) = mpsc::channel();
        let stdout_drain = std::thread::spawn(move || {
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        tracing::info!(
            mime = %cfg.profile.mime_type,
            encoder = cfg.profile.codec.encoder(),
            width = cfg.canvas.width,
            height = cfg.canvas.height,
            fps = %cfg.fps.ffmpeg_rate(),
            "capture stream started"
        );

        self.scratch = vec![0u8; cfg.canvas.byte_len()];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.chunks = Some(rx);
        self.stdout_drain = Some(stdout_drain);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg.clone());
        self.state = StreamState::Recording;
        Ok(())
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> SpinloopResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| SpinloopError::capture("capture stream not started"))?;
        if frame.width != cfg.canvas.width || frame.height != cfg.canvas.height {
            return Err(SpinloopError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.canvas.width, cfg.canvas.height
            )));
        }
        if frame.data.len() != self.scratch.len() {
            return Err(SpinloopError::validation(
                "frame.data size mismatch with width*height*4",
            ));
        }

        flatten_to_opaque_rgba8(
            &mut self.scratch,
            &frame.data,
            frame.premultiplied,
            cfg.bg_rgba,
        )?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(SpinloopError::capture("capture stream is no longer recording"));
        };
        stdin.write_all(&self.scratch).map_err(|e| {
            SpinloopError::capture(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn request_stop(&mut self) -> StopOutcome {
        if self.state != StreamState::Recording {
            return StopOutcome::NotRecording(self.state);
        }
        // Closing stdin lets ffmpeg flush the encoder and finish the container.
        drop(self.stdin.take());
        self.state = StreamState::Stopping;
        StopOutcome::Stopping
    }

    fn state(&self) -> StreamState {
        self.state
    }

    fn poll_events(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let Some(rx) = self.chunks.as_ref() else {
            return events;
        };
        let mut ended = false;
        loop {
            match rx.try_recv() {
                Ok(Ok(chunk)) => events.push(StreamEvent::Chunk(chunk)),
                Ok(Err(e)) => {
                    events.push(StreamEvent::Failed(format!("ffmpeg stdout read failed: {e}")));
                    ended = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    ended = true;
                    break;
                }
            }
        }
        if ended {
            self.chunks = None;
            let premature = self.state == StreamState::Recording;
            drop(self.stdin.take());
            let terminal = self.reap();
            if !matches!(events.last(), Some(StreamEvent::Failed(_))) {
                events.push(match terminal {
                    StreamEvent::Stopped if premature => StreamEvent::Failed(
                        "ffmpeg closed its output before a stop was requested".to_owned(),
                    ),
                    other => other,
                });
            }
        }
        events
    }
}

impl Drop for FfmpegCaptureStream {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Flatten RGBA8 (premultiplied or straight) over an opaque background.
pub(crate) fn flatten_to_opaque_rgba8(
    dst: &mut [u8],
    src: &[u8],
    src_is_premul: bool,
    bg_rgba: [u8; 4],
) -> SpinloopResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(SpinloopError::validation(
            "flatten_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = bg_rgba[0] as u16;
    let bg_g = bg_rgba[1] as u16;
    let bg_b = bg_rgba[2] as u16;

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = s[3] as u16;
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }

        let inv = 255u16 - a;
        let (r, g, b) = if src_is_premul {
            (
                s[0] as u16 + mul_div255_u16(bg_r, inv),
                s[1] as u16 + mul_div255_u16(bg_g, inv),
                s[2] as u16 + mul_div255_u16(bg_b, inv),
            )
        } else {
            (
                mul_div255_u16(s[0] as u16, a) + mul_div255_u16(bg_r, inv),
                mul_div255_u16(s[1] as u16, a) + mul_div255_u16(bg_g, inv),
                mul_div255_u16(s[2] as u16, a) + mul_div255_u16(bg_b, inv),
            )
        };

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> SpinloopResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/capture/stream.rs"]
mod tests;
