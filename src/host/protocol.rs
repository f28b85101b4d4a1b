//! Line-delimited JSON messages between the orchestrator and the render host.
//!
//! Commands travel on the host's stdin, events on its stdout, one JSON object per line.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::delivery::{DeliveryNotice, DeliveryObserver};
use crate::foundation::error::{SpinloopError, SpinloopResult};

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    Navigate { url: String },
    Shutdown,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    Loaded {
        url: String,
    },
    CanvasReady {
        width: u32,
        height: u32,
    },
    SceneReady {
        angle: f64,
        frame: u64,
    },
    FullRevolution {
        angle: f64,
        frame: u64,
    },
    RecordingStarted {
        mime_type: String,
        target_frame_count: u64,
    },
    Delivered {
        notice: DeliveryNotice,
    },
    Error {
        message: String,
    },
}

impl HostEvent {
    /// Short name used in logs and timeout messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Loaded { .. } => "loaded",
            Self::CanvasReady { .. } => "canvas_ready",
            Self::SceneReady { .. } => "scene_ready",
            Self::FullRevolution { .. } => "full_revolution",
            Self::RecordingStarted { .. } => "recording_started",
            Self::Delivered { .. } => "delivered",
            Self::Error { .. } => "error",
        }
    }
}

pub fn encode_line<T: serde::Serialize>(msg: &T) -> SpinloopResult<String> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_command(line: &str) -> SpinloopResult<HostCommand> {
    serde_json::from_str(line.trim())
        .map_err(|e| SpinloopError::protocol(format!("bad host command '{}': {e}", line.trim())))
}

pub fn decode_event(line: &str) -> SpinloopResult<HostEvent> {
    serde_json::from_str(line.trim()).map_err(|e| {
        SpinloopError::protocol(format!("bad host event '{}': {e}", truncate(line.trim(), 120)))
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

/// Shared, line-atomic writer for host events.
#[derive(Clone)]
pub struct EventWriter {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl EventWriter {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    pub fn send(&self, event: &HostEvent) -> SpinloopResult<()> {
        let line = encode_line(event)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| SpinloopError::protocol("event writer lock poisoned"))?;
        out.write_all(line.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| SpinloopError::protocol(format!("failed to write host event: {e}")))?;
        tracing::debug!(event = event.kind(), "event sent");
        Ok(())
    }
}

impl DeliveryObserver for EventWriter {
    fn notify(&mut self, notice: &DeliveryNotice) -> SpinloopResult<()> {
        self.send(&HostEvent::Delivered {
            notice: notice.clone(),
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/host/protocol.rs"]
mod tests;
