//! Artifact Delivery.
//!
//! Hands a finished recording to whoever is waiting for it: the local save action, an external
//! observer (the orchestrator, over the host's message channel), and any registered `on_ready`
//! consumers. The save always happens; a session is complete only once both the save and the
//! signal went out. A [`Delivery`] fires at most once.

use std::path::{Path, PathBuf};

use base64::Engine as _;

use crate::capture::mime::extension_for_mime;
use crate::capture::stream::ensure_parent_dir;
use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::scene::readiness::OneShot;

/// File name stem used when no save path is configured.
pub const FALLBACK_SAVE_STEM: &str = "spinloop-capture";

/// Host download location: the user's download directory, else `$TMPDIR/spinloop-downloads`.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| std::env::temp_dir().join("spinloop-downloads"))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Send the encoded bytes to the observer.
    #[default]
    Inline,
    /// Send only the descriptor; the saved file is the artifact.
    DirectSave,
}

/// A finished recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Artifact {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}

/// Completion descriptor sent to the observer.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeliveryNotice {
    pub completed: bool,
    pub size: u64,
    pub mime_type: String,
    /// Base64 (standard alphabet) artifact bytes, present for inline delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_path: Option<PathBuf>,
}

/// Something waiting for the delivery notice.
pub trait DeliveryObserver: Send {
    fn notify(&mut self, notice: &DeliveryNotice) -> SpinloopResult<()>;
}

pub type OnReady = Box<dyn FnMut(&Artifact) + Send>;

pub struct Delivery {
    mode: DeliveryMode,
    save_path: Option<PathBuf>,
    download_dir: PathBuf,
    observer: Option<Box<dyn DeliveryObserver>>,
    on_ready: Vec<OnReady>,
    fired: OneShot,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("mode", &self.mode)
            .field("save_path", &self.save_path)
            .field("download_dir", &self.download_dir)
            .field("observer", &self.observer.is_some())
            .field("on_ready", &self.on_ready.len())
            .field("fired", &self.fired)
            .finish()
    }
}

impl Delivery {
    pub fn new(mode: DeliveryMode, save_path: Option<PathBuf>) -> Self {
        Self {
            mode,
            save_path,
            download_dir: default_download_dir(),
            observer: None,
            on_ready: Vec::new(),
            fired: OneShot::Pending,
        }
    }

    /// Directory for the save action when no explicit save path is set.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn DeliveryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Register a local consumer that receives the artifact on the delivery event.
    pub fn on_ready(&mut self, consumer: impl FnMut(&Artifact) + Send + 'static) {
        self.on_ready.push(Box::new(consumer));
    }

    pub fn has_fired(&self) -> bool {
        self.fired.is_fired()
    }

    /// Deliver `artifact`. Returns `Ok(None)` when this delivery already fired.
    #[tracing::instrument(skip_all, fields(size = artifact.size(), mime = %artifact.mime_type))]
    pub fn deliver(&mut self, artifact: &Artifact) -> SpinloopResult<Option<DeliveryNotice>> {
        if !self.fired.fire() {
            tracing::warn!("delivery already fired; ignoring");
            return Ok(None);
        }

        let save_to = match &self.save_path {
            Some(path) => path.clone(),
            None => fallback_save_path(&self.download_dir, &artifact.mime_type),
        };
        save_artifact(&save_to, &artifact.bytes)?;
        tracing::info!(path = %save_to.display(), "artifact saved");

        for consumer in &mut self.on_ready {
            consumer(artifact);
        }

        let notice = DeliveryNotice {
            completed: true,
            size: artifact.size(),
            mime_type: artifact.mime_type.clone(),
            payload: match self.mode {
                DeliveryMode::Inline => Some(encode_payload(&artifact.bytes)),
                DeliveryMode::DirectSave => None,
            },
            saved_path: Some(save_to),
        };
        match self.observer.as_mut() {
            Some(observer) => observer.notify(&notice)?,
            None => tracing::info!("no observer attached; local save only"),
        }
        Ok(Some(notice))
    }
}

/// `<dir>/spinloop-capture.<ext>`.
pub fn fallback_save_path(dir: &Path, mime_type: &str) -> PathBuf {
    dir.join(format!(
        "{FALLBACK_SAVE_STEM}.{}",
        extension_for_mime(mime_type)
    ))
}

pub fn encode_payload(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode an inline notice's payload and check it against the announced size.
pub fn decode_payload(notice: &DeliveryNotice) -> SpinloopResult<Vec<u8>> {
    if !notice.completed {
        return Err(SpinloopError::delivery("delivery notice is not completed"));
    }
    let payload = notice
        .payload
        .as_deref()
        .ok_or_else(|| SpinloopError::delivery("delivery notice carries no payload"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| SpinloopError::delivery(format!("payload is not valid base64: {e}")))?;
    if bytes.len() as u64 != notice.size {
        return Err(SpinloopError::delivery(format!(
            "payload size mismatch: notice says {} bytes, decoded {}",
            notice.size,
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn save_artifact(path: &Path, bytes: &[u8]) -> SpinloopResult<()> {
    ensure_parent_dir(path)?;
    std::fs::write(path, bytes).map_err(|e| {
        SpinloopError::delivery(format!("failed to write '{}': {e}", path.display()))
    })
}

#[cfg(test)]
#[path = "../tests/unit/delivery.rs"]
mod tests;
