//! Asynchronous scene resource loading.
//!
//! Each resource loads on its own thread and is polled without blocking once per render tick,
//! so the render loop never waits on IO.

use std::io::Read as _;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::host::route::AssetSource;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch the raw bytes of a resource.
pub fn fetch_bytes(source: &AssetSource) -> SpinloopResult<Vec<u8>> {
    match source {
        AssetSource::File(path) => std::fs::read(path).map_err(|e| {
            SpinloopError::asset(format!("failed to read '{}': {e}", path.display()))
        }),
        AssetSource::Http(url) => {
            let resp = ureq::get(url)
                .timeout(FETCH_TIMEOUT)
                .call()
                .map_err(|e| SpinloopError::asset(format!("GET {url} failed: {e}")))?;
            let mut bytes = Vec::new();
            resp.into_reader()
                .read_to_end(&mut bytes)
                .map_err(|e| SpinloopError::asset(format!("GET {url}: body read failed: {e}")))?;
            Ok(bytes)
        }
    }
}

enum PendingState<T> {
    Loading(Receiver<SpinloopResult<T>>),
    Loaded(T),
    Failed,
}

/// A resource that is loading in the background.
pub struct PendingAsset<T> {
    label: &'static str,
    state: PendingState<T>,
}

impl<T: Send + 'static> PendingAsset<T> {
    /// Fetch `source` on a background thread and parse it with `parse`.
    pub fn spawn(
        label: &'static str,
        source: AssetSource,
        parse: fn(&[u8]) -> SpinloopResult<T>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            tracing::debug!(asset = label, %source, "loading");
            let result = fetch_bytes(&source).and_then(|bytes| parse(&bytes));
            // The page may already be gone; nothing to report to.
            let _ = tx.send(result);
        });
        Self {
            label,
            state: PendingState::Loading(rx),
        }
    }

    /// An already-loaded resource.
    pub fn ready(label: &'static str, value: T) -> Self {
        Self {
            label,
            state: PendingState::Loaded(value),
        }
    }

    /// Wrap an externally driven load; the value arrives whenever the sender delivers it.
    pub fn from_channel(label: &'static str, rx: Receiver<SpinloopResult<T>>) -> Self {
        Self {
            label,
            state: PendingState::Loading(rx),
        }
    }

    /// Non-blocking check. Returns the value once loaded; a failed load is reported once as an
    /// error and stays failed afterwards.
    pub fn poll(&mut self) -> SpinloopResult<Option<&T>> {
        if let PendingState::Loading(rx) = &self.state {
            match rx.try_recv() {
                Ok(Ok(value)) => {
                    tracing::debug!(asset = self.label, "loaded");
                    self.state = PendingState::Loaded(value);
                }
                Ok(Err(e)) => {
                    self.state = PendingState::Failed;
                    return Err(e);
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => {
                    self.state = PendingState::Failed;
                    return Err(SpinloopError::asset(format!(
                        "{} loader stopped without a result",
                        self.label
                    )));
                }
            }
        }
        match &self.state {
            PendingState::Loaded(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    pub fn get(&self) -> Option<&T> {
        match &self.state {
            PendingState::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/assets.rs"]
mod tests;
