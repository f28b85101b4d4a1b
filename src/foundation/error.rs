use std::time::Duration;

/// Result alias used across the crate.
pub type SpinloopResult<T> = Result<T, SpinloopError>;

/// Error taxonomy for the capture pipeline.
///
/// Every fatal variant ends an orchestrated run with a non-zero exit. `Transcode` is the only
/// variant the orchestrator downgrades to a warning.
#[derive(thiserror::Error, Debug)]
pub enum SpinloopError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("asset error: {0}")]
    Asset(String),

    #[error("capture error: {0}")]
    Capture(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("build error: {0}")]
    Build(String),

    #[error("launch error: {0}")]
    Launch(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("timeout after {}ms waiting for {condition}{}", .after.as_millis(), .hint.map(|h| format!(" ({h})")).unwrap_or_default())]
    Timeout {
        condition: String,
        after: Duration,
        hint: Option<&'static str>,
    },

    #[error("transcode error: {0}")]
    Transcode(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpinloopError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    pub fn build(msg: impl Into<String>) -> Self {
        Self::Build(msg.into())
    }

    pub fn launch(msg: impl Into<String>) -> Self {
        Self::Launch(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn timeout(condition: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            condition: condition.into(),
            after,
            hint: None,
        }
    }

    pub fn timeout_with_hint(
        condition: impl Into<String>,
        after: Duration,
        hint: &'static str,
    ) -> Self {
        Self::Timeout {
            condition: condition.into(),
            after,
            hint: Some(hint),
        }
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Return `true` for errors produced by an expired wait.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for SpinloopError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
