//! Encoding negotiation.
//!
//! Candidates are mime strings in priority order (`video/webm;codecs=vp9`, ...). Each one maps to
//! a container plus an `ffmpeg` encoder; the first candidate whose encoder the local `ffmpeg`
//! offers wins. When nothing matches, [`FALLBACK_MIME`] is used without probing.

use std::collections::BTreeSet;
use std::process::{Command, Stdio};

pub const FALLBACK_MIME: &str = "video/webm";

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    WebM,
    Mp4,
    Matroska,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Mp4 => "mp4",
            Self::Matroska => "mkv",
        }
    }

    /// `ffmpeg -f` muxer name.
    pub fn muxer(self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Mp4 => "mp4",
            Self::Matroska => "matroska",
        }
    }

    /// Extra muxer flags needed to write the container to a non-seekable pipe.
    pub fn streaming_flags(self) -> &'static [&'static str] {
        match self {
            Self::Mp4 => &["-movflags", "frag_keyframe+empty_moov+default_base_moof"],
            Self::WebM | Self::Matroska => &[],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    Vp9,
    Vp8,
    H264,
}

impl VideoCodec {
    pub fn encoder(self) -> &'static str {
        match self {
            Self::Vp9 => "libvpx-vp9",
            Self::Vp8 => "libvpx",
            Self::H264 => "libx264",
        }
    }

    /// Rate control tuned for a short, high-quality capture.
    pub fn encoder_args(self) -> &'static [&'static str] {
        match self {
            Self::Vp9 => &[
                "-b:v", "0", "-crf", "30", "-deadline", "realtime", "-cpu-used", "8", "-row-mt",
                "1",
            ],
            Self::Vp8 => &[
                "-b:v", "8M", "-crf", "10", "-deadline", "realtime", "-cpu-used", "8",
            ],
            Self::H264 => &["-preset", "veryfast", "-crf", "18"],
        }
    }
}

/// A negotiated encoding: the mime string reported to observers plus how to produce it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodingProfile {
    pub mime_type: String,
    pub container: Container,
    pub codec: VideoCodec,
}

/// Map a mime string to an encoding profile. Matching ignores case and whitespace.
pub fn profile_for_mime(mime: &str) -> Option<EncodingProfile> {
    let normalized: String = mime
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    let (essence, params) = match normalized.split_once(';') {
        Some((e, p)) => (e, Some(p)),
        None => (normalized.as_str(), None),
    };
    let codecs = params.and_then(|p| p.strip_prefix("codecs=")).map(|c| c.trim_matches('"'));

    let (container, codec) = match (essence, codecs) {
        ("video/webm", Some("vp9" | "vp09")) => (Container::WebM, VideoCodec::Vp9),
        ("video/webm", Some("vp8") | None) => (Container::WebM, VideoCodec::Vp8),
        ("video/mp4", Some("avc1" | "h264") | None) => (Container::Mp4, VideoCodec::H264),
        ("video/x-matroska", Some("avc1" | "h264") | None) => {
            (Container::Matroska, VideoCodec::H264)
        }
        _ => return None,
    };
    Some(EncodingProfile {
        mime_type: mime.trim().to_owned(),
        container,
        codec,
    })
}

/// File extension for an artifact of the given mime type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    profile_for_mime(mime).map_or("bin", |p| p.container.extension())
}

/// Whether an `ffmpeg` encoder is usable on this machine.
pub trait EncoderSupport {
    fn supports(&self, encoder: &str) -> bool;
}

/// Encoder names reported by `ffmpeg -encoders`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FfmpegEncoders {
    names: BTreeSet<String>,
}

impl FfmpegEncoders {
    /// Ask the system `ffmpeg` which encoders it has. A missing `ffmpeg` yields an empty set.
    pub fn detect() -> Self {
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(out) if out.status.success() => {
                Self::from_listing(&String::from_utf8_lossy(&out.stdout))
            }
            Ok(out) => {
                tracing::warn!(status = %out.status, "ffmpeg -encoders failed");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "ffmpeg not available for encoder probing");
                Self::default()
            }
        }
    }

    /// Parse the encoder table; rows look like ` V....D libvpx-vp9   libvpx VP9`.
    pub fn from_listing(listing: &str) -> Self {
        let names = listing
            .lines()
            .filter_map(|line| {
                let mut cols = line.split_whitespace();
                let flags = cols.next()?;
                let name = cols.next()?;
                let is_row = flags.len() == 6 && flags.starts_with(['V', 'A', 'S']);
                (is_row && name != "=").then(|| name.to_owned())
            })
            .collect();
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl EncoderSupport for FfmpegEncoders {
    fn supports(&self, encoder: &str) -> bool {
        self.names.contains(encoder)
    }
}

/// Pick the first supported candidate, or fall back to [`FALLBACK_MIME`].
pub fn negotiate(candidates: &[String], support: &dyn EncoderSupport) -> EncodingProfile {
    for candidate in candidates {
        let Some(profile) = profile_for_mime(candidate) else {
            tracing::debug!(mime = %candidate, "unknown mime candidate");
            continue;
        };
        if support.supports(profile.codec.encoder()) {
            return profile;
        }
        tracing::debug!(mime = %candidate, encoder = profile.codec.encoder(), "encoder unavailable");
    }
    tracing::warn!(fallback = FALLBACK_MIME, "no mime candidate supported; using fallback");
    EncodingProfile {
        mime_type: FALLBACK_MIME.to_owned(),
        container: Container::WebM,
        codec: VideoCodec::Vp8,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/capture/mime.rs"]
mod tests;
