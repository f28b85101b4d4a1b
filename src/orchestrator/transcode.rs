//! Secondary H.264/MP4 rendition of the primary artifact.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::capture::stream::is_ffmpeg_on_path;
use crate::config::TranscodeConfig;
use crate::foundation::error::{SpinloopError, SpinloopResult};

/// Sibling path for the transcoded file.
pub fn transcode_target(primary: &Path) -> PathBuf {
    let is_mp4 = primary
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
    if is_mp4 {
        let stem = primary
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        primary.with_file_name(format!("{stem}.h264.mp4"))
    } else {
        primary.with_extension("mp4")
    }
}

pub fn transcode_args(input: &Path, output: &Path, cfg: &TranscodeConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(input.as_os_str().to_owned());
    for a in [
        "-c:v",
        "libx264",
        "-preset",
        cfg.preset.as_str(),
        "-crf",
        &cfg.crf.to_string(),
        "-pix_fmt",
        "yuv420p",
        "-movflags",
        "+faststart",
        "-an",
    ] {
        args.push(OsString::from(a));
    }
    args.push(output.as_os_str().to_owned());
    args
}

/// Transcode `primary` into an MP4 next to it and return the new path.
#[tracing::instrument(skip_all, fields(primary = %primary.display()))]
pub fn transcode_to_mp4(primary: &Path, cfg: &TranscodeConfig) -> SpinloopResult<PathBuf> {
    if !is_ffmpeg_on_path() {
        return Err(SpinloopError::transcode(
            "ffmpeg is required for transcoding, but was not found on PATH",
        ));
    }
    let output = transcode_target(primary);
    let result = Command::new("ffmpeg")
        .args(transcode_args(primary, &output, cfg))
        .stdin(Stdio::null())
        .output()
        .map_err(|e| SpinloopError::transcode(format!("failed to spawn ffmpeg: {e}")))?;
    if !result.status.success() {
        let _ = std::fs::remove_file(&output);
        return Err(SpinloopError::transcode(format!(
            "ffmpeg exited with status {}: {}",
            result.status,
            String::from_utf8_lossy(&result.stderr).trim()
        )));
    }
    tracing::info!(output = %output.display(), "transcoded");
    Ok(output)
}

#[cfg(test)]
#[path = "../../tests/unit/orchestrator/transcode.rs"]
mod tests;
