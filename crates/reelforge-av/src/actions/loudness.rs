//! Two-pass EBU R128 loudness normalization, in place.
//!
//! Pass one runs `loudnorm` in analysis mode and prints a JSON measurement
//! block at the end of ffmpeg's diagnostic output. Pass two feeds those
//! measurements back for a linear correction, writing a temporary file beside
//! the original which then replaces it.

use std::path::Path;

use reelforge_common::config::LoudnessConfig;
use reelforge_common::{Error, Result};
use serde::Deserialize;

use super::{ffmpeg, run_with_progress};
use crate::process::ProcessRunner;
use crate::tools::ToolRegistry;

/// First-pass measurements printed by `loudnorm=print_format=json`.
///
/// ffmpeg prints every value as a JSON string.
#[derive(Debug, Clone, Deserialize)]
pub struct LoudnormMeasurement {
    pub input_i: String,
    pub input_tp: String,
    pub input_lra: String,
    pub input_thresh: String,
    pub target_offset: String,
}

impl LoudnormMeasurement {
    fn check(&self) -> Result<()> {
        for (name, value) in [
            ("input_i", &self.input_i),
            ("input_tp", &self.input_tp),
            ("input_lra", &self.input_lra),
            ("input_thresh", &self.input_thresh),
            ("target_offset", &self.target_offset),
        ] {
            let parsed: f64 = value.trim().parse().map_err(|_| {
                Error::stage("level-audio", format!("{name} is not a number: {value:?}"))
            })?;
            if !parsed.is_finite() {
                return Err(Error::stage(
                    "level-audio",
                    format!("{name} is {value}; the input is probably silent"),
                ));
            }
        }
        Ok(())
    }
}

/// Extract the measurement block from pass-one diagnostic lines.
///
/// The block is the last `{` ... `}` run of lines.
pub fn parse_loudnorm_json(lines: &[String]) -> Result<LoudnormMeasurement> {
    let start = lines
        .iter()
        .rposition(|l| l.trim() == "{")
        .ok_or_else(|| Error::stage("level-audio", "loudnorm printed no measurement"))?;
    let end = lines[start..]
        .iter()
        .position(|l| l.trim() == "}")
        .map(|i| start + i)
        .ok_or_else(|| Error::stage("level-audio", "loudnorm measurement is truncated"))?;

    let json = lines[start..=end].join("\n");
    let measurement: LoudnormMeasurement = serde_json::from_str(&json)?;
    measurement.check()?;
    Ok(measurement)
}

fn audio_codec_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "pcm_s16le",
        Some("flac") => "flac",
        Some("mp3") => "libmp3lame",
        _ => "aac",
    }
}

/// Normalize the loudness of `path` in place.
pub async fn level_audio(
    runner: &ProcessRunner,
    tools: &ToolRegistry,
    path: &Path,
    target: &LoudnessConfig,
    sample_rate: u32,
    on_progress: impl FnMut(u8),
) -> Result<LoudnormMeasurement> {
    if !path.is_file() {
        return Err(Error::precondition(format!(
            "{} is not a file",
            path.display()
        )));
    }

    let targets = format!(
        "I={}:TP={}:LRA={}",
        target.integrated, target.true_peak, target.loudness_range
    );

    // Pass 1: measure.
    tracing::info!("Measuring loudness of {}", path.display());
    let mut cmd = ffmpeg(tools)?;
    cmd.arg("-i").path_arg(path);
    cmd.args(["-map", "0:a:0", "-af"]);
    cmd.arg(format!("loudnorm={targets}:print_format=json"));
    cmd.args(["-f", "null", "-"]);

    let mut lines = Vec::new();
    runner
        .run_with_lines(&cmd, |line| lines.push(line.to_string()))
        .await?;
    let measured = parse_loudnorm_json(&lines)?;
    tracing::info!(
        "Measured {} LUFS integrated, {} dBTP peak, {} LU range",
        measured.input_i,
        measured.input_tp,
        measured.input_lra
    );

    // Pass 2: correct into a temp file beside the original.
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let temp = tempfile::Builder::new()
        .prefix(".reelforge-level-")
        .suffix(&suffix)
        .tempfile_in(dir)?
        .into_temp_path();

    let mut cmd = ffmpeg(tools)?;
    cmd.arg("-i").path_arg(path);
    cmd.args(["-map", "0:v?", "-map", "0:a:0", "-c:v", "copy", "-af"]);
    cmd.arg(format!(
        "loudnorm={targets}:measured_I={}:measured_TP={}:measured_LRA={}:measured_thresh={}:offset={}:linear=true:print_format=summary",
        measured.input_i.trim(),
        measured.input_tp.trim(),
        measured.input_lra.trim(),
        measured.input_thresh.trim(),
        measured.target_offset.trim(),
    ));
    cmd.args(["-c:a", audio_codec_for(path), "-ar", &sample_rate.to_string()]);
    cmd.path_arg(&temp);

    run_with_progress(runner, &cmd, on_progress).await?;

    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    tracing::info!("Leveled {}", path.display());
    Ok(measured)
}
