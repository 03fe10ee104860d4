//! Normalize a raw clip into the common presentation format.

use std::path::Path;

use reelforge_common::config::EncodeConfig;
use reelforge_common::Result;

use super::{encode_args, ffmpeg, output_format_filters, run_with_progress, silent_audio_source};
use crate::command::ToolCommand;
use crate::process::ProcessRunner;
use crate::tools::ToolRegistry;

/// Frame size to letterbox a clip into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadTarget {
    pub width: u32,
    pub height: u32,
}

/// One normalize invocation.
#[derive(Debug, Clone)]
pub struct NormalizeJob<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    /// Scale down to fit and pad, centered, to this size.
    pub pad: Option<PadTarget>,
    /// Whether the input carries an audio stream. Without one, a silent track
    /// is generated so every artifact has the same stream layout.
    pub has_audio: bool,
}

/// Build the ffmpeg command for `job`.
pub fn normalize_command(mut cmd: ToolCommand, job: &NormalizeJob<'_>, encode: &EncodeConfig) -> ToolCommand {
    cmd.arg("-i").path_arg(job.input);
    if !job.has_audio {
        cmd.args(["-f", "lavfi", "-i"]).arg(silent_audio_source(encode));
    }

    let mut filters = Vec::new();
    if let Some(PadTarget { width, height }) = job.pad {
        filters.push(format!(
            "scale={width}:{height}:force_original_aspect_ratio=decrease"
        ));
        filters.push(format!("pad={width}:{height}:(ow-iw)/2:(oh-ih)/2"));
    }
    filters.extend(output_format_filters(encode));
    cmd.arg("-vf").arg(filters.join(","));

    cmd.args(["-map", "0:v:0"]);
    if job.has_audio {
        cmd.args(["-map", "0:a:0"]);
    } else {
        cmd.args(["-map", "1:a:0", "-shortest"]);
    }

    encode_args(&mut cmd, encode);
    cmd.path_arg(job.output);
    cmd
}

/// Transcode `job.input` to `job.output`.
pub async fn normalize(
    runner: &ProcessRunner,
    tools: &ToolRegistry,
    job: &NormalizeJob<'_>,
    encode: &EncodeConfig,
    on_progress: impl FnMut(u8),
) -> Result<()> {
    tracing::info!(
        "Normalize: {} -> {}{}",
        job.input.display(),
        job.output.display(),
        job.pad
            .map(|p| format!(" (padded to {}x{})", p.width, p.height))
            .unwrap_or_default()
    );

    let cmd = normalize_command(ffmpeg(tools)?, job, encode);
    run_with_progress(runner, &cmd, on_progress).await
}
