//! Audio extraction for the speech-to-text pass.

use std::path::Path;

use reelforge_common::Result;

use super::{ffmpeg, run_with_progress};
use crate::process::ProcessRunner;
use crate::tools::ToolRegistry;

/// Extract the first audio stream of `input` as mono 16 kHz PCM WAV, the
/// format whisper expects.
pub async fn extract_audio(
    runner: &ProcessRunner,
    tools: &ToolRegistry,
    input: &Path,
    output: &Path,
    on_progress: impl FnMut(u8),
) -> Result<()> {
    tracing::info!("Extract audio: {} -> {}", input.display(), output.display());

    let mut cmd = ffmpeg(tools)?;
    cmd.arg("-i").path_arg(input);
    cmd.args(["-map", "0:a:0", "-vn", "-ac", "1", "-ar", "16000", "-c:a", "pcm_s16le"]);
    cmd.path_arg(output);

    run_with_progress(runner, &cmd, on_progress).await
}
