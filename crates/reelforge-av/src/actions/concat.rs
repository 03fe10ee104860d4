//! Concatenation with the ffmpeg concat demuxer or concat filter.

use std::path::{Path, PathBuf};

use reelforge_common::config::EncodeConfig;
use reelforge_common::{Error, Result};

use super::{encode_args, ffmpeg, output_format_filters, run_with_progress};
use crate::process::ProcessRunner;
use crate::tools::ToolRegistry;

/// Quote a path for a concat demuxer list.
///
/// The list syntax wraps paths in single quotes; an embedded quote closes the
/// string, emits an escaped quote, and reopens it.
pub fn escape_concat_path(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Write a concat demuxer list naming `parts` in order.
pub fn write_concat_list(list: &Path, parts: &[PathBuf]) -> Result<()> {
    let mut body = String::new();
    for part in parts {
        let absolute = if part.is_absolute() {
            part.clone()
        } else {
            std::env::current_dir()?.join(part)
        };
        body.push_str("file ");
        body.push_str(&escape_concat_path(&absolute));
        body.push('\n');
    }
    std::fs::write(list, body)?;
    Ok(())
}

/// Concatenate the files named in `list` without re-encoding.
///
/// Bitexact flags keep the output identical across runs with the same inputs.
pub async fn concat_copy(
    runner: &ProcessRunner,
    tools: &ToolRegistry,
    list: &Path,
    output: &Path,
    on_progress: impl FnMut(u8),
) -> Result<()> {
    tracing::info!("Concat (stream copy): {} -> {}", list.display(), output.display());

    let mut cmd = ffmpeg(tools)?;
    cmd.args(["-f", "concat", "-safe", "0", "-i"]).path_arg(list);
    cmd.args(["-map", "0", "-c", "copy", "-map_metadata", "-1"]);
    cmd.args(["-fflags", "+bitexact", "-flags:v", "+bitexact", "-flags:a", "+bitexact"]);
    cmd.args(["-movflags", "+faststart"]);
    cmd.path_arg(output);

    run_with_progress(runner, &cmd, on_progress).await
}

/// Concatenate `parts` without re-encoding, using a temporary list file
/// beside `output`.
pub async fn concat_parts(
    runner: &ProcessRunner,
    tools: &ToolRegistry,
    parts: &[PathBuf],
    output: &Path,
    on_progress: impl FnMut(u8),
) -> Result<()> {
    let dir = output
        .parent()
        .ok_or_else(|| Error::precondition(format!("{} has no parent", output.display())))?;
    let list = tempfile::Builder::new()
        .prefix(".concat-")
        .suffix(".txt")
        .tempfile_in(dir)?;
    write_concat_list(list.path(), parts)?;

    concat_copy(runner, tools, list.path(), output, on_progress).await
}

/// Concatenate `parts` through the concat filter, re-encoding with the
/// presentation encode settings.
///
/// Used when the parts do not share stream parameters.
pub async fn concat_reencode(
    runner: &ProcessRunner,
    tools: &ToolRegistry,
    parts: &[PathBuf],
    output: &Path,
    encode: &EncodeConfig,
    on_progress: impl FnMut(u8),
) -> Result<()> {
    if parts.is_empty() {
        return Err(Error::precondition("nothing to concatenate"));
    }
    tracing::info!(
        "Concat (re-encode, {} parts) -> {}",
        parts.len(),
        output.display()
    );

    let mut cmd = ffmpeg(tools)?;
    for part in parts {
        cmd.arg("-i").path_arg(part);
    }

    let mut graph = String::new();
    for i in 0..parts.len() {
        graph.push_str(&format!("[{i}:v:0][{i}:a:0]"));
    }
    graph.push_str(&format!(
        "concat=n={}:v=1:a=1[cv][a];[cv]{}[v]",
        parts.len(),
        output_format_filters(encode).join(",")
    ));

    cmd.arg("-filter_complex").arg(graph);
    cmd.args(["-map", "[v]", "-map", "[a]"]);
    encode_args(&mut cmd, encode);
    cmd.path_arg(output);

    run_with_progress(runner, &cmd, on_progress).await
}
