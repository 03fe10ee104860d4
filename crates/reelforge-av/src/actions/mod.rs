//! Per-item media actions: normalize, concatenate, extract audio, transcribe,
//! render title cards, and level loudness.
//!
//! Every action builds a [`ToolCommand`] and runs it through a
//! [`ProcessRunner`], so each external process is registered for interrupt
//! cleanup. Long transcodes report progress through an `FnMut(u8)` callback
//! fed by a [`ProgressParser`].

mod audio;
mod concat;
mod loudness;
mod normalize;
mod title_card;
mod transcribe;

pub use audio::extract_audio;
pub use concat::{concat_copy, concat_parts, concat_reencode, escape_concat_path, write_concat_list};
pub use loudness::{level_audio, parse_loudnorm_json, LoudnormMeasurement};
pub use normalize::{normalize, normalize_command, NormalizeJob, PadTarget};
pub use title_card::{render_title_html, screenshot, title_video, title_video_command, TitleVideoJob};
pub use transcribe::{extract_transcript, transcribe, Transcript};

use reelforge_common::config::EncodeConfig;
use reelforge_common::Result;

use crate::command::ToolCommand;
use crate::process::ProcessRunner;
use crate::progress::ProgressParser;
use crate::tools::{Tool, ToolRegistry};

/// A new ffmpeg invocation with the flags every action shares.
pub(crate) fn ffmpeg(tools: &ToolRegistry) -> Result<ToolCommand> {
    let mut cmd = ToolCommand::new(tools.require(Tool::Ffmpeg)?);
    cmd.args(["-hide_banner", "-nostdin", "-y"]);
    Ok(cmd)
}

/// Video and audio encode arguments shared by every artifact that ends up in
/// the final stream-copy concatenation.
pub(crate) fn encode_args(cmd: &mut ToolCommand, encode: &EncodeConfig) {
    cmd.args(["-c:v", &encode.video_codec]);
    cmd.args(["-preset", &encode.video_preset]);
    cmd.args(["-crf", &encode.video_crf.to_string()]);
    cmd.args(["-pix_fmt", &encode.pix_fmt]);
    cmd.args(["-c:a", &encode.audio_codec]);
    cmd.args(["-b:a", &encode.audio_bitrate]);
    cmd.args(["-ar", &encode.sample_rate.to_string()]);
    cmd.args(["-ac", &encode.channels.to_string()]);
    cmd.args(["-video_track_timescale", "90000"]);
    cmd.args(["-movflags", "+faststart"]);
}

/// `anullsrc` source description matching the configured audio layout.
pub(crate) fn silent_audio_source(encode: &EncodeConfig) -> String {
    let layout = if encode.channels == 1 { "mono" } else { "stereo" };
    format!("anullsrc=r={}:cl={layout}", encode.sample_rate)
}

/// Filter steps that pin frame rate and pixel format.
pub(crate) fn output_format_filters(encode: &EncodeConfig) -> Vec<String> {
    let mut filters = vec!["setsar=1".to_string()];
    if encode.frame_rate > 0 {
        filters.push(format!("fps={}", encode.frame_rate));
    }
    filters.push(format!("format={}", encode.pix_fmt));
    filters
}

/// Run an ffmpeg command, forwarding percentage updates.
///
/// Completion is reported as 100 after a successful exit even when ffmpeg
/// never printed a duration.
pub(crate) async fn run_with_progress(
    runner: &ProcessRunner,
    cmd: &ToolCommand,
    mut on_progress: impl FnMut(u8),
) -> Result<()> {
    let mut parser = ProgressParser::new();
    runner
        .run_with_lines(cmd, |line| {
            if let Some(pct) = parser.feed(line) {
                on_progress(pct);
            }
        })
        .await?;
    if let Some(pct) = parser.finish() {
        on_progress(pct);
    }
    Ok(())
}
