//! Title card rendering: HTML template, browser screenshot, silent video.

use std::path::{Path, PathBuf};

use reelforge_common::config::EncodeConfig;
use reelforge_common::{Error, Result};

use super::{encode_args, ffmpeg, run_with_progress, silent_audio_source};
use crate::command::ToolCommand;
use crate::probe::parse_frame_rate;
use crate::process::ProcessRunner;
use crate::template::TemplateContext;
use crate::tools::{Tool, ToolRegistry};

/// Fill `template` with one title card's text.
pub fn render_title_html(
    template: &str,
    number: &str,
    title: &str,
    description: &str,
    width: u32,
    height: u32,
) -> String {
    TemplateContext::title_card(number, title, description, width, height).substitute(template)
}

/// Screenshot `html` at a fixed viewport into `png` with the headless browser.
pub async fn screenshot(
    runner: &ProcessRunner,
    tools: &ToolRegistry,
    html: &Path,
    png: &Path,
    width: u32,
    height: u32,
) -> Result<()> {
    let html = absolute(html)?;
    let png = absolute(png)?;

    let mut cmd = ToolCommand::new(tools.require(Tool::Browser)?);
    cmd.args(["--headless", "--disable-gpu", "--hide-scrollbars"]);
    cmd.arg(format!("--window-size={width},{height}"));
    cmd.arg(format!("--screenshot={}", png.display()));
    cmd.arg(format!("file://{}", html.display()));

    tracing::debug!("Screenshot {} -> {}", html.display(), png.display());
    runner.run(&cmd).await?;

    // Some browser builds exit 0 without writing anything.
    if !png.is_file() {
        return Err(Error::stage(
            "render-titles",
            format!("{} produced no screenshot at {}", cmd.name(), png.display()),
        ));
    }
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// One still-image video wrapper.
#[derive(Debug, Clone)]
pub struct TitleVideoJob<'a> {
    pub image: &'a Path,
    pub output: &'a Path,
    pub width: u32,
    pub height: u32,
    /// Frame rate of the section the card introduces, as ffprobe reports it
    /// (`30/1`, `30000/1001`).
    pub frame_rate: &'a str,
    pub duration_secs: f64,
}

/// Frame rate the title video is encoded at: the section's own, else the
/// configured one, else 30.
fn title_frame_rate(job: &TitleVideoJob<'_>, encode: &EncodeConfig) -> String {
    let probed = job.frame_rate.trim();
    if parse_frame_rate(probed).is_some_and(|fps| fps > 0.0) {
        probed.to_string()
    } else if encode.frame_rate > 0 {
        encode.frame_rate.to_string()
    } else {
        "30".to_string()
    }
}

/// Build the ffmpeg command for `job`.
///
/// The encode settings are the same as for normalized clips, and the frame is
/// scaled and padded to the section's resolution at the section's frame rate,
/// so the result concatenates with the section by stream copy.
pub fn title_video_command(
    mut cmd: ToolCommand,
    job: &TitleVideoJob<'_>,
    encode: &EncodeConfig,
) -> ToolCommand {
    let fps = title_frame_rate(job, encode);
    let duration = format!("{:.3}", job.duration_secs);
    let (w, h) = (job.width, job.height);

    cmd.args(["-loop", "1", "-framerate", &fps, "-i"]);
    cmd.path_arg(job.image);
    cmd.args(["-f", "lavfi", "-i"]).arg(silent_audio_source(encode));

    let filters = [
        format!("scale={w}:{h}:force_original_aspect_ratio=decrease"),
        format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"),
        "setsar=1".to_string(),
        format!("fps={fps}"),
        format!("format={}", encode.pix_fmt),
    ];
    cmd.arg("-vf").arg(filters.join(","));

    cmd.args(["-r", &fps]);
    cmd.args(["-map", "0:v:0", "-map", "1:a:0", "-t", &duration]);
    encode_args(&mut cmd, encode);
    cmd.path_arg(job.output);
    cmd
}

/// Turn a title card image into a silent video matching the section it
/// introduces.
pub async fn title_video(
    runner: &ProcessRunner,
    tools: &ToolRegistry,
    job: &TitleVideoJob<'_>,
    encode: &EncodeConfig,
    on_progress: impl FnMut(u8),
) -> Result<()> {
    let cmd = title_video_command(ffmpeg(tools)?, job, encode);
    tracing::debug!("Title video {} -> {}", job.image.display(), job.output.display());
    run_with_progress(runner, &cmd, on_progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::DEFAULT_TITLE_TEMPLATE;

    #[test]
    fn html_carries_escaped_fields() {
        let html = render_title_html(
            DEFAULT_TITLE_TEMPLATE,
            "03",
            "Costs & <Benefits>",
            "Where the money goes",
            1920,
            1080,
        );
        assert!(html.contains("Costs &amp; &lt;Benefits&gt;"));
        assert!(html.contains(">03<"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_screenshot_is_a_stage_error() {
        let dir = tempfile::tempdir().unwrap();
        let html = dir.path().join("01.html");
        std::fs::write(&html, "<html></html>").unwrap();

        // `true` accepts any arguments and writes nothing.
        let tools = ToolRegistry::from_paths([(Tool::Browser, PathBuf::from("true"))]);
        let err = screenshot(
            &ProcessRunner::default(),
            &tools,
            &html,
            &dir.path().join("01.png"),
            640,
            360,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Stage { .. }), "{err}");
    }

    fn title_args(frame_rate: &str, encode: &EncodeConfig) -> Vec<String> {
        let job = TitleVideoJob {
            image: Path::new("/w/titles/01-title.png"),
            output: Path::new("/w/titles/01-title.mp4"),
            width: 1280,
            height: 720,
            frame_rate,
            duration_secs: 5.0,
        };
        title_video_command(ToolCommand::new("ffmpeg"), &job, encode)
            .get_args()
            .to_vec()
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let i = args.iter().position(|a| a == flag).unwrap();
        &args[i + 1]
    }

    #[test]
    fn title_video_follows_the_section_frame_rate() {
        let encode = EncodeConfig {
            frame_rate: 0,
            ..EncodeConfig::default()
        };
        let args = title_args("25/1", &encode);
        assert_eq!(value_after(&args, "-framerate"), "25/1");
        assert_eq!(value_after(&args, "-r"), "25/1");
        assert!(value_after(&args, "-vf").contains("fps=25/1"));
        assert!(value_after(&args, "-vf").contains("scale=1280:720"));
    }

    #[test]
    fn unusable_section_rate_falls_back_to_config() {
        let args = title_args("0/0", &EncodeConfig::default());
        assert_eq!(value_after(&args, "-r"), "30");

        let encode = EncodeConfig {
            frame_rate: 0,
            ..EncodeConfig::default()
        };
        assert_eq!(value_after(&title_args("", &encode), "-framerate"), "30");
    }
}
