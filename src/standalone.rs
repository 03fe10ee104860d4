//! Modes that bypass the pipeline: loudness leveling, title previews and the
//! tool report.

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use reelforge_av::actions::{self, render_title_html, screenshot, LoudnormMeasurement};
use reelforge_av::{ProcessRunner, Tool, ToolInfo, ToolRegistry};
use reelforge_common::{Config, Error, Result};

use crate::pipeline::titles::card_template;

/// Two-pass loudness normalization of one file, in place.
pub async fn level_audio(
    config: &Config,
    tools: &ToolRegistry,
    runner: &ProcessRunner,
    path: &Path,
    show_progress: bool,
) -> Result<LoudnormMeasurement> {
    tools.require(Tool::Ffmpeg)?;

    let bar = if show_progress {
        let pb = ProgressBar::new(100);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{prefix:>14} [{bar:30.cyan/blue}] {pos:>3}%")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb.set_prefix("level audio");
        pb
    } else {
        ProgressBar::hidden()
    };

    let result = actions::level_audio(
        runner,
        tools,
        path,
        &config.loudness,
        config.encode.sample_rate,
        |pct| bar.set_position(u64::from(pct)),
    )
    .await;
    bar.finish_and_clear();
    result
}

/// Default file name of a preview image.
pub fn preview_file_name(id: &str) -> String {
    format!("title-preview-{id}.png")
}

/// Render one title card image to `output`, or to
/// `title-preview-<id>.png` in the current directory.
///
/// Only the headless browser is needed. The HTML lives in a temporary
/// directory and is removed afterwards.
pub async fn preview(
    config: &Config,
    tools: &ToolRegistry,
    runner: &ProcessRunner,
    id: &str,
    title: &str,
    description: &str,
    output: Option<&Path>,
) -> Result<PathBuf> {
    tools.require(Tool::Browser)?;

    let output = match output {
        Some(p) => p.to_path_buf(),
        None => std::env::current_dir()?.join(preview_file_name(id)),
    };

    let template = card_template(&config.titles)?;
    let (width, height) = (config.titles.width, config.titles.height);
    let page = render_title_html(&template, id, title, description, width, height);

    let scratch = tempfile::Builder::new()
        .prefix("reelforge-preview-")
        .tempdir()?;
    let html = scratch.path().join("card.html");
    let png = scratch.path().join("card.png");
    std::fs::write(&html, page)?;
    screenshot(runner, tools, &html, &png, width, height).await?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(&png, &output).map_err(|e| {
        Error::stage("preview", format!("could not write {}: {e}", output.display()))
    })?;
    tracing::info!("Wrote {}", output.display());
    Ok(output)
}

/// One line per tool: availability, version and path.
pub fn tool_report(infos: &[ToolInfo]) -> Vec<String> {
    infos
        .iter()
        .map(|info| {
            let status = if info.available { "✓" } else { "✗" };
            let mut line = format!("{status} {}", info.tool.name());
            if !info.required {
                line.push_str(" (optional)");
            }
            if let Some(ref version) = info.version {
                line.push_str(&format!(" ({})", version.lines().next().unwrap_or("")));
            }
            if let Some(ref path) = info.path {
                line.push_str(&format!(" - {}", path.display()));
            }
            line
        })
        .collect()
}

/// Print the tool report.
pub fn check_tools(tools: &ToolRegistry) {
    println!("Checking external tools...\n");

    let infos = tools.check_all();
    for line in tool_report(&infos) {
        println!("{line}");
    }

    let all_required = infos.iter().all(|i| i.available || !i.required);
    println!();
    if all_required {
        println!("All required tools are available!");
    } else {
        println!("Some required tools are missing. Install them or set their paths in [tools].");
    }
    if !tools.has(Tool::Whisper) {
        println!("Without speech-to-text, titles are written by hand after audio extraction.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_marks_missing_and_optional_tools() {
        let infos = vec![
            ToolInfo {
                tool: Tool::Ffmpeg,
                available: true,
                required: true,
                version: Some("ffmpeg version 6.1\nbuilt with gcc".into()),
                path: Some(PathBuf::from("/usr/bin/ffmpeg")),
            },
            ToolInfo {
                tool: Tool::Whisper,
                available: false,
                required: false,
                version: None,
                path: None,
            },
        ];
        let lines = tool_report(&infos);
        assert_eq!(lines[0], "✓ ffmpeg (ffmpeg version 6.1) - /usr/bin/ffmpeg");
        assert_eq!(lines[1], "✗ whisper (optional)");
    }

    #[test]
    fn preview_name_carries_the_id() {
        assert_eq!(preview_file_name("03"), "title-preview-03.png");
    }

    #[tokio::test]
    async fn preview_requires_a_browser() {
        let err = preview(
            &Config::default(),
            &ToolRegistry::default(),
            &ProcessRunner::default(),
            "01",
            "Intro",
            "",
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ExternalToolUnavailable { .. }));
    }

    #[tokio::test]
    async fn level_audio_requires_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("talk.mp4");
        std::fs::write(&file, b"x").unwrap();
        let err = level_audio(
            &Config::default(),
            &ToolRegistry::default(),
            &ProcessRunner::default(),
            &file,
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ExternalToolUnavailable { .. }));
    }
}
