//! Run configuration types.
//!
//! The top-level [`Config`] is deserialized from TOML by the binary and carries
//! tool overrides, encode parameters, title card settings, loudness targets and
//! the workspace layout. Every section defaults sensibly so an empty file is
//! valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable that overrides the speech-to-text binary path.
pub const WHISPER_ENV_VAR: &str = "REELFORGE_WHISPER";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub encode: EncodeConfig,
    pub titles: TitleConfig,
    pub loudness: LoudnessConfig,
    pub workspace: WorkspaceConfig,
}

impl Config {
    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.encode.frame_rate == 0 {
            warnings.push("encode.frame_rate is 0; the encoder default will be used".into());
        }
        if self.encode.video_crf > 51 {
            warnings.push(format!(
                "encode.video_crf {} is outside the 0-51 range",
                self.encode.video_crf
            ));
        }
        if self.titles.duration_secs <= 0.0 {
            warnings.push("titles.duration_secs must be positive".into());
        }
        if self.titles.width % 2 != 0 || self.titles.height % 2 != 0 {
            warnings.push(format!(
                "titles viewport {}x{} is not divisible by 2; yuv420p output requires even dimensions",
                self.titles.width, self.titles.height
            ));
        }
        if self.workspace.extensions.is_empty() {
            warnings.push("workspace.extensions is empty; no raw inputs will be discovered".into());
        }
        if let Some(ref template) = self.titles.template {
            if !template.exists() {
                warnings.push(format!(
                    "titles.template {} does not exist; the built-in template will be used",
                    template.display()
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Explicit paths for external tools. Unset tools are looked up in `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Headless Chromium (or Chrome) used to screenshot title cards.
    pub browser_path: Option<PathBuf>,
    /// Speech-to-text binary. [`WHISPER_ENV_VAR`] takes precedence.
    pub whisper_path: Option<PathBuf>,
    /// Extra arguments placed before the audio path (model selection etc.).
    pub whisper_args: Vec<String>,
}

/// Encode parameters shared by every artifact that ends up in the final
/// stream-copy concatenation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    pub video_codec: String,
    pub video_preset: String,
    pub video_crf: u32,
    pub frame_rate: u32,
    pub pix_fmt: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    pub channels: u32,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".into(),
            video_preset: "medium".into(),
            video_crf: 18,
            frame_rate: 30,
            pix_fmt: "yuv420p".into(),
            audio_codec: "aac".into(),
            audio_bitrate: "192k".into(),
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

/// Title card rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleConfig {
    /// Length of each title card video.
    pub duration_secs: f64,
    /// Browser viewport width.
    pub width: u32,
    /// Browser viewport height.
    pub height: u32,
    /// Title document file name, relative to the workspace root.
    pub file: String,
    /// Custom HTML template; `{number}`, `{title}`, `{description}`,
    /// `{width}` and `{height}` are substituted.
    pub template: Option<PathBuf>,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            duration_secs: 5.0,
            width: 1920,
            height: 1080,
            file: "titles.json".into(),
            template: None,
        }
    }
}

/// EBU R128 targets for `--level-audio`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    /// Integrated loudness target (LUFS).
    pub integrated: f64,
    /// Maximum true peak (dBTP).
    pub true_peak: f64,
    /// Loudness range target (LU).
    pub loudness_range: f64,
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            integrated: -16.0,
            true_peak: -1.5,
            loudness_range: 11.0,
        }
    }
}

/// Staging area layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Staging directory, relative to the source directory unless absolute.
    pub dir: PathBuf,
    /// File name of the finished presentation.
    pub output_name: String,
    /// Raw input extensions (case-insensitive, without the dot).
    pub extensions: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("reelforge-work"),
            output_name: "presentation.mp4".into(),
            extensions: ["mov", "mp4", "mkv", "m4v", "avi", "webm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.encode.frame_rate, 30);
        assert_eq!(config.titles.duration_secs, 5.0);
        assert_eq!(config.titles.file, "titles.json");
        assert_eq!(config.workspace.output_name, "presentation.mp4");
        assert!(config.tools.whisper_path.is_none());
        assert!(config.validate().is_empty());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[encode]
frame_rate = 25

[tools]
browser_path = "/opt/chrome/chrome"
"#,
        )
        .unwrap();
        assert_eq!(config.encode.frame_rate, 25);
        assert_eq!(config.encode.video_codec, "libx264");
        assert_eq!(
            config.tools.browser_path,
            Some(PathBuf::from("/opt/chrome/chrome"))
        );
    }

    #[test]
    fn validate_flags_odd_viewport_and_zero_duration() {
        let mut config = Config::default();
        config.titles.width = 1921;
        config.titles.duration_secs = 0.0;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("divisible by 2")));
        assert!(warnings.iter().any(|w| w.contains("duration_secs")));
    }
}
