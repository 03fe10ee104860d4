//! External tool detection.
//!
//! The [`ToolRegistry`] resolves the locations of the external capabilities the
//! pipeline drives: the ffmpeg transcoder and its ffprobe companion, a headless
//! browser for title card screenshots, and the optional speech-to-text binary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use reelforge_common::config::{ToolsConfig, WHISPER_ENV_VAR};
use reelforge_common::{Error, Result};
use serde::Serialize;

/// An external capability the pipeline depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    Browser,
    Whisper,
}

impl Tool {
    /// Every tool, in preflight order.
    pub const ALL: [Tool; 4] = [Tool::Ffmpeg, Tool::Ffprobe, Tool::Browser, Tool::Whisper];

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::Browser => "headless browser",
            Tool::Whisper => "whisper",
        }
    }

    /// Executable names searched for in `PATH`, in order of preference.
    fn candidates(self) -> &'static [&'static str] {
        match self {
            Tool::Ffmpeg => &["ffmpeg"],
            Tool::Ffprobe => &["ffprobe"],
            Tool::Browser => &[
                "chromium",
                "chromium-browser",
                "google-chrome",
                "google-chrome-stable",
            ],
            Tool::Whisper => &["whisper-cli", "whisper"],
        }
    }

    /// Whether a run cannot start without this tool.
    ///
    /// Speech-to-text is optional: without it the pipeline switches to the
    /// manual title authoring path.
    pub fn is_required(self) -> bool {
        !matches!(self, Tool::Whisper)
    }

    fn version_arg(self) -> Option<&'static str> {
        match self {
            Tool::Ffmpeg | Tool::Ffprobe => Some("-version"),
            Tool::Browser => Some("--version"),
            // whisper builds disagree on flags and may load a model on any
            // invocation.
            Tool::Whisper => None,
        }
    }
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// The tool.
    pub tool: Tool,
    /// Whether the tool was found.
    pub available: bool,
    /// Whether a run requires it.
    pub required: bool,
    /// First line of the version output, if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding resolved tool paths.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<Tool, PathBuf>,
}

impl ToolRegistry {
    /// Discover tools using configured paths, the `REELFORGE_WHISPER`
    /// environment variable, and `PATH`.
    pub fn discover(config: &ToolsConfig) -> Self {
        let whisper_env = std::env::var_os(WHISPER_ENV_VAR).map(PathBuf::from);
        Self::discover_with_env(config, whisper_env)
    }

    /// Discover tools with an explicit speech-to-text override.
    ///
    /// For each tool, a configured path is used if it exists; otherwise the
    /// tool's executable names are looked up with [`which::which`]. Tools that
    /// are not found are omitted.
    pub fn discover_with_env(config: &ToolsConfig, whisper_env: Option<PathBuf>) -> Self {
        let mut tools = HashMap::new();

        for tool in Tool::ALL {
            let mut overrides: Vec<&Path> = Vec::new();
            if tool == Tool::Whisper {
                if let Some(ref p) = whisper_env {
                    overrides.push(p.as_path());
                }
            }
            let configured = match tool {
                Tool::Ffmpeg => config.ffmpeg_path.as_deref(),
                Tool::Ffprobe => config.ffprobe_path.as_deref(),
                Tool::Browser => config.browser_path.as_deref(),
                Tool::Whisper => config.whisper_path.as_deref(),
            };
            overrides.extend(configured);

            if let Some(path) = resolve(tool, &overrides) {
                tracing::debug!("Resolved {} at {}", tool.name(), path.display());
                tools.insert(tool, path);
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit paths, without any lookup.
    pub fn from_paths(paths: impl IntoIterator<Item = (Tool, PathBuf)>) -> Self {
        Self {
            tools: paths.into_iter().collect(),
        }
    }

    /// Path of `tool`, if it was found.
    pub fn get(&self, tool: Tool) -> Option<&Path> {
        self.tools.get(&tool).map(PathBuf::as_path)
    }

    /// Path of `tool`, or [`Error::ExternalToolUnavailable`].
    pub fn require(&self, tool: Tool) -> Result<&Path> {
        self.get(tool)
            .ok_or_else(|| Error::tool_unavailable(tool.name()))
    }

    /// Whether `tool` was found.
    pub fn has(&self, tool: Tool) -> bool {
        self.tools.contains_key(&tool)
    }

    /// Required tools that were not found.
    pub fn missing_required(&self) -> Vec<Tool> {
        Tool::ALL
            .into_iter()
            .filter(|t| t.is_required() && !self.has(*t))
            .collect()
    }

    /// Check all tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        Tool::ALL
            .into_iter()
            .map(|tool| {
                let path = self.get(tool).map(Path::to_path_buf);
                let version = path.as_deref().and_then(|p| detect_version(tool, p));
                ToolInfo {
                    tool,
                    available: path.is_some(),
                    required: tool.is_required(),
                    version,
                    path,
                }
            })
            .collect()
    }
}

fn resolve(tool: Tool, overrides: &[&Path]) -> Option<PathBuf> {
    for path in overrides {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        tracing::warn!(
            "Configured {} path {} does not exist; searching PATH",
            tool.name(),
            path.display()
        );
    }

    tool.candidates()
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Run the tool's version flag and return the first line of stdout.
fn detect_version(tool: Tool, path: &Path) -> Option<String> {
    let arg = tool.version_arg()?;
    let output = std::process::Command::new(path).arg(arg).output().ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}
