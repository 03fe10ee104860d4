use clap::{ArgGroup, Parser};
use std::path::PathBuf;

use crate::pipeline::EntryMode;

#[derive(Debug, Parser)]
#[command(name = "reelforge")]
#[command(
    author,
    version,
    about = "Turn numbered raw clips into a titled presentation video"
)]
#[command(group(
    ArgGroup::new("mode")
        .multiple(false)
        .args(["resume_after_conversion", "continue_run", "level_audio", "preview", "check_tools"])
))]
pub struct Cli {
    /// Directory holding the numbered raw clips
    #[arg(short, long, default_value = ".")]
    pub source: PathBuf,

    /// Staging directory (defaults to the configured name under --source)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Answer yes to every confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Skip conversion and restart from merging the converted clips
    #[arg(long)]
    pub resume_after_conversion: bool,

    /// Continue after the title document has been written
    #[arg(long = "continue")]
    pub continue_run: bool,

    /// Normalize the loudness of one file in place, then exit
    #[arg(long, value_name = "PATH")]
    pub level_audio: Option<PathBuf>,

    /// Render a single title card image, then exit
    #[arg(long, num_args = 3, value_names = ["ID", "TITLE", "DESCRIPTION"])]
    pub preview: Option<Vec<String>>,

    /// Where --preview writes its image
    #[arg(short, long, requires = "preview")]
    pub output: Option<PathBuf>,

    /// Report which external tools are available, then exit
    #[arg(long)]
    pub check_tools: bool,
}

/// What one invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Pipeline(EntryMode),
    LevelAudio(PathBuf),
    Preview {
        id: String,
        title: String,
        description: String,
        output: Option<PathBuf>,
    },
    CheckTools,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if let Some(ref path) = self.level_audio {
            return Mode::LevelAudio(path.clone());
        }
        if let Some([id, title, description]) = self.preview.as_deref() {
            return Mode::Preview {
                id: id.clone(),
                title: title.clone(),
                description: description.clone(),
                output: self.output.clone(),
            };
        }
        if self.check_tools {
            return Mode::CheckTools;
        }
        if self.resume_after_conversion {
            Mode::Pipeline(EntryMode::ResumeAfterConversion)
        } else if self.continue_run {
            Mode::Pipeline(EntryMode::ResumeAfterTitles)
        } else {
            Mode::Pipeline(EntryMode::Fresh)
        }
    }
}
