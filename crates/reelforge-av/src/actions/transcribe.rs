//! Speech-to-text through an external whisper binary.

use std::path::Path;

use reelforge_common::Result;

use crate::command::ToolCommand;
use crate::process::ProcessRunner;
use crate::tools::{Tool, ToolRegistry};

/// Transcript text pulled from the transcriber's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    /// Whether the text came from a quoted substring. When `false` the whole
    /// trimmed output was used.
    pub quoted: bool,
}

/// Pull the transcript out of raw transcriber output.
///
/// The transcript is the text between the first and last `"`. Output without
/// a quoted span is used whole, trimmed.
pub fn extract_transcript(stdout: &str) -> Transcript {
    if let (Some(first), Some(last)) = (stdout.find('"'), stdout.rfind('"')) {
        if last > first {
            return Transcript {
                text: stdout[first + 1..last].trim().to_string(),
                quoted: true,
            };
        }
    }
    Transcript {
        text: stdout.trim().to_string(),
        quoted: false,
    }
}

/// Run the transcriber on a single audio file.
///
/// `extra_args` come before the audio path.
pub async fn transcribe(
    runner: &ProcessRunner,
    tools: &ToolRegistry,
    audio: &Path,
    extra_args: &[String],
) -> Result<Transcript> {
    let mut cmd = ToolCommand::new(tools.require(Tool::Whisper)?);
    cmd.args(extra_args.iter().cloned());
    cmd.path_arg(audio);

    tracing::info!("Transcribing {}", audio.display());
    let output = runner.output(&cmd).await?;

    let transcript = extract_transcript(&output.stdout);
    if !transcript.quoted {
        tracing::warn!(
            "No quoted transcript in {} output for {}; using the raw output",
            cmd.name(),
            audio.display()
        );
    }
    Ok(transcript)
}
