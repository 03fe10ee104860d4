//! # reelforge-av
//!
//! The external tool layer of the reelforge pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find ffmpeg, ffprobe, a headless
//!   browser and the optional speech-to-text binary.
//! - **Process execution** ([`ProcessRunner`]) -- spawn a command in its own
//!   process group, stream its diagnostic output line by line, and register it
//!   in a [`ProcessRegistry`] so an interrupt can terminate every live job.
//! - **Progress parsing** ([`ProgressParser`]) -- a pure reducer turning ffmpeg
//!   diagnostic lines into de-duplicated percentages.
//! - **Probing** ([`probe`]) -- stream parameters via ffprobe.
//! - **Actions** ([`actions`]) -- normalize, concatenate, extract audio,
//!   transcribe, render title cards, and level loudness.

pub mod actions;
pub mod command;
pub mod probe;
pub mod process;
pub mod progress;
pub mod template;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use probe::StreamParams;
pub use process::{run_until_interrupted, ProcessRegistry, ProcessRunner, RunningProcess};
pub use progress::ProgressParser;
pub use template::TemplateContext;
pub use tools::{Tool, ToolInfo, ToolRegistry};
