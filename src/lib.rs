//! Reelforge - presentation video pipeline
//!
//! This library crate exposes the pipeline and CLI pieces for integration
//! testing.

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod standalone;
