//! # reelforge-common
//!
//! Foundational types shared by every reelforge crate:
//!
//! - [`Error`] / [`Result`] -- the unified error type.
//! - [`SectionId`] -- the two-digit ordering token carried by every input clip.
//! - [`config`] -- run configuration (tools, encode parameters, title cards,
//!   loudness targets, workspace layout).

pub mod config;
pub mod error;
pub mod section;

pub use config::Config;
pub use error::{Error, ErrorClass, Result};
pub use section::SectionId;
