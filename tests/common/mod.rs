//! Shared helpers for the CLI integration tests.
//!
//! External tools are replaced by small shell scripts so the tests control
//! exactly what each one does.

#![allow(dead_code)]

use assert_cmd::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Get a command for the reelforge binary
#[allow(deprecated)]
pub fn reelforge_cmd() -> Command {
    Command::cargo_bin("reelforge").unwrap()
}

/// Write an executable `/bin/sh` script.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A headless browser stand-in that writes a fixed file to the
/// `--screenshot=` path it is given.
pub fn fake_browser(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-browser",
        r#"for arg in "$@"; do
  case "$arg" in
    --screenshot=*) printf 'png' > "${arg#--screenshot=}" ;;
  esac
done"#,
    )
}

/// Write `reelforge.toml` in `dir` with the given `[tools]` paths and any
/// extra TOML appended.
pub fn write_config(dir: &Path, tools: &[(&str, &Path)], extra: &str) -> PathBuf {
    let mut toml = String::from("[tools]\n");
    for (key, path) in tools {
        toml.push_str(&format!("{key} = {:?}\n", path.display().to_string()));
    }
    toml.push('\n');
    toml.push_str(extra);

    let path = dir.join("reelforge.toml");
    fs::write(&path, toml).unwrap();
    path
}

/// A config whose required tools are all no-op scripts, so preflight passes
/// without ffmpeg or a browser installed.
pub fn stub_tools_config(dir: &Path) -> PathBuf {
    let stub = write_script(dir, "stub-tool", "exit 0");
    write_config(
        dir,
        &[
            ("ffmpeg_path", &stub),
            ("ffprobe_path", &stub),
            ("browser_path", &stub),
        ],
        "",
    )
}
