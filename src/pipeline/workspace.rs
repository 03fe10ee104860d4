//! The on-disk staging area.
//!
//! ```text
//! <root>/
//!   converted/      stage 1  normalized clips, one per raw input
//!   sections/       stage 2  <id>-section.mp4, one per section
//!   audio/          stage 3  <id>.wav
//!   transcripts/    stage 4  <id>.txt
//!   prompt/         stage 5  transcript.txt, prompt.txt
//!   titles/         stage 6  <id>-title.{html,png,mp4}
//!   output/         stage 7  segments.txt and the finished presentation
//!   titles.json     authored title document (never deleted)
//!   manifest.json   completed-stage record
//! ```

use std::io;
use std::path::{Path, PathBuf};

use reelforge_common::{Config, Result, SectionId};

use super::mode::StageId;

/// Owns the staging directory tree. Stages write only into their own
/// subdirectory.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
    titles_file: String,
    output_name: String,
}

impl WorkspaceStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            titles_file: "titles.json".into(),
            output_name: "presentation.mp4".into(),
        }
    }

    /// Create a store from configuration.
    ///
    /// The root is `root_override` if given, else `workspace.dir` resolved
    /// against `source_dir`.
    pub fn from_config(source_dir: &Path, config: &Config, root_override: Option<&Path>) -> Self {
        let root = match root_override {
            Some(p) => p.to_path_buf(),
            None => source_dir.join(&config.workspace.dir),
        };
        Self {
            root,
            titles_file: config.titles.file.clone(),
            output_name: config.workspace.output_name.clone(),
        }
    }

    /// The staging root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Output directory of `stage`.
    pub fn stage_dir(&self, stage: StageId) -> PathBuf {
        let name = match stage {
            StageId::Convert => "converted",
            StageId::Merge => "sections",
            StageId::ExtractAudio => "audio",
            StageId::Transcribe => "transcripts",
            StageId::Prompt => "prompt",
            StageId::RenderTitles => "titles",
            StageId::Assemble => "output",
        };
        self.root.join(name)
    }

    /// Create the root and every stage directory if absent. Never deletes.
    pub fn ensure_layout(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        for stage in StageId::ALL {
            std::fs::create_dir_all(self.stage_dir(stage))?;
        }
        Ok(())
    }

    /// Empty the directories of every stage after `marker` (all stages for
    /// `None`), leaving earlier stages and `titles.json` untouched.
    ///
    /// Missing directories are not an error.
    pub fn reset_downstream_of(&self, marker: Option<StageId>) -> Result<()> {
        for stage in StageId::after(marker) {
            let dir = self.stage_dir(stage);
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => tracing::debug!("Cleared {}", dir.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Regular files in `stage`'s directory, sorted by name. Hidden files are
    /// skipped; `extension` filters case-insensitively.
    pub fn list_files(&self, stage: StageId, extension: Option<&str>) -> Result<Vec<PathBuf>> {
        list_dir(&self.stage_dir(stage), extension)
    }

    /// Whether `stage`'s directory holds at least one file.
    pub fn is_populated(&self, stage: StageId) -> bool {
        self.list_files(stage, None)
            .map(|files| !files.is_empty())
            .unwrap_or(false)
    }

    // ---- Well-known paths ----

    pub fn converted_path(&self, stem: &str) -> PathBuf {
        self.stage_dir(StageId::Convert).join(format!("{stem}.mp4"))
    }

    pub fn section_path(&self, id: &SectionId) -> PathBuf {
        self.stage_dir(StageId::Merge).join(format!("{id}-section.mp4"))
    }

    pub fn audio_path(&self, id: &SectionId) -> PathBuf {
        self.stage_dir(StageId::ExtractAudio).join(format!("{id}.wav"))
    }

    pub fn transcript_path(&self, id: &SectionId) -> PathBuf {
        self.stage_dir(StageId::Transcribe).join(format!("{id}.txt"))
    }

    /// All transcripts joined, for the human or LLM writing titles.
    pub fn combined_transcript_path(&self) -> PathBuf {
        self.stage_dir(StageId::Prompt).join("transcript.txt")
    }

    pub fn prompt_path(&self) -> PathBuf {
        self.stage_dir(StageId::Prompt).join("prompt.txt")
    }

    /// `titles/<id>-title.<ext>`.
    pub fn title_asset(&self, id: &SectionId, ext: &str) -> PathBuf {
        self.stage_dir(StageId::RenderTitles)
            .join(format!("{id}-title.{ext}"))
    }

    pub fn segments_list_path(&self) -> PathBuf {
        self.stage_dir(StageId::Assemble).join("segments.txt")
    }

    pub fn output_path(&self) -> PathBuf {
        self.stage_dir(StageId::Assemble).join(&self.output_name)
    }

    pub fn titles_path(&self) -> PathBuf {
        self.root.join(&self.titles_file)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }
}

/// Regular, non-hidden files in `dir`, sorted by name.
pub(crate) fn list_dir(dir: &Path, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let hidden = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('.'));
        if hidden {
            continue;
        }
        if let Some(ext) = extension {
            let matches = path
                .extension()
                .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext));
            if !matches {
                continue;
            }
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}
