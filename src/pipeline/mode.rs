//! Entry modes and stage sequencing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The seven pipeline stages, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    Convert,
    Merge,
    ExtractAudio,
    Transcribe,
    Prompt,
    RenderTitles,
    Assemble,
}

impl StageId {
    /// Every stage, in execution order.
    pub const ALL: [StageId; 7] = [
        StageId::Convert,
        StageId::Merge,
        StageId::ExtractAudio,
        StageId::Transcribe,
        StageId::Prompt,
        StageId::RenderTitles,
        StageId::Assemble,
    ];

    /// One-based position in the sequence.
    pub fn number(self) -> u8 {
        self as u8 + 1
    }

    /// Short machine name, used as the manifest key.
    pub fn name(self) -> &'static str {
        match self {
            StageId::Convert => "convert",
            StageId::Merge => "merge",
            StageId::ExtractAudio => "extract-audio",
            StageId::Transcribe => "transcribe",
            StageId::Prompt => "prompt",
            StageId::RenderTitles => "render-titles",
            StageId::Assemble => "assemble",
        }
    }

    /// What the stage does, for log output.
    pub fn description(self) -> &'static str {
        match self {
            StageId::Convert => "normalize raw clips",
            StageId::Merge => "merge multi-part sections",
            StageId::ExtractAudio => "extract audio",
            StageId::Transcribe => "transcribe audio",
            StageId::Prompt => "prepare title authoring",
            StageId::RenderTitles => "render title cards",
            StageId::Assemble => "assemble presentation",
        }
    }

    /// The stage after this one.
    pub fn next(self) -> Option<StageId> {
        Self::ALL.get(self as usize + 1).copied()
    }

    /// The stage before this one.
    pub fn prev(self) -> Option<StageId> {
        (self as usize).checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Stages strictly after `marker`, or every stage for `None`.
    pub fn after(marker: Option<StageId>) -> impl Iterator<Item = StageId> {
        Self::ALL
            .into_iter()
            .filter(move |s| marker.map_or(true, |m| *s > m))
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.number(), self.name())
    }
}

/// How a run enters the pipeline. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// Start from the raw clips.
    Fresh,
    /// Keep the normalized clips and redo everything after them.
    ResumeAfterConversion,
    /// Titles have been authored; render them and assemble.
    ResumeAfterTitles,
}

impl EntryMode {
    /// First stage to run.
    pub fn first_stage(self) -> StageId {
        match self {
            EntryMode::Fresh => StageId::Convert,
            EntryMode::ResumeAfterConversion => StageId::Merge,
            EntryMode::ResumeAfterTitles => StageId::RenderTitles,
        }
    }

    /// Last stage whose output is preserved; everything after it is reset.
    pub fn kept_through(self) -> Option<StageId> {
        self.first_stage().prev()
    }

    /// The completed stage whose output this mode consumes.
    pub fn requires(self) -> Option<StageId> {
        match self {
            EntryMode::Fresh => None,
            EntryMode::ResumeAfterConversion => Some(StageId::Convert),
            EntryMode::ResumeAfterTitles => Some(StageId::Merge),
        }
    }

    /// Why this mode was selected, for the startup report.
    pub fn reason(self) -> &'static str {
        match self {
            EntryMode::Fresh => "no resume flag given; starting from the raw clips",
            EntryMode::ResumeAfterConversion => {
                "--resume-after-conversion: reusing normalized clips, redoing stages 2-7"
            }
            EntryMode::ResumeAfterTitles => {
                "--continue: titles authored, rendering title cards and assembling"
            }
        }
    }
}

impl fmt::Display for EntryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryMode::Fresh => "fresh",
            EntryMode::ResumeAfterConversion => "resume-after-conversion",
            EntryMode::ResumeAfterTitles => "continue",
        })
    }
}

/// The stage to run after `current` in `mode`, or `None` when the run is done.
pub fn next_stage(current: Option<StageId>, mode: EntryMode) -> Option<StageId> {
    match current {
        None => Some(mode.first_stage()),
        Some(stage) if stage < mode.first_stage() => Some(mode.first_stage()),
        Some(stage) => stage.next(),
    }
}
