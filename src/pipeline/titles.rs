//! Title documents and the authoring hand-off.
//!
//! `titles.json` is written by a person (or an LLM) and read back at title
//! rendering. The pipeline validates its shape and coverage but never invents
//! titles; it only writes placeholder templates and the plain-text transcript
//! and prompt documents used to author them.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use reelforge_av::template::DEFAULT_TITLE_TEMPLATE;
use reelforge_common::config::TitleConfig;
use reelforge_common::{Error, Result, SectionId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Title and description for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleCardSpec {
    pub number: SectionId,
    pub title: String,
    pub description: String,
}

/// The parsed title document.
///
/// Fields other than `title_cards` are kept as-is and written back unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TitleDocument {
    pub title_cards: Vec<TitleCardSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawDocument {
    title_cards: Option<Vec<RawCard>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawCard {
    #[serde(default)]
    number: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

fn parse_number(value: &Value) -> Option<SectionId> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .and_then(SectionId::from_number),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl TitleDocument {
    /// Parse a title document, reporting every shape problem at once.
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawDocument = serde_json::from_str(json).map_err(|e| Error::TitleSpec {
            problems: vec![format!("not a valid title document: {e}")],
        })?;

        let Some(cards) = raw.title_cards else {
            return Err(Error::TitleSpec {
                problems: vec!["missing \"title_cards\" array".into()],
            });
        };

        let mut problems = Vec::new();
        let mut title_cards = Vec::with_capacity(cards.len());
        for (i, card) in cards.into_iter().enumerate() {
            let Some(number) = parse_number(&card.number) else {
                problems.push(format!(
                    "title_cards[{i}]: \"number\" must be a section number between 0 and 99, got {}",
                    card.number
                ));
                continue;
            };
            title_cards.push(TitleCardSpec {
                number,
                title: card.title.unwrap_or_default(),
                description: card.description.unwrap_or_default(),
            });
        }

        if !problems.is_empty() {
            return Err(Error::TitleSpec { problems });
        }
        Ok(Self {
            title_cards,
            extra: raw.extra,
        })
    }

    /// Read and parse `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::TitleSpec {
                    problems: vec![format!("{} does not exist", path.display())],
                })
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content).map_err(|e| match e {
            Error::TitleSpec { problems } => Error::TitleSpec {
                problems: problems
                    .into_iter()
                    .map(|p| format!("{}: {p}", path.display()))
                    .collect(),
            },
            other => other,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check the document covers every section in `sections`.
    ///
    /// Duplicate numbers, blank titles and missing sections are errors.
    /// Cards for sections that do not exist are returned as warnings.
    pub fn validate(&self, sections: &[SectionId]) -> Result<Vec<String>> {
        let mut problems = Vec::new();
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();
        let wanted: BTreeSet<&SectionId> = sections.iter().collect();

        for card in &self.title_cards {
            if !seen.insert(&card.number) {
                problems.push(format!("section {} has more than one title card", card.number));
            }
            if card.title.trim().is_empty() {
                problems.push(format!("section {} has a blank title", card.number));
            }
            if !wanted.contains(&card.number) {
                warnings.push(format!(
                    "title card {} has no matching section and will be ignored",
                    card.number
                ));
            }
        }

        let missing: Vec<String> = wanted
            .iter()
            .filter(|id| !seen.contains(*id))
            .map(|id| id.to_string())
            .collect();
        if !missing.is_empty() {
            problems.push(format!("no title card for section(s) {}", missing.join(", ")));
        }

        if problems.is_empty() {
            Ok(warnings)
        } else {
            Err(Error::TitleSpec { problems })
        }
    }

    /// The card for `id`, if present.
    pub fn card(&self, id: &SectionId) -> Option<&TitleCardSpec> {
        self.title_cards.iter().find(|c| &c.number == id)
    }

    /// A template with one blank card per section.
    pub fn placeholder(sections: &[SectionId]) -> Self {
        let mut extra = Map::new();
        extra.insert(
            "instructions".into(),
            Value::String(
                "Give every section a short title and a one-sentence description, \
                 then run `reelforge --continue`."
                    .into(),
            ),
        );
        Self {
            title_cards: sections
                .iter()
                .map(|id| TitleCardSpec {
                    number: id.clone(),
                    title: String::new(),
                    description: String::new(),
                })
                .collect(),
            extra,
        }
    }
}

/// Every transcript under a per-section heading.
pub fn combined_transcript(transcripts: &[(SectionId, String)]) -> String {
    let mut out = String::new();
    for (id, text) in transcripts {
        out.push_str(&format!("## Section {id}\n\n{}\n\n", text.trim()));
    }
    out
}

/// Instructions asking a model (or a person) to write the title document.
pub fn generation_prompt(transcripts: &[(SectionId, String)], titles_path: &Path) -> String {
    let example = TitleDocument {
        title_cards: transcripts
            .iter()
            .map(|(id, _)| TitleCardSpec {
                number: id.clone(),
                title: "Short title".into(),
                description: "One sentence describing the section.".into(),
            })
            .collect(),
        extra: Map::new(),
    };
    let example = serde_json::to_string_pretty(&example).unwrap_or_default();

    format!(
        "Below are transcripts of the {count} sections of a recorded presentation.\n\
         Write a title card for each section: a title of at most six words and a\n\
         one-sentence description. Reply with JSON only, in exactly this shape:\n\
         \n\
         {example}\n\
         \n\
         Save the result as {path} and run `reelforge --continue`.\n\
         \n\
         {body}",
        count = transcripts.len(),
        path = titles_path.display(),
        body = combined_transcript(transcripts),
    )
}

/// The HTML template title cards are rendered from: the configured file
/// when it exists, else the built-in one.
pub fn card_template(config: &TitleConfig) -> Result<String> {
    match config.template {
        Some(ref path) if path.exists() => {
            tracing::debug!("Using title template {}", path.display());
            Ok(std::fs::read_to_string(path)?)
        }
        _ => Ok(DEFAULT_TITLE_TEMPLATE.to_string()),
    }
}
