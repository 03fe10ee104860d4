//! Work item discovery and sectioning.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use reelforge_common::{Error, Result, SectionId};

use super::workspace::list_dir;

/// One unit of work: a file belonging to a section.
///
/// Items are discovered by scanning a stage's input directory and are not
/// modified afterwards except to record the outputs a worker produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub section: SectionId,
    pub source: PathBuf,
    /// Files produced for this item, populated by the worker on success.
    pub outputs: Vec<PathBuf>,
}

impl WorkItem {
    pub fn new(section: SectionId, source: impl Into<PathBuf>) -> Self {
        Self {
            section,
            source: source.into(),
            outputs: Vec::new(),
        }
    }

    /// Build an item from a file whose name carries a section prefix.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let section = SectionId::from_file_name(&path.file_name()?.to_string_lossy())?;
        Some(Self::new(section, path))
    }

    /// Source file name, for logs.
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    /// Source file name without extension.
    pub fn stem(&self) -> String {
        self.source
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.section.to_string())
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }
}

/// Items sharing a section id, ordered by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionGroup {
    pub section: SectionId,
    pub parts: Vec<WorkItem>,
}

impl SectionGroup {
    pub fn is_multi_part(&self) -> bool {
        self.parts.len() > 1
    }

    pub fn part_paths(&self) -> Vec<PathBuf> {
        self.parts.iter().map(|p| p.source.clone()).collect()
    }
}

/// Raw clips in `dir` with an accepted extension, sorted by name.
///
/// # Errors
///
/// [`Error::NoWork`] if nothing qualifies.
pub fn discover_raw_inputs(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let files: Vec<PathBuf> = list_dir(dir, None)?
        .into_iter()
        .filter(|p| {
            p.extension().is_some_and(|e| {
                let e = e.to_string_lossy();
                extensions.iter().any(|x| x.eq_ignore_ascii_case(&e))
            })
        })
        .collect();

    if files.is_empty() {
        return Err(Error::NoWork {
            dir: dir.to_path_buf(),
        });
    }
    Ok(files)
}

/// Turn raw clips into work items, rejecting names without a section prefix.
///
/// Every offending file is reported at once. Two clips that would normalize
/// to the same output name are also rejected.
pub fn check_naming(files: &[PathBuf]) -> Result<Vec<WorkItem>> {
    let mut items = Vec::with_capacity(files.len());
    let mut bad = Vec::new();

    for path in files {
        match WorkItem::from_path(path.clone()) {
            Some(item) => items.push(item),
            None => bad.push(path.clone()),
        }
    }

    if !bad.is_empty() {
        return Err(Error::Naming { files: bad });
    }

    let mut stems: HashMap<String, &WorkItem> = HashMap::new();
    for item in &items {
        if let Some(other) = stems.insert(item.stem(), item) {
            return Err(Error::precondition(format!(
                "{} and {} would both normalize to {}.mp4",
                other.file_name(),
                item.file_name(),
                item.stem()
            )));
        }
    }

    Ok(items)
}

/// Scan a stage directory for files named `<id>...<extension>`.
///
/// Files without a section prefix are skipped with a warning.
pub fn scan_stage_dir(dir: &Path, extension: &str) -> Result<Vec<WorkItem>> {
    let mut items = Vec::new();
    for path in list_dir(dir, Some(extension))? {
        match WorkItem::from_path(path.clone()) {
            Some(item) => items.push(item),
            None => tracing::warn!("Ignoring {}: no section prefix", path.display()),
        }
    }
    Ok(items)
}

/// Group items by section id. Groups come out in section order and parts in
/// file name order.
pub fn group_sections(items: Vec<WorkItem>) -> Vec<SectionGroup> {
    let mut groups: BTreeMap<SectionId, Vec<WorkItem>> = BTreeMap::new();
    for item in items {
        groups.entry(item.section.clone()).or_default().push(item);
    }
    groups
        .into_iter()
        .map(|(section, mut parts)| {
            parts.sort_by_key(|p| p.file_name());
            SectionGroup { section, parts }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn exts() -> Vec<String> {
        ["mov", "mp4"].iter().map(|s| s.to_string()).collect()
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, b"").unwrap();
        p
    }

    #[test]
    fn discovery_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "02-c.mov");
        touch(dir.path(), "01-b.MOV");
        touch(dir.path(), "01-a.mp4");
        touch(dir.path(), "notes.txt");
        fs::create_dir(dir.path().join("reelforge-work")).unwrap();

        let files = discover_raw_inputs(dir.path(), &exts()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["01-a.mp4", "01-b.MOV", "02-c.mov"]);
    }

    #[test]
    fn empty_directory_is_no_work() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "readme.md");
        let err = discover_raw_inputs(dir.path(), &exts()).unwrap_err();
        assert!(matches!(err, Error::NoWork { .. }));
    }

    #[test]
    fn naming_violations_are_all_listed() {
        let files = vec![
            PathBuf::from("/raw/01-a.mov"),
            PathBuf::from("/raw/intro.mov"),
            PathBuf::from("/raw/1-b.mov"),
        ];
        match check_naming(&files).unwrap_err() {
            Error::Naming { files } => {
                assert_eq!(
                    files,
                    vec![PathBuf::from("/raw/intro.mov"), PathBuf::from("/raw/1-b.mov")]
                );
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn colliding_stems_are_rejected() {
        let files = vec![PathBuf::from("01-a.mov"), PathBuf::from("01-a.mp4")];
        let err = check_naming(&files).unwrap_err();
        assert!(err.to_string().contains("01-a.mp4"));
    }

    #[test]
    fn grouping_orders_sections_and_parts() {
        let items = check_naming(&[
            PathBuf::from("02-c.mov"),
            PathBuf::from("01-b.mov"),
            PathBuf::from("01-a.mov"),
        ])
        .unwrap();
        let groups = group_sections(items);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].section.as_str(), "01");
        assert!(groups[0].is_multi_part());
        assert_eq!(
            groups[0].part_paths(),
            vec![PathBuf::from("01-a.mov"), PathBuf::from("01-b.mov")]
        );
        assert_eq!(groups[1].section.as_str(), "02");
        assert!(!groups[1].is_multi_part());
    }

    #[test]
    fn stage_scan_skips_unprefixed_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "01-section.mp4");
        touch(dir.path(), "stray.mp4");
        touch(dir.path(), "02.wav");
        let items = scan_stage_dir(dir.path(), "mp4").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].section.as_str(), "01");
    }
}
