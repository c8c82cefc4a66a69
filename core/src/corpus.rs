//! Per-concept text records and incoming-link records, read lazily from
//! JSON / JSONL files.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRecord {
    pub title: String,
    pub text: String,
    /// Titles of concepts linking here, when the extractor recorded them inline.
    #[serde(default)]
    pub links_in: Vec<String>,
}

impl ConceptRecord {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self { title: title.into(), text: text.into(), links_in: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub target: String,
    pub sources: Vec<String>,
}

pub type RecordIter<'a, T> = Box<dyn Iterator<Item = Result<T>> + 'a>;

/// A finite source of concept records that can be iterated again from the
/// start any number of times.
pub trait Corpus {
    fn records(&self) -> Result<RecordIter<'_, ConceptRecord>>;
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    records: Vec<ConceptRecord>,
}

impl MemoryCorpus {
    pub fn new(records: Vec<ConceptRecord>) -> Self { Self { records } }
}

impl Corpus for MemoryCorpus {
    fn records(&self) -> Result<RecordIter<'_, ConceptRecord>> {
        Ok(Box::new(self.records.iter().cloned().map(Ok)))
    }
}

/// Records stored in `.json` / `.jsonl` files under a path.
#[derive(Debug, Clone)]
pub struct JsonlCorpus {
    files: Vec<PathBuf>,
}

impl JsonlCorpus {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self { files: discover(path.as_ref())? })
    }

    pub fn files(&self) -> &[PathBuf] { &self.files }
}

impl Corpus for JsonlCorpus {
    fn records(&self) -> Result<RecordIter<'_, ConceptRecord>> {
        Ok(Box::new(self.files.iter().flat_map(|file| read_records::<ConceptRecord>(file))))
    }
}

/// Stream every link record found under `path`.
pub fn read_links(path: &Path) -> Result<RecordIter<'static, LinkRecord>> {
    let files = discover(path)?;
    Ok(Box::new(files.into_iter().flat_map(|file| read_records::<LinkRecord>(&file))))
}

/// Input files under `path` in sorted order, so iteration order is stable.
fn discover(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Input { path: path.to_path_buf(), reason: e.to_string() })?;
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if path.is_file() {
        files.push(path.to_path_buf());
    } else {
        return Err(Error::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "input path does not exist"),
        });
    }
    files.sort();
    Ok(files)
}

fn read_records<T: DeserializeOwned + 'static>(file: &Path) -> RecordIter<'static, T> {
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        read_jsonl(file)
    } else {
        read_json(file)
    }
}

fn read_jsonl<T: DeserializeOwned + 'static>(file: &Path) -> RecordIter<'static, T> {
    let path = file.to_path_buf();
    let f = match File::open(&path) {
        Ok(f) => f,
        Err(e) => return Box::new(std::iter::once(Err(Error::Io { path, source: e }))),
    };
    let lines = BufReader::new(f).lines().enumerate();
    Box::new(lines.filter_map(move |(n, line)| match line {
        Err(e) => Some(Err(Error::Io { path: path.clone(), source: e })),
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(serde_json::from_str(&line).map_err(|e| Error::Input {
            path: path.clone(),
            reason: format!("line {}: {e}", n + 1),
        })),
    }))
}

fn read_json<T: DeserializeOwned + 'static>(file: &Path) -> RecordIter<'static, T> {
    let path = file.to_path_buf();
    let parsed = File::open(&path)
        .map_err(Error::io(&path))
        .and_then(|f| {
            serde_json::from_reader::<_, serde_json::Value>(BufReader::new(f))
                .map_err(|e| Error::Input { path: path.clone(), reason: e.to_string() })
        });
    let values = match parsed {
        Ok(serde_json::Value::Array(arr)) => arr,
        Ok(obj @ serde_json::Value::Object(_)) => vec![obj],
        Ok(_) => Vec::new(),
        Err(e) => return Box::new(std::iter::once(Err(e))),
    };
    Box::new(values.into_iter().map(move |v| {
        serde_json::from_value(v).map_err(|e| Error::Input { path: path.clone(), reason: e.to_string() })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reads_jsonl_and_json_in_path_order() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("b.jsonl"),
            "{\"title\":\"B1\",\"text\":\"x\"}\n\n{\"title\":\"B2\",\"text\":\"y\",\"links_in\":[\"A\"]}\n",
        )
        .unwrap();
        fs::write(dir.path().join("a.json"), r#"[{"title":"A","text":"z"}]"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let corpus = JsonlCorpus::open(dir.path()).unwrap();
        let titles: Vec<String> = corpus.records().unwrap().map(|r| r.unwrap().title).collect();
        assert_eq!(titles, vec!["A", "B1", "B2"]);
        // restartable
        assert_eq!(corpus.records().unwrap().count(), 3);
    }

    #[test]
    fn bad_line_reports_its_position() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("c.jsonl");
        fs::write(&file, "{\"title\":\"ok\",\"text\":\"\"}\n{oops\n").unwrap();
        let corpus = JsonlCorpus::open(&file).unwrap();
        let results: Vec<_> = corpus.records().unwrap().collect();
        assert!(results[0].is_ok());
        match &results[1] {
            Err(Error::Input { reason, .. }) => assert!(reason.starts_with("line 2")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
