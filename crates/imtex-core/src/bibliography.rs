//! Bibliography indexing and citation coverage checks
//!
//! The converter never formats references itself; pandoc does. What imtex
//! needs is only the set of citation keys a bibliography defines, so it can
//! verify that every key cited in the generated LaTeX actually resolves.
//!
//! # Features
//!
//! - **Two input formats**: CSL JSON is parsed in-process; BibTeX is
//!   converted through `pandoc-citeproc --bib2json` first
//! - **Citation extraction**: A narrow regex finds `\cite`-family macros in
//!   LaTeX output (`\cite{...}`, `\autocite{...}`, `\textcite{...}`, ...)
//! - **Coverage diff**: [`BibliographyIndex::missing_citations`] reports keys
//!   cited in the output but absent from the index; the check is advisory
//!   and never aborts a conversion
//!
//! The citation regex is a deliberate approximation of LaTeX macro syntax,
//! not a parser. It covers everything pandoc emits for citations and nothing
//! more.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::process::Command;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

lazy_static! {
    /// Any run of lowercase letters directly preceding `cite`, so both the
    /// bare macro and biblatex's prefixed family match.
    static ref CITATION_MACRO: Regex = Regex::new(r"\\[a-z]*cite\{([^}]+)\}").unwrap();
}

/// Errors that can occur while loading a bibliography
#[derive(Debug, Error)]
pub enum BibliographyError {
    /// The file extension is neither `.bib` nor `.json`
    #[error("unsupported bibliography format: {0}")]
    UnsupportedFormat(String),

    /// `pandoc-citeproc` reported failure; carries its stderr verbatim
    #[error("pandoc-citeproc failed for '{path}': {diagnostic}")]
    Helper { path: String, diagnostic: String },

    /// The bibliography (or helper output) is not valid CSL JSON
    #[error("malformed bibliography data: {0}")]
    Parse(#[from] serde_json::Error),

    /// An entry lacks the `id` field naming its citation key
    #[error("bibliography entry without an 'id' key")]
    MissingKey,

    /// Reading the file or launching the helper failed
    #[error("could not read bibliography: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bibliography operations
pub type BibliographyResult<T> = Result<T, BibliographyError>;

/// Check whether `pandoc-citeproc` is installed and runnable.
pub fn citeproc_available() -> bool {
    Command::new("pandoc-citeproc")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Bibliography entries indexed by citation key.
///
/// Entry payloads are kept opaque (`serde_json::Value`); only the key set
/// matters for coverage checking.
#[derive(Debug, Default, Clone)]
pub struct BibliographyIndex {
    entries: HashMap<String, Value>,
}

impl BibliographyIndex {
    /// Load a bibliography file, dispatching on its extension.
    ///
    /// `.json` is treated as CSL JSON and parsed directly. `.bib` is piped
    /// through `pandoc-citeproc --bib2json` and the helper's JSON output is
    /// parsed; on non-zero exit the helper's stderr is surfaced in the
    /// error. Loading the same file twice yields the same key set.
    pub fn load(path: &Path) -> BibliographyResult<Self> {
        let json = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => std::fs::read_to_string(path)?,
            Some("bib") => Self::bib_to_json(path)?,
            _ => {
                return Err(BibliographyError::UnsupportedFormat(
                    path.display().to_string(),
                ))
            }
        };

        let parsed: Vec<Value> = serde_json::from_str(&json)?;
        let mut entries = HashMap::with_capacity(parsed.len());
        for entry in parsed {
            let key = entry
                .get("id")
                .and_then(Value::as_str)
                .ok_or(BibliographyError::MissingKey)?;
            entries.insert(key.to_string(), entry);
        }
        Ok(Self { entries })
    }

    fn bib_to_json(path: &Path) -> BibliographyResult<String> {
        tracing::debug!(path = %path.display(), "converting BibTeX via pandoc-citeproc");
        let output = Command::new("pandoc-citeproc")
            .arg("--bib2json")
            .arg(path)
            .output()?;

        if !output.status.success() {
            return Err(BibliographyError::Helper {
                path: path.display().to_string(),
                diagnostic: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Check if a citation key is defined.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All citation keys, sorted alphabetically.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<_> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Get an entry's raw payload by citation key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Citation keys used in `latex` that this index does not define.
    ///
    /// An empty result means full coverage. The outcome is advisory; it is
    /// up to the caller to surface it as a warning.
    pub fn missing_citations(&self, latex: &str) -> BTreeSet<String> {
        used_citations(latex)
            .into_iter()
            .filter(|key| !self.contains(key))
            .collect()
    }
}

/// Extract every citation key referenced by a `\cite`-family macro.
///
/// Keys are yielded in order of appearance; duplicates are preserved.
/// Multiple keys inside one macro (`\autocite{a,b}`) are split on commas
/// and trimmed.
pub fn used_citations(latex: &str) -> Vec<String> {
    CITATION_MACRO
        .captures_iter(latex)
        .flat_map(|capture| {
            capture[1]
                .split(',')
                .map(|key| key.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|key| !key.is_empty())
        .collect()
}
