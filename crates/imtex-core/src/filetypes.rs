//! File kind definitions and working-directory discovery
//!
//! imtex assembles a conversion from loose files sharing a working directory:
//! one or more Markdown sources, and optionally a bibliography, a LaTeX
//! template and a CSL style definition. This module describes those kinds
//! and implements the discovery heuristic that picks the right candidate
//! when several files of the same kind are present.
//!
//! # Features
//!
//! - **Closed kind set**: Every file role the converter understands is a
//!   [`FileKind`] variant carrying its extension list and multiplicity policy
//! - **Size filtering**: Near-empty stub files (e.g. a redirected, truncated
//!   `.tex`) are excluded via a minimum-size threshold
//! - **Stem disambiguation**: With multiple candidates, a reference file's
//!   stem selects the matching candidate (`thesis.md` picks `thesis.bib`)
//!
//! # Example
//!
//! ```ignore
//! use imtex_core::filetypes::{locate, FileKind, LocateOptions};
//!
//! let sources = locate(&root, FileKind::Markdown, &LocateOptions::default());
//! ```

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// The role a file plays in a conversion, with its accepted extensions
/// and multiplicity policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Markdown source text; several ordered files may form one document
    Markdown,
    /// Bibliography database (BibTeX) or structured entries (CSL JSON)
    Bibliography,
    /// LaTeX template handed to pandoc via `--template`
    Template,
    /// Citation Style Language definition
    CitationStyle,
}

impl FileKind {
    /// File extensions accepted for this kind, without the leading dot.
    ///
    /// Matching is exact; `Rmd` is deliberately capitalized as emitted by
    /// the R ecosystem.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            FileKind::Markdown => &[
                "markdown", "mdown", "mkdn", "md", "mkd", "mdwn", "mdtxt", "mdtext", "text", "Rmd",
            ],
            FileKind::Bibliography => &["bib", "json"],
            FileKind::Template => &["tex"],
            FileKind::CitationStyle => &["csl"],
        }
    }

    /// Whether a conversion may consume more than one file of this kind.
    pub fn allows_multiple(&self) -> bool {
        matches!(self, FileKind::Markdown)
    }

    /// Human-readable kind name for log and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Markdown => "markdown",
            FileKind::Bibliography => "bibliography",
            FileKind::Template => "template",
            FileKind::CitationStyle => "citation style",
        }
    }

    fn matches(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions().contains(&extension)
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Options controlling [`locate`].
#[derive(Debug, Clone, Default)]
pub struct LocateOptions {
    /// A file whose stem disambiguates between multiple candidates
    pub reference: Option<PathBuf>,
    /// Descend into subdirectories instead of scanning only `root` itself
    pub recursive: bool,
    /// Candidates smaller than this many bytes are discarded
    pub min_size: u64,
}

impl LocateOptions {
    /// Recursive discovery without size filtering or a reference file.
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Self::default()
        }
    }
}

/// Find all files of the given kind under `root`.
///
/// Candidates are returned in discovery order; no sorting happens here.
/// When more than one candidate survives the size filter and a reference
/// file is configured, the single candidate whose stem equals the
/// reference's stem wins. If no candidate (or more than one) matches by
/// stem, the full filtered set is returned and the caller decides whether
/// multiplicity is acceptable.
///
/// Zero or many results are not errors at this level; the required/optional
/// policy belongs to the caller. Unreadable directory entries are skipped.
pub fn locate(root: &Path, kind: FileKind, options: &LocateOptions) -> Vec<PathBuf> {
    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let candidates: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| kind.matches(entry.path()))
        .filter(|entry| match entry.metadata() {
            Ok(metadata) => metadata.len() >= options.min_size,
            Err(error) => {
                tracing::debug!(
                    path = %entry.path().display(),
                    %error,
                    "skipping unreadable candidate"
                );
                false
            }
        })
        .map(|entry| entry.into_path())
        .collect();

    if candidates.len() > 1 {
        if let Some(reference_stem) = options
            .reference
            .as_deref()
            .and_then(|reference| reference.file_stem())
        {
            let mut matching = candidates
                .iter()
                .filter(|candidate| candidate.file_stem() == Some(reference_stem));
            if let (Some(winner), None) = (matching.next(), matching.next()) {
                return vec![winner.clone()];
            }
        }
    }

    candidates
}
