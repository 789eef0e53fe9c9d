//! Pandoc invocation and conversion-parameter assembly
//!
//! A [`ConversionJob`] owns everything one pandoc run needs: the ordered
//! Markdown inputs, the assembled flag list and the working directory.
//! Building a job freezes its parameters; running it performs exactly one
//! external invocation against a scratch directory that is removed on every
//! exit path.
//!
//! # Features
//!
//! - **Deterministic input order**: Multi-file documents sort by the numeric
//!   prefix of each filename stem (`1-intro`, `2-body`, then unnumbered
//!   files in their original order)
//! - **Path normalization**: Auxiliary files are rewritten relative to the
//!   first Markdown file's directory where possible
//! - **Structured outcome**: [`Conversion`] carries the LaTeX text plus the
//!   advisory list of citation keys missing from the bibliography, so no
//!   ambient logging is needed to use the core headlessly
//!
//! # Example
//!
//! ```ignore
//! use imtex_core::convert::ConversionJob;
//!
//! let job = ConversionJob::build(markdown_files, Some(bibliography), None, None)?;
//! let conversion = job.run()?;
//! println!("{}", conversion.latex);
//! ```

use std::path::{Component, Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::bibliography::{BibliographyError, BibliographyIndex};

/// Errors that can occur while building or running a conversion
#[derive(Debug, Error)]
pub enum ConvertError {
    /// No Markdown input files were given
    #[error("no markdown input files were given")]
    NoInput,

    /// A listed Markdown input does not exist
    #[error("markdown file does not exist: {0}")]
    MissingInput(PathBuf),

    /// Pandoc exited with a non-zero status; carries its stderr verbatim
    #[error("pandoc exited with status {exit_code}: {diagnostic}")]
    Failed { diagnostic: String, exit_code: i32 },

    /// Launching pandoc or handling the scratch directory failed
    #[error("i/o failure during conversion: {0}")]
    Io(#[from] std::io::Error),

    /// The supplied bibliography could not be loaded for the coverage check
    #[error(transparent)]
    Bibliography(#[from] BibliographyError),
}

/// Result type for conversion operations
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Check whether pandoc is installed and runnable.
pub fn pandoc_available() -> bool {
    Command::new("pandoc")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// An ordered pandoc argument list with set semantics for non-repeatable
/// flags.
///
/// Most pandoc flags may only appear once; adding one a second time is a
/// no-op. Filter flags chain and may repeat, though an identical argument
/// string is still only kept once. Positional file arguments are not part
/// of the set; they are appended at invocation time, after all flags.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    parameters: Vec<String>,
}

impl ParameterSet {
    /// Flags that legitimately appear several times on one command line.
    const REPEATABLE: &'static [&'static str] = &["--filter", "--lua-filter"];

    /// Add a parameter, preserving insertion order.
    ///
    /// Duplicate argument strings are dropped. A parameter whose flag name
    /// is already present is also dropped unless the flag is repeatable;
    /// the first occurrence wins.
    pub fn push(&mut self, parameter: impl Into<String>) {
        let parameter = parameter.into();
        if self.parameters.contains(&parameter) {
            return;
        }
        let flag = Self::flag_name(&parameter);
        if !Self::REPEATABLE.contains(&flag)
            && self
                .parameters
                .iter()
                .any(|existing| Self::flag_name(existing) == flag)
        {
            return;
        }
        self.parameters.push(parameter);
    }

    /// The flag portion of a `--flag=value` parameter.
    fn flag_name(parameter: &str) -> &str {
        match parameter.split_once('=') {
            Some((flag, _)) => flag,
            None => parameter,
        }
    }

    /// The assembled arguments, in insertion order.
    pub fn as_args(&self) -> &[String] {
        &self.parameters
    }

    /// Number of assembled arguments.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Check if no arguments were assembled.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// The outcome of a successful conversion.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// The generated LaTeX document
    pub latex: String,
    /// Citation keys used in the output but absent from the bibliography;
    /// empty when no bibliography was supplied or coverage is complete
    pub missing_citations: Vec<String>,
}

/// A frozen pandoc invocation: ordered inputs, assembled flags, working
/// directory.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    markdown_files: Vec<PathBuf>,
    citation_file: Option<PathBuf>,
    parameters: ParameterSet,
    working_dir: PathBuf,
}

impl ConversionJob {
    /// Assemble a job from resolved input files.
    ///
    /// Markdown inputs are sorted by numeric filename prefix. Auxiliary
    /// files that do not exist are silently treated as absent; the style
    /// file is only attached when a bibliography is present as well, since
    /// pandoc ignores a CSL definition without one.
    pub fn build(
        markdown_files: Vec<PathBuf>,
        citation_file: Option<PathBuf>,
        template_file: Option<PathBuf>,
        style_file: Option<PathBuf>,
    ) -> ConvertResult<Self> {
        if markdown_files.is_empty() {
            return Err(ConvertError::NoInput);
        }
        for file in &markdown_files {
            if !file.is_file() {
                return Err(ConvertError::MissingInput(file.clone()));
            }
        }

        let mut markdown_files = markdown_files;
        sort_by_numeric_prefix(&mut markdown_files);

        // Pandoc runs from the directory of the first input file, so all
        // auxiliary paths are expressed relative to it where possible.
        let working_dir = markdown_files[0]
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let citation_file = citation_file.filter(|file| file.is_file());
        let template_file = template_file.filter(|file| file.is_file());
        let style_file = style_file.filter(|file| file.is_file());

        let mut parameters = ParameterSet::default();
        parameters.push("--from=markdown");
        parameters.push("--to=latex");
        parameters.push("--standalone");
        parameters.push("--listings");
        parameters.push("--filter=pandoc-crossref");
        parameters.push("--toc");

        if let Some(citation) = &citation_file {
            // BibTeX needs the format flag; CSL JSON is pandoc's native
            // bibliography representation and needs none.
            if citation.extension().and_then(|e| e.to_str()) == Some("bib") {
                parameters.push("--biblatex");
            }
            parameters.push(format!(
                "--bibliography={}",
                normalize(citation, &working_dir).display()
            ));
            if let Some(style) = &style_file {
                parameters.push(format!(
                    "--csl={}",
                    normalize(style, &working_dir).display()
                ));
            }
        }
        if let Some(template) = &template_file {
            parameters.push(format!(
                "--template={}",
                normalize(template, &working_dir).display()
            ));
        }

        Ok(Self {
            markdown_files,
            citation_file,
            parameters,
            working_dir,
        })
    }

    /// The Markdown inputs in conversion order.
    pub fn markdown_files(&self) -> &[PathBuf] {
        &self.markdown_files
    }

    /// The frozen flag list.
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Run pandoc once and collect the generated LaTeX.
    ///
    /// Output goes through a scratch file in a fresh temporary directory
    /// which is removed when this function returns, on success and failure
    /// alike. On success, if a bibliography was supplied, the citation
    /// coverage check runs against the output; its findings are advisory
    /// and land in [`Conversion::missing_citations`] without failing the
    /// conversion.
    pub fn run(&self) -> ConvertResult<Conversion> {
        let scratch = tempfile::tempdir()?;
        let output_file = scratch.path().join("output.tex");

        tracing::debug!(
            files = self.markdown_files.len(),
            working_dir = %self.working_dir.display(),
            "invoking pandoc"
        );
        let output = Command::new("pandoc")
            .current_dir(&self.working_dir)
            .args(self.parameters.as_args())
            .arg(format!("--output={}", output_file.display()))
            .args(&self.markdown_files)
            .output()?;

        if !output.status.success() {
            return Err(ConvertError::Failed {
                diagnostic: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
            });
        }

        let latex = std::fs::read_to_string(&output_file)?;

        let missing_citations = match &self.citation_file {
            Some(citation) => BibliographyIndex::load(citation)?
                .missing_citations(&latex)
                .into_iter()
                .collect(),
            None => Vec::new(),
        };

        Ok(Conversion {
            latex,
            missing_citations,
        })
    }
}

/// Sort paths by the leading digit run of their filename stem, ascending.
///
/// Stems without a numeric prefix sort after all numbered files and keep
/// their original relative order (stable sort).
fn sort_by_numeric_prefix(files: &mut [PathBuf]) {
    files.sort_by_key(|file| match numeric_prefix(file) {
        Some(number) => (false, number),
        None => (true, 0),
    });
}

fn numeric_prefix(file: &Path) -> Option<u64> {
    let stem = file.file_stem()?.to_str()?;
    let digits: String = stem.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Express `path` relative to `base` where possible; otherwise (e.g. a
/// different filesystem prefix) return it unchanged.
fn normalize(path: &Path, base: &Path) -> PathBuf {
    relative_to(path, base).unwrap_or_else(|| path.to_path_buf())
}

fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    if path.is_absolute() != base.is_absolute() {
        return None;
    }

    let mut path_components = path.components();
    let mut base_components = base.components();
    let mut result: Vec<Component> = Vec::new();
    loop {
        match (path_components.next(), base_components.next()) {
            (None, None) => break,
            (Some(p), None) => {
                result.push(p);
                result.extend(path_components.by_ref());
                break;
            }
            (None, Some(_)) => result.push(Component::ParentDir),
            (Some(p), Some(b)) if result.is_empty() && p == b => {}
            (Some(Component::Prefix(_)), Some(_)) | (Some(_), Some(Component::Prefix(_))) => {
                // Different drives on Windows; not expressible relatively.
                return None;
            }
            (Some(p), Some(Component::CurDir)) => result.push(p),
            (Some(_), Some(Component::ParentDir)) => return None,
            (Some(p), Some(_)) => {
                result.push(Component::ParentDir);
                result.extend(base_components.by_ref().map(|_| Component::ParentDir));
                result.push(p);
                result.extend(path_components.by_ref());
                break;
            }
        }
    }
    Some(result.iter().map(|component| component.as_os_str()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, "# stub\n").unwrap();
        path
    }

    #[test]
    fn test_build_rejects_empty_input() {
        assert!(matches!(
            ConversionJob::build(Vec::new(), None, None, None),
            Err(ConvertError::NoInput)
        ));
    }

    #[test]
    fn test_build_rejects_missing_input() {
        let dir = TempDir::new().unwrap();
        let ghost = dir.path().join("ghost.md");
        assert!(matches!(
            ConversionJob::build(vec![ghost], None, None, None),
            Err(ConvertError::MissingInput(_))
        ));
    }

    #[test]
    fn test_numeric_prefix_ordering() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            touch(&dir, "3_file.md"),
            touch(&dir, "0-file.md"),
            touch(&dir, "2 file.md"),
            touch(&dir, "last file.md"),
        ];

        let job = ConversionJob::build(files, None, None, None).unwrap();
        let names: Vec<_> = job
            .markdown_files()
            .iter()
            .map(|file| file.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["0-file.md", "2 file.md", "3_file.md", "last file.md"]);
    }

    #[test]
    fn test_unnumbered_files_keep_relative_order() {
        let dir = TempDir::new().unwrap();
        let files = vec![
            touch(&dir, "epilogue.md"),
            touch(&dir, "appendix.md"),
            touch(&dir, "1-intro.md"),
        ];

        let job = ConversionJob::build(files, None, None, None).unwrap();
        let names: Vec<_> = job
            .markdown_files()
            .iter()
            .map(|file| file.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["1-intro.md", "epilogue.md", "appendix.md"]);
    }

    #[test]
    fn test_base_parameters_always_present() {
        let dir = TempDir::new().unwrap();
        let files = vec![touch(&dir, "document.md")];
        let job = ConversionJob::build(files, None, None, None).unwrap();
        let args = job.parameters().as_args();
        for expected in [
            "--from=markdown",
            "--to=latex",
            "--standalone",
            "--listings",
            "--filter=pandoc-crossref",
            "--toc",
        ] {
            assert!(args.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn test_bibtex_bibliography_adds_format_flag() {
        let dir = TempDir::new().unwrap();
        let files = vec![touch(&dir, "document.md")];
        let bibliography = touch(&dir, "references.bib");

        let job = ConversionJob::build(files, Some(bibliography), None, None).unwrap();
        let args = job.parameters().as_args();
        assert!(args.contains(&"--biblatex".to_string()));
        assert!(args.contains(&"--bibliography=references.bib".to_string()));
    }

    #[test]
    fn test_csl_json_bibliography_needs_no_format_flag() {
        let dir = TempDir::new().unwrap();
        let files = vec![touch(&dir, "document.md")];
        let bibliography = touch(&dir, "references.json");

        let job = ConversionJob::build(files, Some(bibliography), None, None).unwrap();
        let args = job.parameters().as_args();
        assert!(!args.contains(&"--biblatex".to_string()));
        assert!(args.contains(&"--bibliography=references.json".to_string()));
    }

    #[test]
    fn test_style_requires_bibliography() {
        let dir = TempDir::new().unwrap();
        let files = vec![touch(&dir, "document.md")];
        let style = touch(&dir, "journal.csl");

        let job = ConversionJob::build(files.clone(), None, None, Some(style.clone())).unwrap();
        assert!(!job
            .parameters()
            .as_args()
            .iter()
            .any(|arg| arg.starts_with("--csl=")));

        let bibliography = touch(&dir, "references.bib");
        let job = ConversionJob::build(files, Some(bibliography), None, Some(style)).unwrap();
        assert!(job
            .parameters()
            .as_args()
            .contains(&"--csl=journal.csl".to_string()));
    }

    #[test]
    fn test_missing_auxiliary_files_are_dropped() {
        let dir = TempDir::new().unwrap();
        let files = vec![touch(&dir, "document.md")];
        let ghost = dir.path().join("ghost.bib");

        let job = ConversionJob::build(files, Some(ghost), None, None).unwrap();
        assert!(!job
            .parameters()
            .as_args()
            .iter()
            .any(|arg| arg.starts_with("--bibliography=")));
    }

    #[test]
    fn test_template_path_normalized_to_working_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("assets");
        fs::create_dir(&nested).unwrap();
        let template = nested.join("layout.tex");
        fs::write(&template, "% template\n").unwrap();
        let files = vec![touch(&dir, "document.md")];

        let job = ConversionJob::build(files, None, Some(template), None).unwrap();
        let expected = format!("--template={}", Path::new("assets").join("layout.tex").display());
        assert!(job.parameters().as_args().contains(&expected));
    }

    #[test]
    fn test_parameter_set_deduplicates_flags() {
        let mut parameters = ParameterSet::default();
        parameters.push("--toc");
        parameters.push("--toc");
        parameters.push("--bibliography=a.bib");
        parameters.push("--bibliography=b.bib");
        assert_eq!(parameters.as_args(), ["--toc", "--bibliography=a.bib"]);
    }

    #[test]
    fn test_parameter_set_keeps_repeatable_flags() {
        let mut parameters = ParameterSet::default();
        parameters.push("--filter=pandoc-crossref");
        parameters.push("--filter=other-filter");
        parameters.push("--filter=pandoc-crossref");
        assert_eq!(
            parameters.as_args(),
            ["--filter=pandoc-crossref", "--filter=other-filter"]
        );
    }

    #[test]
    fn test_relative_to_sibling_directory() {
        let relative = relative_to(Path::new("/a/b/c.bib"), Path::new("/a/d")).unwrap();
        assert_eq!(relative, Path::new("../b/c.bib"));
    }

    #[test]
    fn test_relative_to_mixed_absoluteness() {
        assert!(relative_to(Path::new("c.bib"), Path::new("/a/d")).is_none());
    }
}
