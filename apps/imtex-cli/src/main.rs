//! imtex - Markdown to LaTeX conversion wizard
//!
//! Locates the Markdown sources, bibliography, template and citation style
//! in the current working directory, hands them to pandoc and prints (or
//! writes) the resulting LaTeX. Any of the files can be given explicitly to
//! skip discovery.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use imtex_core::convert::{pandoc_available, ConversionJob, ConvertError};
use imtex_core::filetypes::{locate, FileKind, LocateOptions};

/// Files this small are assumed to be stubs left behind by redirection
/// rather than real inputs.
const MIN_FILE_SIZE: u64 = 5;

#[derive(Debug, Parser)]
#[command(
    name = "imtex",
    version,
    about = "A helper for creating complex LaTeX documents from Markdown"
)]
struct Cli {
    /// The markdown file to convert; determined automatically if not given
    #[arg(long)]
    markdown: Option<String>,

    /// An optional template for the output; determined automatically if not given
    #[arg(long)]
    template: Option<String>,

    /// An optional bibliography; determined automatically if not given
    #[arg(long)]
    bibliography: Option<String>,

    /// A Citation Style Language definition file
    #[arg(long)]
    csl: Option<String>,

    /// Write the LaTeX to this file instead of standard output
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Resolution(String),

    #[error(transparent)]
    Conversion(#[from] ConvertError),

    #[error("{0} is not installed. Please install it to proceed.")]
    MissingDependency(&'static str),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Resolution(_) | CliError::Io(_) => 1,
            CliError::Conversion(_) => 2,
            CliError::MissingDependency(_) => 3,
        }
    }
}

/// Resolve the files for one kind, either from an explicit path or by
/// discovery under `root`.
///
/// An explicitly given file must exist; discovery tolerates absence unless
/// the kind is required, and rejects ambiguity unless the kind allows
/// multiple files.
fn resolve(
    root: &Path,
    kind: FileKind,
    given: Option<&str>,
    required: bool,
    recursive: bool,
    reference: Option<&Path>,
) -> Result<Vec<PathBuf>, CliError> {
    if let Some(given) = given.filter(|given| !given.is_empty()) {
        let path = root.join(given);
        if !path.is_file() {
            return Err(CliError::Resolution(format!(
                "provided file '{}' not found",
                path.display()
            )));
        }
        tracing::info!(path = %path.display(), kind = kind.label(), "using provided file");
        return Ok(vec![path]);
    }

    let options = LocateOptions {
        reference: reference.map(Path::to_path_buf),
        recursive,
        min_size: MIN_FILE_SIZE,
    };
    let files = locate(root, kind, &options);
    match files.len() {
        0 if required => Err(CliError::Resolution(format!(
            "no file matching the required {} kind was found under '{}'",
            kind.label(),
            root.display()
        ))),
        0 => {
            tracing::info!(kind = kind.label(), "skipped, no candidate found");
            Ok(files)
        }
        1 => {
            tracing::info!(path = %files[0].display(), kind = kind.label(), "using discovered file");
            Ok(files)
        }
        _ if !kind.allows_multiple() => Err(CliError::Resolution(format!(
            "multiple suitable {} files were found, please specify explicitly",
            kind.label()
        ))),
        _ => {
            tracing::info!(
                count = files.len(),
                kind = kind.label(),
                "using multiple discovered files"
            );
            Ok(files)
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    if !pandoc_available() {
        return Err(CliError::MissingDependency("Pandoc"));
    }

    let root = std::env::current_dir()?;
    let markdown_files = resolve(
        &root,
        FileKind::Markdown,
        cli.markdown.as_deref(),
        true,
        false,
        None,
    )?;
    // Auxiliary kinds disambiguate against the first markdown file's stem.
    let reference = markdown_files.first().cloned();

    let bibliography = resolve(
        &root,
        FileKind::Bibliography,
        cli.bibliography.as_deref(),
        false,
        true,
        reference.as_deref(),
    )?
    .into_iter()
    .next();
    if bibliography
        .as_deref()
        .and_then(Path::extension)
        .and_then(|extension| extension.to_str())
        == Some("bib")
        && !imtex_core::bibliography::citeproc_available()
    {
        return Err(CliError::MissingDependency("Pandoc-citeproc"));
    }

    let template = resolve(
        &root,
        FileKind::Template,
        cli.template.as_deref(),
        false,
        true,
        reference.as_deref(),
    )?
    .into_iter()
    .next();
    let style = resolve(
        &root,
        FileKind::CitationStyle,
        cli.csl.as_deref(),
        false,
        true,
        reference.as_deref(),
    )?
    .into_iter()
    .next();

    let job = ConversionJob::build(markdown_files, bibliography, template, style)?;
    let conversion = job.run()?;

    if !conversion.missing_citations.is_empty() {
        tracing::warn!(
            keys = %conversion.missing_citations.join(", "),
            "citations used in the output are missing from the bibliography"
        );
    }

    match &cli.output {
        Some(path) => fs::write(path, &conversion.latex)?,
        None => print!("{}", conversion.latex),
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{error}");
            ExitCode::from(error.exit_code())
        }
    }
}
