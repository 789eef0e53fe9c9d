//! imtex Core - Markdown to LaTeX conversion via pandoc
//!
//! This crate provides the core functionality for the imtex conversion
//! wizard:
//!
//! - **Filetypes**: File kind definitions (Markdown, bibliography, template,
//!   CSL style) and the working-directory discovery heuristic that picks the
//!   right candidate among several
//! - **Bibliography**: Citation-key indexing for BibTeX and CSL JSON
//!   bibliographies, plus extraction of `\cite`-family macros from generated
//!   LaTeX for the advisory coverage check
//! - **Convert**: Deterministic assembly of pandoc parameters from resolved
//!   inputs and the single-shot external invocation producing the LaTeX text
//!
//! The actual Markdown -> LaTeX transformation is delegated entirely to the
//! pandoc binary; this crate only decides what to hand it and checks what
//! comes back. Everything is synchronous and headless: results and advisory
//! findings are returned as data, so the library is usable without any
//! process-wide logging state.

pub mod bibliography;
pub mod convert;
pub mod filetypes;

pub use bibliography::*;
pub use convert::*;
pub use filetypes::*;
