pub mod archive;
pub mod assembler;
pub mod bibliography;
pub mod flatten;
pub mod instruction;
pub mod scanner;
pub mod structure;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub use archive::{open_upload, UploadSources};
pub use assembler::assemble;
pub use flatten::{flatten, table_of_contents, ChunkRecord};
pub use instruction::{compose_instruction, DEFAULT_TEMPLATE};
pub use scanner::extract_title;
pub use structure::{build_section_tree, SectionLevel, SectionNode, SectionTree};

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No .tex file found under {0}")]
    NoTexFile(PathBuf),
    #[error("Failed to unpack {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsafe archive entry: {0}")]
    UnsafeArchiveEntry(PathBuf),
}

/// Everything extracted from one LaTeX document.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub title: String,
    pub tree: SectionTree,
    pub chunks: Vec<ChunkRecord>,
    pub instruction: String,
}

/// Runs the extraction pipeline on already assembled LaTeX.
pub fn process_text(latex: &str, template: &str, bib_max_bytes: usize) -> ProcessedDocument {
    let tree = build_section_tree(latex, bib_max_bytes);
    let chunks = flatten(&tree);
    let toc = table_of_contents(&tree);

    // title and \newcommand lines are read from the text without the bibliography
    let body = bibliography::remove_bibliography(latex);
    let title = scanner::extract_title(&body);
    let newcommands = scanner::extract_newcommands(&body);
    let instruction = compose_instruction(template, &title, &toc, &newcommands);

    ProcessedDocument {
        title,
        tree,
        chunks,
        instruction,
    }
}

/// Assembles `root` and runs the extraction pipeline on it.
pub fn process(root: &Path, template: &str, bib_max_bytes: usize) -> Result<ProcessedDocument, DocumentError> {
    let latex = assemble(root)?;
    Ok(process_text(&latex, template, bib_max_bytes))
}

/// Resolves the main `.tex` file of an upload.
///
/// A file path is returned as is. For a directory, the first `.tex` file
/// (in path order) containing `\documentclass` wins, falling back to the
/// first `.tex` file found.
pub fn find_main_tex(path: &Path) -> Result<PathBuf, DocumentError> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "tex"))
        .collect();
    candidates.sort();

    candidates
        .iter()
        .find(|p| {
            fs::read_to_string(p)
                .map(|text| text.contains("\\documentclass"))
                .unwrap_or(false)
        })
        .or_else(|| candidates.first())
        .cloned()
        .ok_or_else(|| DocumentError::NoTexFile(path.to_path_buf()))
}
