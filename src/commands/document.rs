use anyhow::{Context, Result};
use colored::Colorize;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::database::{ChunkTable, Database, PaperEntry, StoreOutcome};
use crate::document::{self, DEFAULT_TEMPLATE};
use crate::llm::EmbeddingGenerator;

/// Display title used when the document has no `\title{...}`.
pub const TITLE_NOT_FOUND: &str = "Title is not found.";

#[derive(Debug, Clone)]
pub struct AddedPaper {
    pub title: String,
    pub entry: PaperEntry,
    pub outcome: StoreOutcome,
    pub chunks: usize,
}

/// Reads an instruction template file, or the built-in one.
pub fn load_template(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read template {}", path.display())),
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

/// Processes, embeds, stores and registers one paper.
///
/// `path` is a `.tex` file, a directory holding the sources or a `.tar.gz`
/// of them, as distributed by arXiv. A paper whose
/// chunk table is already stored is not embedded again; its registry entry
/// is still updated to `title`.
pub async fn add_paper(
    db: &Database,
    generator: &EmbeddingGenerator,
    path: &Path,
    title: Option<&str>,
    template: &str,
    bib_max_bytes: usize,
) -> Result<AddedPaper> {
    let upload = document::open_upload(path)?;
    let main_tex = document::find_main_tex(upload.root())?;
    info!("Processing {}", main_tex.display());
    let processed = document::process(&main_tex, template, bib_max_bytes)?;
    drop(upload);

    let title = title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| Some(processed.title.trim().to_string()).filter(|t| !t.is_empty()))
        .unwrap_or_else(|| TITLE_NOT_FOUND.to_string());

    let mut table = ChunkTable::from_records(processed.chunks);
    let chunks = table.len();
    let hash = table.content_hash();

    let (entry, outcome) = if db.is_stored(&hash) {
        warn!("'{}' was already processed as {}", title, hash);
        (db.paper_paths(&hash), StoreOutcome::AlreadyStored)
    } else {
        generator.fill_missing(&mut table).await?;
        db.store_paper(&table, &processed.instruction)?
    };

    db.register(&title, entry.clone())?;
    Ok(AddedPaper {
        title,
        entry,
        outcome,
        chunks,
    })
}

/// Writes the chunk table (without embeddings) and the instruction of one
/// LaTeX document.
pub fn process_to_files(
    tex: &Path,
    output: &Path,
    inst: Option<&Path>,
    template: &str,
    bib_max_bytes: usize,
) -> Result<usize> {
    let processed = document::process(tex, template, bib_max_bytes)?;
    let table = ChunkTable::from_records(processed.chunks);
    table.save(output)?;
    if let Some(inst) = inst {
        fs::write(inst, &processed.instruction)
            .with_context(|| format!("failed to write {}", inst.display()))?;
    }
    Ok(table.len())
}

/// Fills missing embeddings of a stored table, writing to `output` or back
/// in place.
pub async fn embed_file(generator: &EmbeddingGenerator, csv: &Path, output: Option<&Path>) -> Result<usize> {
    let mut table = ChunkTable::load(csv)?;
    let filled = generator.fill_missing(&mut table).await?;
    let target: PathBuf = output.unwrap_or(csv).to_path_buf();
    table.save(&target)?;
    Ok(filled)
}

/// Splits `add` arguments into a path and an optional title.
///
/// The path may be double-quoted. Unquoted, the longest leading run of words
/// naming an existing file or directory is the path, so paths with spaces
/// work without quotes too.
pub fn split_add_args(args: &str) -> Result<(&str, Option<&str>), String> {
    let args = args.trim();
    if let Some(quoted) = args.strip_prefix('"') {
        let (path, rest) = quoted
            .split_once('"')
            .ok_or_else(|| "Unterminated quote in path".to_string())?;
        let rest = rest.trim();
        return Ok((path, Some(rest).filter(|t| !t.is_empty())));
    }

    let boundaries = args
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .chain(std::iter::once(args.len()));
    let mut longest_existing = None;
    for end in boundaries {
        if Path::new(&args[..end]).exists() {
            longest_existing = Some(end);
        }
    }

    let end = longest_existing
        .or_else(|| args.find(char::is_whitespace))
        .unwrap_or(args.len());
    let rest = args[end..].trim();
    Ok((&args[..end], Some(rest).filter(|t| !t.is_empty())))
}

/// Shell front end of [`add_paper`]: `add <path> [title]`.
pub async fn handle_add(
    args: &str,
    db: &Database,
    generator: &EmbeddingGenerator,
    template: &str,
    bib_max_bytes: usize,
) -> Result<AddedPaper, String> {
    let args = args.trim();
    if args.is_empty() {
        return Err("Usage: add <path> [title]".to_string());
    }
    let (path, title) = split_add_args(args)?;

    println!("📄 Adding paper from: {}", path.bright_yellow());
    let added = add_paper(db, generator, Path::new(path), title, template, bib_max_bytes)
        .await
        .map_err(|e| format!("Failed to add paper: {:#}", e))?;

    match added.outcome {
        StoreOutcome::Created => println!(
            "✅ Stored {} chunks of '{}'",
            added.chunks.to_string().cyan(),
            added.title.bright_green()
        ),
        StoreOutcome::AlreadyStored => println!(
            "⚠️  '{}' was already processed; reusing {}",
            added.title.bright_green(),
            added.entry.csv.display()
        ),
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::archive::tests::write_tar_gz;
    use crate::llm::semantic_search::tests::FixedProvider;
    use std::sync::Arc;
    use tempfile::tempdir;

    const PAPER: &str = "\\documentclass{article}\n\\title{Tiny Paper}\n\\begin{document}\n\\begin{abstract}Short.\\end{abstract}\n\\section{Methods and Materials}\nWe did it.\n\\end{document}\n";

    fn generator() -> EmbeddingGenerator {
        EmbeddingGenerator::new(Arc::new(FixedProvider(vec![0.6, 0.8])), 2).with_progress(false)
    }

    #[tokio::test]
    async fn add_paper_stores_and_registers() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("paper.tex"), PAPER).unwrap();
        let db = Database::new(dir.path().join("data")).unwrap();

        let added = add_paper(&db, &generator(), &src, None, DEFAULT_TEMPLATE, 10_000)
            .await
            .unwrap();
        assert_eq!(added.title, "Tiny Paper");
        assert_eq!(added.outcome, StoreOutcome::Created);

        let table = db.load_table("Tiny Paper").unwrap();
        assert_eq!(table.len(), added.chunks);
        assert!(table.missing_embeddings().is_empty());
        assert!(db.load_instruction("Tiny Paper").unwrap().contains("Methods and Materials"));
    }

    #[tokio::test]
    async fn reprocessing_reuses_stored_files() {
        let dir = tempdir().unwrap();
        let tex = dir.path().join("paper.tex");
        fs::write(&tex, PAPER).unwrap();
        let db = Database::new(dir.path().join("data")).unwrap();

        let first = add_paper(&db, &generator(), &tex, None, DEFAULT_TEMPLATE, 10_000)
            .await
            .unwrap();
        let second = add_paper(&db, &generator(), &tex, Some("Renamed"), DEFAULT_TEMPLATE, 10_000)
            .await
            .unwrap();

        assert_eq!(second.outcome, StoreOutcome::AlreadyStored);
        assert_eq!(first.entry, second.entry);
        assert_eq!(db.papers().unwrap(), vec!["Renamed".to_string(), "Tiny Paper".to_string()]);
        let csv_files = fs::read_dir(db.data_dir())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().path().extension().map_or(false, |x| x == "csv"))
            .count();
        assert_eq!(csv_files, 1);
    }

    #[tokio::test]
    async fn source_archives_are_added() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("2401.00001.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("macros.tex", "\\newcommand{\\x}{x}"),
                ("paper/main.tex", "\\documentclass{article}\n\\title{Packed}\n\\section{Intro}\n\\input{body}\n"),
                ("paper/body.tex", "From the archive."),
            ],
        );
        let db = Database::new(dir.path().join("data")).unwrap();

        let added = add_paper(&db, &generator(), &archive, None, DEFAULT_TEMPLATE, 10_000)
            .await
            .unwrap();
        assert_eq!(added.title, "Packed");
        let table = db.load_table("Packed").unwrap();
        assert!(table.rows.iter().any(|row| row.content.contains("From the archive.")));
    }

    #[test]
    fn add_arguments_allow_spaces_in_paths() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("two words");
        fs::create_dir(&folder).unwrap();
        let folder_text = folder.display().to_string();

        let quoted = format!("\"{}\"  My Title ", folder_text);
        assert_eq!(split_add_args(&quoted).unwrap(), (folder_text.as_str(), Some("My Title")));

        let bare = format!("{} My Title", folder_text);
        assert_eq!(split_add_args(&bare).unwrap(), (folder_text.as_str(), Some("My Title")));
        assert_eq!(split_add_args(&folder_text).unwrap(), (folder_text.as_str(), None));

        assert_eq!(split_add_args("missing.tex Some Title").unwrap(), ("missing.tex", Some("Some Title")));
        assert!(split_add_args("\"unterminated").is_err());
    }

    #[tokio::test]
    async fn untitled_paper_gets_placeholder_title() {
        let dir = tempdir().unwrap();
        let tex = dir.path().join("notitle.tex");
        fs::write(&tex, "\\section{Only}\nText.").unwrap();
        let db = Database::new(dir.path().join("data")).unwrap();

        let added = add_paper(&db, &generator(), &tex, None, DEFAULT_TEMPLATE, 10_000)
            .await
            .unwrap();
        assert_eq!(added.title, TITLE_NOT_FOUND);
    }

    #[tokio::test]
    async fn batch_process_then_embed() {
        let dir = tempdir().unwrap();
        let tex = dir.path().join("paper.tex");
        fs::write(&tex, PAPER).unwrap();
        let csv = dir.path().join("paper.csv");
        let inst = dir.path().join("paper.txt");

        let rows = process_to_files(&tex, &csv, Some(&inst), "{title}", 10_000).unwrap();
        assert_eq!(ChunkTable::load(&csv).unwrap().missing_embeddings().len(), rows);
        assert!(fs::read_to_string(&inst).unwrap().starts_with("Tiny Paper"));

        let out = dir.path().join("embedded.csv");
        let filled = embed_file(&generator(), &csv, Some(&out)).await.unwrap();
        assert_eq!(filled, rows);
        assert!(ChunkTable::load(&out).unwrap().missing_embeddings().is_empty());
        assert_eq!(ChunkTable::load(&csv).unwrap().missing_embeddings().len(), rows);
    }
}
