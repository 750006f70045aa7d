use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::chunk_table::ChunkTable;
use super::registry::{PaperEntry, PaperRegistry};

pub const REGISTRY_FILE: &str = "papers.json";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown paper: {0}")]
    UnknownPaper(String),
}

/// Whether `store_paper` wrote new files or found them already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Created,
    AlreadyStored,
}

/// On-disk paper store: `<hash>.csv` chunk tables, `<hash>.txt`
/// instructions, and the `papers.json` registry, all under one directory.
#[derive(Clone)]
pub struct Database {
    data_dir: PathBuf,
}

impl Database {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|source| DatabaseError::Io {
            path: data_dir.clone(),
            source,
        })?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn registry(&self) -> PaperRegistry {
        PaperRegistry::new(self.data_dir.join(REGISTRY_FILE))
    }

    /// File names derived from a content hash.
    pub fn paper_paths(&self, hash: &str) -> PaperEntry {
        PaperEntry {
            csv: self.data_dir.join(format!("{}.csv", hash)),
            inst: self.data_dir.join(format!("{}.txt", hash)),
        }
    }

    pub fn is_stored(&self, hash: &str) -> bool {
        self.paper_paths(hash).csv.exists()
    }

    /// Writes the table and instruction of a paper unless a table with the
    /// same hash already exists, in which case the existing files are kept.
    ///
    /// The `.csv` marks a paper as stored, so it appears last: the
    /// instruction is written first and the table is renamed into place from
    /// a temporary file.
    pub fn store_paper(
        &self,
        table: &ChunkTable,
        instruction: &str,
    ) -> Result<(PaperEntry, StoreOutcome), DatabaseError> {
        let hash = table.content_hash();
        let entry = self.paper_paths(&hash);

        if entry.csv.exists() {
            warn!("{} already exists, keeping the stored table", entry.csv.display());
            return Ok((entry, StoreOutcome::AlreadyStored));
        }

        write_text(&entry.inst, instruction)?;

        let tmp_path = entry.csv.with_extension("csv.tmp");
        let saved = table.save(&tmp_path).and_then(|()| {
            fs::rename(&tmp_path, &entry.csv).map_err(|source| DatabaseError::Io {
                path: entry.csv.clone(),
                source,
            })
        });
        if let Err(e) = saved {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                warn!("failed to remove {}: {}", tmp_path.display(), cleanup);
            }
            return Err(e);
        }
        info!("Stored {} chunks in {}", table.len(), entry.csv.display());
        Ok((entry, StoreOutcome::Created))
    }

    pub fn register(&self, title: &str, entry: PaperEntry) -> Result<(), DatabaseError> {
        self.registry().insert(title, entry)
    }

    /// Registered titles, sorted.
    pub fn papers(&self) -> Result<Vec<String>, DatabaseError> {
        Ok(self.registry().load()?.into_keys().collect())
    }

    pub fn entry(&self, title: &str) -> Result<PaperEntry, DatabaseError> {
        self.registry()
            .get(title)?
            .ok_or_else(|| DatabaseError::UnknownPaper(title.to_string()))
    }

    pub fn load_table(&self, title: &str) -> Result<ChunkTable, DatabaseError> {
        ChunkTable::load(&self.entry(title)?.csv)
    }

    pub fn load_instruction(&self, title: &str) -> Result<String, DatabaseError> {
        let path = self.entry(title)?.inst;
        fs::read_to_string(&path).map_err(|source| DatabaseError::Io { path, source })
    }

    pub fn save_instruction(&self, title: &str, instruction: &str) -> Result<(), DatabaseError> {
        let path = self.entry(title)?.inst;
        write_text(&path, instruction)?;
        info!("Updated instruction of '{}'", title);
        Ok(())
    }
}

fn write_text(path: &Path, text: &str) -> Result<(), DatabaseError> {
    fs::write(path, text).map_err(|source| DatabaseError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkRecord;
    use tempfile::tempdir;

    fn table() -> ChunkTable {
        ChunkTable::from_records(vec![ChunkRecord {
            section: "Intro".into(),
            content: "hello".into(),
            ..Default::default()
        }])
    }

    #[test]
    fn stores_and_loads_a_paper() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("data")).unwrap();
        let table = table();

        let (entry, outcome) = db.store_paper(&table, "inst").unwrap();
        assert_eq!(outcome, StoreOutcome::Created);
        assert!(db.is_stored(&table.content_hash()));
        db.register("My Paper", entry).unwrap();

        assert_eq!(db.papers().unwrap(), vec!["My Paper".to_string()]);
        assert_eq!(db.load_table("My Paper").unwrap(), table);
        assert_eq!(db.load_instruction("My Paper").unwrap(), "inst");

        db.save_instruction("My Paper", "edited").unwrap();
        assert_eq!(db.load_instruction("My Paper").unwrap(), "edited");
    }

    #[test]
    fn duplicate_content_keeps_existing_files() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path()).unwrap();
        let (first, _) = db.store_paper(&table(), "first").unwrap();
        let (second, outcome) = db.store_paper(&table(), "second").unwrap();

        assert_eq!(outcome, StoreOutcome::AlreadyStored);
        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(&second.inst).unwrap(), "first");
    }

    #[test]
    fn failed_store_can_be_retried() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path()).unwrap();
        let table = table();
        let hash = table.content_hash();
        let blocker = db.paper_paths(&hash).inst;
        fs::create_dir(&blocker).unwrap();

        assert!(matches!(db.store_paper(&table, "inst"), Err(DatabaseError::Io { .. })));
        assert!(!db.is_stored(&hash));
        assert!(!dir.path().join(format!("{}.csv.tmp", hash)).exists());

        fs::remove_dir(&blocker).unwrap();
        let (entry, outcome) = db.store_paper(&table, "inst").unwrap();
        assert_eq!(outcome, StoreOutcome::Created);
        db.register("P", entry).unwrap();
        assert_eq!(db.load_instruction("P").unwrap(), "inst");
        assert_eq!(db.load_table("P").unwrap(), table);
    }

    #[test]
    fn unknown_paper_is_reported() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path()).unwrap();
        assert!(matches!(db.load_table("nope"), Err(DatabaseError::UnknownPaper(_))));
    }
}
