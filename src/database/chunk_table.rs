use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::Path;

use super::DatabaseError;
use crate::document::ChunkRecord;

/// Number of hex digits of the content hash used in file names.
const HASH_LEN: usize = 16;

/// A chunk record plus its optional embedding, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRow {
    pub section: String,
    pub subsection: String,
    pub subsubsection: String,
    pub content: String,
    #[serde(default, with = "embedding_text")]
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRow {
    pub fn to_record(&self) -> ChunkRecord {
        ChunkRecord {
            section: self.section.clone(),
            subsection: self.subsection.clone(),
            subsubsection: self.subsubsection.clone(),
            content: self.content.clone(),
        }
    }
}

impl From<ChunkRecord> for ChunkRow {
    fn from(record: ChunkRecord) -> Self {
        Self {
            section: record.section,
            subsection: record.subsection,
            subsubsection: record.subsubsection,
            content: record.content,
            embedding: None,
        }
    }
}

/// The chunk table of one paper, in flattening order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkTable {
    pub rows: Vec<ChunkRow>,
}

impl ChunkTable {
    pub fn from_records(records: Vec<ChunkRecord>) -> Self {
        Self {
            rows: records.into_iter().map(ChunkRow::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Indices of rows that still need an embedding.
    pub fn missing_embeddings(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.embedding.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    /// Hex digest of the text columns; embeddings do not affect it.
    ///
    /// Fields are length-prefixed so that moving text between columns
    /// changes the digest.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for row in &self.rows {
            for field in [&row.section, &row.subsection, &row.subsubsection, &row.content] {
                hasher.update((field.len() as u64).to_le_bytes());
                hasher.update(field.as_bytes());
            }
        }
        let digest = hex::encode(hasher.finalize());
        digest[..HASH_LEN].to_string()
    }

    pub fn load(path: &Path) -> Result<Self, DatabaseError> {
        let file = File::open(path).map_err(|source| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = csv::Reader::from_reader(file);
        let rows = reader
            .deserialize::<ChunkRow>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rows })
    }

    pub fn save(&self, path: &Path) -> Result<(), DatabaseError> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush().map_err(|source| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

/// Stores an embedding as a JSON array inside one CSV cell; an empty cell
/// means "not embedded yet".
mod embedding_text {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<f32>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(vector) => {
                let text = serde_json::to_string(vector).map_err(serde::ser::Error::custom)?;
                serializer.serialize_str(&text)
            }
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<f32>>, D::Error> {
        let text = String::deserialize(deserializer)?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(text).map(Some).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn table() -> ChunkTable {
        let mut table = ChunkTable::from_records(vec![
            ChunkRecord {
                section: "Intro".into(),
                content: "a, \"quoted\"\nmultiline".into(),
                ..Default::default()
            },
            ChunkRecord {
                section: "Intro".into(),
                subsection: "Scope".into(),
                content: "b".into(),
                ..Default::default()
            },
        ]);
        table.rows[0].embedding = Some(vec![0.25, -1.5, 3.0]);
        table
    }

    #[test]
    fn csv_keeps_text_and_embeddings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let table = table();
        table.save(&path).unwrap();

        let header = fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("section,subsection,subsubsection,content,embedding\n"));
        assert!(header.contains("\"[0.25,-1.5,3.0]\""));

        let loaded = ChunkTable::load(&path).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.missing_embeddings(), vec![1]);
    }

    #[test]
    fn reads_tables_with_index_column_and_python_lists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        fs::write(
            &path,
            ",section,subsection,subsubsection,content,embedding\n0,Abstract,,,text,\"[0.1, 0.2]\"\n",
        )
        .unwrap();
        let loaded = ChunkTable::load(&path).unwrap();
        assert_eq!(loaded.rows[0].section, "Abstract");
        assert_eq!(loaded.rows[0].embedding, Some(vec![0.1, 0.2]));
    }

    #[test]
    fn table_without_embedding_column_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bare.csv");
        fs::write(&path, "section,subsection,subsubsection,content\nA,,,x\n").unwrap();
        let loaded = ChunkTable::load(&path).unwrap();
        assert_eq!(loaded.missing_embeddings(), vec![0]);
    }

    #[test]
    fn hash_depends_on_text_only() {
        let mut with_embeddings = table();
        let hash = with_embeddings.content_hash();
        assert_eq!(hash.len(), HASH_LEN);

        with_embeddings.rows[1].embedding = Some(vec![1.0]);
        assert_eq!(with_embeddings.content_hash(), hash);

        let mut moved = table();
        moved.rows[1].subsection = String::new();
        moved.rows[1].subsubsection = "Scope".into();
        assert_ne!(moved.content_hash(), hash);
    }
}
