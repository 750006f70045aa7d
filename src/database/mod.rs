pub mod chunk_table;
pub mod database;
pub mod registry;

pub use chunk_table::{ChunkRow, ChunkTable};
pub use database::{Database, DatabaseError, StoreOutcome};
pub use registry::{PaperEntry, PaperRegistry};
