//! Document retrieval: the vector index contract and its SQLite
//! implementation.

mod index;
mod sqlite;

pub use index::{DocumentChunk, DocumentIndex, RetrievedChunk};
pub use sqlite::SqliteDocumentIndex;
