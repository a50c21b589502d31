pub mod memory;
pub mod store;
pub mod upsert;

pub use memory::InMemoryGraphStore;
pub use store::Neo4jGraphStore;
pub use upsert::{GraphUpsertEngine, UpsertSummary};
