pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use postgres::migrations::run_migrations;
pub use traits::{AccessStore, Revision, StorageError};
