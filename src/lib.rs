//! Local library catalog: authors, books, loanable copies and borrowers, served as JSON.
//!
//! Pieces, leaf first: `model` records, `store` persistence (PostgreSQL or in-memory),
//! `service::validation`, `storage` for uploaded media, the `routes::table` lookup router
//! with its `handlers`, and the `admin` back-office configuration.

pub mod admin;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod model;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod state;
pub mod storage;
pub mod store;

pub use error::{AppError, ConfigError};
pub use migration::{apply_migrations, ensure_database_exists};
pub use routes::{app, reverse, RouteName, RouteTable};
pub use settings::{Settings, StorageBackend, StoreBackend};
pub use state::AppState;
pub use storage::{BlobStorage, LocalStorage, S3Storage};
pub use store::{MemoryStore, PgStore, RecordStore};
