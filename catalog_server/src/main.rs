//! Catalog server: reads settings from the environment (and `.env`), prepares the store
//! and media storage, then serves the catalog, admin and upload routes.
//!
//! Run from repo root: `cargo run -p catalog-server`

use locallibrary::{
    app, apply_migrations, ensure_database_exists, AppState, BlobStorage, LocalStorage, MemoryStore, PgStore,
    RecordStore, S3Storage, Settings, StorageBackend, StoreBackend,
};
use std::sync::Arc;
use tokio::net::TcpListener;

async fn open_store(settings: &Settings) -> Result<Arc<dyn RecordStore>, Box<dyn std::error::Error>> {
    match settings.store {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            ensure_database_exists(&settings.database_url).await?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&settings.database_url)
                .await?;
            apply_migrations(&pool, &settings.schema).await?;
            Ok(Arc::new(PgStore::new(pool, settings.schema.clone())))
        }
    }
}

async fn open_storage(settings: &Settings) -> Arc<dyn BlobStorage> {
    match (&settings.storage, &settings.s3_bucket) {
        (StorageBackend::S3, Some(bucket)) => Arc::new(S3Storage::from_env(bucket.clone()).await),
        _ => Arc::new(LocalStorage::new(settings.media_root.clone())),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("locallibrary=info,catalog_server=info")),
        )
        .init();

    let store = open_store(&settings).await?;
    let storage = open_storage(&settings).await;
    let state = AppState::new(store, storage)?;

    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        store = ?settings.store,
        storage = ?settings.storage,
        "catalog server listening"
    );
    axum::serve(listener, app(state, settings.max_upload_bytes)).await?;
    Ok(())
}
