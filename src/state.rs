//! Shared application state for all routes.

use crate::admin::AdminSite;
use crate::error::ConfigError;
use crate::routes::RouteTable;
use crate::storage::BlobStorage;
use crate::store::RecordStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub storage: Arc<dyn BlobStorage>,
    pub routes: Arc<RouteTable>,
    pub admin: Arc<AdminSite>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, storage: Arc<dyn BlobStorage>) -> Result<Self, ConfigError> {
        Ok(AppState {
            store,
            storage,
            routes: Arc::new(RouteTable::new()?),
            admin: Arc::new(AdminSite::catalog()),
        })
    }
}
