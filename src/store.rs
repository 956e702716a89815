//! App and support bundle lookups used by resource getters.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportBundle {
    pub id: String,
    pub slug: String,
    pub app_id: String,
}

/// Read access to installed apps and their support bundles.
#[async_trait]
pub trait AppStore: Send + Sync {
    async fn get_app(&self, id: &str) -> StoreResult<Option<App>>;

    async fn get_app_by_slug(&self, slug: &str) -> StoreResult<Option<App>>;

    async fn list_apps(&self) -> StoreResult<Vec<App>>;

    /// Look up a bundle by id, falling back to slug.
    async fn get_support_bundle(&self, id_or_slug: &str) -> StoreResult<Option<SupportBundle>>;
}

/// In-memory store seeded from configuration.
#[derive(Debug, Default)]
pub struct MemoryStore {
    apps: RwLock<HashMap<String, App>>,
    bundles: RwLock<HashMap<String, SupportBundle>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(apps: Vec<App>, bundles: Vec<SupportBundle>) -> Self {
        let store = Self::new();
        for app in apps {
            store.insert_app(app);
        }
        for bundle in bundles {
            store.insert_support_bundle(bundle);
        }
        store
    }

    pub fn insert_app(&self, app: App) {
        self.apps.write().insert(app.id.clone(), app);
    }

    pub fn insert_support_bundle(&self, bundle: SupportBundle) {
        self.bundles.write().insert(bundle.id.clone(), bundle);
    }

    pub fn into_shared(self) -> Arc<dyn AppStore> {
        Arc::new(self)
    }
}

#[async_trait]
impl AppStore for MemoryStore {
    async fn get_app(&self, id: &str) -> StoreResult<Option<App>> {
        Ok(self.apps.read().get(id).cloned())
    }

    async fn get_app_by_slug(&self, slug: &str) -> StoreResult<Option<App>> {
        Ok(self
            .apps
            .read()
            .values()
            .find(|app| app.slug == slug)
            .cloned())
    }

    async fn list_apps(&self) -> StoreResult<Vec<App>> {
        let mut apps: Vec<App> = self.apps.read().values().cloned().collect();
        apps.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(apps)
    }

    async fn get_support_bundle(&self, id_or_slug: &str) -> StoreResult<Option<SupportBundle>> {
        let bundles = self.bundles.read();
        Ok(bundles
            .get(id_or_slug)
            .or_else(|| bundles.values().find(|b| b.slug == id_or_slug))
            .cloned())
    }
}
