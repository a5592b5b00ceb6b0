use std::sync::Arc;

use vitrine_contrib_content::ContentBackend;
use vitrine_contrib_content::ContentStore;
use vitrine_contrib_settings::SettingsBackend;
use vitrine_contrib_settings::SettingsStore;

use crate::uploads::UploadStorage;

/// State shared by every handler
pub struct AppState<S, C> {
    /// The branding settings
    pub settings: Arc<SettingsStore<S>>,

    /// The content blocks
    pub content: Arc<ContentStore<C>>,

    /// Where logo and favicon uploads go
    pub uploads: Arc<UploadStorage>,
}

impl<S: SettingsBackend, C: ContentBackend> AppState<S, C> {
    /// Bundles the already loaded stores
    pub fn new(settings: SettingsStore<S>, content: ContentStore<C>, uploads: UploadStorage) -> Self {
        Self {
            settings: Arc::new(settings),
            content: Arc::new(content),
            uploads: Arc::new(uploads),
        }
    }
}

impl<S, C> Clone for AppState<S, C> {
    fn clone(&self) -> Self {
        Self {
            settings: Arc::clone(&self.settings),
            content: Arc::clone(&self.content),
            uploads: Arc::clone(&self.uploads),
        }
    }
}
