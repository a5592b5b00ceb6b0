use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;
use vitrine_core::schema::ContentRow;
use vitrine_core::schema::SettingsMap;
use vitrine_core::schema::UploadResponse;

use crate::api::UploadTarget;
use crate::api::VitrineApi;
use crate::error::ClientError;

/// The resources a view can subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKey {
    /// All settings (admin only)
    Settings,
    /// The public subset of the settings
    PublicSettings,
    /// All content rows (admin only)
    Content,
    /// The content rows of one section
    ContentType(String),
}

/// A fetched resource
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    /// Value of [`ResourceKey::Settings`] and [`ResourceKey::PublicSettings`]
    Settings(SettingsMap),
    /// Value of [`ResourceKey::Content`] and [`ResourceKey::ContentType`]
    Content(Vec<ContentRow>),
}

impl Resource {
    /// The settings, if this is a settings resource
    pub fn as_settings(&self) -> Option<&SettingsMap> {
        match self {
            Resource::Settings(settings) => Some(settings),
            Resource::Content(_) => None,
        }
    }

    /// The content rows, if this is a content resource
    pub fn as_content(&self) -> Option<&[ContentRow]> {
        match self {
            Resource::Content(rows) => Some(rows),
            Resource::Settings(_) => None,
        }
    }
}

/// What a subscriber sees of a resource
///
/// While a refetch is running, `value` keeps the previous result and `loading` is set.
#[derive(Debug, Clone, Default)]
pub struct ResourceState {
    /// The latest successfully fetched value
    pub value: Option<Resource>,

    /// Is a fetch running?
    pub loading: bool,

    /// The error of the latest fetch, cleared by the next successful one
    pub error: Option<Arc<ClientError>>,
}

impl ResourceState {
    /// Has a fetch finished since the last invalidation?
    pub fn is_settled(&self) -> bool {
        !self.loading && (self.value.is_some() || self.error.is_some())
    }
}

/// Fetches settings and content and keeps every subscriber up to date
///
/// There is no time based expiry.
/// A value is refetched when it is invalidated,
/// which the mutation methods on this type do for every key they might affect.
///
/// Cloning the cache is cheap, all clones share their entries.
///
/// # Panics
/// Fetches are spawned onto the current tokio runtime,
/// so [`ResourceCache::subscribe`] and [`ResourceCache::invalidate`]
/// must be called from within one.
pub struct ResourceCache<A> {
    inner: Arc<Inner<A>>,
}

struct Inner<A> {
    api: A,
    entries: Mutex<HashMap<ResourceKey, Entry>>,
}

struct Entry {
    sender: watch::Sender<ResourceState>,

    /// Incremented by every fetch, a response is only recorded if it is still the latest
    generation: u64,

    in_flight: bool,

    /// The value has to be fetched by the next subscriber
    stale: bool,
}

/// A view's interest in a resource
///
/// Dropping it abandons the interest,
/// a running fetch still fills the cache but nobody is notified.
#[derive(Debug)]
pub struct Subscription {
    key: ResourceKey,
    receiver: watch::Receiver<ResourceState>,
}

impl Subscription {
    /// The key subscribed to
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// The current state
    pub fn current(&mut self) -> ResourceState {
        self.receiver.borrow_and_update().clone()
    }

    /// Waits for the next change of the state
    pub async fn changed(&mut self) -> Result<ResourceState, ClientError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| ClientError::CacheClosed)?;
        Ok(self.current())
    }

    /// Waits until no fetch is running and there is either a value or an error
    pub async fn wait_settled(&mut self) -> Result<ResourceState, ClientError> {
        let state = self
            .receiver
            .wait_for(ResourceState::is_settled)
            .await
            .map_err(|_| ClientError::CacheClosed)?;
        Ok(state.clone())
    }
}

impl<A> Clone for ResourceCache<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: VitrineApi> ResourceCache<A> {
    /// Constructs an empty cache fetching from `api`
    pub fn new(api: A) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The api the cache fetches from
    pub fn api(&self) -> &A {
        &self.inner.api
    }

    /// Subscribes to `key`, fetching it if it has never been fetched or is stale
    ///
    /// Subscribers of the same key share a single fetch.
    pub fn subscribe(&self, key: ResourceKey) -> Subscription {
        let mut entries = self.lock();
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
            sender: watch::Sender::new(ResourceState::default()),
            generation: 0,
            in_flight: false,
            stale: true,
        });
        let receiver = entry.sender.subscribe();
        if entry.stale && !entry.in_flight {
            self.start_fetch(&key, entry);
        }
        Subscription { key, receiver }
    }

    /// Refetches `key` for all its subscribers
    ///
    /// Without subscribers the value is only marked as stale.
    /// A fetch which is still running is superseded and its response discarded.
    pub fn invalidate(&self, key: &ResourceKey) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        if entry.sender.receiver_count() > 0 {
            self.start_fetch(key, entry);
        } else {
            debug!(?key, "Marked resource stale");
            entry.stale = true;
        }
    }

    /// Invalidates every key the write of a setting could affect
    pub fn invalidate_settings(&self) {
        self.invalidate(&ResourceKey::Settings);
        self.invalidate(&ResourceKey::PublicSettings);
    }

    /// Invalidates every key the write of a content block in `section` could affect
    pub fn invalidate_content(&self, section: &str) {
        self.invalidate(&ResourceKey::Content);
        self.invalidate(&ResourceKey::ContentType(section.to_string()));
    }

    /// Writes a setting and invalidates the settings
    pub async fn put_setting(&self, key: &str, value: Value) -> Result<(), ClientError> {
        self.inner.api.put_setting(key, value).await?;
        self.invalidate_settings();
        Ok(())
    }

    /// Uploads a logo or favicon and invalidates the settings
    pub async fn upload(
        &self,
        target: UploadTarget,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, ClientError> {
        let response = self.inner.api.upload(target, file_name, bytes).await?;
        self.invalidate_settings();
        Ok(response)
    }

    /// Writes a content block and invalidates the content
    pub async fn put_content(
        &self,
        section: &str,
        identifier: &str,
        content: Value,
    ) -> Result<ContentRow, ClientError> {
        let row = self
            .inner
            .api
            .put_content(section, identifier, content)
            .await?;
        self.invalidate_content(section);
        Ok(row)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceKey, Entry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn start_fetch(&self, key: &ResourceKey, entry: &mut Entry) {
        entry.generation += 1;
        entry.in_flight = true;
        entry.stale = false;
        entry.sender.send_modify(|state| state.loading = true);

        let generation = entry.generation;
        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        tokio::spawn(async move {
            let result = fetch(&inner.api, &key).await;

            let mut entries = inner.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(entry) = entries.get_mut(&key) else {
                return;
            };
            if entry.generation != generation {
                debug!(?key, "Discarded superseded response");
                return;
            }
            entry.in_flight = false;
            if result.is_err() {
                entry.stale = true;
            }
            entry.sender.send_modify(|state| {
                state.loading = false;
                match result {
                    Ok(value) => {
                        state.value = Some(value);
                        state.error = None;
                    }
                    Err(error) => state.error = Some(Arc::new(error)),
                }
            });
        });
    }
}

async fn fetch<A: VitrineApi>(api: &A, key: &ResourceKey) -> Result<Resource, ClientError> {
    Ok(match key {
        ResourceKey::Settings => Resource::Settings(api.get_settings().await?),
        ResourceKey::PublicSettings => Resource::Settings(api.get_public_settings().await?),
        ResourceKey::Content => Resource::Content(api.get_content().await?),
        ResourceKey::ContentType(section) => {
            Resource::Content(api.get_content_by_type(section).await?)
        }
    })
}
