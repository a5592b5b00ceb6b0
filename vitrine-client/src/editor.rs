//! Editing the content blocks of one section
//!
//! The editor doesn't know the blocks' shapes up front.
//! It looks at each stored value and picks a matching [`Widget`]:
//!
//! | Value                          | [`ContentValue`]          | [`Widget`]                |
//! |--------------------------------|---------------------------|---------------------------|
//! | string shorter than 100 chars  | `Text`                    | `SingleLine`              |
//! | longer string                  | `Text`                    | `MultiLine`               |
//! | array of objects               | `List`                    | `RecordList`              |
//! | anything else                  | `Structured`              | `JsonBlock`               |
//!
//! Edits are kept as drafts until [`ContentEditor::save`] writes them through the [`ResourceCache`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use futures_concurrency::future::Join;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use vitrine_core::schema::ContentRow;

use crate::api::VitrineApi;
use crate::cache::ResourceCache;
use crate::cache::ResourceKey;
use crate::error::ClientError;

/// Strings with fewer chars are edited in a single line
pub const SHORT_TEXT_LIMIT: usize = 100;

/// A record of a [`ContentValue::List`]
pub type Record = Map<String, Value>;

/// The shape of a content block's value
#[derive(Debug, Clone, PartialEq)]
pub enum ContentValue {
    /// A string
    Text(String),
    /// An array of objects
    List(Vec<Record>),
    /// Any other json value
    Structured(Value),
}

/// How a [`ContentValue`] is edited
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Widget {
    /// A single line text input
    SingleLine,
    /// A text area
    MultiLine,
    /// One sub-form per record
    RecordList,
    /// A text area containing json
    JsonBlock,
}

impl ContentValue {
    /// Determines the shape of `value`
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(text) => ContentValue::Text(text),
            Value::Array(items) if items.iter().all(Value::is_object) => ContentValue::List(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(record) => Some(record),
                        _ => None,
                    })
                    .collect(),
            ),
            value => ContentValue::Structured(value),
        }
    }

    /// Converts back into json
    pub fn to_json(&self) -> Value {
        match self {
            ContentValue::Text(text) => Value::String(text.clone()),
            ContentValue::List(records) => {
                Value::Array(records.iter().cloned().map(Value::Object).collect())
            }
            ContentValue::Structured(value) => value.clone(),
        }
    }

    /// Picks the widget to edit the value with
    pub fn widget(&self) -> Widget {
        match self {
            ContentValue::Text(text) if text.chars().count() < SHORT_TEXT_LIMIT => {
                Widget::SingleLine
            }
            ContentValue::Text(_) => Widget::MultiLine,
            ContentValue::List(_) => Widget::RecordList,
            ContentValue::Structured(_) => Widget::JsonBlock,
        }
    }

    fn to_draft(&self) -> Draft {
        match self {
            ContentValue::Text(text) => Draft::Text(text.clone()),
            ContentValue::List(records) => Draft::List(records.clone()),
            ContentValue::Structured(value) => {
                Draft::Json(serde_json::to_string_pretty(value).unwrap_or_default())
            }
        }
    }
}

/// An unsaved edit
#[derive(Debug, Clone, PartialEq)]
pub enum Draft {
    /// Edit of a [`ContentValue::Text`]
    Text(String),
    /// Edit of a [`ContentValue::List`]
    List(Vec<Record>),
    /// Edit of a [`ContentValue::Structured`], not yet parsed
    Json(String),
}

/// Error returned by [`ContentEditor`]
#[derive(Debug, Clone, Error)]
pub enum EditorError {
    /// The section has no such block.
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// The edit does not fit the block's shape.
    #[error("'{identifier}' is not {expected}")]
    WrongShape {
        /// The edited block
        identifier: String,
        /// The shape the edit requires
        expected: &'static str,
    },

    /// The record index is out of bounds.
    #[error("'{identifier}' has no record {index}")]
    NoSuchRecord {
        /// The edited block
        identifier: String,
        /// The requested index
        index: usize,
    },

    /// The json draft does not parse. The saved value is unchanged.
    #[error("Invalid json in '{identifier}': {message}")]
    InvalidJson {
        /// The edited block
        identifier: String,
        /// The parser's message
        message: String,
    },

    /// A save of the block is still running.
    #[error("'{0}' is already being saved")]
    SaveInProgress(String),

    /// The server rejected the request or could not be reached.
    #[error("{0}")]
    Api(Arc<ClientError>),
}

/// The state of a single block for rendering
#[derive(Debug, Clone)]
pub struct FieldView {
    /// The block's identifier
    pub identifier: String,
    /// The last saved value (or the section's default)
    pub saved: ContentValue,
    /// The widget matching `saved`
    pub widget: Widget,
    /// The unsaved edit
    pub draft: Option<Draft>,
    /// Is a save running?
    pub saving: bool,
    /// The error of the last save
    pub error: Option<EditorError>,
}

impl FieldView {
    /// Does the block have unsaved changes?
    pub fn is_unsaved(&self) -> bool {
        self.draft.is_some()
    }
}

#[derive(Debug)]
struct FieldState {
    saved: ContentValue,
    draft: Option<Draft>,
    /// Incremented by every edit to detect edits made while saving, never reset
    draft_version: u64,
    saving: bool,
    error: Option<EditorError>,
}

impl FieldState {
    fn new(saved: ContentValue) -> Self {
        Self {
            saved,
            draft: None,
            draft_version: 0,
            saving: false,
            error: None,
        }
    }

    fn draft_mut(&mut self) -> &mut Draft {
        self.draft_version += 1;
        self.draft.get_or_insert_with(|| self.saved.to_draft())
    }
}

#[derive(Debug, Default)]
struct EditorState {
    /// The values last fetched from or confirmed by the server
    server: BTreeMap<String, Value>,
    fields: BTreeMap<String, FieldState>,
}

/// Edits the content blocks of one section
///
/// Blocks listed in the defaults are editable before they are stored,
/// the first save creates them.
pub struct ContentEditor<A> {
    cache: ResourceCache<A>,
    section: String,
    defaults: BTreeMap<String, Value>,
    state: Mutex<EditorState>,
}

impl<A: VitrineApi> ContentEditor<A> {
    /// Constructs an editor for `section` showing only the defaults until [`ContentEditor::refresh`]
    pub fn new(
        cache: ResourceCache<A>,
        section: impl Into<String>,
        defaults: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        let editor = Self {
            cache,
            section: section.into(),
            defaults: defaults.into_iter().collect(),
            state: Mutex::new(EditorState::default()),
        };
        editor.reset();
        editor
    }

    /// The edited section
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Fetches the section through the cache and loads it
    ///
    /// Drafts survive a refresh.
    pub async fn refresh(&self) -> Result<(), EditorError> {
        let mut subscription = self
            .cache
            .subscribe(ResourceKey::ContentType(self.section.clone()));
        let state = subscription
            .wait_settled()
            .await
            .map_err(|error| EditorError::Api(Arc::new(error)))?;
        match (state.value, state.error) {
            (_, Some(error)) => Err(EditorError::Api(error)),
            (Some(resource), None) => {
                self.load_rows(resource.as_content().unwrap_or_default());
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    /// Replaces the server state with `rows`, ignoring rows of other sections
    pub fn load_rows(&self, rows: &[ContentRow]) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.server = rows
            .iter()
            .filter(|row| row.section == self.section)
            .map(|row| (row.identifier.clone(), row.content.clone()))
            .collect();
        for (identifier, value) in self.saved_values(&state.server) {
            match state.fields.get_mut(&identifier) {
                Some(field) => field.saved = value,
                None => {
                    state.fields.insert(identifier, FieldState::new(value));
                }
            }
        }
    }

    /// Discards every draft and error and shows the last known server state
    pub fn reset(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut fields = BTreeMap::new();
        for (identifier, value) in self.saved_values(&state.server) {
            let mut field = FieldState::new(value);
            if let Some(previous) = state.fields.get(&identifier) {
                // A running save still reports back and compares against the version it captured
                field.saving = previous.saving;
                field.draft_version = previous.draft_version;
            }
            fields.insert(identifier, field);
        }
        state.fields = fields;
    }

    /// Every block in identifier order
    pub fn fields(&self) -> Vec<FieldView> {
        self.lock()
            .fields
            .iter()
            .map(|(identifier, field)| view(identifier, field))
            .collect()
    }

    /// A single block
    pub fn field(&self, identifier: &str) -> Result<FieldView, EditorError> {
        let state = self.lock();
        let field = state
            .fields
            .get(identifier)
            .ok_or_else(|| EditorError::UnknownField(identifier.to_string()))?;
        Ok(view(identifier, field))
    }

    /// Does any block have unsaved changes?
    pub fn has_unsaved_changes(&self) -> bool {
        self.lock().fields.values().any(|field| field.draft.is_some())
    }

    /// Edits a text block or the json of a structured block
    pub fn set_text(&self, identifier: &str, text: impl Into<String>) -> Result<(), EditorError> {
        let mut state = self.lock();
        let field = field_mut(&mut state, identifier)?;
        if matches!(field.saved, ContentValue::List(_)) {
            return Err(EditorError::WrongShape {
                identifier: identifier.to_string(),
                expected: "text",
            });
        }
        if let Draft::Text(current) | Draft::Json(current) = field.draft_mut() {
            *current = text.into();
        }
        Ok(())
    }

    /// Sets `key` of the record at `index` of a list block
    pub fn set_record_field(
        &self,
        identifier: &str,
        index: usize,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), EditorError> {
        let mut state = self.lock();
        edit_list(&mut state, identifier, |records| {
            let record = records.get_mut(index).ok_or_else(|| EditorError::NoSuchRecord {
                identifier: identifier.to_string(),
                index,
            })?;
            record.insert(key.to_string(), value.into());
            Ok(())
        })
    }

    /// Appends a record to a list block and returns its index
    ///
    /// The new record has the keys of the first record, each set to an empty string.
    pub fn add_record(&self, identifier: &str) -> Result<usize, EditorError> {
        let mut state = self.lock();
        edit_list(&mut state, identifier, |records| {
            let record = records
                .first()
                .map(|template| {
                    template
                        .keys()
                        .map(|key| (key.clone(), Value::String(String::new())))
                        .collect()
                })
                .unwrap_or_default();
            records.push(record);
            Ok(records.len() - 1)
        })
    }

    /// Removes the record at `index` from a list block
    pub fn remove_record(&self, identifier: &str, index: usize) -> Result<Record, EditorError> {
        let mut state = self.lock();
        edit_list(&mut state, identifier, |records| {
            if index >= records.len() {
                return Err(EditorError::NoSuchRecord {
                    identifier: identifier.to_string(),
                    index,
                });
            }
            Ok(records.remove(index))
        })
    }

    /// Saves the draft of a block
    ///
    /// Without a draft there is nothing to do.
    /// On success the draft is cleared (unless it was edited meanwhile),
    /// on failure the draft is kept and the error is recorded on the block.
    pub async fn save(&self, identifier: &str) -> Result<(), EditorError> {
        let (content, version) = {
            let mut state = self.lock();
            let field = field_mut(&mut state, identifier)?;
            if field.saving {
                return Err(EditorError::SaveInProgress(identifier.to_string()));
            }
            let content = match &field.draft {
                None => return Ok(()),
                Some(Draft::Text(text)) => Value::String(text.clone()),
                Some(Draft::List(records)) => {
                    Value::Array(records.iter().cloned().map(Value::Object).collect())
                }
                Some(Draft::Json(raw)) => match serde_json::from_str(raw) {
                    Ok(value) => value,
                    Err(error) => {
                        let error = EditorError::InvalidJson {
                            identifier: identifier.to_string(),
                            message: error.to_string(),
                        };
                        field.error = Some(error.clone());
                        return Err(error);
                    }
                },
            };
            field.saving = true;
            field.error = None;
            (content, field.draft_version)
        };

        let result = self
            .cache
            .put_content(&self.section, identifier, content)
            .await;

        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(field) = state.fields.get_mut(identifier) else {
            return result.map(drop).map_err(|error| EditorError::Api(Arc::new(error)));
        };
        field.saving = false;
        match result {
            Ok(row) => {
                debug!(
                    content.section = self.section.as_str(),
                    content.identifier = identifier,
                    "Saved content"
                );
                state.server.insert(identifier.to_string(), row.content.clone());
                field.saved = ContentValue::from_json(row.content);
                if field.draft_version == version {
                    field.draft = None;
                }
                Ok(())
            }
            Err(error) => {
                let error = EditorError::Api(Arc::new(error));
                field.error = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Saves every block with a draft
    ///
    /// The blocks are saved concurrently and independently,
    /// one failing doesn't affect the others.
    pub async fn save_all(&self) -> Vec<(String, Result<(), EditorError>)> {
        let identifiers: Vec<String> = self
            .lock()
            .fields
            .iter()
            .filter(|(_, field)| field.draft.is_some() && !field.saving)
            .map(|(identifier, _)| identifier.clone())
            .collect();

        let results = identifiers
            .iter()
            .map(|identifier| self.save(identifier))
            .collect::<Vec<_>>()
            .join()
            .await;

        identifiers.into_iter().zip(results).collect()
    }

    /// The server values completed by the defaults
    fn saved_values(&self, server: &BTreeMap<String, Value>) -> Vec<(String, ContentValue)> {
        let mut values: BTreeMap<&String, &Value> = self.defaults.iter().collect();
        values.extend(server.iter());
        values
            .into_iter()
            .map(|(identifier, value)| (identifier.clone(), ContentValue::from_json(value.clone())))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn view(identifier: &str, field: &FieldState) -> FieldView {
    FieldView {
        identifier: identifier.to_string(),
        widget: field.saved.widget(),
        saved: field.saved.clone(),
        draft: field.draft.clone(),
        saving: field.saving,
        error: field.error.clone(),
    }
}

fn field_mut<'a>(
    state: &'a mut EditorState,
    identifier: &str,
) -> Result<&'a mut FieldState, EditorError> {
    state
        .fields
        .get_mut(identifier)
        .ok_or_else(|| EditorError::UnknownField(identifier.to_string()))
}

/// Applies `edit` to a copy of a list block's records and keeps the result as draft if it succeeds
fn edit_list<T>(
    state: &mut EditorState,
    identifier: &str,
    edit: impl FnOnce(&mut Vec<Record>) -> Result<T, EditorError>,
) -> Result<T, EditorError> {
    let field = field_mut(state, identifier)?;
    let mut records = match (&field.draft, &field.saved) {
        (Some(Draft::List(records)), _) | (None, ContentValue::List(records)) => records.clone(),
        _ => {
            return Err(EditorError::WrongShape {
                identifier: identifier.to_string(),
                expected: "a list",
            });
        }
    };
    let output = edit(&mut records)?;
    field.draft_version += 1;
    field.draft = Some(Draft::List(records));
    Ok(output)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use serde_json::json;
    use tokio::sync::Semaphore;
    use vitrine_core::re_exports::time::OffsetDateTime;
    use vitrine_core::schema::SettingsMap;
    use vitrine_core::schema::UploadResponse;

    use super::*;
    use crate::api::UploadTarget;

    /// Stores content rows in memory
    ///
    /// Every write consumes one permit of `gate` and fails for identifiers in `rejected`.
    struct ContentApi {
        rows: Mutex<BTreeMap<(String, String), ContentRow>>,
        writes: AtomicUsize,
        gate: Semaphore,
        rejected: Mutex<Vec<String>>,
    }

    impl ContentApi {
        fn new(rows: impl IntoIterator<Item = (&'static str, &'static str, Value)>) -> Self {
            Self {
                rows: Mutex::new(
                    rows.into_iter()
                        .map(|(section, identifier, content)| {
                            (
                                (section.to_string(), identifier.to_string()),
                                row(section, identifier, content),
                            )
                        })
                        .collect(),
                ),
                writes: AtomicUsize::new(0),
                gate: Semaphore::new(Semaphore::MAX_PERMITS),
                rejected: Mutex::new(Vec::new()),
            }
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    fn row(section: &str, identifier: &str, content: Value) -> ContentRow {
        ContentRow {
            section: section.to_string(),
            identifier: identifier.to_string(),
            content,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    impl VitrineApi for ContentApi {
        async fn get_settings(&self) -> Result<SettingsMap, ClientError> {
            Ok(SettingsMap::new())
        }

        async fn get_public_settings(&self) -> Result<SettingsMap, ClientError> {
            Ok(SettingsMap::new())
        }

        async fn put_setting(&self, _key: &str, _value: Value) -> Result<(), ClientError> {
            Ok(())
        }

        async fn upload(
            &self,
            _target: UploadTarget,
            _file_name: &str,
            _bytes: Vec<u8>,
        ) -> Result<UploadResponse, ClientError> {
            Err(ClientError::Validation("not supported".to_string()))
        }

        async fn get_content(&self) -> Result<Vec<ContentRow>, ClientError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }

        async fn get_content_by_type(&self, section: &str) -> Result<Vec<ContentRow>, ClientError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|row| row.section == section)
                .cloned()
                .collect())
        }

        async fn put_content(
            &self,
            section: &str,
            identifier: &str,
            content: Value,
        ) -> Result<ContentRow, ClientError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            if self.rejected.lock().unwrap().iter().any(|id| id == identifier) {
                return Err(ClientError::Validation("Rejected".to_string()));
            }
            let row = row(section, identifier, content);
            self.rows
                .lock()
                .unwrap()
                .insert((section.to_string(), identifier.to_string()), row.clone());
            Ok(row)
        }
    }

    async fn editor(api: ContentApi) -> ContentEditor<ContentApi> {
        let editor = ContentEditor::new(ResourceCache::new(api), "hero", []);
        editor.refresh().await.unwrap();
        editor
    }

    #[test]
    fn widgets_follow_the_value() {
        let short = ContentValue::from_json(json!("a".repeat(50)));
        assert_eq!(short.widget(), Widget::SingleLine);

        let long = ContentValue::from_json(json!("a".repeat(150)));
        assert_eq!(long.widget(), Widget::MultiLine);

        let list = ContentValue::from_json(json!([
            {"title": "Fast", "description": "Very fast"},
            {"title": "Safe", "description": "Very safe"},
        ]));
        assert_eq!(list.widget(), Widget::RecordList);
        let ContentValue::List(records) = &list else {
            panic!("expected a list");
        };
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["title"], json!("Safe"));

        let object = ContentValue::from_json(json!({"cta": {"label": "Go"}}));
        assert_eq!(object.widget(), Widget::JsonBlock);

        let mixed = ContentValue::from_json(json!([{"title": "Fast"}, 3]));
        assert_eq!(mixed.widget(), Widget::JsonBlock);
    }

    #[test]
    fn limit_counts_chars_not_bytes() {
        let text = ContentValue::from_json(json!("ä".repeat(SHORT_TEXT_LIMIT - 1)));
        assert_eq!(text.widget(), Widget::SingleLine);
        let text = ContentValue::from_json(json!("a".repeat(SHORT_TEXT_LIMIT)));
        assert_eq!(text.widget(), Widget::MultiLine);
    }

    #[tokio::test]
    async fn defaults_fill_missing_blocks() {
        let api = ContentApi::new([("hero", "title", json!("Stored"))]);
        let editor = ContentEditor::new(
            ResourceCache::new(api),
            "hero",
            [
                ("title".to_string(), json!("Default")),
                ("subtitle".to_string(), json!("Default subtitle")),
            ],
        );
        assert_eq!(editor.field("title").unwrap().saved, ContentValue::Text("Default".to_string()));

        editor.refresh().await.unwrap();
        let fields = editor.fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].identifier, "subtitle");
        assert_eq!(fields[1].saved, ContentValue::Text("Stored".to_string()));
        assert!(!editor.has_unsaved_changes());
    }

    #[tokio::test]
    async fn save_clears_the_draft() {
        let editor = editor(ContentApi::new([("hero", "title", json!("Old"))])).await;

        editor.set_text("title", "New").unwrap();
        assert!(editor.has_unsaved_changes());
        editor.save("title").await.unwrap();

        let field = editor.field("title").unwrap();
        assert_eq!(field.saved, ContentValue::Text("New".to_string()));
        assert!(!field.is_unsaved());
        assert!(field.error.is_none());
        assert!(!editor.has_unsaved_changes());

        // The cache refetched the section
        editor.refresh().await.unwrap();
        assert_eq!(editor.field("title").unwrap().saved, ContentValue::Text("New".to_string()));
    }

    #[tokio::test]
    async fn malformed_json_is_not_sent() {
        let editor = editor(ContentApi::new([("hero", "cta", json!({"label": "Go"}))])).await;

        editor.set_text("cta", "{\"label\": ").unwrap();
        let error = editor.save("cta").await.unwrap_err();
        assert!(matches!(error, EditorError::InvalidJson { .. }));

        let field = editor.field("cta").unwrap();
        assert_eq!(field.saved, ContentValue::Structured(json!({"label": "Go"})));
        assert_eq!(field.draft, Some(Draft::Json("{\"label\": ".to_string())));
        assert!(matches!(field.error, Some(EditorError::InvalidJson { .. })));
        assert_eq!(editor.cache.api().writes(), 0);
    }

    #[tokio::test]
    async fn failed_save_keeps_the_draft() {
        let api = ContentApi::new([("hero", "title", json!("Old"))]);
        api.rejected.lock().unwrap().push("title".to_string());
        let editor = editor(api).await;

        editor.set_text("title", "New").unwrap();
        let error = editor.save("title").await.unwrap_err();
        assert!(matches!(error, EditorError::Api(_)));

        let field = editor.field("title").unwrap();
        assert_eq!(field.saved, ContentValue::Text("Old".to_string()));
        assert_eq!(field.draft, Some(Draft::Text("New".to_string())));
        assert!(field.error.is_some());
        assert!(!field.saving);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_save_is_rejected_while_in_flight() {
        let api = ContentApi::new([("hero", "title", json!("Old"))]);
        api.gate.forget_permits(Semaphore::MAX_PERMITS);
        let editor = Arc::new(editor(api).await);

        editor.set_text("title", "New").unwrap();
        let first = tokio::spawn({
            let editor = Arc::clone(&editor);
            async move { editor.save("title").await }
        });
        while editor.cache.api().writes() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(editor.field("title").unwrap().saving);

        let error = editor.save("title").await.unwrap_err();
        assert!(matches!(error, EditorError::SaveInProgress(_)));

        editor.cache.api().gate.add_permits(1);
        first.await.unwrap().unwrap();
        assert_eq!(editor.cache.api().writes(), 1);
        assert!(!editor.field("title").unwrap().saving);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn edit_after_reset_survives_running_save() {
        let api = ContentApi::new([("hero", "title", json!("Old"))]);
        api.gate.forget_permits(Semaphore::MAX_PERMITS);
        let editor = Arc::new(editor(api).await);

        editor.set_text("title", "First").unwrap();
        let first = tokio::spawn({
            let editor = Arc::clone(&editor);
            async move { editor.save("title").await }
        });
        while editor.cache.api().writes() == 0 {
            tokio::task::yield_now().await;
        }

        editor.reset();
        editor.set_text("title", "Second").unwrap();

        editor.cache.api().gate.add_permits(1);
        first.await.unwrap().unwrap();

        let field = editor.field("title").unwrap();
        assert_eq!(field.saved, ContentValue::Text("First".to_string()));
        assert_eq!(field.draft, Some(Draft::Text("Second".to_string())));
        assert!(editor.has_unsaved_changes());
    }

    #[tokio::test]
    async fn save_all_reports_each_block() {
        let api = ContentApi::new([
            ("hero", "title", json!("Old title")),
            ("hero", "subtitle", json!("Old subtitle")),
            ("hero", "cta", json!("Old cta")),
        ]);
        api.rejected.lock().unwrap().push("subtitle".to_string());
        let editor = editor(api).await;

        editor.set_text("title", "New title").unwrap();
        editor.set_text("subtitle", "New subtitle").unwrap();

        let results = editor.save_all().await;
        assert_eq!(results.len(), 2);
        for (identifier, result) in &results {
            match identifier.as_str() {
                "title" => assert!(result.is_ok()),
                "subtitle" => assert!(result.is_err()),
                other => panic!("unexpected save of {other}"),
            }
        }

        assert_eq!(
            editor.field("title").unwrap().saved,
            ContentValue::Text("New title".to_string())
        );
        assert!(editor.field("subtitle").unwrap().is_unsaved());
        assert!(!editor.field("cta").unwrap().is_unsaved());
    }

    #[tokio::test]
    async fn records_are_edited_in_the_draft() {
        let editor = editor(ContentApi::new([(
            "hero",
            "features",
            json!([{"title": "Fast", "description": "Very fast"}]),
        )]))
        .await;

        let index = editor.add_record("features").unwrap();
        assert_eq!(index, 1);
        editor
            .set_record_field("features", 1, "title", "Safe")
            .unwrap();
        assert!(matches!(
            editor.set_record_field("features", 5, "title", "Nope"),
            Err(EditorError::NoSuchRecord { index: 5, .. })
        ));
        assert!(matches!(
            editor.set_text("features", "text"),
            Err(EditorError::WrongShape { .. })
        ));

        let removed = editor.remove_record("features", 0).unwrap();
        assert_eq!(removed["title"], json!("Fast"));

        editor.save("features").await.unwrap();
        assert_eq!(
            editor.field("features").unwrap().saved.to_json(),
            json!([{"title": "Safe", "description": ""}])
        );
    }

    #[tokio::test]
    async fn reset_discards_drafts() {
        let editor = editor(ContentApi::new([("hero", "title", json!("Old"))])).await;
        editor.set_text("title", "New").unwrap();
        assert!(matches!(
            editor.set_text("missing", "New"),
            Err(EditorError::UnknownField(_))
        ));

        editor.reset();
        assert!(!editor.has_unsaved_changes());
        assert_eq!(editor.field("title").unwrap().saved, ContentValue::Text("Old".to_string()));
        assert_eq!(editor.cache.api().writes(), 0);
    }
}
