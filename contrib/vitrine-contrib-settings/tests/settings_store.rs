use std::sync::Arc;

use vitrine_contrib_settings::MemorySettingsBackend;
use vitrine_contrib_settings::SettingRecord;
use vitrine_contrib_settings::SettingsBackend;
use vitrine_contrib_settings::SettingsError;
use vitrine_contrib_settings::SettingsStore;
use vitrine_core::re_exports::serde_json::json;
use vitrine_core::re_exports::time::OffsetDateTime;

fn record(key: &str, value: &str) -> SettingRecord {
    SettingRecord {
        key: key.to_string(),
        value: json!(value),
        updated_by: None,
        updated_at: OffsetDateTime::now_utc(),
    }
}

#[tokio::test]
async fn load_reads_existing_records() {
    let backend = MemorySettingsBackend::with_records([
        record("companyName", "Acme"),
        record("primaryColor", "#ff6600"),
    ]);
    let store = SettingsStore::load(backend).await.unwrap();

    let all = store.get_all();
    assert_eq!(all["companyName"], json!("Acme"));
    assert_eq!(all["primaryColor"], json!("#ff6600"));
}

#[tokio::test]
async fn load_fails_on_unavailable_backend() {
    let backend = MemorySettingsBackend::new();
    backend.set_unavailable(true);
    let result = SettingsStore::load(backend).await;
    assert!(matches!(result, Err(SettingsError::Backend(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_leave_cache_and_backend_in_agreement() {
    let store = Arc::new(SettingsStore::load(MemorySettingsBackend::new()).await.unwrap());

    let mut tasks = Vec::new();
    for i in 0..32 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store.upsert("theme", json!(format!("theme-{i}")), None).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let snapshot = store.snapshot();
    assert_eq!(snapshot.revision, 32);

    // Whoever wrote last in the backend must be what the cache shows
    let reloaded = SettingsStore::load(MemorySettingsBackend::with_records(
        snapshot.records.values().cloned(),
    ))
    .await
    .unwrap();
    assert_eq!(reloaded.get_all(), store.get_all());
}

#[tokio::test]
async fn reload_picks_up_foreign_writes() {
    let backend = Arc::new(MemorySettingsBackend::new());
    let store = SettingsStore::load(SharedBackend(Arc::clone(&backend)))
        .await
        .unwrap();
    assert!(store.get_all().is_empty());

    backend.upsert(&record("siteTitle", "Written elsewhere")).await.unwrap();
    assert!(store.get_all().is_empty());

    store.reload().await.unwrap();
    assert_eq!(store.get_all()["siteTitle"], json!("Written elsewhere"));
}

/// Lets the test keep a handle on the backend the store owns
struct SharedBackend(Arc<MemorySettingsBackend>);

impl SettingsBackend for SharedBackend {
    type Error = <MemorySettingsBackend as SettingsBackend>::Error;

    async fn load_all(&self) -> Result<Vec<SettingRecord>, Self::Error> {
        self.0.load_all().await
    }

    async fn upsert(&self, record: &SettingRecord) -> Result<(), Self::Error> {
        self.0.upsert(record).await
    }
}
