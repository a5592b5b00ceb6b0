use std::net::SocketAddr;

use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use vitrine::AppState;
use vitrine::auth::Identity;
use vitrine::auth::Role;
use vitrine::auth::TokenAuthMiddleware;
use vitrine::contrib::content::ContentStore;
use vitrine::contrib::content::MemoryContentBackend;
use vitrine::contrib::settings::MemorySettingsBackend;
use vitrine::contrib::settings::SettingsStore;
use vitrine::core::re_exports::uuid::Uuid;
use vitrine::router;
use vitrine::uploads::UploadStorage;
use vitrine_client::ApiClient;
use vitrine_client::ClientError;
use vitrine_client::ResourceCache;
use vitrine_client::ResourceKey;
use vitrine_client::UploadTarget;
use vitrine_client::VitrineApi;
use vitrine_client::branding::BrandingPropagator;
use vitrine_client::branding::CounterFreshness;
use vitrine_client::branding::LogoSource;
use vitrine_client::editor::ContentEditor;
use vitrine_client::editor::ContentValue;

const ADMIN: &str = "admin-token";

/// A server listening on a random local port
struct Server {
    address: SocketAddr,
    _uploads: TempDir,
}

impl Server {
    async fn start() -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let state = AppState::new(
            SettingsStore::load(MemorySettingsBackend::new()).await.unwrap(),
            ContentStore::load(MemoryContentBackend::new()).await.unwrap(),
            UploadStorage::new(uploads.path(), "/uploads", 64 * 1024),
        );
        let auth = TokenAuthMiddleware::from_identities([(
            ADMIN.to_string(),
            Identity {
                user: Uuid::new_v4(),
                role: Role::Admin,
            },
        )]);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state, auth)).await });

        Self {
            address,
            _uploads: uploads,
        }
    }

    fn client(&self) -> ApiClient {
        ApiClient::new(&format!("http://{}", self.address)).unwrap()
    }

    fn admin(&self) -> ApiClient {
        self.client().with_token(ADMIN)
    }
}

#[tokio::test]
async fn settings_round_trip() {
    let server = Server::start().await;
    let admin = server.admin();

    admin.put_setting("companyName", json!("Acme")).await.unwrap();
    admin.put_setting("companyName", json!("Acme Inc.")).await.unwrap();
    admin.put_setting("smtpHost", json!("mail.internal")).await.unwrap();

    let all = admin.get_settings().await.unwrap();
    assert_eq!(all["companyName"], json!("Acme Inc."));
    assert_eq!(admin.get_setting("smtpHost").await.unwrap(), json!("mail.internal"));

    let public = server.client().get_public_settings().await.unwrap();
    assert_eq!(public["companyName"], json!("Acme Inc."));
    assert!(!public.contains_key("smtpHost"));
}

#[tokio::test]
async fn errors_are_classified() {
    let server = Server::start().await;

    let error = server.client().get_settings().await.unwrap_err();
    assert!(matches!(error, ClientError::NotAuthorized { .. }));

    let error = server.admin().get_setting("missing").await.unwrap_err();
    assert!(matches!(error, ClientError::NotFound(_)));

    let error = server.admin().put_setting("", json!(1)).await.unwrap_err();
    assert!(matches!(error, ClientError::Validation(_)));
    assert!(!error.is_transient());
}

#[tokio::test]
async fn uploaded_logo_is_public_and_served() {
    let server = Server::start().await;
    let admin = server.admin();

    let response = admin
        .upload(UploadTarget::Logo, "logo.png", b"\x89PNG fake".to_vec())
        .await
        .unwrap();
    assert!(response.url.starts_with("/uploads/logo-"));

    let public = server.client().get_public_settings().await.unwrap();
    assert_eq!(public["logoPath"], json!(response.url));

    let file = reqwest::get(format!("http://{}{}", server.address, response.url))
        .await
        .unwrap();
    assert!(file.status().is_success());
    assert_eq!(file.bytes().await.unwrap().as_ref(), b"\x89PNG fake");

    let error = admin
        .upload(UploadTarget::Favicon, "favicon.exe", vec![1, 2, 3])
        .await
        .unwrap_err();
    assert!(matches!(error, ClientError::Validation(_)));
}

#[tokio::test]
async fn content_is_read_by_section() {
    let server = Server::start().await;
    let admin = server.admin();

    let row = admin
        .put_content("hero", "title", json!("Welcome"))
        .await
        .unwrap();
    assert_eq!(row.section, "hero");
    admin
        .put_content("contact", "email", json!("hi@example.com"))
        .await
        .unwrap();

    let hero = server.client().get_content_by_type("hero").await.unwrap();
    assert_eq!(hero.len(), 1);
    assert_eq!(hero[0].content, json!("Welcome"));

    assert_eq!(admin.get_content().await.unwrap().len(), 2);
    assert!(server.client().get_content_by_type("missing").await.unwrap().is_empty());
}

#[tokio::test]
async fn branding_follows_admin_writes() {
    let server = Server::start().await;
    let cache = ResourceCache::new(server.admin());
    let mut propagator = BrandingPropagator::new(CounterFreshness::default());
    let mut public = cache.subscribe(ResourceKey::PublicSettings);

    let state = public.wait_settled().await.unwrap();
    assert!(propagator.update(&state));
    let effects = propagator.watch().borrow().clone().unwrap();
    assert!(matches!(effects.logo, LogoSource::Placeholder { .. }));

    cache.put_setting("primaryColor", json!("#ff6600")).await.unwrap();
    let response = cache
        .upload(UploadTarget::Logo, "logo.svg", b"<svg/>".to_vec())
        .await
        .unwrap();

    // Both writes invalidated the public settings
    let state = loop {
        let state = public.wait_settled().await.unwrap();
        let logo = state
            .value
            .as_ref()
            .and_then(|value| value.as_settings())
            .and_then(|settings| settings.get("logoPath").cloned());
        if logo == Some(json!(response.url)) {
            break state;
        }
        public.changed().await.unwrap();
    };
    assert!(propagator.update(&state));

    let effects = propagator.watch().borrow().clone().unwrap();
    let LogoSource::Image { src } = &effects.logo else {
        panic!("expected an image logo");
    };
    assert!(src.starts_with(&format!("{}?v=", response.url)));
    assert!(
        effects
            .css_variables
            .iter()
            .any(|(name, value)| name == "--primary" && value.starts_with("24 "))
    );

    // Nothing changed, nothing to apply
    assert!(!propagator.update(&state));
}

#[tokio::test]
async fn editor_saves_through_the_server() {
    let server = Server::start().await;
    let admin = server.admin();
    admin
        .put_content(
            "services",
            "items",
            json!([{"title": "Design", "description": "We design"}]),
        )
        .await
        .unwrap();

    let editor = ContentEditor::new(
        ResourceCache::new(admin),
        "services",
        [("heading".to_string(), json!("Our services"))],
    );
    editor.refresh().await.unwrap();

    let index = editor.add_record("items").unwrap();
    editor
        .set_record_field("items", index, "title", "Build")
        .unwrap();
    editor.set_text("heading", "What we do").unwrap();

    for (identifier, result) in editor.save_all().await {
        assert!(result.is_ok(), "saving {identifier} failed");
    }
    assert!(!editor.has_unsaved_changes());

    let rows = server.client().get_content_by_type("services").await.unwrap();
    assert_eq!(rows.len(), 2);
    let items = rows.iter().find(|row| row.identifier == "items").unwrap();
    let ContentValue::List(records) = ContentValue::from_json(items.content.clone()) else {
        panic!("expected a list");
    };
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["title"], json!("Build"));
}
