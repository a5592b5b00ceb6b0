use vitrine::Vitrine;
use vitrine::config::VitrineConfig;
use vitrine::contrib::content::RormContentBackend;
use vitrine::contrib::settings::RormSettingsBackend;
use vitrine::core::re_exports::serde_json::json;
use vitrine::core::schema::setting_keys;

use crate::database::PostgresConfig;

mod database;

/// Settings the site shows before an admin changed them
const DEFAULTS: &[(&str, &str)] = &[
    (setting_keys::COMPANY_NAME, "Example Corp"),
    (setting_keys::SITE_TITLE, "Example Corp"),
    (setting_keys::PRIMARY_COLOR, "#2563eb"),
    (setting_keys::THEME, "light"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = VitrineConfig::from_env()?;
    let vitrine = Vitrine::new(config)?;

    let db = PostgresConfig::from_env()?.connect().await?;

    let mut builder = vitrine
        .init_stores(
            RormSettingsBackend::new(db.clone()),
            RormContentBackend::new(db),
        )
        .await?;

    let settings = &builder.state().settings;
    for (key, value) in DEFAULTS {
        if settings.get(key).is_err() {
            settings.upsert(key, json!(value), None).await?;
            tracing::info!(settings.key = *key, "Seeded default setting");
        }
    }

    builder.start().await?;

    Ok(())
}
