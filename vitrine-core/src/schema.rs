//! The wire format spoken between the vitrine server and its clients

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

/// All settings mapped from their key to their value
pub type SettingsMap = BTreeMap<String, Value>;

/// Content values grouped by `section` and then `identifier`
pub type ContentGroups = BTreeMap<String, BTreeMap<String, Value>>;

/// Well known settings keys
pub mod setting_keys {
    /// The company's display name
    pub const COMPANY_NAME: &str = "companyName";
    /// Url path of the uploaded logo
    pub const LOGO_PATH: &str = "logoPath";
    /// Url path of the uploaded favicon
    pub const FAVICON_PATH: &str = "faviconPath";
    /// Hex color (`#rrggbb`) the theme is derived from
    pub const PRIMARY_COLOR: &str = "primaryColor";
    /// Name of the theme (`light`, `dark`, ...)
    pub const THEME: &str = "theme";
    /// The document title
    pub const SITE_TITLE: &str = "siteTitle";
    /// The document's meta description
    pub const SITE_DESCRIPTION: &str = "siteDescription";

    /// Keys which may be served to unauthenticated consumers
    pub const PUBLIC: &[&str] = &[
        COMPANY_NAME,
        LOGO_PATH,
        FAVICON_PATH,
        PRIMARY_COLOR,
        THEME,
        SITE_TITLE,
        SITE_DESCRIPTION,
    ];

    /// Is `key` part of the public subset?
    pub fn is_public(key: &str) -> bool {
        PUBLIC.contains(&key)
    }
}

/// Body of `PUT /settings`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutSettingRequest {
    /// The settings key to write
    pub key: String,
    /// The new value
    pub value: Value,
}

/// Response of `POST /settings/logo` and `POST /settings/favicon`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Url path under which the uploaded file is served
    pub url: String,
}

/// A single stored content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRow {
    /// The page section the block belongs to (`hero`, `services`, `contact`, ...)
    pub section: String,
    /// The block's name inside its section
    pub identifier: String,
    /// Arbitrary json value
    pub content: Value,
    /// Point in time of the last write
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Body of `PUT /content`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutContentRequest {
    /// The page section the block belongs to
    pub section: String,
    /// The block's name inside its section
    pub identifier: String,
    /// The complete new value
    pub content: Value,
}

/// Uniform body of every error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Human readable description of the error
    pub message: String,
}

/// Groups a flat list of content rows by `section` and `identifier`
///
/// Every row ends up in exactly one slot.
/// Should the input contain the same pair twice, the most recently updated row wins.
pub fn group_by_section<'a>(rows: impl IntoIterator<Item = &'a ContentRow>) -> ContentGroups {
    let mut latest: BTreeMap<(&str, &str), &ContentRow> = BTreeMap::new();
    for row in rows {
        latest
            .entry((row.section.as_str(), row.identifier.as_str()))
            .and_modify(|existing| {
                if row.updated_at >= existing.updated_at {
                    *existing = row;
                }
            })
            .or_insert(row);
    }

    let mut groups = ContentGroups::new();
    for ((section, identifier), row) in latest {
        groups
            .entry(section.to_string())
            .or_default()
            .insert(identifier.to_string(), row.content.clone());
    }
    groups
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    fn row(section: &str, identifier: &str, content: Value, updated_at: OffsetDateTime) -> ContentRow {
        ContentRow {
            section: section.to_string(),
            identifier: identifier.to_string(),
            content,
            updated_at,
        }
    }

    #[test]
    fn grouping_places_every_row() {
        let rows = vec![
            row("hero", "title", json!("Welcome"), datetime!(2024-01-01 0:00 UTC)),
            row("hero", "subtitle", json!("We build things"), datetime!(2024-01-01 0:00 UTC)),
            row("contact", "info", json!({"email": "hi@example.com"}), datetime!(2024-01-01 0:00 UTC)),
        ];

        let groups = group_by_section(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["hero"]["title"], json!("Welcome"));
        assert_eq!(groups["hero"]["subtitle"], json!("We build things"));
        assert_eq!(groups["contact"]["info"]["email"], "hi@example.com");
        assert!(!groups.contains_key("services"));

        // Grouping the same rows again yields the same result
        assert_eq!(group_by_section(&rows), groups);
    }

    #[test]
    fn grouping_prefers_latest_duplicate() {
        let rows = vec![
            row("hero", "title", json!("new"), datetime!(2024-02-01 0:00 UTC)),
            row("hero", "title", json!("old"), datetime!(2024-01-01 0:00 UTC)),
        ];
        assert_eq!(group_by_section(&rows)["hero"]["title"], json!("new"));
    }

    #[test]
    fn content_row_uses_camel_case() {
        let row = row("hero", "title", json!("x"), datetime!(2024-01-01 0:00 UTC));
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["updatedAt"], "2024-01-01T00:00:00Z");
    }
}
