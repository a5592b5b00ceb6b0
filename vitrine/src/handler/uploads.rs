use axum::extract::Path;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use vitrine_contrib_content::ContentBackend;
use vitrine_contrib_settings::SettingsBackend;
use vitrine_core::stuff::api_error::ApiResult;

use crate::state::AppState;

/// `GET {uploads prefix}/{name}`
///
/// Every upload gets a fresh name, so its content never changes.
pub async fn get_file<S: SettingsBackend, C: ContentBackend>(
    State(state): State<AppState<S, C>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let (content_type, bytes) = state.uploads.read(&name).await?;
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    )
        .into_response())
}
