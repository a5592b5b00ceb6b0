use axum::extract::Path;
use axum::extract::State;
use vitrine_contrib_content::ContentBackend;
use vitrine_contrib_settings::SettingsBackend;
use vitrine_core::schema::ContentGroups;
use vitrine_core::schema::ContentRow;
use vitrine_core::schema::PutContentRequest;
use vitrine_core::stuff::api_error::ApiResult;
use vitrine_core::stuff::api_json::ApiJson;

use crate::auth::AdminUser;
use crate::state::AppState;

/// `GET /content`
pub async fn get_all<S: SettingsBackend, C: ContentBackend>(
    _admin: AdminUser,
    State(state): State<AppState<S, C>>,
) -> ApiJson<Vec<ContentRow>> {
    ApiJson(state.content.get_all())
}

/// `GET /content/grouped`
pub async fn get_grouped<S: SettingsBackend, C: ContentBackend>(
    State(state): State<AppState<S, C>>,
) -> ApiJson<ContentGroups> {
    ApiJson(state.content.get_all_grouped())
}

/// `GET /content/type/{type}`
pub async fn get_by_type<S: SettingsBackend, C: ContentBackend>(
    State(state): State<AppState<S, C>>,
    Path(section): Path<String>,
) -> ApiJson<Vec<ContentRow>> {
    ApiJson(state.content.get_by_section(&section))
}

/// `PUT /content`
pub async fn put<S: SettingsBackend, C: ContentBackend>(
    _admin: AdminUser,
    State(state): State<AppState<S, C>>,
    ApiJson(request): ApiJson<PutContentRequest>,
) -> ApiResult<ApiJson<ContentRow>> {
    let row = state
        .content
        .upsert(&request.section, &request.identifier, request.content)
        .await?;
    Ok(ApiJson(row))
}
