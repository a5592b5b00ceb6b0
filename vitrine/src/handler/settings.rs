use axum::extract::Multipart;
use axum::extract::Path;
use axum::extract::State;
use axum::extract::multipart::MultipartRejection;
use tracing::warn;
use vitrine_contrib_content::ContentBackend;
use vitrine_contrib_settings::SettingsBackend;
use vitrine_core::re_exports::serde_json::Value;
use vitrine_core::schema::PutSettingRequest;
use vitrine_core::schema::SettingsMap;
use vitrine_core::schema::UploadResponse;
use vitrine_core::stuff::api_error::ApiError;
use vitrine_core::stuff::api_error::ApiResult;
use vitrine_core::stuff::api_json::ApiJson;

use crate::auth::AdminUser;
use crate::auth::Identity;
use crate::state::AppState;
use crate::uploads::UploadKind;

/// Name of the multipart field carrying the uploaded file
const FILE_FIELD: &str = "file";

/// `GET /settings`
pub async fn get_all<S: SettingsBackend, C: ContentBackend>(
    _admin: AdminUser,
    State(state): State<AppState<S, C>>,
) -> ApiJson<SettingsMap> {
    ApiJson(state.settings.get_all())
}

/// `GET /settings/public`
pub async fn get_public<S: SettingsBackend, C: ContentBackend>(
    State(state): State<AppState<S, C>>,
) -> ApiJson<SettingsMap> {
    ApiJson(state.settings.get_public())
}

/// `GET /settings/{key}`
pub async fn get_one<S: SettingsBackend, C: ContentBackend>(
    _admin: AdminUser,
    State(state): State<AppState<S, C>>,
    Path(key): Path<String>,
) -> ApiResult<ApiJson<Value>> {
    Ok(ApiJson(state.settings.get(&key)?))
}

/// `PUT /settings`
pub async fn put<S: SettingsBackend, C: ContentBackend>(
    AdminUser(identity): AdminUser,
    State(state): State<AppState<S, C>>,
    ApiJson(request): ApiJson<PutSettingRequest>,
) -> ApiResult<ApiJson<PutSettingRequest>> {
    state
        .settings
        .upsert(&request.key, request.value.clone(), Some(identity.user))
        .await?;
    Ok(ApiJson(request))
}

/// `POST /settings/logo`
pub async fn upload_logo<S: SettingsBackend, C: ContentBackend>(
    AdminUser(identity): AdminUser,
    State(state): State<AppState<S, C>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<ApiJson<UploadResponse>> {
    upload(UploadKind::Logo, identity, state, multipart).await
}

/// `POST /settings/favicon`
pub async fn upload_favicon<S: SettingsBackend, C: ContentBackend>(
    AdminUser(identity): AdminUser,
    State(state): State<AppState<S, C>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<ApiJson<UploadResponse>> {
    upload(UploadKind::Favicon, identity, state, multipart).await
}

/// Stores the multipart's `file` field and points the kind's setting to it
///
/// Should the setting fail to update, the file is removed again.
async fn upload<S: SettingsBackend, C: ContentBackend>(
    kind: UploadKind,
    identity: Identity,
    state: AppState<S, C>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<ApiJson<UploadResponse>> {
    let mut multipart = multipart
        .map_err(|rejection| ApiError::bad_request("Expected a multipart body").with_source(rejection))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| ApiError::bad_request("Malformed multipart body").with_source(error))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|error| {
            ApiError::bad_request("Failed to read the uploaded file").with_source(error)
        })?;

        let url = state
            .uploads
            .store(kind, file_name.as_deref(), content_type.as_deref(), &bytes)
            .await?;

        if let Err(error) = state
            .settings
            .upsert(kind.setting_key(), Value::String(url.clone()), Some(identity.user))
            .await
        {
            if let Err(cleanup) = state.uploads.remove(&url).await {
                warn!(upload.url = url.as_str(), error.display = %cleanup, "Failed to remove orphaned upload");
            }
            return Err(error.into());
        }

        return Ok(ApiJson(UploadResponse { url }));
    }

    Err(ApiError::bad_request("Missing the 'file' field"))
}
