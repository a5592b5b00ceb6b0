use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::routing::post;
use vitrine_contrib_content::ContentBackend;
use vitrine_contrib_settings::SettingsBackend;
use vitrine_core::middleware::VitrineMiddleware;
use vitrine_core::middleware::catch_unwind::CatchUnwindMiddleware;
use vitrine_core::middleware::request_span::RequestSpanMiddleware;
use vitrine_core::stuff::api_error::ApiError;

use crate::auth::TokenAuthMiddleware;
use crate::handler;
use crate::state::AppState;

/// Room for the multipart framing around an upload
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Constructs the router serving every endpoint
///
/// | Method | Path                    | Access  |
/// |--------|-------------------------|---------|
/// | GET    | `/settings`             | admin   |
/// | GET    | `/settings/public`      | public  |
/// | GET    | `/settings/{key}`       | admin   |
/// | PUT    | `/settings`             | admin   |
/// | POST   | `/settings/logo`        | admin   |
/// | POST   | `/settings/favicon`     | admin   |
/// | GET    | `/content`              | admin   |
/// | GET    | `/content/grouped`      | public  |
/// | GET    | `/content/type/{type}`  | public  |
/// | PUT    | `/content`              | admin   |
/// | GET    | `{uploads}/{name}`      | public  |
pub fn router<S: SettingsBackend, C: ContentBackend>(
    state: AppState<S, C>,
    auth: TokenAuthMiddleware,
) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.uploads.max_size() + MULTIPART_OVERHEAD);
    let uploads_route = format!("{}/{{name}}", state.uploads.prefix());

    Router::new()
        .route(
            "/settings",
            get(handler::settings::get_all::<S, C>).put(handler::settings::put::<S, C>),
        )
        .route("/settings/public", get(handler::settings::get_public::<S, C>))
        .route("/settings/{key}", get(handler::settings::get_one::<S, C>))
        .route(
            "/settings/logo",
            post(handler::settings::upload_logo::<S, C>).layer(upload_limit),
        )
        .route(
            "/settings/favicon",
            post(handler::settings::upload_favicon::<S, C>).layer(upload_limit),
        )
        .route(
            "/content",
            get(handler::content::get_all::<S, C>).put(handler::content::put::<S, C>),
        )
        .route("/content/grouped", get(handler::content::get_grouped::<S, C>))
        .route("/content/type/{type}", get(handler::content::get_by_type::<S, C>))
        .route(&uploads_route, get(handler::uploads::get_file::<S, C>))
        .fallback(not_found)
        .with_state(state)
        .layer(auth.into_layer())
        .layer(CatchUnwindMiddleware.into_layer())
        .layer(RequestSpanMiddleware.into_layer())
}

async fn not_found() -> ApiError {
    ApiError::not_found("Unknown route")
}
