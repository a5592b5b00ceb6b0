//! Core concepts shared by every vitrine crate
//!
//! - [`ApiError`](stuff::api_error::ApiError): the error returned by every handler
//! - [`ApiJson`](stuff::api_json::ApiJson): a json extractor reporting rejections as `ApiError`
//! - [`middleware`]: simplified `tower::Layer`s
//! - [`schema`]: the wire format spoken between the server and its clients

pub mod re_exports {
    pub use axum;
    #[cfg(feature = "rorm")]
    pub use rorm;
    pub use serde;
    pub use serde_json;
    pub use time;
    pub use uuid;
}

pub mod middleware;
pub mod schema;
pub mod stuff;
