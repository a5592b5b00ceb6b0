//! Bearer token identities
//!
//! Every request may carry an `Authorization: Bearer <token>` header.
//! [`TokenAuthMiddleware`] resolves the token to an [`Identity`] and attaches it to the request,
//! the [`AdminUser`] extractor then enforces the admin role.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::response::Response;
use thiserror::Error;
use tracing::debug;
use vitrine_core::middleware::SimpleVitrineMiddleware;
use vitrine_core::re_exports::uuid::Uuid;
use vitrine_core::stuff::api_error::ApiError;

/// The role of an authenticated user
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    /// May read and write every setting and content block
    Admin,

    /// A customer using the client portal
    Client,
}

/// The authenticated user behind a request
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The user's id, recorded as `updatedBy` on settings writes
    pub user: Uuid,

    /// What the user may do
    pub role: Role,
}

/// Error returned when a configured token can't be parsed
#[derive(Debug, Error)]
pub enum TokenConfigError {
    /// The entry is not of the form `<user uuid>:<token>`.
    #[error("Token entries must look like '<user uuid>:<token>'")]
    MissingSeparator,

    /// The part before the `:` is not a uuid.
    #[error("Invalid user id in token entry: {0}")]
    InvalidUser(#[from] vitrine_core::re_exports::uuid::Error),

    /// The token part is empty.
    #[error("Token entries must not have an empty token")]
    EmptyToken,
}

/// Resolves bearer tokens to [`Identity`]s and attaches them to the request
#[derive(Debug, Clone, Default)]
pub struct TokenAuthMiddleware {
    tokens: Arc<HashMap<String, Identity>>,
}

impl TokenAuthMiddleware {
    /// Constructs the middleware from the configured token lists
    pub fn from_config(
        admin_tokens: &[String],
        client_tokens: &[String],
    ) -> Result<Self, TokenConfigError> {
        let mut tokens = HashMap::new();
        for (entries, role) in [(admin_tokens, Role::Admin), (client_tokens, Role::Client)] {
            for entry in entries {
                let (user, token) = entry
                    .split_once(':')
                    .ok_or(TokenConfigError::MissingSeparator)?;
                if token.is_empty() {
                    return Err(TokenConfigError::EmptyToken);
                }
                let user = Uuid::parse_str(user.trim())?;
                tokens.insert(token.to_string(), Identity { user, role });
            }
        }
        Ok(Self {
            tokens: Arc::new(tokens),
        })
    }

    /// Constructs the middleware from already known identities
    pub fn from_identities(tokens: impl IntoIterator<Item = (String, Identity)>) -> Self {
        Self {
            tokens: Arc::new(tokens.into_iter().collect()),
        }
    }

    fn resolve(&self, request: &Request) -> Result<Option<Identity>, ApiError> {
        let Some(header) = request.headers().get(AUTHORIZATION) else {
            return Ok(None);
        };
        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("Malformed authorization header"))?;
        self.tokens
            .get(token.trim())
            .copied()
            .map(Some)
            .ok_or_else(|| ApiError::unauthorized("Unknown bearer token"))
    }
}

impl SimpleVitrineMiddleware for TokenAuthMiddleware {
    async fn pre_handler(&mut self, mut request: Request) -> ControlFlow<Response, Request> {
        match self.resolve(&request) {
            Ok(Some(identity)) => {
                request.extensions_mut().insert(identity);
                ControlFlow::Continue(request)
            }
            Ok(None) => ControlFlow::Continue(request),
            Err(error) => ControlFlow::Break(error.into_response()),
        }
    }
}

/// Extractor for an [`Identity`] with the admin role
///
/// Rejects anonymous requests with `401` and non-admins with `403`.
#[derive(Debug, Copy, Clone)]
pub struct AdminUser(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<Identity>()
            .copied()
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;
        if identity.role != Role::Admin {
            debug!(user = %identity.user, "Rejected non-admin");
            return Err(ApiError::forbidden("Requires the admin role"));
        }
        Ok(Self(identity))
    }
}
