use std::time::Duration;

use reqwest::Client;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::Url;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::Form;
use reqwest::multipart::Part;
use serde::de::DeserializeOwned;
use serde_json::Value;
use vitrine_core::schema::ApiErrorResponse;
use vitrine_core::schema::ContentRow;
use vitrine_core::schema::PutContentRequest;
use vitrine_core::schema::PutSettingRequest;
use vitrine_core::schema::SettingsMap;
use vitrine_core::schema::UploadResponse;

use crate::error::ClientError;

/// Which branding image an upload replaces
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UploadTarget {
    /// `POST /settings/logo`
    Logo,
    /// `POST /settings/favicon`
    Favicon,
}

/// The operations of a vitrine server
///
/// [`ApiClient`] implements them over http.
/// The [`ResourceCache`](crate::ResourceCache) and the editor only depend on this trait.
pub trait VitrineApi: Send + Sync + 'static {
    /// `GET /settings`
    fn get_settings(&self) -> impl Future<Output = Result<SettingsMap, ClientError>> + Send;

    /// `GET /settings/public`
    fn get_public_settings(&self)
    -> impl Future<Output = Result<SettingsMap, ClientError>> + Send;

    /// `PUT /settings`
    fn put_setting(
        &self,
        key: &str,
        value: Value,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// `POST /settings/logo` or `POST /settings/favicon`
    fn upload(
        &self,
        target: UploadTarget,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<UploadResponse, ClientError>> + Send;

    /// `GET /content`
    fn get_content(&self) -> impl Future<Output = Result<Vec<ContentRow>, ClientError>> + Send;

    /// `GET /content/type/{type}`
    fn get_content_by_type(
        &self,
        section: &str,
    ) -> impl Future<Output = Result<Vec<ContentRow>, ClientError>> + Send;

    /// `PUT /content`
    fn put_content(
        &self,
        section: &str,
        identifier: &str,
        content: Value,
    ) -> impl Future<Output = Result<ContentRow, ClientError>> + Send;
}

/// Http client for a vitrine server
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Constructs a client for the server at `base_url` (for example `https://example.com/api`)
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|error| ClientError::InvalidUrl(error.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Sends `token` as bearer token with every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// `GET /settings/{key}`
    pub async fn get_setting(&self, key: &str) -> Result<Value, ClientError> {
        let request = self.client.get(self.url(&["settings", key]));
        self.send(request).await
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self.authorize(request).send().await?;
        Self::decode(response).await
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(body) => body.message,
            Err(_) => status.canonical_reason().unwrap_or("Unknown error").to_string(),
        };
        Err(ClientError::from_status(status, message))
    }
}

impl VitrineApi for ApiClient {
    async fn get_settings(&self) -> Result<SettingsMap, ClientError> {
        self.send(self.client.get(self.url(&["settings"]))).await
    }

    async fn get_public_settings(&self) -> Result<SettingsMap, ClientError> {
        self.send(self.client.get(self.url(&["settings", "public"])))
            .await
    }

    async fn put_setting(&self, key: &str, value: Value) -> Result<(), ClientError> {
        let request = self
            .client
            .put(self.url(&["settings"]))
            .json(&PutSettingRequest {
                key: key.to_string(),
                value,
            });
        let _: PutSettingRequest = self.send(request).await?;
        Ok(())
    }

    async fn upload(
        &self,
        target: UploadTarget,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, ClientError> {
        let path = match target {
            UploadTarget::Logo => "logo",
            UploadTarget::Favicon => "favicon",
        };
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.to_string()));
        let request = self
            .client
            .post(self.url(&["settings", path]))
            .multipart(form);
        self.send(request).await
    }

    async fn get_content(&self) -> Result<Vec<ContentRow>, ClientError> {
        self.send(self.client.get(self.url(&["content"]))).await
    }

    async fn get_content_by_type(&self, section: &str) -> Result<Vec<ContentRow>, ClientError> {
        self.send(self.client.get(self.url(&["content", "type", section])))
            .await
    }

    async fn put_content(
        &self,
        section: &str,
        identifier: &str,
        content: Value,
    ) -> Result<ContentRow, ClientError> {
        let request = self
            .client
            .put(self.url(&["content"]))
            .json(&PutContentRequest {
                section: section.to_string(),
                identifier: identifier.to_string(),
                content,
            });
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_appended_and_escaped() {
        let client = ApiClient::new("http://localhost:8080/api/").unwrap();
        assert_eq!(
            client.url(&["settings", "public"]).as_str(),
            "http://localhost:8080/api/settings/public"
        );
        assert_eq!(
            client.url(&["content", "type", "our services"]).as_str(),
            "http://localhost:8080/api/content/type/our%20services"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(
            ApiClient::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            ApiClient::new("mailto:admin@example.com"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
