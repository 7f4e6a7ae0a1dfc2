//! REST implementation of the gateway contract.

use crate::config::{ClientConfig, ClientCredentials};
use crate::gateway::{Gateway, GatewayError, GatewayResult};
use async_trait::async_trait;
use campus_core::{
    Announcement, AnnouncementId, NewAnnouncement, Notification, NotificationId,
    NotificationSummary, Principal, UserProfile,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;

const PRINCIPAL_HEADER: &str = "x-principal";

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl From<ApiClientError> for GatewayError {
    fn from(err: ApiClientError) -> Self {
        match err {
            ApiClientError::Http(e) if e.is_decode() => GatewayError::InvalidResponse(e.to_string()),
            ApiClientError::Http(e) => GatewayError::Unavailable(e.to_string()),
            ApiClientError::Serde(e) => GatewayError::InvalidResponse(e.to_string()),
            ApiClientError::Status { status: 404, message } => GatewayError::NotFound(message),
            ApiClientError::Status { status, message } => GatewayError::Rejected { status, message },
            ApiClientError::InvalidResponse(message) => GatewayError::InvalidResponse(message),
            ApiClientError::Config(message) => GatewayError::Unavailable(message),
        }
    }
}

/// Error body the backend returns on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ServerErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreatedAnnouncement {
    id: AnnouncementId,
}

#[derive(Clone)]
pub struct RestGateway {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl RestGateway {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let auth_header = build_auth_headers(&config.auth)?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(
        &self,
        method: reqwest::Method,
        caller: &Principal,
        path: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .headers(self.auth_header.clone())
            .header(PRINCIPAL_HEADER, caller.as_str())
    }

    async fn get_json<T>(&self, caller: &Principal, path: &str) -> Result<T, ApiClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.request(reqwest::Method::GET, caller, path).send().await?;
        self.parse_response(response).await
    }

    /// GET that maps 404 to `None`.
    async fn get_optional_json<T>(
        &self,
        caller: &Principal,
        path: &str,
    ) -> Result<Option<T>, ApiClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.request(reqwest::Method::GET, caller, path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.parse_response(response).await.map(Some)
    }

    async fn send_json<B>(
        &self,
        method: reqwest::Method,
        caller: &Principal,
        path: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ApiClientError>
    where
        B: serde::Serialize + ?Sized,
    {
        let mut request = self.request(method, caller, path);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiClientError> {
        if response.status().is_success() {
            let text = response.text().await?;
            Ok(serde_json::from_str::<T>(&text)?)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

async fn error_from_response(response: reqwest::Response) -> ApiClientError {
    let status = response.status().as_u16();
    let text = match response.text().await {
        Ok(text) => text,
        Err(err) => return ApiClientError::Http(err),
    };
    let message = match serde_json::from_str::<ServerErrorBody>(&text) {
        Ok(body) => format!("{}: {}", body.code, body.message),
        Err(_) => text,
    };
    ApiClientError::Status { status, message }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn get_caller_user_profile(
        &self,
        caller: &Principal,
    ) -> GatewayResult<Option<UserProfile>> {
        Ok(self.get_optional_json(caller, "/api/v1/profile").await?)
    }

    async fn save_caller_user_profile(
        &self,
        caller: &Principal,
        profile: &UserProfile,
    ) -> GatewayResult<()> {
        self.send_json(reqwest::Method::PUT, caller, "/api/v1/profile", Some(profile))
            .await?;
        Ok(())
    }

    async fn list_announcements(&self, caller: &Principal) -> GatewayResult<Vec<Announcement>> {
        Ok(self.get_json(caller, "/api/v1/announcements").await?)
    }

    async fn get_announcement(
        &self,
        caller: &Principal,
        id: AnnouncementId,
    ) -> GatewayResult<Option<Announcement>> {
        let path = format!("/api/v1/announcements/{}", id);
        Ok(self.get_optional_json(caller, &path).await?)
    }

    async fn create_announcement(
        &self,
        caller: &Principal,
        draft: &NewAnnouncement,
    ) -> GatewayResult<AnnouncementId> {
        let response = self
            .send_json(reqwest::Method::POST, caller, "/api/v1/announcements", Some(draft))
            .await?;
        let created: CreatedAnnouncement = self.parse_response(response).await?;
        Ok(created.id)
    }

    async fn delete_announcement(
        &self,
        caller: &Principal,
        id: AnnouncementId,
    ) -> GatewayResult<()> {
        let path = format!("/api/v1/announcements/{}", id);
        self.send_json::<()>(reqwest::Method::DELETE, caller, &path, None)
            .await?;
        Ok(())
    }

    async fn get_notifications(&self, caller: &Principal) -> GatewayResult<Vec<Notification>> {
        Ok(self.get_json(caller, "/api/v1/notifications").await?)
    }

    async fn get_notifications_summary(
        &self,
        caller: &Principal,
    ) -> GatewayResult<NotificationSummary> {
        let summary: NotificationSummary = self
            .get_json(caller, "/api/v1/notifications/summary")
            .await?;
        summary.validate()?;
        Ok(summary)
    }

    async fn mark_notification_as_read(
        &self,
        caller: &Principal,
        id: NotificationId,
    ) -> GatewayResult<()> {
        let path = format!("/api/v1/notifications/{}/read", id);
        self.send_json::<()>(reqwest::Method::POST, caller, &path, None)
            .await?;
        Ok(())
    }
}

fn build_auth_headers(auth: &ClientCredentials) -> Result<HeaderMap, ApiClientError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = &auth.api_key {
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(|e| ApiClientError::Config(e.to_string()))?,
        );
    }
    if let Some(jwt) = &auth.jwt {
        let value = format!("Bearer {}", jwt);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(|e| ApiClientError::Config(e.to_string()))?,
        );
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(api_key: Option<&str>, jwt: Option<&str>) -> ClientCredentials {
        ClientCredentials {
            api_key: api_key.map(str::to_string),
            jwt: jwt.map(str::to_string),
            principal: None,
        }
    }

    #[test]
    fn auth_headers_include_both_credentials() {
        let headers = build_auth_headers(&credentials(Some("key"), Some("abc"))).unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "key");
        assert_eq!(headers.get("authorization").unwrap(), "Bearer abc");
    }

    #[test]
    fn auth_headers_reject_control_characters() {
        let result = build_auth_headers(&credentials(Some("bad\nkey"), None));
        assert!(matches!(result, Err(ApiClientError::Config(_))));
    }

    #[test]
    fn status_errors_map_to_gateway_errors() {
        let not_found: GatewayError = ApiClientError::Status {
            status: 404,
            message: "missing".to_string(),
        }
        .into();
        assert_eq!(not_found, GatewayError::NotFound("missing".to_string()));

        let rejected: GatewayError = ApiClientError::Status {
            status: 403,
            message: "forbidden: not the author".to_string(),
        }
        .into();
        assert_eq!(rejected.user_message(), "forbidden: not the author");
    }
}
