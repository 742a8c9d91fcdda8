//! Backend gateway: authenticated HTTP calls against the annotation backend.
//!
//! The engine consumes only the `BackendGateway` trait (existence check,
//! link creation, image upload). `ApiClient` implements it over reqwest and
//! additionally carries the session-bootstrap surface (login, listings,
//! signal creation) used by the host shell.

use crate::error::SigCapError;
use crate::logging::{log_info, log_warn};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

const LIST_PAGE_SIZE: u32 = 100;

/// Result of a detected-link existence check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlCheck {
    pub exists: bool,
    #[serde(rename = "detectedLinkId")]
    pub detected_link_id: Option<String>,
}

/// Backend operations the upload queue engine depends on.
///
/// `check_exists` must report a failure when it cannot be performed
/// reliably (no auth token, network error). Reporting "does not exist"
/// in that situation hides true duplicates.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn check_exists(&self, url: &str, sport_id: &str) -> Result<UrlCheck, SigCapError>;

    async fn create_link(
        &self,
        url: &str,
        sport_id: &str,
        signal_id: &str,
        assigned_user_id: &str,
    ) -> Result<String, SigCapError>;

    async fn upload_image(
        &self,
        file_path: &Path,
        detected_link_id: &str,
        bucket_name: &str,
    ) -> Result<String, SigCapError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sport {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectedLink {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
struct AuthSession {
    access_token: String,
    user: UserInfo,
}

/// HTTP client for the annotation backend
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    auth: Arc<Mutex<Option<AuthSession>>>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            auth: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_auth(&self, access_token: &str, user: UserInfo) {
        if let Ok(mut auth) = self.auth.lock() {
            *auth = Some(AuthSession {
                access_token: access_token.to_string(),
                user,
            });
        }
    }

    pub fn clear_auth(&self) {
        if let Ok(mut auth) = self.auth.lock() {
            *auth = None;
        }
    }

    pub fn authenticated_user(&self) -> Option<UserInfo> {
        self.auth
            .lock()
            .ok()
            .and_then(|auth| auth.as_ref().map(|session| session.user.clone()))
    }

    fn access_token(&self) -> Result<String, SigCapError> {
        self.auth
            .lock()
            .map_err(|_| SigCapError::LockPoisoned("auth session".to_string()))?
            .as_ref()
            .map(|session| session.access_token.clone())
            .ok_or_else(|| SigCapError::Auth("No access token".to_string()))
    }

    /// Form-encoded login; does not store the token (callers pair this with
    /// `current_user` and `set_auth` once both succeed)
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, SigCapError> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .header("Accept", "application/json")
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SigCapError::Auth(format!(
                "Login failed with status {}: {}",
                status, error_text
            )));
        }

        Ok(response.json().await?)
    }

    pub async fn current_user(&self) -> Result<UserInfo, SigCapError> {
        let token = self.access_token()?;
        let response = self
            .client
            .get(format!("{}/auth/me", self.base_url))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SigCapError::Auth(format!(
                "Fetching current user failed with status {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    pub async fn regions(&self, page: u32, query: Option<&str>) -> Result<Paginated<Region>, SigCapError> {
        self.list("regions", page, query, None).await
    }

    pub async fn sports(
        &self,
        region_id: &str,
        page: u32,
        query: Option<&str>,
    ) -> Result<Paginated<Sport>, SigCapError> {
        self.list("sports", page, query, Some(("region_id", region_id))).await
    }

    pub async fn signals(&self, page: u32, query: Option<&str>) -> Result<Paginated<Signal>, SigCapError> {
        self.list("signals", page, query, None).await
    }

    async fn list<T: serde::de::DeserializeOwned>(
        &self,
        resource: &str,
        page: u32,
        query: Option<&str>,
        extra: Option<(&str, &str)>,
    ) -> Result<Paginated<T>, SigCapError> {
        let mut request = self
            .client
            .get(format!("{}/{}", self.base_url, resource))
            .query(&[("page", page.to_string()), ("page_size", LIST_PAGE_SIZE.to_string())]);

        if let Some(q) = query {
            if !q.is_empty() {
                request = request.query(&[("query", q)]);
            }
        }
        if let Some((key, value)) = extra {
            request = request.query(&[(key, value)]);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(SigCapError::Api(format!(
                "Listing {} failed with status {}",
                resource,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    pub async fn create_signal(&self, name: &str) -> Result<Signal, SigCapError> {
        let token = self.access_token()?;
        let response = self
            .client
            .post(format!("{}/signals", self.base_url))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SigCapError::Api(format!(
                "Signal creation failed with status {}: {}",
                status, error_text
            )));
        }

        Ok(response.json().await?)
    }
}

/// Pick the backend record whose URL matches exactly; the search endpoint
/// returns prefix/substring matches
fn exact_match(links: &[DetectedLink], url: &str) -> Option<String> {
    links
        .iter()
        .find(|link| link.url == url)
        .map(|link| link.id.clone())
}

#[async_trait]
impl BackendGateway for ApiClient {
    async fn check_exists(&self, url: &str, sport_id: &str) -> Result<UrlCheck, SigCapError> {
        // Without a token the check cannot be trusted; fail rather than
        // assume non-existence
        let token = self.access_token().map_err(|_| {
            SigCapError::Auth("No access token; cannot verify URL existence".to_string())
        })?;

        let request_url = format!(
            "{}/detected_links?url={}&sport_id={}&page_size=1",
            self.base_url,
            urlencoding::encode(url),
            urlencoding::encode(sport_id)
        );

        let response = self
            .client
            .get(&request_url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SigCapError::Api(format!(
                "URL existence check failed with status {}: {}",
                status, error_text
            )));
        }

        let page: Paginated<DetectedLink> = response.json().await?;
        let detected_link_id = exact_match(&page.data, url);

        log_info(
            "api",
            &format!(
                "URL existence check for {}: {} candidate(s), exact match: {}",
                url,
                page.data.len(),
                detected_link_id.is_some()
            ),
        )
        .unwrap_or_default();

        Ok(UrlCheck {
            exists: detected_link_id.is_some(),
            detected_link_id,
        })
    }

    async fn create_link(
        &self,
        url: &str,
        sport_id: &str,
        signal_id: &str,
        assigned_user_id: &str,
    ) -> Result<String, SigCapError> {
        let token = self.access_token()?;

        let response = self
            .client
            .post(format!("{}/detected_links", self.base_url))
            .header("Authorization", format!("Bearer {}", token))
            .json(&serde_json::json!({
                "url": url,
                "sport_id": sport_id,
                "signal_id": signal_id,
                "assigned_user_id": assigned_user_id,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SigCapError::Api(format!(
                "Link creation failed with status {}: {}",
                status, error_text
            )));
        }

        let link: DetectedLink = response.json().await?;
        log_info("api", &format!("Detected link created: {}", link.id)).unwrap_or_default();
        Ok(link.id)
    }

    async fn upload_image(
        &self,
        file_path: &Path,
        detected_link_id: &str,
        bucket_name: &str,
    ) -> Result<String, SigCapError> {
        let token = self.access_token()?;

        let file_bytes = tokio::fs::read(file_path).await.map_err(|e| {
            SigCapError::Upload(format!(
                "Failed to read screenshot '{}': {}",
                file_path.display(),
                e
            ))
        })?;
        let file_name = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("screenshot.png")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(file_bytes).file_name(file_name),
            )
            .text("detected_link_id", detected_link_id.to_string())
            .text("bucket_name", bucket_name.to_string());

        let response = self
            .client
            .post(format!("{}/detected_link_images/upload", self.base_url))
            .header("Authorization", format!("Bearer {}", token))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            log_warn(
                "api",
                &format!("Image upload rejected with status {}", status),
            )
            .unwrap_or_default();
            return Err(SigCapError::Upload(format!(
                "Image upload failed with status {}: {}",
                status, error_text
            )));
        }

        #[derive(Deserialize)]
        struct UploadImageResponse {
            image_url: String,
        }

        let body: UploadImageResponse = response.json().await?;
        Ok(body.image_url)
    }
}
