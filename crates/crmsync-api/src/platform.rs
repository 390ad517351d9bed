//! HTTP contact gateway client.
//!
//! Both CRM platforms are reached through the same small JSON contract:
//!
//! - `GET    {base}/contacts/{tenant}/{id}`        200 contact | 404
//! - `GET    {base}/contacts/{tenant}?email={e}`   200 `{"id"}` or `{"results": [{"id"}]}` | 404
//! - `POST   {base}/contacts/{tenant}`             201/200 `{"id"}`
//! - `PATCH  {base}/contacts/{tenant}/{id}`        200

use std::time::Duration;

use async_trait::async_trait;
use crmsync_core::store::ContactPlatform;
use crmsync_core::PlatformError;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpContactPlatform {
    name: &'static str,
    client: Client,
    base_url: Url,
    api_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ContactRef {
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    results: Vec<ContactRef>,
}

impl HttpContactPlatform {
    pub fn new(
        name: &'static str,
        base_url: &str,
        api_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| PlatformError::Invalid(format!("{name} base URL: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(PlatformError::Invalid(format!(
                "{name} base URL cannot carry a path"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|error| {
                PlatformError::Invalid(format!("{name} HTTP client: {}", sanitize(&error)))
            })?;

        Ok(Self {
            name,
            client,
            base_url,
            api_token: api_token.into(),
        })
    }

    fn contacts_url(
        &self,
        tenant_id: &str,
        contact_id: Option<&str>,
    ) -> Result<Url, PlatformError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                PlatformError::Invalid(format!("{} base URL cannot carry a path", self.name))
            })?;
            segments.pop_if_empty().push("contacts").push(tenant_id);
            if let Some(contact_id) = contact_id {
                segments.push(contact_id);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.api_token)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, PlatformError> {
        request.send().await.map_err(|error| {
            if error.is_timeout() {
                PlatformError::Timeout(format!("{} request timed out", self.name))
            } else {
                PlatformError::Transport(format!(
                    "{} request failed: {}",
                    self.name,
                    sanitize(&error)
                ))
            }
        })
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, PlatformError> {
        response.json::<T>().await.map_err(|error| {
            if error.is_timeout() {
                PlatformError::Timeout(format!("{} response timed out", self.name))
            } else {
                PlatformError::Invalid(format!(
                    "{} returned an unreadable body: {}",
                    self.name,
                    sanitize(&error)
                ))
            }
        })
    }
}

#[async_trait]
impl ContactPlatform for HttpContactPlatform {
    async fn upsert_contact(
        &self,
        tenant_id: &str,
        payload: &Value,
        known_id: Option<&str>,
    ) -> Result<String, PlatformError> {
        let (method, url) = match known_id {
            Some(contact_id) => (Method::PATCH, self.contacts_url(tenant_id, Some(contact_id))?),
            None => (Method::POST, self.contacts_url(tenant_id, None)?),
        };

        let response = self.send(self.request(method, url).json(payload)).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        if let Some(contact_id) = known_id {
            return Ok(contact_id.to_string());
        }

        let created: ContactRef = self.read_json(response).await?;
        created.id.as_ref().and_then(id_text).ok_or_else(|| {
            PlatformError::Invalid(format!("{} create response carried no id", self.name))
        })
    }

    async fn get_contact(
        &self,
        tenant_id: &str,
        contact_id: &str,
    ) -> Result<Option<Value>, PlatformError> {
        let url = self.contacts_url(tenant_id, Some(contact_id))?;
        let response = self.send(self.request(Method::GET, url)).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        self.read_json(response).await.map(Some)
    }

    async fn find_contact_by_email(
        &self,
        tenant_id: &str,
        email: &str,
    ) -> Result<Option<String>, PlatformError> {
        let mut url = self.contacts_url(tenant_id, None)?;
        url.query_pairs_mut().append_pair("email", email);

        let response = self.send(self.request(Method::GET, url)).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let lookup: LookupResponse = self.read_json(response).await?;
        Ok(lookup_id(&lookup))
    }
}

fn lookup_id(lookup: &LookupResponse) -> Option<String> {
    lookup.id.as_ref().and_then(id_text).or_else(|| {
        lookup
            .results
            .iter()
            .find_map(|contact| contact.id.as_ref().and_then(id_text))
    })
}

/// Contact ids arrive as strings from some platforms and numbers from others.
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn status_error(status: StatusCode, body: &str) -> PlatformError {
    let message = compact_body(body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        return PlatformError::RateLimited(message);
    }
    PlatformError::Http {
        status: status.as_u16(),
        message,
    }
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

fn compact_body(body: &str) -> String {
    body.trim().chars().take(180).collect()
}
