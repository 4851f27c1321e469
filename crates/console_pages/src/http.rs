//! REST-backed [`ResourceService`] for the admin backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use resource_machine::{Context, Fetched, ResourceService};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{ErrorBody, ListResponse},
};
use tracing::debug;
use url::Url;

use crate::error::PageError;

/// How a resource URL is used by the three service calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceMode {
    /// An existing record: `GET` loads, `PUT` saves, `DELETE` deletes.
    Record,
    /// A record that does not exist yet: loads from the context defaults and
    /// saves with `POST`.
    Create,
    /// A server-side list queried with `offset`, `limit`, `filter`, `sort`
    /// and `direction`.
    Collection,
}

pub fn http_client(timeout: Duration) -> Result<Client, PageError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

#[derive(Debug, Clone)]
pub struct HttpResource {
    http: Client,
    url: Url,
    mode: ResourceMode,
    bearer: Option<String>,
}

impl HttpResource {
    pub fn new(http: Client, base: &Url, path: &str, mode: ResourceMode) -> Result<Self, PageError> {
        Ok(Self {
            http,
            url: join(base, path)?,
            mode,
            bearer: None,
        })
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn mode(&self) -> ResourceMode {
        self.mode
    }

    fn request(&self, method: Method) -> RequestBuilder {
        debug!(%method, url = %self.url, "resource request");
        let request = self.http.request(method, self.url.clone());
        match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn unsupported(&self, call: &str) -> ApiError {
        ApiError::new(
            ErrorCode::Internal,
            format!("{call} is not supported for {:?} resource {}", self.mode, self.url),
        )
    }
}

/// Joins `path` below `base` even when `base` lacks a trailing slash.
fn join(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let dir = format!("{}/", base.path());
        base.set_path(&dir);
    }
    base.join(path.trim_start_matches('/'))
}

async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
    let response = request.send().await.map_err(transport_error)?;
    if response.status().is_success() {
        return Ok(response);
    }
    Err(error_from_response(response).await)
}

fn transport_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::transport("request timed out");
    }
    ApiError::transport(format!("request failed: {err}"))
}

/// Builds an [`ApiError`] from a non-2xx response, reading `message` and
/// `fieldErrors` from the body when it is JSON.
pub async fn error_from_response(response: Response) -> ApiError {
    let status = response.status();
    let body: ErrorBody = match response.bytes().await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(_) => ErrorBody::default(),
    };
    let message = body.message.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });
    let mut error = ApiError::new(ErrorCode::from_status(status.as_u16()), message)
        .with_status(status.as_u16());
    error.field_errors = body.field_errors;
    error
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Save responses may be empty (`204`); those come back as `null`.
async fn decode_optional(response: Response) -> Result<Value, ApiError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl ResourceService for HttpResource {
    async fn fetch(&self, ctx: &Context) -> Result<Fetched, ApiError> {
        match self.mode {
            ResourceMode::Record => {
                let value: Value = decode(send(self.request(Method::GET)).await?).await?;
                match value {
                    Value::Object(record) => Ok(Fetched::Record(record)),
                    other => Err(ApiError::new(
                        ErrorCode::Internal,
                        format!("expected a JSON object from {}, got {other}", self.url),
                    )),
                }
            }
            ResourceMode::Create => Ok(Fetched::Record(ctx.data.clone())),
            ResourceMode::Collection => {
                let mut query = ctx.list_query();
                query.filter = query
                    .filter
                    .map(|filter| filter.trim().to_string())
                    .filter(|filter| !filter.is_empty());
                let response: ListResponse =
                    decode(send(self.request(Method::GET).query(&query)).await?).await?;
                Ok(Fetched::Page(response.into()))
            }
        }
    }

    async fn save(&self, ctx: &Context) -> Result<Value, ApiError> {
        let method = match self.mode {
            ResourceMode::Record => Method::PUT,
            ResourceMode::Create => Method::POST,
            ResourceMode::Collection => return Err(self.unsupported("save")),
        };
        decode_optional(send(self.request(method).json(&ctx.data)).await?).await
    }

    async fn delete(&self, _ctx: &Context) -> Result<(), ApiError> {
        if self.mode != ResourceMode::Record {
            return Err(self.unsupported("delete"));
        }
        send(self.request(Method::DELETE)).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
