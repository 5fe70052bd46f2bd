//! HTTP transport backed by reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, Response, StatusCode};
use tokio::sync::Semaphore;
use tracing::debug;
use url::Url;

use crate::config::TransportConfig;
use crate::request::{ManifestRequest, ResourceRequest};

use super::{ManifestResponse, ResourceResponse, Transport, TransportError, Validators};

/// Conditional-GET transport with a bound on concurrent requests.
pub struct HttpTransport {
    client: Client,
    permits: Arc<Semaphore>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_concurrent_fetches)),
        })
    }

    /// Issue a GET, conditional when validators are present. Returns `None`
    /// for `304 Not Modified`.
    async fn get(
        &self,
        url: &Url,
        validators: &Validators,
    ) -> Result<(Option<Vec<u8>>, Validators), TransportError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let mut request = self.client.get(url.clone());
        if let Some(etag) = &validators.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &validators.last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let fresh_validators = response_validators(&response);

        if status == StatusCode::NOT_MODIFIED {
            debug!(url = %url, "Not modified");
            return Ok((None, fresh_validators));
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        debug!(url = %url, bytes = body.len(), "Fetched");
        Ok((Some(body.to_vec()), fresh_validators))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_manifest(
        &self,
        request: &ManifestRequest,
    ) -> Result<ManifestResponse, TransportError> {
        let (body, validators) = self.get(&request.url, &request.validators()).await?;
        match body {
            Some(body) => Ok(ManifestResponse {
                body,
                not_modified: false,
                validators,
            }),
            None => {
                let cached = request.cached.as_ref().ok_or_else(|| {
                    TransportError::NotModifiedWithoutCache(request.url.to_string())
                })?;
                let validators = if validators.is_empty() {
                    cached.validators.clone()
                } else {
                    validators
                };
                Ok(ManifestResponse {
                    body: cached.body.clone(),
                    not_modified: true,
                    validators,
                })
            }
        }
    }

    async fn fetch_resource(
        &self,
        request: &ResourceRequest,
    ) -> Result<ResourceResponse, TransportError> {
        let (body, validators) = self.get(&request.url, &request.validators()).await?;
        Ok(ResourceResponse {
            not_modified: body.is_none(),
            body,
            validators,
        })
    }
}

fn response_validators(response: &Response) -> Validators {
    let header = |name: reqwest::header::HeaderName| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Validators {
        etag: header(ETAG),
        last_modified: header(LAST_MODIFIED),
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::ConnectionFailed(e.to_string())
    } else {
        TransportError::Request(e.to_string())
    }
}
