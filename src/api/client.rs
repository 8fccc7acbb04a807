//! HTTP transport for the interactions API

use super::sse::{parse_sse_line, LineBuffer};
use super::{
    ApiError, ApiKey, ChunkStream, CreateRequest, InteractionSnapshot, ResumeRequest, Transport,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Interactions API over HTTP with SSE streaming
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn interactions_url(&self) -> String {
        format!("{}/interactions", self.base_url)
    }

    fn interaction_url(&self, interaction_id: &str) -> String {
        format!("{}/interactions/{}", self.base_url, interaction_id)
    }

    fn authorized(&self, builder: RequestBuilder, key: &ApiKey) -> RequestBuilder {
        builder
            .header(API_KEY_HEADER, key.expose())
            .header("Content-Type", "application/json")
    }

    /// Frame the response body into JSON chunks. The body is only read as
    /// the returned stream is polled, and dropping the stream closes it.
    fn sse_chunks(response: Response) -> ChunkStream {
        Box::pin(async_stream::stream! {
            let mut body = response.bytes_stream();
            let mut lines = LineBuffer::new();

            while let Some(next) = body.next().await {
                match next {
                    Ok(bytes) => {
                        for line in lines.push(&bytes) {
                            if let Some(chunk) = parse_sse_line(&line) {
                                yield chunk;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(ApiError::Stream(e.to_string()));
                        return;
                    }
                }
            }

            if let Some(line) = lines.finish() {
                if let Some(chunk) = parse_sse_line(&line) {
                    yield chunk;
                }
            }
        })
    }
}

/// Map a non-success response onto the error taxonomy
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_secs = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(60);
    let error_text = response.text().await.unwrap_or_default();

    Err(match status.as_u16() {
        401 | 403 => ApiError::Auth(format!("{}: {}", status, error_text)),
        429 => ApiError::RateLimited { retry_after_secs },
        400 | 404 | 422 => ApiError::InvalidRequest(format!("{}: {}", status, error_text)),
        _ => ApiError::Provider(format!("{}: {}", status, error_text)),
    })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn create_stream(
        &self,
        key: &ApiKey,
        request: &CreateRequest,
    ) -> Result<ChunkStream, ApiError> {
        debug!("POST {} (stream)", self.interactions_url());

        let response = self
            .authorized(self.client.post(self.interactions_url()), key)
            .query(&[("alt", "sse")])
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(Self::sse_chunks(response))
    }

    async fn resume_stream(
        &self,
        key: &ApiKey,
        request: &ResumeRequest,
    ) -> Result<ChunkStream, ApiError> {
        let url = self.interaction_url(&request.interaction_id);
        debug!("GET {} (resume after {:?})", url, request.last_event_id);

        let response = self
            .authorized(self.client.get(&url), key)
            .query(&request.query_params())
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(Self::sse_chunks(response))
    }

    async fn create(
        &self,
        key: &ApiKey,
        request: &CreateRequest,
    ) -> Result<InteractionSnapshot, ApiError> {
        let response = self
            .authorized(self.client.post(self.interactions_url()), key)
            .json(request)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn get(
        &self,
        key: &ApiKey,
        interaction_id: &str,
    ) -> Result<InteractionSnapshot, ApiError> {
        let response = self
            .authorized(self.client.get(self.interaction_url(interaction_id)), key)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let transport = HttpTransport::new("https://example.test/v1beta/");
        assert_eq!(transport.base_url(), "https://example.test/v1beta");
        assert_eq!(
            transport.interactions_url(),
            "https://example.test/v1beta/interactions"
        );
        assert_eq!(
            transport.interaction_url("abc"),
            "https://example.test/v1beta/interactions/abc"
        );
    }

    #[test]
    fn test_default_base_url() {
        let transport = HttpTransport::new(DEFAULT_BASE_URL);
        assert!(transport.interactions_url().ends_with("/v1beta/interactions"));
    }
}
