use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use tokio::sync::Semaphore;
use url::Url;

use super::{FetchParams, ResourceKind, SourceClient};
use crate::auth::Token;
use crate::error::{ContribLensError, Result};

const MAX_CONCURRENT_REQUESTS: usize = 8;

/// GitHub REST API client.
///
/// Every request holds a semaphore permit, so the total number of in-flight
/// calls stays bounded no matter how many stages fan out at once. Rate-limit
/// (429) and server errors are retried after a fixed delay.
pub struct GitHubClient {
    client: Client,
    api_url: Url,
    token: Option<Token>,
    max_retries: u32,
    retry_delay: Duration,
    semaphore: Arc<Semaphore>,
}

impl GitHubClient {
    /// Creates a new GitHub API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - GitHub API base URL (e.g., <https://api.github.com>)
    /// * `token` - Optional personal access token
    /// * `max_retries` - Retries for rate-limited or failed requests
    /// * `retry_delay` - Pause between retries
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the base URL is invalid.
    pub fn new(
        base_url: &str,
        token: Option<Token>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("contriblens/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ContribLensError::Config(format!("Failed to create HTTP client: {e}")))?;

        // `Url::join` drops the last path segment unless it ends with a slash.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let api_url = Url::parse(&normalized)
            .map_err(|e| ContribLensError::Config(format!("Invalid base URL: {e}")))?;

        Ok(Self {
            client,
            api_url,
            token,
            max_retries,
            retry_delay,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    fn resource_path(kind: ResourceKind, params: &FetchParams) -> Result<String> {
        let path = match kind {
            ResourceKind::Repository => {
                format!("repos/{}", params.require(kind, "full_name")?)
            }
            ResourceKind::RepositoryLanguages => {
                format!("repos/{}/languages", params.require(kind, "full_name")?)
            }
            ResourceKind::User => format!("users/{}", params.require(kind, "login")?),
            ResourceKind::PullRequest => format!(
                "repos/{}/pulls/{}",
                params.require(kind, "full_name")?,
                params.require(kind, "number")?
            ),
        };
        Ok(path)
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = self
            .api_url
            .join(path)
            .map_err(|e| ContribLensError::Config(format!("Invalid resource URL: {e}")))?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ContribLensError::Api(format!("request limiter closed: {e}")))?;

        let mut retry_count = 0;
        loop {
            let request = self.auth_request(
                self.client
                    .get(url.clone())
                    .header("Accept", "application/vnd.github+json"),
            );

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    if retry_count >= self.max_retries {
                        return Err(e.into());
                    }
                    warn!(
                        "Network error ({e}), retrying in {}s ({}/{})...",
                        self.retry_delay.as_secs(),
                        retry_count + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    retry_count += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();

            if status == 429 || status.is_server_error() {
                if retry_count >= self.max_retries {
                    return Err(ContribLensError::ApiErrorAfterRetries {
                        status: status.as_u16(),
                        retries: self.max_retries,
                    });
                }

                warn!(
                    "GitHub API error (status {status}). Waiting {}s before retry {}/{}...",
                    self.retry_delay.as_secs(),
                    retry_count + 1,
                    self.max_retries
                );

                tokio::time::sleep(self.retry_delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read error response".to_string());
                return Err(ContribLensError::ApiError {
                    status: status.as_u16(),
                    message,
                });
            }

            debug!("GET {url} -> {status}");
            return Ok(response.json().await?);
        }
    }
}

#[async_trait]
impl SourceClient for GitHubClient {
    async fn fetch(&self, kind: ResourceKind, params: &FetchParams) -> Result<serde_json::Value> {
        let path = Self::resource_path(kind, params)?;
        self.get_json(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard, max_retries: u32) -> GitHubClient {
        GitHubClient::new(
            &server.url(),
            Some(Token::from("test-token")),
            max_retries,
            Duration::ZERO,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_repository_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/widgets")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 1, "name": "widgets", "stargazers_count": 42}"#)
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let params = FetchParams::new().with("full_name", "acme/widgets");
        let body = client.fetch(ResourceKind::Repository, &params).await.unwrap();

        assert_eq!(body["stargazers_count"], json!(42));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn pull_request_path_includes_number() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/widgets/pulls/17")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 900, "number": 17}"#)
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let params = FetchParams::new()
            .with("full_name", "acme/widgets")
            .with("number", 17);
        let body = client.fetch(ResourceKind::PullRequest, &params).await.unwrap();

        assert_eq!(body["number"], json!(17));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_reported() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/users/octo")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server, 2);
        let params = FetchParams::new().with("login", "octo");
        let err = client.fetch(ResourceKind::User, &params).await.unwrap_err();

        assert!(matches!(
            err,
            ContribLensError::ApiErrorAfterRetries {
                status: 503,
                retries: 2
            }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/users/ghost")
            .with_status(404)
            .with_body("Not Found")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 5);
        let params = FetchParams::new().with("login", "ghost");
        let err = client.fetch(ResourceKind::User, &params).await.unwrap_err();

        assert!(matches!(err, ContribLensError::ApiError { status: 404, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_parameter_fails_without_a_request() {
        let server = mockito::Server::new_async().await;
        let client = client_for(&server, 0);

        let err = client
            .fetch(ResourceKind::RepositoryLanguages, &FetchParams::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("full_name"));
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let result = GitHubClient::new("not a url", None, 0, Duration::ZERO);
        assert!(matches!(result, Err(ContribLensError::Config(_))));
    }
}
