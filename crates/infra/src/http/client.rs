use std::time::Duration;

use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use socialauth_domain::{AuthError, Result};
use tracing::debug;

use crate::errors::conversions::status_error;
use crate::errors::{InfraError, OAuthErrorBody};

/// Set to any non-empty value to bypass system proxies.
pub const DISABLE_PROXY_ENV: &str = "SOCIALAUTH_DISABLE_PROXY";

const DEFAULT_USER_AGENT: &str = concat!("socialauth/", env!("CARGO_PKG_VERSION"));

/// HTTP client with built-in retry and timeout support.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    max_attempts: usize,
    base_backoff: Duration,
}

impl HttpClient {
    /// Start building a new HTTP client.
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    ///
    /// # Errors
    /// Returns [`AuthError::Configuration`] if the TLS backend cannot be
    /// initialised.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute the provided request builder with retry semantics.
    ///
    /// Connection failures and 5xx responses are retried with exponential
    /// backoff. Timeouts are not: the provider may already have redeemed the
    /// authorization code.
    ///
    /// # Errors
    /// Returns [`AuthError::NetworkFailure`] once every attempt has failed to
    /// reach the server.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let attempts = self.max_attempts.max(1);

        for attempt in 0..attempts {
            let cloned_builder = builder.try_clone().ok_or_else(|| {
                AuthError::Configuration(
                    "request body cannot be cloned; buffer the body to enable retries".into(),
                )
            })?;

            let request = cloned_builder.build().map_err(InfraError::from)?;

            let method = request.method().clone();
            // Query strings carry client secrets and codes
            let endpoint = redacted(request.url());
            debug!(attempt = attempt + 1, %method, %endpoint, "sending HTTP request");

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt = attempt + 1, %method, %endpoint, %status, "received HTTP response");

                    if status.is_server_error() && attempt + 1 < attempts {
                        self.sleep_with_backoff(attempt + 1).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(err) => {
                    debug!(attempt = attempt + 1, %method, %endpoint, error = %err, "HTTP request failed");

                    if attempt + 1 < attempts && should_retry_error(&err) {
                        self.sleep_with_backoff(attempt + 1).await;
                        continue;
                    }

                    return Err(InfraError::from(err).into());
                }
            }
        }

        Err(AuthError::NetworkFailure("http client exhausted retries without producing a result".into()))
    }

    /// Send `builder` and decode a JSON body of type `T`.
    ///
    /// Bodies shaped like an OAuth error (`{"error": ...}`) are reported as
    /// such even on a 200, which VKontakte does for some failures.
    ///
    /// # Errors
    /// - [`AuthError::ProviderRejected`] for OAuth error bodies, 4xx statuses
    ///   and undecodable bodies
    /// - [`AuthError::NetworkFailure`] for transport failures and 5xx statuses
    pub async fn send_json<T>(&self, builder: RequestBuilder) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(builder).await?;
        read_json(response).await
    }

    fn backoff_delay(&self, retry_number: usize) -> Duration {
        let shift = u32::try_from(retry_number.saturating_sub(1).min(8)).unwrap_or(8);
        let multiplier = 1u32 << shift;
        self.base_backoff.saturating_mul(multiplier)
    }

    async fn sleep_with_backoff(&self, retry_number: usize) {
        let delay = self.backoff_delay(retry_number);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Decode a provider response, preferring OAuth error bodies over status codes.
pub(crate) async fn read_json<T>(response: Response) -> Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let body = response.bytes().await.map_err(InfraError::from)?;

    if let Ok(error) = serde_json::from_slice::<OAuthErrorBody>(&body) {
        return Err(InfraError::from(error).into());
    }

    if !status.is_success() {
        return Err(status_error(status));
    }

    serde_json::from_slice(&body)
        .map_err(|err| AuthError::rejected("invalid_response", Some(err.to_string())))
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: usize,
    base_backoff: Duration,
    user_agent: String,
    use_system_proxy: bool,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        let proxy_disabled = std::env::var(DISABLE_PROXY_ENV).is_ok_and(|v| !v.trim().is_empty());
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            use_system_proxy: !proxy_disabled,
        }
    }
}

impl HttpClientBuilder {
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure the total number of attempts (initial try + retries).
    #[must_use]
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub const fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Ignore `HTTP(S)_PROXY` and friends.
    #[must_use]
    pub const fn no_proxy(mut self) -> Self {
        self.use_system_proxy = false;
        self
    }

    /// # Errors
    /// Returns [`AuthError::Configuration`] if reqwest rejects the settings.
    pub fn build(self) -> Result<HttpClient> {
        let mut builder =
            ReqwestClient::builder().timeout(self.timeout).user_agent(self.user_agent);

        if !self.use_system_proxy {
            builder = builder.no_proxy();
        }

        let client = builder
            .build()
            .map_err(|err| AuthError::Configuration(format!("failed to build HTTP client: {err}")))?;

        Ok(HttpClient {
            client,
            max_attempts: self.max_attempts.max(1),
            base_backoff: self.base_backoff,
        })
    }
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_connect()
}

fn redacted(url: &url::Url) -> String {
    let mut shown = url.clone();
    shown.set_query(None);
    shown.set_fragment(None);
    shown.to_string()
}
