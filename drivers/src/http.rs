//! reqwest implementation of [`TargetClient`]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Client};
use serverbench_core::{HttpReply, HttpRequest, Method, TargetClient, TransportError};

// ============================================================================
// HTTP Client Pool
// ============================================================================

/// Configuration for the HTTP client pool
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Idle connection timeout
    pub pool_idle_timeout: Duration,

    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// TCP keepalive interval
    pub tcp_keepalive: Option<Duration>,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            connect_timeout: Duration::from_secs(5),
            tcp_keepalive: Some(Duration::from_secs(60)),
            user_agent: format!("serverbench/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    /// Size the idle pool for a given worker count
    pub fn with_pool_max_idle(mut self, max_idle: usize) -> Self {
        self.pool_max_idle_per_host = max_idle;
        self
    }

    /// Use a custom connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Pooled HTTP client for the application under test
///
/// Redirects are not followed; a 3xx is the server's answer. Every body is
/// read to the end before `send` returns, so the connection goes back to
/// the pool and the recorded latency covers the full response.
#[derive(Debug, Clone)]
pub struct HttpTarget {
    client: Client,
    config: HttpConfig,
}

impl HttpTarget {
    /// Build a target client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .connect_timeout(config.connect_timeout)
            .redirect(redirect::Policy::none())
            .user_agent(&config.user_agent);

        if let Some(keepalive) = config.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }

        Ok(Self {
            client: builder.build()?,
            config: config.clone(),
        })
    }

    /// Configuration used to build this client
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

fn classify(err: &reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Protocol(err.to_string())
    }
}

#[async_trait]
impl TargetClient for HttpTarget {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Delete => self.client.delete(&request.url),
        }
        .timeout(request.timeout);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(&e, request.timeout))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| match classify(&e, request.timeout) {
                TransportError::Connect(msg) => TransportError::Protocol(msg),
                other => other,
            })?;

        Ok(HttpReply::new(status, body))
    }
}
