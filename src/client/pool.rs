//! Bounded keep-alive connection pool.
//!
//! One `reqwest` client owns the actual keep-alive connections, TLS
//! (host OS trust store) and transparent gzip decoding; a semaphore
//! bounds concurrent checkouts so at most `pool_size` calls are in
//! flight. Checkout blocks up to the pool timeout and returns an RAII
//! guard, so the slot is released on every exit path. A call that hits
//! its receive timeout gives its connection back to reqwest closed, not
//! reusable.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::config::ClientConfig;
use crate::encoding::Protocol;
use crate::errors::ClientError;

/// Fixed-capacity pool of keep-alive connections to one service base URL.
#[derive(Debug)]
pub struct ConnectionPool {
    http: reqwest::Client,
    permits: Semaphore,
    base_url: String,
    pool_timeout: Duration,
}

impl ConnectionPool {
    /// Builds the pool for `scheme://host:port/<service_path>/`.
    pub fn new(config: &ClientConfig, service_path: &str) -> Result<Self, ClientError> {
        let scheme = if config.ssl { "https" } else { "http" };
        let base_url = format!("{scheme}://{}:{}/{service_path}/", config.host, config.port);

        let mut default_headers = reqwest::header::HeaderMap::new();
        default_headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static(config.protocol.content_type()),
        );

        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .user_agent(concat!("thtp/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs_f64(config.open_timeout))
            .timeout(Duration::from_secs_f64(config.rpc_timeout))
            .pool_idle_timeout(Duration::from_secs_f64(config.keep_alive))
            .pool_max_idle_per_host(config.pool_size)
            .gzip(true)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self {
            http,
            permits: Semaphore::new(config.pool_size),
            base_url,
            pool_timeout: Duration::from_secs_f64(config.pool_timeout),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Checks a connection slot out, blocking up to the pool timeout.
    ///
    /// A timed-out checkout is reported as the server being unreachable,
    /// which is how it surfaces at the call edge.
    pub async fn checkout(&self) -> Result<PooledConnection<'_>, ClientError> {
        let permit = tokio::time::timeout(self.pool_timeout, self.permits.acquire())
            .await
            .map_err(|_| {
                ClientError::ServerUnreachable(format!(
                    "pool checkout timed out after {:?}",
                    self.pool_timeout
                ))
            })?
            .map_err(|_| ClientError::ServerUnreachable("connection pool closed".into()))?;
        Ok(PooledConnection {
            pool: self,
            _permit: permit,
        })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// A checked-out connection slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    _permit: SemaphorePermit<'a>,
}

impl PooledConnection<'_> {
    /// POSTs a serialised args body to `<base_url><rpc>`.
    pub async fn post(
        &self,
        rpc: &str,
        protocol: Protocol,
        body: Bytes,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.pool
            .http
            .post(format!("{}{rpc}", self.pool.base_url))
            .header(CONTENT_TYPE, protocol.content_type())
            .body(body)
            .send()
            .await
    }
}
