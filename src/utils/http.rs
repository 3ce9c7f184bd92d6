//! HTTP client utilities.

use reqwest::{Client, ClientBuilder, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::HttpConfig;
use crate::sources::SourceError;

/// `Accept` header for HTML pages
pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Shared HTTP client with bounded timeouts.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    config: HttpConfig,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, SourceError> {
        Self::from_config(&HttpConfig::default())
    }

    /// Create a new HTTP client from configuration
    pub fn from_config(config: &HttpConfig) -> Result<Self, SourceError> {
        let client = Self::builder(config)
            .build()
            .map_err(|e| SourceError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            config: config.clone(),
        })
    }

    fn builder(config: &HttpConfig) -> ClientBuilder {
        Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(Duration::from_secs(90))
    }

    /// A fresh client with its own cookie store, for multi-step flows that need a session
    pub fn session(&self) -> Result<Client, SourceError> {
        Self::builder(&self.config)
            .cookie_store(true)
            .build()
            .map_err(|e| SourceError::Other(format!("Failed to create HTTP session: {}", e)))
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Configured per-request timeout
    pub fn request_timeout(&self) -> Duration {
        self.config.request_timeout()
    }
}

/// A fetched HTML page
#[derive(Debug, Clone)]
pub struct Page {
    /// URL that was requested
    pub requested: Url,
    /// URL the response came from, after redirects
    pub url: Url,
    pub body: String,
}

impl Page {
    /// Whether the server redirected away from the requested URL
    pub fn redirected(&self) -> bool {
        self.requested != self.url
    }
}

/// Send a request and read a successful response as text
pub async fn fetch_page(request: RequestBuilder) -> Result<Page, SourceError> {
    let (client, request) = request.build_split();
    let request = request?;
    let requested = request.url().clone();

    let response = client.execute(request).await?;
    read_page(requested, response).await
}

async fn read_page(requested: Url, response: reqwest::Response) -> Result<Page, SourceError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Api(format!(
            "{} returned status: {}",
            requested.host_str().unwrap_or("server"),
            status
        )));
    }

    let url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|e| SourceError::Parse(format!("Failed to read body: {}", e)))?;

    Ok(Page {
        requested,
        url,
        body,
    })
}

/// Like [`fetch_page`], but a `404 Not Found` is an empty lookup rather than an error
pub async fn fetch_optional_page(request: RequestBuilder) -> Result<Option<Page>, SourceError> {
    let (client, request) = request.build_split();
    let request = request?;
    let requested = request.url().clone();

    let response = client.execute(request).await?;
    match response.status() {
        StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
        _ => read_page(requested, response).await.map(Some),
    }
}

/// Send a request and decode a successful JSON response
pub async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, SourceError> {
    let page = fetch_page(request).await?;
    Ok(serde_json::from_str(&page.body)?)
}

/// Resolve a possibly relative link against the page it was found on
pub fn absolute_url(base: &Url, href: &str) -> Result<String, SourceError> {
    Ok(base.join(href.trim())?.to_string())
}
