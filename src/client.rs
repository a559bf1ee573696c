//! HTTP client implementation for the raccoon KV store

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use http::header::{self, HeaderValue};
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, error};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::config::{ClientConfig, LONG_POLL_GRACE};
use crate::error::{Error, Result};
use crate::types::{Entry, FetchOutcome, Version};
use crate::watch::{self, ConditionalFetch, WatchContext, WatchSettings};

/// Characters left unencoded in a key. A key always maps to exactly one path
/// segment, so `/` is encoded too.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b':')
    .remove(b'@');

/// Percent-encode a key for use in a URI path.
fn encode_key(key: &str) -> String {
    utf8_percent_encode(key, KEY_SEGMENT).to_string()
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidRequest("Key cannot be empty".to_string()));
    }
    // dot segments get resolved away by normalizing servers and proxies
    if key == "." || key == ".." {
        return Err(Error::InvalidRequest(format!("Key cannot be '{}'", key)));
    }
    Ok(())
}

/// Version carried by an `etag` value. Each byte becomes one char, so obs-text
/// survives and [`version_header`] can send it back unchanged.
fn version_from_header(value: &HeaderValue) -> Version {
    Version::new(value.as_bytes().iter().map(|&b| char::from(b)).collect::<String>())
}

/// `if-none-match` value for `version`, byte-for-byte what the store sent.
fn version_header(version: &Version) -> Result<HeaderValue> {
    let bytes = version
        .as_str()
        .chars()
        .map(u8::try_from)
        .collect::<std::result::Result<Vec<u8>, _>>()
        .map_err(|_| Error::InvalidRequest(format!("Version is not a header value: {}", version)))?;
    HeaderValue::from_bytes(&bytes)
        .map_err(|e| Error::InvalidRequest(format!("Version is not a header value: {}", e)))
}

/// Build a rustls config trusting the webpki root set.
fn build_tls_config() -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Ok(rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// Client for the raccoon KV store
///
/// Cloning is cheap; all clones share one connection pool, so a single client
/// can serve any number of concurrent `get`, `put` and `watch` calls.
///
/// # Example
///
/// ```
/// use raccoon_kv_client::Client;
/// let client = Client::new("http://localhost:3000").unwrap();
/// assert_eq!(client.endpoint(), "http://localhost:3000");
/// ```
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    http_client: HttpClient<HttpsConnector, Full<Bytes>>,
}

impl Client {
    /// Create a client for the store at `endpoint` with default settings
    ///
    /// # Errors
    /// Returns an error if the endpoint URL is invalid
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_config(ClientConfig {
            endpoint: endpoint.to_string(),
            ..Default::default()
        })
    }

    /// Create a new client with custom configuration
    pub fn with_config(mut config: ClientConfig) -> Result<Self> {
        let trimmed = config.endpoint.trim_end_matches('/').to_string();
        config.endpoint = trimmed;

        let uri: Uri = config
            .endpoint
            .parse()
            .map_err(|e| Error::InvalidUrl(format!("Invalid endpoint URL: {}", e)))?;
        let http_scheme = matches!(uri.scheme_str(), Some("http") | Some("https"));
        if !http_scheme || uri.authority().is_none() {
            return Err(Error::InvalidUrl(format!(
                "Endpoint must be an absolute http(s) URL: {}",
                config.endpoint
            )));
        }

        let tls_config = build_tls_config()?;

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_all_versions()
            .build();

        let http_client = HttpClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_millis(config.pool_idle_timeout_ms))
            .http2_only(config.http2_only)
            .build(https_connector);

        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resource URL for `key`, optionally carrying a long-poll hint
    pub fn key_url(&self, key: &str, watch: Option<Duration>) -> String {
        match watch {
            Some(hint) => format!(
                "{}/kv/{}?watch={}",
                self.config.endpoint,
                encode_key(key),
                hint.as_secs()
            ),
            None => format!("{}/kv/{}", self.config.endpoint, encode_key(key)),
        }
    }

    /// Send one request and read the whole response, bounded by `timeout`.
    async fn exchange(
        &self,
        req: Request<Full<Bytes>>,
        timeout: Duration,
    ) -> Result<(Response<()>, Bytes)> {
        debug!("Sending request: {} {}", req.method(), req.uri());

        let send = async {
            let response = self
                .http_client
                .request(req)
                .await
                .map_err(|e| Error::Connection(format!("Request failed: {}", e)))?;
            let (parts, body) = response.into_parts();
            let body = Self::read_body_to_bytes(body).await?;
            Ok::<_, Error>((Response::from_parts(parts, ()), body))
        };

        tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| Error::Timeout(timeout.as_millis() as u64))?
    }

    /// Read response body to bytes
    async fn read_body_to_bytes(body: Incoming) -> Result<Bytes> {
        let collected = body
            .collect()
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        Ok(collected.to_bytes())
    }

    /// Conditional read of `key`.
    ///
    /// When `last_known` is non-empty it is sent as `if-none-match`, letting the
    /// store answer "not modified". `watch` asks the store to hold the request
    /// open for up to that long waiting for a change; the request's own timeout
    /// is then the hint plus a short grace period.
    ///
    /// # Errors
    /// * [`Error::MissingVersion`] when the response has no `etag`
    /// * [`Error::UnexpectedStatus`] for any status other than 200, 304 and 404
    /// * transport errors as-is, including [`Error::Timeout`]
    pub async fn fetch(
        &self,
        key: &str,
        last_known: &Version,
        watch: Option<Duration>,
    ) -> Result<FetchOutcome> {
        validate_key(key)?;

        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(self.key_url(key, watch));
        if !last_known.is_empty() {
            builder = builder.header(header::IF_NONE_MATCH, version_header(last_known)?);
        }
        let req = builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| Error::InvalidRequest(format!("Failed to build request: {}", e)))?;

        let timeout = match watch {
            Some(hint) => hint + LONG_POLL_GRACE,
            None => self.config.request_timeout(),
        };

        let (response, body) = self.exchange(req, timeout).await?;
        map_fetch_response(&response, body, last_known)
    }

    /// Retrieve the current value of `key`
    ///
    /// An absent key is not an error: the entry is empty, `found` is false and
    /// `version` is the version the store reported for the absence.
    ///
    /// # Example
    /// ```rust,no_run
    /// # use raccoon_kv_client::Client;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), raccoon_kv_client::Error> {
    /// # let client = Client::new("http://localhost:3000")?;
    /// let entry = client.get("feature-flags").await?;
    /// println!("{} bytes at version {}", entry.value.len(), entry.version);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get(&self, key: &str) -> Result<Entry> {
        let outcome = self.fetch(key, &Version::empty(), None).await?;
        let found = outcome.is_found();
        let version = outcome.version().clone();
        Ok(Entry {
            value: outcome.into_value(),
            version,
            found,
        })
    }

    /// Retrieve a string value by key (convenience method)
    pub async fn get_str(&self, key: &str) -> Result<(String, Version)> {
        let entry = self.get(key).await?;
        let text = String::from_utf8(entry.value.to_vec())?;
        Ok((text, entry.version))
    }

    /// Unconditionally overwrite the value of `key`
    ///
    /// Single attempt; the store must answer `204 No Content`.
    ///
    /// # Example
    /// ```rust,no_run
    /// # use raccoon_kv_client::Client;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), raccoon_kv_client::Error> {
    /// # let client = Client::new("http://localhost:3000")?;
    /// client.put("feature-flags", b"{\"dark_mode\":true}").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;

        let req = Request::builder()
            .method(Method::PUT)
            .uri(self.key_url(key, None))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Full::new(Bytes::copy_from_slice(value)))
            .map_err(|e| Error::InvalidRequest(format!("Failed to build request: {}", e)))?;

        let (response, _) = self.exchange(req, self.config.request_timeout()).await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            other => Err(Error::UnexpectedStatus(other.as_u16())),
        }
    }

    /// Store a string value with a key (convenience method)
    pub async fn put_str(&self, key: &str, value: &str) -> Result<()> {
        self.put(key, value.as_bytes()).await
    }

    /// Watch `key`, calling `callback` with the value each time its version changes.
    ///
    /// Runs until `ctx` is cancelled or its deadline passes. The first poll always
    /// reports the current value (an empty value if the key is absent). Failures
    /// are logged and retried with exponential backoff; they never end the watch.
    /// The callback runs inline, so the next poll starts once it returns.
    ///
    /// # Example
    /// ```rust,no_run
    /// # use raccoon_kv_client::{Client, WatchContext};
    /// # use std::time::Duration;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), raccoon_kv_client::Error> {
    /// # let client = Client::new("http://localhost:3000")?;
    /// let ctx = WatchContext::with_timeout(Duration::from_secs(300));
    /// client
    ///     .watch("feature-flags", &ctx, |value| {
    ///         println!("flags changed: {}", String::from_utf8_lossy(&value));
    ///     })
    ///     .await;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn watch<F>(&self, key: &str, ctx: &WatchContext, callback: F)
    where
        F: FnMut(Bytes),
    {
        if let Err(e) = validate_key(key) {
            error!(key, "refusing to watch: {}", e);
            return;
        }
        let settings = WatchSettings::from_config(&self.config);
        watch::watch(self, key, &settings, ctx, callback).await
    }
}

impl ConditionalFetch for Client {
    fn fetch(
        &self,
        key: &str,
        last_known: &Version,
        watch: Option<Duration>,
    ) -> impl Future<Output = Result<FetchOutcome>> + Send {
        Client::fetch(self, key, last_known, watch)
    }
}

/// Map a conditional-read response onto a [`FetchOutcome`].
fn map_fetch_response(
    response: &Response<()>,
    body: Bytes,
    last_known: &Version,
) -> Result<FetchOutcome> {
    let version = response
        .headers()
        .get(header::ETAG)
        .filter(|v| !v.is_empty())
        .map(version_from_header)
        .ok_or(Error::MissingVersion)?;

    match response.status() {
        StatusCode::OK => Ok(FetchOutcome::Found {
            value: body,
            version,
        }),
        StatusCode::NOT_FOUND => Ok(FetchOutcome::NotFound { version }),
        StatusCode::NOT_MODIFIED if !last_known.is_empty() => Ok(FetchOutcome::NotModified {
            version: last_known.clone(),
        }),
        other => Err(Error::UnexpectedStatus(other.as_u16())),
    }
}
