//! Log Cache HTTP client.
//!
//! One call is one bounded request: the whole exchange (connect, headers and body)
//! must finish within the configured timeout. Failures are classified so callers
//! can tell transport trouble (`Unreachable`, `Timeout`) from bad data
//! (`MalformedResponse`).

// Local crates
use crate::client::error::{ClientError, error_chain};
use crate::parser::models::{Envelope, EnvelopeType, Nanos, SourceMeta};
use crate::parser::parser::{decode_batch, decode_meta};

// External crates
use bytes::Bytes;
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::instrument;

const MAX_ERROR_BODY: usize = 512;

/// Connection settings shared by every client talking to the platform.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub addr: String,
    /// Sent verbatim as the `Authorization` header
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Parameters of one windowed read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadRequest {
    pub source_id: String,
    /// Inclusive lower bound; `None` asks for the most recent window
    pub start_time: Option<Nanos>,
    pub end_time: Option<Nanos>,
    pub limit: Option<u32>,
    pub descending: bool,
    pub envelope_types: Vec<EnvelopeType>,
}

/// Anything the tail engine can poll for envelopes.
pub trait EnvelopeSource {
    fn poll(
        &self,
        request: &ReadRequest,
    ) -> impl Future<Output = Result<Vec<Envelope>, ClientError>> + Send;
}

#[derive(Debug, Clone)]
pub struct LogCacheClient {
    http: reqwest::Client,
    base: Url,
    timeout: Duration,
}

impl LogCacheClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_http(config.token.as_deref())?,
            base: parse_base(&config.addr)?,
            timeout: config.timeout,
        })
    }

    /// Fetch one window of envelopes for `request.source_id`, in server order.
    #[instrument(
        name = "log_cache_client::read",
        target = "client::client::LogCacheClient",
        skip_all,
        fields(source_id = %request.source_id, start_time = ?request.start_time),
        level = "debug"
    )]
    pub async fn read(&self, request: &ReadRequest) -> Result<Vec<Envelope>, ClientError> {
        let mut url = endpoint(&self.base, &["v1", "read", &request.source_id])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(start) = request.start_time {
                query.append_pair("start_time", &start.to_string());
            }
            if let Some(end) = request.end_time {
                query.append_pair("end_time", &end.to_string());
            }
            if let Some(limit) = request.limit {
                query.append_pair("limit", &limit.to_string());
            }
            if request.descending {
                query.append_pair("descending", "true");
            }
            for kind in &request.envelope_types {
                query.append_pair("envelope_types", kind.as_query_value());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let body = fetch(&self.http, &url, self.timeout).await?;
        let envelopes = decode_batch(&body).map_err(|source| ClientError::MalformedResponse {
            url: url.to_string(),
            source,
        })?;

        tracing::debug!(envelope_count = envelopes.len(), "Read window from Log Cache");
        Ok(envelopes)
    }

    /// Cache statistics for every source Log Cache holds.
    #[instrument(
        name = "log_cache_client::meta",
        target = "client::client::LogCacheClient",
        skip_all,
        level = "debug"
    )]
    pub async fn meta(&self) -> Result<BTreeMap<String, SourceMeta>, ClientError> {
        let url = endpoint(&self.base, &["v1", "meta"])?;
        let body = fetch(&self.http, &url, self.timeout).await?;
        decode_meta(&body).map_err(|source| ClientError::MalformedResponse {
            url: url.to_string(),
            source,
        })
    }
}

impl EnvelopeSource for LogCacheClient {
    fn poll(
        &self,
        request: &ReadRequest,
    ) -> impl Future<Output = Result<Vec<Envelope>, ClientError>> + Send {
        self.read(request)
    }
}

pub(crate) fn build_http(token: Option<&str>) -> Result<reqwest::Client, ClientError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
        let mut value = HeaderValue::from_str(token)
            .map_err(|e| ClientError::Setup(format!("access token is not a valid header value: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent(concat!("log-cache-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ClientError::Setup(error_chain(&e)))
}

pub(crate) fn parse_base(addr: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidEndpoint {
        addr: addr.to_string(),
        reason,
    };

    let url = Url::parse(addr.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(invalid(format!(
            "unsupported scheme {:?}, expected http or https",
            url.scheme()
        )));
    }
    Ok(url)
}

/// `base` with `segments` appended as percent-encoded path segments.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ClientError::InvalidEndpoint {
            addr: base.to_string(),
            reason: "endpoint cannot carry a path".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// GET `url` and return the body of a 2xx response, bounded by `timeout`.
pub(crate) async fn fetch(
    http: &reqwest::Client,
    url: &Url,
    timeout: Duration,
) -> Result<Bytes, ClientError> {
    let exchange = async {
        let response = http.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok::<_, reqwest::Error>((status, body))
    };

    let (status, body) = match tokio::time::timeout(timeout, exchange).await {
        Err(_) => {
            return Err(ClientError::Timeout {
                url: url.to_string(),
                timeout,
            });
        }
        Ok(Err(e)) if e.is_timeout() => {
            return Err(ClientError::Timeout {
                url: url.to_string(),
                timeout,
            });
        }
        Ok(Err(e)) => {
            return Err(ClientError::Unreachable {
                url: url.to_string(),
                reason: error_chain(&e),
            });
        }
        Ok(Ok(exchange)) => exchange,
    };

    if !status.is_success() {
        let shown = &body[..body.len().min(MAX_ERROR_BODY)];
        return Err(ClientError::UnexpectedStatus {
            url: url.to_string(),
            status: status.as_u16(),
            body: String::from_utf8_lossy(shown).trim().to_string(),
        });
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_encoded_segments() {
        let base = parse_base("http://localhost:8080/").unwrap();
        let url = endpoint(&base, &["v1", "read", "ns/pod/foo"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v1/read/ns%2Fpod%2Ffoo");

        let base = parse_base("https://lc.example.com/prefix").unwrap();
        let url = endpoint(&base, &["v1", "meta"]).unwrap();
        assert_eq!(url.as_str(), "https://lc.example.com/prefix/v1/meta");
    }

    #[test]
    fn base_must_be_http() {
        assert!(matches!(
            parse_base("localhost:8080"),
            Err(ClientError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            parse_base("ftp://example.com"),
            Err(ClientError::InvalidEndpoint { .. })
        ));
        assert!(parse_base("not a url").is_err());
    }

    #[test]
    fn invalid_token_is_a_setup_error() {
        assert!(matches!(build_http(Some("bad\ntoken")), Err(ClientError::Setup(_))));
        assert!(build_http(Some("bearer abc")).is_ok());
        assert!(build_http(None).is_ok());
    }
}
