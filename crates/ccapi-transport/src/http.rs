use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};

use crate::error::{Result, TransportError};
use crate::traits::ByteStream;

/// Default connect timeout for the device.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for establishing the TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Accept self-signed device certificates when talking HTTPS.
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }
}

/// HTTP connection to one device, rooted at a base URL.
///
/// No total request timeout is set on the client: streaming bodies are
/// unbounded. Callers that want a deadline on request/response calls set it
/// per request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport for `base_url` (e.g. `http://10.0.0.241:8080`).
    pub fn new(base_url: impl Into<String>, config: &TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(TransportError::Client)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// The base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The underlying client, for request/response calls.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Resolve a device path (or an absolute URL) against the base URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Open a streaming GET on a device path.
    ///
    /// Connection failures, non-success statuses and empty bodies are all
    /// reported here, before any byte reaches a decoder.
    pub async fn open_stream(&self, path: &str, query: &[(&str, &str)]) -> Result<ByteStream> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            )
            .send()
            .await
            .map_err(|source| TransportError::Connect {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    tracing::debug!(%url, error = %err, "failed to read rejection body");
                    String::new()
                }
            };
            tracing::debug!(%url, status = status.as_u16(), "stream open rejected");
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        if response.content_length() == Some(0) {
            return Err(TransportError::NoBody { url });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        tracing::debug!(%url, content_type = ?content_type, "stream opened");
        Ok(ByteStream::from_http(
            Box::pin(response.bytes_stream()),
            content_type,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> HttpTransport {
        HttpTransport::new("http://10.0.0.241:8080/", &TransportConfig::default())
            .expect("client should build")
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(transport().base_url(), "http://10.0.0.241:8080");
    }

    #[test]
    fn url_joins_relative_and_absolute_paths() {
        let t = transport();
        assert_eq!(
            t.url("/ccapi/ver100/shooting/liveview/scroll"),
            "http://10.0.0.241:8080/ccapi/ver100/shooting/liveview/scroll"
        );
        assert_eq!(t.url("ccapi"), "http://10.0.0.241:8080/ccapi");
        assert_eq!(
            t.url("http://127.0.0.1:9000/mjpeg"),
            "http://127.0.0.1:9000/mjpeg"
        );
    }

    #[tokio::test]
    async fn open_stream_reports_connect_failure() {
        let config = TransportConfig {
            connect_timeout: Duration::from_millis(200),
            ..TransportConfig::default()
        };
        // Port 9 on loopback is not expected to be listening.
        let t = HttpTransport::new("http://127.0.0.1:9", &config).unwrap();
        let err = t.open_stream("/stream", &[]).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
