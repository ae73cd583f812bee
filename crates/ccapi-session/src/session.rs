use std::time::Duration;

use bytes::Bytes;
use ccapi_frame::FrameConfig;
use ccapi_transport::{HttpTransport, TransportConfig, TransportError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::endpoint::{EndpointDescriptor, EndpointMap, HttpMethod};
use crate::error::{Result, SessionError};

/// Default deadline for request/response calls (not streams).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Path of the capability map on every device.
pub const CAPABILITY_PATH: &str = "/ccapi";

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HTTP client settings.
    pub transport: TransportConfig,
    /// Deadline for each control call. Streams are unbounded.
    pub request_timeout: Duration,
    /// Limits applied by the stream decoders.
    pub frame: FrameConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            frame: FrameConfig::default(),
        }
    }
}

/// Identity of the connected device (`deviceinformation`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInformation {
    pub manufacturer: String,
    pub productname: String,
    pub guid: String,
    pub serialnumber: String,
    pub firmwareversion: String,
    pub macaddress: String,
}

/// A connection to one device with its endpoints resolved.
///
/// The endpoint map is resolved once, at [`Session::connect`], and never
/// changes afterwards.
#[derive(Debug, Clone)]
pub struct Session {
    transport: HttpTransport,
    endpoints: EndpointMap,
    config: SessionConfig,
}

impl Session {
    /// Connect to `base_url` (e.g. `http://10.0.0.241:8080`) and resolve the
    /// capability map.
    pub async fn connect(base_url: impl Into<String>, config: SessionConfig) -> Result<Self> {
        let transport = HttpTransport::new(base_url, &config.transport)?;
        let url = transport.url(CAPABILITY_PATH);
        let body = send(
            &transport,
            config.request_timeout,
            reqwest::Method::GET,
            &url,
            &[],
            None,
        )
        .await?;
        let endpoints = EndpointMap::from_json(&body)?;

        tracing::info!(
            base_url = transport.base_url(),
            endpoints = endpoints.len(),
            "session connected"
        );
        Ok(Self::from_parts(transport, endpoints, config))
    }

    /// Assemble a session from an already-resolved endpoint map.
    pub fn from_parts(transport: HttpTransport, endpoints: EndpointMap, config: SessionConfig) -> Self {
        Self {
            transport,
            endpoints,
            config,
        }
    }

    pub fn endpoints(&self) -> &EndpointMap {
        &self.endpoints
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Resolve `name` for `method`, failing before any request is made.
    pub fn endpoint_for(&self, name: &str, method: HttpMethod) -> Result<&EndpointDescriptor> {
        self.endpoints.require(name, method)
    }

    pub async fn get_json(&self, name: &str) -> Result<Value> {
        self.call(name, HttpMethod::Get, &[], None).await
    }

    pub async fn post_json(&self, name: &str, body: &Value) -> Result<Value> {
        self.call(name, HttpMethod::Post, &[], Some(body)).await
    }

    pub async fn put_json(&self, name: &str, body: &Value) -> Result<Value> {
        self.call(name, HttpMethod::Put, &[], Some(body)).await
    }

    pub async fn delete_json(&self, name: &str) -> Result<Value> {
        self.call(name, HttpMethod::Delete, &[], None).await
    }

    pub async fn device_information(&self) -> Result<DeviceInformation> {
        let value = self.get_json("deviceinformation").await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Start live view. `size` is `small`/`medium`, `display` is
    /// `on`/`off`/`keep`.
    pub async fn start_live_view(&self, size: &str, display: &str) -> Result<Value> {
        let body = json!({ "liveviewsize": size, "cameradisplay": display });
        self.post_json("shooting/liveview", &body).await
    }

    pub async fn stop_live_view_scroll(&self) -> Result<Value> {
        self.delete_json("shooting/liveview/scroll").await
    }

    pub async fn stop_event_monitoring(&self) -> Result<Value> {
        self.delete_json("event/monitoring").await
    }

    /// Press the shutter once, with or without autofocus.
    pub async fn shutter_button(&self, af: bool) -> Result<Value> {
        self.post_json("shooting/control/shutterbutton", &json!({ "af": af }))
            .await
    }

    /// Fetch pending events. On API ver110 and later the device is asked to
    /// answer immediately instead of holding the request open.
    pub async fn event_polling(&self) -> Result<Value> {
        let endpoint = self.endpoint_for("event/polling", HttpMethod::Get)?;
        let query: &[(&str, &str)] = if version_number(&endpoint.version) >= 110 {
            &[("timeout", "immediately")]
        } else {
            &[]
        };
        self.call("event/polling", HttpMethod::Get, query, None).await
    }

    async fn call(
        &self,
        name: &str,
        method: HttpMethod,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let endpoint = self.endpoint_for(name, method)?;
        let url = self.transport.url(&endpoint.path);
        tracing::debug!(name, %method, %url, "control call");

        let bytes = send(
            &self.transport,
            self.config.request_timeout,
            method.as_reqwest(),
            &url,
            query,
            body,
        )
        .await?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

async fn send(
    transport: &HttpTransport,
    timeout: Duration,
    method: reqwest::Method,
    url: &str,
    query: &[(&str, &str)],
    body: Option<&Value>,
) -> Result<Bytes> {
    let mut request = transport
        .client()
        .request(method, url)
        .query(query)
        .timeout(timeout);
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request
        .send()
        .await
        .map_err(|err| request_error(url, timeout, err))?;
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| request_error(url, timeout, err))?;

    if !status.is_success() {
        let err = SessionError::from_response(status.as_u16(), &String::from_utf8_lossy(&bytes));
        tracing::debug!(%url, status = status.as_u16(), error = %err, "device rejected call");
        return Err(err);
    }
    Ok(bytes)
}

fn request_error(url: &str, timeout: Duration, err: reqwest::Error) -> SessionError {
    if err.is_timeout() {
        SessionError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connect {
            url: url.to_string(),
            source: err,
        }
        .into()
    } else {
        TransportError::Body(err).into()
    }
}

// "ver110" -> 110; anything unparsable sorts first.
fn version_number(version: &str) -> u32 {
    version
        .trim_start_matches("ver")
        .parse()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};

    use super::*;

    fn capabilities() -> Value {
        json!({
            "ver100": [
                {"path": "/ccapi/ver100/deviceinformation", "get": true, "post": false, "put": false, "delete": false},
                {"path": "/ccapi/ver100/shooting/liveview", "get": false, "post": true, "put": false, "delete": false},
                {"path": "/ccapi/ver100/shooting/liveview/scroll", "get": true, "post": false, "put": false, "delete": true},
                {"path": "/ccapi/ver100/shooting/control/shutterbutton", "get": false, "post": true, "put": false, "delete": false}
            ],
            "ver110": [
                {"path": "/ccapi/ver110/event/polling", "get": true, "post": false, "put": false, "delete": true}
            ]
        })
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("listener has an address");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("server runs");
        });
        format!("http://{addr}")
    }

    fn device() -> Router {
        Router::new()
            .route("/ccapi", get(|| async { Json(capabilities()) }))
            .route(
                "/ccapi/ver100/deviceinformation",
                get(|| async {
                    Json(json!({
                        "manufacturer": "Canon Inc.",
                        "productname": "Canon EOS R6",
                        "serialnumber": "123456789012",
                        "firmwareversion": "1.8.1",
                        "macaddress": "00:11:22:33:44:55"
                    }))
                }),
            )
            .route(
                "/ccapi/ver100/shooting/liveview",
                post(|| async {
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(json!({ "message": "Device busy" })),
                    )
                }),
            )
            .route(
                "/ccapi/ver100/shooting/liveview/scroll",
                delete(|| async { StatusCode::OK }),
            )
            .route(
                "/ccapi/ver100/shooting/control/shutterbutton",
                post(|Json(body): Json<Value>| async move {
                    if body["af"] == json!(true) {
                        (StatusCode::BAD_REQUEST, Json(json!({ "message": "Mode not supported" })))
                    } else {
                        (StatusCode::OK, Json(json!({})))
                    }
                }),
            )
            .route(
                "/ccapi/ver110/event/polling",
                get(|Query(query): Query<HashMap<String, String>>| async move { Json(json!(query)) }),
            )
    }

    #[tokio::test]
    async fn connect_resolves_map_and_reads_device_information() {
        let base = serve(device()).await;
        let session = Session::connect(base, SessionConfig::default())
            .await
            .expect("session should connect");

        assert_eq!(session.endpoints().len(), 5);
        let info = session.device_information().await.expect("device information");
        assert_eq!(info.productname, "Canon EOS R6");
        assert_eq!(info.firmwareversion, "1.8.1");
        assert!(info.guid.is_empty());
    }

    #[tokio::test]
    async fn busy_device_is_surfaced_verbatim() {
        let session = Session::connect(serve(device()).await, SessionConfig::default())
            .await
            .unwrap();

        let err = session.start_live_view("small", "on").await.unwrap_err();
        assert!(err.is_busy());
        assert!(matches!(
            err,
            SessionError::Device { status: 503, ref message } if message == "Device busy"
        ));
    }

    #[tokio::test]
    async fn mode_not_supported_is_classified() {
        let session = Session::connect(serve(device()).await, SessionConfig::default())
            .await
            .unwrap();

        let err = session.shutter_button(true).await.unwrap_err();
        assert!(err.is_mode_unsupported());
        assert_eq!(session.shutter_button(false).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn unsupported_names_fail_before_any_request() {
        let session = Session::connect(serve(device()).await, SessionConfig::default())
            .await
            .unwrap();

        assert!(matches!(
            session.stop_event_monitoring().await,
            Err(SessionError::UnsupportedEndpoint(name)) if name == "event/monitoring"
        ));
        assert!(matches!(
            session.get_json("shooting/liveview").await,
            Err(SessionError::MethodNotSupported { method: HttpMethod::Get, .. })
        ));
    }

    #[tokio::test]
    async fn empty_body_reads_as_empty_object() {
        let session = Session::connect(serve(device()).await, SessionConfig::default())
            .await
            .unwrap();
        assert_eq!(session.stop_live_view_scroll().await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn event_polling_on_ver110_asks_for_immediate_answer() {
        let session = Session::connect(serve(device()).await, SessionConfig::default())
            .await
            .unwrap();
        let echoed = session.event_polling().await.unwrap();
        assert_eq!(echoed, json!({ "timeout": "immediately" }));
    }

    #[tokio::test]
    async fn slow_device_times_out() {
        let router = Router::new()
            .route("/ccapi", get(|| async { Json(capabilities()) }))
            .route(
                "/ccapi/ver100/deviceinformation",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({}))
                }),
            );
        let session = Session::connect(serve(router).await, SessionConfig::default())
            .await
            .unwrap();
        let session = Session::from_parts(
            session.transport().clone(),
            session.endpoints().clone(),
            SessionConfig {
                request_timeout: Duration::from_millis(100),
                ..SessionConfig::default()
            },
        );

        let err = session.device_information().await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn connect_to_nothing_is_a_transport_error() {
        let config = SessionConfig {
            request_timeout: Duration::from_secs(2),
            ..SessionConfig::default()
        };
        let err = Session::connect("http://127.0.0.1:9", config).await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(TransportError::Connect { .. })));
    }

    #[test]
    fn version_numbers_parse() {
        assert_eq!(version_number("ver100"), 100);
        assert_eq!(version_number("ver110"), 110);
        assert_eq!(version_number("verX"), 0);
    }
}
