use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// HTTP methods a capability entry can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub(crate) fn as_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// One entry of the device's capability map, as sent on the wire.
#[derive(Debug, Clone, Deserialize)]
struct CapabilityEntry {
    path: String,
    #[serde(default)]
    get: bool,
    #[serde(default)]
    post: bool,
    #[serde(default)]
    put: bool,
    #[serde(default)]
    delete: bool,
}

/// A resolved endpoint: logical name, path, methods and API version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointDescriptor {
    /// Logical name, e.g. `shooting/liveview/scroll`.
    pub name: String,
    /// Path (or absolute URL) as advertised by the device.
    pub path: String,
    /// Methods the device accepts on this path.
    pub methods: Vec<HttpMethod>,
    /// API version the endpoint was resolved from, e.g. `ver100`.
    pub version: String,
}

impl EndpointDescriptor {
    pub fn supports(&self, method: HttpMethod) -> bool {
        self.methods.contains(&method)
    }
}

/// Logical name → endpoint, resolved once from the capability map.
///
/// When a name is advertised under several API versions the lowest version
/// wins.
#[derive(Debug, Clone, Default)]
pub struct EndpointMap {
    endpoints: BTreeMap<String, EndpointDescriptor>,
}

impl EndpointMap {
    /// Parse the body of `GET /ccapi`.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let raw: BTreeMap<String, Vec<CapabilityEntry>> = serde_json::from_slice(body)
            .map_err(|err| SessionError::Capability(err.to_string()))?;
        Ok(Self::resolve(raw))
    }

    fn resolve(raw: BTreeMap<String, Vec<CapabilityEntry>>) -> Self {
        let mut endpoints = BTreeMap::new();
        for (version, entries) in raw {
            for entry in entries {
                let name = logical_name(&entry.path, &version);
                if name.is_empty() {
                    continue;
                }
                let methods = [
                    (entry.get, HttpMethod::Get),
                    (entry.post, HttpMethod::Post),
                    (entry.put, HttpMethod::Put),
                    (entry.delete, HttpMethod::Delete),
                ]
                .into_iter()
                .filter_map(|(on, method)| on.then_some(method))
                .collect();

                endpoints
                    .entry(name.clone())
                    .or_insert_with(|| EndpointDescriptor {
                        name,
                        path: entry.path,
                        methods,
                        version: version.clone(),
                    });
            }
        }
        Self { endpoints }
    }

    pub fn get(&self, name: &str) -> Option<&EndpointDescriptor> {
        self.endpoints.get(name)
    }

    /// Look up `name` and check it accepts `method`.
    pub fn require(&self, name: &str, method: HttpMethod) -> Result<&EndpointDescriptor> {
        let endpoint = self
            .get(name)
            .ok_or_else(|| SessionError::UnsupportedEndpoint(name.to_string()))?;
        if !endpoint.supports(method) {
            return Err(SessionError::MethodNotSupported {
                name: name.to_string(),
                method,
            });
        }
        Ok(endpoint)
    }

    /// Endpoints in logical-name order.
    pub fn iter(&self) -> impl Iterator<Item = &EndpointDescriptor> {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

// "/ccapi/ver100/shooting/liveview" or "http://host:8080/ccapi/ver100/shooting/liveview"
// both name "shooting/liveview".
fn logical_name(path: &str, version: &str) -> String {
    let rest = match path.find("/ccapi/") {
        Some(idx) => &path[idx + "/ccapi/".len()..],
        None => path.trim_start_matches('/'),
    };
    let rest = rest
        .strip_prefix(version)
        .and_then(|r| r.strip_prefix('/'))
        .unwrap_or(rest);
    rest.trim_end_matches('/').to_string()
}
