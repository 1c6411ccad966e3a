use apache_rewrite::{Request, Server};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Test plan describing the apache configuration and the requests run
/// against it.
#[derive(Deserialize, Debug, Default)]
pub struct Configuration {
    pub apache: Option<ApacheConfiguration>,
    pub server: Option<ServerConfiguration>,
    #[serde(default)]
    pub maps: BTreeMap<String, BTreeMap<String, String>>,
    pub max_iterations: Option<usize>,
    #[serde(default)]
    pub requests: Vec<RequestCase>,
}

#[derive(Deserialize, Debug)]
pub struct ApacheConfiguration {
    /// Path of the httpd configuration, relative to the plan
    pub config: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct ServerConfiguration {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub https: Option<bool>,
    pub server_name: Option<String>,
    pub server_admin: Option<String>,
    pub document_root: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct RequestCase {
    pub name: Option<String>,
    pub method: Option<String>,
    pub uri: String,
    pub host: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub expect: Option<Expectation>,
}

/// Expected outcome of a request case. Unset fields are not checked.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Expectation {
    pub uri: Option<String>,
    pub status: Option<u16>,
    pub host: Option<String>,
}

impl RequestCase {
    pub const DEFAULT_HOST: &'static str = "localhost";

    #[inline]
    pub fn method(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }

    #[inline]
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(Self::DEFAULT_HOST)
    }

    /// Name shown in reports, `METHOD host/uri` unless the case is named.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} {}{}", self.method(), self.host(), self.uri),
        }
    }

    pub fn to_request(&self) -> Request {
        self.headers.iter().fold(
            Request::new(self.method(), self.uri.as_str()).header("Host", self.host()),
            |request, (name, value)| request.header(name.as_str(), value.as_str()),
        )
    }
}

impl ServerConfiguration {
    /// Build the simulated server, defaults fill unset fields.
    pub fn to_server(&self) -> Server {
        let mut server = Server::default();
        if let Some(ip) = &self.ip {
            server = server.ip(ip.as_str());
        }
        if let Some(port) = self.port {
            server = server.port(port);
        }
        if let Some(https) = self.https {
            server = server.https(https);
        }
        if let Some(name) = &self.server_name {
            server = server.server_name(name.as_str());
        }
        if let Some(admin) = &self.server_admin {
            server = server.server_admin(admin.as_str());
        }
        if let Some(root) = &self.document_root {
            server = server.document_root(root.as_str());
        }
        server
    }
}

/// Load a test plan, parsed as toml when the file has a `.toml`
/// extension and as yaml otherwise.
pub async fn load_configuration(path: &str) -> Result<Configuration, BoxError> {
    let res = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| format!("failed to read configuration {path:?}: {err}"))?;

    let config = match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str::<Configuration>(&res)?,
        _ => serde_yaml::from_str::<Configuration>(&res)?,
    };
    tracing::debug!(path, requests = config.requests.len(), "loaded configuration");
    Ok(config)
}
