//! Request and server descriptions used to seed an
//! [`Environment`](super::Environment) before evaluation.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};
use unicase::UniCase;

use super::Environment;
use super::variables::ServerVariable;
use crate::error::RequestError;
use crate::extra;

const DEFAULT_VERSION: &str = "HTTP/1.1";
const DEFAULT_SOFTWARE: &str = "Apache";
const API_VERSION: &str = "20120211:0";

macro_rules! setter {
    ($key:ident, $ref:ident) => {
        #[doc = concat!("Assign value for `", stringify!($ref), "` variable")]
        pub fn $key<S: Into<String>>(mut self, $key: S) -> Self {
            self.$key = Some($key.into());
            self
        }
    };
}

/// Simulated http request.
///
/// Header names are compared case-insensitively.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    method: String,
    uri: String,
    version: String,
    headers: HashMap<UniCase<String>, String>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    pub fn new<M: Into<String>, U: Into<String>>(method: M, uri: U) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            version: DEFAULT_VERSION.to_owned(),
            headers: HashMap::new(),
            remote_addr: None,
        }
    }

    /// Shorthand for a `GET` request carrying a `Host` header.
    pub fn get<U: Into<String>, H: Into<String>>(uri: U, host: H) -> Self {
        Self::new("GET", uri).header("Host", host)
    }

    pub fn version<S: Into<String>>(mut self, version: S) -> Self {
        self.version = version.into();
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(UniCase::new(key.into()), value.into());
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[inline]
    pub fn http_version(&self) -> &str {
        &self.version
    }

    /// Uri without its query-string.
    #[inline]
    pub fn path(&self) -> &str {
        extra::split_query(&self.uri).0
    }

    #[inline]
    pub fn query(&self) -> &str {
        extra::split_query(&self.uri).1
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&UniCase::new(key.to_owned()))
            .map(|v| v.as_str())
    }

    /// Requested hostname from the `Host` header without any port.
    pub fn host(&self) -> Option<&str> {
        let host = self.get_header("Host")?;
        match host.rsplit_once(':') {
            Some((name, port)) if !name.ends_with(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
                Some(name)
            }
            _ => Some(host),
        }
    }

    pub(crate) fn fill(&self, env: &mut Environment) {
        for var in ServerVariable::ALL {
            if let Some(value) = var.header().and_then(|h| self.get_header(h)) {
                env.set_variable(*var, value);
            }
        }
        env.set_variable(ServerVariable::RequestMethod, self.method.as_str());
        env.set_variable(ServerVariable::RequestUri, self.path());
        env.set_variable(ServerVariable::QueryString, self.query());
        env.set_variable(ServerVariable::ServerProtocol, self.version.as_str());
        env.set_variable(ServerVariable::PathInfo, "");
        env.set_variable(ServerVariable::IsSubreq, "false");
        env.set_variable(
            ServerVariable::TheRequest,
            format!("{} {} {}", self.method, self.uri, self.version),
        );
        if let Some(addr) = self.remote_addr {
            let ip = addr.ip().to_string();
            env.set_variable(ServerVariable::RemoteAddr, ip.as_str());
            env.set_variable(ServerVariable::RemoteHost, ip.as_str());
            env.set_variable(ServerVariable::ConnRemoteAddr, ip);
            env.set_variable(ServerVariable::RemotePort, addr.port().to_string());
            env.set_variable(
                ServerVariable::Ipv6,
                if addr.is_ipv6() { "on" } else { "off" },
            );
        }
    }
}

impl FromStr for Request {
    type Err = RequestError;

    /// Parse a raw http request head: a request line followed by
    /// `Name: value` header lines, ending at the first blank line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = s.lines().skip_while(|l| l.trim().is_empty());
        let line = lines.next().ok_or(RequestError::Empty)?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        let mut request = match parts.as_slice() {
            [method, uri] => Self::new(*method, *uri).version("HTTP/0.9"),
            [method, uri, version] if version.starts_with("HTTP/") => {
                Self::new(*method, *uri).version(*version)
            }
            _ => return Err(RequestError::InvalidRequestLine(line.to_owned())),
        };
        for line in lines.take_while(|l| !l.trim().is_empty()) {
            let (key, value) = line
                .split_once(':')
                .filter(|(k, _)| !k.trim().is_empty())
                .ok_or_else(|| RequestError::InvalidHeader(line.to_owned()))?;
            request = request.header(key.trim(), value.trim());
        }
        Ok(request)
    }
}

/// Simulated server receiving the request.
#[derive(Clone, Debug)]
pub struct Server {
    ip: String,
    port: u16,
    https: bool,
    server_name: Option<String>,
    server_admin: Option<String>,
    document_root: Option<String>,
    server_software: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_owned(),
            port: 80,
            https: false,
            server_name: None,
            server_admin: None,
            document_root: None,
            server_software: None,
        }
    }
}

impl Server {
    setter!(server_name, SERVER_NAME);
    setter!(server_admin, SERVER_ADMIN);
    setter!(document_root, DOCUMENT_ROOT);
    setter!(server_software, SERVER_SOFTWARE);

    /// Assign value for `SERVER_ADDR` variable.
    pub fn ip<S: Into<String>>(mut self, ip: S) -> Self {
        self.ip = ip.into();
        self
    }

    /// Assign value for `SERVER_PORT` variable.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Assign value for `HTTPS` and `REQUEST_SCHEME` variables.
    pub fn https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    #[inline]
    pub fn get_ip(&self) -> &str {
        &self.ip
    }

    #[inline]
    pub fn get_port(&self) -> u16 {
        self.port
    }

    #[inline]
    pub fn get_server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    pub(crate) fn fill(&self, env: &mut Environment, request: &Request) {
        let name = self
            .server_name
            .as_deref()
            .or_else(|| request.host())
            .unwrap_or(&self.ip);
        env.set_variable(ServerVariable::ServerName, name);
        env.set_variable(ServerVariable::ServerAddr, self.ip.as_str());
        env.set_variable(ServerVariable::ServerPort, self.port.to_string());
        env.set_variable(
            ServerVariable::ServerSoftware,
            self.server_software.as_deref().unwrap_or(DEFAULT_SOFTWARE),
        );
        if let Some(admin) = self.server_admin.as_deref() {
            env.set_variable(ServerVariable::ServerAdmin, admin);
        }
        env.set_variable(ServerVariable::ApiVersion, API_VERSION);
        env.set_variable(ServerVariable::Https, if self.https { "on" } else { "off" });
        env.set_variable(
            ServerVariable::RequestScheme,
            if self.https { "https" } else { "http" },
        );
        env.set_variable(ServerVariable::ContextPrefix, "");

        let root = self.document_root.as_deref().unwrap_or("");
        let filename = format!("{}{}", root.trim_end_matches('/'), request.path());
        env.set_variable(ServerVariable::DocumentRoot, root);
        env.set_variable(ServerVariable::ContextDocumentRoot, root);
        env.set_variable(ServerVariable::RequestFilename, filename.as_str());
        env.set_variable(ServerVariable::ScriptFilename, filename);
    }
}

/// All variables and references associated with `TIME` prefix.
#[derive(Clone, Debug)]
pub struct DateCtx {
    time_year: String,
    time_mon: String,
    time_day: String,
    time_hour: String,
    time_min: String,
    time_sec: String,
    time_wday: String,
    time: String,
}

impl DateCtx {
    pub fn now() -> Self {
        Self::from_date(&chrono::Local::now())
    }

    pub fn from_date<Tz: TimeZone>(date: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            time_year: date.format("%Y").to_string(),
            time_mon: date.format("%m").to_string(),
            time_day: date.format("%d").to_string(),
            time_hour: date.format("%H").to_string(),
            time_min: date.format("%M").to_string(),
            time_sec: date.format("%S").to_string(),
            time_wday: date.format("%w").to_string(),
            time: date.format("%Y%m%d%H%M%S").to_string(),
        }
    }

    pub fn fill(&self, env: &mut Environment) {
        env.set_variable(ServerVariable::TimeYear, self.time_year.as_str());
        env.set_variable(ServerVariable::TimeMon, self.time_mon.as_str());
        env.set_variable(ServerVariable::TimeDay, self.time_day.as_str());
        env.set_variable(ServerVariable::TimeHour, self.time_hour.as_str());
        env.set_variable(ServerVariable::TimeMin, self.time_min.as_str());
        env.set_variable(ServerVariable::TimeSec, self.time_sec.as_str());
        env.set_variable(ServerVariable::TimeWday, self.time_wday.as_str());
        env.set_variable(ServerVariable::Time, self.time.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = Request::get("/a/b?x=1", "Example.com:8080").header("user-agent", "curl");
        assert_eq!(req.path(), "/a/b");
        assert_eq!(req.query(), "x=1");
        assert_eq!(req.host(), Some("Example.com"));
        assert_eq!(req.get_header("USER-AGENT"), Some("curl"));
    }

    #[test]
    fn test_request_parse() {
        let req = Request::from_str(
            "POST /submit?a=b HTTP/1.0\nHost: example.com\nUser-Agent: Mozilla/5.0\n\nbody: ignored",
        )
        .unwrap();
        assert_eq!(req.method(), "POST");
        assert_eq!(req.http_version(), "HTTP/1.0");
        assert_eq!(req.host(), Some("example.com"));
        assert_eq!(req.get_header("user-agent"), Some("Mozilla/5.0"));
        assert_eq!(req.get_header("body"), None);

        assert_eq!(Request::from_str("  \n"), Err(RequestError::Empty));
        assert!(matches!(
            Request::from_str("GET"),
            Err(RequestError::InvalidRequestLine(_))
        ));
        assert!(matches!(
            Request::from_str("GET / HTTP/1.1\nno-colon"),
            Err(RequestError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_fill() {
        let req = Request::get("/index.php?page=1", "example.com")
            .header("User-Agent", "Mozilla/5.0 (iPhone)")
            .remote_addr("[::1]:5000".parse().unwrap());
        let srv = Server::default()
            .ip("10.0.0.1")
            .port(8080)
            .https(true)
            .document_root("/var/www/");
        let env = Environment::new(&req, &srv);

        assert_eq!(
            env.variable(ServerVariable::HttpUserAgent),
            Some("Mozilla/5.0 (iPhone)")
        );
        assert_eq!(env.variable(ServerVariable::HttpHost), Some("example.com"));
        assert_eq!(env.variable(ServerVariable::HttpReferer), None);
        assert_eq!(env.variable(ServerVariable::RequestUri), Some("/index.php"));
        assert_eq!(env.variable(ServerVariable::QueryString), Some("page=1"));
        assert_eq!(
            env.variable(ServerVariable::TheRequest),
            Some("GET /index.php?page=1 HTTP/1.1")
        );
        assert_eq!(env.variable(ServerVariable::ServerName), Some("example.com"));
        assert_eq!(env.variable(ServerVariable::ServerPort), Some("8080"));
        assert_eq!(env.variable(ServerVariable::RequestScheme), Some("https"));
        assert_eq!(env.variable(ServerVariable::Ipv6), Some("on"));
        assert_eq!(env.variable(ServerVariable::RemotePort), Some("5000"));
        assert_eq!(
            env.variable(ServerVariable::RequestFilename),
            Some("/var/www/index.php")
        );
        assert_eq!(env.variable(ServerVariable::TimeYear).map(|y| y.len()), Some(4));
    }

    #[test]
    fn test_date() {
        let date = chrono::Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let mut env = Environment::default();
        DateCtx::from_date(&date).fill(&mut env);
        assert_eq!(env.variable(ServerVariable::TimeMon), Some("03"));
        assert_eq!(env.variable(ServerVariable::TimeWday), Some("6"));
        assert_eq!(env.variable(ServerVariable::Time), Some("20240309070501"));
    }
}
