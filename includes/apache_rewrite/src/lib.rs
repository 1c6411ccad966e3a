//! Offline tester for HTTPD's [mod_rewrite](https://httpd.apache.org/docs/current/mod/mod_rewrite.html)
//! configurations.
//!
//! Parses virtual hosts, `RewriteCond` and `RewriteRule` directives into a
//! directive tree and evaluates simulated requests against it without a
//! running web server.
//!
//! # Example
//!
//! ```
//! use apache_rewrite::{Request, Rewrite, Tester};
//!
//! let tester: Tester = r#"
//!   <VirtualHost *:80>
//!     ServerName www.example.com
//!     RewriteEngine on
//!     RewriteRule ^/file/(.*)     /tmp/$1      [L]
//!     RewriteRule ^/redirect/(.*) /location/$1 [R=302]
//!     RewriteRule ^/blocked/(.*)  -            [F]
//!   </VirtualHost>
//! "#.parse().expect("failed to parse configuration");
//!
//! let request = Request::get("/file/my/document.txt", "www.example.com");
//! let result = tester.evaluate(&request).unwrap();
//! assert_eq!(result.outcome.rewrite, Rewrite::Uri("/tmp/my/document.txt".into()));
//! ```
use std::collections::BTreeMap;
use std::str::FromStr;

mod captures;
pub mod directive;
pub mod environment;
pub mod error;
mod extra;
pub mod flags;
pub mod format;
pub mod handler;
pub mod pattern;
pub mod preprocess;

use directive::main_context::MainContext;
use environment::Environment;
use error::{EvalError, ParseError};

pub use directive::rule::Cookie;
pub use environment::context::{Request, Server};
pub use handler::{Outcome, RequestHandler, Rewrite};

/// Default bound on `N` flag restarts.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Result of evaluating a single request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    /// Label of the scope that handled the request
    pub host: String,
    /// `SERVER_NAME` the request was evaluated with
    pub server_name: Option<String>,
    pub outcome: Outcome,
    /// Variables assigned with the `E` flag
    pub variables: BTreeMap<String, String>,
}

/// Parsed configuration ready to evaluate requests.
///
/// # Example
///
/// ```
/// use apache_rewrite::{Request, Rewrite, Server, Tester};
///
/// let tester: Tester = r#"
///     RewriteEngine on
///     RewriteRule ^/users/(\w+)$ /home/${users:$1|nobody}
/// "#
/// .parse::<Tester>()
/// .unwrap()
/// .server(Server::default().port(8080))
/// .map("users", [("bob", "robert")]);
///
/// let result = tester.evaluate(&Request::get("/users/bob", "localhost")).unwrap();
/// assert_eq!(result.outcome.rewrite, Rewrite::Uri("/home/robert".into()));
/// ```
#[derive(Clone, Debug)]
pub struct Tester {
    context: MainContext,
    server: Server,
    maps: BTreeMap<String, BTreeMap<String, String>>,
    max_iterations: usize,
}

impl Tester {
    /// Configure max number of restarts caused by the `N` flag
    /// before erroring.
    ///
    /// Default is 10
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }

    /// Describe the server requests arrive on.
    pub fn server(mut self, server: Server) -> Self {
        self.server = server;
        self
    }

    /// Register a lookup table for `${name:key}` expansions.
    pub fn map<I, K, V>(mut self, name: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = self.maps.entry(name.to_owned()).or_default();
        map.extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[inline]
    pub fn main_context(&self) -> &MainContext {
        &self.context
    }

    /// Select the host for the request and run its rule set.
    pub fn evaluate(&self, request: &Request) -> Result<Evaluation, EvalError> {
        let selected = self.context.find_host(
            self.server.get_ip(),
            self.server.get_port(),
            request.host(),
        );
        let handler = selected.handler();
        let server_name = handler
            .server_name()
            .or_else(|| self.context.server_name())
            .map(str::to_owned);

        let server = match (&server_name, self.server.get_server_name()) {
            (Some(name), None) => self.server.clone().server_name(name.as_str()),
            _ => self.server.clone(),
        };
        let mut env = Environment::new(request, &server);
        for (name, entries) in &self.maps {
            env.insert_map(name, entries.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        let outcome = handler.handle_request(request, &mut env, self.max_iterations)?;
        tracing::debug!(
            host = %handler.label(),
            uri = request.uri(),
            rewrite = ?outcome.rewrite,
            "evaluated request"
        );
        Ok(Evaluation {
            host: handler.label(),
            server_name,
            outcome,
            variables: env.variables(),
        })
    }
}

impl FromStr for Tester {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            context: MainContext::from_str(s)?,
            server: Server::default(),
            maps: BTreeMap::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::variables::ServerVariable;

    #[test]
    fn test_round_trip() {
        let tester = Tester::from_str(
            r#"
            RewriteEngine on
            RewriteRule ^/somepath(.*) /otherpath$1
        "#,
        )
        .unwrap();
        let result = tester.evaluate(&Request::get("/somepath/x?y=z", "localhost")).unwrap();
        assert_eq!(result.host, "main context");
        assert_eq!(result.outcome.rewrite, Rewrite::Uri("/otherpath/x?y=z".into()));
    }

    #[test]
    fn test_user_agent() {
        let tester = Tester::from_str(
            r#"
            RewriteEngine on
            RewriteCond %{HTTP_USER_AGENT} ^curl/(\d+)
            RewriteRule ^/(.*) /cli/%1/$1 [E=agent:%{HTTP_USER_AGENT}]
        "#,
        )
        .unwrap();
        let request = Request::get("/status", "localhost").header("user-agent", "curl/8.4.0");
        let result = tester.evaluate(&request).unwrap();
        assert_eq!(result.outcome.rewrite, Rewrite::Uri("/cli/8/status".into()));
        assert_eq!(result.variables.get("agent").map(|s| s.as_str()), Some("curl/8.4.0"));

        let request = Request::get("/status", "localhost").header("User-Agent", "firefox");
        let result = tester.evaluate(&request).unwrap();
        assert_eq!(result.outcome.rewrite, Rewrite::Uri("/status".into()));
        assert!(result.variables.is_empty());
    }

    #[test]
    fn test_host_server_name() {
        let tester = Tester::from_str(
            r#"
            ServerName main.example.com
            <VirtualHost *:80>
                ServerName shop.example.com
                RewriteEngine on
                RewriteRule ^/(.*) /%{SERVER_NAME}/$1
            </VirtualHost>
            <VirtualHost *:80>
                RewriteEngine on
                RewriteRule ^/(.*) /%{SERVER_NAME}/$1
            </VirtualHost>
        "#,
        )
        .unwrap();

        let result = tester.evaluate(&Request::get("/a", "shop.example.com:80")).unwrap();
        assert_eq!(result.host, "<VirtualHost *:80>");
        assert_eq!(result.server_name.as_deref(), Some("shop.example.com"));
        assert_eq!(result.outcome.rewrite, Rewrite::Uri("/shop.example.com/a".into()));

        let result = tester.evaluate(&Request::get("/a", "main.example.com")).unwrap();
        assert_eq!(result.outcome.rewrite, Rewrite::Uri("/main.example.com/a".into()));

        let tester = tester.server(Server::default().port(443));
        let result = tester.evaluate(&Request::get("/a", "shop.example.com")).unwrap();
        assert_eq!(result.host, "main context");
        assert_eq!(result.outcome.rewrite, Rewrite::Uri("/a".into()));
    }

    #[test]
    fn test_max_iterations() {
        let config = "RewriteEngine on\nRewriteRule ^/a(.*) /a$1a [N]";
        let tester = Tester::from_str(config).unwrap().max_iterations(2);
        assert_eq!(
            tester.evaluate(&Request::get("/a", "localhost")),
            Err(EvalError::TooManyIterations)
        );
    }

    #[test]
    fn test_environment_seeded() {
        let tester = Tester::from_str(
            "RewriteEngine on\nRewriteRule ^ /%{REQUEST_METHOD}%{REQUEST_URI}?%{QUERY_STRING}",
        )
        .unwrap();
        let request = Request::new("POST", "/form?x=1");
        let result = tester.evaluate(&request).unwrap();
        assert_eq!(result.outcome.rewrite, Rewrite::Uri("/POST/form?x=1".into()));
        assert_eq!(ServerVariable::QueryString.name(), "QUERY_STRING");
    }
}
