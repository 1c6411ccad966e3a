//! `<VirtualHost ip[:port]>` blocks and the ranking used to select one.
use std::fmt;

use once_cell::sync::Lazy;
use regex_automata::meta::Regex;

use super::{Block, Directive, DirectiveKind, Fields, active_directives};
use crate::captures;
use crate::error::ParseError;

static START: Lazy<Regex> = Lazy::new(|| {
    captures::compile(
        r"<(?i:VirtualHost)[ \t]+(?P<ip>\[[^\]>]*\]|[^>\s:]+)(?::(?P<port>[^>\s]{1,5}))?[^>\n]*>",
        false,
    )
    .unwrap()
});

static END: Lazy<Regex> =
    Lazy::new(|| captures::compile(r"</(?i:VirtualHost)[ \t]*>", false).unwrap());

/// Quality of a match between a request and a host declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchType {
    None,
    Wildcard,
    Strict,
}

/// Declared address component that may be a wildcard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Wildcard<T> {
    Any,
    Exact(T),
}

impl<T: PartialEq> Wildcard<T> {
    pub fn compare(&self, value: &T) -> MatchType {
        match self {
            Self::Any => MatchType::Wildcard,
            Self::Exact(exact) if exact == value => MatchType::Strict,
            Self::Exact(_) => MatchType::None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Wildcard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(value) => value.fmt(f),
        }
    }
}

/// Parsed `<VirtualHost>` block.
#[derive(Clone, Debug)]
pub struct VirtualHost {
    ip: Wildcard<String>,
    port: Wildcard<u16>,
    children: Vec<Directive>,
    server_name: Option<String>,
    rewrite_engine: bool,
}

impl VirtualHost {
    #[inline]
    pub fn ip(&self) -> &Wildcard<String> {
        &self.ip
    }

    #[inline]
    pub fn port(&self) -> &Wildcard<u16> {
        &self.port
    }

    #[inline]
    pub fn children(&self) -> &[Directive] {
        &self.children
    }

    /// Last `ServerName` declared inside the block.
    #[inline]
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// State of the last `RewriteEngine` declared inside the block.
    #[inline]
    pub fn rewrite_engine(&self) -> bool {
        self.rewrite_engine
    }

    /// Rank this host against the address the request arrived on and
    /// its requested hostname.
    ///
    /// Returns the combined address match and the name match.
    /// `fallback_name` stands in for hosts without a `ServerName`.
    pub fn match_request(
        &self,
        ip: &str,
        port: u16,
        hostname: Option<&str>,
        fallback_name: Option<&str>,
    ) -> (MatchType, MatchType) {
        let address = self
            .ip
            .compare(&ip.to_owned())
            .min(self.port.compare(&port));
        let name = match (self.server_name.as_deref().or(fallback_name), hostname) {
            (Some(name), Some(hostname)) if name.eq_ignore_ascii_case(hostname) => {
                MatchType::Strict
            }
            _ => MatchType::None,
        };
        (address, name)
    }
}

impl fmt::Display for VirtualHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<VirtualHost {}:{}>", self.ip, self.port)
    }
}

fn parse_ip(ip: &str) -> Wildcard<String> {
    match ip {
        "*" | "_default_" => Wildcard::Any,
        ip => Wildcard::Exact(
            ip.strip_prefix('[')
                .and_then(|ip| ip.strip_suffix(']'))
                .unwrap_or(ip)
                .to_owned(),
        ),
    }
}

fn parse_port(port: Option<&str>) -> Result<Wildcard<u16>, ParseError> {
    match port {
        None | Some("*") => Ok(Wildcard::Any),
        Some(port) => port
            .parse()
            .map(Wildcard::Exact)
            .map_err(|_| ParseError::InvalidField {
                directive: VirtualHost::NAME,
                field: "port",
                value: port.to_owned(),
            }),
    }
}

impl Block for VirtualHost {
    const NAME: &'static str = "VirtualHost";
    const FIELDS: &'static [&'static str] = &["ip", "port"];
    const INNER: &'static [DirectiveKind] = &[
        DirectiveKind::IfModule,
        DirectiveKind::RewriteCondition,
        DirectiveKind::RewriteRule,
        DirectiveKind::RewriteEngine,
        DirectiveKind::ServerName,
    ];

    fn start() -> &'static Regex {
        &START
    }

    fn end() -> &'static Regex {
        &END
    }

    fn build(fields: &Fields, children: Vec<Directive>) -> Result<Self, ParseError> {
        let ip = parse_ip(fields.require(Self::NAME, "ip")?);
        let port = parse_port(fields.get("port"))?;

        let mut server_name = None;
        let mut rewrite_engine = false;
        for directive in active_directives(&children) {
            match directive {
                Directive::ServerName(name) => server_name = Some(name.hostname().to_owned()),
                Directive::RewriteEngine(engine) => rewrite_engine = engine.is_on(),
                _ => {}
            }
        }
        Ok(Self {
            ip,
            port,
            children,
            server_name,
            rewrite_engine,
        })
    }
}
