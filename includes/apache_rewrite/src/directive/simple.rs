use once_cell::sync::Lazy;
use regex_automata::meta::Regex;

use super::{Fields, SingleLine};
use crate::captures;
use crate::error::ParseError;

static SERVER_NAME: Lazy<Regex> = Lazy::new(|| {
    captures::compile(
        r"(?i:ServerName)[ \t]+(?P<server_name>\S+)[ \t\r]*(?m:$)",
        false,
    )
    .unwrap()
});

static REWRITE_ENGINE: Lazy<Regex> = Lazy::new(|| {
    captures::compile(
        r"(?i:RewriteEngine)[ \t]+(?P<state>(?i:on|off))[ \t\r]*(?m:$)",
        false,
    )
    .unwrap()
});

/// `ServerName [scheme://]hostname[:port]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerName {
    name: String,
}

impl ServerName {
    /// Name exactly as declared.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared name without scheme and port.
    pub fn hostname(&self) -> &str {
        let name = self
            .name
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.name);
        match name.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
            _ => name,
        }
    }
}

impl SingleLine for ServerName {
    const NAME: &'static str = "ServerName";
    const FIELDS: &'static [&'static str] = &["server_name"];

    fn pattern() -> &'static Regex {
        &SERVER_NAME
    }

    fn build(fields: &Fields) -> Result<Self, ParseError> {
        let name = fields.require(Self::NAME, "server_name")?;
        Ok(Self {
            name: name.to_owned(),
        })
    }
}

/// `RewriteEngine on|off`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewriteEngine {
    on: bool,
}

impl RewriteEngine {
    #[inline]
    pub fn is_on(&self) -> bool {
        self.on
    }
}

impl SingleLine for RewriteEngine {
    const NAME: &'static str = "RewriteEngine";
    const FIELDS: &'static [&'static str] = &["state"];

    fn pattern() -> &'static Regex {
        &REWRITE_ENGINE
    }

    fn build(fields: &Fields) -> Result<Self, ParseError> {
        let state = fields.require(Self::NAME, "state")?;
        Ok(Self {
            on: state.eq_ignore_ascii_case("on"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::consume_line;

    #[test]
    fn test_server_name() {
        let (name, rest) = consume_line::<ServerName>("servername www.example.com:8080\nnext")
            .unwrap()
            .unwrap();
        assert_eq!(name.name(), "www.example.com:8080");
        assert_eq!(name.hostname(), "www.example.com");
        assert_eq!(rest, "next");

        let (name, _) = consume_line::<ServerName>("ServerName https://[::1]:443")
            .unwrap()
            .unwrap();
        assert_eq!(name.hostname(), "[::1]");

        assert!(consume_line::<ServerName>("ServerName\nexample.com").unwrap().is_none());
    }

    #[test]
    fn test_rewrite_engine() {
        let (engine, _) = consume_line::<RewriteEngine>("RewriteEngine On").unwrap().unwrap();
        assert!(engine.is_on());
        let (engine, _) = consume_line::<RewriteEngine>("rewriteengine off \r\n").unwrap().unwrap();
        assert!(!engine.is_on());
        assert!(!RewriteEngine::default().is_on());
        assert!(consume_line::<RewriteEngine>("RewriteEngine maybe").unwrap().is_none());
    }
}
