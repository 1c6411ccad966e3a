//! Top level server configuration and virtual host selection.
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex_automata::meta::Regex;

use super::virtual_host::{MatchType, VirtualHost};
use super::{Block, Directive, DirectiveKind, Fields, active_directives, consume_block};
use crate::captures;
use crate::error::ParseError;
use crate::handler::RequestHandler;

static START: Lazy<Regex> = Lazy::new(|| captures::compile(r"", false).unwrap());

static END: Lazy<Regex> = Lazy::new(|| captures::compile(r"$", false).unwrap());

/// Root of a parsed configuration.
#[derive(Clone, Debug, Default)]
pub struct MainContext {
    children: Vec<Directive>,
    server_name: Option<String>,
    rewrite_engine: bool,
}

/// Scope chosen to handle a request.
#[derive(Clone, Copy, Debug)]
pub enum Selected<'a> {
    Main(&'a MainContext),
    Virtual(&'a VirtualHost),
}

impl<'a> Selected<'a> {
    #[inline]
    pub fn handler(&self) -> &'a dyn RequestHandler {
        match self {
            Self::Main(main) => *main as &dyn RequestHandler,
            Self::Virtual(host) => *host,
        }
    }
}

impl MainContext {
    #[inline]
    pub fn children(&self) -> &[Directive] {
        &self.children
    }

    /// Every virtual host taking part in selection, including those
    /// declared inside active `IfModule` blocks.
    pub fn virtual_hosts(&self) -> Vec<&VirtualHost> {
        active_directives(&self.children)
            .into_iter()
            .filter_map(|directive| match directive {
                Directive::VirtualHost(host) => Some(host),
                _ => None,
            })
            .collect()
    }

    /// Select the scope handling a request that arrived on `ip:port`
    /// asking for `hostname`.
    ///
    /// Hosts are ranked by address match, then by name match. Ties keep
    /// declaration order. The main context handles requests no virtual
    /// host matches by address.
    pub fn find_host(&self, ip: &str, port: u16, hostname: Option<&str>) -> Selected<'_> {
        let mut ranked: Vec<_> = self
            .virtual_hosts()
            .into_iter()
            .map(|host| {
                let rank = host.match_request(ip, port, hostname, self.server_name());
                (rank, host)
            })
            .collect();
        ranked.sort_by(|(a, _), (b, _)| b.cmp(a));

        let selected = ranked
            .into_iter()
            .find(|((address, _), _)| *address != MatchType::None)
            .map(|(_, host)| Selected::Virtual(host))
            .unwrap_or(Selected::Main(self));
        tracing::debug!(ip, port, ?hostname, host = %selected.handler().label(), "selected host");
        selected
    }
}

impl RequestHandler for MainContext {
    #[inline]
    fn directives(&self) -> &[Directive] {
        &self.children
    }

    fn label(&self) -> String {
        "main context".to_owned()
    }

    #[inline]
    fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    #[inline]
    fn rewrite_engine(&self) -> bool {
        self.rewrite_engine
    }
}

impl RequestHandler for VirtualHost {
    #[inline]
    fn directives(&self) -> &[Directive] {
        self.children()
    }

    fn label(&self) -> String {
        self.to_string()
    }

    #[inline]
    fn server_name(&self) -> Option<&str> {
        VirtualHost::server_name(self)
    }

    #[inline]
    fn rewrite_engine(&self) -> bool {
        VirtualHost::rewrite_engine(self)
    }
}

impl Block for MainContext {
    const NAME: &'static str = "MainContext";
    const FIELDS: &'static [&'static str] = &[];
    const INNER: &'static [DirectiveKind] = &[
        DirectiveKind::VirtualHost,
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

    fn build(_fields: &Fields, children: Vec<Directive>) -> Result<Self, ParseError> {
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
            children,
            server_name,
            rewrite_engine,
        })
    }
}

impl FromStr for MainContext {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(consume_block::<Self>(s)?
            .map(|(context, _)| context)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> MainContext {
        MainContext::from_str(s).unwrap()
    }

    fn selected_label(context: &MainContext, ip: &str, port: u16, hostname: &str) -> String {
        context.find_host(ip, port, Some(hostname)).handler().label()
    }

    #[test]
    fn test_virtual_host() {
        let context = parse("<VirtualHost *:80>\n    ServerName JoeWuzHere.com\n</VirtualHost>");
        assert_eq!(context.children().len(), 1);
        let hosts = context.virtual_hosts();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].server_name(), Some("JoeWuzHere.com"));
    }

    #[test]
    fn test_consecutive_and_nested() {
        let context = parse(
            "ServerName main.example.com
            RewriteEngine On
            # <VirtualHost *:81>
            <VirtualHost *:80>
                ServerName a.example.com
                <IfModule mod_rewrite.c>
                    RewriteEngine on
                    RewriteRule ^/a /b
                </IfModule>
            </VirtualHost>
            <IfModule rewrite_module>
                <VirtualHost *:443>
                    ServerName b.example.com
                </VirtualHost>
            </IfModule>
            Listen 8080",
        );
        assert_eq!(context.children().len(), 4);
        assert_eq!(context.server_name(), Some("main.example.com"));
        assert!(context.rewrite_engine());

        let hosts = context.virtual_hosts();
        assert_eq!(hosts.len(), 2);
        assert!(hosts[0].rewrite_engine());
        assert_eq!(hosts[1].server_name(), Some("b.example.com"));
    }

    #[test]
    fn test_unterminated() {
        let err = MainContext::from_str("<VirtualHost *:80>\n    ServerName JoeWuzHere.com\n")
            .unwrap_err();
        assert!(matches!(err, ParseError::Unterminated { directive: "VirtualHost", .. }));
    }

    #[test]
    fn test_empty() {
        let context = parse("");
        assert!(context.children().is_empty());
        assert!(!context.rewrite_engine());
        assert!(matches!(context.find_host("127.0.0.1", 80, None), Selected::Main(_)));
    }

    #[test]
    fn test_returns_self_without_hosts() {
        let context = parse("ServerName only.example.com\nRewriteEngine on");
        assert_eq!(
            selected_label(&context, "127.0.0.1", 80, "only.example.com"),
            "main context"
        );
    }

    #[test]
    fn test_tie_selects_first() {
        let context = parse(
            "<VirtualHost *:80>\nServerName first.com\n</VirtualHost>
             <VirtualHost *:80>\nServerName second.com\n</VirtualHost>",
        );
        let Selected::Virtual(host) = context.find_host("10.0.0.1", 80, Some("third.com")) else {
            panic!("expected virtual host");
        };
        assert_eq!(host.server_name(), Some("first.com"));
    }

    #[test]
    fn test_exact_beats_wildcard() {
        for config in [
            "<VirtualHost *:80></VirtualHost>\n<VirtualHost 10.0.0.1:80></VirtualHost>",
            "<VirtualHost 10.0.0.1:80></VirtualHost>\n<VirtualHost *:80></VirtualHost>",
        ] {
            let context = parse(config);
            assert_eq!(
                selected_label(&context, "10.0.0.1", 80, "any.com"),
                "<VirtualHost 10.0.0.1:80>"
            );
        }
    }

    #[test]
    fn test_server_name_breaks_tie() {
        let context = parse(
            "<VirtualHost *:80>\nServerName first.com\n</VirtualHost>
             <VirtualHost *:80>\nServerName second.com\n</VirtualHost>",
        );
        let Selected::Virtual(host) = context.find_host("10.0.0.1", 80, Some("SECOND.com")) else {
            panic!("expected virtual host");
        };
        assert_eq!(host.server_name(), Some("second.com"));
    }

    #[test]
    fn test_non_matches_disregarded() {
        let context = parse(
            "ServerName main.com
             <VirtualHost 10.0.0.2:80>\nServerName exact.com\n</VirtualHost>
             <VirtualHost *:8080>\nServerName exact.com\n</VirtualHost>",
        );
        assert_eq!(
            selected_label(&context, "10.0.0.1", 80, "exact.com"),
            "main context"
        );
    }

    #[test]
    fn test_main_name_stands_in() {
        let context = parse(
            "ServerName main.com
             <VirtualHost *:80>\nServerName other.com\n</VirtualHost>
             <VirtualHost *:80>\n</VirtualHost>",
        );
        assert_eq!(
            selected_label(&context, "10.0.0.1", 80, "main.com"),
            "<VirtualHost *:80>"
        );
        let Selected::Virtual(host) = context.find_host("10.0.0.1", 80, Some("main.com")) else {
            panic!("expected virtual host");
        };
        assert_eq!(host.server_name(), None);
    }
}
