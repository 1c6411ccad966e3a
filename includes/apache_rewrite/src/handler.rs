//! Execution of a host's rule set against a single request.
use crate::directive::condition::RewriteCondition;
use crate::directive::rule::{Cookie, Effect, RewriteRule};
use crate::directive::{Directive, active_directives};
use crate::environment::Environment;
use crate::environment::context::Request;
use crate::environment::variables::ServerVariable;
use crate::error::EvalError;
use crate::extra;

/// Rewrite result.
///
/// Includes either the re-written uri, or the instant http-response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rewrite {
    Uri(String),
    EndUri(String),
    Redirect(String, u16),
    StatusCode(u16),
}

impl Rewrite {
    /// Uri produced by the rewrite, if any.
    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::Uri(uri) | Self::EndUri(uri) | Self::Redirect(uri, _) => Some(uri),
            Self::StatusCode(_) => None,
        }
    }

    /// Http status produced by the rewrite, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Redirect(_, status) | Self::StatusCode(status) => Some(*status),
            Self::Uri(_) | Self::EndUri(_) => None,
        }
    }
}

/// Everything a host's rule set produced for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub rewrite: Rewrite,
    pub cookies: Vec<Cookie>,
    pub content_type: Option<String>,
    pub handler: Option<String>,
    pub proxy: bool,
    pub passthrough: bool,
}

impl Outcome {
    fn new(rewrite: Rewrite) -> Self {
        Self {
            rewrite,
            cookies: Vec::new(),
            content_type: None,
            handler: None,
            proxy: false,
            passthrough: false,
        }
    }

    #[inline]
    fn with_rewrite(mut self, rewrite: Rewrite) -> Self {
        self.rewrite = rewrite;
        self
    }
}

/// A `RewriteRule` with the `RewriteCond`s immediately preceding it.
#[derive(Debug)]
struct RuleGroup<'a> {
    conditions: Vec<&'a RewriteCondition>,
    rule: &'a RewriteRule,
}

fn rule_groups(directives: &[Directive]) -> Vec<RuleGroup<'_>> {
    let mut groups = Vec::new();
    let mut conditions = Vec::new();
    for directive in active_directives(directives) {
        match directive {
            Directive::RewriteCondition(condition) => conditions.push(condition),
            Directive::RewriteRule(rule) => groups.push(RuleGroup {
                conditions: std::mem::take(&mut conditions),
                rule,
            }),
            _ => {}
        }
    }
    groups
}

/// Scope that owns a set of rewrite directives.
///
/// Implemented by the main server context and by virtual hosts.
pub trait RequestHandler {
    fn directives(&self) -> &[Directive];

    /// Human readable name used in logs and reports
    fn label(&self) -> String;

    fn server_name(&self) -> Option<&str>;

    fn rewrite_engine(&self) -> bool;

    /// Run the rule set against the request.
    ///
    /// `env` must already be seeded from the request. Rules run in
    /// order, guarded by their conditions, until a rule stops
    /// processing or the list is exhausted. `N` restarts from the first
    /// rule at most `max_iterations` times unless the flag carries its
    /// own maximum.
    fn handle_request(
        &self,
        request: &Request,
        env: &mut Environment,
        max_iterations: usize,
    ) -> Result<Outcome, EvalError> {
        if !self.rewrite_engine() {
            tracing::debug!(host = %self.label(), "rewrite engine is off");
            return Ok(Outcome::new(Rewrite::Uri(request.uri().to_owned())));
        }

        let groups = rule_groups(self.directives());
        let mut outcome = Outcome::new(Rewrite::Uri(String::new()));
        let mut path = request.path().to_owned();
        let mut index = 0;
        let mut restarts = 0;

        let with_query = |path: &str, env: &Environment| {
            let query = env.variable(ServerVariable::QueryString).unwrap_or("");
            extra::join_query(path.to_owned(), query)
        };

        while let Some(group) = groups.get(index) {
            let result = group
                .rule
                .apply_guarded(&path, group.conditions.iter().copied(), env)?;
            index += 1;
            if !result.matched {
                while index < groups.len() && groups[index - 1].rule.is_chained() {
                    index += 1;
                }
                continue;
            }
            path = result.path;

            let mut status = None;
            let mut redirect = None;
            let mut end = false;
            let mut last = false;
            let mut next = None;
            for effect in result.effects {
                match effect {
                    Effect::Status(code) => status = Some(code),
                    Effect::Redirect(code) => redirect = Some(code),
                    Effect::End => end = true,
                    Effect::Last => last = true,
                    Effect::Next { maximum } => next = Some(maximum.unwrap_or(max_iterations)),
                    Effect::Skip(n) => index += n,
                    Effect::Cookie(cookie) => outcome.cookies.push(cookie),
                    Effect::ContentType(content_type) => outcome.content_type = Some(content_type),
                    Effect::Handler(handler) => outcome.handler = Some(handler),
                    Effect::Proxy => outcome.proxy = true,
                    Effect::PassThrough => outcome.passthrough = true,
                    Effect::Chain | Effect::SetVariable { .. } | Effect::UnsetVariable(_) => {}
                }
            }

            if let Some(code) = status {
                return Ok(outcome.with_rewrite(Rewrite::StatusCode(code)));
            }
            if let Some(code) = redirect {
                let uri = with_query(&path, env);
                return Ok(outcome.with_rewrite(Rewrite::Redirect(uri, code)));
            }
            if outcome.proxy {
                break;
            }
            if end {
                let uri = with_query(&path, env);
                return Ok(outcome.with_rewrite(Rewrite::EndUri(uri)));
            }
            if last {
                break;
            }
            if let Some(maximum) = next {
                restarts += 1;
                if restarts > maximum {
                    return Err(EvalError::TooManyIterations);
                }
                index = 0;
            }
        }

        let uri = with_query(&path, env);
        Ok(outcome.with_rewrite(Rewrite::Uri(uri)))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::directive::main_context::MainContext;
    use crate::environment::context::Server;

    fn run(config: &str, uri: &str) -> Result<Outcome, EvalError> {
        let context = MainContext::from_str(config).unwrap();
        let request = Request::get(uri, "localhost");
        let mut env = Environment::new(&request, &Server::default());
        context.handle_request(&request, &mut env, 10)
    }

    fn rewrite(config: &str, uri: &str) -> Rewrite {
        run(config, uri).unwrap().rewrite
    }

    #[test]
    fn test_rules() {
        let config = r#"
            RewriteEngine on
            RewriteRule ^/skip      /new/test      [S=2]
            RewriteRule ^/skip      -              [F]
            RewriteRule ^/new/(.*)  /index?page=$1 [R=303]
            RewriteRule ^/new/(.*)  -              [G]
            RewriteRule ^/(.*)      /new/$1        [N,NE]
        "#;
        assert_eq!(rewrite(config, "/skip"), Rewrite::StatusCode(410));
        assert_eq!(
            rewrite(config, "/hello/world"),
            Rewrite::Redirect("/index?page=hello/world".into(), 303)
        );
    }

    #[test]
    fn test_redirect_outside_3xx() {
        let config = r#"
            RewriteEngine on
            RewriteRule ^/private/(.*) /login?next=$1 [R=403]
            RewriteRule ^/(.*)         /index         [R]
        "#;
        assert_eq!(rewrite(config, "/private/a"), Rewrite::StatusCode(403));
        assert_eq!(rewrite(config, "/a"), Rewrite::Redirect("/index".into(), 302));
    }

    #[test]
    fn test_query() {
        let config = r#"
            RewriteEngine on
            RewriteRule ^/static/(.*) /files/$1      [NE,L]
            RewriteRule ^/(.*)        /index?page=$1 [B,QSA]
        "#;
        assert_eq!(
            rewrite(config, "/static/1/2?a=b"),
            Rewrite::Uri("/files/1/2?a=b".into())
        );
        assert_eq!(
            rewrite(config, "/1/2/3?a=b"),
            Rewrite::Uri("/index?page=1%2F2%2F3&a=b".into())
        );
    }

    #[test]
    fn test_overflow() {
        let config = r#"
            RewriteEngine on
            RewriteRule ^/skip/forbidden -       [F]
            RewriteRule ^/skip/gone      -       [G]
            RewriteRule ^/(.*)           /new/$1 [N]
        "#;
        assert_eq!(run(config, "/skip"), Err(EvalError::TooManyIterations));

        let config = r#"
            RewriteEngine on
            RewriteRule ^/a(a*)$ /a$1a [N=3]
        "#;
        assert_eq!(run(config, "/a"), Err(EvalError::TooManyIterations));
    }

    #[test]
    fn test_next_terminates() {
        let config = r#"
            RewriteEngine on
            RewriteRule ^/(.*)/(.*)$ /$1-$2 [N]
        "#;
        assert_eq!(rewrite(config, "/a/b/c"), Rewrite::Uri("/a-b-c".into()));
    }

    #[test]
    fn test_chain() {
        let config = r#"
            RewriteEngine on
            RewriteRule ^/a(.*) /b$1 [C]
            RewriteRule ^/b(.*) /c$1 [C]
            RewriteRule ^/c(.*) /d$1
            RewriteRule ^/x     /y
        "#;
        assert_eq!(rewrite(config, "/a1"), Rewrite::Uri("/d1".into()));
        assert_eq!(rewrite(config, "/b1"), Rewrite::Uri("/b1".into()));
        assert_eq!(rewrite(config, "/x"), Rewrite::Uri("/y".into()));
    }

    #[test]
    fn test_last_and_end() {
        let config = r#"
            RewriteEngine on
            RewriteRule ^/first  /second [L]
            RewriteRule ^/second /third
            RewriteRule ^/stop   /halt   [END]
            RewriteRule ^/halt   /never
        "#;
        assert_eq!(rewrite(config, "/first"), Rewrite::Uri("/second".into()));
        assert_eq!(rewrite(config, "/second"), Rewrite::Uri("/third".into()));
        assert_eq!(rewrite(config, "/stop"), Rewrite::EndUri("/halt".into()));
    }

    #[test]
    fn test_conditions_guard_rules() {
        let config = r#"
            RewriteEngine on
            RewriteCond %{HTTP_HOST} ^old\.example\.com$ [NC]
            RewriteRule ^/(.*) http://new.example.com/$1 [R=301,L]
            RewriteRule ^/blog$ /blog/ [R]
        "#;
        let context = MainContext::from_str(config).unwrap();
        let request = Request::get("/page", "OLD.example.com");
        let mut env = Environment::new(&request, &Server::default());
        let outcome = context.handle_request(&request, &mut env, 10).unwrap();
        assert_eq!(
            outcome.rewrite,
            Rewrite::Redirect("http://new.example.com/page".into(), 301)
        );

        assert_eq!(rewrite(config, "/page"), Rewrite::Uri("/page".into()));
        assert_eq!(
            rewrite(config, "/blog"),
            Rewrite::Redirect("/blog/".into(), 302)
        );
    }

    #[test]
    fn test_engine_off() {
        let config = r#"
            RewriteRule ^/(.*) /index.php?page=$1
        "#;
        assert_eq!(rewrite(config, "/a?b=c"), Rewrite::Uri("/a?b=c".into()));
        let config = "RewriteEngine on\nRewriteEngine off\nRewriteRule ^/ - [F]";
        assert_eq!(rewrite(config, "/a"), Rewrite::Uri("/a".into()));
    }

    #[test]
    fn test_side_effects() {
        let config = r#"
            RewriteEngine on
            RewriteRule ^/api/(.*) http://backend/$1 [P,CO=seen:1:.example.com,H=proxy:fcgi]
            RewriteRule ^/docs/(.*)\.md$ /render/$1 [T=text/markdown,PT]
        "#;
        let outcome = run(config, "/api/users").unwrap();
        assert!(outcome.proxy);
        assert_eq!(outcome.rewrite, Rewrite::Uri("http://backend/users".into()));
        assert_eq!(outcome.cookies.len(), 1);
        assert_eq!(outcome.cookies[0].to_string(), "seen=1; Domain=.example.com");
        assert_eq!(outcome.handler.as_deref(), Some("proxy:fcgi"));

        let outcome = run(config, "/docs/intro.md").unwrap();
        assert!(outcome.passthrough);
        assert_eq!(outcome.content_type.as_deref(), Some("text/markdown"));
        assert_eq!(outcome.rewrite.uri(), Some("/render/intro"));
        assert_eq!(outcome.rewrite.status(), None);
    }

    #[test]
    fn test_if_module_rules() {
        let config = r#"
            <IfModule mod_rewrite.c>
                RewriteEngine on
                RewriteRule ^/old$ /new
            </IfModule>
            <IfModule !mod_rewrite.c>
                RewriteRule ^/new$ /broken
            </IfModule>
        "#;
        assert_eq!(rewrite(config, "/old"), Rewrite::Uri("/new".into()));
    }
}
