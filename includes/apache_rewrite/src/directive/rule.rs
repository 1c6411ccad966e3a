//! `RewriteRule Pattern Substitution [flags]`
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex_automata::meta::Regex;

use super::condition::{Evaluate, RewriteCondition};
use super::{Fields, SingleLine};
use crate::captures;
use crate::environment::{Backreference, Environment, Key, variables::ServerVariable};
use crate::error::{EvalError, ParseError};
use crate::extra;
use crate::flags::{self, ApacheFlag, Arguments, FlagDefinition, Flags, Value};
use crate::format::FormatString;
use crate::pattern::CondPattern;

static REWRITE_RULE: Lazy<Regex> = Lazy::new(|| {
    captures::compile(
        r#"(?i:RewriteRule)[ \t]+(?P<pattern>"[^"]*"|\S+)[ \t]+(?P<substitution>"[^"]*"|\S+)(?:[ \t]+\[(?P<flags>[^\]\r\n]*)\])?[ \t\r]*(?m:$)"#,
        false,
    )
    .unwrap()
});

static RULE_FLAGS: Lazy<Vec<FlagDefinition<RuleFlag>>> = Lazy::new(|| {
    use flags::{integer, status_code, text};
    vec![
        FlagDefinition::new(RuleFlag::EscapeBackreferences, r"^B$", &[]),
        FlagDefinition::new(RuleFlag::Chain, r"^(?:C|chain)$", &[]),
        FlagDefinition::new(
            RuleFlag::Cookie,
            r"^(?:CO|cookie)=(?P<name>[^:]+):(?P<value>[^:]*)(?::(?P<domain>[^:]*)(?::(?P<lifetime>\d+)(?::(?P<path>[^:]*)(?::(?P<secure>[^:]*)(?::(?P<httponly>[^:]*))?)?)?)?)?$",
            &[
                ("name", text),
                ("value", text),
                ("domain", text),
                ("lifetime", cookie_lifetime),
                ("path", text),
                ("secure", text),
                ("httponly", text),
            ],
        ),
        FlagDefinition::new(RuleFlag::DiscardPathInfo, r"^(?:DPI|discardpath)$", &[]),
        FlagDefinition::new(RuleFlag::End, r"^END$", &[]),
        FlagDefinition::new(
            RuleFlag::EnvironmentVariable,
            r"^(?:E|env)=(?:!(?P<variable_to_unset>[^:]+)|(?P<variable>[^:!][^:]*)(?::(?P<value>.*))?)$",
            &[
                ("variable_to_unset", text),
                ("variable", text),
                ("value", text),
            ],
        ),
        FlagDefinition::new(RuleFlag::Forbidden, r"^(?:F|forbidden)$", &[]),
        FlagDefinition::new(RuleFlag::Gone, r"^(?:G|gone)$", &[]),
        FlagDefinition::new(
            RuleFlag::Handler,
            r"^(?:H|handler)=(?P<handler>.+)$",
            &[("handler", text)],
        ),
        FlagDefinition::new(RuleFlag::Last, r"^(?:L|last)$", &[]),
        FlagDefinition::new(
            RuleFlag::Next,
            r"^(?:N|next)(?:=(?P<maximum>\d+))?$",
            &[("maximum", integer)],
        ),
        FlagDefinition::new(RuleFlag::NoCase, r"^(?:NC|nocase)$", &[]),
        FlagDefinition::new(RuleFlag::NoEscape, r"^(?:NE|noescape)$", &[]),
        FlagDefinition::new(RuleFlag::NoSubrequest, r"^(?:NS|nosubreq)$", &[]),
        FlagDefinition::new(RuleFlag::Proxy, r"^(?:P|proxy)$", &[]),
        FlagDefinition::new(RuleFlag::PassThrough, r"^(?:PT|passthrough)$", &[]),
        FlagDefinition::new(RuleFlag::QueryStringAppend, r"^(?:QSA|qsappend)$", &[]),
        FlagDefinition::new(RuleFlag::QueryStringDiscard, r"^(?:QSD|qsdiscard)$", &[]),
        FlagDefinition::new(
            RuleFlag::Redirect,
            r"^(?:R|redirect)(?:=(?:(?P<status_code>\d+)|(?P<status_name>\w+)))?$",
            &[("status_code", status_code), ("status_name", text)],
        ),
        FlagDefinition::new(
            RuleFlag::Skip,
            r"^(?:S|skip)=(?P<number>\d+)$",
            &[("number", integer)],
        ),
        FlagDefinition::new(
            RuleFlag::Type,
            r"^(?:T|type)=(?P<content_type>.+)$",
            &[("content_type", text)],
        ),
    ]
});

/// Flags accepted by `RewriteRule`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RuleFlag {
    EscapeBackreferences,
    Chain,
    Cookie,
    DiscardPathInfo,
    End,
    EnvironmentVariable,
    Forbidden,
    Gone,
    Handler,
    Last,
    Next,
    NoCase,
    NoEscape,
    NoSubrequest,
    Proxy,
    PassThrough,
    QueryStringAppend,
    QueryStringDiscard,
    Redirect,
    Skip,
    Type,
}

impl ApacheFlag for RuleFlag {
    const NAME: &'static str = "RuleFlag";

    fn definitions() -> &'static [FlagDefinition<Self>] {
        RULE_FLAGS.as_slice()
    }
}

/// Cookie lifetime in minutes, bounded so `Max-Age` fits in seconds.
fn cookie_lifetime(s: &str) -> Result<Value, String> {
    let minutes = s.parse::<i64>().map_err(|err| err.to_string())?;
    match minutes.checked_mul(60) {
        Some(_) => Ok(Value::Integer(minutes)),
        None => Err("lifetime out of range".to_owned()),
    }
}

#[inline]
fn text_arg(args: &Arguments, name: &str) -> Option<String> {
    args.get(name).and_then(Value::as_str).map(str::to_owned)
}

#[inline]
fn int_arg(args: &Arguments, name: &str) -> Option<i64> {
    args.get(name).and_then(Value::as_integer)
}

impl RuleFlag {
    /// Discrete effect of a matched rule carrying this flag.
    ///
    /// Flags that only alter matching or substitution produce none.
    pub fn effect(self, args: &Arguments) -> Result<Option<Effect>, EvalError> {
        let effect = match self {
            Self::Chain => Effect::Chain,
            Self::Last => Effect::Last,
            Self::End => Effect::End,
            Self::Next => Effect::Next {
                maximum: int_arg(args, "maximum").map(|n| n as usize),
            },
            Self::Skip => Effect::Skip(int_arg(args, "number").unwrap_or(0) as usize),
            Self::Forbidden => Effect::Status(403),
            Self::Gone => Effect::Status(410),
            Self::Redirect => {
                let code = match (int_arg(args, "status_code"), text_arg(args, "status_name")) {
                    (Some(code), _) => code as u16,
                    (None, Some(name)) => redirect_status(&name)?,
                    (None, None) => 302,
                };
                // codes outside 3xx drop the substitution and stop
                match (300..400).contains(&code) {
                    true => Effect::Redirect(code),
                    false => Effect::Status(code),
                }
            }
            Self::EnvironmentVariable => match text_arg(args, "variable_to_unset") {
                Some(name) => Effect::UnsetVariable(name),
                None => Effect::SetVariable {
                    name: text_arg(args, "variable").unwrap_or_default(),
                    value: text_arg(args, "value").unwrap_or_default(),
                },
            },
            Self::Cookie => Effect::Cookie(Cookie::from_arguments(args)),
            Self::Type => Effect::ContentType(text_arg(args, "content_type").unwrap_or_default()),
            Self::Handler => Effect::Handler(text_arg(args, "handler").unwrap_or_default()),
            Self::Proxy => Effect::Proxy,
            Self::PassThrough => Effect::PassThrough,
            Self::EscapeBackreferences
            | Self::DiscardPathInfo
            | Self::NoCase
            | Self::NoEscape
            | Self::NoSubrequest
            | Self::QueryStringAppend
            | Self::QueryStringDiscard => return Ok(None),
        };
        Ok(Some(effect))
    }
}

fn redirect_status(name: &str) -> Result<u16, EvalError> {
    match name.to_ascii_lowercase().as_str() {
        "permanent" => Ok(301),
        "temp" => Ok(302),
        "seeother" => Ok(303),
        _ => Err(EvalError::UnknownRedirect(name.to_owned())),
    }
}

/// Cookie issued with the `CO` flag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    /// Lifetime in minutes, session cookie when unset or zero
    pub lifetime: Option<i64>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    fn from_arguments(args: &Arguments) -> Self {
        let enabled = |name: &str| {
            text_arg(args, name).is_some_and(|v| {
                ["secure", "httponly", "true", "yes", "1"]
                    .iter()
                    .any(|t| v.eq_ignore_ascii_case(t))
            })
        };
        Self {
            name: text_arg(args, "name").unwrap_or_default(),
            value: text_arg(args, "value").unwrap_or_default(),
            domain: text_arg(args, "domain").filter(|d| !d.is_empty()),
            lifetime: int_arg(args, "lifetime"),
            path: text_arg(args, "path").filter(|p| !p.is_empty()),
            secure: enabled("secure"),
            http_only: enabled("httponly"),
        }
    }
}

/// Renders the `Set-Cookie` header value.
impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(lifetime) = self.lifetime.filter(|l| *l > 0) {
            write!(f, "; Max-Age={}", lifetime.saturating_mul(60))?;
        }
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        Ok(())
    }
}

/// Side effect of a matched rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Chain,
    Last,
    End,
    Next { maximum: Option<usize> },
    Skip(usize),
    Redirect(u16),
    Status(u16),
    SetVariable { name: String, value: String },
    UnsetVariable(String),
    Cookie(Cookie),
    ContentType(String),
    Handler(String),
    Proxy,
    PassThrough,
}

/// Result of applying a single rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleOutcome {
    /// Rewritten path without query string
    pub path: String,
    pub matched: bool,
    pub effects: Vec<Effect>,
}

impl RuleOutcome {
    fn unmatched(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            matched: false,
            effects: Vec::new(),
        }
    }
}

/// Single `RewriteRule` directive.
#[derive(Clone, Debug, PartialEq)]
pub struct RewriteRule {
    pattern: CondPattern,
    /// `None` for `-`, keeping the path unchanged
    substitution: Option<FormatString>,
    flags: Flags<RuleFlag>,
    /// Compiled value of `E=name:value`
    variable_value: Option<FormatString>,
}

impl RewriteRule {
    #[inline]
    pub fn pattern(&self) -> &CondPattern {
        &self.pattern
    }

    #[inline]
    pub fn substitution(&self) -> Option<&FormatString> {
        self.substitution.as_ref()
    }

    #[inline]
    pub fn flags(&self) -> &Flags<RuleFlag> {
        &self.flags
    }

    /// Check if the rule is chained to the one following it.
    #[inline]
    pub fn is_chained(&self) -> bool {
        self.flags.contains(RuleFlag::Chain)
    }

    /// Apply the rule to `path` without guarding conditions.
    #[inline]
    pub fn apply(&self, path: &str, env: &mut Environment) -> Result<RuleOutcome, EvalError> {
        self.apply_guarded(path, std::iter::empty::<&RewriteCondition>(), env)
    }

    /// Apply the rule to `path` when its pattern matches and the given
    /// conditions hold.
    ///
    /// The pattern is matched before the conditions are evaluated so
    /// conditions may refer to the rule's backreferences. When the
    /// conditions fail the previous `$N` values are restored.
    pub fn apply_guarded<I, E>(
        &self,
        path: &str,
        conditions: I,
        env: &mut Environment,
    ) -> Result<RuleOutcome, EvalError>
    where
        I: IntoIterator<Item = E>,
        E: Evaluate,
    {
        let nocase = self.flags.contains(RuleFlag::NoCase);
        let saved = env.backreferences(Backreference::Rule);
        if !self.pattern.matches(path, nocase, env, Backreference::Rule)? {
            return Ok(RuleOutcome::unmatched(path));
        }
        if !RewriteCondition::chain(conditions, env)? {
            tracing::trace!(pattern = %self.pattern, "conditions not met");
            env.restore_backreferences(Backreference::Rule, saved);
            return Ok(RuleOutcome::unmatched(path));
        }

        let effects = self
            .flags
            .iter()
            .filter_map(|(flag, args)| flag.effect(args).transpose())
            .collect::<Result<Vec<_>, _>>()?;

        let escape = self.flags.contains(RuleFlag::EscapeBackreferences);
        let (mut path, query) = match &self.substitution {
            Some(substitution) => {
                let target = substitution.render_with(env, escape);
                match target.split_once('?') {
                    Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
                    None => (target, None),
                }
            }
            None => (path.to_owned(), None),
        };
        self.reconcile_query(query, env);

        let redirect = effects.iter().any(|e| matches!(e, Effect::Redirect(_)));
        if redirect && !self.flags.contains(RuleFlag::NoEscape) {
            path = extra::escape_redirect(&path);
        }

        for effect in &effects {
            match effect {
                Effect::SetVariable { name, .. } => {
                    let value = self
                        .variable_value
                        .as_ref()
                        .map(|value| value.render(env))
                        .unwrap_or_default();
                    env.set(Key::Variable(name.clone()), value);
                }
                Effect::UnsetVariable(name) => {
                    env.unset(&Key::Variable(name.clone()));
                }
                _ => {}
            }
        }

        tracing::debug!(pattern = %self.pattern, %path, ?effects, "rule matched");
        Ok(RuleOutcome {
            path,
            matched: true,
            effects,
        })
    }

    /// Merge a query produced by the substitution with the current
    /// `QUERY_STRING`.
    fn reconcile_query(&self, query: Option<String>, env: &mut Environment) {
        let current = match self.flags.contains(RuleFlag::QueryStringDiscard) {
            true => String::new(),
            false => env
                .variable(ServerVariable::QueryString)
                .unwrap_or("")
                .to_owned(),
        };
        let query = match query {
            Some(query) if self.flags.contains(RuleFlag::QueryStringAppend) => {
                match (query.is_empty(), current.is_empty()) {
                    (true, _) => current,
                    (_, true) => query,
                    _ => format!("{query}&{current}"),
                }
            }
            Some(query) => query,
            None => current,
        };
        env.set_variable(ServerVariable::QueryString, query);
    }
}

impl SingleLine for RewriteRule {
    const NAME: &'static str = "RewriteRule";
    const FIELDS: &'static [&'static str] = &["pattern", "substitution", "flags"];

    fn pattern() -> &'static Regex {
        &REWRITE_RULE
    }

    fn build(fields: &Fields) -> Result<Self, ParseError> {
        let pattern = CondPattern::regex(fields.require(Self::NAME, "pattern")?).map_err(
            |source| ParseError::Pattern {
                directive: Self::NAME,
                source,
            },
        )?;
        let substitution = match fields.require(Self::NAME, "substitution")? {
            "-" => None,
            s => Some(
                FormatString::from_str(s).map_err(|source| ParseError::Format {
                    directive: Self::NAME,
                    source,
                })?,
            ),
        };
        let flags = RuleFlag::find_all(fields.get("flags").unwrap_or("")).map_err(|source| {
            ParseError::Flag {
                directive: Self::NAME,
                source,
            }
        })?;
        let variable_value = flags
            .get(RuleFlag::EnvironmentVariable)
            .and_then(|args| text_arg(args, "value"))
            .map(|value| FormatString::from_str(&value))
            .transpose()
            .map_err(|source| ParseError::Format {
                directive: Self::NAME,
                source,
            })?;
        Ok(Self {
            pattern,
            substitution,
            flags,
            variable_value,
        })
    }
}

impl FromStr for RewriteRule {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match super::consume_line::<Self>(s.trim())? {
            Some((rule, _)) => Ok(rule),
            None => Err(ParseError::MissingField {
                directive: Self::NAME,
                field: "substitution",
            }),
        }
    }
}
