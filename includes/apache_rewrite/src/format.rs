//! Substitution strings used by `RewriteRule` targets and `RewriteCond`
//! test strings.
//!
//! Supports `$N` and `%N` backreferences, `${map:key|default}` lookups,
//! `%{ENV:name}` variables and `%{NAME}` server variables.
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex_automata::meta::Regex;

use crate::captures::{self, Groups};
use crate::environment::{Environment, Key, variables::ServerVariable};
use crate::error::FormatError;
use crate::extra;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    captures::compile(
        r"(?s)\\(?P<escaped>.)|\$(?P<rule>\d)|%(?P<cond>\d)|\$\{(?P<map>[\w.-]+):(?P<key>(?:%\{[^}]*\}|[^|}])*)(?:\|(?P<default>(?:%\{[^}]*\}|[^}])*))?\}|%\{ENV:(?P<env>[^}]+)\}|%\{(?P<var>[^}]*)\}",
        false,
    )
    .unwrap()
});

/// Single compiled piece of a [`FormatString`].
#[derive(Clone, Debug, PartialEq)]
pub enum Component {
    Literal(char),
    RuleBackreference(u8),
    CondBackreference(u8),
    MapExpansion {
        map: String,
        key: FormatString,
        default: Option<FormatString>,
    },
    ServerVariable(ServerVariable),
    EnvVariable(String),
}

impl Component {
    fn from_groups(groups: &Groups) -> Result<Self, FormatError> {
        if let Some(c) = groups.name("escaped").and_then(|s| s.chars().next()) {
            return Ok(Self::Literal(c));
        }
        if let Some(index) = groups.name("rule").and_then(digit) {
            return Ok(Self::RuleBackreference(index));
        }
        if let Some(index) = groups.name("cond").and_then(digit) {
            return Ok(Self::CondBackreference(index));
        }
        if let Some(map) = groups.name("map") {
            let key = FormatString::from_str(groups.name("key").unwrap_or(""))?;
            let default = groups
                .name("default")
                .map(FormatString::from_str)
                .transpose()?;
            return Ok(Self::MapExpansion {
                map: map.to_owned(),
                key,
                default,
            });
        }
        if let Some(name) = groups.name("env") {
            return Ok(Self::EnvVariable(name.to_owned()));
        }
        let name = groups.name("var").unwrap_or("");
        Ok(Self::ServerVariable(ServerVariable::from_str(name)?))
    }

    fn render_into(&self, env: &Environment, escape: bool, dst: &mut String) {
        let backreference = |key: Key, dst: &mut String| {
            let value = env.get(&key).unwrap_or("");
            match escape {
                true => dst.push_str(&extra::escape_backreference(value)),
                false => dst.push_str(value),
            }
        };
        match self {
            Self::Literal(c) => dst.push(*c),
            Self::RuleBackreference(i) => backreference(Key::RuleBackreference(*i), dst),
            Self::CondBackreference(i) => backreference(Key::CondBackreference(*i), dst),
            Self::MapExpansion { map, key, default } => {
                let key = Key::MapEntry {
                    map: map.clone(),
                    key: key.render(env),
                };
                match env.get(&key) {
                    Some(value) => dst.push_str(value),
                    None => {
                        if let Some(default) = default {
                            dst.push_str(&default.render_with(env, escape));
                        }
                    }
                }
            }
            Self::ServerVariable(var) => dst.push_str(env.variable(*var).unwrap_or("")),
            Self::EnvVariable(name) => {
                dst.push_str(env.get(&Key::Variable(name.clone())).unwrap_or(""))
            }
        }
    }
}

#[inline]
fn digit(s: &str) -> Option<u8> {
    s.parse().ok()
}

/// Compiled format string.
///
/// Immutable once parsed. Rendering never fails, unset values render
/// as the empty string.
#[derive(Clone, Debug, PartialEq)]
pub struct FormatString {
    source: String,
    components: Vec<Component>,
}

impl FormatString {
    #[inline]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Resolve every reference against the environment.
    #[inline]
    pub fn render(&self, env: &Environment) -> String {
        self.render_with(env, false)
    }

    /// Resolve every reference, optionally percent-escaping
    /// backreference values.
    pub fn render_with(&self, env: &Environment, escape_backreferences: bool) -> String {
        let mut dst = String::with_capacity(self.source.len());
        for component in &self.components {
            component.render_into(env, escape_backreferences, &mut dst);
        }
        dst
    }
}

impl FromStr for FormatString {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut components = Vec::new();
        let mut rest = s;
        while let Some(c) = rest.chars().next() {
            if let Some(groups) = Groups::search(&TOKEN, rest) {
                components.push(Component::from_groups(&groups)?);
                rest = &rest[groups.end()..];
                continue;
            }
            if rest.starts_with("${") {
                let end = rest.find('}').unwrap_or(rest.len());
                return Err(FormatError::InvalidMapExpansion(rest[2..end].to_owned()));
            }
            components.push(Component::Literal(c));
            rest = &rest[c.len_utf8()..];
        }
        Ok(Self {
            source: s.to_owned(),
            components,
        })
    }
}

impl fmt::Display for FormatString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
