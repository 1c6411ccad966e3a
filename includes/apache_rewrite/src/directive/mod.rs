//! Recursive-descent parser for configuration directives.
//!
//! Single-line directives are matched with one anchored regex each.
//! Blocks match a start marker, consume permitted children until their
//! end marker and skip anything they do not recognize one character at
//! a time.
use std::collections::BTreeMap;

use regex_automata::meta::Regex;

use crate::captures::Groups;
use crate::error::ParseError;

pub mod condition;
pub mod if_module;
pub mod main_context;
pub mod rule;
pub mod simple;
pub mod virtual_host;

use condition::RewriteCondition;
use if_module::IfModule;
use rule::RewriteRule;
use simple::{RewriteEngine, ServerName};
use virtual_host::VirtualHost;

/// Parsed configuration directive.
#[derive(Clone, Debug)]
pub enum Directive {
    ServerName(ServerName),
    RewriteEngine(RewriteEngine),
    RewriteCondition(RewriteCondition),
    RewriteRule(RewriteRule),
    VirtualHost(VirtualHost),
    IfModule(IfModule),
}

impl Directive {
    #[inline]
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Self::ServerName(_) => DirectiveKind::ServerName,
            Self::RewriteEngine(_) => DirectiveKind::RewriteEngine,
            Self::RewriteCondition(_) => DirectiveKind::RewriteCondition,
            Self::RewriteRule(_) => DirectiveKind::RewriteRule,
            Self::VirtualHost(_) => DirectiveKind::VirtualHost,
            Self::IfModule(_) => DirectiveKind::IfModule,
        }
    }
}

/// Tag used to dispatch parsing of a [`Directive`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    ServerName,
    RewriteEngine,
    RewriteCondition,
    RewriteRule,
    VirtualHost,
    IfModule,
}

impl DirectiveKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::ServerName => ServerName::NAME,
            Self::RewriteEngine => RewriteEngine::NAME,
            Self::RewriteCondition => RewriteCondition::NAME,
            Self::RewriteRule => RewriteRule::NAME,
            Self::VirtualHost => VirtualHost::NAME,
            Self::IfModule => IfModule::NAME,
        }
    }

    /// Try to consume one directive of this kind from the start of `text`.
    ///
    /// Returns the directive and the remaining text, or `None` with the
    /// text untouched when it does not start with this kind.
    pub fn consume(self, text: &str) -> Result<(Option<Directive>, &str), ParseError> {
        let consumed = match self {
            Self::ServerName => wrap(consume_line::<ServerName>(text)?, Directive::ServerName),
            Self::RewriteEngine => {
                wrap(consume_line::<RewriteEngine>(text)?, Directive::RewriteEngine)
            }
            Self::RewriteCondition => wrap(
                consume_line::<RewriteCondition>(text)?,
                Directive::RewriteCondition,
            ),
            Self::RewriteRule => wrap(consume_line::<RewriteRule>(text)?, Directive::RewriteRule),
            Self::VirtualHost => wrap(consume_block::<VirtualHost>(text)?, Directive::VirtualHost),
            Self::IfModule => wrap(consume_block::<IfModule>(text)?, Directive::IfModule),
        };
        Ok(match consumed {
            Some((directive, rest)) => (Some(directive), rest),
            None => (None, text),
        })
    }
}

#[inline]
fn wrap<T>(consumed: Option<(T, &str)>, f: fn(T) -> Directive) -> Option<(Directive, &str)> {
    consumed.map(|(t, rest)| (f(t), rest))
}

/// Named fields captured from a directive's markers.
#[derive(Debug, Default)]
pub struct Fields<'h>(BTreeMap<&'static str, &'h str>);

impl<'h> Fields<'h> {
    fn collect(&mut self, names: &'static [&'static str], groups: &Groups<'h>) {
        for name in names {
            if let Some(value) = groups.name(name) {
                self.0.insert(*name, value);
            }
        }
    }

    /// Field value with surrounding double quotes removed.
    pub fn get(&self, name: &str) -> Option<&'h str> {
        self.0.get(name).map(|value| {
            value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value)
        })
    }

    pub fn require(
        &self,
        directive: &'static str,
        name: &'static str,
    ) -> Result<&'h str, ParseError> {
        self.get(name).ok_or(ParseError::MissingField {
            directive,
            field: name,
        })
    }
}

/// Directive spanning exactly one line.
pub trait SingleLine: Sized {
    const NAME: &'static str;
    /// Capture group names handed to [`SingleLine::build`]
    const FIELDS: &'static [&'static str];

    fn pattern() -> &'static Regex;

    fn build(fields: &Fields) -> Result<Self, ParseError>;
}

/// Directive wrapping child directives between start and end markers.
pub trait Block: Sized {
    const NAME: &'static str;
    /// Capture group names from both markers handed to [`Block::build`]
    const FIELDS: &'static [&'static str];
    /// Permitted children in priority order
    const INNER: &'static [DirectiveKind];
    /// Set when the block may contain itself
    const NESTS: Option<DirectiveKind> = None;

    fn start() -> &'static Regex;

    fn end() -> &'static Regex;

    fn build(fields: &Fields, children: Vec<Directive>) -> Result<Self, ParseError>;
}

pub(crate) fn consume_line<T: SingleLine>(text: &str) -> Result<Option<(T, &str)>, ParseError> {
    let Some(groups) = Groups::search(T::pattern(), text) else {
        return Ok(None);
    };
    let mut fields = Fields::default();
    fields.collect(T::FIELDS, &groups);
    let directive = T::build(&fields)?;
    tracing::trace!(directive = T::NAME, "consumed directive");
    Ok(Some((directive, text[groups.end()..].trim_start())))
}

pub(crate) fn consume_block<T: Block>(text: &str) -> Result<Option<(T, &str)>, ParseError> {
    let Some(start) = Groups::search(T::start(), text) else {
        return Ok(None);
    };
    let mut fields = Fields::default();
    fields.collect(T::FIELDS, &start);

    let mut children = Vec::new();
    let mut rest = &text[start.end()..];
    loop {
        rest = rest.trim_start();
        if let Some(end) = Groups::search(T::end(), rest) {
            fields.collect(T::FIELDS, &end);
            rest = &rest[end.end()..];
            break;
        }
        if rest.is_empty() {
            return Err(ParseError::Unterminated {
                directive: T::NAME,
                near: text.lines().next().unwrap_or("").trim().to_owned(),
            });
        }
        if rest.starts_with('#') {
            rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or("");
            continue;
        }
        match consume_child::<T>(rest)? {
            Some((child, remaining)) => {
                children.push(child);
                rest = remaining;
            }
            None => {
                let skip = rest.chars().next().map(char::len_utf8).unwrap_or(1);
                tracing::trace!(block = T::NAME, skipped = &rest[..skip], "discarding character");
                rest = &rest[skip..];
            }
        }
    }

    let block = T::build(&fields, children)?;
    tracing::trace!(directive = T::NAME, "consumed block");
    Ok(Some((block, rest.trim_start())))
}

fn consume_child<T: Block>(text: &str) -> Result<Option<(Directive, &str)>, ParseError> {
    for kind in T::INNER.iter().copied().chain(T::NESTS) {
        if let (Some(directive), rest) = kind.consume(text)? {
            return Ok(Some((directive, rest)));
        }
    }
    Ok(None)
}

/// Directives in evaluation order, with active `IfModule` blocks
/// replaced by their children.
pub fn active_directives(directives: &[Directive]) -> Vec<&Directive> {
    let mut active = Vec::with_capacity(directives.len());
    flatten(directives, &mut active);
    active
}

fn flatten<'a>(directives: &'a [Directive], dst: &mut Vec<&'a Directive>) {
    for directive in directives {
        match directive {
            Directive::IfModule(block) => {
                if block.is_active() {
                    flatten(block.children(), dst);
                }
            }
            other => dst.push(other),
        }
    }
}
