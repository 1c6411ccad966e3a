use once_cell::sync::Lazy;
use regex_automata::meta::Regex;

use super::{Block, Directive, DirectiveKind, Fields};
use crate::captures;
use crate::error::ParseError;

/// Modules treated as loaded when evaluating `<IfModule>` blocks.
pub const LOADED_MODULES: &[&str] = &[
    "mod_rewrite.c",
    "rewrite_module",
    "core.c",
    "mod_alias.c",
    "alias_module",
];

static START: Lazy<Regex> = Lazy::new(|| {
    captures::compile(
        r"<(?i:IfModule)[ \t]+(?P<negated>!?)(?P<module>[^>\s]+)[ \t]*>",
        false,
    )
    .unwrap()
});

static END: Lazy<Regex> =
    Lazy::new(|| captures::compile(r"</(?i:IfModule)[ \t]*>", false).unwrap());

/// `<IfModule [!]module>` block, may contain itself.
#[derive(Clone, Debug)]
pub struct IfModule {
    negated: bool,
    module: String,
    children: Vec<Directive>,
}

impl IfModule {
    #[inline]
    pub fn module(&self) -> &str {
        &self.module
    }

    #[inline]
    pub fn children(&self) -> &[Directive] {
        &self.children
    }

    /// Check if the block's children take part in evaluation.
    #[inline]
    pub fn is_active(&self) -> bool {
        LOADED_MODULES.contains(&self.module.as_str()) != self.negated
    }
}

impl Block for IfModule {
    const NAME: &'static str = "IfModule";
    const FIELDS: &'static [&'static str] = &["negated", "module"];
    const INNER: &'static [DirectiveKind] = &[
        DirectiveKind::VirtualHost,
        DirectiveKind::RewriteCondition,
        DirectiveKind::RewriteRule,
        DirectiveKind::RewriteEngine,
        DirectiveKind::ServerName,
    ];
    const NESTS: Option<DirectiveKind> = Some(DirectiveKind::IfModule);

    fn start() -> &'static Regex {
        &START
    }

    fn end() -> &'static Regex {
        &END
    }

    fn build(fields: &Fields, children: Vec<Directive>) -> Result<Self, ParseError> {
        Ok(Self {
            negated: fields.get("negated").is_some_and(|n| !n.is_empty()),
            module: fields.require(Self::NAME, "module")?.to_owned(),
            children,
        })
    }
}
