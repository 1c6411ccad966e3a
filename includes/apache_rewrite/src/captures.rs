//! Thin layer over [`regex_automata`] shared by every grammar in the crate.
//!
//! All matching is anchored at the start of the haystack.
use regex_automata::{
    Anchored, Input, MatchKind,
    meta::{self, BuildError, Regex},
    util::{self, captures::Captures},
};

/// Compile a pattern with the engine settings used across the crate.
pub(crate) fn compile(pattern: &str, nocase: bool) -> Result<Regex, BuildError> {
    Regex::builder()
        .configure(
            meta::Config::new()
                .nfa_size_limit(Some(10 * (1 << 20)))
                .hybrid_cache_capacity(2 * (1 << 20))
                .match_kind(MatchKind::LeftmostFirst)
                .utf8_empty(true),
        )
        .syntax(util::syntax::Config::new().case_insensitive(nocase))
        .build(pattern)
}

/// Capture groups of a successful anchored match.
pub(crate) struct Groups<'h> {
    caps: Captures,
    haystack: &'h str,
}

impl<'h> Groups<'h> {
    /// Match `regex` at the start of `haystack`.
    pub fn search(regex: &Regex, haystack: &'h str) -> Option<Self> {
        let mut caps = regex.create_captures();
        let input = Input::new(haystack).anchored(Anchored::Yes);
        regex.search_captures(&input, &mut caps);
        caps.is_match().then_some(Self { caps, haystack })
    }

    /// Byte offset just past the overall match.
    #[inline]
    pub fn end(&self) -> usize {
        self.caps.get_match().map(|m| m.end()).unwrap_or(0)
    }

    #[inline]
    pub fn name(&self, name: &str) -> Option<&'h str> {
        self.caps.get_group_by_name(name).map(|s| &self.haystack[s])
    }

    /// Every group by index, `None` for groups that did not participate.
    pub fn all(&self) -> Vec<Option<&'h str>> {
        (0..self.caps.group_len())
            .map(|i| self.caps.get_group(i).map(|s| &self.haystack[s]))
            .collect()
    }
}
