//! Text transformations applied to configuration files before parsing.
use once_cell::sync::Lazy;
use regex_automata::meta::Regex;

use crate::captures::{self, Groups};
use crate::error::PreprocessError;

/// Maximum nesting of `Include` directives.
pub const MAX_INCLUDE_DEPTH: usize = 16;

static INCLUDE: Lazy<Regex> = Lazy::new(|| {
    captures::compile(
        r"^[ \t]*Include(?P<optional>Optional)?[ \t]+(?P<path>\S+)[ \t\r]*$",
        true,
    )
    .unwrap()
});

/// Join lines ending with a backslash with the line that follows.
pub fn join_continued_lines(text: &str) -> Result<String, PreprocessError> {
    let mut joined = String::with_capacity(text.len());
    let mut continued = false;
    for line in text.lines() {
        let line = match continued {
            true => line.trim_start(),
            false => line,
        };
        match line.trim_end().strip_suffix('\\') {
            Some(head) => {
                joined.push_str(head);
                continued = true;
            }
            None => {
                joined.push_str(line);
                joined.push('\n');
                continued = false;
            }
        }
    }
    match continued {
        true => Err(PreprocessError::DanglingContinuation),
        false => Ok(joined),
    }
}

/// Replace `Include` and `IncludeOptional` lines with the contents
/// returned by `resolver`, recursively.
///
/// A missing mandatory include is an error, a missing optional include
/// drops the line.
pub fn expand_includes<F>(text: &str, mut resolver: F) -> Result<String, PreprocessError>
where
    F: FnMut(&str) -> Option<String>,
{
    expand(text, &mut resolver, 0)
}

fn expand<F>(text: &str, resolver: &mut F, depth: usize) -> Result<String, PreprocessError>
where
    F: FnMut(&str) -> Option<String>,
{
    if depth > MAX_INCLUDE_DEPTH {
        return Err(PreprocessError::IncludeDepth(MAX_INCLUDE_DEPTH));
    }
    let mut expanded = String::with_capacity(text.len());
    for line in text.lines() {
        let Some(groups) = Groups::search(&INCLUDE, line) else {
            expanded.push_str(line);
            expanded.push('\n');
            continue;
        };
        let path = groups.name("path").unwrap_or("");
        match resolver(path) {
            Some(contents) => {
                tracing::debug!(path, depth, "expanding include");
                expanded.push_str(&expand(&contents, resolver, depth + 1)?);
            }
            None if groups.name("optional").is_some() => {
                tracing::debug!(path, "skipping missing optional include");
            }
            None => return Err(PreprocessError::MissingInclude(path.to_owned())),
        }
    }
    Ok(expanded)
}
