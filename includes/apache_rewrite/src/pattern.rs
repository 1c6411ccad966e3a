//! `CondPattern` grammar shared by `RewriteCond` and `RewriteRule`.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex_automata::meta::Regex;
use unicase::UniCase;

use crate::captures::{self, Groups};
use crate::environment::{Backreference, Environment};
use crate::error::{EvalError, PatternError};

static INTEGRAL: Lazy<Regex> = Lazy::new(|| {
    captures::compile(
        r"^(?P<negated>!?)-(?P<op>eq|ne|lt|le|gt|ge)\s*(?P<body>[+-]?\d+)$",
        false,
    )
    .unwrap()
});

static LEXICAL: Lazy<Regex> = Lazy::new(|| {
    captures::compile(r"(?s)^(?P<negated>!?)(?P<op><=|>=|<|>|=)(?P<body>.*)$", false).unwrap()
});

/// Comparison operator of lexicographical and integral patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Operator {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "=" | "eq" => Self::Equal,
            "ne" => Self::NotEqual,
            "<" | "lt" => Self::Less,
            "<=" | "le" => Self::LessOrEqual,
            ">" | "gt" => Self::Greater,
            ">=" | "ge" => Self::GreaterOrEqual,
            _ => return None,
        })
    }

    /// Check if the ordering of `input` against the operand satisfies
    /// the operator.
    #[inline]
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Equal => ordering.is_eq(),
            Self::NotEqual => ordering.is_ne(),
            Self::Less => ordering.is_lt(),
            Self::LessOrEqual => ordering.is_le(),
            Self::Greater => ordering.is_gt(),
            Self::GreaterOrEqual => ordering.is_ge(),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            Self::Equal => "-eq",
            Self::NotEqual => "-ne",
            Self::Less => "-lt",
            Self::LessOrEqual => "-le",
            Self::Greater => "-gt",
            Self::GreaterOrEqual => "-ge",
        }
    }
}

/// Compiled condition pattern.
///
/// Parsing tries integer comparisons first, then lexicographical
/// comparisons and falls back to a regular expression.
#[derive(Clone, Debug)]
pub enum CondPattern {
    Regex {
        negated: bool,
        source: String,
        compiled: Regex,
        /// Case-insensitive variant used under `NC`
        insensitive: Regex,
    },
    Lexicographical {
        negated: bool,
        op: Operator,
        body: String,
    },
    Integral {
        negated: bool,
        op: Operator,
        body: i64,
    },
}

impl CondPattern {
    /// Build a regex pattern, ignoring the comparison grammars.
    ///
    /// Used for `RewriteRule` patterns where `<` or `-eq` carry no
    /// special meaning.
    pub fn regex(s: &str) -> Result<Self, PatternError> {
        let (negated, source) = match s.strip_prefix('!') {
            Some(source) => (true, source),
            None => (false, s),
        };
        let compile = |nocase| {
            captures::compile(source, nocase).map_err(|err| PatternError::InvalidRegex {
                pattern: source.to_owned(),
                reason: err.to_string(),
            })
        };
        Ok(Self::Regex {
            negated,
            source: source.to_owned(),
            compiled: compile(false)?,
            insensitive: compile(true)?,
        })
    }

    #[inline]
    pub fn is_negated(&self) -> bool {
        match self {
            Self::Regex { negated, .. }
            | Self::Lexicographical { negated, .. }
            | Self::Integral { negated, .. } => *negated,
        }
    }

    /// Test `input` against the pattern.
    ///
    /// A successful, non-negated regex match replaces the backreferences
    /// of the given kind. Every other outcome leaves the environment
    /// untouched.
    pub fn matches(
        &self,
        input: &str,
        nocase: bool,
        env: &mut Environment,
        kind: Backreference,
    ) -> Result<bool, EvalError> {
        match self {
            Self::Regex {
                negated,
                compiled,
                insensitive,
                ..
            } => {
                let regex = match nocase {
                    true => insensitive,
                    false => compiled,
                };
                let Some(groups) = Groups::search(regex, input) else {
                    return Ok(*negated);
                };
                if !negated {
                    env.update_backreferences(kind, &groups.all());
                }
                Ok(!negated)
            }
            Self::Lexicographical { negated, op, body } => {
                let ordering = match nocase {
                    true => UniCase::new(input).cmp(&UniCase::new(body.as_str())),
                    false => input.cmp(body.as_str()),
                };
                Ok(op.holds(ordering) != *negated)
            }
            Self::Integral { negated, op, body } => {
                let value = input
                    .trim()
                    .parse::<i64>()
                    .map_err(|source| EvalError::NotAnInteger {
                        value: input.to_owned(),
                        source,
                    })?;
                Ok(op.holds(value.cmp(body)) != *negated)
            }
        }
    }
}

impl FromStr for CondPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PatternError::Empty);
        }
        if let Some(groups) = Groups::search(&INTEGRAL, s) {
            let body = groups.name("body").unwrap_or("");
            return Ok(Self::Integral {
                negated: groups.name("negated").is_some_and(|n| !n.is_empty()),
                op: groups
                    .name("op")
                    .and_then(Operator::parse)
                    .ok_or_else(|| PatternError::InvalidInteger(s.to_owned()))?,
                body: body
                    .parse()
                    .map_err(|_| PatternError::InvalidInteger(body.to_owned()))?,
            });
        }
        if let Some(groups) = Groups::search(&LEXICAL, s) {
            return Ok(Self::Lexicographical {
                negated: groups.name("negated").is_some_and(|n| !n.is_empty()),
                op: groups
                    .name("op")
                    .and_then(Operator::parse)
                    .unwrap_or(Operator::Equal),
                body: groups.name("body").unwrap_or("").to_owned(),
            });
        }
        Self::regex(s)
    }
}

impl PartialEq for CondPattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Regex {
                    negated: n1,
                    source: s1,
                    ..
                },
                Self::Regex {
                    negated: n2,
                    source: s2,
                    ..
                },
            ) => n1 == n2 && s1 == s2,
            (
                Self::Lexicographical {
                    negated: n1,
                    op: o1,
                    body: b1,
                },
                Self::Lexicographical {
                    negated: n2,
                    op: o2,
                    body: b2,
                },
            ) => n1 == n2 && o1 == o2 && b1 == b2,
            (
                Self::Integral {
                    negated: n1,
                    op: o1,
                    body: b1,
                },
                Self::Integral {
                    negated: n2,
                    op: o2,
                    body: b2,
                },
            ) => n1 == n2 && o1 == o2 && b1 == b2,
            _ => false,
        }
    }
}

impl fmt::Display for CondPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negated() {
            f.write_str("!")?;
        }
        match self {
            Self::Regex { source, .. } => f.write_str(source),
            Self::Lexicographical { op, body, .. } => write!(f, "{}{body}", op.symbol()),
            Self::Integral { op, body, .. } => write!(f, "{} {body}", op.mnemonic()),
        }
    }
}
