//! Bracketed flag lists such as `[NC,OR]` or `[R=301,L]`.
//!
//! Every flag enum owns a static table of definitions. A definition
//! pairs the flag with an anchored, case-insensitive pattern and the
//! parsers applied to its named groups.
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt::Debug;

use regex_automata::meta::Regex;

use crate::captures::{self, Groups};
use crate::error::FlagError;

/// Parsed flag argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Integer(i64),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Text(_) => None,
        }
    }
}

/// Named arguments captured from a single flag occurrence.
pub type Arguments = BTreeMap<&'static str, Value>;

/// Converts a captured field into a [`Value`].
pub type FieldParser = fn(&str) -> Result<Value, String>;

pub fn text(s: &str) -> Result<Value, String> {
    Ok(Value::Text(s.to_owned()))
}

pub fn integer(s: &str) -> Result<Value, String> {
    s.parse::<i64>()
        .map(Value::Integer)
        .map_err(|err| err.to_string())
}

pub fn status_code(s: &str) -> Result<Value, String> {
    let status = s.parse::<u16>().map_err(|err| err.to_string())?;
    match (100..600).contains(&status) {
        true => Ok(Value::Integer(status as i64)),
        false => Err("status code out of range".to_owned()),
    }
}

/// One row of a flag table.
pub struct FlagDefinition<K> {
    kind: K,
    pattern: Regex,
    fields: &'static [(&'static str, FieldParser)],
}

impl<K> FlagDefinition<K> {
    /// Build a definition.
    ///
    /// Panics when the pattern does not compile, tables are static.
    pub fn new(kind: K, pattern: &str, fields: &'static [(&'static str, FieldParser)]) -> Self {
        let pattern = captures::compile(pattern, true).expect("invalid flag pattern");
        Self {
            kind,
            pattern,
            fields,
        }
    }
}

/// Closed set of flags accepted by a directive.
pub trait ApacheFlag: Copy + Ord + Debug + 'static {
    /// Human readable name used in errors
    const NAME: &'static str;

    /// Definitions in matching order.
    fn definitions() -> &'static [FlagDefinition<Self>];

    /// Find the first definition matching a single flag occurrence
    /// and parse its arguments.
    fn look_up(s: &str) -> Result<(Self, Arguments), FlagError> {
        for def in Self::definitions() {
            let Some(groups) = Groups::search(&def.pattern, s) else {
                continue;
            };
            let mut arguments = Arguments::new();
            for &(field, parser) in def.fields {
                let Some(value) = groups.name(field) else {
                    continue;
                };
                let parsed = parser(value).map_err(|reason| FlagError::InvalidArgument {
                    flag: s.to_owned(),
                    field,
                    value: value.to_owned(),
                    reason,
                })?;
                arguments.insert(field, parsed);
            }
            return Ok((def.kind, arguments));
        }
        Err(FlagError::InvalidFlag {
            kind: Self::NAME,
            flag: s.to_owned(),
        })
    }

    /// Parse a comma separated flag list (without brackets).
    ///
    /// Empty segments are dropped, the last occurrence of a flag wins.
    fn find_all(s: &str) -> Result<Flags<Self>, FlagError> {
        s.split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(Self::look_up)
            .collect()
    }
}

/// Mapping of flags to the arguments they were given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Flags<K: Ord>(BTreeMap<K, Arguments>);

impl<K: Ord> Default for Flags<K> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<K: Ord> Flags<K> {
    #[inline]
    pub fn contains(&self, flag: K) -> bool {
        self.0.contains_key(&flag)
    }

    #[inline]
    pub fn get(&self, flag: K) -> Option<&Arguments> {
        self.0.get(&flag)
    }

    #[inline]
    pub fn iter(&self) -> btree_map::Iter<'_, K, Arguments> {
        self.0.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Ord> FromIterator<(K, Arguments)> for Flags<K> {
    fn from_iter<I: IntoIterator<Item = (K, Arguments)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a, K: Ord> IntoIterator for &'a Flags<K> {
    type Item = (&'a K, &'a Arguments);
    type IntoIter = btree_map::Iter<'a, K, Arguments>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
