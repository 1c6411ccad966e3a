//! Per-request key/value store that format strings are resolved against.
//!
//! Holds rule and condition backreferences, server variables seeded from
//! the request, map tables and variables assigned with the `E` rule flag.
use std::collections::{BTreeMap, HashMap};

pub mod context;
pub mod variables;

use context::{Request, Server};
use variables::ServerVariable;

/// Backreferences are tracked for indices `0..MAXIMUM_INDEX`.
pub const MAXIMUM_INDEX: u8 = 10;

/// Which kind of match produced a set of backreferences.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backreference {
    /// `$N`, groups captured by a `RewriteRule` pattern
    Rule,
    /// `%N`, groups captured by the last matching `RewriteCond`
    Condition,
}

impl Backreference {
    #[inline]
    pub fn key(self, index: u8) -> Key {
        match self {
            Self::Rule => Key::RuleBackreference(index),
            Self::Condition => Key::CondBackreference(index),
        }
    }
}

/// Typed key into an [`Environment`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    RuleBackreference(u8),
    CondBackreference(u8),
    ServerVariable(ServerVariable),
    MapEntry { map: String, key: String },
    Variable(String),
}

/// Mutable evaluation state for a single request.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    values: HashMap<Key, String>,
}

impl Environment {
    /// Build an environment seeded from the request and server
    /// descriptions. See [`Environment::seed`].
    pub fn new(request: &Request, server: &Server) -> Self {
        let mut env = Self::default();
        env.seed(request, server);
        env
    }

    #[inline]
    pub fn get(&self, key: &Key) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    #[inline]
    pub fn set<S: Into<String>>(&mut self, key: Key, value: S) {
        self.values.insert(key, value.into());
    }

    #[inline]
    pub fn unset(&mut self, key: &Key) -> Option<String> {
        self.values.remove(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Shorthand for looking up a server variable.
    #[inline]
    pub fn variable(&self, var: ServerVariable) -> Option<&str> {
        self.get(&Key::ServerVariable(var))
    }

    /// Shorthand for assigning a server variable.
    #[inline]
    pub fn set_variable<S: Into<String>>(&mut self, var: ServerVariable, value: S) {
        self.set(Key::ServerVariable(var), value);
    }

    /// Register every entry of a `${map:key}` lookup table.
    pub fn insert_map<I, K, V>(&mut self, map: &str, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in entries {
            let key = Key::MapEntry {
                map: map.to_owned(),
                key: key.into(),
            };
            self.set(key, value);
        }
    }

    /// Variables assigned through the `E` rule flag.
    pub fn variables(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .filter_map(|(k, v)| match k {
                Key::Variable(name) => Some((name.clone(), v.clone())),
                _ => None,
            })
            .collect()
    }

    /// Replace backreferences of the given kind with the groups of a
    /// successful match.
    ///
    /// Index `i` receives `groups[i]` (empty when the group did not
    /// participate). Backreferences beyond the last group are cleared
    /// up to the first index that was not set, since a match with fewer
    /// groups invalidates all higher ones.
    pub fn update_backreferences(&mut self, kind: Backreference, groups: &[Option<&str>]) {
        for index in 0..MAXIMUM_INDEX {
            let key = kind.key(index);
            match groups.get(index as usize) {
                Some(group) => self.set(key, group.unwrap_or("")),
                None => {
                    if self.unset(&key).is_none() {
                        break;
                    }
                }
            }
        }
    }

    /// Current backreferences of the given kind, by index.
    pub fn backreferences(&self, kind: Backreference) -> Vec<Option<String>> {
        (0..MAXIMUM_INDEX)
            .map(|index| self.get(&kind.key(index)).map(str::to_owned))
            .collect()
    }

    /// Put back backreferences taken with [`Environment::backreferences`].
    pub fn restore_backreferences(&mut self, kind: Backreference, saved: Vec<Option<String>>) {
        for (index, value) in (0..MAXIMUM_INDEX).zip(saved) {
            match value {
                Some(value) => self.set(kind.key(index), value),
                None => {
                    self.unset(&kind.key(index));
                }
            }
        }
    }

    /// Populate server variables from the request and server descriptions
    /// along with the current local time.
    pub fn seed(&mut self, request: &Request, server: &Server) {
        request.fill(self);
        server.fill(self, request);
        context::DateCtx::now().fill(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backrefs(env: &Environment, kind: Backreference) -> Vec<(u8, String)> {
        (0..MAXIMUM_INDEX)
            .filter_map(|i| env.get(&kind.key(i)).map(|v| (i, v.to_owned())))
            .collect()
    }

    #[test]
    fn test_sets_properly() {
        let mut env = Environment::default();
        env.update_backreferences(Backreference::Rule, &[Some("a"), Some("b"), Some("c")]);
        assert_eq!(env.len(), 3);
        assert_eq!(
            backrefs(&env, Backreference::Rule),
            vec![(0, "a".into()), (1, "b".into()), (2, "c".into())]
        );
    }

    #[test]
    fn test_unsets_expectedly() {
        let mut env = Environment::default();
        let ten: Vec<String> = "abcdefghij".chars().map(String::from).collect();
        let ten: Vec<Option<&str>> = ten.iter().map(|s| Some(s.as_str())).collect();
        env.update_backreferences(Backreference::Condition, &ten);
        assert_eq!(env.len(), 10);

        env.update_backreferences(Backreference::Condition, &[Some("w"), Some("x"), None, Some("z")]);
        assert_eq!(
            backrefs(&env, Backreference::Condition),
            vec![
                (0, "w".into()),
                (1, "x".into()),
                (2, "".into()),
                (3, "z".into())
            ]
        );
        assert_eq!(env.len(), 4);
    }

    #[test]
    fn test_kinds_are_distinct() {
        let mut env = Environment::default();
        let groups = [Some("a"), Some("b"), Some("c"), Some("d")];
        env.update_backreferences(Backreference::Rule, &groups);
        env.update_backreferences(Backreference::Condition, &groups);
        assert_eq!(env.len(), 8);

        env.update_backreferences(Backreference::Rule, &[Some("x")]);
        assert_eq!(backrefs(&env, Backreference::Rule).len(), 1);
        assert_eq!(backrefs(&env, Backreference::Condition).len(), 4);
    }

    #[test]
    fn test_restore_backreferences() {
        let mut env = Environment::default();
        env.update_backreferences(Backreference::Rule, &[Some("a"), Some("b")]);
        let saved = env.backreferences(Backreference::Rule);

        env.update_backreferences(Backreference::Rule, &[Some("x"), Some("y"), Some("z")]);
        env.restore_backreferences(Backreference::Rule, saved);
        assert_eq!(
            backrefs(&env, Backreference::Rule),
            vec![(0, "a".into()), (1, "b".into())]
        );
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_maps_and_variables() {
        let mut env = Environment::default();
        env.insert_map("users", [("bob", "/home/bob")]);
        env.set(Key::Variable("seen".into()), "1");
        let key = Key::MapEntry {
            map: "users".into(),
            key: "bob".into(),
        };
        assert_eq!(env.get(&key), Some("/home/bob"));
        assert_eq!(env.variables().get("seen").map(|s| s.as_str()), Some("1"));
        assert_eq!(env.unset(&Key::Variable("seen".into())), Some("1".into()));
        assert!(env.variables().is_empty());
    }
}
