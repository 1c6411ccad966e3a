//! `RewriteCond TestString CondPattern [flags]`
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex_automata::meta::Regex;

use super::{Fields, SingleLine};
use crate::captures;
use crate::environment::{Backreference, Environment};
use crate::error::{EvalError, ParseError};
use crate::flags::{ApacheFlag, FlagDefinition, Flags};
use crate::format::FormatString;
use crate::pattern::CondPattern;

static REWRITE_COND: Lazy<Regex> = Lazy::new(|| {
    captures::compile(
        r#"(?i:RewriteCond)[ \t]+(?P<test_string>"[^"]*"|\S+)[ \t]+(?P<cond_pattern>!?-(?:eq|ne|lt|le|gt|ge)[ \t]+[+-]?\d+|"[^"]*"|\S+)(?:[ \t]+\[(?P<flags>[^\]\r\n]*)\])?[ \t\r]*(?m:$)"#,
        false,
    )
    .unwrap()
});

static CONDITION_FLAGS: Lazy<Vec<FlagDefinition<ConditionFlag>>> = Lazy::new(|| {
    vec![
        FlagDefinition::new(ConditionFlag::NoCase, r"^(?:NC|nocase)$", &[]),
        FlagDefinition::new(ConditionFlag::OrNext, r"^(?:OR|ornext)$", &[]),
        FlagDefinition::new(ConditionFlag::NoVary, r"^(?:NV|novary)$", &[]),
    ]
});

/// Flags accepted by `RewriteCond`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConditionFlag {
    NoCase,
    OrNext,
    NoVary,
}

impl ApacheFlag for ConditionFlag {
    const NAME: &'static str = "ConditionFlag";

    fn definitions() -> &'static [FlagDefinition<Self>] {
        CONDITION_FLAGS.as_slice()
    }
}

/// Anything that can take part in a condition chain.
pub trait Evaluate {
    fn evaluate(&self, env: &mut Environment) -> Result<bool, EvalError>;

    /// Whether a failure defers to the next condition.
    fn or_next(&self) -> bool;
}

impl<T: Evaluate + ?Sized> Evaluate for &T {
    #[inline]
    fn evaluate(&self, env: &mut Environment) -> Result<bool, EvalError> {
        (**self).evaluate(env)
    }

    #[inline]
    fn or_next(&self) -> bool {
        (**self).or_next()
    }
}

/// Single `RewriteCond` directive.
#[derive(Clone, Debug, PartialEq)]
pub struct RewriteCondition {
    test_string: FormatString,
    pattern: CondPattern,
    flags: Flags<ConditionFlag>,
}

impl RewriteCondition {
    #[inline]
    pub fn test_string(&self) -> &FormatString {
        &self.test_string
    }

    #[inline]
    pub fn pattern(&self) -> &CondPattern {
        &self.pattern
    }

    #[inline]
    pub fn flags(&self) -> &Flags<ConditionFlag> {
        &self.flags
    }

    /// Evaluate an ordered chain of conditions.
    ///
    /// An `OR` condition that holds makes the whole chain hold, one that
    /// fails defers to the next condition. Any other failing condition
    /// fails the chain. An empty chain holds.
    pub fn chain<I, E>(conditions: I, env: &mut Environment) -> Result<bool, EvalError>
    where
        I: IntoIterator<Item = E>,
        E: Evaluate,
    {
        let mut result = true;
        for condition in conditions {
            result = condition.evaluate(env)?;
            match (condition.or_next(), result) {
                (true, true) => return Ok(true),
                (false, false) => return Ok(false),
                _ => {}
            }
        }
        Ok(result)
    }
}

impl Evaluate for RewriteCondition {
    fn evaluate(&self, env: &mut Environment) -> Result<bool, EvalError> {
        let input = self.test_string.render(env);
        let nocase = self.flags.contains(ConditionFlag::NoCase);
        let result = self
            .pattern
            .matches(&input, nocase, env, Backreference::Condition)?;
        tracing::trace!(test_string = %self.test_string, %input, pattern = %self.pattern, result, "evaluated condition");
        Ok(result)
    }

    #[inline]
    fn or_next(&self) -> bool {
        self.flags.contains(ConditionFlag::OrNext)
    }
}

impl SingleLine for RewriteCondition {
    const NAME: &'static str = "RewriteCond";
    const FIELDS: &'static [&'static str] = &["test_string", "cond_pattern", "flags"];

    fn pattern() -> &'static Regex {
        &REWRITE_COND
    }

    fn build(fields: &Fields) -> Result<Self, ParseError> {
        let test_string = FormatString::from_str(fields.require(Self::NAME, "test_string")?)
            .map_err(|source| ParseError::Format {
                directive: Self::NAME,
                source,
            })?;
        let pattern = CondPattern::from_str(fields.require(Self::NAME, "cond_pattern")?)
            .map_err(|source| ParseError::Pattern {
                directive: Self::NAME,
                source,
            })?;
        let flags = ConditionFlag::find_all(fields.get("flags").unwrap_or("")).map_err(
            |source| ParseError::Flag {
                directive: Self::NAME,
                source,
            },
        )?;
        Ok(Self {
            test_string,
            pattern,
            flags,
        })
    }
}

impl FromStr for RewriteCondition {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match super::consume_line::<Self>(s.trim())? {
            Some((condition, _)) => Ok(condition),
            None => Err(ParseError::MissingField {
                directive: Self::NAME,
                field: "cond_pattern",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::environment::Key;
    use crate::environment::variables::ServerVariable;
    use crate::error::FlagError;
    use crate::pattern::Operator;

    struct FakeCondition {
        result: bool,
        or_next: bool,
        calls: Cell<usize>,
    }

    impl FakeCondition {
        fn new(result: bool, or_next: bool) -> Self {
            Self {
                result,
                or_next,
                calls: Cell::new(0),
            }
        }
    }

    impl Evaluate for FakeCondition {
        fn evaluate(&self, _env: &mut Environment) -> Result<bool, EvalError> {
            self.calls.set(self.calls.get() + 1);
            Ok(self.result)
        }

        fn or_next(&self) -> bool {
            self.or_next
        }
    }

    fn chain(conditions: &[FakeCondition]) -> bool {
        RewriteCondition::chain(conditions, &mut Environment::default()).unwrap()
    }

    #[test]
    fn test_empty_chain() {
        assert!(chain(&[]));
    }

    #[test]
    fn test_or_short_circuits() {
        let conditions = [
            FakeCondition::new(true, true),
            FakeCondition::new(false, false),
        ];
        assert!(chain(&conditions));
        assert_eq!(conditions[0].calls.get(), 1);
        assert_eq!(conditions[1].calls.get(), 0);
    }

    #[test]
    fn test_or_defers() {
        let conditions = [
            FakeCondition::new(false, true),
            FakeCondition::new(true, false),
        ];
        assert!(chain(&conditions));
        assert_eq!(conditions[1].calls.get(), 1);

        let conditions = [
            FakeCondition::new(false, true),
            FakeCondition::new(false, true),
        ];
        assert!(!chain(&conditions));
    }

    #[test]
    fn test_and_fails_fast() {
        let conditions = [
            FakeCondition::new(true, false),
            FakeCondition::new(false, false),
            FakeCondition::new(true, false),
        ];
        assert!(!chain(&conditions));
        assert_eq!(conditions[2].calls.get(), 0);
    }

    #[test]
    fn test_parse() {
        let condition =
            RewriteCondition::from_str(r#"RewriteCond %{HTTP_HOST} "!^www\.example\.com$" [NC,OR]"#)
                .unwrap();
        assert_eq!(condition.test_string().as_str(), "%{HTTP_HOST}");
        assert!(condition.pattern().is_negated());
        assert!(condition.flags().contains(ConditionFlag::NoCase));
        assert!(condition.or_next());

        let condition = RewriteCondition::from_str("rewritecond %{SERVER_PORT} !-eq 80").unwrap();
        assert_eq!(
            condition.pattern(),
            &CondPattern::Integral {
                negated: true,
                op: Operator::Equal,
                body: 80
            }
        );
        assert!(condition.flags().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            RewriteCondition::from_str("RewriteCond %{NOPE} ^a"),
            Err(ParseError::Format { directive: "RewriteCond", .. })
        ));
        assert!(matches!(
            RewriteCondition::from_str("RewriteCond %{HTTP_HOST} ^(a"),
            Err(ParseError::Pattern { .. })
        ));
        assert_eq!(
            RewriteCondition::from_str("RewriteCond %{HTTP_HOST} ^a [XX]"),
            Err(ParseError::Flag {
                directive: "RewriteCond",
                source: FlagError::InvalidFlag {
                    kind: "ConditionFlag",
                    flag: "XX".into()
                }
            })
        );
    }

    #[test]
    fn test_evaluate() {
        let condition = RewriteCondition::from_str("RewriteCond %{HTTP_HOST} ^(www\\.)?(.+)$ [NC]").unwrap();
        let mut env = Environment::default();
        env.set_variable(ServerVariable::HttpHost, "WWW.Example.com");
        assert!(condition.evaluate(&mut env).unwrap());
        assert_eq!(env.get(&Key::CondBackreference(2)), Some("Example.com"));

        let condition = RewriteCondition::from_str("RewriteCond %{HTTP_HOST} !^www\\.").unwrap();
        assert!(condition.evaluate(&mut env).unwrap());
        assert_eq!(env.get(&Key::CondBackreference(2)), Some("Example.com"));
    }
}
