use std::num::ParseIntError;

use thiserror::Error;

/// Errors when parsing a bracketed flag list
#[derive(Debug, Error, PartialEq)]
pub enum FlagError {
    #[error("{flag:?} is not a valid {kind}")]
    InvalidFlag { kind: &'static str, flag: String },

    #[error("Invalid {field} argument {value:?} in flag {flag:?}: {reason}")]
    InvalidArgument {
        flag: String,
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors when compiling a `CondPattern` or rule pattern
#[derive(Debug, Error, PartialEq)]
pub enum PatternError {
    #[error("Invalid regex {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Invalid integer operand {0:?}")]
    InvalidInteger(String),

    #[error("Empty pattern")]
    Empty,
}

/// Errors when compiling a format string
#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("Unknown server variable %{{{0}}}")]
    UnknownVariable(String),

    #[error("Invalid map expansion ${{{0}}}")]
    InvalidMapExpansion(String),
}

/// Errors when parsing configuration text into directives
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("Unterminated {directive} block starting at {near:?}")]
    Unterminated {
        directive: &'static str,
        near: String,
    },

    #[error("Missing {field} in {directive}")]
    MissingField {
        directive: &'static str,
        field: &'static str,
    },

    #[error("Invalid {field} {value:?} in {directive}")]
    InvalidField {
        directive: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Invalid flags in {directive}")]
    Flag {
        directive: &'static str,
        #[source]
        source: FlagError,
    },

    #[error("Invalid pattern in {directive}")]
    Pattern {
        directive: &'static str,
        #[source]
        source: PatternError,
    },

    #[error("Invalid format string in {directive}")]
    Format {
        directive: &'static str,
        #[source]
        source: FormatError,
    },
}

/// Errors when evaluating a request against parsed directives
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("Integer comparison against non-numeric value {value:?}")]
    NotAnInteger {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Too many iterations on rule processing. Infinite loop")]
    TooManyIterations,

    #[error("Unknown redirect status name {0:?}")]
    UnknownRedirect(String),
}

/// Errors when building a request from raw http text
#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("Request text is empty")]
    Empty,

    #[error("Invalid request line {0:?}")]
    InvalidRequestLine(String),

    #[error("Invalid header line {0:?}")]
    InvalidHeader(String),
}

/// Errors when preprocessing configuration text
#[derive(Debug, Error, PartialEq)]
pub enum PreprocessError {
    #[error("Ended on a continued line")]
    DanglingContinuation,

    #[error("Included file {0:?} could not be found")]
    MissingInclude(String),

    #[error("Includes nested deeper than {0} levels")]
    IncludeDepth(usize),
}
