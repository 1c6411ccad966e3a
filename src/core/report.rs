use std::collections::BTreeMap;
use std::fmt;

use apache_rewrite::{Evaluation, Rewrite, error::EvalError};
use serde::Serialize;

use super::configuration::{Expectation, RequestCase};

/// Result of a single request case, printed as text or serialized to json.
#[derive(Serialize, Debug)]
pub struct Report {
    pub name: String,
    pub method: String,
    pub uri: String,
    /// Scope that handled the request
    pub host: Option<String>,
    pub server_name: Option<String>,
    pub kind: &'static str,
    pub target: Option<String>,
    pub status: Option<u16>,
    pub cookies: Vec<String>,
    pub content_type: Option<String>,
    pub handler: Option<String>,
    pub proxy: bool,
    pub passthrough: bool,
    pub variables: BTreeMap<String, String>,
    pub error: Option<String>,
    pub checked: bool,
    pub failures: Vec<String>,
}

fn kind(rewrite: &Rewrite) -> &'static str {
    match rewrite {
        Rewrite::Uri(_) => "uri",
        Rewrite::EndUri(_) => "end",
        Rewrite::Redirect(..) => "redirect",
        Rewrite::StatusCode(_) => "status",
    }
}

impl Report {
    pub fn new(case: &RequestCase, result: Result<Evaluation, EvalError>) -> Self {
        let mut report = Self {
            name: case.label(),
            method: case.method().to_owned(),
            uri: case.uri.clone(),
            host: None,
            server_name: None,
            kind: "error",
            target: None,
            status: None,
            cookies: Vec::new(),
            content_type: None,
            handler: None,
            proxy: false,
            passthrough: false,
            variables: BTreeMap::new(),
            error: None,
            checked: case.expect.is_some(),
            failures: Vec::new(),
        };

        let evaluation = match result {
            Ok(evaluation) => evaluation,
            Err(err) => {
                report.error = Some(err.to_string());
                report.failures.push(format!("evaluation failed: {err}"));
                return report;
            }
        };

        let outcome = evaluation.outcome;
        report.kind = kind(&outcome.rewrite);
        report.target = outcome.rewrite.uri().map(str::to_owned);
        report.status = outcome.rewrite.status();
        report.cookies = outcome.cookies.iter().map(ToString::to_string).collect();
        report.content_type = outcome.content_type;
        report.handler = outcome.handler;
        report.proxy = outcome.proxy;
        report.passthrough = outcome.passthrough;
        report.variables = evaluation.variables;
        report.host = Some(evaluation.host);
        report.server_name = evaluation.server_name;
        if let Some(expect) = &case.expect {
            report.failures = report.check(expect);
        }
        report
    }

    fn check(&self, expect: &Expectation) -> Vec<String> {
        let mut failures = Vec::new();
        if expect.uri.is_some() && self.target != expect.uri {
            failures.push(format!("expected uri {:?}, got {:?}", expect.uri, self.target));
        }
        if expect.status.is_some() && self.status != expect.status {
            failures.push(format!("expected status {:?}, got {:?}", expect.status, self.status));
        }
        if expect.host.is_some() && self.host != expect.host {
            failures.push(format!("expected host {:?}, got {:?}", expect.host, self.host));
        }
        failures
    }

    #[inline]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = match (self.passed(), self.checked) {
            (false, _) => "FAIL",
            (true, true) => "ok",
            (true, false) => "--",
        };
        write!(f, "[{mark}] {} -> ", self.name)?;
        match (&self.error, self.status, &self.target) {
            (Some(err), _, _) => write!(f, "error: {err}")?,
            (None, Some(status), Some(target)) => write!(f, "{} {status} {target}", self.kind)?,
            (None, Some(status), None) => write!(f, "{} {status}", self.kind)?,
            (None, None, target) => {
                write!(f, "{} {}", self.kind, target.as_deref().unwrap_or(""))?
            }
        }
        if let Some(host) = &self.host {
            write!(f, " ({host})")?;
        }
        for cookie in &self.cookies {
            write!(f, "\n    set-cookie: {cookie}")?;
        }
        if let Some(content_type) = &self.content_type {
            write!(f, "\n    content-type: {content_type}")?;
        }
        if let Some(handler) = &self.handler {
            write!(f, "\n    handler: {handler}")?;
        }
        if self.proxy {
            f.write_str("\n    proxied")?;
        }
        for (name, value) in &self.variables {
            write!(f, "\n    env {name}={value}")?;
        }
        for failure in &self.failures {
            write!(f, "\n    {failure}")?;
        }
        Ok(())
    }
}
