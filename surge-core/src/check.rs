use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;
use surge_http::HttpResponse;
use surge_value::{Session, Value};

use crate::compare::CompareOp;
use crate::error::{Error, Result};
use crate::json_path::{JsonPath, stringify};
use crate::template::Template;

#[derive(Debug, Clone, PartialEq)]
pub enum CheckKind {
    Status(u16),
    /// The path resolves to at least one node; `null` counts as present.
    Exists(JsonPath),
    /// The first node, stringified, equals the rendered template.
    Equals(JsonPath, Template),
    /// The first node is an array whose length satisfies `op bound`.
    Count(JsonPath, CompareOp, u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub kind: CheckKind,
    pub save_as: Option<Arc<str>>,
}

impl Check {
    pub fn status(expected: u16) -> Self {
        Self::from(CheckKind::Status(expected))
    }

    pub fn exists(path: &str) -> Result<Self> {
        Ok(Self::from(CheckKind::Exists(JsonPath::parse(path)?)))
    }

    pub fn equals(path: &str, expected: &str) -> Result<Self> {
        Ok(Self::from(CheckKind::Equals(
            JsonPath::parse(path)?,
            Template::parse(expected)?,
        )))
    }

    pub fn count(path: &str, op: CompareOp, bound: u64) -> Result<Self> {
        Ok(Self::from(CheckKind::Count(JsonPath::parse(path)?, op, bound)))
    }

    /// Parses a count expression such as `>= 0`.
    pub fn count_expr(path: &str, expr: &str) -> Result<Self> {
        let invalid = || Error::InvalidCheck(format!("invalid count expression `{expr}`"));
        let (left, op, right) = CompareOp::split(expr).ok_or_else(invalid)?;
        if !left.is_empty() && !left.eq_ignore_ascii_case("count") {
            return Err(invalid());
        }
        let bound: u64 = right.parse().map_err(|_| invalid())?;
        Self::count(path, op, bound)
    }

    #[must_use]
    pub fn save_as(mut self, key: impl Into<Arc<str>>) -> Self {
        self.save_as = Some(key.into());
        self
    }
}

impl From<CheckKind> for Check {
    fn from(kind: CheckKind) -> Self {
        Self {
            kind,
            save_as: None,
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CheckKind::Status(code) => write!(f, "status == {code}"),
            CheckKind::Exists(path) => write!(f, "{path} exists"),
            CheckKind::Equals(path, expected) => write!(f, "{path} == `{expected}`"),
            CheckKind::Count(path, op, bound) => write!(f, "count({path}) {op} {bound}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub check: String,
    pub reason: String,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check, self.reason)
    }
}

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub passed: bool,
    /// The input session, with extractions applied when every check passed.
    pub session: Session,
    pub failures: Vec<CheckFailure>,
}

impl CheckOutcome {
    /// Failure reasons joined for a metric record.
    pub fn reason(&self) -> String {
        self.failures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Runs every check in declared order, collecting each failure.
pub fn evaluate(checks: &[Check], response: &HttpResponse, session: Session) -> CheckOutcome {
    let mut body = LazyBody::new(response);
    let mut failures = Vec::new();
    let mut extracted: Vec<(Arc<str>, Value)> = Vec::new();

    for check in checks {
        match run_check(check, response, &mut body, &session) {
            Ok(value) => {
                if let Some(key) = &check.save_as {
                    extracted.push((Arc::clone(key), value));
                }
            }
            Err(reason) => failures.push(CheckFailure {
                check: check.to_string(),
                reason,
            }),
        }
    }

    if !failures.is_empty() {
        return CheckOutcome {
            passed: false,
            session,
            failures,
        };
    }

    let mut updated = session.clone();
    for (key, value) in extracted {
        match updated.try_set(Arc::clone(&key), value) {
            Ok(next) => updated = next,
            Err(e) => {
                failures.push(CheckFailure {
                    check: format!("save as `{key}`"),
                    reason: e.to_string(),
                });
                return CheckOutcome {
                    passed: false,
                    session,
                    failures,
                };
            }
        }
    }

    CheckOutcome {
        passed: true,
        session: updated,
        failures,
    }
}

struct LazyBody<'a> {
    response: &'a HttpResponse,
    parsed: Option<std::result::Result<Json, String>>,
}

impl<'a> LazyBody<'a> {
    fn new(response: &'a HttpResponse) -> Self {
        Self {
            response,
            parsed: None,
        }
    }

    fn json(&mut self) -> std::result::Result<&Json, String> {
        let response = self.response;
        self.parsed
            .get_or_insert_with(|| {
                serde_json::from_slice(&response.body)
                    .map_err(|e| format!("response body is not valid JSON: {e}"))
            })
            .as_ref()
            .map_err(Clone::clone)
    }
}

fn run_check(
    check: &Check,
    response: &HttpResponse,
    body: &mut LazyBody<'_>,
    session: &Session,
) -> std::result::Result<Value, String> {
    match &check.kind {
        CheckKind::Status(expected) => {
            if response.status == *expected {
                Ok(Value::Int(i64::from(response.status)))
            } else {
                Err(format!("expected {expected}, got {}", response.status))
            }
        }
        CheckKind::Exists(path) => {
            let node = path
                .first(body.json()?)?
                .ok_or_else(|| format!("path `{path}` not found"))?;
            Ok(extract(node))
        }
        CheckKind::Equals(path, expected) => {
            let expected = expected.render(session).map_err(|e| e.to_string())?;
            let node = path
                .first(body.json()?)?
                .ok_or_else(|| format!("path `{path}` not found"))?;
            let actual = stringify(node);
            if actual == expected {
                Ok(extract(node))
            } else {
                Err(format!("expected `{expected}`, found `{actual}`"))
            }
        }
        CheckKind::Count(path, op, bound) => {
            let node = path
                .first(body.json()?)?
                .ok_or_else(|| format!("path `{path}` not found"))?;
            let Json::Array(items) = node else {
                return Err(format!(
                    "expected a JSON array at `{path}`, found {}",
                    json_type(node)
                ));
            };
            let len = items.len() as u64;
            if op.apply(len as f64, *bound as f64) {
                Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
            } else {
                Err(format!("count is {len}"))
            }
        }
    }
}

fn extract(node: &Json) -> Value {
    match node {
        Json::String(s) => Value::from(s.as_str()),
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::from(n.to_string()),
        },
        other => Value::from(stringify(other)),
    }
}

fn json_type(node: &Json) -> &'static str {
    match node {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}
