use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng as _;
use surge_value::Session;

use crate::check::Check;
use crate::error::{Error, Result};
use crate::template::Template;

/// A named HTTP request with its checks.
#[derive(Debug, Clone)]
pub struct HttpAction {
    pub name: Arc<str>,
    pub method: http::Method,
    pub path: Template,
    pub headers: Vec<(Arc<str>, Template)>,
    pub body: Option<Template>,
    pub checks: Vec<Check>,
}

impl HttpAction {
    pub fn new(name: impl Into<Arc<str>>, method: http::Method, path: &str) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            method,
            path: Template::parse(path)?,
            headers: Vec::new(),
            body: None,
            checks: Vec::new(),
        })
    }

    pub fn get(name: impl Into<Arc<str>>, path: &str) -> Result<Self> {
        Self::new(name, http::Method::GET, path)
    }

    pub fn post(name: impl Into<Arc<str>>, path: &str) -> Result<Self> {
        Self::new(name, http::Method::POST, path)
    }

    /// Like [`HttpAction::new`], with the method given by name (case-insensitive).
    pub fn with_method_name(name: impl Into<Arc<str>>, method: &str, path: &str) -> Result<Self> {
        let upper = method.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err(Error::InvalidMethod(method.to_string()));
        }
        let method = http::Method::from_bytes(upper.as_bytes())
            .map_err(|_| Error::InvalidMethod(method.to_string()))?;
        Self::new(name, method, path)
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        http::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidHeaderName(name.to_string()))?;
        self.headers.push((Arc::from(name), Template::parse(value)?));
        Ok(self)
    }

    pub fn body(mut self, body: &str) -> Result<Self> {
        self.body = Some(Template::parse(body)?);
        Ok(self)
    }

    #[must_use]
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }
}

/// Uniform random suspension in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pause {
    min: Duration,
    max: Duration,
}

impl Pause {
    pub fn between(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidPause { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn fixed(d: Duration) -> Self {
        Self { min: d, max: d }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let lo = self.min.as_nanos().min(u64::MAX as u128) as u64;
        let hi = self.max.as_nanos().min(u64::MAX as u128) as u64;
        Duration::from_nanos(rand::rng().random_range(lo..=hi))
    }
}

type TransformFn = dyn Fn(Session) -> Session + Send + Sync;

/// A pure session update.
#[derive(Clone)]
pub struct Transform {
    name: Arc<str>,
    f: Arc<TransformFn>,
}

impl Transform {
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Session) -> Session + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, session: Session) -> Session {
        (self.f)(session)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Http(Arc<HttpAction>),
    Pause(Pause),
    Transform(Transform),
}

/// An ordered, immutable list of steps shared by every virtual user.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    steps: Arc<[Step]>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, step: Step) -> Self {
        let mut steps = self.steps.to_vec();
        steps.push(step);
        Self {
            steps: steps.into(),
        }
    }

    #[must_use]
    pub fn exec(self, action: HttpAction) -> Self {
        self.push(Step::Http(Arc::new(action)))
    }

    #[must_use]
    pub fn pause(self, pause: Pause) -> Self {
        self.push(Step::Pause(pause))
    }

    #[must_use]
    pub fn transform<F>(self, name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Session) -> Session + Send + Sync + 'static,
    {
        self.push(Step::Transform(Transform::new(name, f)))
    }

    #[must_use]
    pub fn step(self, step: Step) -> Self {
        self.push(step)
    }

    /// Appends `other` after this chain's steps.
    #[must_use]
    pub fn then(self, other: &Chain) -> Self {
        let mut steps = self.steps.to_vec();
        steps.extend(other.steps.iter().cloned());
        Self {
            steps: steps.into(),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn http_actions(&self) -> impl Iterator<Item = &HttpAction> + '_ {
        self.steps.iter().filter_map(|s| match s {
            Step::Http(a) => Some(a.as_ref()),
            _ => None,
        })
    }
}

impl FromIterator<Step> for Chain {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}
