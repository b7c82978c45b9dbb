use std::sync::Arc;

use crate::assertions::Assertion;
use crate::error::{Error, Result};
use crate::feeder::Feeder;
use crate::injection::InjectionProfile;
use crate::step::Chain;
use crate::template::Template;

/// Everything a run needs to know about the user journey. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Simulation {
    name: Arc<str>,
    base_url: Option<Arc<str>>,
    headers: Vec<(Arc<str>, Template)>,
    feeder: Option<Arc<Feeder>>,
    chain: Chain,
    injection: InjectionProfile,
    assertions: Vec<Assertion>,
}

impl Simulation {
    pub fn new(name: impl Into<Arc<str>>, chain: Chain, injection: InjectionProfile) -> Self {
        Self {
            name: name.into(),
            base_url: None,
            headers: Vec::new(),
            feeder: None,
            chain,
            injection,
            assertions: Vec::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        let parsed =
            url::Url::parse(base_url).map_err(|_| Error::InvalidBaseUrl(base_url.to_string()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::InvalidBaseUrl(base_url.to_string()));
        }
        self.base_url = Some(Arc::from(base_url));
        Ok(self)
    }

    /// Adds a header sent with every request. Per-request headers of the same name win.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        http::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidHeaderName(name.to_string()))?;
        self.headers.push((Arc::from(name), Template::parse(value)?));
        Ok(self)
    }

    #[must_use]
    pub fn with_feeder(mut self, feeder: Feeder) -> Self {
        self.feeder = Some(Arc::new(feeder));
        self
    }

    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    #[must_use]
    pub fn with_assertions(mut self, assertions: impl IntoIterator<Item = Assertion>) -> Self {
        self.assertions.extend(assertions);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn headers(&self) -> &[(Arc<str>, Template)] {
        &self.headers
    }

    pub fn feeder(&self) -> Option<&Arc<Feeder>> {
        self.feeder.as_ref()
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn injection(&self) -> &InjectionProfile {
        &self.injection
    }

    pub fn assertions(&self) -> &[Assertion] {
        &self.assertions
    }

    /// Absolute URLs pass through; anything else is appended to the base URL.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let Some(base) = self.base_url.as_deref() else {
            return path.to_string();
        };
        let base = base.trim_end_matches('/');
        if path.is_empty() {
            base.to_string()
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}
