use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context as _;
use rand::Rng as _;
use serde::Deserialize;
use surge_core::{
    Assertion, Chain, Check, CompareOp, Feeder, FeederRecord, FeederStrategy, HttpAction,
    InjectionProfile, InjectionStep, Pause, PercentileMode, SaturationPolicy, Session, Simulation,
    Value,
};
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct SimulationYaml {
    pub name: Option<String>,
    pub base_url: Option<String>,

    /// Sent with every request unless the step sets the same header.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    pub feeder: Option<FeederYaml>,

    pub steps: Vec<StepYaml>,

    pub injection: Vec<InjectionYaml>,

    pub max_concurrent_users: Option<u64>,

    #[serde(default, deserialize_with = "from_str_opt")]
    pub saturation: Option<SaturationPolicy>,

    pub max_duration: Option<YamlDuration>,
    pub request_timeout: Option<YamlDuration>,

    #[serde(default, deserialize_with = "from_str_opt")]
    pub percentiles: Option<PercentileMode>,

    #[serde(default)]
    pub assertions: AssertionsYaml,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct FeederYaml {
    /// Resolved against the simulation file's directory.
    pub csv: Option<PathBuf>,
    pub records: Option<Vec<serde_yaml::Mapping>>,
    #[serde(default, deserialize_with = "from_str_opt")]
    pub strategy: Option<FeederStrategy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum StepYaml {
    Http(HttpYaml),
    Pause(PauseYaml),
    Set(serde_yaml::Mapping),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct HttpYaml {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    #[serde(default)]
    pub checks: Vec<CheckYaml>,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct CheckYaml {
    pub status: Option<u16>,
    pub json_path: Option<String>,
    pub exists: Option<bool>,
    pub equals: Option<serde_yaml::Value>,
    pub count: Option<String>,
    pub save_as: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PauseYaml {
    pub min: YamlDuration,
    pub max: Option<YamlDuration>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum InjectionYaml {
    AtOnceUsers(u64),
    RampUsers { users: u64, during: YamlDuration },
    ConstantUsersPerSec { rate: f64, during: YamlDuration },
    NothingFor(YamlDuration),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub(crate) struct AssertionsYaml {
    #[serde(default)]
    pub global: Vec<String>,
    /// Request name -> expressions. Ordered by name.
    #[serde(default)]
    pub requests: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(|v| YamlDuration(Duration::from_secs(v)))
                    .map_err(|_| E::custom("duration cannot be negative"))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Duration::try_from_secs_f64(v)
                    .map(YamlDuration)
                    .map_err(|e| E::custom(format!("invalid duration `{v}`: {e}")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v.trim()).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }
        }

        deserializer.deserialize_any(V)
    }
}

fn from_str_opt<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|s| {
        s.trim()
            .parse::<T>()
            .map_err(|e| serde::de::Error::custom(format!("invalid value `{s}`: {e}")))
    })
    .transpose()
}

/// Run settings carried by the file; CLI flags override them.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunSettings {
    pub max_concurrent_users: Option<u64>,
    pub saturation: SaturationPolicy,
    pub max_duration: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub percentiles: PercentileMode,
}

#[derive(Debug)]
pub(crate) struct LoadedSimulation {
    pub simulation: Simulation,
    pub settings: RunSettings,
}

pub(crate) async fn load(path: &Path) -> anyhow::Result<LoadedSimulation> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read simulation: {}", path.display()))?;

    let doc: SimulationYaml = serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let default_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("simulation");

    build(doc, base_dir, default_name)
        .with_context(|| format!("invalid simulation: {}", path.display()))
}

pub(crate) fn build(
    doc: SimulationYaml,
    base_dir: &Path,
    default_name: &str,
) -> anyhow::Result<LoadedSimulation> {
    if doc.steps.is_empty() {
        anyhow::bail!("`steps` must contain at least one step");
    }

    let mut chain = Chain::new();
    for (idx, step) in doc.steps.into_iter().enumerate() {
        chain = add_step(chain, step).with_context(|| format!("steps[{idx}]"))?;
    }

    let injection = InjectionProfile::new(doc.injection.into_iter().map(injection_step).collect())
        .context("injection")?;
    if injection.total_users() == 0 {
        anyhow::bail!("`injection` schedules no users");
    }

    let name = doc.name.unwrap_or_else(|| default_name.to_string());
    let mut simulation = Simulation::new(name, chain, injection);

    if let Some(base_url) = &doc.base_url {
        simulation = simulation.with_base_url(base_url)?;
    }
    for (k, v) in &doc.headers {
        simulation = simulation
            .with_header(k, v)
            .with_context(|| format!("headers.{k}"))?;
    }
    if let Some(feeder) = doc.feeder {
        simulation = simulation.with_feeder(build_feeder(feeder, base_dir).context("feeder")?);
    }

    for expr in &doc.assertions.global {
        simulation = simulation.with_assertion(Assertion::global(expr)?);
    }
    for (request, exprs) in &doc.assertions.requests {
        for expr in exprs {
            simulation = simulation.with_assertion(Assertion::request(request.as_str(), expr)?);
        }
    }

    let settings = RunSettings {
        max_concurrent_users: doc.max_concurrent_users,
        saturation: doc.saturation.unwrap_or_default(),
        max_duration: doc.max_duration.map(YamlDuration::into_inner),
        request_timeout: doc.request_timeout.map(YamlDuration::into_inner),
        percentiles: doc.percentiles.unwrap_or_default(),
    };

    Ok(LoadedSimulation {
        simulation,
        settings,
    })
}

fn add_step(chain: Chain, step: StepYaml) -> anyhow::Result<Chain> {
    match step {
        StepYaml::Http(http) => Ok(chain.exec(build_http(http)?)),
        StepYaml::Pause(p) => {
            let min = p.min.into_inner();
            let max = p.max.map(YamlDuration::into_inner).unwrap_or(min);
            Ok(chain.pause(Pause::between(min, max)?))
        }
        StepYaml::Set(assignments) => {
            let values = build_assignments(assignments)?;
            let label: Vec<&str> = values.iter().map(|(k, _)| k.as_ref()).collect();
            let name = format!("set {}", label.join(", "));
            Ok(chain.transform(name, move |session| apply_assignments(session, &values)))
        }
    }
}

fn build_http(http: HttpYaml) -> anyhow::Result<HttpAction> {
    let name = http.name;
    let mut action = HttpAction::with_method_name(name.as_str(), &http.method, &http.path)
        .with_context(|| format!("http `{name}`"))?;

    for (k, v) in &http.headers {
        action = action
            .header(k, v)
            .with_context(|| format!("http `{name}` header `{k}`"))?;
    }
    if let Some(body) = &http.body {
        action = action
            .body(body)
            .with_context(|| format!("http `{name}` body"))?;
    }
    for (idx, check) in http.checks.into_iter().enumerate() {
        let check = build_check(check).with_context(|| format!("http `{name}` checks[{idx}]"))?;
        action = action.check(check);
    }
    Ok(action)
}

fn build_check(c: CheckYaml) -> anyhow::Result<Check> {
    let check = match (c.status, c.json_path) {
        (Some(_), Some(_)) => anyhow::bail!("a check takes either `status` or `jsonPath`, not both"),
        (None, None) => anyhow::bail!("a check needs `status` or `jsonPath`"),
        (Some(status), None) => {
            if c.exists.is_some() || c.equals.is_some() || c.count.is_some() {
                anyhow::bail!("`exists`/`equals`/`count` require `jsonPath`");
            }
            Check::status(status)
        }
        (None, Some(path)) => match (c.exists, c.equals, c.count) {
            (Some(true), None, None) => Check::exists(&path)?,
            (Some(false), None, None) => anyhow::bail!("`exists: false` is not supported"),
            (None, Some(expected), None) => Check::equals(&path, &scalar_text(&expected)?)?,
            (None, None, Some(expr)) => Check::count_expr(&path, &expr)?,
            (None, None, None) => anyhow::bail!("`jsonPath` needs one of `exists`, `equals`, `count`"),
            _ => anyhow::bail!("`exists`, `equals` and `count` are mutually exclusive"),
        },
    };

    Ok(match c.save_as {
        Some(key) => check.save_as(key),
        None => check,
    })
}

#[derive(Debug, Clone)]
enum Assignment {
    Literal(Value),
    Now,
    Int(Operand),
    Arith(ArithOp, Operand, Operand),
    Compare(CompareOp, Operand, Operand),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
}

/// An integer input of a `set` expression.
#[derive(Debug, Clone)]
enum Operand {
    Int(i64),
    /// Session key holding an integer.
    Key(Arc<str>),
    RandomInt { min: i64, max: i64 },
}

const ASSIGNMENT_FORMS: &str = "expected a literal, `now`, `randomInt: {min, max}`, \
     `add`/`sub`/`mul: [a, b]` or `gt`/`gte`/`lt`/`lte`/`eq: [a, b]`";

impl Assignment {
    fn eval(&self, session: &Session) -> Result<Value, String> {
        Ok(match self {
            Self::Literal(v) => v.clone(),
            Self::Now => Value::Timestamp(SystemTime::now()),
            Self::Int(v) => Value::Int(v.eval(session)?),
            Self::Arith(op, l, r) => {
                let (l, r) = (l.eval(session)?, r.eval(session)?);
                let v = match op {
                    ArithOp::Add => l.checked_add(r),
                    ArithOp::Sub => l.checked_sub(r),
                    ArithOp::Mul => l.checked_mul(r),
                };
                Value::Int(v.ok_or_else(|| format!("integer overflow in {op:?}({l}, {r})"))?)
            }
            Self::Compare(op, l, r) => {
                let (l, r) = (l.eval(session)?, r.eval(session)?);
                Value::Bool(match op {
                    CompareOp::Lt => l < r,
                    CompareOp::Lte => l <= r,
                    CompareOp::Gt => l > r,
                    CompareOp::Gte => l >= r,
                    CompareOp::Eq => l == r,
                })
            }
        })
    }
}

impl Operand {
    fn eval(&self, session: &Session) -> Result<i64, String> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::Key(key) => session.get_int(key).map_err(|e| e.to_string()),
            Self::RandomInt { min, max } => Ok(rand::rng().random_range(*min..=*max)),
        }
    }
}

fn build_assignments(raw: serde_yaml::Mapping) -> anyhow::Result<Vec<(Arc<str>, Assignment)>> {
    if raw.is_empty() {
        anyhow::bail!("`set` needs at least one key");
    }

    let mut out = Vec::with_capacity(raw.len());
    for (k, v) in raw {
        let serde_yaml::Value::String(key) = k else {
            anyhow::bail!("`set` keys must be strings");
        };
        let value = assignment(&v).with_context(|| format!("set `{key}`"))?;
        out.push((Arc::from(key), value));
    }
    Ok(out)
}

fn assignment(v: &serde_yaml::Value) -> anyhow::Result<Assignment> {
    use serde_yaml::Value as Y;

    Ok(match v {
        Y::String(s) if s == "now" => Assignment::Now,
        Y::String(s) => Assignment::Literal(Value::from(s.as_str())),
        Y::Bool(b) => Assignment::Literal(Value::Bool(*b)),
        Y::Number(n) => match n.as_i64() {
            Some(i) => Assignment::Literal(Value::Int(i)),
            None => Assignment::Literal(Value::from(n.to_string())),
        },
        Y::Mapping(m) => {
            let mut entries = m.iter();
            let (Some((Y::String(form), arg)), None) = (entries.next(), entries.next()) else {
                anyhow::bail!("{ASSIGNMENT_FORMS}");
            };
            let arith = |op| -> anyhow::Result<Assignment> {
                let (l, r) = operands(arg)?;
                Ok(Assignment::Arith(op, l, r))
            };
            let compare = |op| -> anyhow::Result<Assignment> {
                let (l, r) = operands(arg)?;
                Ok(Assignment::Compare(op, l, r))
            };
            match form.as_str() {
                "randomInt" => Assignment::Int(random_int(arg)?),
                "add" => arith(ArithOp::Add)?,
                "sub" => arith(ArithOp::Sub)?,
                "mul" => arith(ArithOp::Mul)?,
                "gt" => compare(CompareOp::Gt)?,
                "gte" => compare(CompareOp::Gte)?,
                "lt" => compare(CompareOp::Lt)?,
                "lte" => compare(CompareOp::Lte)?,
                "eq" => compare(CompareOp::Eq)?,
                other => anyhow::bail!("unknown form `{other}`: {ASSIGNMENT_FORMS}"),
            }
        }
        _ => anyhow::bail!("{ASSIGNMENT_FORMS}"),
    })
}

fn operands(arg: &serde_yaml::Value) -> anyhow::Result<(Operand, Operand)> {
    match arg.as_sequence().map(Vec::as_slice) {
        Some([l, r]) => Ok((
            operand(l).context("first operand")?,
            operand(r).context("second operand")?,
        )),
        _ => anyhow::bail!("expected two operands, e.g. `[10, rightAnswers]`"),
    }
}

fn operand(v: &serde_yaml::Value) -> anyhow::Result<Operand> {
    use serde_yaml::Value as Y;

    match v {
        Y::Number(n) => n
            .as_i64()
            .map(Operand::Int)
            .with_context(|| format!("`{n}` is not an integer")),
        Y::String(key) if !key.trim().is_empty() => Ok(Operand::Key(Arc::from(key.trim()))),
        Y::Mapping(m) if m.len() == 1 => {
            let range = m
                .get(&Y::from("randomInt"))
                .context("expected an integer, a session key, or `randomInt: {min, max}`")?;
            random_int(range)
        }
        _ => anyhow::bail!("expected an integer, a session key, or `randomInt: {{min, max}}`"),
    }
}

fn random_int(range: &serde_yaml::Value) -> anyhow::Result<Operand> {
    let bound = |name: &str| -> anyhow::Result<i64> {
        range
            .get(name)
            .and_then(serde_yaml::Value::as_i64)
            .with_context(|| format!("`randomInt.{name}` must be an integer"))
    };
    let (min, max) = (bound("min")?, bound("max")?);
    if min > max {
        anyhow::bail!("`randomInt` bounds are inverted: {min} > {max}");
    }
    Ok(Operand::RandomInt { min, max })
}

/// Assignments apply in order, so later keys can read earlier ones. A key whose expression
/// cannot be evaluated is left unset; the request that needs it then fails to render.
fn apply_assignments(mut session: Session, values: &[(Arc<str>, Assignment)]) -> Session {
    for (key, assignment) in values {
        match assignment.eval(&session) {
            Ok(value) => session = session.set(Arc::clone(key), value),
            Err(reason) => warn!(key = %key, %reason, "session value not set"),
        }
    }
    session
}

fn injection_step(step: InjectionYaml) -> InjectionStep {
    match step {
        InjectionYaml::AtOnceUsers(users) => InjectionStep::AtOnce { users },
        InjectionYaml::RampUsers { users, during } => InjectionStep::Ramp {
            users,
            during: during.into_inner(),
        },
        InjectionYaml::ConstantUsersPerSec { rate, during } => InjectionStep::ConstantRate {
            rate,
            during: during.into_inner(),
        },
        InjectionYaml::NothingFor(d) => InjectionStep::NothingFor(d.into_inner()),
    }
}

fn build_feeder(f: FeederYaml, base_dir: &Path) -> anyhow::Result<Feeder> {
    let strategy = f.strategy.unwrap_or_default();
    match (f.csv, f.records) {
        (Some(csv), None) => {
            let path = if csv.is_absolute() {
                csv
            } else {
                base_dir.join(csv)
            };
            Ok(Feeder::from_csv_path(strategy, path)?)
        }
        (None, Some(records)) => {
            let mut out = Vec::with_capacity(records.len());
            for (idx, record) in records.iter().enumerate() {
                out.push(feeder_record(record).with_context(|| format!("records[{idx}]"))?);
            }
            Ok(Feeder::from_records(strategy, out))
        }
        (Some(_), Some(_)) => anyhow::bail!("use either `csv` or `records`, not both"),
        (None, None) => anyhow::bail!("needs `csv` or `records`"),
    }
}

fn feeder_record(raw: &serde_yaml::Mapping) -> anyhow::Result<FeederRecord> {
    let mut fields = Vec::with_capacity(raw.len());
    for (k, v) in raw {
        let serde_yaml::Value::String(key) = k else {
            anyhow::bail!("field names must be strings");
        };
        let value = scalar_text(v).with_context(|| format!("field `{key}`"))?;
        fields.push((key.clone(), value));
    }
    Ok(FeederRecord::new(fields))
}

fn scalar_text(v: &serde_yaml::Value) -> anyhow::Result<String> {
    use serde_yaml::Value as Y;

    match v {
        Y::String(s) => Ok(s.clone()),
        Y::Bool(b) => Ok(b.to_string()),
        Y::Number(n) => Ok(n.to_string()),
        Y::Null => Ok(String::new()),
        _ => anyhow::bail!("expected a scalar value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_core::Step;

    const GAME_FLOW: &str = r##"
name: GameFlow
baseUrl: http://localhost:8000
headers:
  Accept: application/json
feeder:
  strategy: once
  records:
    - { username: alice, password: pw1 }
    - { username: bob, password: 2 }
steps:
  - http:
      name: Login
      method: post
      path: /login
      headers: { Content-Type: application/json }
      body: '{"username":"#{username}","password":"#{password}"}'
      checks:
        - status: 200
        - jsonPath: $.token
          exists: true
          saveAs: authToken
  - pause: { min: 100ms, max: 1s }
  - set:
      score: { randomInt: { min: 0, max: 100 } }
      currentDate: now
      gameMode: classic
  - http:
      name: GetStats
      path: /getstats/#{username}
      checks:
        - jsonPath: username
          equals: "#{username}"
        - jsonPath: $.games
          count: ">= 0"
injection:
  - atOnceUsers: 1
  - nothingFor: 2s
  - rampUsers: { users: 4, during: 10s }
  - constantUsersPerSec: { rate: 2, during: 1.5 }
maxConcurrentUsers: 10
saturation: drop
maxDuration: 1m
requestTimeout: 5
percentiles: histogram
assertions:
  global:
    - response_time.max < 5000
  requests:
    Login:
      - response_time.mean < 500
      - failed_requests.count == 0
"##;

    fn parse(yaml: &str) -> SimulationYaml {
        serde_yaml::from_str(yaml).unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    fn load_str(yaml: &str) -> anyhow::Result<LoadedSimulation> {
        build(parse(yaml), Path::new("."), "fallback")
    }

    #[test]
    fn game_flow_document_builds() {
        let loaded = load_str(GAME_FLOW).unwrap_or_else(|e| panic!("{e:#}"));
        let sim = &loaded.simulation;

        assert_eq!(sim.name(), "GameFlow");
        assert_eq!(sim.base_url(), Some("http://localhost:8000"));
        assert_eq!(sim.chain().len(), 4);
        assert_eq!(sim.assertions().len(), 3);
        assert_eq!(sim.injection().total_users(), 1 + 4 + 3);

        let names: Vec<&str> = sim.chain().http_actions().map(|a| a.name.as_ref()).collect();
        assert_eq!(names, ["Login", "GetStats"]);

        let login = sim
            .chain()
            .http_actions()
            .next()
            .unwrap_or_else(|| panic!("missing login"));
        assert_eq!(login.method.as_str(), "POST");
        assert_eq!(login.checks.len(), 2);

        let feeder = sim.feeder().unwrap_or_else(|| panic!("missing feeder"));
        assert_eq!(feeder.strategy(), FeederStrategy::Once);
        let first = feeder.next().unwrap_or_else(|| panic!("empty feeder"));
        assert_eq!(first.get("username"), Some("alice"));
        let second = feeder.next().unwrap_or_else(|| panic!("short feeder"));
        assert_eq!(second.get("password"), Some("2"));

        let s = &loaded.settings;
        assert_eq!(s.max_concurrent_users, Some(10));
        assert_eq!(s.saturation, SaturationPolicy::Drop);
        assert_eq!(s.max_duration, Some(Duration::from_secs(60)));
        assert_eq!(s.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(s.percentiles, PercentileMode::Histogram);
    }

    #[test]
    fn set_step_assigns_generated_values() {
        let values = build_assignments(
            serde_yaml::from_str("{ n: { randomInt: { min: 3, max: 3 } }, at: now, mode: x, win: true }")
                .unwrap_or_else(|e| panic!("{e}")),
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        let s = apply_assignments(Session::new(), &values);
        assert_eq!(s.get_int("n"), Ok(3));
        assert!(s.get_timestamp("at").is_ok());
        assert_eq!(s.get_str("mode"), Ok("x"));
        assert_eq!(s.get_bool("win"), Ok(true));
    }

    #[test]
    fn defaults_apply_when_optional_fields_are_missing() {
        let loaded = load_str(
            r#"
steps:
  - http: { name: Home, path: "http://localhost/" }
injection:
  - atOnceUsers: 2
"#,
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        assert_eq!(loaded.simulation.name(), "fallback");
        assert_eq!(loaded.settings.saturation, SaturationPolicy::Wait);
        assert_eq!(loaded.settings.percentiles, PercentileMode::Exact);
        assert_eq!(loaded.settings.max_duration, None);
    }

    #[test]
    fn invalid_documents_are_rejected() {
        let cases = [
            // Unterminated template.
            "steps: [{ http: { name: A, path: '/x/#{id' } }]\ninjection: [{ atOnceUsers: 1 }]",
            // Check with two assertions.
            "steps: [{ http: { name: A, path: /x, checks: [{ jsonPath: $.a, exists: true, count: '>= 0' }] } }]\ninjection: [{ atOnceUsers: 1 }]",
            // Bad count expression.
            "steps: [{ http: { name: A, path: /x, checks: [{ jsonPath: $.a, count: 'about 3' }] } }]\ninjection: [{ atOnceUsers: 1 }]",
            // Unknown assertion metric.
            "steps: [{ http: { name: A, path: /x } }]\ninjection: [{ atOnceUsers: 1 }]\nassertions: { global: ['latency.p95 < 1'] }",
            // Inverted pause.
            "steps: [{ pause: { min: 2s, max: 1s } }]\ninjection: [{ atOnceUsers: 1 }]",
            // No users.
            "steps: [{ http: { name: A, path: /x } }]\ninjection: []",
            // Feeder without a source.
            "steps: [{ http: { name: A, path: /x } }]\ninjection: [{ atOnceUsers: 1 }]\nfeeder: { strategy: circular }",
        ];

        for yaml in cases {
            assert!(load_str(yaml).is_err(), "expected error for:\n{yaml}");
        }
    }

    #[test]
    fn unknown_enum_values_fail_to_parse() {
        let res: Result<SimulationYaml, _> = serde_yaml::from_str(
            "steps: []\ninjection: []\nsaturation: sometimes",
        );
        assert!(res.is_err());

        let res: Result<SimulationYaml, _> =
            serde_yaml::from_str("steps: []\ninjection: []\nfeeder: { records: [], strategy: lifo }");
        assert!(res.is_err());
    }

    #[test]
    fn csv_feeder_path_is_relative_to_the_simulation() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        std::fs::write(dir.path().join("users.csv"), "username,password\nalice,pw\n")
            .unwrap_or_else(|e| panic!("{e}"));

        let doc = parse(
            "feeder: { csv: users.csv }\nsteps: [{ http: { name: A, path: /x } }]\ninjection: [{ atOnceUsers: 1 }]",
        );
        let loaded = build(doc, dir.path(), "x").unwrap_or_else(|e| panic!("{e:#}"));
        let feeder = loaded
            .simulation
            .feeder()
            .unwrap_or_else(|| panic!("missing feeder"));
        assert_eq!(feeder.strategy(), FeederStrategy::Circular);
        assert_eq!(feeder.len(), 1);

        let doc = parse(
            "feeder: { csv: missing.csv }\nsteps: [{ http: { name: A, path: /x } }]\ninjection: [{ atOnceUsers: 1 }]",
        );
        assert!(build(doc, dir.path(), "x").is_err());
    }

    #[tokio::test]
    async fn bundled_demo_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/game_flow.yaml");
        let loaded = load(&path).await.unwrap_or_else(|e| panic!("{e:#}"));
        let sim = &loaded.simulation;

        assert_eq!(sim.name(), "GameFlow");
        let names: Vec<&str> = sim.chain().http_actions().map(|a| a.name.as_ref()).collect();
        assert_eq!(
            names,
            [
                "1. Login",
                "2. Get Questions",
                "3. Save Stats",
                "4. Get Stats",
                "5. Get History",
                "6. Get Ratios",
            ]
        );
        assert_eq!(sim.injection().total_users(), 10);
        assert_eq!(sim.assertions().len(), 5);
        assert!(sim.feeder().is_some_and(|f| f.len() == 8));

        let authorized = sim
            .chain()
            .http_actions()
            .filter(|a| a.headers.iter().any(|(k, _)| k.as_ref() == "Authorization"))
            .count();
        assert_eq!(authorized, 4);

        let play = sim
            .chain()
            .steps()
            .iter()
            .find_map(|s| match s {
                Step::Transform(t) => Some(t.clone()),
                _ => None,
            })
            .unwrap_or_else(|| panic!("missing set step"));
        for _ in 0..50 {
            let s = play.apply(Session::new());
            let right = s.get_int("rightAnswers").unwrap_or_else(|e| panic!("{e}"));
            let wrong = s.get_int("wrongAnswers").unwrap_or_else(|e| panic!("{e}"));
            let score = s.get_int("score").unwrap_or_else(|e| panic!("{e}"));
            assert_eq!(right + wrong, 10);
            assert_eq!(s.get_bool("win"), Ok(right > wrong));
            assert!((right * 8..=right * 12).contains(&score), "score {score}");
            assert!(s.get_timestamp("currentDate").is_ok());
        }
    }

    #[test]
    fn set_step_derives_values_from_earlier_keys() {
        let values = build_assignments(
            serde_yaml::from_str(
                "{ right: { randomInt: { min: 7, max: 7 } }, wrong: { sub: [10, right] }, \
                 score: { mul: [right, { randomInt: { min: 8, max: 12 } }] }, \
                 total: { add: [right, wrong] }, win: { gt: [right, wrong] }, \
                 perfect: { eq: [right, 10] } }",
            )
            .unwrap_or_else(|e| panic!("{e}")),
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        let s = apply_assignments(Session::new(), &values);
        assert_eq!(s.get_int("wrong"), Ok(3));
        assert_eq!(s.get_int("total"), Ok(10));
        assert_eq!(s.get_bool("win"), Ok(true));
        assert_eq!(s.get_bool("perfect"), Ok(false));
        let score = s.get_int("score").unwrap_or_else(|e| panic!("{e}"));
        assert!((56..=84).contains(&score) && score % 7 == 0, "score {score}");
    }

    #[test]
    fn set_expression_over_missing_or_non_integer_key_leaves_it_unset() {
        let values = build_assignments(
            serde_yaml::from_str("{ a: { sub: [10, missing] }, b: { gt: [name, 1] } }")
                .unwrap_or_else(|e| panic!("{e}")),
        )
        .unwrap_or_else(|e| panic!("{e:#}"));

        let s = apply_assignments(Session::new().set("name", "alice"), &values);
        assert!(!s.contains("a"));
        assert!(!s.contains("b"));

        let overflow = build_assignments(
            serde_yaml::from_str("{ big: { mul: [9223372036854775807, 2] } }")
                .unwrap_or_else(|e| panic!("{e}")),
        )
        .unwrap_or_else(|e| panic!("{e:#}"));
        assert!(!apply_assignments(Session::new(), &overflow).contains("big"));
    }

    #[test]
    fn malformed_set_expressions_are_rejected() {
        for raw in [
            "{ a: { sub: [1] } }",
            "{ a: { sub: [1, 2, 3] } }",
            "{ a: { pow: [1, 2] } }",
            "{ a: { mul: [1, 2.5] } }",
            "{ a: { add: [1, { randomInt: { min: 5, max: 1 } }] } }",
            "{ a: { sub: [1, 2], add: [1, 2] } }",
            "{ a: [1, 2] }",
        ] {
            let mapping: serde_yaml::Mapping =
                serde_yaml::from_str(raw).unwrap_or_else(|e| panic!("{e}"));
            assert!(build_assignments(mapping).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn durations_accept_strings_and_seconds() {
        let d = |raw: &str| {
            serde_yaml::from_str::<YamlDuration>(raw)
                .map(YamlDuration::into_inner)
                .unwrap_or_else(|e| panic!("{raw}: {e}"))
        };
        assert_eq!(d("500ms"), Duration::from_millis(500));
        assert_eq!(d("2"), Duration::from_secs(2));
        assert_eq!(d("1.5"), Duration::from_millis(1_500));
    }

    #[test]
    fn out_of_range_durations_are_errors() {
        for raw in ["1e20", "-1.5", "-3", ".nan", ".inf"] {
            assert!(
                serde_yaml::from_str::<YamlDuration>(raw).is_err(),
                "{raw} should be rejected"
            );
        }
        assert!(
            serde_yaml::from_str::<SimulationYaml>(
                "steps: [{ pause: { min: 1e20 } }]\ninjection: [{ atOnceUsers: 1 }]"
            )
            .is_err()
        );
        assert!(
            serde_yaml::from_str::<SimulationYaml>(
                "steps: []\ninjection: []\nmaxDuration: 1e20"
            )
            .is_err()
        );
    }
}
