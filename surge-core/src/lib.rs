mod assertions;
mod check;
mod compare;
mod error;
mod executor;
mod feeder;
mod injection;
mod json_path;
mod scenario;
mod step;
mod template;

pub mod runner;

pub use assertions::{
    Assertion, AssertionMetric, AssertionScope, AssertionViolation, ResponseTimeStat, Verdict,
    evaluate as evaluate_assertions,
};
pub use check::{Check, CheckFailure, CheckKind, CheckOutcome, evaluate as evaluate_checks};
pub use compare::CompareOp;
pub use error::{Error, Result};
pub use executor::{RequestExecutor, TransportError};
pub use feeder::{Feeder, FeederRecord, FeederStrategy};
pub use injection::{InjectionProfile, InjectionStep};
pub use json_path::JsonPath;
pub use runner::{
    ProgressFn, ProgressUpdate, RunOptions, RunReport, SaturationPolicy, StopHandle, StopReason,
    run,
};
pub use scenario::Simulation;
pub use step::{Chain, HttpAction, Pause, Step, Transform};
pub use template::{Template, TemplateError};

pub use surge_http::{HttpClient, HttpRequest, HttpResponse, HttpTransportErrorKind};
pub use surge_metrics::{
    AggregatedStats, Aggregator, LiveStats, MetricRecord, Outcome, PercentileMode, RequestStats,
    UserCounts,
};
pub use surge_value::{Session, SessionError, Value, ValueKind};
