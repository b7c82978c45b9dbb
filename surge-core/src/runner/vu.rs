use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use surge_http::HttpRequest;
use surge_metrics::{Aggregator, MetricRecord};
use surge_value::Session;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use super::signal::StopHandle;
use crate::check;
use crate::executor::RequestExecutor;
use crate::feeder::FeederRecord;
use crate::scenario::Simulation;
use crate::step::{HttpAction, Step};
use crate::template::TemplateError;

/// Failure reason recorded for a request cut off by a stop or deadline.
pub const STOPPED_BEFORE_RESPONSE: &str = "timeout: run stopped before response";

pub(super) struct UserContext<E> {
    pub(super) id: u64,
    pub(super) simulation: Arc<Simulation>,
    pub(super) executor: Arc<E>,
    pub(super) aggregator: Arc<Aggregator>,
    pub(super) stop: StopHandle,
    pub(super) request_timeout: Option<Duration>,
}

enum StepEnd {
    Continue(Session),
    Failed,
    Cancelled,
}

/// Runs one virtual user's chain. The scheduler has already counted the user as started.
pub(super) async fn run_user<E: RequestExecutor>(
    ctx: UserContext<E>,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let users = ctx.aggregator.users();

    let mut session = Session::new();
    if let Some(feeder) = ctx.simulation.feeder() {
        let Some(record) = feeder.next() else {
            warn!(
                user = ctx.id,
                strategy = %feeder.strategy(),
                "feeder exhausted, user aborted"
            );
            users.on_feeder_exhausted();
            return;
        };
        session = seed(session, &record);
    }

    for step in ctx.simulation.chain().steps() {
        if ctx.stop.is_stopped() {
            users.on_cancelled();
            return;
        }

        match step {
            Step::Http(action) => match execute_http(&ctx, action, session).await {
                StepEnd::Continue(next) => session = next,
                StepEnd::Failed => {
                    users.on_failed();
                    return;
                }
                StepEnd::Cancelled => {
                    users.on_cancelled();
                    return;
                }
            },
            Step::Pause(pause) => {
                let d = pause.sample();
                tokio::select! {
                    biased;
                    _ = ctx.stop.wait() => {
                        users.on_cancelled();
                        return;
                    }
                    _ = tokio::time::sleep(d) => {}
                }
            }
            Step::Transform(t) => session = t.apply(session),
        }
    }

    trace!(user = ctx.id, "chain completed");
    users.on_completed();
}

fn seed(mut session: Session, record: &FeederRecord) -> Session {
    for (field, value) in record.iter() {
        session = session.set(Arc::clone(field), Arc::clone(value));
    }
    session
}

async fn execute_http<E: RequestExecutor>(
    ctx: &UserContext<E>,
    action: &HttpAction,
    session: Session,
) -> StepEnd {
    let req = match build_request(&ctx.simulation, action, &session, ctx.request_timeout) {
        Ok(req) => req,
        Err(err) => {
            // Nothing was sent, so nothing is recorded.
            error!(
                user = ctx.id,
                step = %action.name,
                error = %err,
                "cannot render request, user aborted"
            );
            return StepEnd::Failed;
        }
    };

    let started_at = SystemTime::now();
    let t0 = Instant::now();
    let result = tokio::select! {
        biased;
        _ = ctx.stop.wait() => None,
        res = ctx.executor.execute(req) => Some(res),
    };
    let latency = t0.elapsed();
    let name = Arc::clone(&action.name);

    match result {
        None => {
            ctx.aggregator.record(MetricRecord::failure(
                name,
                started_at,
                latency,
                STOPPED_BEFORE_RESPONSE,
            ));
            StepEnd::Cancelled
        }
        Some(Err(err)) => {
            debug!(user = ctx.id, step = %action.name, error = %err, "transport error");
            ctx.aggregator.record(MetricRecord::failure(
                name,
                started_at,
                latency,
                err.to_string(),
            ));
            StepEnd::Failed
        }
        Some(Ok(response)) => {
            let outcome = check::evaluate(&action.checks, &response, session);
            if outcome.passed {
                ctx.aggregator
                    .record(MetricRecord::success(name, started_at, latency));
                StepEnd::Continue(outcome.session)
            } else {
                let reason = outcome.reason();
                debug!(user = ctx.id, step = %action.name, %reason, "checks failed");
                ctx.aggregator
                    .record(MetricRecord::failure(name, started_at, latency, reason));
                StepEnd::Failed
            }
        }
    }
}

fn build_request(
    simulation: &Simulation,
    action: &HttpAction,
    session: &Session,
    timeout: Option<Duration>,
) -> Result<HttpRequest, TemplateError> {
    let path = action.path.render(session)?;
    let mut req = HttpRequest::new(action.method.clone(), simulation.resolve_url(&path))
        .with_timeout(timeout);

    for (name, value) in simulation.headers() {
        let overridden = action
            .headers
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case(name));
        if !overridden {
            req = req.with_header(name.as_ref(), value.render(session)?);
        }
    }
    for (name, value) in &action.headers {
        req = req.with_header(name.as_ref(), value.render(session)?);
    }
    if let Some(body) = &action.body {
        req = req.with_body(Bytes::from(body.render(session)?));
    }

    Ok(req)
}
