mod support;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use surge_core::runner::STOPPED_BEFORE_RESPONSE;
use surge_core::{
    Assertion, Chain, Check, Feeder, FeederRecord, FeederStrategy, HttpAction,
    HttpTransportErrorKind, InjectionProfile, InjectionStep, Pause, RunOptions, SaturationPolicy,
    Session, Simulation, StopReason, TransportError, run,
};
use support::{MockExecutor, json};

fn get(name: &str, path: &str) -> HttpAction {
    HttpAction::get(name, path).unwrap_or_else(|e| panic!("invalid action: {e}"))
}

fn simulation(chain: Chain, injection: InjectionProfile) -> Simulation {
    Simulation::new("scheduler", chain, injection)
        .with_base_url("http://mock.local")
        .unwrap_or_else(|e| panic!("invalid base url: {e}"))
}

#[tokio::test(start_paused = true)]
async fn ramp_starts_users_at_their_offsets() {
    let exec = MockExecutor::ok(Duration::ZERO);
    let sim = simulation(
        Chain::new().exec(get("home", "/")),
        InjectionProfile::ramp(4, Duration::from_secs(4)),
    );

    let report = run(sim, Arc::clone(&exec), RunOptions::default())
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    let starts: Vec<Duration> = exec.calls().iter().map(|c| c.at).collect();
    assert_eq!(
        starts,
        [0, 1, 2, 3].map(Duration::from_secs).to_vec(),
        "user i of a 4-user ramp over 4s starts at i seconds"
    );
    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(report.users.completed, 4);
    assert_eq!(report.stats.global.count, 4);
}

#[tokio::test(start_paused = true)]
async fn nothing_for_shifts_later_steps() {
    let exec = MockExecutor::ok(Duration::ZERO);
    let profile = InjectionProfile::new(vec![
        InjectionStep::AtOnce { users: 1 },
        InjectionStep::NothingFor(Duration::from_secs(5)),
        InjectionStep::ConstantRate {
            rate: 2.0,
            during: Duration::from_secs(1),
        },
    ])
    .unwrap_or_else(|e| panic!("invalid profile: {e}"));
    let sim = simulation(Chain::new().exec(get("home", "/")), profile);

    run(sim, Arc::clone(&exec), RunOptions::default())
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    let starts: Vec<Duration> = exec.calls().iter().map(|c| c.at).collect();
    assert_eq!(
        starts,
        vec![
            Duration::ZERO,
            Duration::from_secs(5),
            Duration::from_millis(5_500),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn wait_policy_caps_concurrency_and_runs_everyone() {
    let exec = MockExecutor::ok(Duration::from_secs(1));
    let sim = simulation(
        Chain::new().exec(get("slow", "/slow")),
        InjectionProfile::at_once(6),
    );
    let opts = RunOptions {
        max_concurrent_users: Some(2),
        ..RunOptions::default()
    };

    let report = run(sim, Arc::clone(&exec), opts)
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(exec.peak_in_flight(), 2);
    assert_eq!(report.users.completed, 6);
    assert_eq!(report.users.peak_active, 2);
    assert_eq!(report.users.dropped, 0);
    assert!(report.elapsed >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn drop_policy_skips_users_over_the_limit() {
    let exec = MockExecutor::ok(Duration::from_secs(1));
    let sim = simulation(
        Chain::new().exec(get("slow", "/slow")),
        InjectionProfile::at_once(5),
    );
    let opts = RunOptions {
        max_concurrent_users: Some(2),
        saturation: SaturationPolicy::Drop,
        ..RunOptions::default()
    };

    let report = run(sim, Arc::clone(&exec), opts)
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(report.users.scheduled, 5);
    assert_eq!(report.users.started, 2);
    assert_eq!(report.users.dropped, 3);
    assert_eq!(report.users.completed, 2);
    assert_eq!(exec.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn deadline_cancels_in_flight_requests() {
    let exec = MockExecutor::ok(Duration::from_secs(10));
    let sim = simulation(
        Chain::new().exec(get("stuck", "/slow")),
        InjectionProfile::at_once(2),
    );
    let opts = RunOptions {
        max_duration: Some(Duration::from_secs(3)),
        ..RunOptions::default()
    };

    let report = run(sim, exec, opts)
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(report.stop_reason, StopReason::Deadline);
    assert!(report.elapsed < Duration::from_secs(10));
    assert_eq!(report.users.cancelled, 2);

    let stuck = report
        .stats
        .request("stuck")
        .unwrap_or_else(|| panic!("missing `stuck` stats"));
    assert_eq!(stuck.ko, 2);
    assert_eq!(stuck.errors()[0].0.as_ref(), STOPPED_BEFORE_RESPONSE);
}

#[tokio::test(start_paused = true)]
async fn stop_handle_ends_injection_early() {
    let exec = MockExecutor::ok(Duration::ZERO);
    let sim = simulation(
        Chain::new().exec(get("home", "/")),
        InjectionProfile::ramp(10, Duration::from_secs(10)),
    );
    let opts = RunOptions::default();
    let stop = opts.stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        stop.stop();
    });

    let report = run(sim, Arc::clone(&exec), opts)
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(report.stop_reason, StopReason::Interrupted);
    assert_eq!(report.users.scheduled, 10);
    assert_eq!(report.users.started, 3);
    assert_eq!(exec.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn pause_is_cut_short_by_stop() {
    let exec = MockExecutor::ok(Duration::ZERO);
    let sim = simulation(
        Chain::new()
            .exec(get("first", "/a"))
            .pause(Pause::fixed(Duration::from_secs(60)))
            .exec(get("second", "/b")),
        InjectionProfile::at_once(1),
    );
    let opts = RunOptions {
        max_duration: Some(Duration::from_secs(1)),
        ..RunOptions::default()
    };

    let report = run(sim, Arc::clone(&exec), opts)
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(exec.calls().len(), 1);
    assert_eq!(report.users.cancelled, 1);
    assert!(report.stats.request("second").is_none());
    assert!(report.elapsed < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn once_feeder_aborts_users_past_the_last_record() {
    let exec = MockExecutor::ok(Duration::ZERO);
    let feeder = Feeder::from_records(
        FeederStrategy::Once,
        vec![
            FeederRecord::new([("username", "alice")]),
            FeederRecord::new([("username", "bob")]),
        ],
    );
    let sim = simulation(
        Chain::new().exec(get("stats", "/getstats/#{username}")),
        InjectionProfile::at_once(3),
    )
    .with_feeder(feeder);

    let report = run(sim, Arc::clone(&exec), RunOptions::default())
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(report.users.completed, 2);
    assert_eq!(report.users.feeder_exhausted, 1);
    assert_eq!(report.users.failed, 1);

    let mut urls: Vec<String> = exec.calls().into_iter().map(|c| c.url).collect();
    urls.sort();
    assert_eq!(
        urls,
        [
            "http://mock.local/getstats/alice",
            "http://mock.local/getstats/bob"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_step_ends_the_user_and_is_recorded() {
    let exec = MockExecutor::new(Duration::from_millis(10), |req| {
        if req.url.ends_with("/login") {
            Ok(json(401, r#"{"error":"invalid credentials"}"#))
        } else {
            Ok(json(200, "[]"))
        }
    });
    let login = get("Login", "/login").check(Check::status(200));
    let sim = simulation(
        Chain::new().exec(login).exec(get("Questions", "/questionsDB")),
        InjectionProfile::at_once(3),
    )
    .with_assertion(
        Assertion::global("failed_requests.count == 0")
            .unwrap_or_else(|e| panic!("invalid assertion: {e}")),
    );

    let report = run(sim, Arc::clone(&exec), RunOptions::default())
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(report.users.failed, 3);
    assert_eq!(report.users.completed, 0);
    assert!(report.stats.request("Questions").is_none());

    let login = report
        .stats
        .request("Login")
        .unwrap_or_else(|| panic!("missing Login stats"));
    assert_eq!(login.ko, 3);
    assert!(login.errors()[0].0.contains("status == 200"));
    assert!(!report.passed());
    assert_eq!(report.verdict.violations().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_errors_are_recorded_with_their_kind() {
    let exec = MockExecutor::new(Duration::ZERO, |_| {
        Err(TransportError::new(
            HttpTransportErrorKind::Request,
            "connection refused",
        ))
    });
    let sim = simulation(
        Chain::new().exec(get("home", "/")),
        InjectionProfile::at_once(2),
    );

    let report = run(sim, exec, RunOptions::default())
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    let home = report
        .stats
        .request("home")
        .unwrap_or_else(|| panic!("missing home stats"));
    assert_eq!(home.ko, 2);
    assert_eq!(home.errors()[0].0.as_ref(), "request: connection refused");
    assert_eq!(home.errors()[0].1, 2);
}

#[tokio::test(start_paused = true)]
async fn progress_ticks_on_the_configured_interval() {
    let exec = MockExecutor::ok(Duration::ZERO);
    let sim = simulation(
        Chain::new().exec(get("home", "/")),
        InjectionProfile::ramp(5, Duration::from_secs(5)),
    );

    let ticks = Arc::new(AtomicU64::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let opts = RunOptions {
        progress_interval: Duration::from_secs(1),
        progress: Some({
            let ticks = Arc::clone(&ticks);
            let seen = Arc::clone(&seen);
            Arc::new(move |u: surge_core::ProgressUpdate| {
                ticks.fetch_add(1, Ordering::Relaxed);
                seen.lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push((u.tick, u.live.requests, u.injection_step));
            })
        }),
        ..RunOptions::default()
    };

    run(sim, exec, opts)
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    let seen = seen.lock().unwrap_or_else(|p| p.into_inner()).clone();
    assert!(ticks.load(Ordering::Relaxed) >= 3);
    assert_eq!(seen[0].0, 1);
    assert_eq!(seen[0].2, Some(0));
    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
}

#[tokio::test]
async fn zero_concurrency_is_rejected_before_any_user_starts() {
    let exec = MockExecutor::ok(Duration::ZERO);
    let sim = simulation(
        Chain::new().exec(get("home", "/")),
        InjectionProfile::at_once(1),
    );
    let opts = RunOptions {
        max_concurrent_users: Some(0),
        ..RunOptions::default()
    };

    assert!(run(sim, Arc::clone(&exec), opts).await.is_err());
    assert!(exec.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn concurrent_users_keep_their_own_sessions() {
    // The token echoes the last path segment, so each user's token names its own user.
    let exec = MockExecutor::new(Duration::from_millis(100), |req| {
        let last = req.url.rsplit('/').next().unwrap_or_default();
        Ok(json(200, &format!(r#"{{"token":"{last}"}}"#)))
    });
    let records = (0..4)
        .map(|i| FeederRecord::new([("username", format!("u{i}"))]))
        .collect();
    let login = get("login", "/login/#{username}").check(
        Check::exists("$.token")
            .unwrap_or_else(|e| panic!("{e}"))
            .save_as("token"),
    );
    let chain = Chain::new()
        .exec(login)
        .pause(Pause::fixed(Duration::from_secs(1)))
        .exec(get("profile", "/profile/#{username}/#{token}"));
    let sim = simulation(chain, InjectionProfile::at_once(4))
        .with_feeder(Feeder::from_records(FeederStrategy::Once, records));

    let report = run(sim, Arc::clone(&exec), RunOptions::default())
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    let mut profiles: Vec<String> = exec
        .calls()
        .into_iter()
        .filter(|c| c.url.contains("/profile/"))
        .map(|c| c.url)
        .collect();
    profiles.sort();
    assert_eq!(
        profiles,
        (0..4)
            .map(|i| format!("http://mock.local/profile/u{i}/u{i}"))
            .collect::<Vec<_>>()
    );
    assert_eq!(report.users.completed, 4);
    assert!(report.verdict.is_pass());
}

#[tokio::test(start_paused = true)]
async fn steps_run_in_order_and_extractions_feed_later_steps() {
    let exec = MockExecutor::new(Duration::ZERO, |_| Ok(json(200, r#"{"next":"n42"}"#)));
    let first = get("first", "/first?attempt=#{attempt}").check(
        Check::exists("$.next")
            .unwrap_or_else(|e| panic!("{e}"))
            .save_as("next"),
    );
    let chain = Chain::new()
        .transform("seed", |s: Session| s.set("attempt", 1))
        .pause(Pause::fixed(Duration::from_secs(2)))
        .exec(first)
        .transform("bump", |s: Session| {
            let n = s.get_int("attempt").unwrap_or(0);
            s.set("attempt", n + 1)
        })
        .exec(get("second", "/second/#{next}?attempt=#{attempt}"));
    let sim = simulation(chain, InjectionProfile::at_once(1));

    let report = run(sim, Arc::clone(&exec), RunOptions::default())
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    let calls = exec.calls();
    let urls: Vec<&str> = calls.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(
        urls,
        [
            "http://mock.local/first?attempt=1",
            "http://mock.local/second/n42?attempt=2",
        ]
    );
    assert_eq!(calls[0].at, Duration::from_secs(2));
    assert_eq!(calls[1].at, Duration::from_secs(2));
    let names: Vec<&str> = report.stats.requests.iter().map(|r| r.name.as_ref()).collect();
    assert_eq!(names, ["first", "second"]);
    assert_eq!(report.users.completed, 1);
}

#[tokio::test(start_paused = true)]
async fn missing_template_key_fails_the_user_without_a_record() {
    let exec = MockExecutor::ok(Duration::from_millis(10));
    let chain = Chain::new()
        .exec(get("home", "/"))
        .exec(get("needs token", "/games/#{authToken}"))
        .exec(get("never", "/never"));
    let sim = simulation(chain, InjectionProfile::at_once(3));

    let report = run(sim, Arc::clone(&exec), RunOptions::default())
        .await
        .unwrap_or_else(|e| panic!("run failed: {e}"));

    assert_eq!(exec.calls().len(), 3);
    assert!(exec.calls().iter().all(|c| c.url == "http://mock.local/"));
    assert_eq!(report.stats.global.count, 3);
    assert_eq!(report.stats.global.ko, 0);
    assert!(report.stats.request("needs token").is_none());
    assert!(report.stats.request("never").is_none());
    assert_eq!(report.users.failed, 3);
    assert_eq!(report.users.completed, 0);
}
