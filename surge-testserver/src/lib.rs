use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_LOGIN: &str = "/login";
pub const PATH_QUESTIONS: &str = "/questionsDB";
pub const PATH_SAVE_STATS: &str = "/savestats";
pub const PATH_GET_STATS: &str = "/getstats/{username}";
pub const PATH_GAMES: &str = "/games/{username}";
pub const PATH_RATIOS: &str = "/ratios-per-month/{username}";
pub const PATH_SLOW: &str = "/slow";

/// Request counters, readable from tests while the server runs.
#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    logins: Arc<AtomicU64>,
    login_rejected: Arc<AtomicU64>,
    stats_saved: Arc<AtomicU64>,
    unauthorized: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn logins(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    pub fn login_rejected(&self) -> u64 {
        self.login_rejected.load(Ordering::Relaxed)
    }

    pub fn stats_saved(&self) -> u64 {
        self.stats_saved.load(Ordering::Relaxed)
    }

    pub fn unauthorized(&self) -> u64 {
        self.unauthorized.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Game {
    username: String,
    right_answers: i64,
    wrong_answers: i64,
    time: i64,
    score: i64,
    win: bool,
    #[serde(alias = "date")]
    current_date: String,
    game_mode: String,
}

#[derive(Debug, Default)]
struct Store {
    /// username -> password. Empty means any non-empty credentials are accepted.
    accounts: HashMap<String, String>,
    tokens: HashMap<String, String>,
    games: HashMap<String, Vec<Game>>,
    next_token: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AppState {
    stats: TestServerStats,
    store: Arc<Mutex<Store>>,
}

impl AppState {
    pub fn new(stats: TestServerStats, accounts: &[(&str, &str)]) -> Self {
        let store = Store {
            accounts: accounts
                .iter()
                .map(|(u, p)| (u.to_string(), p.to_string()))
                .collect(),
            ..Store::default()
        };
        Self {
            stats,
            store: Arc::new(Mutex::new(store)),
        }
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn handle_login(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> (StatusCode, Json<Value>) {
    TestServerStats::inc(&state.stats.requests_total);

    let Ok(req) = serde_json::from_slice::<LoginRequest>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid login payload" })),
        );
    };

    let mut store = state.store();
    let accepted = if store.accounts.is_empty() {
        !req.username.is_empty() && !req.password.is_empty()
    } else {
        store.accounts.get(&req.username) == Some(&req.password)
    };
    if !accepted {
        TestServerStats::inc(&state.stats.login_rejected);
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid credentials" })),
        );
    }

    store.next_token += 1;
    let token = format!("tok-{}-{}", req.username, store.next_token);
    store.tokens.insert(token.clone(), req.username.clone());
    TestServerStats::inc(&state.stats.logins);

    (
        StatusCode::OK,
        Json(json!({ "token": token, "username": req.username })),
    )
}

async fn handle_questions(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    TestServerStats::inc(&state.stats.requests_total);

    let n: usize = query
        .get("n")
        .and_then(|v| v.parse().ok())
        .unwrap_or(10)
        .min(100);
    let topic = query.get("topic").map(String::as_str).unwrap_or("all");

    let questions: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "id": i,
                "topic": topic,
                "question": format!("Question {i}?"),
                "answers": ["a", "b", "c", "d"],
                "correct": i % 4,
            })
        })
        .collect();
    Json(Value::Array(questions))
}

async fn handle_save_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> (StatusCode, Json<Value>) {
    TestServerStats::inc(&state.stats.requests_total);

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default();

    let Ok(game) = serde_json::from_slice::<Game>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid stats payload" })),
        );
    };

    let mut store = state.store();
    if store.tokens.get(token) != Some(&game.username) {
        TestServerStats::inc(&state.stats.unauthorized);
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid token" })),
        );
    }

    store
        .games
        .entry(game.username.clone())
        .or_default()
        .push(game);
    TestServerStats::inc(&state.stats.stats_saved);

    (StatusCode::OK, Json(json!({ "saved": true })))
}

async fn handle_get_stats(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Json<Value> {
    TestServerStats::inc(&state.stats.requests_total);

    let store = state.store();
    let games = store.games.get(&username).map(Vec::as_slice).unwrap_or(&[]);
    let wins = games.iter().filter(|g| g.win).count();
    let total_score: i64 = games.iter().map(|g| g.score).sum();
    let right: i64 = games.iter().map(|g| g.right_answers).sum();
    let wrong: i64 = games.iter().map(|g| g.wrong_answers).sum();

    Json(json!({
        "username": username,
        "gamesPlayed": games.len(),
        "wins": wins,
        "totalScore": total_score,
        "rightAnswers": right,
        "wrongAnswers": wrong,
    }))
}

async fn handle_games(State(state): State<AppState>, Path(username): Path<String>) -> Json<Value> {
    TestServerStats::inc(&state.stats.requests_total);

    let store = state.store();
    let games = store.games.get(&username).cloned().unwrap_or_default();
    Json(serde_json::to_value(games).unwrap_or(Value::Array(Vec::new())))
}

async fn handle_ratios(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Json<Value> {
    TestServerStats::inc(&state.stats.requests_total);

    let store = state.store();
    let mut by_month: HashMap<String, (i64, i64)> = HashMap::new();
    for game in store.games.get(&username).map(Vec::as_slice).unwrap_or(&[]) {
        // RFC 3339: the first 7 bytes are `YYYY-MM`.
        let month = game.current_date.get(..7).unwrap_or("unknown").to_string();
        let entry = by_month.entry(month).or_default();
        entry.0 += game.right_answers;
        entry.1 += game.wrong_answers;
    }

    let mut months: Vec<_> = by_month.into_iter().collect();
    months.sort_by(|a, b| a.0.cmp(&b.0));
    let ratios: Vec<Value> = months
        .into_iter()
        .map(|(month, (right, wrong))| {
            json!({ "month": month, "rightAnswers": right, "wrongAnswers": wrong })
        })
        .collect();
    Json(Value::Array(ratios))
}

async fn handle_slow(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> &'static str {
    TestServerStats::inc(&state.stats.requests_total);
    let ms: u64 = query
        .get("ms")
        .and_then(|v| v.parse().ok())
        .unwrap_or(5_000);
    sleep(Duration::from_millis(ms)).await;
    "slow"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(PATH_LOGIN, post(handle_login))
        .route(PATH_QUESTIONS, get(handle_questions))
        .route(PATH_SAVE_STATS, post(handle_save_stats))
        .route(PATH_GET_STATS, get(handle_get_stats))
        .route(PATH_GAMES, get(handle_games))
        .route(PATH_RATIOS, get(handle_ratios))
        .route(PATH_SLOW, get(handle_slow))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Starts on an ephemeral port, accepting any non-empty credentials.
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with_accounts(&[]).await
    }

    /// Starts with a fixed account list; other credentials get `401`.
    pub async fn start_with_accounts(accounts: &[(&str, &str)]) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(AppState::new(stats.clone(), accounts));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
