use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::{
    collections::{hash_map::Entry, HashMap},
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

const DEFAULT_PORT: u16 = 17700;
const MAX_NAME_LEN: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "usage_store", version)]
struct Args {
    /// Listen address.
    ///
    /// Accepts:
    /// - ip:port (recommended), e.g. 127.0.0.1:17700
    /// - ip (implies port 17700), e.g. 127.0.0.1
    /// - localhost or localhost:port
    #[arg(long, default_value = "127.0.0.1:17700")]
    listen: String,

    /// Directory holding one SQLite file per database name.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Keep every database in memory. Nothing survives a restart.
    #[arg(long, default_value_t = false)]
    memory: bool,
}

#[derive(Clone)]
struct AppState {
    /// `None` keeps databases in memory.
    data_dir: Option<PathBuf>,
    dbs: Arc<Mutex<HashMap<String, Connection>>>,
}

impl AppState {
    fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir,
            dbs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn open_db(&self, name: &str) -> rusqlite::Result<Connection> {
        let conn = match &self.data_dir {
            Some(dir) => Connection::open(dir.join(format!("{name}.db")))?,
            None => Connection::open_in_memory()?,
        };
        init_db(&conn)?;
        Ok(conn)
    }
}

#[derive(Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
struct SessionLog {
    start_time: String,
    end_time: String,
    duration_seconds: f64,
    date: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
struct ExtensionTime {
    extension: String,
    total_duration_seconds: f64,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct ActivityLog {
    date: String,
    lines_added: i64,
    lines_deleted: i64,
    words_added: i64,
    words_deleted: i64,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct ActivityDelta {
    #[serde(default)]
    lines_added: i64,
    #[serde(default)]
    lines_deleted: i64,
    #[serde(default)]
    words_added: i64,
    #[serde(default)]
    words_deleted: i64,
}

#[derive(Deserialize)]
struct SessionLookup {
    date: Option<String>,
    start_time: Option<String>,
}

#[derive(Deserialize)]
struct IncrementRequest {
    seconds: f64,
}

#[derive(Serialize)]
struct IncrementResult {
    matched: usize,
}

#[derive(Serialize)]
struct InsertResult {
    inserted: bool,
}

#[derive(Deserialize)]
struct SummaryQuery {
    /// Date in YYYY-MM-DD. Defaults to today (UTC).
    date: Option<String>,
}

#[derive(Serialize)]
struct DaySummary {
    date: String,
    session_count: usize,
    session_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    activity: Option<ActivityLog>,
    extensions: Vec<ExtensionTime>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "usage_store=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let data_dir = if args.memory {
        None
    } else {
        std::fs::create_dir_all(&args.data_dir)?;
        Some(args.data_dir.clone())
    };
    let state = AppState::new(data_dir);

    let addr = parse_listen(&args.listen)?;
    info!("Store listening on http://{addr}");
    match &state.data_dir {
        Some(dir) => info!("Data dir: {}", dir.display()),
        None => info!("Data dir: <memory>"),
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/db/:db/usage_log", get(get_session).post(post_session))
        .route("/db/:db/usage_log/day/:date", get(get_sessions_for_day))
        .route(
            "/db/:db/file_extension_time",
            get(get_extension_times).post(post_extension_time),
        )
        .route("/db/:db/file_extension_time/:ext", get(get_extension_time))
        .route(
            "/db/:db/file_extension_time/:ext/inc",
            post(post_extension_time_inc),
        )
        .route("/db/:db/file_activity_log/:date", get(get_activity))
        .route("/db/:db/file_activity_log/:date/inc", post(post_activity_inc))
        .route("/db/:db/summary", get(get_summary))
        .with_state(state)
        .layer(cors)
}

fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    if input == "localhost" {
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT));
    }

    if let Some((host, port_str)) = input.rsplit_once(':') {
        let ip = if host == "localhost" {
            Some(IpAddr::from([127, 0, 0, 1]))
        } else {
            // IPv6 without brackets (best effort): ::1:17700
            host.parse::<IpAddr>().ok()
        };
        if let Some(ip) = ip {
            let port: u16 = port_str.parse().map_err(|_| {
                anyhow::anyhow!(
                    "invalid --listen '{}': bad port. Example: 127.0.0.1:{}",
                    input,
                    DEFAULT_PORT
                )
            })?;
            return Ok(SocketAddr::new(ip, port));
        }
    }

    Err(anyhow::anyhow!(
        "invalid --listen '{}'. Use ip:port (e.g. 127.0.0.1:{}) or ip (e.g. 127.0.0.1).",
        input,
        DEFAULT_PORT
    ))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(HealthInfo {
            service: "usage_store",
            version: env!("CARGO_PKG_VERSION"),
        }),
    })
}

fn err_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrResponse { ok: false, error })).into_response()
}

fn ok_response<T: Serialize>(data: Option<T>) -> Response {
    Json(OkResponse { ok: true, data }).into_response()
}

/// Runs `f` against the named database, opening (and initialising) it on first use.
async fn with_db<T>(
    state: &AppState,
    db: &str,
    op: &'static str,
    f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
) -> Result<T, Response> {
    if !is_valid_name(db) {
        return Err(err_response(StatusCode::BAD_REQUEST, "invalid_db"));
    }

    let mut dbs = state.dbs.lock().await;
    let conn = match dbs.entry(db.to_string()) {
        Entry::Occupied(e) => e.into_mut(),
        Entry::Vacant(e) => match state.open_db(db) {
            Ok(conn) => {
                info!("opened database {db}");
                e.insert(conn)
            }
            Err(err) => {
                error!("open database {db} failed: {err}");
                return Err(err_response(StatusCode::INTERNAL_SERVER_ERROR, "db_error"));
            }
        },
    };

    f(conn).map_err(|err| {
        error!("{op} failed: {err}");
        err_response(StatusCode::INTERNAL_SERVER_ERROR, "db_error")
    })
}

async fn get_session(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Query(q): Query<SessionLookup>,
) -> Response {
    let (Some(date), Some(start_time)) = (q.date, q.start_time) else {
        return err_response(StatusCode::BAD_REQUEST, "missing_filter");
    };
    if parse_date(&date).is_none() {
        return err_response(StatusCode::BAD_REQUEST, "invalid_date");
    }

    match with_db(&state, &db, "find_session", |conn| {
        find_session(conn, &date, &start_time)
    })
    .await
    {
        Ok(found) => ok_response(found),
        Err(resp) => resp,
    }
}

async fn post_session(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Json(log): Json<SessionLog>,
) -> Response {
    if let Err(code) = validate_session(&log) {
        return err_response(StatusCode::BAD_REQUEST, code);
    }

    let created_at = now_rfc3339();
    match with_db(&state, &db, "insert_session", |conn| {
        insert_session(conn, &log, &created_at)
    })
    .await
    {
        Ok(()) => ok_response(Some(InsertResult { inserted: true })),
        Err(resp) => resp,
    }
}

async fn get_sessions_for_day(
    State(state): State<AppState>,
    Path((db, date)): Path<(String, String)>,
) -> Response {
    if parse_date(&date).is_none() {
        return err_response(StatusCode::BAD_REQUEST, "invalid_date");
    }

    match with_db(&state, &db, "list_sessions", |conn| list_sessions(conn, &date)).await {
        Ok(rows) => ok_response(Some(rows)),
        Err(resp) => resp,
    }
}

async fn get_extension_times(State(state): State<AppState>, Path(db): Path<String>) -> Response {
    match with_db(&state, &db, "list_extension_times", list_extension_times).await {
        Ok(rows) => ok_response(Some(rows)),
        Err(resp) => resp,
    }
}

async fn get_extension_time(
    State(state): State<AppState>,
    Path((db, ext)): Path<(String, String)>,
) -> Response {
    if !is_valid_extension(&ext) {
        return err_response(StatusCode::BAD_REQUEST, "invalid_extension");
    }

    match with_db(&state, &db, "find_extension_time", |conn| {
        find_extension_time(conn, &ext)
    })
    .await
    {
        Ok(found) => ok_response(found),
        Err(resp) => resp,
    }
}

async fn post_extension_time(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Json(rec): Json<ExtensionTime>,
) -> Response {
    if !is_valid_extension(&rec.extension) {
        return err_response(StatusCode::BAD_REQUEST, "invalid_extension");
    }
    if !is_valid_seconds(rec.total_duration_seconds) {
        return err_response(StatusCode::BAD_REQUEST, "invalid_duration");
    }

    let updated_at = now_rfc3339();
    match with_db(&state, &db, "insert_extension_time", |conn| {
        insert_extension_time(conn, &rec, &updated_at)
    })
    .await
    {
        Ok(true) => ok_response(Some(InsertResult { inserted: true })),
        Ok(false) => err_response(StatusCode::CONFLICT, "duplicate"),
        Err(resp) => resp,
    }
}

async fn post_extension_time_inc(
    State(state): State<AppState>,
    Path((db, ext)): Path<(String, String)>,
    Json(req): Json<IncrementRequest>,
) -> Response {
    if !is_valid_extension(&ext) {
        return err_response(StatusCode::BAD_REQUEST, "invalid_extension");
    }
    if !is_valid_seconds(req.seconds) {
        return err_response(StatusCode::BAD_REQUEST, "invalid_duration");
    }

    let updated_at = now_rfc3339();
    match with_db(&state, &db, "increment_extension_time", |conn| {
        increment_extension_time(conn, &ext, req.seconds, &updated_at)
    })
    .await
    {
        Ok(matched) => ok_response(Some(IncrementResult { matched })),
        Err(resp) => resp,
    }
}

async fn get_activity(
    State(state): State<AppState>,
    Path((db, date)): Path<(String, String)>,
) -> Response {
    if parse_date(&date).is_none() {
        return err_response(StatusCode::BAD_REQUEST, "invalid_date");
    }

    match with_db(&state, &db, "find_activity", |conn| find_activity(conn, &date)).await {
        Ok(found) => ok_response(found),
        Err(resp) => resp,
    }
}

async fn post_activity_inc(
    State(state): State<AppState>,
    Path((db, date)): Path<(String, String)>,
    Json(delta): Json<ActivityDelta>,
) -> Response {
    if parse_date(&date).is_none() {
        return err_response(StatusCode::BAD_REQUEST, "invalid_date");
    }

    let updated_at = now_rfc3339();
    match with_db(&state, &db, "upsert_activity", |conn| {
        upsert_activity(conn, &date, delta, &updated_at)?;
        find_activity(conn, &date)
    })
    .await
    {
        Ok(row) => ok_response(row),
        Err(resp) => resp,
    }
}

async fn get_summary(
    State(state): State<AppState>,
    Path(db): Path<String>,
    Query(q): Query<SummaryQuery>,
) -> Response {
    let date = match q.date {
        Some(d) if parse_date(&d).is_some() => d,
        Some(_) => return err_response(StatusCode::BAD_REQUEST, "invalid_date"),
        None => today_utc(),
    };

    match with_db(&state, &db, "day_summary", |conn| day_summary(conn, &date)).await {
        Ok(summary) => ok_response(Some(summary)),
        Err(resp) => resp,
    }
}

fn validate_session(log: &SessionLog) -> Result<(), &'static str> {
    if parse_date(&log.date).is_none() {
        return Err("invalid_date");
    }
    if OffsetDateTime::parse(&log.start_time, &Rfc3339).is_err()
        || OffsetDateTime::parse(&log.end_time, &Rfc3339).is_err()
    {
        return Err("invalid_ts");
    }
    if !is_valid_seconds(log.duration_seconds) {
        return Err("invalid_duration");
    }
    Ok(())
}

fn is_valid_name(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_NAME_LEN
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_extension(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_NAME_LEN
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_seconds(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

fn parse_date(date: &str) -> Option<time::Date> {
    // Strict YYYY-MM-DD.
    let parts: Vec<&str> = date.split('-').collect();
    if parts.len() != 3 || parts[0].len() != 4 || parts[1].len() != 2 || parts[2].len() != 2 {
        return None;
    }
    let y: i32 = parts[0].parse().ok()?;
    let m: u8 = parts[1].parse().ok()?;
    let d: u8 = parts[2].parse().ok()?;
    let month = time::Month::try_from(m).ok()?;
    time::Date::from_calendar_date(y, month, d).ok()
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

fn today_utc() -> String {
    let d = OffsetDateTime::now_utc().date();
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}

fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS usage_log (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  start_time TEXT NOT NULL,
  end_time TEXT NOT NULL,
  duration_seconds REAL NOT NULL,
  date TEXT NOT NULL,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_usage_log_date_start ON usage_log(date, start_time);

CREATE TABLE IF NOT EXISTS file_extension_time (
  extension TEXT PRIMARY KEY,
  total_duration_seconds REAL NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS file_activity_log (
  date TEXT PRIMARY KEY,
  lines_added INTEGER NOT NULL DEFAULT 0,
  lines_deleted INTEGER NOT NULL DEFAULT 0,
  words_added INTEGER NOT NULL DEFAULT 0,
  words_deleted INTEGER NOT NULL DEFAULT 0,
  updated_at TEXT NOT NULL
);
"#,
    )
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionLog> {
    Ok(SessionLog {
        start_time: row.get(0)?,
        end_time: row.get(1)?,
        duration_seconds: row.get(2)?,
        date: row.get(3)?,
    })
}

fn find_session(
    conn: &mut Connection,
    date: &str,
    start_time: &str,
) -> rusqlite::Result<Option<SessionLog>> {
    conn.query_row(
        "SELECT start_time, end_time, duration_seconds, date FROM usage_log WHERE date = ?1 AND start_time = ?2 ORDER BY id LIMIT 1",
        (date, start_time),
        session_from_row,
    )
    .optional()
}

fn insert_session(conn: &mut Connection, log: &SessionLog, created_at: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO usage_log (start_time, end_time, duration_seconds, date, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            &log.start_time,
            &log.end_time,
            log.duration_seconds,
            &log.date,
            created_at,
        ),
    )?;
    Ok(())
}

fn list_sessions(conn: &mut Connection, date: &str) -> rusqlite::Result<Vec<SessionLog>> {
    let mut stmt = conn.prepare(
        "SELECT start_time, end_time, duration_seconds, date FROM usage_log WHERE date = ?1 ORDER BY start_time ASC, id ASC",
    )?;
    let rows = stmt.query_map([date], session_from_row)?;
    rows.collect()
}

fn find_extension_time(conn: &mut Connection, ext: &str) -> rusqlite::Result<Option<ExtensionTime>> {
    conn.query_row(
        "SELECT extension, total_duration_seconds FROM file_extension_time WHERE extension = ?1",
        [ext],
        |row| {
            Ok(ExtensionTime {
                extension: row.get(0)?,
                total_duration_seconds: row.get(1)?,
            })
        },
    )
    .optional()
}

fn list_extension_times(conn: &mut Connection) -> rusqlite::Result<Vec<ExtensionTime>> {
    let mut stmt = conn.prepare(
        "SELECT extension, total_duration_seconds FROM file_extension_time ORDER BY total_duration_seconds DESC, extension ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ExtensionTime {
            extension: row.get(0)?,
            total_duration_seconds: row.get(1)?,
        })
    })?;
    rows.collect()
}

/// Returns `false` when a record for the extension already exists.
fn insert_extension_time(
    conn: &mut Connection,
    rec: &ExtensionTime,
    updated_at: &str,
) -> rusqlite::Result<bool> {
    let n = conn.execute(
        r#"
INSERT INTO file_extension_time (extension, total_duration_seconds, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(extension) DO NOTHING
        "#,
        (&rec.extension, rec.total_duration_seconds, updated_at),
    )?;
    Ok(n == 1)
}

fn increment_extension_time(
    conn: &mut Connection,
    ext: &str,
    seconds: f64,
    updated_at: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE file_extension_time SET total_duration_seconds = total_duration_seconds + ?2, updated_at = ?3 WHERE extension = ?1",
        (ext, seconds, updated_at),
    )
}

fn find_activity(conn: &mut Connection, date: &str) -> rusqlite::Result<Option<ActivityLog>> {
    conn.query_row(
        "SELECT date, lines_added, lines_deleted, words_added, words_deleted FROM file_activity_log WHERE date = ?1",
        [date],
        |row| {
            Ok(ActivityLog {
                date: row.get(0)?,
                lines_added: row.get(1)?,
                lines_deleted: row.get(2)?,
                words_added: row.get(3)?,
                words_deleted: row.get(4)?,
            })
        },
    )
    .optional()
}

fn upsert_activity(
    conn: &mut Connection,
    date: &str,
    delta: ActivityDelta,
    updated_at: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        r#"
INSERT INTO file_activity_log (date, lines_added, lines_deleted, words_added, words_deleted, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(date) DO UPDATE SET
  lines_added = lines_added + excluded.lines_added,
  lines_deleted = lines_deleted + excluded.lines_deleted,
  words_added = words_added + excluded.words_added,
  words_deleted = words_deleted + excluded.words_deleted,
  updated_at = excluded.updated_at
        "#,
        (
            date,
            delta.lines_added,
            delta.lines_deleted,
            delta.words_added,
            delta.words_deleted,
            updated_at,
        ),
    )?;
    Ok(())
}

fn day_summary(conn: &mut Connection, date: &str) -> rusqlite::Result<DaySummary> {
    let sessions = list_sessions(conn, date)?;
    Ok(DaySummary {
        date: date.to_string(),
        session_count: sessions.len(),
        session_seconds: sessions.iter().map(|s| s.duration_seconds).sum(),
        activity: find_activity(conn, date)?,
        extensions: list_extension_times(conn)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn
    }

    fn session(date: &str, start: &str) -> SessionLog {
        SessionLog {
            start_time: start.to_string(),
            end_time: "2026-10-17T10:00:00.000Z".to_string(),
            duration_seconds: 90.5,
            date: date.to_string(),
        }
    }

    #[test]
    fn parse_listen_accepts_common_forms() {
        assert_eq!(
            parse_listen("127.0.0.1:9000").unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(parse_listen("0.0.0.0").unwrap().port(), DEFAULT_PORT);
        assert_eq!(
            parse_listen("localhost:8080").unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(parse_listen("localhost").unwrap().port(), DEFAULT_PORT);
        assert!(parse_listen("localhost:notaport").is_err());
        assert!(parse_listen("example.com:80").is_err());
    }

    #[test]
    fn parse_date_is_strict() {
        assert!(parse_date("2026-10-17").is_some());
        assert!(parse_date("2026-02-30").is_none());
        assert!(parse_date("2026-1-07").is_none());
        assert!(parse_date("20261017").is_none());
        assert!(parse_date("").is_none());
    }

    #[test]
    fn names_and_extensions_are_validated() {
        assert!(is_valid_name("editor_usage"));
        assert!(is_valid_name("vsCodeUsageDB-2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("../etc"));
        assert!(!is_valid_name(&"x".repeat(MAX_NAME_LEN + 1)));

        assert!(is_valid_extension("rs"));
        assert!(is_valid_extension("d_ts"));
        assert!(!is_valid_extension(".rs"));
        assert!(!is_valid_extension("c++"));
    }

    #[test]
    fn session_lookup_matches_exact_date_and_start() {
        let mut conn = mem_conn();
        let a = session("2026-10-17", "2026-10-17T08:00:00.000Z");
        insert_session(&mut conn, &a, "now").unwrap();

        assert_eq!(
            find_session(&mut conn, "2026-10-17", "2026-10-17T08:00:00.000Z").unwrap(),
            Some(a)
        );
        assert_eq!(
            find_session(&mut conn, "2026-10-17", "2026-10-17T08:00:00.001Z").unwrap(),
            None
        );
        assert_eq!(
            find_session(&mut conn, "2026-10-18", "2026-10-17T08:00:00.000Z").unwrap(),
            None
        );
    }

    #[test]
    fn extension_insert_is_unique_and_increment_accumulates() {
        let mut conn = mem_conn();
        let rec = ExtensionTime {
            extension: "rs".to_string(),
            total_duration_seconds: 10.0,
        };
        assert!(insert_extension_time(&mut conn, &rec, "t0").unwrap());
        assert!(!insert_extension_time(&mut conn, &rec, "t1").unwrap());

        assert_eq!(increment_extension_time(&mut conn, "rs", 2.5, "t2").unwrap(), 1);
        assert_eq!(increment_extension_time(&mut conn, "ts", 2.5, "t2").unwrap(), 0);

        let found = find_extension_time(&mut conn, "rs").unwrap().unwrap();
        assert_eq!(found.total_duration_seconds, 12.5);
        assert!(find_extension_time(&mut conn, "ts").unwrap().is_none());
    }

    #[test]
    fn activity_upsert_initialises_then_increments() {
        let mut conn = mem_conn();
        let delta = ActivityDelta {
            lines_added: 3,
            lines_deleted: 1,
            words_added: 7,
            words_deleted: -2,
        };
        upsert_activity(&mut conn, "2026-10-17", delta, "t0").unwrap();
        let first = find_activity(&mut conn, "2026-10-17").unwrap().unwrap();
        assert_eq!(first.lines_added, 3);
        assert_eq!(first.words_deleted, -2);

        upsert_activity(&mut conn, "2026-10-17", delta, "t1").unwrap();
        let second = find_activity(&mut conn, "2026-10-17").unwrap().unwrap();
        assert_eq!(
            second,
            ActivityLog {
                date: "2026-10-17".to_string(),
                lines_added: 6,
                lines_deleted: 2,
                words_added: 14,
                words_deleted: -4,
            }
        );
        assert!(find_activity(&mut conn, "2026-10-18").unwrap().is_none());
    }

    #[test]
    fn day_summary_totals_sessions() {
        let mut conn = mem_conn();
        insert_session(&mut conn, &session("2026-10-17", "2026-10-17T08:00:00.000Z"), "t").unwrap();
        insert_session(&mut conn, &session("2026-10-17", "2026-10-17T09:00:00.000Z"), "t").unwrap();
        insert_session(&mut conn, &session("2026-10-16", "2026-10-16T09:00:00.000Z"), "t").unwrap();
        insert_extension_time(
            &mut conn,
            &ExtensionTime {
                extension: "md".to_string(),
                total_duration_seconds: 4.0,
            },
            "t",
        )
        .unwrap();

        let s = day_summary(&mut conn, "2026-10-17").unwrap();
        assert_eq!(s.session_count, 2);
        assert_eq!(s.session_seconds, 181.0);
        assert!(s.activity.is_none());
        assert_eq!(s.extensions.len(), 1);
    }

    #[test]
    fn validate_session_rejects_bad_fields() {
        let good = session("2026-10-17", "2026-10-17T08:00:00.000Z");
        assert!(validate_session(&good).is_ok());

        let mut bad = good.clone();
        bad.start_time = "yesterday".to_string();
        assert_eq!(validate_session(&bad), Err("invalid_ts"));

        let mut bad = good.clone();
        bad.duration_seconds = -1.0;
        assert_eq!(validate_session(&bad), Err("invalid_duration"));

        let mut bad = good;
        bad.date = "17/10/2026".to_string();
        assert_eq!(validate_session(&bad), Err("invalid_date"));
    }

    #[tokio::test]
    async fn handlers_round_trip_through_memory_state() {
        let state = AppState::new(None);

        let resp = post_extension_time(
            State(state.clone()),
            Path("editor_usage".to_string()),
            Json(ExtensionTime {
                extension: "rs".to_string(),
                total_duration_seconds: 1.0,
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = post_extension_time(
            State(state.clone()),
            Path("editor_usage".to_string()),
            Json(ExtensionTime {
                extension: "rs".to_string(),
                total_duration_seconds: 1.0,
            }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = post_extension_time_inc(
            State(state.clone()),
            Path(("editor_usage".to_string(), "rs".to_string())),
            Json(IncrementRequest { seconds: 2.0 }),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let total = with_db(&state, "editor_usage", "test", |conn| {
            find_extension_time(conn, "rs")
        })
        .await
        .ok()
        .flatten()
        .map(|r| r.total_duration_seconds);
        assert_eq!(total, Some(3.0));

        let resp = get_extension_times(State(state.clone()), Path("../bad".to_string())).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn wire_shapes_match_tracker_payloads() {
        let missing = serde_json::to_value(OkResponse::<SessionLog> {
            ok: true,
            data: None,
        })
        .unwrap();
        assert_eq!(missing, serde_json::json!({ "ok": true, "data": null }));

        let dup = serde_json::to_value(ErrResponse {
            ok: false,
            error: "duplicate",
        })
        .unwrap();
        assert_eq!(dup, serde_json::json!({ "ok": false, "error": "duplicate" }));

        let delta: ActivityDelta = serde_json::from_str(
            r#"{"linesAdded":1,"linesDeleted":2,"wordsAdded":3,"wordsDeleted":-4}"#,
        )
        .unwrap();
        assert_eq!(
            delta,
            ActivityDelta {
                lines_added: 1,
                lines_deleted: 2,
                words_added: 3,
                words_deleted: -4,
            }
        );

        let partial: ActivityDelta = serde_json::from_str(r#"{"wordsAdded":5}"#).unwrap();
        assert_eq!(partial.words_added, 5);
        assert_eq!(partial.lines_added, 0);
    }
}
