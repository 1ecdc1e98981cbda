use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

use snapcal_core::SnapcalError;
use snapcal_core::analysis::FoodAnalyzer;
use snapcal_core::db::Database;
use snapcal_core::models::{FoodItem, FoodItemUpdate, MAX_IMAGE_BYTES, sum_calories};
use snapcal_core::notify::Notification;
use snapcal_core::rollup::{DailyProgress, RollupDay, RollupStats};
use snapcal_core::session::{AnalysisOutcome, SaveOutcome, SessionController, SessionState};

// Leaves room above the image cap so oversized photos get a readable 400.
const BODY_LIMIT: usize = MAX_IMAGE_BYTES + 1024 * 1024;

#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<SessionController<Database>>>,
    analyzer: Option<Arc<dyn FoodAnalyzer>>,
    api_key: Option<String>,
}

impl AppState {
    fn session(&self) -> MutexGuard<'_, SessionController<Database>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session with goal and ledger changes made by other processes picked
    /// up. A degraded store keeps its memory-only values instead.
    fn synced_session(&self) -> MutexGuard<'_, SessionController<Database>> {
        let mut session = self.session();
        if !session.store().is_degraded() {
            session.refresh();
        }
        session
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct SetGoalRequest {
    goal_kcal: f64,
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

#[derive(Deserialize)]
struct WeekQuery {
    end: Option<String>,
}

#[derive(Serialize)]
struct GoalResponse {
    goal_kcal: f64,
    configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<Notification>,
}

#[derive(Serialize)]
struct TodayResponse {
    date: NaiveDate,
    #[serde(flatten)]
    progress: DailyProgress,
}

#[derive(Serialize)]
struct WeekResponse {
    days: Vec<RollupDay>,
    stats: RollupStats,
}

#[derive(Serialize)]
struct ReviewResponse {
    state: &'static str,
    items: Vec<FoodItem>,
    total_kcal: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl ReviewResponse {
    fn from_state(state: &SessionState) -> Self {
        let (name, items, message) = match state {
            SessionState::Idle => ("idle", Vec::new(), None),
            SessionState::Analyzing { .. } => ("analyzing", Vec::new(), None),
            SessionState::Reviewing { items } => ("reviewing", items.clone(), None),
            SessionState::Failed { message } => ("failed", Vec::new(), Some(message.clone())),
        };
        Self {
            state: name,
            total_kcal: sum_calories(&items),
            items,
            message,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<Notification>,
}

// --- Error handling ---

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unprocessable(String),
    BadGateway(String),
    AnalysisFailed {
        message: String,
        notification: Notification,
    },
    ServiceUnavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut notification = None;
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::AnalysisFailed {
                message,
                notification: note,
            } => {
                notification = Some(note);
                (StatusCode::BAD_GATEWAY, message)
            }
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(err) => {
                error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                notification,
            }),
        )
            .into_response()
    }
}

impl From<SnapcalError> for ApiError {
    fn from(err: SnapcalError) -> Self {
        let message = err.to_string();
        match err {
            SnapcalError::Input(_) => Self::BadRequest(message),
            SnapcalError::Validation(_) => Self::Unprocessable(message),
            SnapcalError::ItemNotFound(_) => Self::NotFound(message),
            SnapcalError::GoalNotConfigured | SnapcalError::Busy | SnapcalError::NotReviewing => {
                Self::Conflict(message)
            }
            SnapcalError::Analysis(_) => Self::BadGateway(message),
        }
    }
}

fn parse_date_param(date: Option<String>) -> Result<NaiveDate, ApiError> {
    match date {
        None => Ok(chrono::Local::now().date_naive()),
        Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
            .map_err(|_| ApiError::BadRequest(format!("Invalid date '{d}'. Use YYYY-MM-DD"))),
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                    notification: None,
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Goal ---

async fn get_goal(State(state): State<AppState>) -> Json<GoalResponse> {
    let session = state.synced_session();
    Json(GoalResponse {
        goal_kcal: session.goal(),
        configured: !session.needs_goal_setup(),
        notification: None,
    })
}

async fn set_goal(
    State(state): State<AppState>,
    Json(req): Json<SetGoalRequest>,
) -> Result<Json<GoalResponse>, ApiError> {
    let mut session = state.session();
    let notification = session.set_goal(req.goal_kcal)?;
    Ok(Json(GoalResponse {
        goal_kcal: session.goal(),
        configured: true,
        notification: Some(notification),
    }))
}

// --- Progress ---

async fn get_today(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<Json<TodayResponse>, ApiError> {
    let date = parse_date_param(query.date)?;
    let session = state.synced_session();
    Ok(Json(TodayResponse {
        date,
        progress: session.progress(date),
    }))
}

async fn get_week(
    State(state): State<AppState>,
    Query(query): Query<WeekQuery>,
) -> Result<Json<WeekResponse>, ApiError> {
    let end = parse_date_param(query.end)?;
    let session = state.synced_session();
    let days = session.rollup(end);
    let stats = RollupStats::from_days(&days);
    Ok(Json(WeekResponse { days, stats }))
}

// --- Analysis and review ---

async fn create_analysis(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ReviewResponse>, ApiError> {
    let analyzer = state.analyzer.clone().ok_or_else(|| {
        ApiError::ServiceUnavailable(
            "No analyzer configured; set SNAPCAL_ANALYZER".to_string(),
        )
    })?;

    let (ticket, upload) = state.synced_session().begin_analysis(body.to_vec())?;

    let joined = tokio::task::spawn_blocking(move || analyzer.analyze(&upload)).await;

    let mut session = state.session();
    let response = match joined {
        Ok(response) => response,
        Err(e) => {
            session.complete_analysis(ticket, Err(anyhow::anyhow!("analyzer task failed")));
            return Err(ApiError::Internal(
                anyhow::Error::new(e).context("analyzer task failed"),
            ));
        }
    };
    match session.complete_analysis(ticket, response) {
        AnalysisOutcome::Reviewing { .. } => Ok(Json(ReviewResponse::from_state(session.state()))),
        AnalysisOutcome::Failed {
            message,
            notification,
        } => Err(ApiError::AnalysisFailed {
            message: format!("Failed to analyze image: {message}"),
            notification,
        }),
        AnalysisOutcome::Discarded => Err(ApiError::Conflict(
            "Analysis was cancelled before it finished".to_string(),
        )),
    }
}

async fn get_review(State(state): State<AppState>) -> Json<ReviewResponse> {
    Json(ReviewResponse::from_state(state.session().state()))
}

async fn update_review_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FoodItemUpdate>,
) -> Result<Json<FoodItem>, ApiError> {
    if req.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one field must be provided".to_string(),
        ));
    }
    let mut session = state.session();
    let item = session.update_item(&id, &req)?.clone();
    Ok(Json(item))
}

async fn delete_review_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.session().remove_item(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn save_review(State(state): State<AppState>) -> Result<Json<SaveOutcome>, ApiError> {
    let today = chrono::Local::now().date_naive();
    let outcome = state.synced_session().save(today)?;
    Ok(Json(outcome))
}

async fn cancel_review(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.session().cancel()?;
    Ok(StatusCode::NO_CONTENT)
}

async fn dismiss_failure(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if state.session().dismiss() {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Conflict("No failed analysis to dismiss".to_string()))
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/goal", get(get_goal).put(set_goal))
        .route("/api/today", get(get_today))
        .route("/api/week", get(get_week))
        .route("/api/analysis", post(create_analysis))
        .route("/api/review", get(get_review))
        .route(
            "/api/review/items/{id}",
            put(update_review_item).delete(delete_review_item),
        )
        .route("/api/review/save", post(save_review))
        .route("/api/review/cancel", post(cancel_review))
        .route("/api/review/dismiss", post(dismiss_failure))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// First and last four characters of `key`, or a placeholder when the key is
/// too short to abbreviate.
fn key_preview(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

pub async fn start_server(
    session: SessionController<Database>,
    analyzer: Option<Arc<dyn FoodAnalyzer>>,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    if analyzer.is_none() {
        eprintln!("Warning: SNAPCAL_ANALYZER is not set; photo analysis will return 503.");
    }

    let state = AppState {
        session: Arc::new(Mutex::new(session)),
        analyzer,
        api_key: api_key.clone(),
    };

    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {} (see api_key file in data directory)",
            key_preview(key)
        );
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    info!(%bind, port, "server started");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use snapcal_core::analysis::ImageUpload;
    use tower::ServiceExt;

    const JPEG: [u8; 6] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    struct FixedAnalyzer(Value);

    impl FoodAnalyzer for FixedAnalyzer {
        fn analyze(&self, _image: &ImageUpload) -> anyhow::Result<Value> {
            Ok(self.0.clone())
        }
    }

    struct FailingAnalyzer;

    impl FoodAnalyzer for FailingAnalyzer {
        fn analyze(&self, _image: &ImageUpload) -> anyhow::Result<Value> {
            anyhow::bail!("model overloaded")
        }
    }

    fn lunch() -> Value {
        json!([
            { "foodName": "rice", "calories": 300, "servingSizeGrams": 200 },
            { "foodName": "chicken", "calories": 250, "servingSizeGrams": 120 }
        ])
    }

    fn test_state(
        api_key: Option<String>,
        analyzer: Option<Arc<dyn FoodAnalyzer>>,
        goal: Option<f64>,
    ) -> AppState {
        let mut session = SessionController::new(Database::open_in_memory().unwrap());
        if let Some(goal) = goal {
            session.set_goal(goal).unwrap();
        }
        AppState {
            session: Arc::new(Mutex::new(session)),
            analyzer,
            api_key,
        }
    }

    fn test_app(api_key: Option<String>) -> Router {
        build_router(test_state(api_key, None, Some(2000.0)))
    }

    fn app_with_analyzer(analyzer: impl FoodAnalyzer + 'static) -> (AppState, Router) {
        let state = test_state(None, Some(Arc::new(analyzer)), Some(2000.0));
        let app = build_router(state.clone());
        (state, app)
    }

    async fn body_json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_image(bytes: &[u8]) -> axum::http::Request<Body> {
        axum::http::Request::post("/api/analysis")
            .header("content-type", "application/octet-stream")
            .body(Body::from(bytes.to_vec()))
            .unwrap()
    }

    fn post_empty(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::post(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/goal")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/goal")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some("test-key-abc123".to_string()));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/goal")
                    .header("Authorization", "Bearer test-key-abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app(None);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/goal")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let (_, app) = app_with_analyzer(FixedAnalyzer(lunch()));

        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = app.oneshot(post_image(&big_body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret database path /home/user/snapcal.db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = body_json(response).await;
        assert_eq!(json["error"], "Internal server error");
        assert!(!json["error"].as_str().unwrap().contains("secret"));
    }

    #[tokio::test]
    async fn goal_unconfigured_reports_default() {
        let app = build_router(test_state(None, None, None));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/goal")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["goal_kcal"], 2000.0);
        assert_eq!(json["configured"], false);
    }

    #[tokio::test]
    async fn set_goal_returns_notification() {
        let app = build_router(test_state(None, None, None));

        let response = app
            .oneshot(
                axum::http::Request::put("/api/goal")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"goal_kcal":1800}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["goal_kcal"], 1800.0);
        assert_eq!(json["configured"], true);
        assert_eq!(json["notification"]["message"], "Daily goal updated successfully!");
        assert_eq!(json["notification"]["kind"], "success");
    }

    #[tokio::test]
    async fn set_goal_rejects_non_positive() {
        let app = test_app(None);

        let response = app
            .oneshot(
                axum::http::Request::put("/api/goal")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"goal_kcal":0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn week_returns_seven_days() {
        let app = test_app(None);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/week?end=2024-06-10")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let days = json["days"].as_array().unwrap();
        assert_eq!(days.len(), 7);
        assert_eq!(days[0]["date"], "2024-06-04");
        assert_eq!(days[6]["date"], "2024-06-10");
        assert_eq!(json["stats"]["logged_days"], 0);
    }

    #[tokio::test]
    async fn today_invalid_date_returns_400() {
        let app = test_app(None);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/today?date=june")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn analysis_without_analyzer_returns_503() {
        let app = test_app(None);
        let response = app.oneshot(post_image(&JPEG)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn analysis_requires_goal() {
        let state = test_state(None, Some(Arc::new(FixedAnalyzer(lunch()))), None);
        let response = build_router(state).oneshot(post_image(&JPEG)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn analysis_rejects_non_image() {
        let (state, app) = app_with_analyzer(FixedAnalyzer(lunch()));

        let response = app.oneshot(post_image(b"GIF89a")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(*state.session().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn analysis_failure_returns_502_until_dismissed() {
        let (state, app) = app_with_analyzer(FailingAnalyzer);

        let response = app.clone().oneshot(post_image(&JPEG)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("model overloaded"));
        assert_eq!(
            json["notification"]["message"],
            "Failed to analyze image. Please try again."
        );
        assert_eq!(json["notification"]["kind"], "error");

        let review = app
            .clone()
            .oneshot(axum::http::Request::get("/api/review").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(review).await["state"], "failed");

        let busy = app.clone().oneshot(post_image(&JPEG)).await.unwrap();
        assert_eq!(busy.status(), StatusCode::CONFLICT);

        let dismissed = app.clone().oneshot(post_empty("/api/review/dismiss")).await.unwrap();
        assert_eq!(dismissed.status(), StatusCode::NO_CONTENT);
        assert_eq!(*state.session().state(), SessionState::Idle);

        let again = app.oneshot(post_empty("/api/review/dismiss")).await.unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn save_keeps_history_written_by_another_process() {
        use snapcal_core::models::{DailyIntake, HISTORY_KEY};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapcal.db");
        let mut session = SessionController::new(Database::open(&path).unwrap());
        session.set_goal(5000.0).unwrap();
        let state = AppState {
            session: Arc::new(Mutex::new(session)),
            analyzer: Some(Arc::new(FixedAnalyzer(lunch()))),
            api_key: None,
        };
        let app = build_router(state);
        let today = chrono::Local::now().date_naive();

        let analyzed = app.clone().oneshot(post_image(&JPEG)).await.unwrap();
        assert_eq!(analyzed.status(), StatusCode::OK);
        let saved = app.clone().oneshot(post_empty("/api/review/save")).await.unwrap();
        assert_eq!(saved.status(), StatusCode::OK);

        let other = Database::open(&path).unwrap();
        let old_day = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let history = vec![
            DailyIntake { date: old_day, total_kcal: 900.0 },
            DailyIntake { date: today, total_kcal: 550.0 },
        ];
        other
            .put_value(HISTORY_KEY, &serde_json::to_string(&history).unwrap())
            .unwrap();

        let analyzed = app.clone().oneshot(post_image(&JPEG)).await.unwrap();
        assert_eq!(analyzed.status(), StatusCode::OK);
        let saved = app.oneshot(post_empty("/api/review/save")).await.unwrap();
        assert_eq!(saved.status(), StatusCode::OK);
        assert_eq!(body_json(saved).await["new_total"], 1100.0);

        let raw = Database::open(&path)
            .unwrap()
            .get_value(HISTORY_KEY)
            .unwrap()
            .unwrap();
        let on_disk: Vec<DailyIntake> = serde_json::from_str(&raw).unwrap();
        assert_eq!(on_disk.len(), 2);
        assert_eq!(on_disk[0].date, old_day);
        assert_eq!(on_disk[0].total_kcal, 900.0);
        assert_eq!(on_disk[1].date, today);
        assert_eq!(on_disk[1].total_kcal, 1100.0);
    }

    #[test]
    fn key_preview_handles_short_and_non_ascii_keys() {
        assert_eq!(key_preview("abc"), "****");
        assert_eq!(key_preview(""), "****");
        assert_eq!(key_preview("ключ"), "****");
        assert_eq!(key_preview("ключключключ"), "ключ...ключ");
        assert_eq!(
            key_preview("0123456789abcdef0123456789abcdef"),
            "0123...cdef"
        );
    }

    #[tokio::test]
    async fn review_edit_delete_and_save() {
        let (state, app) = app_with_analyzer(FixedAnalyzer(lunch()));

        let response = app.clone().oneshot(post_image(&JPEG)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["state"], "reviewing");
        assert_eq!(json["total_kcal"], 550.0);
        let rice_id = json["items"][0]["id"].as_str().unwrap().to_string();
        let chicken_id = json["items"][1]["id"].as_str().unwrap().to_string();

        let edited = app
            .clone()
            .oneshot(
                axum::http::Request::put(format!("/api/review/items/{rice_id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"calories":350}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(edited.status(), StatusCode::OK);
        assert_eq!(body_json(edited).await["calories"], 350.0);

        let deleted = app
            .clone()
            .oneshot(
                axum::http::Request::delete(format!("/api/review/items/{chicken_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        let saved = app.clone().oneshot(post_empty("/api/review/save")).await.unwrap();
        assert_eq!(saved.status(), StatusCode::OK);
        let json = body_json(saved).await;
        assert_eq!(json["meal_kcal"], 350.0);
        assert_eq!(json["previous_total"], 0.0);
        assert_eq!(json["new_total"], 350.0);
        assert_eq!(json["transition"], "none");

        let today = chrono::Local::now().date_naive();
        assert!((state.session().today_total(today) - 350.0).abs() < f64::EPSILON);
        assert_eq!(*state.session().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn review_edit_validation() {
        let (_, app) = app_with_analyzer(FixedAnalyzer(lunch()));
        let json = body_json(app.clone().oneshot(post_image(&JPEG)).await.unwrap()).await;
        let id = json["items"][0]["id"].as_str().unwrap().to_string();

        let empty = app
            .clone()
            .oneshot(
                axum::http::Request::put(format!("/api/review/items/{id}"))
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let negative = app
            .clone()
            .oneshot(
                axum::http::Request::put(format!("/api/review/items/{id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"calories":-10}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(negative.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let missing = app
            .oneshot(
                axum::http::Request::put("/api/review/items/no-such-item")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"calories":10}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cancel_discards_review() {
        let (state, app) = app_with_analyzer(FixedAnalyzer(lunch()));
        app.clone().oneshot(post_image(&JPEG)).await.unwrap();

        let cancelled = app.clone().oneshot(post_empty("/api/review/cancel")).await.unwrap();
        assert_eq!(cancelled.status(), StatusCode::NO_CONTENT);
        assert!(state.session().ledger().is_empty());

        let save = app.oneshot(post_empty("/api/review/save")).await.unwrap();
        assert_eq!(save.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn save_crossing_goal_reports_reached() {
        let state = test_state(None, Some(Arc::new(FixedAnalyzer(lunch()))), Some(500.0));
        let app = build_router(state);
        app.clone().oneshot(post_image(&JPEG)).await.unwrap();

        let saved = app.oneshot(post_empty("/api/review/save")).await.unwrap();
        let json = body_json(saved).await;
        assert_eq!(json["transition"], "reached");
        assert_eq!(json["notification"]["message"], "Goal of 500 kcal reached!");
    }
}
