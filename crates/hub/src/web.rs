use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use hydro_engine::{
    recommend, DosingSettings, GrowthStage, Product, Recommendation, RecommendationInput,
    StrengthTier,
};

use crate::config::HubConfig;
use crate::db::{Db, Entry, NewEntry, NewRun, Run};
use crate::state::{ConfigSummary, SharedState, StatusResponse};

// ---------------------------------------------------------------------------
// State + errors
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<HubConfig>,
    pub shared: SharedState,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// Recommendations are switched off in `[settings]`.
    Disabled,
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => {
                warn!("bad request: {msg}");
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::Disabled => (
                StatusCode::CONFLICT,
                "recommendations are disabled".to_string(),
            ),
            ApiError::Internal(e) => {
                error!(error = %format!("{e:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(api_status))
        .route("/api/runs", get(list_runs).post(create_run))
        .route("/api/runs/{run_id}", get(get_run))
        .route("/api/runs/{run_id}/entries", get(list_entries).post(create_entry))
        .route("/api/runs/{run_id}/entries/latest", get(latest_entry))
        .route("/api/runs/{run_id}/recommendation", get(run_recommendation))
        .route("/api/products", get(list_products))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let profiles = &state.config.profiles;
    let summary = ConfigSummary {
        recommendations_enabled: state.config.settings.enabled,
        systems: profiles.system_count(),
        profiles: profiles.target_count(),
        products: profiles.catalog().len(),
    };
    let st = state.shared.read().await;
    Json(st.to_status(summary))
}

async fn list_products(State(state): State<AppState>) -> Json<Vec<Product>> {
    Json(state.config.profiles.catalog().to_vec())
}

// -- Runs -------------------------------------------------------------------

async fn list_runs(State(state): State<AppState>) -> ApiResult<Json<Vec<Run>>> {
    Ok(Json(state.db.list_runs().await?))
}

async fn create_run(
    State(state): State<AppState>,
    Json(body): Json<NewRun>,
) -> ApiResult<(StatusCode, Json<Run>)> {
    body.validate().map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;

    let run = state.db.create_run(&body).await?;
    info!(run_id = run.id, name = %run.name, "run created");
    state.shared.write().await.record_run(run.id, &run.name);

    Ok((StatusCode::CREATED, Json(run)))
}

async fn get_run(State(state): State<AppState>, Path(run_id): Path<i64>) -> ApiResult<Json<Run>> {
    Ok(Json(require_run(&state.db, run_id).await?))
}

async fn require_run(db: &Db, run_id: i64) -> ApiResult<Run> {
    db.get_run(run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("run {run_id} not found")))
}

// -- Entries ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EntriesQuery {
    since: Option<String>,
}

async fn list_entries(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
    Query(q): Query<EntriesQuery>,
) -> ApiResult<Json<Vec<Entry>>> {
    let since = q.since.as_deref().map(parse_date).transpose()?;
    require_run(&state.db, run_id).await?;
    Ok(Json(state.db.entries_for_run(run_id, since).await?))
}

async fn create_entry(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
    Json(body): Json<NewEntry>,
) -> ApiResult<(StatusCode, Json<Entry>)> {
    body.validate().map_err(|e| ApiError::BadRequest(format!("{e:#}")))?;
    require_run(&state.db, run_id).await?;

    let entry = state.db.insert_entry(run_id, &body).await?;
    info!(run_id, entry_id = entry.id, date = %entry.date, "entry logged");
    state
        .shared
        .write()
        .await
        .record_entry(run_id, entry.date, entry.ph_final, entry.ec_final);

    Ok((StatusCode::CREATED, Json(entry)))
}

async fn latest_entry(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> ApiResult<Json<Entry>> {
    require_run(&state.db, run_id).await?;
    state
        .db
        .last_entry(run_id, None)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("run {run_id} has no entries")))
}

// -- Recommendation ---------------------------------------------------------

/// Per-request overrides of `[settings]`.
#[derive(Debug, Default, Deserialize)]
struct RecommendationQuery {
    plant_type: Option<String>,
    growth_stage: Option<String>,
    system_type: Option<String>,
    reservoir_liters: Option<f64>,
    strength: Option<String>,
    today: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecommendationResponse {
    run_id: i64,
    plant_type: String,
    growth_stage: GrowthStage,
    system_type: String,
    settings: DosingSettings,
    recommendation: Recommendation,
}

async fn run_recommendation(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
    Query(q): Query<RecommendationQuery>,
) -> ApiResult<Json<RecommendationResponse>> {
    let defaults = &state.config.settings;
    if !defaults.enabled {
        return Err(ApiError::Disabled);
    }

    let plant_type = q.plant_type.unwrap_or_else(|| defaults.plant_type.clone());
    let system_type = q.system_type.unwrap_or_else(|| defaults.system_type.clone());
    let stage = q
        .growth_stage
        .as_deref()
        .unwrap_or(&defaults.growth_stage)
        .parse::<GrowthStage>()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    let mut settings = defaults.dosing();
    if let Some(liters) = q.reservoir_liters {
        if !(liters > 0.0) || !liters.is_finite() {
            return Err(ApiError::BadRequest(format!(
                "reservoir_liters must be positive, got {liters}"
            )));
        }
        settings.reservoir_liters = liters;
    }
    if let Some(tier) = q.strength.as_deref() {
        settings.strength = tier
            .parse::<StrengthTier>()
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    }

    let today = match q.today.as_deref() {
        Some(s) => parse_date(s)?,
        None => OffsetDateTime::now_utc().date(),
    };

    require_run(&state.db, run_id).await?;
    let last = state
        .db
        .last_entry(run_id, Some(today))
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("run {run_id} has no entries on or before {today}"))
        })?;

    let since = window_start(today, defaults.lookback_days);
    let history: Vec<_> = state
        .db
        .entries_for_run(run_id, since)
        .await?
        .iter()
        .filter(|e| e.date <= today)
        .map(Entry::to_history_point)
        .collect();

    let reading = last.to_reading();
    let recommendation = recommend(&RecommendationInput {
        reading: &reading,
        history: &history,
        today,
        plant_type: &plant_type,
        stage,
        system_type: &system_type,
        settings: &settings,
        profiles: &state.config.profiles,
    });

    let summary = if recommendation.is_all_clear() {
        "all clear".to_string()
    } else {
        format!(
            "ph={} ec={} schedule={} temp={} failures={}",
            recommendation.ph.is_some(),
            recommendation.ec.is_some(),
            recommendation.schedule.is_some(),
            recommendation.temperature.is_some(),
            recommendation.failures.len()
        )
    };
    info!(run_id, %plant_type, %stage, %system_type, %summary, "recommendation served");
    {
        let mut st = state.shared.write().await;
        for failure in &recommendation.failures {
            st.record_error(format!(
                "run {run_id}: {:?} evaluator failed: {}",
                failure.evaluator, failure.error
            ));
        }
        st.record_recommendation(run_id, summary);
    }

    Ok(Json(RecommendationResponse {
        run_id,
        plant_type,
        growth_stage: stage,
        system_type,
        settings,
        recommendation,
    }))
}

/// First day of the lookback window. `None` when the window reaches past
/// the start of the calendar, in which case the whole log is in range.
fn window_start(today: Date, lookback_days: i64) -> Option<Date> {
    let seconds = lookback_days.checked_mul(86_400)?;
    today.checked_sub(Duration::seconds(seconds))
}

fn parse_date(s: &str) -> ApiResult<Date> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|e| ApiError::BadRequest(format!("invalid date '{s}': {e}")))
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve(state: AppState) -> Result<()> {
    let port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind web port {port}"))?;

    info!(%addr, "api listening");

    axum::serve(listener, router(state))
        .await
        .context("web server error")
}

// ===========================================================================
// Tests
// ===========================================================================
