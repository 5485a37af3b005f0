use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use serde::Deserialize;
use serde_json::{Value, json};

use learn_core::model::{Rating, SessionId, StudyTarget, WordId};
use services::sessions::{PassView, ProgressView, ReviewView, SessionView, StartView};
use services::{AnswerInput, CompletedSet, ProgressUpdate, StudyMode};

use crate::auth::CurrentUser;
use crate::response::{AppError, SuccessResponse, ok};
use crate::state::AppState;

type ApiResult<T> = Result<Json<SuccessResponse<T>>, AppError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session/start", post(start_session))
        .route("/session/progress", patch(update_progress))
        .route("/session/pass", post(start_pass))
        .route("/session/:id", get(get_session))
        .route("/review", post(review))
        .with_state(state)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

fn parse_session_id(raw: &str) -> Result<SessionId, AppError> {
    raw.parse::<SessionId>()
        .map_err(|_| AppError::validation(format!("invalid session id: {raw}")))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

//
// ─── SESSIONS ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBody {
    exam: String,
    level: u8,
    #[serde(default)]
    restart: bool,
}

async fn start_session(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    payload: Result<Json<StartBody>, JsonRejection>,
) -> ApiResult<StartView> {
    let req = body(payload)?;
    let target = StudyTarget::parse(&req.exam, req.level)?;
    let started = state
        .services
        .sessions()
        .start(user_id, target, req.restart)
        .await?;
    Ok(ok(started.into()))
}

async fn get_session(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<SessionView> {
    let session_id = parse_session_id(&id)?;
    let session = state
        .services
        .sessions()
        .get_session(user_id, session_id)
        .await?;
    Ok(ok(session.into()))
}

/// `completedSet` is either `true` (the stored current set) or a set index.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum CompletedSetBody {
    Flag(bool),
    Index(u32),
}

impl CompletedSetBody {
    fn into_mark(self) -> Option<CompletedSet> {
        match self {
            CompletedSetBody::Flag(true) => Some(CompletedSet::Current),
            CompletedSetBody::Flag(false) => None,
            CompletedSetBody::Index(set) => Some(CompletedSet::Index(set)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressBody {
    session_id: String,
    current_index: Option<u32>,
    current_set: Option<u32>,
    completed_set: Option<CompletedSetBody>,
}

async fn update_progress(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    payload: Result<Json<ProgressBody>, JsonRejection>,
) -> ApiResult<ProgressView> {
    let req = body(payload)?;
    let session_id = parse_session_id(&req.session_id)?;
    let update = ProgressUpdate {
        current_index: req.current_index,
        current_set: req.current_set,
        completed_set: req.completed_set.and_then(CompletedSetBody::into_mark),
    };
    let outcome = state
        .services
        .sessions()
        .update_progress(user_id, session_id, update)
        .await?;
    Ok(ok(outcome.into()))
}

async fn start_pass(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    payload: Result<Json<StudyMode>, JsonRejection>,
) -> ApiResult<PassView> {
    let mode = body(payload)?;
    let pass = state
        .services
        .sessions()
        .start_pass(user_id, mode)
        .await?;
    Ok(ok(pass.into()))
}

//
// ─── REVIEWS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewBody {
    word_id: u64,
    rating: i64,
    session_id: Option<String>,
    request_id: Option<String>,
}

async fn review(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    payload: Result<Json<ReviewBody>, JsonRejection>,
) -> ApiResult<ReviewView> {
    let req = body(payload)?;
    let input = AnswerInput {
        session_id: req.session_id.as_deref().map(parse_session_id).transpose()?,
        word_id: WordId::new(req.word_id),
        rating: Rating::new(req.rating)?,
        request_id: req.request_id,
    };
    let outcome = state
        .services
        .sessions()
        .record_answer(user_id, input)
        .await?;
    Ok(ok(outcome.into()))
}
