use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

use crate::{
    capability::CapabilityRegistry,
    catalog::ServiceCatalog,
    error::{ErrorKind, GenerationError},
    form::{FieldEvent, FormState},
    orchestrator::{Orchestrator, OrchestratorSnapshot, Phase},
    results::PresentedResult,
    schema::ServiceDefinition,
};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ServiceCatalog>,
    pub capabilities: CapabilityRegistry,
    pub sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl AppState {
    pub fn new(catalog: ServiceCatalog, capabilities: CapabilityRegistry) -> Self {
        Self { catalog: Arc::new(catalog), capabilities, sessions: Arc::default() }
    }
}

/// One user's work on a service: the form being filled in and its generation state.
pub struct Session {
    pub service: ServiceDefinition,
    pub form: FormState,
    pub orchestrator: Orchestrator,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectServiceRequest {
    pub service_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorView {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl From<&GenerationError> for ErrorView {
    fn from(err: &GenerationError) -> Self {
        let field = match err {
            GenerationError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };
        Self { kind: err.kind(), message: err.to_string(), field }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub service_name: String,
    pub form: FormState,
    pub phase: Phase,
    pub invocation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loading_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorView>,
    pub results: Vec<PresentedResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionView {
    fn new(id: Uuid, session: &Session, snapshot: OrchestratorSnapshot) -> Self {
        let now = Utc::now();
        Self {
            id,
            service_name: session.service.service_name().to_string(),
            form: session.form.clone(),
            phase: snapshot.phase,
            invocation: snapshot.invocation,
            loading_message: snapshot.loading_message,
            error: snapshot.error.as_ref().map(ErrorView::from),
            results: snapshot.results.presented(now),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }

    fn of(id: Uuid, session: &Session) -> Self {
        Self::new(id, session, session.orchestrator.snapshot())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/services", get(list_services))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(close_session))
        .route("/api/sessions/:id/fields", post(apply_field_event))
        .route("/api/sessions/:id/service", post(switch_service))
        .route("/api/sessions/:id/submit", post(submit))
        .with_state(state)
}

pub async fn list_services(State(state): State<AppState>) -> Json<ServiceCatalog> {
    Json(state.catalog.as_ref().clone())
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<SelectServiceRequest>,
) -> Result<(StatusCode, Json<SessionView>), StatusCode> {
    let service = state.catalog.get(&body.service_name).cloned().ok_or_else(|| {
        tracing::warn!("❓ Unknown service requested: {}", body.service_name);
        StatusCode::NOT_FOUND
    })?;

    let id = Uuid::new_v4();
    let now = Utc::now();
    let session = Session {
        form: FormState::initialize(&service),
        service,
        orchestrator: Orchestrator::new(state.capabilities.clone()),
        created_at: now,
        updated_at: now,
    };
    tracing::info!("🎯 Session {} opened on '{}'", id, session.service.service_name());

    let view = SessionView::of(id, &session);
    state.sessions.write().insert(id, session);
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionView>, StatusCode> {
    let sessions = state.sessions.read();
    let session = sessions.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(SessionView::of(id, session)))
}

/// Forgets the session; a generation still running for it finishes unobserved.
pub async fn close_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> StatusCode {
    match state.sessions.write().remove(&id) {
        Some(session) => {
            session.orchestrator.reset();
            tracing::info!("👋 Session {} closed", id);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

pub async fn apply_field_event(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(event): Json<FieldEvent>,
) -> Result<Json<SessionView>, StatusCode> {
    let mut sessions = state.sessions.write();
    let session = sessions.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;

    session.form = session.form.apply(&session.service, event).map_err(|e| {
        tracing::warn!("⚠️ Session {}: {}", id, e);
        StatusCode::UNPROCESSABLE_ENTITY
    })?;
    session.updated_at = Utc::now();
    Ok(Json(SessionView::of(id, session)))
}

pub async fn switch_service(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<SelectServiceRequest>,
) -> Result<Json<SessionView>, StatusCode> {
    let service = state.catalog.get(&body.service_name).cloned().ok_or(StatusCode::NOT_FOUND)?;

    let mut sessions = state.sessions.write();
    let session = sessions.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    session.form = FormState::initialize(&service);
    session.service = service;
    session.orchestrator.reset();
    session.updated_at = Utc::now();
    tracing::info!("🔀 Session {} switched to '{}'", id, session.service.service_name());
    Ok(Json(SessionView::of(id, session)))
}

/// Starts a generation in the background; poll the session to follow progress.
pub async fn submit(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionView>), StatusCode> {
    let mut sessions = state.sessions.write();
    let session = sessions.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;

    // dropping the handle detaches the task; its outcome lands in the orchestrator state
    drop(session.orchestrator.spawn(session.service.clone(), session.form.clone()));
    session.updated_at = Utc::now();
    Ok((StatusCode::ACCEPTED, Json(SessionView::of(id, session))))
}
