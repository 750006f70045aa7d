use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use validator::Validate;

use crate::database::{Database, DatabaseError, PaperEntry};
use crate::llm::{function_declarations, PaperSession, SimilarityMetric, ToolError};
use crate::providers::EmbeddingProvider;

#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    provider: Arc<dyn EmbeddingProvider>,
    metric: SimilarityMetric,
    // opened papers by title, with the registry entry they were opened from
    sessions: Arc<RwLock<HashMap<String, (PaperEntry, PaperSession)>>>,
}

impl AppState {
    pub fn new(db: Database, provider: Arc<dyn EmbeddingProvider>, metric: SimilarityMetric) -> Self {
        Self {
            db: Arc::new(db),
            provider,
            metric,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The opened session of `title`.
    ///
    /// A cached session is reused while the registry still points at the
    /// same files; its instruction is re-read since it can be edited in place.
    async fn session(&self, title: &str) -> Result<PaperSession, DatabaseError> {
        let entry = self.db.entry(title)?;
        let cached = match self.sessions.read().await.get(title) {
            Some((opened_from, session)) if *opened_from == entry => Some(session.clone()),
            Some(_) => {
                info!("'{}' was registered again, reopening it", title);
                None
            }
            None => None,
        };
        if let Some(mut session) = cached {
            session.reload_instruction(&self.db)?;
            return Ok(session);
        }

        let session = PaperSession::open(&self.db, Arc::clone(&self.provider), self.metric, title)?;
        self.sessions
            .write()
            .await
            .insert(title.to_string(), (entry, session.clone()));
        Ok(session)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ToolCallRequest {
    #[validate(length(min = 1))]
    paper: String,
    #[validate(length(min = 1, max = 100))]
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
pub struct InstructionQuery {
    title: String,
}

#[derive(Serialize)]
pub struct InstructionResponse {
    title: String,
    instruction: String,
}

#[derive(Serialize)]
struct ApiResponse {
    status: String,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ApiResponse { status: message })).into_response()
}

fn database_error(e: DatabaseError) -> Response {
    match e {
        DatabaseError::UnknownPaper(title) => error_response(StatusCode::NOT_FOUND, format!("Unknown paper: {}", title)),
        other => {
            error!("Database error: {}", other);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", other))
        }
    }
}

/// Create and configure the API router
pub fn create_api(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_check))
        .route("/papers", get(papers_handler))
        .route("/tools", get(tools_handler))
        .route("/instruction", get(instruction_handler))
        .route("/tools/call", post(tool_call_handler))
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        status: "ok".to_string(),
    })
}

async fn papers_handler(State(state): State<AppState>) -> Response {
    match state.db.papers() {
        Ok(papers) => Json(papers).into_response(),
        Err(e) => database_error(e),
    }
}

async fn tools_handler() -> Json<Value> {
    Json(function_declarations())
}

async fn instruction_handler(State(state): State<AppState>, Query(query): Query<InstructionQuery>) -> Response {
    match state.session(&query.title).await {
        Ok(session) => Json(InstructionResponse {
            title: session.title().to_string(),
            instruction: session.instruction().to_string(),
        })
        .into_response(),
        Err(e) => database_error(e),
    }
}

async fn tool_call_handler(State(state): State<AppState>, Json(request): Json<ToolCallRequest>) -> Response {
    if let Err(e) = request.validate() {
        return error_response(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e));
    }

    let session = match state.session(&request.paper).await {
        Ok(session) => session,
        Err(e) => return database_error(e),
    };

    info!("Tool call {} on '{}'", request.name, request.paper);
    match session.call_tool(&request.name, &request.args).await {
        Ok(response) => Json(response).into_response(),
        Err(e) if e.downcast_ref::<ToolError>().is_some() => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            error!("Tool call failed: {:#}", e);
            error_response(StatusCode::BAD_GATEWAY, format!("Tool call failed: {}", e))
        }
    }
}
