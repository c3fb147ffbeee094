//! HTTP surface for scene image generation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, Path, State, rejection::JsonRejection},
    http::{Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;

use crate::error::{RateLimitExceeded, SceneImageError};
use crate::rate_limit::{RateLimiter, client_identifier};
use crate::scene::{GenerationRequest, SceneImageOrchestrator, SubjectRef};

const FORWARDED_FOR: &str = "x-forwarded-for";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SceneImageOrchestrator>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(orchestrator: Arc<SceneImageOrchestrator>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            orchestrator,
            rate_limiter,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn json_error(status: StatusCode, message: &str) -> Response {
    let body = ErrorResponse {
        error: message.to_string(),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for SceneImageError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidSize(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::GenerationFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        json_error(status, &self.to_string())
    }
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let retry_after = self.retry_after.as_secs().max(1).to_string();
        (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after)],
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let generation = Router::new()
        .route("/api/books/{book_id}/scene-image", post(generate_for_book))
        .route(
            "/api/reading-clubs/{club_id}/scene-image",
            post(generate_for_reading_club),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/api/books/{book_id}/scene-generations", get(list_for_book))
        .route(
            "/api/books/{book_id}/scene-generations/count",
            get(count_for_book),
        )
        .route(
            "/api/reading-clubs/{club_id}/scene-generations",
            get(list_for_reading_club),
        )
        .route(
            "/api/reading-clubs/{club_id}/scene-generations/count",
            get(count_for_reading_club),
        )
        .merge(generation)
        .layer(cors_layer())
        .with_state(state)
}

/// Permissive CORS for the browser front-end.
pub fn cors_layer() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{Any, CorsLayer};

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let forwarded_for = request
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok());
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let client_id = client_identifier(forwarded_for, remote_addr.as_deref());

    match state.rate_limiter.check(&client_id) {
        Ok(()) => next.run(request).await,
        Err(err) => {
            tracing::warn!(client_id = %client_id, "rate limit exceeded");
            err.into_response()
        }
    }
}

async fn generate_for_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Response {
    generate(&state, SubjectRef::Book(book_id), payload).await
}

async fn generate_for_reading_club(
    State(state): State<AppState>,
    Path(club_id): Path<String>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Response {
    generate(&state, SubjectRef::ReadingClub(club_id), payload).await
}

async fn generate(
    state: &AppState,
    subject: SubjectRef,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Response {
    let result = match payload {
        Ok(Json(request)) => state.orchestrator.generate(&subject, &request).await,
        Err(rejection) => Err(SceneImageError::invalid_argument(rejection.body_text())),
    };
    match result {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => {
            if err.is_client_error() {
                tracing::info!(subject = %subject, "rejected scene image request: {err}");
            } else {
                tracing::error!(subject = %subject, "scene image generation unavailable: {err}");
            }
            err.into_response()
        }
    }
}

async fn list_for_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Response {
    match state.orchestrator.generations_for_book(&book_id).await {
        Ok(records) => Json(records).into_response(),
        Err(err) => {
            tracing::error!(book_id = %book_id, "failed to list generations: {err:#}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to list generations")
        }
    }
}

async fn list_for_reading_club(
    State(state): State<AppState>,
    Path(club_id): Path<String>,
) -> Response {
    match state.orchestrator.generations_for_reading_club(&club_id).await {
        Ok(records) => Json(records).into_response(),
        Err(err) => {
            tracing::error!(club_id = %club_id, "failed to list generations: {err:#}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to list generations")
        }
    }
}

async fn count_for_book(
    State(state): State<AppState>,
    Path(book_id): Path<String>,
) -> Response {
    match state.orchestrator.generation_count_for_book(&book_id).await {
        Ok(count) => Json(count).into_response(),
        Err(err) => {
            tracing::error!(book_id = %book_id, "failed to count generations: {err:#}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to count generations")
        }
    }
}

async fn count_for_reading_club(
    State(state): State<AppState>,
    Path(club_id): Path<String>,
) -> Response {
    match state.orchestrator.generation_count_for_reading_club(&club_id).await {
        Ok(count) => Json(count).into_response(),
        Err(err) => {
            tracing::error!(club_id = %club_id, "failed to count generations: {err:#}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "failed to count generations")
        }
    }
}
