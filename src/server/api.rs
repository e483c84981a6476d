use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, patch, put},
};
use serde::{Deserialize, Serialize};
use triage_common::{Actor, Priority, Role, TicketId, TicketStatus, ViewMode};

use super::identity::{IdentityError, IdentityProvider};
use crate::errors::WorkflowError;
use crate::workflow::access::Rule;
use crate::workflow::visibility;
use crate::workflow::{TicketDraft, WorkflowService};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub service: WorkflowService,
    pub identity: Arc<dyn IdentityProvider>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

// Fields default to empty so that a missing field is reported by the
// workflow's own validation rather than as a JSON rejection.
#[derive(Deserialize)]
pub struct CreateTicketRequest {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub priority: Option<String>,
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub remark: String,
}

#[derive(Deserialize)]
pub struct ViewQuery {
    pub view: Option<String>,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub identity: String,
    pub role: Role,
    pub department: String,
    pub views: Vec<ViewMode>,
}

// ── Error type ────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(Rule),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, serde_json::json!({"error": msg})),
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, serde_json::json!({"error": msg}))
            }
            ApiError::Forbidden(rule) => (
                StatusCode::FORBIDDEN,
                serde_json::json!({"error": "Forbidden", "rule": rule}),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({"error": msg})),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, serde_json::json!({"error": msg})),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({"error": msg}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(msg) => ApiError::BadRequest(msg),
            WorkflowError::Forbidden { rule } => ApiError::Forbidden(rule),
            e @ WorkflowError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            WorkflowError::Conflict(msg) => ApiError::Conflict(msg),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::NotConfigured(msg) => ApiError::Internal(msg),
            e => ApiError::Unauthorized(e.to_string()),
        }
    }
}

fn parse_field<T: FromStr<Err = String>>(value: &str) -> Result<T, ApiError> {
    T::from_str(value).map_err(ApiError::BadRequest)
}

// ── Authentication ────────────────────────────────────────────────────

/// The caller, resolved from `Authorization: Bearer <credential>` or, for
/// clients that cannot set headers (browser WebSockets), a `token` query
/// parameter.
pub struct CurrentActor(pub Actor);

impl FromRequestParts<SharedState> for CurrentActor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let credential = bearer_credential(parts).ok_or(IdentityError::MissingCredential)?;
        match state.identity.resolve(&credential) {
            Ok(actor) => Ok(CurrentActor(actor)),
            Err(e) => {
                tracing::warn!(path = %parts.uri.path(), error = %e, "Rejected credential");
                Err(e.into())
            }
        }
    }
}

fn bearer_credential(parts: &Parts) -> Option<String> {
    let from_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string());
    from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token)
    })
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/me", get(me))
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/{id}", get(get_ticket).delete(delete_ticket))
        .route("/api/tickets/{id}/status", patch(transition_status))
        .route("/api/tickets/{id}/forward", put(forward_ticket))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn me(CurrentActor(actor): CurrentActor) -> Json<MeResponse> {
    let views = visibility::permitted_views(actor.role).to_vec();
    Json(MeResponse {
        identity: actor.identity,
        role: actor.role,
        department: actor.department,
        views,
    })
}

/// The view to use when a request names none: the role's first view.
pub(crate) fn requested_view(actor: &Actor, view: Option<&str>) -> Result<ViewMode, ApiError> {
    match view {
        Some(v) => parse_field(v),
        None => Ok(visibility::permitted_views(actor.role)[0]),
    }
}

async fn list_tickets(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ViewQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let view = requested_view(&actor, query.view.as_deref())?;
    let tickets = state.service.list_tickets(&actor, view).await?;
    Ok(Json(tickets))
}

async fn create_ticket(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Json(req): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let priority = match req.priority.as_deref() {
        Some(p) => Some(parse_field::<Priority>(p)?),
        None => None,
    };
    let draft = TicketDraft {
        subject: req.subject,
        category: req.category,
        description: req.description,
        priority,
    };
    let ticket = state.service.create_ticket(&actor, draft).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn get_ticket(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state.service.get_ticket(&actor, &TicketId::from(id)).await?;
    Ok(Json(ticket))
}

async fn transition_status(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let status: TicketStatus = parse_field(&req.status)?;
    let ticket = state
        .service
        .transition_status(&actor, &TicketId::from(id), status, &req.remark)
        .await?;
    Ok(Json(ticket))
}

async fn forward_ticket(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = state
        .service
        .forward_to_admin(&actor, &TicketId::from(id))
        .await?;
    Ok(Json(ticket))
}

async fn delete_ticket(
    State(state): State<SharedState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .delete_ticket(&actor, &TicketId::from(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::server::identity::StaticTokenProvider;
    use crate::workflow::{DbHandle, EventBus, TicketDb};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    pub(crate) fn test_state() -> SharedState {
        let db = TicketDb::new_in_memory().unwrap();
        let identity = StaticTokenProvider::new([
            ("t-alice".to_string(), Actor::employee("alice", "Engineering")),
            ("t-bob".to_string(), Actor::employee("bob", "Engineering")),
            ("t-hank".to_string(), Actor::department_head("hank", "Engineering")),
            ("t-fran".to_string(), Actor::department_head("fran", "Finance")),
            ("t-root".to_string(), Actor::admin("root")),
        ]);
        Arc::new(AppState {
            service: WorkflowService::new(DbHandle::new(db), EventBus::new(16)),
            identity: Arc::new(identity),
        })
    }

    fn test_app() -> Router {
        api_router().with_state(test_state())
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: &str, uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", token));
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn raise(app: &Router, token: &str) -> serde_json::Value {
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/tickets",
                token,
                Some(serde_json::json!({
                    "subject": "VPN issue",
                    "category": "Technical issue",
                    "description": "Cannot connect"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response.into_body()).await
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_missing_or_unknown_credential_is_401() {
        let app = test_app();
        let request = Request::builder()
            .uri("/api/tickets")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(request_for("GET", "/api/tickets", "t-nobody"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    fn request_for(method: &str, uri: &str, token: &str) -> Request<Body> {
        request(method, uri, token, None)
    }

    #[tokio::test]
    async fn test_me_lists_permitted_views() {
        let app = test_app();
        let response = app
            .oneshot(request_for("GET", "/api/me", "t-root"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(me["identity"], "root");
        assert_eq!(me["role"], "Admin");
        assert_eq!(me["views"], serde_json::json!(["Employee Queries", "D-Tickets"]));
    }

    #[tokio::test]
    async fn test_create_ticket_defaults() {
        let app = test_app();
        let ticket = raise(&app, "t-alice").await;
        assert_eq!(ticket["status"], "Open");
        assert_eq!(ticket["priority"], "Medium");
        assert_eq!(ticket["comments"], serde_json::json!([]));
        assert_eq!(ticket["forwardedToAdmin"], false);
        assert_eq!(ticket["raisedBy"], "alice");
        assert_eq!(ticket["raisedByRole"], "Employee");
    }

    #[tokio::test]
    async fn test_create_ticket_validation_and_role() {
        let app = test_app();
        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/tickets",
                "t-alice",
                Some(serde_json::json!({"subject": "x", "category": "y"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/tickets",
                "t-alice",
                Some(serde_json::json!({
                    "subject": "x", "category": "y", "description": "z", "priority": "Critical"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(request(
                "POST",
                "/api/tickets",
                "t-root",
                Some(serde_json::json!({"subject": "x", "category": "y", "description": "z"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["rule"], "create_ticket.role");
    }

    #[tokio::test]
    async fn test_transition_forward_and_admin_queue() {
        let app = test_app();
        let ticket = raise(&app, "t-alice").await;
        let id = ticket["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/api/tickets/{}/status", id),
                "t-hank",
                Some(serde_json::json!({"status": "In Progress", "remark": "investigating"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(updated["status"], "In Progress");
        assert_eq!(updated["comments"][0]["role"], "DepartmentHead");
        assert_eq!(updated["comments"][0]["message"], "investigating");
        assert_eq!(updated["comments"][0]["statusAtThatTime"], "In Progress");

        let response = app
            .clone()
            .oneshot(request_for("GET", "/api/tickets?view=employee_queries", "t-root"))
            .await
            .unwrap();
        let queue: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert!(queue.is_empty());

        let forward = format!("/api/tickets/{}/forward", id);
        let response = app
            .clone()
            .oneshot(request_for("PUT", &forward, "t-hank"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app
            .clone()
            .oneshot(request_for("PUT", &forward, "t-hank"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .oneshot(request_for("GET", "/api/tickets?view=Employee%20Queries", "t-root"))
            .await
            .unwrap();
        let queue: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0]["id"], id);
    }

    #[tokio::test]
    async fn test_transition_errors_map_to_status_codes() {
        let app = test_app();
        let ticket = raise(&app, "t-alice").await;
        let uri = format!("/api/tickets/{}/status", ticket["id"].as_str().unwrap());

        let cases = [
            ("t-hank", serde_json::json!({"status": "Done", "remark": "x"}), StatusCode::BAD_REQUEST),
            ("t-hank", serde_json::json!({"status": "Closed", "remark": " "}), StatusCode::BAD_REQUEST),
            ("t-fran", serde_json::json!({"status": "Closed", "remark": "x"}), StatusCode::FORBIDDEN),
            ("t-alice", serde_json::json!({"status": "Closed", "remark": "x"}), StatusCode::FORBIDDEN),
        ];
        for (token, body, expected) in cases {
            let response = app
                .clone()
                .oneshot(request("PATCH", &uri, token, Some(body)))
                .await
                .unwrap();
            assert_eq!(response.status(), expected, "{}", token);
        }

        let response = app
            .oneshot(request(
                "PATCH",
                "/api/tickets/missing/status",
                "t-root",
                Some(serde_json::json!({"status": "Closed", "remark": "x"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_ticket_visibility() {
        let app = test_app();
        let ticket = raise(&app, "t-alice").await;
        let uri = format!("/api/tickets/{}", ticket["id"].as_str().unwrap());

        let response = app
            .clone()
            .oneshot(request_for("GET", &uri, "t-alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request_for("GET", &uri, "t-bob"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["rule"], "view.not_visible");
    }

    #[tokio::test]
    async fn test_list_rejects_unpermitted_or_unknown_views() {
        let app = test_app();
        let response = app
            .clone()
            .oneshot(request_for("GET", "/api/tickets?view=D-Tickets", "t-alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["rule"], "view.mode_not_permitted");

        let response = app
            .oneshot(request_for("GET", "/api/tickets?view=everything", "t-alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_dispatch() {
        let app = test_app();
        let ticket = raise(&app, "t-alice").await;
        let uri = format!("/api/tickets/{}", ticket["id"].as_str().unwrap());

        // Scenario E: another employee may not delete it.
        let response = app
            .clone()
            .oneshot(request_for("DELETE", &uri, "t-bob"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["rule"], "delete_own.ownership");

        let response = app
            .clone()
            .oneshot(request_for("DELETE", &uri, "t-alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let head_ticket = raise(&app, "t-hank").await;
        let uri = format!("/api/tickets/{}", head_ticket["id"].as_str().unwrap());
        let response = app
            .clone()
            .oneshot(request_for("DELETE", &uri, "t-root"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request_for("DELETE", &uri, "t-root"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_token_query_parameter_is_accepted() {
        let app = test_app();
        let request = Request::builder()
            .uri("/api/me?token=t-hank")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let me: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(me["views"], serde_json::json!(["Employee Queries", "My Queries"]));
    }
}
