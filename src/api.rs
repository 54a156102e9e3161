// Split Ledger - REST API with Axum
// Routes for submitting expenses, listing them and exporting the balance sheet

use crate::error::SplitError;
use crate::model::SplitRequest;
use crate::service::ExpenseService;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: ExpenseService,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl IntoResponse for SplitError {
    fn into_response(self) -> Response {
        let status = match &self {
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            SplitError::ParticipantNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "request failed");
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind: self.kind(),
                message: self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewParticipant {
    #[serde(alias = "id", alias = "userId")]
    participant_id: String,
    name: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantName {
    participant_id: String,
    name: String,
}

/// Malformed or incomplete JSON bodies get the same error envelope as
/// validation failures
fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, SplitError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| SplitError::InvalidInput(rejection.body_text()))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/expenses/add - Validate, split and store an expense
async fn add_expense(
    State(state): State<AppState>,
    payload: Result<Json<SplitRequest>, JsonRejection>,
) -> Result<Response, SplitError> {
    let request = parse_body(payload)?;
    let record = state.service.submit_expense(request)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(record))).into_response())
}

/// GET /api/expenses/user/:participant_id - Expenses involving one participant
async fn user_expenses(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<Response, SplitError> {
    let records = state.service.list_expenses_for(&participant_id)?;
    Ok(Json(ApiResponse::ok(records)).into_response())
}

/// GET /api/expenses/overall - Every expense
async fn overall_expenses(State(state): State<AppState>) -> Result<Response, SplitError> {
    let records = state.service.list_all_expenses()?;
    Ok(Json(ApiResponse::ok(records)).into_response())
}

/// GET /api/expenses/balance-sheet - CSV download
async fn balance_sheet(State(state): State<AppState>) -> Result<Response, SplitError> {
    let csv = state.service.export_balance_sheet()?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"balance_sheet.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

/// GET /api/expenses/summary - What each participant owes in total
async fn balance_summary(State(state): State<AppState>) -> Result<Response, SplitError> {
    let summary = state.service.balance_summary()?;
    Ok(Json(ApiResponse::ok(summary)).into_response())
}

/// POST /api/users - Register a participant
async fn create_participant(
    State(state): State<AppState>,
    payload: Result<Json<NewParticipant>, JsonRejection>,
) -> Result<Response, SplitError> {
    let body = parse_body(payload)?;
    let participant = state.service.register_participant(
        &body.participant_id,
        &body.name,
        body.email.as_deref(),
    )?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(participant))).into_response())
}

/// GET /api/users - All participants
async fn list_participants(State(state): State<AppState>) -> Result<Response, SplitError> {
    let participants = state.service.list_participants()?;
    Ok(Json(ApiResponse::ok(participants)).into_response())
}

/// GET /api/users/:participant_id - Resolve a participant's name
async fn get_participant(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> Result<Response, SplitError> {
    let name = state.service.resolve_participant_name(&participant_id)?;
    Ok(Json(ApiResponse::ok(ParticipantName {
        participant_id,
        name,
    }))
    .into_response())
}

// ============================================================================
// Router
// ============================================================================

pub fn router(service: ExpenseService) -> Router {
    let state = AppState { service };

    let expense_routes = Router::new()
        .route("/add", post(add_expense))
        .route("/user/:participant_id", get(user_expenses))
        .route("/overall", get(overall_expenses))
        .route("/balance-sheet", get(balance_sheet))
        .route("/summary", get(balance_summary));

    let user_routes = Router::new()
        .route("/", post(create_participant).get(list_participants))
        .route("/:participant_id", get(get_participant));

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .nest("/expenses", expense_routes)
        .nest("/users", user_routes)
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::SplitCalculator;
    use crate::store::SqliteStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        router(ExpenseService::new(store.clone(), store, SplitCalculator::new()))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json_body(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["data"], "OK");
    }

    #[tokio::test]
    async fn test_add_and_list_expense() {
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/expenses/add",
            Some(json!({
                "totalAmount": 200,
                "splitMethod": "percentage",
                "participants": [
                    {"userId": "a", "percentage": 25},
                    {"userId": "b", "percentage": 75}
                ]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let created = json_body(&body);
        assert_eq!(created["data"]["participants"][1]["amount"], 150.0);

        let (status, body) = send(&app, "GET", "/api/expenses/user/b", None).await;
        assert_eq!(status, StatusCode::OK);
        let listed = json_body(&body);
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);
        assert_eq!(listed["data"][0]["id"], created["data"]["id"]);

        let (_, body) = send(&app, "GET", "/api/expenses/user/z", None).await;
        assert!(json_body(&body)["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_errors_are_bad_requests() {
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/expenses/add",
            Some(json!({
                "totalAmount": 90,
                "splitMethod": "exact",
                "participants": [
                    {"userId": "a", "amount": 30},
                    {"userId": "b", "amount": 61}
                ]
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error = json_body(&body);
        assert_eq!(error["success"], false);
        assert_eq!(error["error"]["kind"], "amount_mismatch");

        let (status, body) = send(
            &app,
            "POST",
            "/api/expenses/add",
            Some(json!({"totalAmount": 10, "splitMethod": "shares", "participants": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"]["kind"], "invalid_method");

        let (_, body) = send(&app, "GET", "/api/expenses/overall", None).await;
        assert!(json_body(&body)["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_bodies_keep_error_envelope() {
        let app = app();

        let request = Request::builder()
            .method("POST")
            .uri("/api/expenses/add")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error = json_body(&bytes);
        assert_eq!(error["success"], false);
        assert_eq!(error["error"]["kind"], "invalid_input");

        let (status, body) = send(
            &app,
            "POST",
            "/api/expenses/add",
            Some(json!({"participants": [{"userId": "a"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"]["kind"], "invalid_input");

        let (status, body) = send(&app, "POST", "/api/users", Some(json!({"name": "Alice"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["error"]["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn test_balance_sheet_download() {
        let app = app();

        for (id, name) in [("a", "Alice"), ("b", "Bob")] {
            let (status, _) = send(
                &app,
                "POST",
                "/api/users",
                Some(json!({"participantId": id, "name": name})),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        send(
            &app,
            "POST",
            "/api/expenses/add",
            Some(json!({
                "totalAmount": 100,
                "splitMethod": "equal",
                "participants": [{"userId": "a"}, {"userId": "b"}]
            })),
        )
        .await;

        let request = Request::builder()
            .uri("/api/expenses/balance-sheet")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );
        assert!(response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("balance_sheet.csv"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "TotalAmount,SplitMethod,Participants.Name,Participants.Amount");
        assert!(lines[1].contains("Alice"));
        assert!(lines[2].contains("Bob"));
    }

    #[tokio::test]
    async fn test_balance_sheet_fails_on_unknown_participant() {
        let app = app();

        send(
            &app,
            "POST",
            "/api/expenses/add",
            Some(json!({
                "totalAmount": 10,
                "splitMethod": "equal",
                "participants": [{"userId": "ghost"}]
            })),
        )
        .await;

        let (status, body) = send(&app, "GET", "/api/expenses/balance-sheet", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(&body)["error"]["kind"], "aggregation");
    }

    #[tokio::test]
    async fn test_unknown_participant_is_not_found() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/users/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_body(&body)["error"]["kind"], "participant_not_found");
    }
}
