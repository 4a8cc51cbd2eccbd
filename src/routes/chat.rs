//! Mediation route handlers
//!
//! Every handler runs behind the auth middleware and reads the [`Actor`]
//! from request extensions.

use crate::auth::Actor;
use crate::db::service::AGENT_SENDER;
use crate::error::{validation_error, ApiResult};
use crate::mediation::MediationOutcome;
use crate::models::{
    ChatRequest, ChatResponse, ConfirmRequest, ConfirmResponse, HistoryResponse, PendingResponse,
    SchemaResponse,
};
use crate::state::SharedState;
use axum::{extract::State, Extension, Json};
use serde_json::json;
use validator::Validate;

/// POST /api/chat
///
/// Run one mediation cycle for a natural-language request. A denial is a
/// normal reply, not an error.
pub async fn chat(
    State(state): State<SharedState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    req.validate().map_err(|e| validation_error(e.to_string()))?;

    state.chat_log.record(&actor.name, &req.message, None).await;

    let outcome = match state.mediator.mediate(&req.message, &actor).await {
        Ok(outcome) => outcome,
        Err(e) => {
            state
                .chat_log
                .record(AGENT_SENDER, &format!("Error: {}", e), Some(json!({ "error": true })))
                .await;
            return Err(e);
        }
    };
    let (reply, metadata) = render_outcome(outcome);

    state
        .chat_log
        .record(AGENT_SENDER, &reply.response, Some(metadata))
        .await;

    Ok(Json(reply))
}

fn render_outcome(outcome: MediationOutcome) -> (ChatResponse, serde_json::Value) {
    match outcome {
        MediationOutcome::Executed { sql, result } => {
            let metadata = json!({ "sql": sql, "resultCount": result.row_count() });
            let reply = ChatResponse {
                response: format!("Query executed. {} row(s) returned.", result.row_count()),
                sql,
                data: Some(result.rows),
                ..Default::default()
            };
            (reply, metadata)
        }
        MediationOutcome::AwaitingConfirmation(pending) => {
            let metadata = json!({
                "sql": pending.query,
                "confirmationId": pending.id,
                "requiresConfirmation": true,
            });
            let reply = ChatResponse {
                response: "This query modifies data. Confirm to run it.".to_string(),
                sql: pending.query,
                requires_confirmation: true,
                confirmation_id: Some(pending.id),
                expires_at: Some(pending.expires_at),
                ..Default::default()
            };
            (reply, metadata)
        }
        MediationOutcome::Denied { sql, reason } => {
            let metadata = json!({ "sql": sql, "denied": true, "reason": reason });
            let reply = ChatResponse {
                response: format!("Request denied: {}", reason),
                sql,
                denied: true,
                reason: Some(reason),
                ..Default::default()
            };
            (reply, metadata)
        }
    }
}

/// POST /api/confirm-query
///
/// Execute or cancel the query held for this session. Only the held text
/// is ever executed.
pub async fn confirm_query(
    State(state): State<SharedState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<ConfirmRequest>,
) -> ApiResult<Json<ConfirmResponse>> {
    if !req.confirm {
        let cancelled = state.mediator.cancel(&actor, req.confirmation_id).await?;
        let response = "Query cancelled. Nothing was executed.".to_string();
        state
            .chat_log
            .record(AGENT_SENDER, &response, Some(json!({ "sql": cancelled.query, "cancelled": true })))
            .await;

        return Ok(Json(ConfirmResponse {
            success: true,
            response,
            cancelled: true,
            sql: cancelled.query,
            data: None,
        }));
    }

    let (pending, result) = state
        .mediator
        .confirm(&actor, req.confirmation_id, req.sql.as_deref())
        .await?;

    let response = format!("Confirmed query executed. {} row(s) returned.", result.row_count());
    state
        .chat_log
        .record(
            AGENT_SENDER,
            &response,
            Some(json!({
                "sql": pending.query,
                "resultCount": result.row_count(),
                "confirmed": true,
                "confirmationId": pending.id,
            })),
        )
        .await;

    Ok(Json(ConfirmResponse {
        success: true,
        response,
        cancelled: false,
        sql: pending.query,
        data: Some(result.rows),
    }))
}

/// GET /api/confirm-query
pub async fn pending_query(
    State(state): State<SharedState>,
    Extension(actor): Extension<Actor>,
) -> Json<PendingResponse> {
    Json(PendingResponse {
        success: true,
        pending: state.mediator.pending(&actor).await,
    })
}

/// GET /api/schema
pub async fn schema(State(state): State<SharedState>) -> ApiResult<Json<SchemaResponse>> {
    let schema = state.mediator.describe_schema().await?;
    Ok(Json(SchemaResponse {
        fingerprint: schema.fingerprint(),
        schema,
    }))
}

/// GET /api/history
pub async fn history(
    State(state): State<SharedState>,
    Extension(actor): Extension<Actor>,
) -> ApiResult<Json<HistoryResponse>> {
    let entries = state.chat_log.history(&actor).await?;
    Ok(Json(HistoryResponse { entries }))
}
