use axum::{
	Json, Router,
	body::{Body, Bytes},
	extract::{Path, Query, Request, State},
	http::{HeaderMap, StatusCode, header::AUTHORIZATION},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::AppState;
use parley_domain::suggestion::SuggestionStatus;
use parley_service::{
	Error,
	leases::LeaseRenewalReport,
	ledger::PurgeReport,
	notification::{NotificationOutcome, PushEnvelope},
	suggestions::SuggestionView,
};

#[derive(Debug, Clone, Copy)]
enum Guard {
	Webhook,
	Cron,
	Api,
}

#[derive(Debug, Serialize)]
struct WebhookAck {
	status: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	mailbox_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
	status: Option<String>,
	limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ListResponse {
	suggestions: Vec<SuggestionView>,
}

pub fn router(state: AppState) -> Router {
	let webhooks = Router::new()
		.route("/webhooks/mail", post(receive_mail_notification))
		.route_layer(middleware::from_fn_with_state(state.clone(), webhook_auth));
	let cron = Router::new()
		.route("/cron/renew-watches", post(renew_watches))
		.route("/cron/purge-notifications", post(purge_notifications))
		.route_layer(middleware::from_fn_with_state(state.clone(), cron_auth));
	let api = Router::new()
		.route("/v1/mailboxes/{mailbox_id}/suggestions", get(list_suggestions))
		.route("/v1/suggestions/{suggestion_id}", get(get_suggestion))
		.route("/v1/suggestions/{suggestion_id}/accept", post(accept_suggestion))
		.route("/v1/suggestions/{suggestion_id}/dismiss", post(dismiss_suggestion))
		.route_layer(middleware::from_fn_with_state(state.clone(), api_auth));

	Router::new()
		.route("/health", get(health))
		.merge(webhooks)
		.merge(cron)
		.merge(api)
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

/// Acknowledges everything that authenticates and decodes. Sync runs after the response; storage
/// failures here are logged because the next notification or sweep catches the mailbox up.
async fn receive_mail_notification(
	State(state): State<AppState>,
	body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
	let envelope: PushEnvelope = serde_json::from_slice(&body).map_err(|err| {
		json_error(
			StatusCode::BAD_REQUEST,
			"invalid_request",
			format!("Push envelope is malformed: {err}."),
			None,
		)
	})?;
	let ack = match state.service.receive_notification(&envelope).await {
		Ok(NotificationOutcome::Duplicate) => WebhookAck { status: "duplicate", mailbox_id: None },
		Ok(NotificationOutcome::Unresolved) => WebhookAck { status: "unresolved", mailbox_id: None },
		Ok(NotificationOutcome::Dispatched { mailbox_id }) =>
			WebhookAck { status: "dispatched", mailbox_id: Some(mailbox_id) },
		Err(err @ Error::InvalidRequest { .. }) => return Err(err.into()),
		Err(err) => {
			tracing::error!(error = %err, "Push notification intake failed; acknowledging anyway.");

			WebhookAck { status: "deferred", mailbox_id: None }
		},
	};

	Ok(Json(ack))
}

async fn renew_watches(State(state): State<AppState>) -> Result<Json<LeaseRenewalReport>, ApiError> {
	let report = state.service.renew_due_leases(OffsetDateTime::now_utc()).await?;

	Ok(Json(report))
}

async fn purge_notifications(State(state): State<AppState>) -> Result<Json<PurgeReport>, ApiError> {
	let report = state.service.purge_notifications(OffsetDateTime::now_utc()).await?;

	Ok(Json(report))
}

async fn list_suggestions(
	State(state): State<AppState>,
	Path(mailbox_id): Path<String>,
	Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
	let mailbox_id = parse_id(&mailbox_id, "mailbox_id")?;
	let status = query
		.status
		.as_deref()
		.map(|raw| raw.trim().to_ascii_uppercase().parse::<SuggestionStatus>())
		.transpose()
		.map_err(|message| {
			json_error(StatusCode::BAD_REQUEST, "invalid_request", message, Some(vec![
				"status".to_string(),
			]))
		})?;
	let suggestions = state.service.list_suggestions(mailbox_id, status, query.limit).await?;

	Ok(Json(ListResponse { suggestions }))
}

async fn get_suggestion(
	State(state): State<AppState>,
	Path(suggestion_id): Path<String>,
) -> Result<Json<SuggestionView>, ApiError> {
	let suggestion_id = parse_id(&suggestion_id, "suggestion_id")?;

	Ok(Json(state.service.get_suggestion(suggestion_id).await?))
}

async fn accept_suggestion(
	State(state): State<AppState>,
	Path(suggestion_id): Path<String>,
) -> Result<Json<SuggestionView>, ApiError> {
	let suggestion_id = parse_id(&suggestion_id, "suggestion_id")?;

	Ok(Json(state.service.accept_suggestion(suggestion_id).await?))
}

async fn dismiss_suggestion(
	State(state): State<AppState>,
	Path(suggestion_id): Path<String>,
) -> Result<Json<SuggestionView>, ApiError> {
	let suggestion_id = parse_id(&suggestion_id, "suggestion_id")?;

	Ok(Json(state.service.dismiss_suggestion(suggestion_id).await?))
}

async fn webhook_auth(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
	guarded(&state, Guard::Webhook, req, next).await
}

async fn cron_auth(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
	guarded(&state, Guard::Cron, req, next).await
}

async fn api_auth(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
	guarded(&state, Guard::Api, req, next).await
}

async fn guarded(state: &AppState, guard: Guard, req: Request<Body>, next: Next) -> Response {
	let security = &state.service.cfg.security;
	let expected = match guard {
		Guard::Webhook => Some(security.webhook_token.as_str()),
		Guard::Cron => Some(security.cron_token.as_str()),
		Guard::Api => security.api_auth_token.as_deref(),
	};

	if let Some(expected) = expected
		&& read_bearer_token(req.headers()) != Some(expected)
	{
		tracing::warn!(?guard, path = %req.uri().path(), "Rejected unauthenticated request.");

		return json_error(
			StatusCode::UNAUTHORIZED,
			"unauthorized",
			"A valid Bearer token is required.",
			None,
		)
		.into_response();
	}

	next.run(req).await
}

fn read_bearer_token(headers: &HeaderMap) -> Option<&str> {
	let raw = headers.get(AUTHORIZATION)?;
	let value = raw.to_str().ok()?.trim();
	let token = value.strip_prefix("Bearer ")?.trim();

	if token.is_empty() { None } else { Some(token) }
}

fn parse_id(raw: &str, field: &str) -> Result<Uuid, ApiError> {
	Uuid::parse_str(raw.trim()).map_err(|_| {
		json_error(
			StatusCode::BAD_REQUEST,
			"invalid_request",
			format!("{field} must be a UUID."),
			Some(vec![field.to_string()]),
		)
	})
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}
impl From<Error> for ApiError {
	fn from(err: Error) -> Self {
		match err {
			Error::InvalidRequest { message } =>
				json_error(StatusCode::BAD_REQUEST, "invalid_request", message, None),
			Error::NotFound { message } =>
				json_error(StatusCode::NOT_FOUND, "not_found", message, None),
			Error::Conflict { message } =>
				json_error(StatusCode::CONFLICT, "conflict", message, None),
			Error::Provider { message, .. } =>
				json_error(StatusCode::BAD_GATEWAY, "provider_error", message, None),
			Error::CursorExpired => json_error(
				StatusCode::BAD_GATEWAY,
				"provider_error",
				"Mail history cursor expired.",
				None,
			),
			Error::Storage { message } => {
				tracing::error!(error = %message, "Storage failure while serving request.");

				json_error(
					StatusCode::INTERNAL_SERVER_ERROR,
					"storage_error",
					"Storage is unavailable.",
					None,
				)
			},
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}
