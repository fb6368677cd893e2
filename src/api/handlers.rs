use crate::api::ApiState;
use crate::api::responses::{
    DriverFailureResponse, ErrorCode, ErrorResponse, HealthResponse, HealthStatus,
    LatestResultResponse, SessionResponse, TriggerAcceptedResponse,
};
use crate::state::{AppState, SessionPhase, StatusLedger};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, error};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
/// Byte injected into the trigger channel for each HTTP trigger.
const HTTP_TRIGGER_BYTE: u8 = b'\n';

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success { status: StatusCode, body: T },
    Error { status: StatusCode, body: ErrorResponse },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<ApiState>) -> impl IntoResponse {
    build_health_response(&state.app, SystemTime::now())
}

pub async fn get_session(State(state): State<ApiState>) -> impl IntoResponse {
    build_session_response(&state.app, SystemTime::now())
}

pub async fn get_latest(State(state): State<ApiState>) -> impl IntoResponse {
    build_latest_response(&state.app)
}

pub async fn post_trigger(State(state): State<ApiState>) -> impl IntoResponse {
    build_trigger_response(&state.trigger, SystemTime::now())
}

fn build_health_response(
    state: &Arc<RwLock<AppState>>,
    now: SystemTime,
) -> ApiResponse<HealthResponse> {
    let (phase, status) = match state.read() {
        Ok(guard) => (
            guard.phase(),
            derive_health_status(guard.phase(), guard.ledger()),
        ),
        Err(_) => {
            return internal_error("/api/health", "state lock poisoned while reading phase");
        }
    };

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => {
            return internal_error("/api/health", "timestamp formatting failure");
        }
    };

    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    ApiResponse::Success {
        status: status_code,
        body: HealthResponse {
            status,
            phase: phase.to_string(),
            timestamp,
        },
    }
}

fn derive_health_status(phase: SessionPhase, ledger: &StatusLedger) -> HealthStatus {
    match phase {
        SessionPhase::Ranging { .. } if ledger.is_clean() => HealthStatus::Ok,
        SessionPhase::Ranging { .. } | SessionPhase::Booting | SessionPhase::Configuring => {
            HealthStatus::Degraded
        }
        SessionPhase::Uninitialized | SessionPhase::Stopped | SessionPhase::Failed => {
            HealthStatus::Ko
        }
    }
}

fn build_session_response(
    state: &Arc<RwLock<AppState>>,
    now: SystemTime,
) -> ApiResponse<SessionResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/session", "state lock poisoned while reading session");
        }
    };
    let phase = guard.phase();
    let reports_emitted = guard.reports_emitted();
    let failed_calls = guard.ledger().failed_calls();
    let last_failure = guard
        .ledger()
        .last_failure()
        .map(|(call, message)| DriverFailureResponse {
            call: call.to_string(),
            message: message.to_string(),
        });
    drop(guard);

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => {
            return internal_error("/api/session", "timestamp formatting failure");
        }
    };

    let first_measurement_pending = match phase {
        SessionPhase::Ranging { first_measurement } => first_measurement,
        SessionPhase::Uninitialized | SessionPhase::Booting | SessionPhase::Configuring => true,
        SessionPhase::Stopped | SessionPhase::Failed => false,
    };

    ApiResponse::Success {
        status: StatusCode::OK,
        body: SessionResponse {
            phase: phase.to_string(),
            first_measurement_pending,
            reports_emitted,
            failed_calls,
            last_failure,
            timestamp,
        },
    }
}

fn build_latest_response(state: &Arc<RwLock<AppState>>) -> ApiResponse<LatestResultResponse> {
    let latest = match state.read() {
        Ok(guard) => guard.latest().copied(),
        Err(_) => {
            return internal_error("/api/latest", "state lock poisoned while reading latest result");
        }
    };

    let Some(latest) = latest else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::NoData,
            "No ranging result reported yet",
            SystemTime::now(),
        )
        .unwrap_or_else(|| internal_error("/api/latest", "timestamp formatting failure"));
    };

    let timestamp = match format_timestamp(latest.timestamp) {
        Ok(formatted) => formatted,
        Err(_) => {
            return internal_error("/api/latest", "timestamp formatting failure");
        }
    };
    let result = latest.result;

    ApiResponse::Success {
        status: StatusCode::OK,
        body: LatestResultResponse {
            status: result.status_code(),
            range_status: format!("{:?}", result.range_status),
            distance_mm: result.distance_mm,
            ambient: result.ambient,
            signal_per_spad: result.signal_per_spad,
            spad_count: result.spad_count,
            timestamp,
        },
    }
}

fn build_trigger_response(
    trigger: &Sender<u8>,
    now: SystemTime,
) -> ApiResponse<TriggerAcceptedResponse> {
    if trigger.send(HTTP_TRIGGER_BYTE).is_err() {
        debug!("Trigger rejected, session no longer listening");
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::SessionUnavailable,
            "Ranging session is not accepting triggers",
            now,
        )
        .unwrap_or_else(|| internal_error("/api/trigger", "timestamp formatting failure"));
    }

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status: StatusCode::ACCEPTED,
            body: TriggerAcceptedResponse {
                accepted: true,
                timestamp,
            },
        },
        Err(_) => internal_error("/api/trigger", "timestamp formatting failure"),
    }
}

fn error_response<T>(
    status: StatusCode,
    error_code: ErrorCode,
    message: &str,
    now: SystemTime,
) -> Option<ApiResponse<T>> {
    let timestamp = format_timestamp(now).ok()?;
    Some(ApiResponse::Error {
        status,
        body: ErrorResponse {
            error_code,
            error_message: message.to_string(),
            timestamp,
        },
    })
}

fn internal_error<T>(route: &str, message: &str) -> ApiResponse<T> {
    error!(
        route = route,
        message = message,
        "Internal error while handling request"
    );
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}
