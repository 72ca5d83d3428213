//! Webhook endpoint handler.
//!
//! Accepts GitHub webhook deliveries, hands them to the [`WebhookIngester`]
//! and maps the outcome to a status code. Deliveries are applied before the
//! response is sent.
//!
//! [`WebhookIngester`]: crate::webhooks::WebhookIngester

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use crate::webhooks::{IngestError, Ingested};

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID. Only used for logging.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing required header.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            WebhookError::Ingest(IngestError::MissingSignature | IngestError::InvalidSignature) => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::Ingest(IngestError::Parse(_)) => StatusCode::BAD_REQUEST,
        };

        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Response
///
/// - 200 OK: delivery applied, acknowledged or ignored
/// - 400 Bad Request: missing `X-GitHub-Event` or a malformed payload
/// - 401 Unauthorized: missing or invalid `X-Hub-Signature-256`
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_type = get_header(&headers, HEADER_EVENT)?;
    let delivery_id = get_header(&headers, HEADER_DELIVERY).unwrap_or_default();
    let signature = get_header(&headers, HEADER_SIGNATURE).ok();

    debug!(
        delivery_id = %delivery_id,
        event_type = %event_type,
        "Received webhook"
    );

    match app_state
        .ingester()
        .handle(&event_type, &body, signature.as_deref())
    {
        Ok(Ingested::Applied) => Ok((StatusCode::OK, "Applied")),
        Ok(Ingested::Acknowledged) => Ok((StatusCode::OK, "Acknowledged")),
        Ok(Ingested::Ignored) => Ok((StatusCode::OK, "Ignored")),
        Err(e) => {
            warn!(
                delivery_id = %delivery_id,
                event_type = %event_type,
                error = %e,
                "Rejected webhook"
            );
            Err(e.into())
        }
    }
}

/// Extracts a required header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(WebhookError::MissingHeader(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::ParseError;

    #[test]
    fn get_header_present_and_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_EVENT, "workflow_run".parse().unwrap());

        assert_eq!(get_header(&headers, HEADER_EVENT).unwrap(), "workflow_run");
        assert!(matches!(
            get_header(&headers, HEADER_SIGNATURE),
            Err(WebhookError::MissingHeader(HEADER_SIGNATURE))
        ));
    }

    #[test]
    fn error_statuses() {
        let cases = [
            (WebhookError::MissingHeader(HEADER_EVENT), StatusCode::BAD_REQUEST),
            (IngestError::MissingSignature.into(), StatusCode::UNAUTHORIZED),
            (IngestError::InvalidSignature.into(), StatusCode::UNAUTHORIZED),
            (
                IngestError::Parse(ParseError::MissingField("workflow_run.id")).into(),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
