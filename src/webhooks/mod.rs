//! Webhook handling for GitHub Actions events.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA256)
//! - Event parsing into typed partial entities
//! - [`WebhookIngester`], which applies verified events to the store

pub mod events;
pub mod ingest;
pub mod parser;
pub mod signature;

pub use events::GitHubEvent;
pub use ingest::{IngestError, Ingested, WebhookIngester};
pub use parser::{ParseError, parse_webhook};
pub use signature::{parse_signature_header, verify_signature};
