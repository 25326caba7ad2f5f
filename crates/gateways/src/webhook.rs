//! Signed webhook verification.
//!
//! The processor signs each delivery with a header of the form
//! `t=<unix seconds>,v1=<hex hmac>[,v1=...]`. The signed payload is
//! `"<t>.<raw body>"` and the MAC is HMAC-SHA256 keyed with the endpoint
//! secret.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::payment::{CompletedSession, WebhookEvent};
use crate::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed delivery, in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Event type emitted when a hosted checkout is paid.
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Produces a signature header for `payload`.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mac = mac_for(secret, timestamp, payload)?;
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Checks a signature header against `payload`.
///
/// `now` is the current unix time in seconds. Any `v1` entry that matches is
/// accepted; the comparison is constant-time.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<()> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| GatewayError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "no v1 signature".to_string(),
        ));
    }
    if now.abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        return Err(GatewayError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let matched = signatures.into_iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        mac_for(secret, timestamp, payload)
            .map(|mac| mac.verify_slice(&expected).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(GatewayError::InvalidSignature(
            "signature mismatch".to_string(),
        ))
    }
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawSession {
    id: String,
    amount_total: Option<i64>,
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

/// Parses a verified webhook body.
pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| GatewayError::MalformedEvent(e.to_string()))?;

    let completed = if raw.kind == CHECKOUT_SESSION_COMPLETED {
        let session: RawSession = serde_json::from_value(raw.data.object)
            .map_err(|e| GatewayError::MalformedEvent(e.to_string()))?;
        Some(CompletedSession {
            id: session.id,
            amount_total: session.amount_total,
            payment_intent: session.payment_intent,
            metadata: session.metadata,
        })
    } else {
        None
    };

    Ok(WebhookEvent {
        id: raw.id,
        kind: raw.kind,
        completed,
    })
}

/// Verifies then parses a webhook delivery.
pub fn construct_event(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<WebhookEvent> {
    verify_signature(payload, header, secret, DEFAULT_TOLERANCE_SECS, now)?;
    parse_event(payload)
}
