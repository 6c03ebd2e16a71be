// crates/stmt-diag-core/src/core/notification.rs
// ============================================================================
// Module: Cluster Notifications
// Description: Typed messages carried over the cluster broadcast channel.
// Purpose: Dispatch by message kind instead of raw key-prefix comparison.
// Dependencies: thiserror, crate::core::identifiers
// ============================================================================

//! ## Overview
//! Broadcast transports move `(key, payload)` pairs. This module owns the
//! mapping between those pairs and [`ClusterNotification`] values. Keys that
//! belong to sibling notification types decode to `None` and are ignored.
//! Wire form for a diagnostics request: key [`DIAGNOSTICS_REQUEST_KEY`] and the
//! request id as 8 little-endian bytes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::identifiers::RequestId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix shared by every diagnostics broadcast key.
pub const NOTIFICATION_KEY_PREFIX: &str = "stmt-diag";
/// Broadcast key announcing a new diagnostics request.
pub const DIAGNOSTICS_REQUEST_KEY: &str = "stmt-diag-request";
/// Payload length of a diagnostics request notification.
const REQUEST_PAYLOAD_LEN: usize = 8;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Notification exchanged between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterNotification {
    /// A diagnostics request was inserted; receivers should poll.
    DiagnosticsRequest(RequestId),
}

/// Encoded notification ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireNotification {
    /// Broadcast key.
    pub key: String,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

/// Notification decoding failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// Payload length does not match the message kind.
    #[error("notification payload for {key} has {actual} bytes (expected {expected})")]
    PayloadLength {
        /// Broadcast key.
        key: String,
        /// Expected payload length.
        expected: usize,
        /// Actual payload length.
        actual: usize,
    },
    /// Payload carries a zero request id.
    #[error("notification payload carries a zero request id")]
    ZeroRequestId,
}

// ============================================================================
// SECTION: Codec
// ============================================================================

impl ClusterNotification {
    /// Returns the broadcast key for this notification.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::DiagnosticsRequest(_) => DIAGNOSTICS_REQUEST_KEY,
        }
    }

    /// Encodes the notification for a transport.
    #[must_use]
    pub fn encode(&self) -> WireNotification {
        match self {
            Self::DiagnosticsRequest(id) => WireNotification {
                key: DIAGNOSTICS_REQUEST_KEY.to_string(),
                payload: id.get().to_le_bytes().to_vec(),
            },
        }
    }

    /// Decodes a transport message; returns `Ok(None)` for keys owned by other kinds.
    ///
    /// # Errors
    ///
    /// Returns [`NotificationError`] when a recognized key carries a malformed payload.
    pub fn decode(key: &str, payload: &[u8]) -> Result<Option<Self>, NotificationError> {
        if key != DIAGNOSTICS_REQUEST_KEY {
            return Ok(None);
        }
        let bytes: [u8; REQUEST_PAYLOAD_LEN] =
            payload.try_into().map_err(|_| NotificationError::PayloadLength {
                key: key.to_string(),
                expected: REQUEST_PAYLOAD_LEN,
                actual: payload.len(),
            })?;
        let id = RequestId::from_raw(u64::from_le_bytes(bytes))
            .ok_or(NotificationError::ZeroRequestId)?;
        Ok(Some(Self::DiagnosticsRequest(id)))
    }
}
