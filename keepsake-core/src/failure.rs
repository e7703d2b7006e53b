use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TransportError;

/// Classification kept in the ledger so that operators can tell a carrier
/// refusal apart from a network problem, even though both end in manual fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    InvalidInput,
    Transport,
    CarrierBusiness,
    GatewayRejected,
    /// The remote side accepted the request but the outcome never reached the ledger
    Unrecorded,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::InvalidInput => "INVALID_INPUT",
            FailureKind::Transport => "TRANSPORT",
            FailureKind::CarrierBusiness => "CARRIER_BUSINESS",
            FailureKind::GatewayRejected => "GATEWAY_REJECTED",
            FailureKind::Unrecorded => "UNRECORDED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub reason: String,
    /// Raw HTTP status and body (truncated) as returned by the remote side.
    pub raw_details: Option<String>,
    /// Identifier the remote side issued before the failure (AWB, pickup id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_reference: Option<String>,
}

const MAX_RAW_DETAILS: usize = 2048;

impl FailureDetail {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            raw_details: None,
            remote_reference: None,
        }
    }

    pub fn with_raw(mut self, status: u16, body: &str) -> Self {
        let mut raw = format!("HTTP {}: {}", status, body);
        if raw.len() > MAX_RAW_DETAILS {
            let mut cut = MAX_RAW_DETAILS;
            while !raw.is_char_boundary(cut) {
                cut -= 1;
            }
            raw.truncate(cut);
        }
        self.raw_details = Some(raw);
        self
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidInput, reason)
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, reason)
    }

    pub fn business(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::CarrierBusiness, reason)
    }

    pub fn gateway_rejected(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::GatewayRejected, reason)
    }

    /// A carrier success whose record could not be written
    pub fn unrecorded(remote_reference: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut detail = Self::new(FailureKind::Unrecorded, reason);
        detail.remote_reference = Some(remote_reference.into());
        detail
    }
}

impl From<TransportError> for FailureDetail {
    fn from(err: TransportError) -> Self {
        FailureDetail::transport(err.to_string())
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.reason)?;
        if let Some(reference) = &self.remote_reference {
            write!(f, " (remote reference {})", reference)?;
        }
        Ok(())
    }
}
