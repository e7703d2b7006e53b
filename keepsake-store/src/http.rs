//! Shared reqwest plumbing for the outbound adapters.

use keepsake_core::TransportError;
use reqwest::Client;
use std::time::Duration;

/// Build a client whose timeout bounds the whole request.
/// A timeout only stops the wait; the remote side may still act on the call.
pub fn client_with_timeout(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .build()
}

pub fn transport_error(context: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(format!("{}: {}", context, error))
    } else if error.is_connect() {
        TransportError::Connection(format!("{}: {}", context, error))
    } else {
        TransportError::Request(format!("{}: {}", context, error))
    }
}

/// Status and raw body; reading the body can itself time out.
pub async fn read_reply(context: &str, response: reqwest::Response) -> Result<(u16, String), TransportError> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(context, e))?;
    Ok((status, body))
}
