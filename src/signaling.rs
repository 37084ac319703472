//! HTTP offer/answer signaling.
//!
//! One round trip per session: POST the local offer as JSON
//! `{"sdp": ..., "type": ...}` to the configured endpoint and read the
//! remote answer back in the same shape. Any non-2xx status is a failure;
//! there is no retry.

use crate::config::SignalingConfig;
use crate::errors::CamcastError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Wire form of a session description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescriptionPayload {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl From<&RTCSessionDescription> for SessionDescriptionPayload {
    fn from(desc: &RTCSessionDescription) -> Self {
        Self {
            sdp: desc.sdp.clone(),
            kind: desc.sdp_type.to_string(),
        }
    }
}

impl TryFrom<SessionDescriptionPayload> for RTCSessionDescription {
    type Error = CamcastError;

    fn try_from(payload: SessionDescriptionPayload) -> Result<Self, Self::Error> {
        let kind = payload.kind.clone();
        match payload.kind.as_str() {
            "offer" => RTCSessionDescription::offer(payload.sdp),
            "answer" => RTCSessionDescription::answer(payload.sdp),
            "pranswer" => RTCSessionDescription::pranswer(payload.sdp),
            other => {
                return Err(CamcastError::SignalingError(format!(
                    "Unsupported SDP type: {}",
                    other
                )))
            }
        }
        .map_err(|e| CamcastError::SignalingError(format!("Invalid SDP {}: {}", kind, e)))
    }
}

/// HTTP client for the offer/answer exchange
pub struct SignalingClient {
    endpoint: String,
    http: reqwest::Client,
}

impl SignalingClient {
    pub fn new(config: &SignalingConfig) -> Result<Self, CamcastError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                CamcastError::InitializationError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST an offer payload and return the answer payload
    pub async fn post_offer(
        &self,
        offer: &SessionDescriptionPayload,
    ) -> Result<SessionDescriptionPayload, CamcastError> {
        log::info!("Posting {} to {}", offer.kind, self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .json(offer)
            .send()
            .await
            .map_err(|e| CamcastError::SignalingError(format!("Offer POST failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CamcastError::SignalingError(format!(
                "Signaling endpoint returned {}",
                status
            )));
        }

        response
            .json::<SessionDescriptionPayload>()
            .await
            .map_err(|e| CamcastError::SignalingError(format!("Failed to parse answer: {}", e)))
    }

    /// Exchange a local offer for the remote answer
    pub async fn exchange_offer(
        &self,
        offer: &RTCSessionDescription,
    ) -> Result<RTCSessionDescription, CamcastError> {
        let answer = self.post_offer(&SessionDescriptionPayload::from(offer)).await?;
        log::info!("Received {} from signaling endpoint", answer.kind);
        RTCSessionDescription::try_from(answer)
    }
}
