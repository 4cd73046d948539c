use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================================
// Router Contract Constants
// ============================================================================

/// Upper bound on any redelivery delay the platform asks the router for.
///
/// Matches the SQS visibility timeout ceiling (12 hours), which is the
/// tightest limit among the supported queue backends.
pub const MAX_DELAY_SECONDS: u32 = 43_200;

// ============================================================================
// Dispatch Processing Types
// ============================================================================

/// Request sent by the message router to the processing endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    /// Dispatch job ID carried by the queued message pointer
    pub message_id: String,
}

/// Outcome returned to the message router.
///
/// `ack = true` removes the message from the queue (the job reached a stable
/// state, success or permanent failure). `ack = false` asks for redelivery,
/// optionally after `delay_seconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub ack: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub delay_seconds: Option<u32>,
}

impl ProcessResponse {
    pub fn ack(message: impl Into<String>) -> Self {
        Self {
            ack: true,
            message: message.into(),
            delay_seconds: None,
        }
    }

    pub fn nack(message: impl Into<String>) -> Self {
        Self {
            ack: false,
            message: message.into(),
            delay_seconds: None,
        }
    }

    /// Nack with a redelivery delay, clamped to `1..=MAX_DELAY_SECONDS`
    pub fn nack_with_delay(message: impl Into<String>, delay_seconds: u32) -> Self {
        Self {
            ack: false,
            message: message.into(),
            delay_seconds: Some(delay_seconds.clamp(1, MAX_DELAY_SECONDS)),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }
}

/// ACK/NACK decision as seen by the queue consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckNack {
    Ack,
    Nack { delay_seconds: Option<u32> },
}

impl From<&ProcessResponse> for AckNack {
    fn from(response: &ProcessResponse) -> Self {
        if response.is_ack() {
            AckNack::Ack
        } else {
            AckNack::Nack { delay_seconds: response.delay_seconds }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_serializes_without_delay() {
        let json = serde_json::to_value(ProcessResponse::ack("Success")).unwrap();
        assert_eq!(json, serde_json::json!({"ack": true, "message": "Success"}));
    }

    #[test]
    fn test_nack_with_delay_uses_camel_case() {
        let json = serde_json::to_value(ProcessResponse::nack_with_delay("HTTP 500", 20)).unwrap();
        assert_eq!(json["delaySeconds"], 20);
        assert_eq!(json["ack"], false);
    }

    #[test]
    fn test_nack_delay_is_clamped() {
        assert_eq!(ProcessResponse::nack_with_delay("x", 0).delay_seconds, Some(1));
        assert_eq!(
            ProcessResponse::nack_with_delay("x", u32::MAX).delay_seconds,
            Some(MAX_DELAY_SECONDS)
        );
    }

    #[test]
    fn test_process_request_parses_message_id() {
        let req: ProcessRequest = serde_json::from_str(r#"{"messageId":"0HZXEQ5Y8JY5Z"}"#).unwrap();
        assert_eq!(req.message_id, "0HZXEQ5Y8JY5Z");
    }

    #[test]
    fn test_ack_nack_conversion() {
        assert_eq!(AckNack::from(&ProcessResponse::ack("ok")), AckNack::Ack);
        assert_eq!(
            AckNack::from(&ProcessResponse::nack_with_delay("later", 10)),
            AckNack::Nack { delay_seconds: Some(10) }
        );
    }
}
