use serenity::async_trait;

use crate::errors::DeliveryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub attendee: String,
    pub result: Result<(), DeliveryError>,
}

impl DeliveryOutcome {
    pub fn delivered(attendee: &str) -> Self {
        Self {
            attendee: attendee.to_string(),
            result: Ok(()),
        }
    }

    pub fn failed(attendee: &str, err: DeliveryError) -> Self {
        Self {
            attendee: attendee.to_string(),
            result: Err(err),
        }
    }
}

/// Delivers a message to one attendee of a destination.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(
        &self,
        destination: &str,
        attendee: &str,
        message: &str,
    ) -> Result<(), DeliveryError>;
}
