use std::sync::Arc;

use serenity::async_trait;
use serenity::http::Http;
use serenity::model::id::{GuildId, UserId};

use crate::errors::DeliveryError;
use crate::service::notification_sink::NotificationSink;

const MEMBER_SEARCH_LIMIT: u64 = 10;

/// Direct-messages attendees over Discord. Destinations are guild ids and
/// attendees are either user ids or member names within that guild.
pub struct DiscordDmSink {
    http: Arc<Http>,
}

impl DiscordDmSink {
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
        }
    }

    async fn resolve(&self, destination: &str, attendee: &str) -> Result<UserId, DeliveryError> {
        if let Ok(id) = attendee.parse::<u64>() {
            return Ok(UserId::new(id));
        }
        let guild = destination
            .parse::<u64>()
            .map(GuildId::new)
            .map_err(|_| DeliveryError::UnknownAttendee(attendee.to_string()))?;
        let members = guild
            .search_members(&self.http, attendee, Some(MEMBER_SEARCH_LIMIT))
            .await
            .map_err(|e| DeliveryError::Send {
                attendee: attendee.to_string(),
                reason: format!("member lookup failed: {:?}", e),
            })?;
        members
            .into_iter()
            .find(|member| {
                member.user.name.eq_ignore_ascii_case(attendee)
                    || member
                        .nick
                        .as_deref()
                        .is_some_and(|nick| nick.eq_ignore_ascii_case(attendee))
            })
            .map(|member| member.user.id)
            .ok_or_else(|| DeliveryError::UnknownAttendee(attendee.to_string()))
    }

    async fn send_dm(&self, destination: &str, attendee: &str, content: &str) -> Result<(), DeliveryError> {
        let user = self.resolve(destination, attendee).await?;
        let channel = user
            .create_dm_channel(&*self.http)
            .await
            .map_err(|e| DeliveryError::Send {
                attendee: attendee.to_string(),
                reason: format!("failed to create DM channel: {:?}", e),
            })?;
        channel
            .say(&*self.http, content)
            .await
            .map_err(|e| DeliveryError::Send {
                attendee: attendee.to_string(),
                reason: format!("failed to send DM: {:?}", e),
            })?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for DiscordDmSink {
    async fn send(
        &self,
        destination: &str,
        attendee: &str,
        message: &str,
    ) -> Result<(), DeliveryError> {
        self.send_dm(destination, attendee, message).await
    }
}
