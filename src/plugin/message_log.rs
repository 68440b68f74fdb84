use crate::{event::*, plugin::*, store::LoggedMessage};
use anyhow::Result;

/// Keeps a record of every message in the database
pub struct MessageLog;

#[serenity::async_trait]
impl Plugin for MessageLog {
    fn name(&self) -> &'static str {
        "message_log"
    }

    fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };

        let logged = LoggedMessage {
            message_id: msg.id,
            author_id: msg.author.id,
            channel_id: msg.channel_id,
            content: msg.content.clone(),
            created_at: msg.timestamp.unix_timestamp(),
        };
        ctx.state.messages.record(logged).await?;

        // Allow other plugins to consume this event
        Ok(EventHandled::No)
    }
}
