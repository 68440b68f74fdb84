use super::{Database, Result};
use rusqlite::params;
use serenity::all::{ChannelId, MessageId, UserId};

/// A message as it is recorded in the `messages` table.
#[derive(Clone, Debug, PartialEq)]
pub struct LoggedMessage {
    pub message_id: MessageId,
    pub author_id: UserId,
    pub channel_id: ChannelId,
    pub content: String,
    /// UNIX timestamp in seconds
    pub created_at: i64,
}

/// Append-only record of every message the bot has seen.
#[derive(Clone)]
pub struct MessageLog {
    db: Database,
}

impl MessageLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a message.  Recording the same message twice is a no-op.
    pub async fn record(&self, msg: LoggedMessage) -> Result<()> {
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO messages (message_id, author_id, channel_id, content, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(message_id) DO NOTHING",
                    params![
                        msg.message_id.get(),
                        msg.author_id.get(),
                        msg.channel_id.get(),
                        msg.content,
                        msg.created_at
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Number of messages recorded for an author.
    pub async fn count_by_author(&self, author: UserId) -> Result<u64> {
        self.db
            .with_conn(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM messages WHERE author_id = ?1",
                    params![author.get()],
                    |row| row.get(0),
                )?)
            })
            .await
    }

    /// Authors with the most messages after `since` (UNIX seconds), busiest first.  Ties go
    /// to the lower user id.
    pub async fn top_authors_since(&self, since: i64, limit: u32) -> Result<Vec<(UserId, u64)>> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT author_id, COUNT(*) AS total FROM messages \
                     WHERE created_at > ?1 \
                     GROUP BY author_id \
                     ORDER BY total DESC, author_id ASC \
                     LIMIT ?2",
                )?;
                let authors = stmt
                    .query_map(params![since, limit], |row| {
                        Ok((UserId::new(row.get(0)?), row.get(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(authors)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::temp_db;

    fn message(id: u64, author: u64) -> LoggedMessage {
        message_at(id, author, 1_700_000_000)
    }

    fn message_at(id: u64, author: u64, created_at: i64) -> LoggedMessage {
        LoggedMessage {
            message_id: MessageId::new(id),
            author_id: UserId::new(author),
            channel_id: ChannelId::new(10),
            content: format!("message {id}"),
            created_at,
        }
    }

    #[tokio::test]
    async fn duplicate_messages_are_recorded_once() {
        let (_dir, db) = temp_db().await;
        let log = MessageLog::new(db);

        log.record(message(1, 5)).await.unwrap();
        log.record(message(1, 5)).await.unwrap();
        log.record(message(2, 5)).await.unwrap();
        log.record(message(3, 6)).await.unwrap();

        assert_eq!(log.count_by_author(UserId::new(5)).await.unwrap(), 2);
        assert_eq!(log.count_by_author(UserId::new(6)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn top_authors_counts_only_recent_messages() {
        let (_dir, db) = temp_db().await;
        let log = MessageLog::new(db);
        let since = 1_000;

        // Author 7 was busiest, but before the cutoff.
        for id in 1..=5 {
            log.record(message_at(id, 7, since - 10)).await.unwrap();
        }
        for id in 10..13 {
            log.record(message_at(id, 8, since + id as i64)).await.unwrap();
        }
        log.record(message_at(20, 9, since + 1)).await.unwrap();
        log.record(message_at(21, 6, since + 1)).await.unwrap();
        log.record(message_at(22, 7, since)).await.unwrap();

        let top = log.top_authors_since(since, 10).await.unwrap();
        assert_eq!(
            top,
            vec![(UserId::new(8), 3), (UserId::new(6), 1), (UserId::new(9), 1)]
        );

        let top = log.top_authors_since(since, 1).await.unwrap();
        assert_eq!(top, vec![(UserId::new(8), 3)]);
    }
}
