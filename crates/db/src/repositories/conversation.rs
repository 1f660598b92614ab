use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use orderdesk_core::domain::conversation::{Conversation, ConversationId, Message, Role};

use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, content FROM conversation_message
             WHERE conversation_id = ? ORDER BY seq",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message, RepositoryError> {
    let role: String = row.try_get("role").map_err(RepositoryError::decode)?;
    let content: String = row.try_get("content").map_err(RepositoryError::decode)?;
    let role = Role::parse(&role)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role}`")))?;
    Ok(Message { role, content })
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn get_or_create(
        &self,
        sender_id: &str,
        system_prompt: &str,
    ) -> Result<Conversation, RepositoryError> {
        if let Some(existing) = self.find_by_sender(sender_id).await? {
            return Ok(existing);
        }

        let now = Utc::now().to_rfc3339();
        let conversation_id = ConversationId::generate();
        let mut tx = self.pool.begin().await?;

        // Writing first takes the write lock, so a concurrent creator either
        // loses the insert or sees the fully seeded transcript.
        let inserted = sqlx::query(
            "INSERT INTO conversation (id, sender_id, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(sender_id) DO NOTHING",
        )
        .bind(&conversation_id.0)
        .bind(sender_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 1 {
            sqlx::query(
                "INSERT INTO conversation_message (conversation_id, seq, role, content, created_at)
                 VALUES (?, 0, ?, ?, ?)",
            )
            .bind(&conversation_id.0)
            .bind(Role::System.as_str())
            .bind(system_prompt)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.find_by_sender(sender_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("conversation for `{sender_id}` vanished after insert"))
        })
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        message: Message,
    ) -> Result<Message, RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query("UPDATE conversation SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&conversation_id.0)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(RepositoryError::NotFound {
                entity: "conversation",
                id: conversation_id.0.clone(),
            });
        }

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM conversation_message WHERE conversation_id = ?",
        )
        .bind(&conversation_id.0)
        .fetch_one(&mut *tx)
        .await?;

        if (message.role == Role::System) != (next_seq == 0) {
            return Err(RepositoryError::Validation(format!(
                "{} message cannot be appended at position {next_seq}",
                message.role.as_str()
            )));
        }

        sqlx::query(
            "INSERT INTO conversation_message (conversation_id, seq, role, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&conversation_id.0)
        .bind(next_seq)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(message)
    }

    async fn find_by_sender(
        &self,
        sender_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query("SELECT id, sender_id, created_at FROM conversation WHERE sender_id = ?")
            .bind(sender_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let id: String = row.try_get("id").map_err(RepositoryError::decode)?;
        let sender_id: String = row.try_get("sender_id").map_err(RepositoryError::decode)?;
        let created_at: String = row.try_get("created_at").map_err(RepositoryError::decode)?;
        let messages = self.load_messages(&id).await?;

        Ok(Some(Conversation {
            id: ConversationId(id),
            sender_id,
            messages,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|value| value.with_timezone(&Utc))
                .map_err(RepositoryError::decode)?,
        }))
    }
}
