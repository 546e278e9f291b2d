//! SQLite-backed conversation store.
//!
//! Single-file database holding conversations, messages, items and chunk
//! embeddings. Embedding vectors are stored as little-endian f32 BLOBs.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{ConversationRecord, ConversationStore, DocumentRecord, StoredEmbedding, StoredMessage};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

pub struct SqliteStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL,
                context TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                source_embedding_id TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                uri TEXT NOT NULL,
                display_name TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                last_updated TEXT NOT NULL,
                FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS embeddings (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                chunk_text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                page INTEGER,
                FOREIGN KEY(item_id) REFERENCES items(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        for statement in [
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)",
            "CREATE INDEX IF NOT EXISTS idx_items_conversation ON items(conversation_id)",
            "CREATE INDEX IF NOT EXISTS idx_embeddings_conversation ON embeddings(conversation_id)",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(ApiError::internal)?;
        }

        Ok(())
    }

    fn serialize_vector(vector: &[f32]) -> Vec<u8> {
        vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_vector(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> ConversationRecord {
        ConversationRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            title: row.get("title"),
            context: row.get("context"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> DocumentRecord {
        let active: i64 = row.get("active");
        DocumentRecord {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            uri: row.get("uri"),
            display_name: row.get("display_name"),
            active: active != 0,
            last_updated: row.get("last_updated"),
        }
    }

    fn row_to_embedding(row: &sqlx::sqlite::SqliteRow) -> StoredEmbedding {
        let blob: Vec<u8> = row.get("embedding");
        StoredEmbedding {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            item_id: row.get("item_id"),
            chunk_text: row.get("chunk_text"),
            vector: Self::deserialize_vector(&blob),
            page: row.get("page"),
        }
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> StoredMessage {
        StoredMessage {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            role: row.get("role"),
            content: row.get("content"),
            source_embedding_id: row.get("source_embedding_id"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
        context: &str,
    ) -> Result<ConversationRecord, ApiError> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO conversations (id, user_id, title, context, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(context)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(ConversationRecord {
            id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            context: context.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<ConversationRecord>, ApiError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(Self::row_to_conversation))
    }

    async fn list_conversations(
        &self,
        title: Option<&str>,
    ) -> Result<Vec<ConversationRecord>, ApiError> {
        let rows = if let Some(title) = title {
            sqlx::query(
                "SELECT * FROM conversations WHERE title = ?1 ORDER BY created_at DESC",
            )
            .bind(title)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query("SELECT * FROM conversations ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await
                .map_err(ApiError::internal)?
        };

        Ok(rows.iter().map(Self::row_to_conversation).collect())
    }

    async fn update_conversation(
        &self,
        conversation_id: Uuid,
        title: Option<&str>,
        context: Option<&str>,
    ) -> Result<Option<ConversationRecord>, ApiError> {
        let Some(current) = self.get_conversation(conversation_id).await? else {
            return Ok(None);
        };

        let now = chrono::Utc::now().to_rfc3339();
        let title = title.unwrap_or(current.title.as_str());
        let context = context.unwrap_or(current.context.as_str());

        sqlx::query(
            "UPDATE conversations SET title = ?1, context = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(title)
        .bind(context)
        .bind(&now)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        self.get_conversation(conversation_id).await
    }

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_item(&self, item: DocumentRecord) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT OR REPLACE INTO items (id, conversation_id, uri, display_name, active, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(item.id)
        .bind(item.conversation_id)
        .bind(&item.uri)
        .bind(&item.display_name)
        .bind(item.active as i64)
        .bind(&item.last_updated)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn list_items(&self, conversation_id: Uuid) -> Result<Vec<DocumentRecord>, ApiError> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE conversation_id = ?1 ORDER BY last_updated DESC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows.iter().map(Self::row_to_item).collect())
    }

    async fn count_items(&self, conversation_id: Uuid) -> Result<i64, ApiError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE conversation_id = ?1")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        Ok(count)
    }

    async fn fetch_document(&self, item_id: Uuid) -> Result<Option<DocumentRecord>, ApiError> {
        let row = sqlx::query("SELECT * FROM items WHERE id = ?1")
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(Self::row_to_item))
    }

    async fn insert_embedding(&self, embedding: StoredEmbedding) -> Result<(), ApiError> {
        let blob = Self::serialize_vector(&embedding.vector);

        sqlx::query(
            "INSERT OR REPLACE INTO embeddings (id, conversation_id, item_id, chunk_text, embedding, page)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(embedding.id)
        .bind(embedding.conversation_id)
        .bind(embedding.item_id)
        .bind(&embedding.chunk_text)
        .bind(&blob)
        .bind(embedding.page)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn fetch_active_embeddings(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<StoredEmbedding>, ApiError> {
        let rows = sqlx::query(
            "SELECT e.id, e.conversation_id, e.item_id, e.chunk_text, e.embedding, e.page
             FROM embeddings e
             JOIN items i ON i.id = e.item_id
             WHERE e.conversation_id = ?1 AND i.active = 1
             ORDER BY e.item_id, e.id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(rows.iter().map(Self::row_to_embedding).collect())
    }

    async fn fetch_embedding(
        &self,
        embedding_id: Uuid,
    ) -> Result<Option<StoredEmbedding>, ApiError> {
        let row = sqlx::query("SELECT * FROM embeddings WHERE id = ?1")
            .bind(embedding_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(Self::row_to_embedding))
    }

    async fn create_message(
        &self,
        conversation_id: Uuid,
        role: &str,
        content: &str,
        source_embedding_id: Option<Uuid>,
    ) -> Result<StoredMessage, ApiError> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, source_embedding_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(id)
        .bind(conversation_id)
        .bind(role)
        .bind(content)
        .bind(source_embedding_id)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;

        Ok(StoredMessage {
            id,
            conversation_id,
            role: role.to_string(),
            content: content.to_string(),
            source_embedding_id,
            created_at: now,
        })
    }

    async fn fetch_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        let rows = if limit > 0 {
            sqlx::query(
                "SELECT * FROM (
                     SELECT * FROM messages WHERE conversation_id = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2
                 ) ORDER BY created_at ASC, id ASC",
            )
            .bind(conversation_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query(
                "SELECT * FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        };

        Ok(rows.iter().map(Self::row_to_message).collect())
    }

    async fn fetch_message(&self, message_id: Uuid) -> Result<Option<StoredMessage>, ApiError> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?1")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(Self::row_to_message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        let path = std::env::temp_dir().join(format!("docchat-test-{}.db", Uuid::new_v4()));
        SqliteStore::with_path(path).await.unwrap()
    }

    fn make_item(conversation_id: Uuid, active: bool) -> DocumentRecord {
        DocumentRecord {
            id: Uuid::new_v4(),
            conversation_id,
            uri: "s3://bucket/report.pdf".to_string(),
            display_name: "report.pdf".to_string(),
            active,
            last_updated: chrono::Utc::now().to_rfc3339(),
        }
    }

    fn make_embedding(conversation_id: Uuid, item_id: Uuid, text: &str) -> StoredEmbedding {
        StoredEmbedding {
            id: Uuid::new_v4(),
            conversation_id,
            item_id,
            chunk_text: text.to_string(),
            vector: vec![0.5, 0.25, -1.0],
            page: Some(2),
        }
    }

    #[tokio::test]
    async fn conversation_round_trip() {
        let store = test_store().await;

        let created = store
            .create_conversation("user-1", "Quarterly report", "Q3 figures")
            .await
            .unwrap();
        let fetched = store.get_conversation(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Quarterly report");
        assert_eq!(fetched.context, "Q3 figures");

        let updated = store
            .update_conversation(created.id, Some("Renamed"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.context, "Q3 figures");

        assert!(store.delete_conversation(created.id).await.unwrap());
        assert!(store.get_conversation(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_conversations_filters_by_title() {
        let store = test_store().await;

        store.create_conversation("u", "alpha", "").await.unwrap();
        store.create_conversation("u", "beta", "").await.unwrap();

        let all = store.list_conversations(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered = store.list_conversations(Some("beta")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].title, "beta");
    }

    #[tokio::test]
    async fn active_item_filter_excludes_inactive_chunks() {
        let store = test_store().await;
        let conversation = store.create_conversation("u", "docs", "").await.unwrap();

        let active_item = make_item(conversation.id, true);
        let inactive_item = make_item(conversation.id, false);
        store.upsert_item(active_item.clone()).await.unwrap();
        store.upsert_item(inactive_item.clone()).await.unwrap();

        store
            .insert_embedding(make_embedding(conversation.id, active_item.id, "kept"))
            .await
            .unwrap();
        store
            .insert_embedding(make_embedding(conversation.id, inactive_item.id, "dropped"))
            .await
            .unwrap();

        let embeddings = store.fetch_active_embeddings(conversation.id).await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].chunk_text, "kept");
    }

    #[tokio::test]
    async fn embedding_vector_round_trip() {
        let store = test_store().await;
        let conversation = store.create_conversation("u", "docs", "").await.unwrap();
        let item = make_item(conversation.id, true);
        store.upsert_item(item.clone()).await.unwrap();

        let embedding = make_embedding(conversation.id, item.id, "chunk");
        store.insert_embedding(embedding.clone()).await.unwrap();

        let fetched = store.fetch_embedding(embedding.id).await.unwrap().unwrap();
        assert_eq!(fetched.vector, embedding.vector);
        assert_eq!(fetched.page, Some(2));
        assert_eq!(fetched.item_id, item.id);
    }

    #[tokio::test]
    async fn message_history_is_chronological_and_limited() {
        let store = test_store().await;
        let conversation = store.create_conversation("u", "chat", "").await.unwrap();

        for i in 0..4 {
            store
                .create_message(conversation.id, "user", &format!("message {}", i), None)
                .await
                .unwrap();
            // RFC3339 timestamps resolve to sub-second precision; keep inserts apart.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let all = store.fetch_messages(conversation.id, 0).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].content, "message 0");
        assert_eq!(all[3].content, "message 3");

        let latest = store.fetch_messages(conversation.id, 2).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].content, "message 2");
        assert_eq!(latest[1].content, "message 3");
    }

    #[tokio::test]
    async fn item_count_tracks_inserts() {
        let store = test_store().await;
        let conversation = store.create_conversation("u", "docs", "").await.unwrap();
        assert_eq!(store.count_items(conversation.id).await.unwrap(), 0);

        store.upsert_item(make_item(conversation.id, true)).await.unwrap();
        assert_eq!(store.count_items(conversation.id).await.unwrap(), 1);
    }
}
