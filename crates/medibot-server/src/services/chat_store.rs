use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::chat::{ChatRecord, ChatSummary, MessageKind, StoredMessage};
use crate::utils::error::ApiError;

/// Web chat history in a single JSON file, newest chat first.
///
/// Every operation reads the whole file, mutates, and writes it back
/// (`<file>.tmp` then rename) while holding one async lock.
pub struct ChatStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ChatStore {
    /// Open the store, creating an empty `[]` file when missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ApiError> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::write(&path, b"[]").await?;
            info!("Created chat store at {:?}", path);
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn list(&self) -> Vec<ChatSummary> {
        let _guard = self.lock.lock().await;
        self.read_all().await.iter().map(ChatSummary::from).collect()
    }

    pub async fn create(&self, title: Option<String>) -> Result<ChatRecord, ApiError> {
        let _guard = self.lock.lock().await;
        let mut chats = self.read_all().await;

        let chat = ChatRecord::new(title.filter(|t| !t.trim().is_empty()));
        chats.insert(0, chat.clone());
        self.write_all(&chats).await?;

        debug!("Created chat {}", chat.id);
        Ok(chat)
    }

    pub async fn get(&self, chat_id: &str) -> Result<ChatRecord, ApiError> {
        let _guard = self.lock.lock().await;
        self.read_all()
            .await
            .into_iter()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| not_found(chat_id))
    }

    pub async fn delete(&self, chat_id: &str) -> Result<(), ApiError> {
        let _guard = self.lock.lock().await;
        let mut chats = self.read_all().await;

        let before = chats.len();
        chats.retain(|c| c.id != chat_id);
        if chats.len() == before {
            return Err(not_found(chat_id));
        }

        self.write_all(&chats).await?;
        debug!("Deleted chat {}", chat_id);
        Ok(())
    }

    /// Append one message and return the updated chat.
    pub async fn append(&self, chat_id: &str, message: StoredMessage) -> Result<ChatRecord, ApiError> {
        let _guard = self.lock.lock().await;
        let mut chats = self.read_all().await;

        let chat = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| not_found(chat_id))?;

        match message.kind {
            MessageKind::User => chat.push_user(message),
            MessageKind::Bot => chat.messages.push(message),
        }
        let updated = chat.clone();

        self.write_all(&chats).await?;
        Ok(updated)
    }

    async fn read_all(&self) -> Vec<ChatRecord> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read chat store {:?}: {}", self.path, e);
                return Vec::new();
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(chats) => chats,
            Err(e) => {
                warn!("Chat store {:?} is corrupt, treating as empty: {}", self.path, e);
                Vec::new()
            }
        }
    }

    async fn write_all(&self, chats: &[ChatRecord]) -> Result<(), ApiError> {
        let json = serde_json::to_vec_pretty(chats)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn not_found(chat_id: &str) -> ApiError {
    ApiError::NotFound(format!("Chat {} not found", chat_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, ChatStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatStore::open(dir.path().join("data/chats.json")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_open_creates_empty_file() {
        let (_dir, store) = store().await;
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "[]");
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_newest_chat_first() {
        let (_dir, store) = store().await;
        let first = store.create(None).await.unwrap();
        let second = store.create(Some("Rash".to_string())).await.unwrap();

        let list = store.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, second.id);
        assert_eq!(list[0].title, "Rash");
        assert_eq!(list[1].id, first.id);
        assert_eq!(list[1].title, "New chat");
    }

    #[tokio::test]
    async fn test_append_titles_chat_and_persists() {
        let (_dir, store) = store().await;
        let chat = store.create(None).await.unwrap();

        store
            .append(&chat.id, StoredMessage::new(MessageKind::User, "I have had a fever for three days now", None))
            .await
            .unwrap();
        let updated = store
            .append(&chat.id, StoredMessage::new(MessageKind::Bot, "Drink fluids.", None))
            .await
            .unwrap();

        assert_eq!(updated.messages.len(), 2);
        assert_eq!(updated.title, "I have had a fever for three days n...");

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw[0]["messages"][0]["type"], "user");
        assert_eq!(raw[0]["messages"][1]["type"], "bot");
        assert!(raw[0]["messages"][1]["image_url"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_chat_is_not_found() {
        let (_dir, store) = store().await;

        assert!(matches!(store.get("nope").await, Err(ApiError::NotFound(_))));
        assert!(matches!(store.delete("nope").await, Err(ApiError::NotFound(_))));
        let msg = StoredMessage::new(MessageKind::User, "hi", None);
        assert!(matches!(store.append("nope", msg).await, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_chat() {
        let (_dir, store) = store().await;
        let chat = store.create(None).await.unwrap();

        store.delete(&chat.id).await.unwrap();
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_empty() {
        let (_dir, store) = store().await;
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(store.list().await.is_empty());
        // the next write replaces the corrupt content
        store.create(None).await.unwrap();
        assert_eq!(store.list().await.len(), 1);
    }
}
