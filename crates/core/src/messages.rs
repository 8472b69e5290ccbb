//! Message log operations
//!
//! Thin policy layer over the store's append-only message log: shape
//! validation on append, read receipts, and stable cursor paging.

use std::sync::Arc;

use chatdesk_shared::{ConversationId, CoreError, CoreResult, Message, SenderType};

use crate::store::{ConversationStore, NewMessage};

const MAX_CONTENT_LENGTH: usize = 10_000;

pub struct MessageLog {
    store: Arc<dyn ConversationStore>,
}

impl MessageLog {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Append a message. The store assigns the next sequence number and
    /// timestamp atomically with the conversation's activity bump.
    pub async fn append(
        &self,
        conversation_id: ConversationId,
        sender: SenderType,
        content: Option<String>,
        image_url: Option<String>,
    ) -> CoreResult<Message> {
        let content = content.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        if content.is_none() && image_url.is_none() {
            return Err(CoreError::Validation(
                "message requires content or an attachment".to_string(),
            ));
        }
        if let Some(ref content) = content {
            if content.len() > MAX_CONTENT_LENGTH {
                return Err(CoreError::Validation(format!(
                    "message too long (max {MAX_CONTENT_LENGTH} characters)"
                )));
            }
        }

        self.store
            .append_message(NewMessage {
                conversation_id,
                sender,
                content,
                image_url,
            })
            .await
    }

    /// Mark everything not authored by `reader` as read. Idempotent.
    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: SenderType,
    ) -> CoreResult<u64> {
        self.store.mark_read(conversation_id, reader).await
    }

    pub async fn unread_count(
        &self,
        conversation_id: ConversationId,
        reader: SenderType,
    ) -> CoreResult<i64> {
        self.store.unread_count(conversation_id, reader).await
    }

    /// Newest-first page; `before_seq` is an exclusive cursor.
    pub async fn page(
        &self,
        conversation_id: ConversationId,
        before_seq: Option<i64>,
        limit: i64,
    ) -> CoreResult<Vec<Message>> {
        self.store
            .page_messages(conversation_id, before_seq, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::NewConversation;
    use chatdesk_shared::{CompanyId, Platform};

    async fn log_with_conversation() -> (MessageLog, ConversationId) {
        let store = Arc::new(MemoryStore::new());
        let conv = store
            .insert_conversation(NewConversation {
                company_id: CompanyId::new(),
                platform: Platform::Facebook,
                external_user_id: "fb-1".to_string(),
                external_user_name: "Ada".to_string(),
            })
            .await
            .unwrap();
        (MessageLog::new(store), conv.id)
    }

    #[tokio::test]
    async fn test_append_requires_content_or_attachment() {
        let (log, conv) = log_with_conversation().await;

        let err = log.append(conv, SenderType::Agent, None, None).await;
        assert!(matches!(err, Err(CoreError::Validation(_))));

        let err = log
            .append(conv, SenderType::Agent, Some("   ".to_string()), None)
            .await;
        assert!(matches!(err, Err(CoreError::Validation(_))));

        // Attachment-only is valid
        let message = log
            .append(
                conv,
                SenderType::Customer,
                None,
                Some("https://cdn.example/img.png".to_string()),
            )
            .await
            .unwrap();
        assert!(message.content.is_none());
        assert_eq!(message.seq, 1);
    }

    #[tokio::test]
    async fn test_append_trims_content() {
        let (log, conv) = log_with_conversation().await;
        let message = log
            .append(conv, SenderType::Agent, Some("  hello  ".to_string()), None)
            .await
            .unwrap();
        assert_eq!(message.content.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_oversized_content_rejected() {
        let (log, conv) = log_with_conversation().await;
        let err = log
            .append(conv, SenderType::Agent, Some("x".repeat(10_001)), None)
            .await;
        assert!(matches!(err, Err(CoreError::Validation(_))));
    }
}
