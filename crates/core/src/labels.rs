//! Label management
//!
//! Mutable set of named tags on a conversation. Names are unique per
//! conversation case-insensitively; the store enforces the uniqueness,
//! this layer enforces shape.

use std::sync::Arc;

use chatdesk_shared::{ConversationId, CoreError, CoreResult, Label, LabelId};

use crate::store::ConversationStore;

const MAX_NAME_LENGTH: usize = 50;
const MAX_SOURCE_LENGTH: usize = 100;

pub struct LabelManager {
    store: Arc<dyn ConversationStore>,
}

impl LabelManager {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    pub async fn add(
        &self,
        conversation_id: ConversationId,
        name: &str,
        source: Option<&str>,
    ) -> CoreResult<Label> {
        let name = name.trim();
        validate_name(name)?;
        if let Some(source) = source {
            validate_source(source)?;
        }

        // Existence pre-check keeps a missing conversation a NotFound
        // instead of a storage-level foreign key failure.
        self.store.load_conversation(conversation_id).await?;

        let label = self.store.insert_label(conversation_id, name, source).await?;
        tracing::debug!(
            conversation_id = %conversation_id,
            label_id = %label.id,
            name = %label.name,
            "Label added"
        );
        Ok(label)
    }

    pub async fn update(
        &self,
        conversation_id: ConversationId,
        label_id: LabelId,
        name: Option<&str>,
        source: Option<&str>,
    ) -> CoreResult<Label> {
        let name = name.map(str::trim);
        if let Some(name) = name {
            validate_name(name)?;
        }
        if let Some(source) = source {
            validate_source(source)?;
        }

        self.store
            .update_label(conversation_id, label_id, name, source)
            .await
    }

    pub async fn remove(
        &self,
        conversation_id: ConversationId,
        label_id: LabelId,
    ) -> CoreResult<()> {
        self.store.delete_label(conversation_id, label_id).await?;
        tracing::debug!(
            conversation_id = %conversation_id,
            label_id = %label_id,
            "Label removed"
        );
        Ok(())
    }

    pub async fn list(&self, conversation_id: ConversationId) -> CoreResult<Vec<Label>> {
        self.store.labels(conversation_id).await
    }
}

fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::Validation("label name cannot be empty".to_string()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "label name too long (max {MAX_NAME_LENGTH} characters)"
        )));
    }
    Ok(())
}

fn validate_source(source: &str) -> CoreResult<()> {
    if source.len() > MAX_SOURCE_LENGTH {
        return Err(CoreError::Validation(format!(
            "label source too long (max {MAX_SOURCE_LENGTH} characters)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::NewConversation;
    use chatdesk_shared::{CompanyId, Platform};

    async fn manager_with_conversation() -> (LabelManager, ConversationId) {
        let store = Arc::new(MemoryStore::new());
        let conv = store
            .insert_conversation(NewConversation {
                company_id: CompanyId::new(),
                platform: Platform::Other,
                external_user_id: "u-1".to_string(),
                external_user_name: "Ada".to_string(),
            })
            .await
            .unwrap();
        (LabelManager::new(store), conv.id)
    }

    #[tokio::test]
    async fn test_rejects_oversized_and_empty_names() {
        let (manager, conv) = manager_with_conversation().await;

        let err = manager.add(conv, "  ", None).await;
        assert!(matches!(err, Err(CoreError::Validation(_))));

        let err = manager.add(conv, &"x".repeat(51), None).await;
        assert!(matches!(err, Err(CoreError::Validation(_))));

        let err = manager.add(conv, "ok", Some(&"s".repeat(101))).await;
        assert!(matches!(err, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_add_trims_and_detects_duplicates() {
        let (manager, conv) = manager_with_conversation().await;

        let label = manager.add(conv, "  Billing  ", None).await.unwrap();
        assert_eq!(label.name, "Billing");

        let dup = manager.add(conv, "billing", Some("import")).await;
        assert!(matches!(dup, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_validates_and_checks_ownership() {
        let (manager, conv) = manager_with_conversation().await;
        let label = manager.add(conv, "vip", None).await.unwrap();

        let err = manager
            .update(conv, label.id, Some(&"y".repeat(51)), None)
            .await;
        assert!(matches!(err, Err(CoreError::Validation(_))));

        let updated = manager
            .update(conv, label.id, Some("VIP Gold"), Some("manual"))
            .await
            .unwrap();
        assert_eq!(updated.name, "VIP Gold");
        assert_eq!(updated.source.as_deref(), Some("manual"));

        let err = manager.update(ConversationId::new(), label.id, None, None).await;
        assert!(matches!(err, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_add_to_unknown_conversation_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let manager = LabelManager::new(store);
        let err = manager.add(ConversationId::new(), "vip", None).await;
        assert!(matches!(err, Err(CoreError::NotFound("conversation"))));
    }
}
