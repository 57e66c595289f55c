use std::sync::Arc;

use shared::domain::{MemberId, MessageId, Role};
use tracing::{info, warn};

use crate::{
    error::{ChatError, ChatResult},
    timeline::{ChatMessage, Timeline},
    ChatBackend,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: MemberId,
    pub role: Role,
}

/// UI-level check only; the server makes the final decision.
pub fn can_delete(user: &CurrentUser, message: &ChatMessage) -> bool {
    user.id == message.author_id || user.role.can_moderate()
}

/// An authorized deletion waiting for the user's confirmation. Dropping it
/// cancels the deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending deletion does nothing until confirmed"]
pub struct PendingDeletion {
    message_id: MessageId,
}

impl PendingDeletion {
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }
}

/// A deletion the server accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedDeletion {
    message_id: MessageId,
}

impl ConfirmedDeletion {
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Removes the message unless a live deletion event already did. Returns
    /// true when this call removed it.
    pub fn apply(&self, timeline: &mut Timeline) -> bool {
        timeline.remove_persisted(&self.message_id).is_some()
    }
}

#[derive(Clone)]
pub struct DeletionController {
    backend: Arc<dyn ChatBackend>,
    user: CurrentUser,
}

impl DeletionController {
    pub fn new(backend: Arc<dyn ChatBackend>, user: CurrentUser) -> Self {
        Self { backend, user }
    }

    pub fn user(&self) -> &CurrentUser {
        &self.user
    }

    pub fn can_delete(&self, message: &ChatMessage) -> bool {
        can_delete(&self.user, message)
    }

    /// First step of a deletion: authorize and hand back a token to confirm.
    pub fn request(&self, message: &ChatMessage) -> ChatResult<PendingDeletion> {
        let message_id = message.persisted_id.clone().ok_or(ChatError::NotPersisted)?;
        if !self.can_delete(message) {
            return Err(ChatError::DeleteNotAuthorized(message_id));
        }
        Ok(PendingDeletion { message_id })
    }

    /// Issues the delete request. A rejection leaves local state untouched.
    pub async fn confirm(&self, pending: PendingDeletion) -> ChatResult<ConfirmedDeletion> {
        let PendingDeletion { message_id } = pending;
        if let Err(source) = self.backend.delete_message(&message_id).await {
            warn!(
                message_id = %message_id,
                member_id = %self.user.id,
                "delete: request rejected: {source}"
            );
            return Err(ChatError::DeleteRejected { message_id, source });
        }
        info!(message_id = %message_id, "delete: message deleted");
        Ok(ConfirmedDeletion { message_id })
    }
}

#[cfg(test)]
#[path = "tests/deletion_tests.rs"]
mod tests;
