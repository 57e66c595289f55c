use shared::domain::{MessageId, RoomKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("failed to fetch {what}: {source}")]
    TransientFetch {
        what: &'static str,
        source: anyhow::Error,
    },
    #[error("failed to send message: {0}")]
    SendFailed(anyhow::Error),
    #[error("message body is empty")]
    EmptyMessage,
    #[error("delete rejected for message {message_id}: {source}")]
    DeleteRejected {
        message_id: MessageId,
        source: anyhow::Error,
    },
    #[error("not allowed to delete message {0}")]
    DeleteNotAuthorized(MessageId),
    #[error("message has not been persisted yet")]
    NotPersisted,
    #[error("message {0} is not in this room")]
    MessageNotFound(MessageId),
    #[error("failed to join room {room}: {source}")]
    ChannelJoin {
        room: RoomKey,
        source: anyhow::Error,
    },
    #[error("room {0} is closed")]
    RoomClosed(RoomKey),
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;
