use std::fmt;

/// Conversation identifier as used by the messaging transport.
pub type ChatId = i64;

/// User identifier as used by the messaging transport.
pub type UserId = i64;

/// Message identifier, unique within a chat.
pub type MessageId = i64;

/// Random identifier assigned to every queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

impl TaskId {
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of conversation a request came from.
///
/// Group conversations get a longer progress update interval than private ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
}

impl ChatKind {
    /// Positive chat ids are private conversations, everything else is a group.
    pub fn from_chat_id(chat_id: ChatId) -> Self {
        if chat_id > 0 {
            Self::Private
        } else {
            Self::Group
        }
    }
}

/// A message that status updates can reply to or edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Where a request came from: the conversation, the sender and the message
/// that status replies attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub message_id: MessageId,
    pub chat_kind: ChatKind,
}

impl Origin {
    pub fn new(chat_id: ChatId, user_id: UserId, message_id: MessageId) -> Self {
        Self {
            chat_id,
            user_id,
            message_id,
            chat_kind: ChatKind::from_chat_id(chat_id),
        }
    }

    pub fn message(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}
