//! Queue position notices.
//!
//! Position updates are produced while the queue lock is held, so they are
//! sent over an unbounded channel and applied in order by a single task.
//! When a job starts, the processor claims the message that showed its
//! position and keeps editing it.

use std::collections::HashMap;
use std::sync::Arc;

use audiobot_core::status::queue_position;
use audiobot_core::types::{MessageRef, TaskId};
use tokio::sync::{mpsc, oneshot};

use crate::sink::StatusSink;
use crate::status::StatusMessage;

#[derive(Debug)]
pub(crate) enum Announcement {
    /// `position` jobs are ahead of `task_id`.
    Position {
        task_id: TaskId,
        reply_to: MessageRef,
        position: usize,
    },
    /// Hand over the position message of a job that is starting.
    Claim {
        task_id: TaskId,
        reply: oneshot::Sender<Option<MessageRef>>,
    },
}

pub(crate) type Announcer = mpsc::UnboundedSender<Announcement>;

/// Spawn the announcer task. It stops once every sender is dropped.
pub(crate) fn spawn(sink: Arc<dyn StatusSink>) -> Announcer {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut messages: HashMap<TaskId, StatusMessage> = HashMap::new();

        while let Some(announcement) = rx.recv().await {
            match announcement {
                Announcement::Position {
                    task_id,
                    reply_to,
                    position,
                } => {
                    tracing::debug!(task_id = %task_id, position, "Announcing queue position");
                    let status = messages
                        .entry(task_id)
                        .or_insert_with(|| StatusMessage::new(sink.clone(), reply_to, None, ""));
                    status.set(&queue_position(position)).await;
                }
                Announcement::Claim { task_id, reply } => {
                    let message = messages.remove(&task_id).and_then(|s| s.message());
                    let _ = reply.send(message);
                }
            }
        }
    });

    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;

    #[tokio::test]
    async fn positions_edit_one_message_per_task() {
        let sink = Arc::new(RecordingSink::default());
        let announcer = spawn(sink.clone());
        let reply_to = MessageRef {
            chat_id: 3,
            message_id: 30,
        };
        let task_id = TaskId(9);

        for position in [2, 1] {
            announcer
                .send(Announcement::Position {
                    task_id,
                    reply_to,
                    position,
                })
                .unwrap();
        }
        let (reply, claimed) = oneshot::channel();
        announcer.send(Announcement::Claim { task_id, reply }).unwrap();
        let claimed = claimed.await.unwrap();

        let calls = sink.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].existing, None);
        assert_eq!(calls[1].existing, claimed);
        assert_eq!(calls[1].text, queue_position(1));
    }

    #[tokio::test]
    async fn claim_without_announcement_is_empty() {
        let announcer = spawn(Arc::new(RecordingSink::default()));
        let (reply, claimed) = oneshot::channel();
        announcer
            .send(Announcement::Claim {
                task_id: TaskId(1),
                reply,
            })
            .unwrap();
        assert_eq!(claimed.await.unwrap(), None);
    }
}
