//! Line-oriented console transport.
//!
//! Every stdin line is a message from a single private-chat user. Status
//! messages are printed with their id, edits are marked as such, and
//! artifacts are streamed into the output directory. `/file <path>` hands
//! the contents of a local file to a job waiting for input.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use audiobot_core::job::InputMedia;
use audiobot_core::params::{parse_request, JobKind, ParamDefaults};
use audiobot_core::status::error_status;
use audiobot_core::types::{ChatId, MessageId, MessageRef, Origin, UserId};
use audiobot_pipeline::ToolExecutor;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::commands::{self, help_text, Command, ModelList, WELCOME_TEXT};
use crate::queue::JobQueue;
use crate::sink::{ArtifactSink, DeliveryFile, SinkError, StatusSink};

/// The console is a private chat with one user.
pub const CONSOLE_CHAT_ID: ChatId = 1;
pub const CONSOLE_USER_ID: UserId = 1;

const FILE_COMMAND: &str = "/file";

/// Prints statuses and writes artifacts to disk.
#[derive(Debug)]
pub struct ConsoleTransport {
    output_dir: PathBuf,
    next_message: AtomicI64,
}

impl ConsoleTransport {
    /// Create the transport, making sure `output_dir` exists.
    pub async fn new(output_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let output_dir = output_dir.into();
        tokio::fs::create_dir_all(&output_dir).await?;
        Ok(Self {
            output_dir,
            next_message: AtomicI64::new(1),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Allocate the id of a new message in the console chat.
    pub fn next_message_id(&self) -> MessageId {
        self.next_message.fetch_add(1, Ordering::Relaxed)
    }

    /// Print a direct reply to a user message.
    pub fn reply(&self, text: &str) {
        println!("{} {text}", timestamp());
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

#[async_trait]
impl StatusSink for ConsoleTransport {
    async fn send_or_edit(
        &self,
        reply_to: MessageRef,
        existing: Option<MessageRef>,
        text: &str,
    ) -> Result<MessageRef, SinkError> {
        let message = match existing {
            Some(message) => {
                println!("{} [edit #{}] {text}", timestamp(), message.message_id);
                message
            }
            None => {
                let message = MessageRef {
                    chat_id: reply_to.chat_id,
                    message_id: self.next_message_id(),
                };
                println!("{} [#{}] {text}", timestamp(), message.message_id);
                message
            }
        };
        Ok(message)
    }
}

#[async_trait]
impl ArtifactSink for ConsoleTransport {
    async fn deliver(
        &self,
        reply_to: MessageRef,
        files: &mut [DeliveryFile<'_>],
    ) -> Result<(), SinkError> {
        for file in files.iter_mut() {
            let path = self.output_dir.join(file.filename);
            let partial = self.output_dir.join(format!("{}.part", file.filename));
            let mut out = tokio::fs::File::create(&partial).await?;
            let bytes = tokio::io::copy(&mut file.reader, &mut out).await?;
            out.flush().await?;
            tokio::fs::rename(&partial, &path).await?;
            tracing::info!(
                path = %path.display(),
                bytes,
                mime_type = file.format.mime_type(),
                reply_to = reply_to.message_id,
                "Saved artifact"
            );
            println!("{} 💾 {}", timestamp(), path.display());
        }
        Ok(())
    }
}

/// Reads commands from stdin and feeds them to the queue.
pub struct ConsoleSession {
    queue: JobQueue<ToolExecutor>,
    transport: Arc<ConsoleTransport>,
    defaults: ParamDefaults,
    shutdown: CancellationToken,
}

impl ConsoleSession {
    pub fn new(
        queue: JobQueue<ToolExecutor>,
        transport: Arc<ConsoleTransport>,
        defaults: ParamDefaults,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            transport,
            defaults,
            shutdown,
        }
    }

    /// Process stdin until end of input or shutdown.
    pub async fn run(&self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                tracing::info!("End of input");
                break;
            };
            if let Some(reply) = self.handle_line(&line).await {
                self.transport.reply(&reply);
            }
        }
        Ok(())
    }

    /// Handle one line of input and return the immediate reply, if any.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let origin = Origin::new(
            CONSOLE_CHAT_ID,
            CONSOLE_USER_ID,
            self.transport.next_message_id(),
        );

        if let Some(path) = line
            .strip_prefix(FILE_COMMAND)
            .filter(|rest| rest.starts_with(char::is_whitespace))
        {
            return self.supply_file(origin, path.trim()).await;
        }

        match commands::parse(line) {
            None => self.enqueue(origin, JobKind::Tts, line),
            Some(Command::Enqueue { kind, args }) => self.enqueue(origin, kind, args),
            Some(Command::ListModels(list)) => Some(self.list_models(list).await),
            Some(Command::Cancel) => match self.queue.cancel_active() {
                Ok(_) => None,
                Err(e) => Some(error_status(&e)),
            },
            Some(Command::Help { prefix }) => Some(help_text(prefix)),
            Some(Command::Start) => Some(WELCOME_TEXT.to_string()),
            Some(Command::Unknown(name)) => {
                tracing::debug!(command = name, "Unknown command");
                Some(error_status(&"invalid command"))
            }
        }
    }

    fn enqueue(&self, origin: Origin, kind: JobKind, args: &str) -> Option<String> {
        if !self.queue.executor().supports(kind) {
            return Some(error_status(&format!("{kind} is not configured")));
        }
        match parse_request(kind, args, &self.defaults) {
            Ok(request) => {
                self.queue.enqueue(origin, request.prompt, request.params);
                None
            }
            Err(e) => Some(error_status(&e)),
        }
    }

    async fn supply_file(&self, origin: Origin, path: &str) -> Option<String> {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) => return Some(error_status(&format!("can't read {path}: {e}"))),
        };
        let filename = Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let media = InputMedia {
            data,
            filename,
            message: Some(origin.message()),
        };

        if self.queue.supply_input(origin.user_id, media) {
            None
        } else {
            Some(error_status(&"no job is waiting for input"))
        }
    }

    async fn list_models(&self, list: ModelList) -> String {
        let executor = self.queue.executor();
        let result = match list {
            ModelList::Tts => executor.list_tts_models(&self.shutdown.child_token()).await,
            ModelList::Rvc => executor.list_rvc_models().await.map(|models| {
                if models.is_empty() {
                    "No models found.".to_string()
                } else {
                    format!("Available models:\n{}", models.join("\n"))
                }
            }),
        };
        result.unwrap_or_else(|e| error_status(&e))
    }
}
