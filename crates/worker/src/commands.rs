//! Chat command recognition.
//!
//! A command is a message starting with `/` or `!`, optionally addressed as
//! `/cmd@botname`. Everything after the first space is the argument text.

use audiobot_core::params::JobKind;

/// Which model listing was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelList {
    Tts,
    Rvc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// Queue a job of `kind` with the parameter text `args`.
    Enqueue { kind: JobKind, args: &'a str },
    ListModels(ModelList),
    Cancel,
    /// Help, remembering which command character the user typed.
    Help { prefix: char },
    Start,
    Unknown(&'a str),
}

/// Recognize a command. Returns `None` for plain text.
pub fn parse(text: &str) -> Option<Command<'_>> {
    let text = text.trim_start();
    let prefix = text.chars().next().filter(|c| matches!(c, '/' | '!'))?;

    let (word, args) = match text.split_once(char::is_whitespace) {
        Some((word, args)) => (word, args.trim()),
        None => (text, ""),
    };
    let name = word[prefix.len_utf8()..]
        .split_once('@')
        .map_or(&word[prefix.len_utf8()..], |(name, _)| name);

    let command = match name {
        "aaitts" => Command::Enqueue {
            kind: JobKind::Tts,
            args,
        },
        "aaitts-models" => Command::ListModels(ModelList::Tts),
        "aaistt" => Command::Enqueue {
            kind: JobKind::Stt,
            args,
        },
        "aaimdx" => Command::Enqueue {
            kind: JobKind::Mdx,
            args,
        },
        "aairvc" => Command::Enqueue {
            kind: JobKind::Rvc,
            args,
        },
        "aairvc-train" => Command::Enqueue {
            kind: JobKind::RvcTrain,
            args,
        },
        "aairvc-models" => Command::ListModels(ModelList::Rvc),
        "aaimusicgen" => Command::Enqueue {
            kind: JobKind::MusicGen,
            args,
        },
        "aaiaudiogen" => Command::Enqueue {
            kind: JobKind::AudioGen,
            args,
        },
        "aaicancel" => Command::Cancel,
        "aaihelp" => Command::Help { prefix },
        "start" => Command::Start,
        other => Command::Unknown(other),
    };
    Some(command)
}

pub const WELCOME_TEXT: &str =
    "🤖 Welcome! This bot processes audio content with locally installed AI tools.";

/// Command overview using `prefix` as the command character.
pub fn help_text(prefix: char) -> String {
    let commands = [
        ("aaitts (-m [model]) [prompt]", "text to speech"),
        ("aaitts-models", "list text to speech models"),
        ("aaistt (-lang [language])", "speech to text"),
        (
            "aaimdx (-f)",
            "music and voice separation (-f enables full output including instrument and bassline tracks)",
        ),
        (
            "aairvc (model) (-m [model]) (-p [pitch]) (-method [method]) (-filter-radius [v]) (-index-rate [v]) (-rms-mix-rate [v])",
            "retrieval based voice conversion",
        ),
        (
            "aairvc-train (model) (-m [model]) (-method [method]) (-batch-size [v]) (-epochs [v]) (-delete)",
            "retrieval based voice conversion training",
        ),
        ("aairvc-models", "list rvc models"),
        (
            "aaimusicgen (-l [sec]) [prompt]",
            "generate music based on given audio file and prompt",
        ),
        ("aaiaudiogen (-l [sec]) [prompt]", "generate audio"),
        ("aaicancel", "cancel current request"),
        ("aaihelp", "show this help"),
    ];

    let mut text = String::from("🤖 Audio AI bot\n\nAvailable commands:\n\n");
    for (usage, description) in commands {
        text.push_str(&format!("{prefix}{usage} - {description}\n"));
    }
    text
}
