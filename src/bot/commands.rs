use crate::error::{MusicError, Result};

/// Music commands understood by the bot, with the aliases users are used to.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play(String),
    Skip(i64),
    SkipTo(String),
    Remove(String),
    Shuffle,
    Toggle,
    Volume(f64),
    Queue,
    History,
    Stop,
}

impl Command {
    /// Parses a chat message. `Ok(None)` means the message is not a music
    /// command at all.
    pub fn parse(prefix: &str, content: &str) -> Result<Option<Self>> {
        let Some(body) = content.trim().strip_prefix(prefix) else {
            return Ok(None);
        };

        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "play" | "add" | "p" | "+" => Self::Play(required(args, "a URL or search terms")?),
            "skip" | "next" | "|" => Self::Skip(match args {
                "" => 1,
                count => count.parse().map_err(|_| {
                    MusicError::InvalidArgument(format!("\"{}\" is not a number of songs", count))
                })?,
            }),
            "skipto" | "search" | "?" | "goto" => Self::SkipTo(required(args, "a song name")?),
            "remove" | "delete" | "rm" => Self::Remove(required(args, "a song name")?),
            "shuffle" => Self::Shuffle,
            "toggle" | "pause" | "resume" => Self::Toggle,
            "volume" | "vol" | "v" => Self::Volume(
                required(args, "a volume between 0 and 200")?
                    .trim_end_matches('%')
                    .parse()
                    .map_err(|_| {
                        MusicError::InvalidArgument(format!("\"{}\" is not a volume", args))
                    })?,
            ),
            "queue" | "songs" | "q" => Self::Queue,
            "history" | "h" => Self::History,
            "stop" | "leave" | "die" | "begone" | "farethewell" => Self::Stop,
            _ => return Ok(None),
        };

        Ok(Some(command))
    }
}

fn required(args: &str, what: &str) -> Result<String> {
    if args.is_empty() {
        return Err(MusicError::InvalidArgument(format!("this command needs {}", what)));
    }
    Ok(args.to_string())
}
