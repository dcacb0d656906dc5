//! Terminal input parsing.
//!
//! A line starting with `/` is a command; anything else is a message for
//! the assistant.

use std::path::PathBuf;

pub const HELP: &str = "\
Commands:
  /attach <path>            attach a file to the next message
  /history                  list the conversation with message numbers
  /capture <n> [category]   capture message n into Wisdom
  /export [format] [dir]    export as plain, markdown or rich (pdf)
  /wisdom [category]        list Wisdom categories, or the notes in one
  /archive                  write the conversation to a wisdom log
  /reset                    clear the conversation
  /tts on|off               toggle reading replies aloud
  /record start|stop        toggle dictation recording
  /health                   check the assistant backend
  /help                     show this help
  /quit                     leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Attach(PathBuf),
    History,
    Capture {
        index: usize,
        category: Option<String>,
    },
    Export {
        format: Option<String>,
        dir: Option<PathBuf>,
    },
    Wisdom {
        category: Option<String>,
    },
    Archive,
    Reset,
    Tts(bool),
    Record(bool),
    Health,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("nothing to send")]
    Empty,
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(CommandError::Empty);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    let arg = (!args.is_empty()).then(|| args.to_string());

    match name.to_ascii_lowercase().as_str() {
        "attach" => arg
            .map(|p| Command::Attach(PathBuf::from(p)))
            .ok_or(CommandError::Usage("/attach <path>")),
        "history" | "h" => Ok(Command::History),
        "capture" => {
            let mut parts = args.splitn(2, char::is_whitespace);
            let index = parts
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .ok_or(CommandError::Usage("/capture <n> [category]"))?;
            let category = parts
                .next()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            Ok(Command::Capture { index, category })
        }
        "export" => {
            let mut parts = args.split_whitespace();
            Ok(Command::Export {
                format: parts.next().map(str::to_string),
                dir: parts.next().map(PathBuf::from),
            })
        }
        "wisdom" | "w" => Ok(Command::Wisdom { category: arg }),
        "archive" => Ok(Command::Archive),
        "reset" | "new" => Ok(Command::Reset),
        "tts" => match args {
            "on" => Ok(Command::Tts(true)),
            "off" => Ok(Command::Tts(false)),
            _ => Err(CommandError::Usage("/tts on|off")),
        },
        "record" => match args {
            "start" => Ok(Command::Record(true)),
            "stop" => Ok(Command::Record(false)),
            _ => Err(CommandError::Usage("/record start|stop")),
        },
        "health" => Ok(Command::Health),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}
