//! Parsing of lines typed at the prompt.
//!
//! Lines starting with `/` are commands; anything else is chat text for the
//! current room.

use crate::error::CommandError;

pub const HELP: &str = "\
/join <room>              join a room and make it current
/leave <room>             leave a room
/room <room>              switch the current room
/rooms                    list joined rooms
/history <room> [since]   fetch messages after a sequence number
/members <room>           list connections in a room
/presence <room>          show who is online in a room
/quit                     exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join(String),
    Leave(String),
    Switch(String),
    Rooms,
    History { room: String, since: u64 },
    Members(String),
    Presence(String),
    Help,
    Quit,
    Say(String),
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let room = words.next().map(str::to_string);

    match name {
        "join" => room.map(Command::Join).ok_or(CommandError::Usage("/join <room>")),
        "leave" => room
            .map(Command::Leave)
            .ok_or(CommandError::Usage("/leave <room>")),
        "room" => room
            .map(Command::Switch)
            .ok_or(CommandError::Usage("/room <room>")),
        "rooms" => Ok(Command::Rooms),
        "history" => {
            let room = room.ok_or(CommandError::Usage("/history <room> [since]"))?;
            let since = match words.next() {
                Some(word) => word
                    .parse::<u64>()
                    .map_err(|_| CommandError::InvalidSequence(word.to_string()))?,
                None => 0,
            };
            Ok(Command::History { room, since })
        }
        "members" => room
            .map(Command::Members)
            .ok_or(CommandError::Usage("/members <room>")),
        "presence" => room
            .map(Command::Presence)
            .ok_or(CommandError::Usage("/presence <room>")),
        "help" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::UnknownCommand(other.to_string())),
    }
}
