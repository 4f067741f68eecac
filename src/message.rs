//! Message protocol definitions
//!
//! Inbound lines are tokenized once into a [`Command`]; outbound traffic is a
//! [`ServerMessage`] whose `Display` form is the exact text sent on the wire.

use std::fmt;

use crate::codec::{encoded_len, MAX_FRAME_LEN};
use crate::error::AppError;

/// Usage lines reported for malformed arguments
pub const DM_USAGE: &str = "DM <recipient> <message>";
pub const SEND_USAGE: &str = "SEND <room_name> <message>";
pub const JOIN_USAGE: &str = "JOIN <room_name>";
pub const LEAVE_USAGE: &str = "LEAVE <room_name>";

/// Reply to any unrecognized command
pub const HELP_TEXT: &str = "Available commands:\n\
INCREMENT\n\
GET\n\
LIST\n\
DM <recipient> <message>\n\
CREATE <room_name>\n\
JOIN <room_name>\n\
LEAVE <room_name>\n\
SEND <room_name> <message>\n\
OVER";

/// Client → Server command
///
/// Produced by [`Command::parse`] for every line after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// End the session
    Over,
    /// Increment the shared counter
    Increment,
    /// Read the shared counter
    Get,
    /// List connected clients
    List,
    /// Direct message to one client
    DirectMessage { recipient: String, content: String },
    /// Create a room and join it (name may be blank; rejected later)
    CreateRoom { room: String },
    /// Join an existing room
    JoinRoom { room: String },
    /// Leave a room
    LeaveRoom { room: String },
    /// Broadcast to a room
    SendToRoom { room: String, content: String },
    /// Anything else
    Unknown,
}

impl Command {
    /// Tokenize one inbound line
    ///
    /// The command token is case-insensitive. Malformed arguments yield
    /// `AppError::InvalidFormat` carrying the usage line.
    pub fn parse(line: &str) -> Result<Command, AppError> {
        let line = line.trim();
        let (token, rest) = match line.split_once(char::is_whitespace) {
            Some((token, rest)) => (token, rest.trim()),
            None => (line, ""),
        };

        let command = match token.to_ascii_uppercase().as_str() {
            "OVER" if rest.is_empty() => Command::Over,
            "INCREMENT" if rest.is_empty() => Command::Increment,
            "GET" if rest.is_empty() => Command::Get,
            "LIST" if rest.is_empty() => Command::List,
            "DM" => {
                let (recipient, content) = split_target(rest).ok_or(AppError::InvalidFormat(DM_USAGE))?;
                Command::DirectMessage { recipient, content }
            }
            "CREATE" => Command::CreateRoom {
                room: rest.to_string(),
            },
            "JOIN" => Command::JoinRoom {
                room: required(rest, JOIN_USAGE)?,
            },
            "LEAVE" => Command::LeaveRoom {
                room: required(rest, LEAVE_USAGE)?,
            },
            "SEND" => {
                let (room, content) = split_target(rest).ok_or(AppError::InvalidFormat(SEND_USAGE))?;
                Command::SendToRoom { room, content }
            }
            _ => Command::Unknown,
        };

        Ok(command)
    }
}

/// Split `<target> <message>`; both parts must be non-empty
fn split_target(rest: &str) -> Option<(String, String)> {
    let (target, content) = rest.split_once(char::is_whitespace)?;
    let content = content.trim();
    if target.is_empty() || content.is_empty() {
        return None;
    }
    Some((target.to_string(), content.to_string()))
}

fn required(rest: &str, usage: &'static str) -> Result<String, AppError> {
    if rest.is_empty() {
        Err(AppError::InvalidFormat(usage))
    } else {
        Ok(rest.to_string())
    }
}

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Registration finished, unique name assigned
    Registered { name: String },
    /// Someone incremented the counter (sent to everyone)
    CounterIncremented { by: String, value: i64 },
    /// Current counter value
    CounterValue { value: i64 },
    /// Snapshot of connected clients
    ClientList { names: Vec<String> },
    /// Direct message from another client
    Direct { from: String, content: String },
    /// Room created, creator joined
    RoomCreated { room: String },
    /// Room joined
    RoomJoined { room: String },
    /// Room left
    RoomLeft { room: String },
    /// Message broadcast within a room
    Room {
        room: String,
        from: String,
        content: String,
    },
    /// Command list
    Help,
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    /// Whether the wire text fits in a single frame
    pub fn fits_frame(&self) -> bool {
        encoded_len(&self.to_string()) <= MAX_FRAME_LEN
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Registered { name } => write!(f, "Your unique name: {}", name),
            ServerMessage::CounterIncremented { by, value } => {
                write!(f, "{} incremented counter to {}", by, value)
            }
            ServerMessage::CounterValue { value } => write!(f, "Counter Value: {}", value),
            ServerMessage::ClientList { names } => {
                write!(f, "Connected Clients:")?;
                for name in names {
                    write!(f, "\n - {}", name)?;
                }
                Ok(())
            }
            ServerMessage::Direct { from, content } => write!(f, "{}: {}", from, content),
            ServerMessage::RoomCreated { room } => write!(
                f,
                "Room '{}' created successfully. You are now in this room.",
                room
            ),
            ServerMessage::RoomJoined { room } => write!(f, "Joined room: {}", room),
            ServerMessage::RoomLeft { room } => write!(f, "Left room: {}", room),
            ServerMessage::Room {
                room,
                from,
                content,
            } => write!(f, "[Room: {}] {}: {}", room, from, content),
            ServerMessage::Help => f.write_str(HELP_TEXT),
            ServerMessage::Error { message, .. } => f.write_str(message),
        }
    }
}

/// Error codes for ServerMessage::Error
///
/// Not sent on the wire; lets callers tell error replies apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Non-existent room
    RoomNotFound,
    /// Not a member of the room
    NotInRoom,
    /// Non-existent DM recipient
    RecipientNotFound,
    /// Malformed command arguments
    InvalidFormat,
    /// Blank room name on CREATE
    EmptyRoomName,
    /// Text too long for one frame
    MessageTooLong,
    /// Anything fatal that still reached a client
    Internal,
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::RoomNotFound(room) => {
                (ErrorCode::RoomNotFound, format!("Room '{}' does not exist.", room))
            }
            AppError::NotInRoom(room) => {
                (ErrorCode::NotInRoom, format!("You are not in room '{}'.", room))
            }
            AppError::RecipientNotFound(name) => (
                ErrorCode::RecipientNotFound,
                format!("No client with name {} found.", name),
            ),
            AppError::InvalidFormat(usage) => (
                ErrorCode::InvalidFormat,
                format!("Invalid message format. Use: {}", usage),
            ),
            AppError::EmptyRoomName => {
                (ErrorCode::EmptyRoomName, "Room name cannot be empty.".to_string())
            }
            AppError::MessageTooLong => {
                (ErrorCode::MessageTooLong, "Message too long.".to_string())
            }
            // Fatal errors are not typically converted (connection closes)
            _ => (ErrorCode::Internal, "Internal error".to_string()),
        };
        ServerMessage::Error { code, message }
    }
}
