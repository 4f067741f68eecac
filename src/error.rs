//! Error types for the chat server
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// business errors (reported to the issuing client as a text line).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Outbound text does not fit in one frame (fatal for the writer)
    #[error("Frame too long: {0} bytes")]
    FrameTooLong(usize),

    /// Inbound frame is not valid modified UTF-8 (fatal)
    #[error("Malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Room not found with the given name
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Client is not a member of the room
    #[error("Not in room: {0}")]
    NotInRoom(String),

    /// No connected client with the given name
    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    /// Malformed command arguments; carries the usage line
    #[error("Invalid format, expected: {0}")]
    InvalidFormat(&'static str),

    /// CREATE with a blank room name
    #[error("Empty room name")]
    EmptyRoomName,

    /// Reply or relayed message would not fit in one frame
    #[error("Message too long")]
    MessageTooLong,
}

/// Message send errors
///
/// Occurs when queueing a message for a client that is gone or stalled.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The receiver's queue is full; it is not draining fast enough
    #[error("Receiver lagging")]
    Lagging,
}
