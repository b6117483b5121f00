use teloxide::{types::ChatId, RequestError};

use crate::types::MessageRef;

/// Everything that can go wrong while keeping the board in order.
#[derive(Debug)]
pub enum BoardError {
    /// Command arguments are missing or malformed. Contains a description for the user.
    InvalidArgument(String),
    /// The command was sent outside of a group chat.
    UnresolvedGuild,
    /// The forward channel is either not configured ([`None`]) or can't be reached.
    UnresolvedChannel(Option<ChatId>),
    /// The original message is gone or was never seen by the bot.
    UnresolvedMessage(MessageRef),
    /// The database said no.
    Persistence(sqlx::Error),
    /// Telegram said no.
    ExternalCall(RequestError),
}

impl BoardError {
    /// Whether this is just the chat not having set the board up yet,
    /// as opposed to something actually broken.
    pub fn is_unconfigured(&self) -> bool {
        matches!(self, Self::UnresolvedChannel(None))
    }
}

impl std::fmt::Display for BoardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(e) => write!(f, "Invalid args: {}", e),
            Self::UnresolvedGuild => write!(f, "This only works in a group chat."),
            Self::UnresolvedChannel(None) => write!(f, "No board chat is set up."),
            Self::UnresolvedChannel(Some(chat)) => {
                write!(f, "Could not access the board chat {}.", chat.0)
            }
            Self::UnresolvedMessage(message) => {
                write!(f, "Could not find the original message {}.", message)
            }
            Self::Persistence(e) => write!(f, "Database error: {}", e),
            Self::ExternalCall(e) => write!(f, "Telegram request failed: {}", e),
        }
    }
}

impl std::error::Error for BoardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Persistence(e) => Some(e),
            Self::ExternalCall(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for BoardError {
    fn from(value: sqlx::Error) -> Self {
        Self::Persistence(value)
    }
}

impl From<RequestError> for BoardError {
    fn from(value: RequestError) -> Self {
        Self::ExternalCall(value)
    }
}
