use std::{fmt::Display, num::NonZeroU32};

use teloxide::types::{ChatId, MessageId};

use crate::DEFAULT_REACTION_MINIMUM;

/// A message somewhere in Telegram.
///
/// Telegram message IDs are only unique within one chat, so
/// both halves are needed to point at a specific message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat: ChatId,
    pub id: MessageId,
}

impl MessageRef {
    pub fn new(chat: ChatId, id: MessageId) -> Self {
        Self { chat, id }
    }
}

impl Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.chat.0, self.id.0)
    }
}

/// Per-chat board settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuildSettings {
    /// Total reactions a message needs to land on the board.
    pub reaction_minimum: NonZeroU32,
    /// Chat to repost highly-reacted messages to. [`None`] until configured.
    pub forward_channel: Option<ChatId>,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            reaction_minimum: DEFAULT_REACTION_MINIMUM,
            forward_channel: None,
        }
    }
}

impl Display for GuildSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "<b>Reaction minimum</b>: {}", self.reaction_minimum)?;
        match self.forward_channel {
            Some(channel) => writeln!(f, "<b>Board chat</b>: <code>{}</code>", channel.0),
            None => writeln!(f, "<b>Board chat</b>: not set"),
        }
    }
}

/// Partial update of [`GuildSettings`]. Fields that are [`None`] are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuildSettingsUpdate {
    pub reaction_minimum: Option<NonZeroU32>,
    pub forward_channel: Option<ChatId>,
}

/// Everything needed to render a post on the board.
///
/// Built from the original message and the current total, so creating and editing
/// a post from the same inputs always yields the same content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardPost {
    pub author_name: String,
    pub text: String,
    pub total_reactions: u64,
    pub permalink: Option<url::Url>,
    /// Telegram file ID of the first attached image, if any.
    pub image: Option<String>,
}

/// The message a reaction change happened on, flattened to what the board cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalMessage {
    /// The message itself. Its chat is the guild whose settings apply.
    pub id: MessageRef,
    pub author_is_bot: bool,
    pub author_name: String,
    pub text: String,
    pub image: Option<String>,
    pub permalink: Option<url::Url>,
}

impl OriginalMessage {
    pub fn guild(&self) -> ChatId {
        self.id.chat
    }

    /// Content of the board post for this message at the given reaction total.
    pub fn to_post(&self, total_reactions: u64) -> BoardPost {
        BoardPost {
            author_name: self.author_name.clone(),
            text: self.text.clone(),
            total_reactions,
            permalink: self.permalink.clone(),
            image: self.image.clone(),
        }
    }
}
