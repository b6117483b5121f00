//! Source code for Reaction Board Bot, a Telegram bot that reposts messages with
//! lots of reactions to a separate "board" chat.

use std::{num::NonZeroU32, time::Duration};

/// Various types used throughout.
mod types;

/// The error type of board operations.
mod error;

/// Counting up reactions.
mod reactions;

/// The board state machine and the thing that drives it.
mod board;

/// Sending, editing and deleting board posts via the bot.
mod messenger;

/// The database.
mod database;

/// Functions that handle events from Telegram.
mod handlers;

/// Entry function that starts the bot.
mod entry;
pub use entry::*;

#[cfg(test)]
mod testing;

/// Reaction minimum for chats that never set one.
pub const DEFAULT_REACTION_MINIMUM: NonZeroU32 = match NonZeroU32::new(3) {
    Some(x) => x,
    None => unreachable!(),
};

/// How many days messages are kept around in the cache for reactions to be resolved against.
pub const MESSAGE_RETENTION_DAYS: i64 = 30;

/// How often old cached messages are pruned.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);
