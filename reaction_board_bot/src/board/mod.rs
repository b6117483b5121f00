mod controller;
mod state;

pub use controller::*;
pub use state::*;

use std::future::Future;

use teloxide::types::{ChatId, MessageId};

use crate::{
    error::BoardError,
    types::{BoardPost, GuildSettings, GuildSettingsUpdate, MessageRef},
};

/// Whatever can post, edit and take down board posts.
pub trait Messenger {
    /// Check that the bot can reach this chat. Returns its ID if so.
    fn resolve_channel(&self, channel: ChatId) -> impl Future<Output = Option<ChatId>> + Send;

    fn send_post(
        &self,
        channel: ChatId,
        post: &BoardPost,
    ) -> impl Future<Output = Result<MessageId, BoardError>> + Send;

    /// Fails if the post no longer exists.
    fn edit_post(
        &self,
        board_message: MessageRef,
        post: &BoardPost,
    ) -> impl Future<Output = Result<(), BoardError>> + Send;

    /// Fails if the post no longer exists.
    fn delete_post(
        &self,
        board_message: MessageRef,
        reason: &str,
    ) -> impl Future<Output = Result<(), BoardError>> + Send;
}

/// Storage of chat settings and of which message was reposted where.
pub trait BoardStore {
    /// Settings of this chat, or defaults if it has none.
    fn guild_settings(
        &self,
        guild: ChatId,
    ) -> impl Future<Output = Result<GuildSettings, BoardError>> + Send;

    /// Create or update the settings of this chat.
    fn upsert_guild_settings(
        &self,
        guild: ChatId,
        update: GuildSettingsUpdate,
    ) -> impl Future<Output = Result<(), BoardError>> + Send;

    fn board_mapping(
        &self,
        original: MessageRef,
    ) -> impl Future<Output = Result<Option<MessageRef>, BoardError>> + Send;

    /// Remember `board_message` as the repost of `original`, unless `original`
    /// already has one. Returns `true` if it was inserted.
    fn insert_board_mapping(
        &self,
        original: MessageRef,
        board_message: MessageRef,
    ) -> impl Future<Output = Result<bool, BoardError>> + Send;

    fn delete_board_mapping(
        &self,
        original: MessageRef,
    ) -> impl Future<Output = Result<(), BoardError>> + Send;
}
