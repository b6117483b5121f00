//! Fakes of the bot and the database for tests.

#![allow(clippy::unwrap_used)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Mutex,
    },
};

use teloxide::types::{ChatId, Message, MessageId};

use crate::{
    board::{BoardStore, Messenger},
    error::BoardError,
    types::{BoardPost, GuildSettings, GuildSettingsUpdate, MessageRef, OriginalMessage},
};

pub fn test_message(guild: ChatId, message_id: i32) -> OriginalMessage {
    OriginalMessage {
        id: MessageRef::new(guild, MessageId(message_id)),
        author_is_bot: false,
        author_name: "@amogus".to_string(),
        text: "sus".to_string(),
        image: None,
        permalink: None,
    }
}

/// A plain text message from a user in a supergroup, as Telegram would send it.
pub fn telegram_message(chat: ChatId, message_id: i32, date: i64, text: &str) -> Message {
    serde_json::from_value(serde_json::json!({
        "message_id": message_id,
        "date": date,
        "chat": {
            "id": chat.0,
            "type": "supergroup",
            "title": "Amogus fan club",
        },
        "from": {
            "id": 42,
            "is_bot": false,
            "first_name": "Amogus",
            "username": "amogus",
        },
        "text": text,
    }))
    .unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessengerCall {
    Send(ChatId, BoardPost),
    Edit(MessageRef, BoardPost),
    Delete(MessageRef, String),
}

/// Pretends to be the bot. Remembers everything it was asked to do.
pub struct FakeMessenger {
    reachable: HashSet<ChatId>,
    calls: Mutex<Vec<MessengerCall>>,
    live: Mutex<HashSet<MessageRef>>,
    next_id: AtomicI32,
    fail_next: AtomicBool,
}

impl FakeMessenger {
    pub fn new(reachable: impl IntoIterator<Item = ChatId>) -> Self {
        Self {
            reachable: reachable.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
            live: Mutex::new(HashSet::new()),
            next_id: AtomicI32::new(1),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Make the next send, edit or delete fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<MessengerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Amount of posts that were sent and not deleted.
    pub fn live_posts(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    fn check_failure(&self) -> Result<(), BoardError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            Err(BoardError::ExternalCall(teloxide::RequestError::Api(
                teloxide::ApiError::BotBlocked,
            )))
        } else {
            Ok(())
        }
    }
}

impl Messenger for FakeMessenger {
    async fn resolve_channel(&self, channel: ChatId) -> Option<ChatId> {
        self.reachable.contains(&channel).then_some(channel)
    }

    async fn send_post(&self, channel: ChatId, post: &BoardPost) -> Result<MessageId, BoardError> {
        self.check_failure()?;
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.calls
            .lock()
            .unwrap()
            .push(MessengerCall::Send(channel, post.clone()));
        self.live.lock().unwrap().insert(MessageRef::new(channel, id));
        Ok(id)
    }

    async fn edit_post(&self, board_message: MessageRef, post: &BoardPost) -> Result<(), BoardError> {
        self.check_failure()?;
        self.calls
            .lock()
            .unwrap()
            .push(MessengerCall::Edit(board_message, post.clone()));
        Ok(())
    }

    async fn delete_post(&self, board_message: MessageRef, reason: &str) -> Result<(), BoardError> {
        self.check_failure()?;
        self.calls
            .lock()
            .unwrap()
            .push(MessengerCall::Delete(board_message, reason.to_string()));
        self.live.lock().unwrap().remove(&board_message);
        Ok(())
    }
}

/// Pretends to be the database.
#[derive(Default)]
pub struct FakeStore {
    settings: Mutex<HashMap<ChatId, GuildSettings>>,
    mappings: Mutex<HashMap<MessageRef, MessageRef>>,
    /// A mapping that "another handler" inserts right before ours.
    racing: Mutex<Option<(MessageRef, MessageRef)>>,
    fail_next_write: AtomicBool,
}

impl FakeStore {
    pub fn mapping(&self, original: MessageRef) -> Option<MessageRef> {
        self.mappings.lock().unwrap().get(&original).copied()
    }

    pub fn settings(&self, guild: ChatId) -> Option<GuildSettings> {
        self.settings.lock().unwrap().get(&guild).copied()
    }

    /// Make the next mapping insert find this mapping already there.
    pub fn race_with(&self, original: MessageRef, board_message: MessageRef) {
        *self.racing.lock().unwrap() = Some((original, board_message));
    }

    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn check_failure(&self) -> Result<(), BoardError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            Err(BoardError::Persistence(sqlx::Error::PoolClosed))
        } else {
            Ok(())
        }
    }
}

impl BoardStore for FakeStore {
    async fn guild_settings(&self, guild: ChatId) -> Result<GuildSettings, BoardError> {
        Ok(self.settings(guild).unwrap_or_default())
    }

    async fn upsert_guild_settings(
        &self,
        guild: ChatId,
        update: GuildSettingsUpdate,
    ) -> Result<(), BoardError> {
        self.check_failure()?;
        let mut settings = self.settings.lock().unwrap();
        let entry = settings.entry(guild).or_default();
        if let Some(minimum) = update.reaction_minimum {
            entry.reaction_minimum = minimum;
        }
        if let Some(channel) = update.forward_channel {
            entry.forward_channel = Some(channel);
        }
        Ok(())
    }

    async fn board_mapping(&self, original: MessageRef) -> Result<Option<MessageRef>, BoardError> {
        Ok(self.mapping(original))
    }

    async fn insert_board_mapping(
        &self,
        original: MessageRef,
        board_message: MessageRef,
    ) -> Result<bool, BoardError> {
        self.check_failure()?;
        let mut mappings = self.mappings.lock().unwrap();
        if let Some((racing_original, racing_board)) = self.racing.lock().unwrap().take() {
            mappings.insert(racing_original, racing_board);
        }
        if mappings.contains_key(&original) {
            return Ok(false);
        }
        mappings.insert(original, board_message);
        Ok(true)
    }

    async fn delete_board_mapping(&self, original: MessageRef) -> Result<(), BoardError> {
        self.check_failure()?;
        self.mappings.lock().unwrap().remove(&original);
        Ok(())
    }
}
