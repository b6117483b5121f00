use crate::{
    error::BoardError,
    reactions::ReactionCounts,
    types::{MessageRef, OriginalMessage},
};

use super::{BoardAction, BoardState, BoardStore, Messenger};

/// Reason given when a post is taken off the board.
pub const DELETE_REASON: &str = "Less reactions than required to remain on the board.";

/// Reason given when a post is taken down right after posting, because
/// it could not be recorded.
const ORPHAN_REASON: &str = "Board post could not be recorded.";

/// A reaction change on some message, with the message itself and its current reactions.
#[derive(Debug, Clone)]
pub struct ReactionEvent {
    pub message: OriginalMessage,
    pub reactions: ReactionCounts,
}

/// What happened to the board as a result of a [`ReactionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardOutcome {
    /// The message was written by a bot and was left alone.
    Ignored,
    /// Nothing needed to change.
    Unchanged,
    /// A new board post was made.
    Created(MessageRef),
    Edited(MessageRef),
    Deleted(MessageRef),
}

/// Keeps the board in sync with reactions.
///
/// Holds the two things it needs to talk to, so tests can hand it fakes.
pub struct Board<'a, M, S> {
    messenger: &'a M,
    store: &'a S,
}

impl<'a, M: Messenger + Sync, S: BoardStore + Sync> Board<'a, M, S> {
    pub fn new(messenger: &'a M, store: &'a S) -> Self {
        Self { messenger, store }
    }

    /// Handle a reaction change and log whatever goes wrong. Never fails.
    pub async fn on_reaction_change(&self, event: &ReactionEvent) -> Option<BoardOutcome> {
        log_outcome(&event.message, self.handle_reaction_change(event).await)
    }

    /// Handle an edit of a message and log whatever goes wrong. Never fails.
    pub async fn on_message_edit(&self, event: &ReactionEvent) -> Option<BoardOutcome> {
        log_outcome(&event.message, self.refresh_post(event).await)
    }

    /// Bring the board in line with the current reactions on a message.
    ///
    /// # Errors
    /// Errors if settings or mappings can't be read, or if the one needed
    /// board action fails. In that case nothing is recorded that didn't happen.
    pub async fn handle_reaction_change(
        &self,
        event: &ReactionEvent,
    ) -> Result<BoardOutcome, BoardError> {
        let message = &event.message;

        if message.author_is_bot {
            return Ok(BoardOutcome::Ignored);
        }

        let total = event.reactions.total();
        let settings = self.store.guild_settings(message.guild()).await?;
        let state = BoardState::from(self.store.board_mapping(message.id).await?);

        let (_, action) = state.decide(total, settings.reaction_minimum);

        match action {
            BoardAction::Nothing => Ok(BoardOutcome::Unchanged),
            BoardAction::Create => {
                let channel = settings
                    .forward_channel
                    .ok_or(BoardError::UnresolvedChannel(None))?;
                let channel = self
                    .messenger
                    .resolve_channel(channel)
                    .await
                    .ok_or(BoardError::UnresolvedChannel(Some(channel)))?;

                let post = message.to_post(total);
                let board_message =
                    MessageRef::new(channel, self.messenger.send_post(channel, &post).await?);

                match self
                    .store
                    .insert_board_mapping(message.id, board_message)
                    .await
                {
                    Ok(true) => Ok(BoardOutcome::Created(board_message)),
                    Ok(false) => {
                        // Someone else got there first. Don't leave a duplicate behind.
                        log::warn!(
                            "Message {} got reposted twice, removing {}",
                            message.id,
                            board_message
                        );
                        self.take_down_orphan(board_message).await;
                        Ok(BoardOutcome::Unchanged)
                    }
                    Err(e) => {
                        self.take_down_orphan(board_message).await;
                        Err(e)
                    }
                }
            }
            BoardAction::Edit(board_message) => {
                let post = message.to_post(total);
                self.messenger.edit_post(board_message, &post).await?;
                Ok(BoardOutcome::Edited(board_message))
            }
            BoardAction::Delete(board_message) => {
                self.messenger
                    .delete_post(board_message, DELETE_REASON)
                    .await?;
                self.store.delete_board_mapping(message.id).await?;
                Ok(BoardOutcome::Deleted(board_message))
            }
        }
    }

    /// Re-render the board post of a message whose content changed.
    ///
    /// Only ever edits. An edit says nothing new about reactions, so it never
    /// takes a post off the board or puts one on it.
    ///
    /// # Errors
    /// Errors if the mapping can't be read or the edit fails.
    pub async fn refresh_post(&self, event: &ReactionEvent) -> Result<BoardOutcome, BoardError> {
        let message = &event.message;

        if message.author_is_bot {
            return Ok(BoardOutcome::Ignored);
        }

        let Some(board_message) = self.store.board_mapping(message.id).await? else {
            return Ok(BoardOutcome::Unchanged);
        };

        let post = message.to_post(event.reactions.total());
        self.messenger.edit_post(board_message, &post).await?;
        Ok(BoardOutcome::Edited(board_message))
    }

    async fn take_down_orphan(&self, board_message: MessageRef) {
        if let Err(e) = self
            .messenger
            .delete_post(board_message, ORPHAN_REASON)
            .await
        {
            log::error!(
                "Failed to remove unrecorded board post {}: {}",
                board_message,
                e
            );
        }
    }
}

fn log_outcome(
    message: &OriginalMessage,
    result: Result<BoardOutcome, BoardError>,
) -> Option<BoardOutcome> {
    match result {
        Ok(outcome) => {
            log::debug!("Board for {}: {:?}", message.id, outcome);
            Some(outcome)
        }
        Err(e) if e.is_unconfigured() => {
            log::debug!(
                "Message {} qualifies for the board, but there's no board: {}",
                message.id,
                e
            );
            None
        }
        Err(e) => {
            log::warn!("Failed to update board for {}: {}", message.id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::num::NonZeroU32;

    use teloxide::types::{ChatId, MessageId};

    use super::*;
    use crate::{
        testing::{test_message, FakeMessenger, FakeStore, MessengerCall},
        types::GuildSettingsUpdate,
    };

    const GUILD: ChatId = ChatId(-100111);
    const BOARD_CHAT: ChatId = ChatId(-100222);

    fn event(message_id: i32, total: u64) -> ReactionEvent {
        ReactionEvent {
            message: test_message(GUILD, message_id),
            reactions: [("👍", total)].into_iter().collect(),
        }
    }

    async fn configured_store(minimum: u32) -> FakeStore {
        let store = FakeStore::default();
        store
            .upsert_guild_settings(
                GUILD,
                GuildSettingsUpdate {
                    reaction_minimum: NonZeroU32::new(minimum),
                    forward_channel: Some(BOARD_CHAT),
                },
            )
            .await
            .unwrap();
        store
    }

    fn original(message_id: i32) -> MessageRef {
        MessageRef::new(GUILD, MessageId(message_id))
    }

    #[tokio::test]
    async fn up_down_and_back_up() {
        let messenger = FakeMessenger::new([BOARD_CHAT]);
        let store = configured_store(5).await;
        let board = Board::new(&messenger, &store);

        let first = match board.handle_reaction_change(&event(1, 5)).await.unwrap() {
            BoardOutcome::Created(post) => post,
            other => panic!("Expected a new post, got {other:?}"),
        };
        assert_eq!(first.chat, BOARD_CHAT);
        assert_eq!(store.mapping(original(1)), Some(first));

        let outcome = board.handle_reaction_change(&event(1, 4)).await.unwrap();
        assert_eq!(outcome, BoardOutcome::Deleted(first));
        assert_eq!(store.mapping(original(1)), None);

        let second = match board.handle_reaction_change(&event(1, 5)).await.unwrap() {
            BoardOutcome::Created(post) => post,
            other => panic!("Expected a new post, got {other:?}"),
        };
        assert_ne!(first, second);
        assert_eq!(store.mapping(original(1)), Some(second));

        let calls = messenger.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[1],
            MessengerCall::Delete(first, DELETE_REASON.to_string())
        );
    }

    #[tokio::test]
    async fn replayed_sequences_end_where_the_last_total_says() {
        let sequences: &[&[u64]] = &[
            &[1, 2, 3],
            &[3, 2],
            &[3, 4, 5, 4, 3, 2, 3],
            &[0, 7, 0],
            &[2, 3, 2, 3, 2],
        ];

        for (i, totals) in sequences.iter().enumerate() {
            let messenger = FakeMessenger::new([BOARD_CHAT]);
            let store = configured_store(3).await;
            let board = Board::new(&messenger, &store);
            let message_id = i as i32 + 1;

            for total in totals.iter() {
                board
                    .handle_reaction_change(&event(message_id, *total))
                    .await
                    .unwrap();
            }

            let last = *totals.last().unwrap();
            assert_eq!(
                store.mapping(original(message_id)).is_some(),
                last >= 3,
                "sequence {totals:?}"
            );
            // Never more than one live post per message.
            assert!(messenger.live_posts() <= 1, "sequence {totals:?}");
        }
    }

    #[tokio::test]
    async fn editing_twice_is_just_two_edits() {
        let messenger = FakeMessenger::new([BOARD_CHAT]);
        let store = configured_store(3).await;
        let board = Board::new(&messenger, &store);

        board.handle_reaction_change(&event(7, 3)).await.unwrap();
        let first = board.handle_reaction_change(&event(7, 4)).await.unwrap();
        let second = board.handle_reaction_change(&event(7, 4)).await.unwrap();
        assert_eq!(first, second);

        let calls = messenger.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], MessengerCall::Send(..)));
        assert_eq!(calls[1], calls[2]);
        match &calls[1] {
            MessengerCall::Edit(_, post) => assert_eq!(post.total_reactions, 4),
            other => panic!("Expected an edit, got {other:?}"),
        }
        assert_eq!(messenger.live_posts(), 1);
    }

    #[tokio::test]
    async fn defaults_without_settings() {
        let messenger = FakeMessenger::new([BOARD_CHAT]);
        let store = FakeStore::default();
        let board = Board::new(&messenger, &store);

        // Below the default minimum of 3, nothing to do at all.
        let outcome = board.handle_reaction_change(&event(1, 2)).await.unwrap();
        assert_eq!(outcome, BoardOutcome::Unchanged);

        // At the default minimum, there's nowhere to post to.
        let err = board.handle_reaction_change(&event(1, 3)).await.unwrap_err();
        assert!(err.is_unconfigured());
        assert_eq!(board.on_reaction_change(&event(1, 3)).await, None);

        assert!(messenger.calls().is_empty());
        assert_eq!(store.mapping(original(1)), None);
    }

    #[tokio::test]
    async fn unreachable_board_chat() {
        // The bot can't see the board chat.
        let messenger = FakeMessenger::new([]);
        let store = configured_store(2).await;
        let board = Board::new(&messenger, &store);

        let err = board.handle_reaction_change(&event(1, 2)).await.unwrap_err();
        assert!(matches!(err, BoardError::UnresolvedChannel(Some(BOARD_CHAT))));
        assert!(messenger.calls().is_empty());
        assert_eq!(store.mapping(original(1)), None);
    }

    #[tokio::test]
    async fn bot_messages_are_ignored() {
        let messenger = FakeMessenger::new([BOARD_CHAT]);
        let store = configured_store(1).await;
        let board = Board::new(&messenger, &store);

        let mut event = event(1, 100);
        event.message.author_is_bot = true;

        let outcome = board.handle_reaction_change(&event).await.unwrap();
        assert_eq!(outcome, BoardOutcome::Ignored);
        assert!(messenger.calls().is_empty());
        assert_eq!(store.mapping(original(1)), None);
    }

    #[tokio::test]
    async fn failed_send_records_nothing() {
        let messenger = FakeMessenger::new([BOARD_CHAT]);
        messenger.fail_next();
        let store = configured_store(1).await;
        let board = Board::new(&messenger, &store);

        assert!(board.handle_reaction_change(&event(1, 1)).await.is_err());
        assert_eq!(store.mapping(original(1)), None);

        // Next reaction tries again from scratch.
        let outcome = board.handle_reaction_change(&event(1, 2)).await.unwrap();
        assert!(matches!(outcome, BoardOutcome::Created(_)));
    }

    #[tokio::test]
    async fn failed_delete_keeps_mapping() {
        let messenger = FakeMessenger::new([BOARD_CHAT]);
        let store = configured_store(2).await;
        let board = Board::new(&messenger, &store);

        let BoardOutcome::Created(post) = board.handle_reaction_change(&event(1, 2)).await.unwrap()
        else {
            panic!("Expected a new post");
        };

        messenger.fail_next();
        assert!(board.handle_reaction_change(&event(1, 1)).await.is_err());
        assert_eq!(store.mapping(original(1)), Some(post));

        // Retried on the next reaction.
        let outcome = board.handle_reaction_change(&event(1, 0)).await.unwrap();
        assert_eq!(outcome, BoardOutcome::Deleted(post));
        assert_eq!(store.mapping(original(1)), None);
    }

    #[tokio::test]
    async fn failed_edit_keeps_mapping() {
        let messenger = FakeMessenger::new([BOARD_CHAT]);
        let store = configured_store(2).await;
        let board = Board::new(&messenger, &store);

        let BoardOutcome::Created(post) = board.handle_reaction_change(&event(1, 2)).await.unwrap()
        else {
            panic!("Expected a new post");
        };

        messenger.fail_next();
        assert!(board.handle_reaction_change(&event(1, 3)).await.is_err());
        assert_eq!(store.mapping(original(1)), Some(post));
    }

    #[tokio::test]
    async fn lost_race_removes_duplicate() {
        let messenger = FakeMessenger::new([BOARD_CHAT]);
        let store = configured_store(2).await;
        let board = Board::new(&messenger, &store);

        // Another handler already reposted this message, but we didn't see it
        // when we looked.
        let existing = MessageRef::new(BOARD_CHAT, MessageId(9000));
        store.race_with(original(1), existing);

        let outcome = board.handle_reaction_change(&event(1, 2)).await.unwrap();
        assert_eq!(outcome, BoardOutcome::Unchanged);
        assert_eq!(store.mapping(original(1)), Some(existing));

        let calls = messenger.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], MessengerCall::Send(..)));
        assert!(matches!(calls[1], MessengerCall::Delete(..)));
        assert_eq!(messenger.live_posts(), 0);
    }

    #[tokio::test]
    async fn failed_mapping_write_removes_post() {
        let messenger = FakeMessenger::new([BOARD_CHAT]);
        let store = configured_store(2).await;
        let board = Board::new(&messenger, &store);

        store.fail_next_write();
        let err = board.handle_reaction_change(&event(1, 2)).await.unwrap_err();
        assert!(matches!(err, BoardError::Persistence(_)));
        assert_eq!(messenger.live_posts(), 0);
        assert_eq!(store.mapping(original(1)), None);
    }

    #[tokio::test]
    async fn post_content_follows_the_message() {
        let messenger = FakeMessenger::new([BOARD_CHAT]);
        let store = configured_store(1).await;
        let board = Board::new(&messenger, &store);

        let mut event = event(3, 1);
        event.message.image = Some("photo-file-id".to_string());
        board.handle_reaction_change(&event).await.unwrap();

        match &messenger.calls()[0] {
            MessengerCall::Send(channel, post) => {
                assert_eq!(*channel, BOARD_CHAT);
                assert_eq!(post, &event.message.to_post(1));
                assert_eq!(post.image.as_deref(), Some("photo-file-id"));
            }
            other => panic!("Expected a send, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refreshing_only_edits() {
        let messenger = FakeMessenger::new([BOARD_CHAT]);
        let store = configured_store(3).await;
        let board = Board::new(&messenger, &store);

        // Not on the board, nothing to refresh even with plenty of reactions.
        let outcome = board.refresh_post(&event(1, 10)).await.unwrap();
        assert_eq!(outcome, BoardOutcome::Unchanged);
        assert!(messenger.calls().is_empty());

        let BoardOutcome::Created(post) = board.handle_reaction_change(&event(1, 3)).await.unwrap()
        else {
            panic!("Expected a new post");
        };

        // Below the minimum, but a refresh still never deletes.
        let mut edited = event(1, 0);
        edited.message.text = "sus (edited)".to_string();
        let outcome = board.refresh_post(&edited).await.unwrap();
        assert_eq!(outcome, BoardOutcome::Edited(post));
        assert_eq!(store.mapping(original(1)), Some(post));
        assert_eq!(messenger.live_posts(), 1);
        assert_eq!(
            messenger.calls()[1],
            MessengerCall::Edit(post, edited.message.to_post(0))
        );

        let mut from_bot = event(1, 3);
        from_bot.message.author_is_bot = true;
        assert_eq!(
            board.refresh_post(&from_bot).await.unwrap(),
            BoardOutcome::Ignored
        );
        assert_eq!(messenger.calls().len(), 2);
    }
}
