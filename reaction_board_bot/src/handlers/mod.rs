pub mod commands;

use std::sync::Arc;

use arch_bot_commons::useful_methods::*;
use teloxide::{
    prelude::*,
    types::{Me, MessageReactionCountUpdated, MessageReactionUpdated},
    RequestError,
};

use crate::{
    board::{Board, BoardOutcome, Messenger, ReactionEvent},
    database::Database,
    error::BoardError,
    reactions::{reaction_key, ReactionCounts},
    types::{MessageRef, OriginalMessage},
};

/// Flatten a Telegram message into what the board needs to know about it.
fn original_message(message: &Message) -> OriginalMessage {
    OriginalMessage {
        id: MessageRef::new(message.chat.id, message.id),
        author_is_bot: message.is_from_bot(),
        author_name: message.sender_name(),
        text: message.text_full().unwrap_or_default().to_string(),
        image: message.find_biggest_photo().map(|x| x.file.id.0.clone()),
        permalink: message.url(),
    }
}

/// Find the message a reaction was put on among the ones we've seen.
async fn resolve_original(database: &Database, target: MessageRef) -> Option<OriginalMessage> {
    match database.get_cached_message(target).await {
        Ok(Some(message)) => Some(original_message(&message)),
        Ok(None) => {
            // Sent before the bot joined, or forgotten by now.
            log::debug!("{}", BoardError::UnresolvedMessage(target));
            None
        }
        Err(e) => {
            log::error!("Database error while fetching {}: {:?}", target, e);
            None
        }
    }
}

/// Remember a message, so that reactions on it can be resolved later.
async fn remember(database: &Database, message: &Message) {
    if let Err(e) = database.cache_message(message).await {
        log::error!("Failed to cache message: {:?}", e);
    }
}

/// Count one user's reaction change on `target` and update the board to match.
pub async fn on_reaction<M: Messenger + Sync>(
    messenger: &M,
    database: &Database,
    target: MessageRef,
    old: &[String],
    new: &[String],
) -> Option<BoardOutcome> {
    let message = resolve_original(database, target).await?;

    let reactions = match database.apply_reaction_change(target, old, new).await {
        Ok(r) => r,
        Err(e) => {
            log::error!("Database error while counting reactions on {}: {:?}", target, e);
            return None;
        }
    };

    Board::new(messenger, database)
        .on_reaction_change(&ReactionEvent { message, reactions })
        .await
}

/// Replace the known reactions on `target` and update the board to match.
pub async fn on_reaction_count<M: Messenger + Sync>(
    messenger: &M,
    database: &Database,
    target: MessageRef,
    reactions: ReactionCounts,
) -> Option<BoardOutcome> {
    let message = resolve_original(database, target).await?;

    if let Err(e) = database.set_reactions(target, &reactions).await {
        log::error!("Database error while counting reactions on {}: {:?}", target, e);
        return None;
    }

    Board::new(messenger, database)
        .on_reaction_change(&ReactionEvent { message, reactions })
        .await
}

/// Recache an edited message and bring its board post, if any, up to date.
pub async fn on_edit<M: Messenger + Sync>(
    messenger: &M,
    database: &Database,
    message: &Message,
) -> Option<BoardOutcome> {
    remember(database, message).await;

    let original = original_message(message);
    let reactions = match database.get_reactions(original.id).await {
        Ok(r) => r,
        Err(e) => {
            log::error!("Database error! {e:?}");
            return None;
        }
    };

    if reactions.is_empty() {
        // Nothing known to show on a post.
        return Some(BoardOutcome::Unchanged);
    }

    Board::new(messenger, database)
        .on_message_edit(&ReactionEvent {
            message: original,
            reactions,
        })
        .await
}

pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    database: Arc<Database>,
) -> Result<(), RequestError> {
    // Private chats have no board.
    if !message.chat.is_private() {
        remember(&database, &message).await;
    }

    commands::handle_command(&bot, &me, &message, &database).await?;
    Ok(())
}

pub async fn handle_channel_post(
    message: Message,
    database: Arc<Database>,
) -> Result<(), RequestError> {
    remember(&database, &message).await;
    Ok(())
}

pub async fn handle_edited_message(
    bot: Bot,
    message: Message,
    database: Arc<Database>,
) -> Result<(), RequestError> {
    if !message.chat.is_private() {
        on_edit(&bot, &database, &message).await;
    }
    Ok(())
}

/// Someone changed their reactions on a message.
pub async fn handle_reaction(
    bot: Bot,
    update: MessageReactionUpdated,
    database: Arc<Database>,
) -> Result<(), RequestError> {
    let target = MessageRef::new(update.chat.id, update.message_id);
    let old: Vec<String> = update.old_reaction.iter().filter_map(reaction_key).collect();
    let new: Vec<String> = update.new_reaction.iter().filter_map(reaction_key).collect();

    on_reaction(&bot, &database, target, &old, &new).await;
    Ok(())
}

/// Anonymous reactions on a message changed. This comes with the full counts.
pub async fn handle_reaction_count(
    bot: Bot,
    update: MessageReactionCountUpdated,
    database: Arc<Database>,
) -> Result<(), RequestError> {
    let target = MessageRef::new(update.chat.id, update.message_id);
    let reactions: ReactionCounts = update
        .reactions
        .iter()
        .filter_map(|x| reaction_key(&x.r#type).map(|key| (key, u64::from(x.total_count))))
        .collect();

    on_reaction_count(&bot, &database, target, reactions).await;
    Ok(())
}
