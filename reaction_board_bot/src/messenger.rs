use html_escape::{encode_double_quoted_attribute, encode_text};
use teloxide::{
    payloads::{
        EditMessageCaptionSetters, EditMessageTextSetters, SendMessageSetters, SendPhotoSetters,
    },
    prelude::Requester,
    types::{ChatId, FileId, InputFile, MessageId, ParseMode},
    ApiError, Bot, RequestError,
};

use crate::{
    board::Messenger,
    error::BoardError,
    types::{BoardPost, MessageRef},
};

/// Telegram allows 1024 characters in a caption.
const CAPTION_TEXT_LIMIT: usize = 800;
/// ...and 4096 in a message.
const MESSAGE_TEXT_LIMIT: usize = 3800;

/// Cut `text` down to at most `limit` characters, marking the cut with an ellipsis.
fn truncate_chars(text: &str, limit: usize) -> std::borrow::Cow<'_, str> {
    match text.char_indices().nth(limit) {
        None => text.into(),
        Some((cut, _)) => format!("{}…", &text[..cut]).into(),
    }
}

/// Answers to an edit or delete that mean the post already is how we want it.
fn already_done(error: &RequestError) -> bool {
    matches!(
        error,
        RequestError::Api(ApiError::MessageNotModified | ApiError::MessageToDeleteNotFound)
    )
}

/// Render a board post as Telegram HTML.
pub fn render_post(post: &BoardPost) -> String {
    let limit = match post.image {
        Some(_) => CAPTION_TEXT_LIMIT,
        None => MESSAGE_TEXT_LIMIT,
    };

    let mut output = format!("<b>{}</b>\n", encode_text(&post.author_name));

    if !post.text.is_empty() {
        output.push_str(&encode_text(&truncate_chars(&post.text, limit)));
        output.push_str("\n\n");
    }

    output.push_str(&format!("⭐ <b>{}</b> Reacts", post.total_reactions));

    if let Some(link) = &post.permalink {
        output.push_str(&format!(
            " | <a href=\"{}\">Original</a>",
            encode_double_quoted_attribute(link.as_str())
        ));
    }

    output
}

impl Messenger for Bot {
    async fn resolve_channel(&self, channel: ChatId) -> Option<ChatId> {
        match self.get_chat(channel).await {
            Ok(chat) => Some(chat.id),
            Err(e) => {
                log::debug!("Could not resolve chat {}: {}", channel.0, e);
                None
            }
        }
    }

    async fn send_post(&self, channel: ChatId, post: &BoardPost) -> Result<MessageId, BoardError> {
        let text = render_post(post);
        let sent = match &post.image {
            Some(image) => {
                self.send_photo(channel, InputFile::file_id(FileId(image.clone())))
                    .caption(text)
                    .parse_mode(ParseMode::Html)
                    .await?
            }
            None => {
                self.send_message(channel, text)
                    .parse_mode(ParseMode::Html)
                    .await?
            }
        };
        Ok(sent.id)
    }

    async fn edit_post(&self, board_message: MessageRef, post: &BoardPost) -> Result<(), BoardError> {
        let text = render_post(post);
        let result = match post.image {
            Some(_) => self
                .edit_message_caption(board_message.chat, board_message.id)
                .caption(text)
                .parse_mode(ParseMode::Html)
                .await
                .map(drop),
            None => self
                .edit_message_text(board_message.chat, board_message.id, text)
                .parse_mode(ParseMode::Html)
                .await
                .map(drop),
        };

        match result {
            // Same content as before. That's fine.
            Err(e) if already_done(&e) => Ok(()),
            other => Ok(other?),
        }
    }

    async fn delete_post(&self, board_message: MessageRef, reason: &str) -> Result<(), BoardError> {
        // Telegram has no audit log to put the reason in.
        log::info!("Deleting board post {}: {}", board_message, reason);
        match self
            .delete_message(board_message.chat, board_message.id)
            .await
        {
            Err(e) if already_done(&e) => {
                // Someone deleted it by hand already.
                log::info!("Board post {} was already gone", board_message);
                Ok(())
            }
            other => {
                other?;
                Ok(())
            }
        }
    }
}
