use teloxide::types::{Chat, Message, PhotoSize, User};

pub trait MessageStuff {
    fn text_full(&self) -> Option<&str>;
    fn find_biggest_photo(&self) -> Option<&PhotoSize>;
    /// Name of whoever sent this message, as `@username` if they have one.
    fn sender_name(&self) -> String;
    /// Whether this message was sent by a bot account.
    fn is_from_bot(&self) -> bool;
}

impl MessageStuff for Message {
    fn text_full(&self) -> Option<&str> {
        self.text().or_else(|| self.caption())
    }
    fn find_biggest_photo(&self) -> Option<&PhotoSize> {
        if let Some(photo_sizes) = self.photo() {
            photo_sizes.iter().max_by_key(|x| x.width + x.height)
        } else {
            None
        }
    }
    fn sender_name(&self) -> String {
        if let Some(chat) = &self.sender_chat {
            chat_name(chat)
        } else if let Some(user) = &self.from {
            user_name(user)
        } else {
            // Shouldn't happen, but eh.
            "a private sender".to_string()
        }
    }
    fn is_from_bot(&self) -> bool {
        self.sender_chat.is_none() && self.from.as_ref().is_some_and(|x| x.is_bot)
    }
}

/// Either `@username` or full name of a user.
pub fn user_name(user: &User) -> String {
    if let Some(username) = &user.username {
        format!("@{}", username)
    } else {
        user.full_name()
    }
}

/// Either `@username` or title of a chat.
pub fn chat_name(chat: &Chat) -> String {
    if let Some(username) = chat.username() {
        format!("@{}", username)
    } else if let Some(title) = chat.title() {
        title.to_string()
    } else {
        // Shouldn't happen, but eh.
        "a private chat".to_string()
    }
}
