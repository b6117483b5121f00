//! This create houses common for me functions, because some things
//! are just boilerplate and aaAAAAAAAAA

pub mod useful_methods;

use std::future::Future;

use teloxide::{
    prelude::*,
    types::{ChatMember, Message},
};

/// Initialize logging and start the `closure` in an async runtime.
/// Logging is enabled on level `default_filter` unless overridden
/// by environment variable `RUST_LOG`. This uses the crate
/// [pretty_env_logger][] internally, see its documentation for more details.
///
/// # Panics
/// Panics if the async runtime fails to start.
///
/// [pretty_env_logger]: https://docs.rs/pretty_env_logger
pub fn start_everything(default_filter: &str, closure: impl Future<Output = ()>) {
    let log_level = std::env::var_os("RUST_LOG")
        .and_then(|x| x.into_string().ok())
        .unwrap_or_else(|| default_filter.to_string());

    // systemd's journal timestamps everything by itself.
    let running_as_systemd_service = std::env::var_os("JOURNAL_STREAM").is_some();

    let mut builder = match running_as_systemd_service {
        true => pretty_env_logger::formatted_builder(),
        false => pretty_env_logger::formatted_timed_builder(),
    };

    builder.parse_filters(&log_level);

    if builder.try_init().is_err() {
        log::error!("Tried to init logger twice!");
    }

    log::info!("hi");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to start the async runtime!")
        .block_on(closure);
}

/// Read the bot token. It's in the file `key_debug` for debug builds
/// and `key` otherwise, with surrounding whitespace ignored.
///
/// # Errors
/// Errors if the file can't be read.
pub fn read_bot_key() -> std::io::Result<String> {
    let path = match cfg!(debug_assertions) {
        true => "key_debug",
        false => "key",
    };
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

/// Find out if whoever sent this message is an admin of the chat it was sent in.
pub async fn is_sender_admin(bot: &Bot, message: &Message) -> Result<bool, teloxide::RequestError> {
    // check if a chat sent this, i.e. an anonymous admin.
    // In such a case, "from" is @GroupAnonymousBot for backwards compatibility.
    let is_admin = if let Some(sender_chat) = &message.sender_chat {
        if sender_chat.id == message.chat.id {
            // If it's posted by the chat itself, it's probably an anonymous admin.
            true
        } else {
            // It may have been sent by the channel linked to this chat, then.
            // Check for that.
            let chat_full = bot.get_chat(message.chat.id).await?;

            chat_full.linked_chat_id() == Some(sender_chat.id.0)
        }
    } else if let Some(user) = &message.from {
        let ChatMember { kind, .. } = bot.get_chat_member(message.chat.id, user.id).await?;
        kind.is_privileged()
    } else {
        false
    };

    Ok(is_admin)
}
