use std::sync::Arc;
use teloxide::{dptree::deps, prelude::*};

use arch_bot_commons::read_bot_key;

use crate::{
    database::{prune_spinloop, Database},
    handlers::{self, commands::Command},
};

/// # Panics
///
/// Panics if there's no key file or the database can't be opened.
pub async fn entry() {
    log::info!("ASYNC WOOOO");
    let key = read_bot_key().expect("Could not load bot key file!");

    let bot = Bot::new(key);

    bot.set_my_commands(Command::generate_bot_commands())
        .await
        .expect("Failed to set bot commands!");

    let database: Arc<Database> = Database::new().await.expect("Failed to create database!");

    tokio::spawn(prune_spinloop(Arc::downgrade(&database)));

    log::info!("Creating the handler...");

    // Reaction updates are only sent to bots that are admins in the chat.
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_edited_message().endpoint(handlers::handle_edited_message))
        .branch(Update::filter_channel_post().endpoint(handlers::handle_channel_post))
        .branch(Update::filter_edited_channel_post().endpoint(handlers::handle_edited_message))
        .branch(Update::filter_message_reaction_updated().endpoint(handlers::handle_reaction))
        .branch(
            Update::filter_message_reaction_count_updated()
                .endpoint(handlers::handle_reaction_count),
        );

    log::info!("Dispatching the dispatcher!");

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(deps![database])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("it appears we have been bonked.");
}
