use std::num::NonZeroU32;

use arch_bot_commons::{is_sender_admin, useful_methods::*};
use html_escape::encode_text;
use teloxide::{
    payloads::SendMessageSetters,
    prelude::Requester,
    sugar::request::RequestReplyExt,
    types::{
        BotCommand, ChatId, ChatMember, Me, Message, MessageEntityKind, ParseMode, Recipient,
    },
    Bot, RequestError,
};

use crate::{
    board::BoardStore,
    database::Database,
    error::BoardError,
    types::{GuildSettings, GuildSettingsUpdate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    SetMinimum,
    SetChannel,
    Settings,
}

pub struct Command {
    pub callname: &'static str,
    pub description: &'static str,
    pub kind: CommandKind,
    /// Only chat admins may use it.
    pub admin_only: bool,
    hidden: bool,
}

pub const COMMANDS: &[Command] = &[
    Command {
        callname: "/start",
        description: "",
        kind: CommandKind::Help,
        admin_only: false,
        hidden: true,
    },
    Command {
        callname: "/help",
        description: "Show what this bot does and how to set it up.",
        kind: CommandKind::Help,
        admin_only: false,
        hidden: false,
    },
    Command {
        callname: "/set_minimum",
        description: "Set how many reactions a message needs to land on the board.",
        kind: CommandKind::SetMinimum,
        admin_only: true,
        hidden: false,
    },
    Command {
        callname: "/set_channel",
        description: "Set the chat to repost messages to, as @username or chat ID.",
        kind: CommandKind::SetChannel,
        admin_only: true,
        hidden: false,
    },
    Command {
        callname: "/board_settings",
        description: "Show the board settings of this chat.",
        kind: CommandKind::Settings,
        admin_only: false,
        hidden: false,
    },
];

const HELP: &str = "
This bot reposts messages that got lots of reactions to a separate \"board\" chat.

To use this bot, add it to a group as an administrator, then:
<code>/set_channel @your_board_channel</code> - where to repost to. The bot has to be able to post there, and you have to be an admin there.
<code>/set_minimum 5</code> - how many reactions a message needs. Defaults to 3.

If a message's reactions drop below the minimum, its repost is removed again.";

impl Command {
    /// Find the command this text starts with, if any.
    ///
    /// Returns the command and the rest of the text after it.
    /// Commands addressed to other bots, like `/help@SomeOtherBot`, are ignored.
    pub fn parse<'a>(text: &'a str, bot_username: &str) -> Option<(&'static Command, &'a str)> {
        if !text.starts_with('/') {
            return None;
        }
        let command = text.split_whitespace().next()?;
        let params = text[command.len()..].trim_start();

        // If the command is "/help@Some_Bot", trim the "@" and everything after it.
        let callname = if let Some(username_start) = command.find('@') {
            // Bot names are guaranteed ASCII, so ignore ASCII case specifically.
            if !command[username_start + '@'.len_utf8()..].eq_ignore_ascii_case(bot_username) {
                // This command is not for us. Ignore.
                return None;
            }
            &command[..username_start]
        } else {
            command
        };

        COMMANDS
            .iter()
            .find(|x| x.callname.eq_ignore_ascii_case(callname))
            .map(|x| (x, params))
    }

    pub fn generate_bot_commands() -> Vec<BotCommand> {
        COMMANDS
            .iter()
            .filter(|x| !x.hidden)
            .map(|x| BotCommand {
                // Cut off the /
                command: x.callname[1..].to_string(),
                description: x.description.to_string(),
            })
            .collect()
    }
}

/// Set the reaction minimum of a chat. Expects exactly one positive integer argument.
///
/// # Errors
/// Errors without changing anything if there is no chat or the argument is bad.
pub async fn set_reaction_minimum<S: BoardStore>(
    store: &S,
    guild: Option<ChatId>,
    args: &[&str],
) -> Result<NonZeroU32, BoardError> {
    let guild = guild.ok_or(BoardError::UnresolvedGuild)?;

    let [arg] = args else {
        return Err(BoardError::InvalidArgument(
            "expected exactly one number.".to_string(),
        ));
    };
    let Ok(minimum) = arg.parse::<NonZeroU32>() else {
        return Err(BoardError::InvalidArgument(format!(
            "\"{}\" is not a positive whole number.",
            encode_text(arg)
        )));
    };

    store
        .upsert_guild_settings(
            guild,
            GuildSettingsUpdate {
                reaction_minimum: Some(minimum),
                ..Default::default()
            },
        )
        .await?;
    Ok(minimum)
}

/// A chat that a command refers to, as seen by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MentionedChat {
    pub id: ChatId,
    /// Whoever sent the command is an admin there.
    pub sender_is_admin: bool,
}

/// Set the forward channel of a chat. Expects exactly one argument referring to a chat,
/// which must be among `mentioned`: the chats the invoking message refers to
/// that could actually be resolved. The sender must administer that chat.
///
/// # Errors
/// Errors without changing anything if there is no chat or the argument is bad.
pub async fn set_forward_channel<S: BoardStore>(
    store: &S,
    guild: Option<ChatId>,
    args: &[&str],
    mentioned: &[MentionedChat],
) -> Result<ChatId, BoardError> {
    let guild = guild.ok_or(BoardError::UnresolvedGuild)?;

    let ([arg], Some(mentioned)) = (args, mentioned.first().copied()) else {
        return Err(BoardError::InvalidArgument(
            "expected exactly one chat, as @username or chat ID.".to_string(),
        ));
    };
    if !mentioned.sender_is_admin {
        return Err(BoardError::InvalidArgument(
            "you need to be an admin of the board chat.".to_string(),
        ));
    }
    let channel = mentioned.id;
    log::debug!("Setting forward channel of {} to {} ({})", guild.0, channel.0, arg);

    store
        .upsert_guild_settings(
            guild,
            GuildSettingsUpdate {
                forward_channel: Some(channel),
                ..Default::default()
            },
        )
        .await?;
    Ok(channel)
}

/// Turn the result of a command into something to tell the user.
fn reply_for<T>(result: Result<T, BoardError>, on_success: impl FnOnce(T) -> String) -> String {
    match result {
        Ok(x) => on_success(x),
        Err(e @ (BoardError::Persistence(_) | BoardError::ExternalCall(_))) => {
            log::error!("Command failed: {e}");
            "Something went wrong. Please try again later.".to_string()
        }
        Err(e) => e.to_string(),
    }
}

pub async fn run_set_minimum<S: BoardStore>(
    store: &S,
    guild: Option<ChatId>,
    args: &[&str],
) -> String {
    reply_for(set_reaction_minimum(store, guild, args).await, |minimum| {
        format!("Set reaction minimum to {}!", minimum)
    })
}

pub async fn run_set_channel<S: BoardStore>(
    store: &S,
    guild: Option<ChatId>,
    args: &[&str],
    mentioned: &[MentionedChat],
) -> String {
    reply_for(
        set_forward_channel(store, guild, args, mentioned).await,
        |channel| format!("Set board chat to <code>{}</code>!", channel.0),
    )
}

pub async fn run_show_settings<S: BoardStore>(store: &S, guild: Option<ChatId>) -> String {
    let result = match guild {
        Some(guild) => store.guild_settings(guild).await,
        None => Err(BoardError::UnresolvedGuild),
    };
    reply_for(result, |settings: GuildSettings| settings.to_string())
}

/// Find out if whoever sent this message is an admin of `chat`.
async fn sender_administers(bot: &Bot, message: &Message, chat: ChatId) -> bool {
    if let Some(sender_chat) = &message.sender_chat {
        // Posting as the chat itself.
        return sender_chat.id == chat;
    }
    let Some(user) = &message.from else {
        return false;
    };
    match bot.get_chat_member(chat, user.id).await {
        Ok(ChatMember { kind, .. }) => kind.is_privileged(),
        Err(e) => {
            log::debug!("Could not check {} in chat {}: {}", user.id, chat.0, e);
            false
        }
    }
}

/// Find chats the single parameter of this message refers to: either an `@username`
/// or a numeric chat ID. Only chats the bot can actually see are returned.
async fn resolve_mentioned_chats(
    bot: &Bot,
    message: &Message,
    params: &str,
) -> Vec<MentionedChat> {
    let mut recipients: Vec<Recipient> = Vec::new();

    if let Some(entities) = message.parse_entities() {
        for entity in &entities {
            if matches!(entity.kind(), MessageEntityKind::Mention) {
                recipients.push(Recipient::ChannelUsername(entity.text().to_string()));
            }
        }
    }

    if let Ok(id) = params.trim().parse::<i64>() {
        recipients.push(Recipient::Id(ChatId(id)));
    }

    let mut chats = Vec::new();
    for recipient in recipients {
        match bot.get_chat(recipient.clone()).await {
            Ok(chat) => chats.push(MentionedChat {
                id: chat.id,
                sender_is_admin: sender_administers(bot, message, chat.id).await,
            }),
            Err(e) => log::debug!("Could not resolve mentioned chat {recipient:?}: {e}"),
        }
    }
    chats
}

/// Returns `true` if a command was parsed and responded to.
pub async fn handle_command(
    bot: &Bot,
    me: &Me,
    message: &Message,
    database: &Database,
) -> Result<bool, RequestError> {
    let Some(text) = message.text_full() else {
        return Ok(false);
    };
    let Some((command, params)) = Command::parse(text, me.username()) else {
        return Ok(false);
    };

    log::debug!("Seen command {} in chat {}", command.callname, message.chat.id.0);

    let guild = (!message.chat.is_private()).then_some(message.chat.id);
    let args: Vec<&str> = params.split_whitespace().collect();

    let response = if command.admin_only
        && guild.is_some()
        && !is_sender_admin(bot, message).await?
    {
        "Only admins of this chat can change the board settings.".to_string()
    } else {
        match command.kind {
            CommandKind::Help => HELP.trim().to_string(),
            CommandKind::SetMinimum => run_set_minimum(database, guild, &args).await,
            CommandKind::SetChannel => {
                let mentioned = match args.as_slice() {
                    [_] => resolve_mentioned_chats(bot, message, params).await,
                    _ => Vec::new(),
                };
                run_set_channel(database, guild, &args, &mentioned).await
            }
            CommandKind::Settings => run_show_settings(database, guild).await,
        }
    };

    bot.send_message(message.chat.id, response)
        .reply_to(message.id)
        .parse_mode(ParseMode::Html)
        .await?;

    Ok(true)
}
