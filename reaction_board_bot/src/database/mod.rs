use std::{
    num::NonZeroU32,
    str::FromStr,
    sync::{atomic::AtomicBool, Arc, Weak},
};

use chrono::{DateTime, Utc};
pub use sqlx::Error;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Executor, Row, Sqlite, SqliteConnection,
};
use teloxide::types::{ChatId, Message, MessageId};
use tokio::sync::Mutex;

use crate::{
    board::BoardStore,
    error::BoardError,
    reactions::ReactionCounts,
    types::{GuildSettings, GuildSettingsUpdate, MessageRef},
    DEFAULT_REACTION_MINIMUM, MESSAGE_RETENTION_DAYS, PRUNE_INTERVAL,
};

type Pool = sqlx::Pool<Sqlite>;
const DB_PATH: &str = "sqlite:reaction_board.sqlite";
static WAS_CONSTRUCTED: AtomicBool = AtomicBool::new(false);

pub struct Database {
    pool: Pool,
    /// Held while changing reaction counts or pruning, so that those never
    /// interleave with each other.
    ledger_mutex: Mutex<()>,
}

impl Database {
    pub async fn new() -> Result<Arc<Database>, Error> {
        assert!(
            !WAS_CONSTRUCTED.swap(true, std::sync::atomic::Ordering::SeqCst),
            "Second database was constructed. This is not allowed."
        );

        if !Sqlite::database_exists(DB_PATH).await.unwrap_or(false) {
            Sqlite::create_database(DB_PATH).await?;
        }

        Ok(Arc::new(
            Self::open(SqliteConnectOptions::from_str(DB_PATH)?).await?,
        ))
    }

    async fn open(options: SqliteConnectOptions) -> Result<Database, Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(32)
            .connect_with(
                options
                    .pragma("cache_size", "-32768")
                    .busy_timeout(std::time::Duration::from_secs(600)),
            )
            .await?;

        Self::init(pool).await
    }

    /// A database in a file at `path`, created if missing.
    #[cfg(test)]
    pub async fn new_in_file(path: &std::path::Path) -> Result<Database, Error> {
        Self::open(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true),
        )
        .await
    }

    /// A fresh database that lives only in memory.
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Database, Error> {
        // Every connection to ":memory:" is its own database, so there must be
        // exactly one and it must never be closed.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::init(pool).await
    }

    async fn init(pool: Pool) -> Result<Database, Error> {
        // Do some init. Create the tables...

        // GUILD_SETTINGS:
        // chat_id (unique primary key, i64)
        // reaction_minimum (positive integer, NULL means default)
        // forward_channel (chat ID, NULL until set)
        pool.execute(sqlx::query(
            "
                CREATE TABLE IF NOT EXISTS guild_settings (
                    chat_id INTEGER PRIMARY KEY NOT NULL,
                    reaction_minimum INTEGER NULL,
                    forward_channel INTEGER NULL
                ) STRICT;",
        ))
        .await?;

        // BOARD_POSTS:
        // chat_id + message_id (primary key; the original message)
        // board_chat_id + board_message_id (the repost on the board)
        pool.execute(sqlx::query(
            "
                CREATE TABLE IF NOT EXISTS board_posts (
                    chat_id INTEGER NOT NULL,
                    message_id INTEGER NOT NULL,
                    board_chat_id INTEGER NOT NULL,
                    board_message_id INTEGER NOT NULL,
                    PRIMARY KEY (chat_id, message_id)
                ) STRICT;",
        ))
        .await?;

        // MESSAGES:
        // chat_id + message_id (primary key)
        // date (unix timestamp of when it was sent)
        // message (the whole message, serialized in JSON)
        pool.execute(sqlx::query(
            "
                CREATE TABLE IF NOT EXISTS messages (
                    chat_id INTEGER NOT NULL,
                    message_id INTEGER NOT NULL,
                    date INTEGER NOT NULL,
                    message TEXT NOT NULL,
                    PRIMARY KEY (chat_id, message_id)
                ) STRICT;",
        ))
        .await?;

        // REACTIONS:
        // chat_id + message_id + reaction (primary key)
        // count (how many of that reaction the message has)
        pool.execute(sqlx::query(
            "
                CREATE TABLE IF NOT EXISTS reactions (
                    chat_id INTEGER NOT NULL,
                    message_id INTEGER NOT NULL,
                    reaction TEXT NOT NULL,
                    count INTEGER NOT NULL,
                    PRIMARY KEY (chat_id, message_id, reaction)
                ) STRICT;",
        ))
        .await?;

        let _ = sqlx::query("CREATE INDEX messages_date ON messages(date);")
            .execute(&pool)
            .await;

        Ok(Database {
            pool,
            ledger_mutex: Mutex::new(()),
        })
    }

    /// Get the settings of a chat. Returns [`None`] if it never set anything.
    ///
    /// A stored minimum that isn't a positive integer is treated as unset.
    pub async fn get_guild_settings(&self, guild: ChatId) -> Result<Option<GuildSettings>, Error> {
        sqlx::query("SELECT reaction_minimum, forward_channel FROM guild_settings WHERE chat_id=?;")
            .bind(guild.0)
            .map(|row: SqliteRow| GuildSettings {
                reaction_minimum: row
                    .get::<Option<i64>, _>("reaction_minimum")
                    .and_then(|x| u32::try_from(x).ok())
                    .and_then(NonZeroU32::new)
                    .unwrap_or(DEFAULT_REACTION_MINIMUM),
                forward_channel: row.get::<Option<i64>, _>("forward_channel").map(ChatId),
            })
            .fetch_optional(&self.pool)
            .await
    }

    /// Creates the settings of a chat if they don't exist, and sets whatever
    /// fields of `update` are present.
    pub async fn set_guild_settings(
        &self,
        guild: ChatId,
        update: GuildSettingsUpdate,
    ) -> Result<(), Error> {
        let reaction_minimum = update.reaction_minimum.map(|x| i64::from(x.get()));
        let forward_channel = update.forward_channel.map(|x| x.0);
        sqlx::query(
            "INSERT INTO guild_settings(chat_id, reaction_minimum, forward_channel)
            VALUES (?, ?, ?)
        ON CONFLICT DO
            UPDATE SET reaction_minimum=COALESCE(?, reaction_minimum),
                forward_channel=COALESCE(?, forward_channel);",
        )
        .bind(guild.0)
        .bind(reaction_minimum)
        .bind(forward_channel)
        .bind(reaction_minimum)
        .bind(forward_channel)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get the board post made for this message, if any.
    pub async fn get_board_post(&self, original: MessageRef) -> Result<Option<MessageRef>, Error> {
        sqlx::query(
            "SELECT board_chat_id, board_message_id FROM board_posts
            WHERE chat_id=? AND message_id=?;",
        )
        .bind(original.chat.0)
        .bind(original.id.0)
        .map(|row: SqliteRow| {
            MessageRef::new(
                ChatId(row.get("board_chat_id")),
                MessageId(row.get("board_message_id")),
            )
        })
        .fetch_optional(&self.pool)
        .await
    }

    /// Record a board post for this message. Does nothing if it already has one.
    /// Returns `true` if the post was recorded.
    pub async fn add_board_post(
        &self,
        original: MessageRef,
        board_message: MessageRef,
    ) -> Result<bool, Error> {
        let result = sqlx::query(
            "INSERT INTO board_posts(chat_id, message_id, board_chat_id, board_message_id)
            VALUES (?, ?, ?, ?)
        ON CONFLICT DO NOTHING;",
        )
        .bind(original.chat.0)
        .bind(original.id.0)
        .bind(board_message.chat.0)
        .bind(board_message.id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn remove_board_post(&self, original: MessageRef) -> Result<(), Error> {
        sqlx::query("DELETE FROM board_posts WHERE chat_id=? AND message_id=?;")
            .bind(original.chat.0)
            .bind(original.id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remember a message so that reactions on it can be resolved later.
    /// Overwrites it if it's already there, which is what edits want.
    pub async fn cache_message(&self, message: &Message) -> Result<(), Error> {
        let serialized = serde_json::to_string(message).map_err(|e| Error::Encode(Box::new(e)))?;
        sqlx::query(
            "INSERT INTO messages(chat_id, message_id, date, message)
            VALUES (?, ?, ?, ?)
        ON CONFLICT DO
            UPDATE SET message=excluded.message;",
        )
        .bind(message.chat.id.0)
        .bind(message.id.0)
        .bind(message.date.timestamp())
        .bind(serialized)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a previously cached message.
    pub async fn get_cached_message(&self, message: MessageRef) -> Result<Option<Message>, Error> {
        let serialized: Option<String> =
            sqlx::query("SELECT message FROM messages WHERE chat_id=? AND message_id=?;")
                .bind(message.chat.0)
                .bind(message.id.0)
                .map(|row: SqliteRow| row.get("message"))
                .fetch_optional(&self.pool)
                .await?;

        serialized
            .map(|x| serde_json::from_str(&x).map_err(|e| Error::Decode(Box::new(e))))
            .transpose()
    }

    /// Forget cached messages sent before `before`, along with their reactions.
    /// Messages that are on the board are kept, so their posts can still follow them.
    /// Returns how many messages were forgotten.
    pub async fn forget_messages_before(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        // Will be dropped by the end of this function
        let _mutex = self.ledger_mutex.lock().await;

        // Every transaction here starts with a write. A transaction that reads first
        // and writes later can be refused with SQLITE_BUSY right away, busy timeout or not.
        let mut tx = self.pool.begin().await?;

        let forgotten = sqlx::query(
            "DELETE FROM messages WHERE date < ? AND NOT EXISTS (
                SELECT 1 FROM board_posts
                WHERE board_posts.chat_id = messages.chat_id
                    AND board_posts.message_id = messages.message_id
            );",
        )
        .bind(before.timestamp())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            "DELETE FROM reactions WHERE NOT EXISTS (
                SELECT 1 FROM messages
                WHERE messages.chat_id = reactions.chat_id
                    AND messages.message_id = reactions.message_id
            );",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(forgotten)
    }

    /// Get the known reaction counts of a message.
    pub async fn get_reactions(&self, message: MessageRef) -> Result<ReactionCounts, Error> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_reactions(&mut *conn, message).await
    }

    /// Apply one user's reaction change to a message and return its new reaction counts.
    ///
    /// Everything in `old` is taken back, then everything in `new` is added.
    /// Counts never go below zero, which can happen if the bot missed the
    /// original reaction.
    pub async fn apply_reaction_change(
        &self,
        message: MessageRef,
        old: &[String],
        new: &[String],
    ) -> Result<ReactionCounts, Error> {
        let _mutex = self.ledger_mutex.lock().await;
        let mut tx = self.pool.begin().await?;

        for reaction in old {
            Self::bump_reaction(&mut *tx, message, reaction, -1).await?;
        }
        for reaction in new {
            Self::bump_reaction(&mut *tx, message, reaction, 1).await?;
        }

        sqlx::query("DELETE FROM reactions WHERE chat_id=? AND message_id=? AND count <= 0;")
            .bind(message.chat.0)
            .bind(message.id.0)
            .execute(&mut *tx)
            .await?;

        let counts = Self::fetch_reactions(&mut *tx, message).await?;

        tx.commit().await?;
        Ok(counts)
    }

    /// Overwrite the reaction counts of a message entirely.
    pub async fn set_reactions(
        &self,
        message: MessageRef,
        counts: &ReactionCounts,
    ) -> Result<(), Error> {
        let _mutex = self.ledger_mutex.lock().await;
        let mut tx = self.pool.begin().await?;
        Self::store_reactions(&mut *tx, message, counts).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Add `delta` to the count of one reaction, clamping at zero.
    /// Leaves zero counts behind; callers clean those up.
    async fn bump_reaction(
        conn: &mut SqliteConnection,
        message: MessageRef,
        reaction: &str,
        delta: i64,
    ) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO reactions(chat_id, message_id, reaction, count)
            VALUES (?, ?, ?, MAX(?, 0))
        ON CONFLICT DO
            UPDATE SET count=MAX(count + ?, 0);",
        )
        .bind(message.chat.0)
        .bind(message.id.0)
        .bind(reaction)
        .bind(delta)
        .bind(delta)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn fetch_reactions(
        conn: &mut SqliteConnection,
        message: MessageRef,
    ) -> Result<ReactionCounts, Error> {
        let rows = sqlx::query(
            "SELECT reaction, count FROM reactions
            WHERE chat_id=? AND message_id=?;",
        )
        .bind(message.chat.0)
        .bind(message.id.0)
        .map(|row: SqliteRow| {
            (
                row.get::<String, _>("reaction"),
                // Negative counts shouldn't get here, but eh.
                u64::try_from(row.get::<i64, _>("count")).unwrap_or(0),
            )
        })
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn store_reactions(
        conn: &mut SqliteConnection,
        message: MessageRef,
        counts: &ReactionCounts,
    ) -> Result<(), Error> {
        sqlx::query("DELETE FROM reactions WHERE chat_id=? AND message_id=?;")
            .bind(message.chat.0)
            .bind(message.id.0)
            .execute(&mut *conn)
            .await?;

        for (reaction, count) in counts.iter() {
            sqlx::query(
                "INSERT INTO reactions(chat_id, message_id, reaction, count)
                VALUES (?, ?, ?, ?);",
            )
            .bind(message.chat.0)
            .bind(message.id.0)
            .bind(reaction)
            .bind(i64::try_from(count).unwrap_or(i64::MAX))
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }
}

impl BoardStore for Database {
    async fn guild_settings(&self, guild: ChatId) -> Result<GuildSettings, BoardError> {
        Ok(self.get_guild_settings(guild).await?.unwrap_or_default())
    }

    async fn upsert_guild_settings(
        &self,
        guild: ChatId,
        update: GuildSettingsUpdate,
    ) -> Result<(), BoardError> {
        Ok(self.set_guild_settings(guild, update).await?)
    }

    async fn board_mapping(&self, original: MessageRef) -> Result<Option<MessageRef>, BoardError> {
        Ok(self.get_board_post(original).await?)
    }

    async fn insert_board_mapping(
        &self,
        original: MessageRef,
        board_message: MessageRef,
    ) -> Result<bool, BoardError> {
        Ok(self.add_board_post(original, board_message).await?)
    }

    async fn delete_board_mapping(&self, original: MessageRef) -> Result<(), BoardError> {
        Ok(self.remove_board_post(original).await?)
    }
}

/// Periodically forget old cached messages, until the database is dropped.
pub async fn prune_spinloop(database: Weak<Database>) {
    use tokio::time::sleep;
    loop {
        let Some(database) = database.upgrade() else {
            // No more database!
            return;
        };

        let cutoff = Utc::now() - chrono::TimeDelta::days(MESSAGE_RETENTION_DAYS);
        match database.forget_messages_before(cutoff).await {
            Ok(0) => {}
            Ok(forgotten) => log::info!("Forgot {forgotten} old cached messages."),
            Err(e) => {
                // Database died!
                log::error!("Database error! {e:?}");
                return;
            }
        }

        // Drop the upgraded database.
        drop(database);
        sleep(PRUNE_INTERVAL).await;
    }
}
