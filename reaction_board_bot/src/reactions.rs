use std::collections::BTreeMap;

use teloxide::types::ReactionType;

/// Per-reaction counts on a single message.
///
/// Keys are opaque reaction identifiers, see [`reaction_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionCounts(BTreeMap<String, u64>);

impl ReactionCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total amount of reactions on the message.
    ///
    /// This is the sum over every reaction kind, not the count of the most popular one.
    /// Everything deciding board placement goes through here.
    pub fn total(&self) -> u64 {
        self.0.values().fold(0u64, |acc, x| acc.saturating_add(*x))
    }

    pub fn get(&self, reaction: &str) -> u64 {
        self.0.get(reaction).copied().unwrap_or(0)
    }

    /// Set the count of one reaction. Zero removes the entry.
    pub fn set(&mut self, reaction: impl Into<String>, count: u64) {
        let reaction = reaction.into();
        if count == 0 {
            self.0.remove(&reaction);
        } else {
            self.0.insert(reaction, count);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for ReactionCounts {
    fn from_iter<T: IntoIterator<Item = (S, u64)>>(iter: T) -> Self {
        let mut counts = Self::new();
        for (reaction, count) in iter {
            let reaction = reaction.into();
            let count = counts.get(&reaction).saturating_add(count);
            counts.set(reaction, count);
        }
        counts
    }
}

/// Turn a Telegram reaction into a string usable as a key in [`ReactionCounts`].
///
/// Emoji reactions are just the emoji. Anything else (custom emoji, paid stars...)
/// is keyed by its JSON form, which is stable and distinct per reaction.
pub fn reaction_key(reaction: &ReactionType) -> Option<String> {
    match reaction {
        ReactionType::Emoji { emoji } => Some(emoji.clone()),
        other => serde_json::to_string(other).ok(),
    }
}
