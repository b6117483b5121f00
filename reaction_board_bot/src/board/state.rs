use std::num::NonZeroU32;

use crate::types::MessageRef;

/// Where an original message currently stands with respect to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardState {
    NotOnBoard,
    /// Reposted, with this being the repost.
    OnBoard(MessageRef),
}

/// The one side effect needed to get from one [`BoardState`] to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardAction {
    Nothing,
    /// Post a new repost to the forward channel.
    Create,
    /// Refresh the existing repost.
    Edit(MessageRef),
    /// Take the existing repost down.
    Delete(MessageRef),
}

impl BoardState {
    /// Decide what should happen to a message now that it has `total` reactions
    /// and the chat wants at least `minimum`.
    ///
    /// Adding and removing reactions both end up here; only the resulting total matters.
    ///
    /// After [`BoardAction::Create`] the next state depends on the repost actually
    /// getting posted, so it's [`None`] there.
    pub fn decide(self, total: u64, minimum: NonZeroU32) -> (Option<BoardState>, BoardAction) {
        let qualifies = total >= u64::from(minimum.get());
        match (self, qualifies) {
            (BoardState::NotOnBoard, false) => (Some(BoardState::NotOnBoard), BoardAction::Nothing),
            (BoardState::NotOnBoard, true) => (None, BoardAction::Create),
            (BoardState::OnBoard(post), true) => {
                (Some(BoardState::OnBoard(post)), BoardAction::Edit(post))
            }
            (BoardState::OnBoard(post), false) => {
                (Some(BoardState::NotOnBoard), BoardAction::Delete(post))
            }
        }
    }

    pub fn is_on_board(&self) -> bool {
        matches!(self, BoardState::OnBoard(_))
    }
}

impl From<Option<MessageRef>> for BoardState {
    fn from(value: Option<MessageRef>) -> Self {
        match value {
            Some(post) => BoardState::OnBoard(post),
            None => BoardState::NotOnBoard,
        }
    }
}
