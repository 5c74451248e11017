//! Which ballots a viewer may see.
//!
//! While a room is collecting, a viewer sees their own ballot and only the
//! fact that others have voted. Once revealed, everyone sees everything.

use crate::types::*;
use std::collections::HashMap;

pub fn visible_ballot(
    phase: VotingPhase,
    owner: &str,
    viewer: Option<&str>,
    vote: VoteValue,
) -> VisibleBallot {
    match phase {
        VotingPhase::Revealed => VisibleBallot::Value(vote),
        VotingPhase::Collecting if viewer == Some(owner) => VisibleBallot::Value(vote),
        VotingPhase::Collecting => VisibleBallot::Hidden,
    }
}

pub fn visible_ballots(room: &Room, viewer: Option<&str>) -> HashMap<ParticipantId, VisibleBallot> {
    room.ballots
        .iter()
        .map(|(owner, vote)| (owner.clone(), visible_ballot(room.phase, owner, viewer, *vote)))
        .collect()
}

impl Room {
    /// Snapshot of this room as `viewer` is allowed to see it
    pub fn view_for(&self, viewer: Option<&str>) -> RoomView {
        RoomView {
            code: self.code.clone(),
            name: self.name.clone(),
            participants: self.participants.clone(),
            phase: self.phase,
            votes: visible_ballots(self, viewer),
            created_at: self.created_at,
        }
    }
}
