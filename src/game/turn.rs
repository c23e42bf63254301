//! Turn-Based Mode
//!
//! In turn-based mode one faction acts at a time. The turn passes when the
//! countdown expires or the active side completes a move. In real-time mode
//! this state is inert.

use serde::{Serialize, Deserialize};

use crate::game::cell::Faction;

/// Turn bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TurnState {
    /// Turn-based mode is on.
    pub enabled: bool,
    /// Faction whose turn it is (meaningful only when enabled).
    pub active: Faction,
    /// Milliseconds left in the current turn.
    pub remaining_ms: u64,
    /// The active side has moved this turn.
    pub move_made: bool,
}

impl TurnState {
    /// Turn mode on, `first` to move, full timer.
    pub fn enable(&mut self, first: Faction, duration_ms: u64) {
        self.enabled = true;
        self.active = first;
        self.remaining_ms = duration_ms;
        self.move_made = false;
    }

    /// Back to real time.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.remaining_ms = 0;
        self.move_made = false;
    }

    /// Pass the turn and reset the timer. Returns the new active faction.
    pub fn switch(&mut self, duration_ms: u64) -> Faction {
        self.active = self.active.opponent();
        self.remaining_ms = duration_ms;
        self.move_made = false;
        self.active
    }

    /// Count the timer down by `dt_ms`. Returns true once it has expired.
    pub fn advance(&mut self, dt_ms: u64) -> bool {
        if !self.enabled {
            return false;
        }
        self.remaining_ms = self.remaining_ms.saturating_sub(dt_ms);
        self.remaining_ms == 0
    }

    /// True if `faction` may act now.
    pub fn may_act(&self, faction: Faction) -> bool {
        !self.enabled || self.active == faction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_time_allows_everyone() {
        let turn = TurnState::default();
        assert!(turn.may_act(Faction::Player));
        assert!(turn.may_act(Faction::Enemy));
    }

    #[test]
    fn test_timer_expiry() {
        let mut turn = TurnState::default();
        turn.enable(Faction::Player, 100);
        assert!(!turn.may_act(Faction::Enemy));
        assert!(!turn.advance(60));
        assert!(turn.advance(60));
        assert_eq!(turn.switch(100), Faction::Enemy);
        assert_eq!(turn.remaining_ms, 100);
        assert!(turn.may_act(Faction::Enemy));
    }

    #[test]
    fn test_disabled_timer_never_expires() {
        let mut turn = TurnState::default();
        assert!(!turn.advance(1_000_000));
        turn.enable(Faction::Enemy, 10);
        turn.disable();
        assert!(!turn.advance(20));
    }
}
