//! Per-player cutscene protection state.
//!
//! State machine (no terminal state; only disconnect removes an entry):
//!
//! ```text
//!   Idle ──start──▶ Playing ──stop (G > 0)──▶ Grace(now + G) ──now > expiry──▶ Idle
//!     ▲                │                          │
//!     └──stop (G == 0)─┘                          └──start──▶ Playing
//! ```
//!
//! - A missing entry is `Idle`. Entries that settle to `Idle` are removed,
//!   so the map only ever holds players that are protected right now.
//! - Grace expiry is lazy: `is_protected` compares against the supplied
//!   tick and drops the entry once `now > expiry`. No timer thread exists.
//! - The expiry tick itself is still protected (inclusive boundary).
//! - All operations on one player are serialized by the map shard that owns
//!   its key; players in different shards never contend.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use keyframe_sim::{PlayerId, Tick};
use tracing::{debug, warn};

use crate::config::GuardSettings;

/// Protection state of one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No cutscene, no grace window.
    Idle,
    /// Cutscene playing; damage fully suppressed.
    Playing,
    /// Cutscene ended; damage suppressed while `now <= expires_at`.
    Grace { expires_at: Tick },
}

impl SessionState {
    fn protects_at(self, now: Tick) -> bool {
        match self {
            Self::Idle => false,
            Self::Playing => true,
            Self::Grace { expires_at } => now <= expires_at,
        }
    }
}

/// Authoritative answer to "is this player protected from damage?".
#[derive(Debug)]
pub struct SessionGuard {
    sessions: DashMap<PlayerId, SessionState>,
    settings: Arc<GuardSettings>,
}

impl SessionGuard {
    pub fn new(settings: Arc<GuardSettings>) -> Self {
        Self {
            sessions: DashMap::new(),
            settings,
        }
    }

    /// React to a cutscene starting or stopping for `player`.
    ///
    /// Start is idempotent and discards any pending grace window. Stop is
    /// accepted from any state and (re)computes the grace window from `now`
    /// using the grace duration configured at this moment.
    ///
    /// The nil player is ignored.
    pub fn on_cutscene_state_changed(&self, player: PlayerId, is_playing: bool, now: Tick) {
        if player.is_nil() {
            warn!("ignoring cutscene state change for nil player");
            return;
        }

        if is_playing {
            let previous = self.sessions.insert(player, SessionState::Playing);
            debug!(%player, ?previous, now, "cutscene started");
            return;
        }

        let grace = self.settings.post_grace_ticks();
        if grace > 0 {
            let expires_at = now.saturating_add(grace);
            let previous = self
                .sessions
                .insert(player, SessionState::Grace { expires_at });
            debug!(%player, ?previous, now, expires_at, "cutscene stopped, grace window opened");
        } else {
            let previous = self.sessions.remove(&player).map(|(_, state)| state);
            debug!(%player, ?previous, now, "cutscene stopped, no grace window");
        }
    }

    /// Whether `player` is protected at `now`.
    ///
    /// An expired grace window is removed as a side effect. Unknown and nil
    /// players are never protected.
    pub fn is_protected(&self, player: PlayerId, now: Tick) -> bool {
        self.observe(player, now) != SessionState::Idle
    }

    /// Current state of `player`, applying lazy expiry first.
    pub fn state(&self, player: PlayerId, now: Tick) -> SessionState {
        self.observe(player, now)
    }

    /// Resolve the state at `now` from a single locked read of the entry.
    fn observe(&self, player: PlayerId, now: Tick) -> SessionState {
        if player.is_nil() {
            return SessionState::Idle;
        }

        // Fast path under the shard read lock. The state is copied out so
        // the guard is released before the write lock below is taken.
        let Some(state) = self.sessions.get(&player).map(|entry| *entry.value()) else {
            return SessionState::Idle;
        };
        if state.protects_at(now) {
            return state;
        }

        // Re-read under the write lock: a concurrent start may have
        // replaced the expired window since the read above.
        match self.sessions.entry(player) {
            Entry::Occupied(occupied) => {
                let current = *occupied.get();
                if current.protects_at(now) {
                    current
                } else {
                    occupied.remove();
                    debug!(%player, now, "grace window expired");
                    SessionState::Idle
                }
            }
            Entry::Vacant(_) => SessionState::Idle,
        }
    }

    /// Forget everything about `player`. Idempotent.
    pub fn on_player_disconnected(&self, player: PlayerId) {
        if let Some((_, state)) = self.sessions.remove(&player) {
            debug!(%player, ?state, "player disconnected, session state dropped");
        }
    }

    /// Number of players currently holding a `Playing` or `Grace` entry
    /// (including grace windows not yet lazily expired).
    pub fn tracked_players(&self) -> usize {
        self.sessions.len()
    }
}
