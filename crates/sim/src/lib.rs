//! Keyframe Simulation Clock
//!
//! This crate owns the two values every other keyframe crate keys on:
//! authoritative time (`Tick`) and player identity (`PlayerId`).
//!
//! # Architecture Constraints
//!
//! Time in keyframe is NEVER read from the wall clock. The host simulation
//! loop advances a `SimClock` once per step, and every expiry comparison
//! (cutscene grace windows included) is made against that counter.
//!
//! - `Tick` is monotonically non-decreasing for the lifetime of a clock.
//! - `PlayerId` is a stable 128-bit identity; the nil value stands for
//!   "no player" in session tracking.

#![deny(unsafe_code)]

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

// ============================================================================
// Type Aliases
// ============================================================================

/// A single discrete simulation timestep; the atomic unit of game time.
pub type Tick = u64;

// ============================================================================
// Player Identity
// ============================================================================

/// Opaque, globally unique player identifier.
///
/// Stable across reconnects within one server lifetime. The nil identifier
/// (all zero bits) stands for "no player"; the Session Guard ignores it.
/// Codecs and the registry treat it as an ordinary value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// The reserved "no player" identifier.
    pub const NIL: PlayerId = PlayerId(Uuid::nil());

    /// Generate a fresh random identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Parse from a byte slice; `None` unless exactly 16 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        Uuid::from_slice(bytes).ok().map(Self)
    }

    /// Parse from the hyphenated textual form.
    pub fn parse_str(text: &str) -> Option<Self> {
        Uuid::parse_str(text).ok().map(Self)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }

    /// True for the reserved nil identifier.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl From<Uuid> for PlayerId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

// ============================================================================
// Clock Source
// ============================================================================

/// Supplier of authoritative time.
///
/// Implementations MUST be non-decreasing: two successive calls to `now()`
/// never observe time moving backwards.
pub trait ClockSource: Send + Sync {
    fn now(&self) -> Tick;
}

/// Host-driven simulation clock.
///
/// The simulation loop calls `advance()` once per step; every other thread
/// only reads. Starts at tick 0.
#[derive(Debug, Default)]
pub struct SimClock {
    tick: AtomicU64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one step. Returns the post-step tick.
    pub fn advance(&self) -> Tick {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl ClockSource for SimClock {
    fn now(&self) -> Tick {
        self.tick.load(Ordering::Acquire)
    }
}

/// Hand-driven clock for tests and offline tools.
///
/// `set` refuses to move time backwards so the non-decreasing contract of
/// `ClockSource` still holds.
#[derive(Debug, Default)]
pub struct ManualClock {
    tick: AtomicU64,
}

impl ManualClock {
    pub fn starting_at(tick: Tick) -> Self {
        Self {
            tick: AtomicU64::new(tick),
        }
    }

    /// Move to `tick` if it is not in the past. Returns the resulting tick.
    pub fn set(&self, tick: Tick) -> Tick {
        self.tick.fetch_max(tick, Ordering::AcqRel).max(tick)
    }

    pub fn advance_by(&self, ticks: Tick) -> Tick {
        self.tick.fetch_add(ticks, Ordering::AcqRel) + ticks
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> Tick {
        self.tick.load(Ordering::Acquire)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_clock_starts_at_zero() {
        let clock = SimClock::new();
        assert_eq!(clock.now(), 0);
    }

    #[test]
    fn test_sim_clock_advance_is_monotonic() {
        let clock = SimClock::new();
        let mut last = clock.now();
        for _ in 0..100 {
            let next = clock.advance();
            assert_eq!(next, last + 1);
            assert_eq!(clock.now(), next);
            last = next;
        }
    }

    #[test]
    fn test_manual_clock_never_moves_backwards() {
        let clock = ManualClock::starting_at(100);
        assert_eq!(clock.set(120), 120);
        assert_eq!(clock.set(110), 120);
        assert_eq!(clock.now(), 120);
        assert_eq!(clock.advance_by(5), 125);
    }

    #[test]
    fn test_player_id_byte_forms() {
        let id = PlayerId::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        let bytes = *id.as_bytes();
        assert_eq!(PlayerId::from_bytes(bytes), id);
        assert_eq!(PlayerId::from_slice(&bytes), Some(id));
        assert_eq!(PlayerId::from_slice(&bytes[..15]), None);
        assert_eq!(PlayerId::parse_str(&id.to_string()), Some(id));
        assert_eq!(id.as_u128(), 0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
    }

    #[test]
    fn test_player_id_nil_is_reserved() {
        assert!(PlayerId::NIL.is_nil());
        assert!(!PlayerId::new_random().is_nil());
        assert_ne!(PlayerId::new_random(), PlayerId::new_random());
    }
}
