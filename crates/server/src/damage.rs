//! Damage interception.
//!
//! Called synchronously on every damage-causing event before any of its
//! effects are applied. When the target is protected the event is dropped
//! whole; `dispatch` never runs the apply callback for a suppressed event.

use std::sync::Arc;

use keyframe_sim::{PlayerId, Tick};
use tracing::trace;

use crate::config::GuardSettings;
use crate::session_guard::SessionGuard;

/// What caused a damage event. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageCause {
    Melee,
    Projectile,
    Explosion,
    Fall,
    Environment,
    Other,
}

/// A damage-causing event aimed at one player.
#[derive(Debug, Clone, PartialEq)]
pub struct DamageEvent {
    pub target: PlayerId,
    pub amount: f32,
    pub cause: DamageCause,
}

/// Outcome of interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageDecision {
    Allow,
    Suppress,
}

impl DamageDecision {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppress)
    }
}

/// Glue between the damage pipeline and the Session Guard.
#[derive(Debug, Clone)]
pub struct DamageInterceptor {
    guard: Arc<SessionGuard>,
    settings: Arc<GuardSettings>,
}

impl DamageInterceptor {
    pub fn new(guard: Arc<SessionGuard>, settings: Arc<GuardSettings>) -> Self {
        Self { guard, settings }
    }

    /// Decide whether `event` may be applied at `now`.
    ///
    /// With protection disabled the guard is not consulted at all.
    pub fn intercept(&self, event: &DamageEvent, now: Tick) -> DamageDecision {
        if !self.settings.invulnerable() {
            return DamageDecision::Allow;
        }
        if self.guard.is_protected(event.target, now) {
            trace!(target_player = %event.target, cause = ?event.cause, amount = event.amount, now, "damage suppressed");
            DamageDecision::Suppress
        } else {
            DamageDecision::Allow
        }
    }

    /// Intercept, then run `apply` only if the event is allowed.
    pub fn dispatch<F>(&self, event: DamageEvent, now: Tick, apply: F) -> DamageDecision
    where
        F: FnOnce(DamageEvent),
    {
        let decision = self.intercept(&event, now);
        if decision == DamageDecision::Allow {
            apply(event);
        }
        decision
    }
}
