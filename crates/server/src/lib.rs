//! Keyframe Server
//!
//! Server-authoritative cutscene protection and the camera-path registry.
//! It owns:
//! - The Session Guard: per-player `Idle` / `Playing` / `Grace` state
//! - Damage interception consulting the guard on every damage event
//! - The Resource Registry of versioned camera paths
//! - Preview and listing of paths for clients
//!
//! # Architecture
//!
//! Every component is an explicitly constructed, owned instance shared by
//! `Arc`; there is no ambient global state. All operations are synchronous,
//! bounded, in-memory and safe to call from any thread. Nothing blocks on
//! I/O or waits on a timer: grace windows expire lazily against the
//! authoritative `Tick` supplied by the clock.

#![deny(unsafe_code)]

pub mod config;
pub mod damage;
pub mod error;
pub mod preview;
pub mod registry;
pub mod session_guard;

use std::sync::Arc;

use keyframe_sim::{ClockSource, PlayerId, Tick};
use keyframe_wire::{CutsceneStateProto, PathListProto, ResourceRecord};
use prost::Message;
use tracing::info;

pub use config::{GuardConfig, GuardSettings};
pub use damage::{DamageCause, DamageDecision, DamageEvent, DamageInterceptor};
pub use error::{ServerError, ServerResult};
pub use preview::{PreviewService, PreviewSink};
pub use registry::{Geometry, ResourceRegistry};
pub use session_guard::{SessionGuard, SessionState};

// ============================================================================
// Server
// ============================================================================

/// Composition root wiring clock, settings, guard, registry and preview.
pub struct Server<S> {
    clock: Arc<dyn ClockSource>,
    settings: Arc<GuardSettings>,
    guard: Arc<SessionGuard>,
    registry: Arc<ResourceRegistry>,
    interceptor: DamageInterceptor,
    preview: PreviewService<S>,
}

impl<S: PreviewSink> Server<S> {
    /// Create a server with empty session and registry maps.
    pub fn new(config: GuardConfig, clock: Arc<dyn ClockSource>, sink: S) -> ServerResult<Self> {
        config.validate()?;
        let settings = Arc::new(GuardSettings::new(config));
        let guard = Arc::new(SessionGuard::new(Arc::clone(&settings)));
        let registry = Arc::new(ResourceRegistry::new());
        let interceptor = DamageInterceptor::new(Arc::clone(&guard), Arc::clone(&settings));
        let preview = PreviewService::new(Arc::clone(&registry), sink);

        info!(
            invulnerable = config.cutscene_invulnerable,
            post_grace_ticks = config.cutscene_post_grace_ticks,
            "keyframe server started"
        );

        Ok(Self {
            clock,
            settings,
            guard,
            registry,
            interceptor,
            preview,
        })
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &Arc<GuardSettings> {
        &self.settings
    }

    pub fn preview_service(&self) -> &PreviewService<S> {
        &self.preview
    }

    /// Swap in new protection settings. Takes effect for the next stop
    /// event and the next damage event.
    pub fn reload_config(&self, config: GuardConfig) -> ServerResult<()> {
        self.settings.apply(config)
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Apply a `CutsceneStateProto` received on `player`'s connection.
    pub fn handle_cutscene_state(&self, player: PlayerId, payload: &[u8]) -> ServerResult<()> {
        let message = CutsceneStateProto::decode(payload)?;
        self.set_cutscene_playing(player, message.is_playing);
        Ok(())
    }

    pub fn set_cutscene_playing(&self, player: PlayerId, is_playing: bool) {
        self.guard
            .on_cutscene_state_changed(player, is_playing, self.clock.now());
    }

    /// Call exactly once per logout.
    pub fn handle_disconnect(&self, player: PlayerId) {
        self.guard.on_player_disconnected(player);
    }

    pub fn is_protected(&self, player: PlayerId) -> bool {
        self.settings.invulnerable() && self.guard.is_protected(player, self.clock.now())
    }

    // ------------------------------------------------------------------
    // Damage
    // ------------------------------------------------------------------

    /// Run `event` through interception; `apply` runs only when allowed.
    pub fn handle_damage<F>(&self, event: DamageEvent, apply: F) -> DamageDecision
    where
        F: FnOnce(DamageEvent),
    {
        self.interceptor.dispatch(event, self.clock.now(), apply)
    }

    // ------------------------------------------------------------------
    // Camera paths
    // ------------------------------------------------------------------

    pub fn publish_path(
        &self,
        id: &str,
        modifier: PlayerId,
        geometry: impl Into<Geometry>,
    ) -> ServerResult<ResourceRecord> {
        self.registry.publish_with_geometry(id, modifier, geometry)
    }

    pub fn preview_path(&self, viewer: PlayerId, id: &str) -> ServerResult<ResourceRecord> {
        self.preview.preview(viewer, id)
    }

    pub fn list_paths(&self) -> PathListProto {
        self.preview.list()
    }
}

// ============================================================================
// Tests
// ============================================================================
