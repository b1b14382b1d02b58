//! Cutscene protection configuration.
//!
//! Two tunables drive the Session Guard:
//! - `cutscene_invulnerable`: master switch for the whole feature.
//! - `cutscene_post_grace_ticks`: grace window after a cutscene stops
//!   (`0` disables grace).
//!
//! `GuardConfig` is the serializable form loaded from TOML. `GuardSettings`
//! holds the live values; the guard reads the grace duration from it at the
//! moment a cutscene stops, so a reload applies to the next stop event.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use keyframe_sim::Tick;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ServerError, ServerResult};

/// Default grace window: one second at the default 20 Hz tick rate.
pub const DEFAULT_POST_GRACE_TICKS: Tick = 20;

/// Upper bound on the grace window (five minutes at 20 Hz). Anything larger
/// amounts to granting standing immunity and is rejected at load time.
pub const MAX_POST_GRACE_TICKS: Tick = 6000;

/// Serializable protection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub cutscene_invulnerable: bool,
    pub cutscene_post_grace_ticks: Tick,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            cutscene_invulnerable: true,
            cutscene_post_grace_ticks: DEFAULT_POST_GRACE_TICKS,
        }
    }
}

impl GuardConfig {
    /// Parse and validate a TOML document. Missing keys take defaults.
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| ServerError::Config(format!("failed to parse guard config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file on disk.
    pub fn from_file(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.cutscene_post_grace_ticks > MAX_POST_GRACE_TICKS {
            return Err(ServerError::Config(format!(
                "cutscene_post_grace_ticks must be at most {MAX_POST_GRACE_TICKS}, got {}",
                self.cutscene_post_grace_ticks
            )));
        }
        Ok(())
    }
}

/// Live, shareable protection settings.
#[derive(Debug)]
pub struct GuardSettings {
    invulnerable: AtomicBool,
    post_grace_ticks: AtomicU64,
}

impl GuardSettings {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            invulnerable: AtomicBool::new(config.cutscene_invulnerable),
            post_grace_ticks: AtomicU64::new(config.cutscene_post_grace_ticks),
        }
    }

    /// Replace the live values after validating them.
    pub fn apply(&self, config: GuardConfig) -> ServerResult<()> {
        config.validate()?;
        self.invulnerable
            .store(config.cutscene_invulnerable, Ordering::Release);
        self.post_grace_ticks
            .store(config.cutscene_post_grace_ticks, Ordering::Release);
        info!(
            invulnerable = config.cutscene_invulnerable,
            post_grace_ticks = config.cutscene_post_grace_ticks,
            "cutscene guard settings applied"
        );
        Ok(())
    }

    /// Whether cutscene protection is enabled at all.
    pub fn invulnerable(&self) -> bool {
        self.invulnerable.load(Ordering::Acquire)
    }

    pub fn post_grace_ticks(&self) -> Tick {
        self.post_grace_ticks.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> GuardConfig {
        GuardConfig {
            cutscene_invulnerable: self.invulnerable(),
            cutscene_post_grace_ticks: self.post_grace_ticks(),
        }
    }
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_documented() {
        let config = GuardConfig::default();
        assert!(config.cutscene_invulnerable);
        assert_eq!(config.cutscene_post_grace_ticks, DEFAULT_POST_GRACE_TICKS);
    }

    #[test]
    fn test_parse_full_document() {
        let config = GuardConfig::from_toml_str(
            "cutscene_invulnerable = false\ncutscene_post_grace_ticks = 0\n",
        )
        .unwrap();
        assert!(!config.cutscene_invulnerable);
        assert_eq!(config.cutscene_post_grace_ticks, 0);
    }

    #[test]
    fn test_parse_missing_keys_use_defaults() {
        let config = GuardConfig::from_toml_str("cutscene_post_grace_ticks = 40").unwrap();
        assert!(config.cutscene_invulnerable);
        assert_eq!(config.cutscene_post_grace_ticks, 40);

        assert_eq!(GuardConfig::from_toml_str("").unwrap(), GuardConfig::default());
    }

    #[test]
    fn test_negative_grace_rejected() {
        let err = GuardConfig::from_toml_str("cutscene_post_grace_ticks = -5").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn test_oversized_grace_rejected() {
        let text = format!("cutscene_post_grace_ticks = {}", MAX_POST_GRACE_TICKS + 1);
        assert!(GuardConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = GuardConfig::from_file(Path::new("/nonexistent/keyframe.toml")).unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn test_settings_apply_is_visible() {
        let settings = GuardSettings::default();
        settings
            .apply(GuardConfig {
                cutscene_invulnerable: false,
                cutscene_post_grace_ticks: 3,
            })
            .unwrap();
        assert!(!settings.invulnerable());
        assert_eq!(settings.post_grace_ticks(), 3);
    }

    #[test]
    fn test_settings_apply_rejects_invalid_and_keeps_old() {
        let settings = GuardSettings::default();
        let bad = GuardConfig {
            cutscene_invulnerable: false,
            cutscene_post_grace_ticks: MAX_POST_GRACE_TICKS + 1,
        };
        assert!(settings.apply(bad).is_err());
        assert_eq!(settings.snapshot(), GuardConfig::default());
    }
}
