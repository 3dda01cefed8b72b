#![forbid(unsafe_code)]

//! Observation settings.
//!
//! [`ObservationConfig`] is plain data: build it in code, or with the
//! `config` feature load it from TOML:
//!
//! ```ignore
//! let config = ObservationConfig::from_toml_str(r#"
//!     proxy_strategy = false
//!
//!     [dirty_check]
//!     ticks_per_check = 2
//!     warn = true
//! "#)?;
//! let locator = ObserverLocator::with_config(&config);
//! ```

use crate::flags::LifecycleFlags;

/// Default number of external ticks between two dirty-check passes.
pub const DEFAULT_TICKS_PER_CHECK: u32 = 6;

/// Tuning for the [`DirtyChecker`](crate::DirtyChecker) fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct DirtyCheckSettings {
    /// Ticks between two passes. Zero is treated as one.
    pub ticks_per_check: u32,
    /// Skip every pass; dirty-checked properties never notify.
    pub disabled: bool,
    /// Log a warning for every property that falls back to dirty checking.
    pub warn: bool,
    /// Refuse to create dirty-checked properties at all.
    pub throw: bool,
}

impl Default for DirtyCheckSettings {
    fn default() -> Self {
        Self {
            ticks_per_check: DEFAULT_TICKS_PER_CHECK,
            disabled: false,
            warn: false,
            throw: false,
        }
    }
}

impl DirtyCheckSettings {
    /// Settings that check on every tick.
    #[must_use]
    pub fn every_tick() -> Self {
        Self {
            ticks_per_check: 1,
            ..Self::default()
        }
    }

    pub(crate) fn effective_ticks(&self) -> u32 {
        self.ticks_per_check.max(1)
    }
}

/// Per-getter hints for computed observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ComputedOverrides {
    /// Evaluate once and never track dependencies.
    pub is_static: bool,
    /// Track dependencies even when the property also has a setter.
    pub volatile: bool,
}

/// Top-level observation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct ObservationConfig {
    /// Settings for the dirty-check fallback.
    pub dirty_check: DirtyCheckSettings,
    /// Default to whole-object proxy observation.
    pub proxy_strategy: bool,
}

impl ObservationConfig {
    /// Flags every lookup made under this configuration should start from.
    #[must_use]
    pub fn base_flags(&self) -> LifecycleFlags {
        if self.proxy_strategy {
            LifecycleFlags::PROXY_STRATEGY
        } else {
            LifecycleFlags::empty()
        }
    }

    /// Parse a configuration from a TOML document. Missing keys keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns the TOML error when the document is malformed or a key has the
    /// wrong type.
    #[cfg(feature = "config")]
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}
