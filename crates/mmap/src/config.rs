//! Configuration for nebula-mmap
//!
//! Defaults suit most processes. `MmapConfig::from_env` lets deployments
//! change the allocation threshold, the anonymous-mapping source and the
//! tracking registry without a rebuild.

use std::sync::OnceLock;

use tracing::{debug, error};

use crate::error::{MemoryError, MemoryResult};
use crate::syscalls::Capabilities;

/// Default size at which native buffers switch from malloc to mmap
pub const DEFAULT_MMAP_THRESHOLD: usize = 256 * 1024;

/// Environment variable overriding [`NativeBufferConfig::mmap_threshold`]
pub const ENV_THRESHOLD: &str = "NEBULA_MMAP_THRESHOLD";
/// Environment variable forcing `/dev/zero` for anonymous mappings
pub const ENV_DEV_ZERO: &str = "NEBULA_MMAP_DEV_ZERO";
/// Environment variable enabling the mapping tracking registry
pub const ENV_TRACKING: &str = "NEBULA_MMAP_TRACKING";

// ============================================================================
// Native Buffer Configuration
// ============================================================================

/// Source of zero-filled pages for large native buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnonymousSource {
    /// `MAP_ANONYMOUS`, or `/dev/zero` where the flag is missing
    #[default]
    Flag,
    /// Always map `/dev/zero` privately
    DevZero,
}

/// Allocation policy of [`NativeBuffer`](crate::NativeBuffer)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeBufferConfig {
    /// Requests of at least this many bytes use an anonymous mapping
    pub mmap_threshold: usize,
    /// How anonymous mappings are created
    pub anonymous_source: AnonymousSource,
    /// Platform capabilities; overridable for tests
    pub capabilities: Capabilities,
}

impl Default for NativeBufferConfig {
    fn default() -> Self {
        Self {
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
            anonymous_source: AnonymousSource::Flag,
            capabilities: Capabilities::current(),
        }
    }
}

impl NativeBufferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mmap_threshold(mut self, threshold: usize) -> Self {
        self.mmap_threshold = threshold;
        self
    }

    pub fn with_anonymous_source(mut self, source: AnonymousSource) -> Self {
        self.anonymous_source = source;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Whether a region of `len` bytes is served by a mapping
    #[inline]
    pub fn uses_mmap(&self, len: usize) -> bool {
        len >= self.mmap_threshold
    }

    /// Whether anonymous mappings go through `/dev/zero`
    pub fn uses_dev_zero(&self) -> bool {
        self.anonymous_source == AnonymousSource::DevZero || !self.capabilities.anonymous_mapping
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if self.mmap_threshold == 0 {
            return Err(MemoryError::invalid_config("mmap_threshold must be positive"));
        }
        if !self.capabilities.page_size.is_power_of_two() {
            return Err(MemoryError::invalid_config(format!(
                "page size {} is not a power of two",
                self.capabilities.page_size
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Crate Configuration
// ============================================================================

/// Process-wide configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MmapConfig {
    /// Defaults for native buffers created without an explicit config
    pub native: NativeBufferConfig,
    /// Initial state of the mapping tracking registry
    pub tracking_enabled: bool,
}

impl MmapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_native(mut self, native: NativeBufferConfig) -> Self {
        self.native = native;
        self
    }

    pub fn with_tracking(mut self, enabled: bool) -> Self {
        self.tracking_enabled = enabled;
        self
    }

    /// Read overrides from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`; unparsable values keep the default
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_THRESHOLD) {
            match raw.trim().parse::<usize>() {
                Ok(threshold) if threshold > 0 => config.native.mmap_threshold = threshold,
                _ => error!(
                    variable = ENV_THRESHOLD,
                    value = %raw,
                    default = DEFAULT_MMAP_THRESHOLD,
                    "invalid mmap threshold, keeping default"
                ),
            }
        }
        if lookup(ENV_DEV_ZERO).is_some_and(|v| parse_flag(&v)) {
            config.native.anonymous_source = AnonymousSource::DevZero;
        }
        if lookup(ENV_TRACKING).is_some_and(|v| parse_flag(&v)) {
            config.tracking_enabled = true;
        }

        debug!(
            mmap_threshold = config.native.mmap_threshold,
            dev_zero = config.native.uses_dev_zero(),
            tracking = config.tracking_enabled,
            "loaded mmap configuration"
        );
        config
    }

    /// Configuration resolved once from the environment
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<MmapConfig> = OnceLock::new();
        GLOBAL.get_or_init(Self::from_env)
    }

    pub fn validate(&self) -> MemoryResult<()> {
        self.native.validate()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes")
}
