//! Configuration Module
//!
//! Cache construction parameters, eviction/refresh mode enums, and loading
//! from environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

// == Size Eviction Policy ==
/// Chooses which entry to drop when the cache grows past `max_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeEvictionPolicy {
    /// Drop the entry computed longest ago
    ByComputedRecency,
    /// Drop the entry accessed longest ago
    ByAccessRecency,
    /// Drop the least accessed entry, never the one just accessed
    #[default]
    ByAccessFrequency,
}

impl SizeEvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeEvictionPolicy::ByComputedRecency => "by-computed-recency",
            SizeEvictionPolicy::ByAccessRecency => "by-access-recency",
            SizeEvictionPolicy::ByAccessFrequency => "by-access-frequency",
        }
    }
}

impl fmt::Display for SizeEvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeEvictionPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "by-computed-recency" | "computed-time-based" => Ok(Self::ByComputedRecency),
            "by-access-recency" | "accessed-time-based" => Ok(Self::ByAccessRecency),
            "by-access-frequency" | "access-count-based" => Ok(Self::ByAccessFrequency),
            _ => Err(CacheError::config(format!(
                "unknown size eviction policy '{}'",
                s
            ))),
        }
    }
}

// == Refresh Mode ==
/// How stale entries get recomputed in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshMode {
    None,
    /// A sweep is launched after every `get`
    #[default]
    Coupled,
    /// A periodic task sweeps every `refresh_period`
    Independent,
}

impl RefreshMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshMode::None => "none",
            RefreshMode::Coupled => "coupled",
            RefreshMode::Independent => "independent",
        }
    }
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "coupled" => Ok(Self::Coupled),
            "independent" => Ok(Self::Independent),
            _ => Err(CacheError::config(format!("unknown refresh mode '{}'", s))),
        }
    }
}

// == Cache Config ==
/// Cache construction parameters.
///
/// Durations left as `None` (or set to zero) disable the matching rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries kept, at least 1
    pub max_size: usize,
    /// Which entry to drop when `max_size` is exceeded
    pub size_eviction_policy: SizeEvictionPolicy,
    /// Drop entries computed longer ago than this
    pub computed_ttl: Option<Duration>,
    /// Drop entries not accessed for longer than this
    pub access_ttl: Option<Duration>,
    /// Recompute entries computed longer ago than this
    pub refresh_ttl: Option<Duration>,
    /// How refresh sweeps are driven
    pub refresh_mode: RefreshMode,
    /// Interval between sweeps in independent mode
    pub refresh_period: Option<Duration>,
    /// Emit per-call timing diagnostics
    pub debug_logging: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            size_eviction_policy: SizeEvictionPolicy::ByAccessFrequency,
            computed_ttl: None,
            access_ttl: None,
            refresh_ttl: None,
            refresh_mode: RefreshMode::Coupled,
            refresh_period: None,
            debug_logging: false,
        }
    }
}

impl CacheConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_size_eviction_policy(mut self, policy: SizeEvictionPolicy) -> Self {
        self.size_eviction_policy = policy;
        self
    }

    pub fn with_computed_ttl(mut self, ttl: Duration) -> Self {
        self.computed_ttl = Some(ttl);
        self
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = Some(ttl);
        self
    }

    /// Enables refresh of entries older than `ttl` using `mode`.
    pub fn with_refresh(mut self, ttl: Duration, mode: RefreshMode) -> Self {
        self.refresh_ttl = Some(ttl);
        self.refresh_mode = mode;
        self
    }

    pub fn with_refresh_period(mut self, period: Duration) -> Self {
        self.refresh_period = Some(period);
        self
    }

    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    /// Computed-age limit, if enabled.
    pub fn computed_ttl(&self) -> Option<Duration> {
        enabled(self.computed_ttl)
    }

    /// Access-age limit, if enabled.
    pub fn access_ttl(&self) -> Option<Duration> {
        enabled(self.access_ttl)
    }

    /// Staleness threshold, if refresh is enabled at all.
    pub fn refresh_ttl(&self) -> Option<Duration> {
        enabled(self.refresh_ttl).filter(|_| self.refresh_mode != RefreshMode::None)
    }

    /// Sweep interval for independent refresh, if set.
    pub fn refresh_period(&self) -> Option<Duration> {
        enabled(self.refresh_period)
    }

    pub fn refresh_enabled(&self) -> bool {
        self.refresh_ttl().is_some()
    }

    /// True when every `get` should launch a sweep.
    pub fn coupled_refresh(&self) -> bool {
        self.refresh_enabled() && self.refresh_mode == RefreshMode::Coupled
    }

    /// True when a periodic sweep task should run.
    pub fn independent_refresh(&self) -> bool {
        self.refresh_enabled() && self.refresh_mode == RefreshMode::Independent
    }

    // == Validate ==
    /// Checks the whole configuration up front.
    pub fn validate(&self) -> Result<()> {
        if self.max_size < 1 {
            return Err(CacheError::config("max_size cannot be less than 1"));
        }

        if self.independent_refresh() && self.refresh_period().is_none() {
            return Err(CacheError::config(
                "independent refresh requires a positive refresh_period",
            ));
        }

        Ok(())
    }

    /// Creates a config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `OMOIDE_MAX_SIZE` - Maximum entries (default: 100)
    /// - `OMOIDE_SIZE_EVICTION_POLICY` - Eviction policy name (default: by-access-frequency)
    /// - `OMOIDE_COMPUTED_TTL_SECS` - Computed-age limit in seconds (default: disabled)
    /// - `OMOIDE_ACCESS_TTL_SECS` - Access-age limit in seconds (default: disabled)
    /// - `OMOIDE_REFRESH_TTL_SECS` - Staleness threshold in seconds (default: disabled)
    /// - `OMOIDE_REFRESH_MODE` - none, coupled or independent (default: coupled)
    /// - `OMOIDE_REFRESH_PERIOD_SECS` - Independent sweep interval in seconds
    /// - `OMOIDE_DEBUG` - Per-call timing diagnostics (default: false)
    ///
    /// Non-positive durations disable the matching rule. Unknown policy or
    /// mode names are an error rather than silently defaulted.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |name: &str| lookup(name).and_then(|v| v.trim().parse::<f64>().ok());
        let secs = |name: &str| {
            parse(name)
                .filter(|s| *s > 0.0)
                .and_then(|s| Duration::try_from_secs_f64(s).ok())
        };

        let size_eviction_policy = match lookup("OMOIDE_SIZE_EVICTION_POLICY") {
            Some(name) => name.parse()?,
            None => defaults.size_eviction_policy,
        };
        let refresh_mode = match lookup("OMOIDE_REFRESH_MODE") {
            Some(name) => name.parse()?,
            None => defaults.refresh_mode,
        };

        Ok(Self {
            max_size: lookup("OMOIDE_MAX_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_size),
            size_eviction_policy,
            computed_ttl: secs("OMOIDE_COMPUTED_TTL_SECS"),
            access_ttl: secs("OMOIDE_ACCESS_TTL_SECS"),
            refresh_ttl: secs("OMOIDE_REFRESH_TTL_SECS"),
            refresh_mode,
            refresh_period: secs("OMOIDE_REFRESH_PERIOD_SECS"),
            debug_logging: lookup("OMOIDE_DEBUG")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.debug_logging),
        })
    }
}

fn enabled(duration: Option<Duration>) -> Option<Duration> {
    duration.filter(|d| !d.is_zero())
}
