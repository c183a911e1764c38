//! Pager timing configuration.
//!
//! Every delay the pager waits on is a named value here so that tests can
//! drive the state machine on a paused clock.
//!
//! # Example Configuration (INI)
//!
//! ```ini
//! [pager]
//! settle_delay_ms = 90
//! capture_retries = 2
//! capture_retry_delay_ms = 60
//! stabilization_timeout_ms = 500
//! late_refresh_delay_ms = 160
//! reading_direction = ltr
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use super::error::ConfigError;
use crate::capture::{CapturePolicy, DEFAULT_CAPTURE_RETRY_DELAY};
use crate::direction::ReadingDirection;

/// Default wait between a probe's step and its capture.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(90);

/// Upper bound accepted for the settle delay.
pub const MAX_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Default bound on the post-commit stabilization wait.
pub const DEFAULT_STABILIZATION_TIMEOUT: Duration = Duration::from_millis(500);

/// Default delay before re-capturing the current page after a commit.
pub const DEFAULT_LATE_REFRESH_DELAY: Duration = Duration::from_millis(160);

/// Default retries for the initial capture after attach.
pub const DEFAULT_INITIAL_CAPTURE_RETRIES: u32 = 2;

/// Default surface waits for the initial capture. Larger than the probe
/// budget since the surface is often attached late.
pub const DEFAULT_INITIAL_SURFACE_WAITS: u32 = 8;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// INI section holding pager settings.
pub const INI_SECTION: &str = "pager";

/// Pager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerConfig {
    /// Wait after a probe's step before capturing.
    pub settle_delay: Duration,

    /// Retry discipline for probe and commit captures.
    pub capture: CapturePolicy,

    /// Retry discipline for the initial capture after attach.
    pub initial_capture: CapturePolicy,

    /// Bound on waiting for the renderer to stabilize after a commit.
    /// The commit proceeds when it elapses.
    pub stabilization_timeout: Duration,

    /// Delay before the post-commit re-capture of the current page.
    pub late_refresh_delay: Duration,

    /// Capacity of the broadcast channel behind [`subscribe`].
    ///
    /// [`subscribe`]: super::SnapshotPager::subscribe
    pub event_capacity: usize,

    /// Maps widget sides to document directions.
    pub reading_direction: ReadingDirection,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            capture: CapturePolicy::default(),
            initial_capture: CapturePolicy::fixed(
                DEFAULT_INITIAL_CAPTURE_RETRIES,
                DEFAULT_CAPTURE_RETRY_DELAY,
            )
            .with_max_surface_waits(DEFAULT_INITIAL_SURFACE_WAITS),
            stabilization_timeout: DEFAULT_STABILIZATION_TIMEOUT,
            late_refresh_delay: DEFAULT_LATE_REFRESH_DELAY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            reading_direction: ReadingDirection::default(),
        }
    }
}

impl PagerConfig {
    /// Set the settle delay.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the capture policy used by probes and commits.
    pub fn with_capture_policy(mut self, policy: CapturePolicy) -> Self {
        self.capture = policy;
        self
    }

    /// Set the initial capture policy.
    pub fn with_initial_capture_policy(mut self, policy: CapturePolicy) -> Self {
        self.initial_capture = policy;
        self
    }

    /// Set the stabilization timeout.
    pub fn with_stabilization_timeout(mut self, timeout: Duration) -> Self {
        self.stabilization_timeout = timeout;
        self
    }

    /// Set the late refresh delay.
    pub fn with_late_refresh_delay(mut self, delay: Duration) -> Self {
        self.late_refresh_delay = delay;
        self
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the reading direction.
    pub fn with_reading_direction(mut self, direction: ReadingDirection) -> Self {
        self.reading_direction = direction;
        self
    }

    /// Check the configuration for values the pager cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.max_retries == 0 {
            return Err(invalid("capture.max_retries", "must be at least 1"));
        }
        if self.initial_capture.max_retries == 0 {
            return Err(invalid("initial_capture.max_retries", "must be at least 1"));
        }
        if self.settle_delay > MAX_SETTLE_DELAY {
            return Err(invalid(
                "settle_delay",
                format!("{:?} exceeds {:?}", self.settle_delay, MAX_SETTLE_DELAY),
            ));
        }
        if self.late_refresh_delay < self.settle_delay {
            return Err(invalid(
                "late_refresh_delay",
                format!(
                    "{:?} is shorter than the settle delay {:?}",
                    self.late_refresh_delay, self.settle_delay
                ),
            ));
        }
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity", "must be at least 1"));
        }
        Ok(())
    }

    /// Load from an INI file, starting from defaults.
    pub fn from_ini_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Load from INI text, starting from defaults.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Load {
            path: "<string>".into(),
            message: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    /// Apply the `[pager]` section of a parsed INI document over defaults.
    ///
    /// Missing keys keep their defaults. The result is validated.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let Some(section) = ini.section(Some(INI_SECTION)) else {
            return Ok(config);
        };

        if let Some(ms) = parse_key::<u64>(section.get("settle_delay_ms"), "settle_delay_ms")? {
            config.settle_delay = Duration::from_millis(ms);
        }
        if let Some(retries) = parse_key::<u32>(section.get("capture_retries"), "capture_retries")? {
            config.capture.max_retries = retries;
        }
        if let Some(ms) = parse_key::<u64>(
            section.get("capture_retry_delay_ms"),
            "capture_retry_delay_ms",
        )? {
            config.capture.retry_delay = Duration::from_millis(ms);
            config.initial_capture.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_key::<u64>(
            section.get("stabilization_timeout_ms"),
            "stabilization_timeout_ms",
        )? {
            config.stabilization_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_key::<u64>(
            section.get("late_refresh_delay_ms"),
            "late_refresh_delay_ms",
        )? {
            config.late_refresh_delay = Duration::from_millis(ms);
        }
        if let Some(raw) = section.get("reading_direction") {
            config.reading_direction =
                ReadingDirection::from_config_str(raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: "reading_direction",
                    value: raw.to_string(),
                    reason: "expected ltr or rtl".to_string(),
                })?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn parse_key<T>(raw: Option<&str>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                value: raw.to_string(),
                reason: e.to_string(),
            }),
    }
}
