//! Engine configuration
//!
//! [`EngineConfig`] is immutable once built. To change settings, build a new
//! config and a new engine.

use crate::error::DownloadError;
use crate::transport::{HttpTransport, ReqwestTransport};
use ferry_types::{EngineSettings, TransportSettings};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Validated, immutable engine configuration
#[derive(Clone)]
pub struct EngineConfig {
    retry_limit: u32,
    progress_report_interval: Duration,
    integrity_check_enabled: bool,
    retry_delay: Duration,
    max_retry_delay: Duration,
    transport: Arc<dyn HttpTransport>,
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Number of retries after the first attempt; `retry_limit + 1` attempts at most
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_limit.saturating_add(1)
    }

    pub fn progress_report_interval(&self) -> Duration {
        self.progress_report_interval
    }

    pub fn integrity_check_enabled(&self) -> bool {
        self.integrity_check_enabled
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Delay to wait after `failed_attempts` failures before trying again
    pub fn retry_delay_after(&self, failed_attempts: u32) -> Duration {
        if self.retry_delay.is_zero() || failed_attempts == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(failed_attempts - 1);
        self.retry_delay
            .checked_mul(factor)
            .unwrap_or(self.max_retry_delay)
            .min(self.max_retry_delay)
    }

    /// The serializable part of this configuration
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            retry_limit: self.retry_limit,
            progress_report_interval_ms: self.progress_report_interval.as_millis() as u64,
            integrity_check_enabled: self.integrity_check_enabled,
            retry_delay_ms: self.retry_delay.as_millis() as u64,
            max_retry_delay_ms: self.max_retry_delay.as_millis() as u64,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("retry_limit", &self.retry_limit)
            .field("progress_report_interval", &self.progress_report_interval)
            .field("integrity_check_enabled", &self.integrity_check_enabled)
            .field("retry_delay", &self.retry_delay)
            .field("max_retry_delay", &self.max_retry_delay)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EngineConfig`]
#[derive(Default)]
pub struct EngineConfigBuilder {
    settings: EngineSettings,
    transport_settings: TransportSettings,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl EngineConfigBuilder {
    /// Start from serialized settings
    pub fn settings(mut self, settings: &EngineSettings) -> Self {
        self.settings = settings.clone();
        self
    }

    pub fn retry_limit(mut self, retry_limit: u32) -> Self {
        self.settings.retry_limit = retry_limit;
        self
    }

    pub fn progress_report_interval_millis(mut self, millis: u64) -> Self {
        self.settings.progress_report_interval_ms = millis;
        self
    }

    /// Sub-millisecond parts round up, so any non-zero interval stays non-zero
    pub fn progress_report_interval(self, interval: Duration) -> Self {
        self.progress_report_interval_millis(millis_rounded_up(interval))
    }

    pub fn integrity_check_enabled(mut self, enabled: bool) -> Self {
        self.settings.integrity_check_enabled = enabled;
        self
    }

    /// Initial backoff between attempts. Zero disables backoff.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.settings.retry_delay_ms = millis_rounded_up(delay);
        self
    }

    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.settings.max_retry_delay_ms = millis_rounded_up(delay);
        self
    }

    /// Settings for the default reqwest transport. Ignored if a transport is injected.
    pub fn transport_settings(mut self, settings: &TransportSettings) -> Self {
        self.transport_settings = settings.clone();
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<EngineConfig, DownloadError> {
        let settings = self.settings;

        if settings.progress_report_interval_ms == 0 {
            return Err(DownloadError::InvalidConfig(
                "progress report interval must be positive".to_string(),
            ));
        }
        if settings.max_retry_delay_ms < settings.retry_delay_ms {
            return Err(DownloadError::InvalidConfig(format!(
                "max retry delay ({} ms) is shorter than retry delay ({} ms)",
                settings.max_retry_delay_ms, settings.retry_delay_ms
            )));
        }

        let transport: Arc<dyn HttpTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.transport_settings)?),
        };

        Ok(EngineConfig {
            retry_limit: settings.retry_limit,
            progress_report_interval: Duration::from_millis(settings.progress_report_interval_ms),
            integrity_check_enabled: settings.integrity_check_enabled,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            max_retry_delay: Duration::from_millis(settings.max_retry_delay_ms),
            transport,
        })
    }
}

/// Settings store whole milliseconds
fn millis_rounded_up(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::builder().build().unwrap();
        assert_eq!(config.retry_limit(), 0);
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.progress_report_interval(), Duration::from_millis(1000));
        assert!(!config.integrity_check_enabled());
        assert_eq!(config.retry_delay_after(1), Duration::ZERO);
        assert_eq!(config.settings(), EngineSettings::default());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = EngineConfig::builder()
            .progress_report_interval_millis(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidConfig(_)));
    }

    #[test]
    fn test_sub_millisecond_interval_rounds_up() {
        let config = EngineConfig::builder()
            .progress_report_interval(Duration::from_micros(1500))
            .build()
            .unwrap();
        assert_eq!(config.progress_report_interval(), Duration::from_millis(2));

        let config = EngineConfig::builder()
            .progress_report_interval(Duration::from_micros(500))
            .build()
            .unwrap();
        assert_eq!(config.progress_report_interval(), Duration::from_millis(1));

        assert!(EngineConfig::builder()
            .progress_report_interval(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_inverted_delays_rejected() {
        let err = EngineConfig::builder()
            .retry_delay(Duration::from_secs(10))
            .max_retry_delay(Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_read_timeout_rejected() {
        let err = EngineConfig::builder()
            .transport_settings(&TransportSettings {
                read_timeout_secs: 0,
                ..Default::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidConfig(_)));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = EngineConfig::builder()
            .retry_limit(10)
            .retry_delay(Duration::from_millis(100))
            .max_retry_delay(Duration::from_millis(500))
            .build()
            .unwrap();

        assert_eq!(config.retry_delay_after(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay_after(2), Duration::from_millis(200));
        assert_eq!(config.retry_delay_after(3), Duration::from_millis(400));
        assert_eq!(config.retry_delay_after(4), Duration::from_millis(500));
        assert_eq!(config.retry_delay_after(40), Duration::from_millis(500));
    }

    #[test]
    fn test_settings_seed_builder() {
        let settings = EngineSettings {
            retry_limit: 2,
            progress_report_interval_ms: 250,
            integrity_check_enabled: true,
            ..Default::default()
        };
        let config = EngineConfig::builder().settings(&settings).build().unwrap();
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.progress_report_interval(), Duration::from_millis(250));
        assert!(config.integrity_check_enabled());
        assert_eq!(config.settings(), settings);
    }
}
