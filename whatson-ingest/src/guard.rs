//! Error threshold guard
//!
//! Every adapter call goes through the guard. Transient failures get a fixed
//! number of retries with a fixed delay; a call that still fails counts as one
//! failure for its source. Any success resets the source's counter. Once a
//! counter goes past the source's threshold the guard returns [`GuardTripped`]
//! and the batch must stop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, warn};
use whatson_common::config::{ErrorThresholds, IngestConfig};

use crate::adapters::AdapterResult;
use crate::error::GuardTripped;

pub struct ErrorThresholdGuard {
    thresholds: ErrorThresholds,
    retries: u32,
    retry_delay: Duration,
    counters: Mutex<HashMap<String, u32>>,
}

impl ErrorThresholdGuard {
    pub fn new(thresholds: ErrorThresholds, retries: u32, retry_delay: Duration) -> Self {
        Self {
            thresholds,
            retries,
            retry_delay,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            config.error_thresholds.clone(),
            config.retries,
            Duration::from_millis(config.retry_delay_ms),
        )
    }

    /// Run `call` for `source`, retrying transient failures.
    ///
    /// `Ok` carries the adapter's final result, including a counted failure
    /// that stayed under the threshold.
    pub async fn call<F, Fut>(&self, source: &str, mut call: F) -> Result<AdapterResult, GuardTripped>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdapterResult>,
    {
        let mut attempt = 0u32;
        let result = loop {
            attempt += 1;
            let result = call().await;

            match &result {
                AdapterResult::Failed(e) if e.is_transient() && attempt <= self.retries => {
                    warn!(
                        source = source,
                        attempt,
                        retries = self.retries,
                        error = %e,
                        "Transient adapter failure, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                _ => break result,
            }
        };

        if !result.is_failure() {
            self.reset(source);
            return Ok(result);
        }

        let failures = self.record_failure(source);
        let threshold = self.thresholds.for_source(source);
        if let AdapterResult::Failed(e) = &result {
            warn!(source = source, failures, threshold, error = %e, "Adapter call failed");
        }

        if failures > threshold {
            error!(source = source, failures, threshold, "Error threshold exceeded");
            return Err(GuardTripped {
                source_name: source.to_string(),
                failures,
                threshold,
            });
        }

        Ok(result)
    }

    /// Current consecutive failure count for `source`
    pub fn failures(&self, source: &str) -> u32 {
        self.lock_counters().get(source).copied().unwrap_or(0)
    }

    fn record_failure(&self, source: &str) -> u32 {
        let mut counters = self.lock_counters();
        let counter = counters.entry(source.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn reset(&self, source: &str) {
        self.lock_counters().remove(source);
    }

    fn lock_counters(&self) -> std::sync::MutexGuard<'_, HashMap<String, u32>> {
        // Counters stay meaningful even if a holder panicked
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
