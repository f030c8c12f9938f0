//! Pre-flight service check
//!
//! Before a batch starts, every configured third-party service must answer
//! `200 OK`. A run against an unavailable service would only trip the guard
//! a few titles later.

use std::time::Duration;
use tracing::{info, warn};
use whatson_common::config::ServiceConfig;

use crate::error::{BatchError, BatchResult};

pub async fn check_services(
    client: &reqwest::Client,
    services: &[ServiceConfig],
    retries: u32,
    retry_delay: Duration,
) -> BatchResult<()> {
    for service in services {
        check_service(client, service, retries, retry_delay).await?;
    }
    Ok(())
}

async fn check_service(
    client: &reqwest::Client,
    service: &ServiceConfig,
    retries: u32,
    retry_delay: Duration,
) -> BatchResult<()> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let failure = match client.get(&service.url).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => {
                info!(service = %service.name, "Service available");
                return Ok(());
            }
            Ok(response) => format!("HTTP {}", response.status()),
            Err(e) => e.to_string(),
        };

        if attempt > retries {
            return Err(BatchError::Preflight(format!(
                "{} ({}) unavailable: {}",
                service.name, service.url, failure
            )));
        }

        warn!(service = %service.name, attempt, failure = %failure, "Service check failed, retrying");
        tokio::time::sleep(retry_delay).await;
    }
}
