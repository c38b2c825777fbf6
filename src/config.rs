//! Connection and credential parameters and the merged backend descriptor.

use crate::error::MessagingError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use url::Url;

/// Poll delay used by the listen loop when no envelope is available.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default lease acquired by receive-family operations.
pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: i64 = 30;

/// Connection parameters for a queue backend.
///
/// The target resource name is resolved from `resource` (explicit override),
/// then `queue` (named parameter), then the queue's own logical name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub region: Option<String>,
    /// Endpoint override, e.g. a LocalStack address. Defaults to the regional
    /// backend endpoint.
    pub endpoint: Option<String>,
    pub resource: Option<String>,
    pub queue: Option<String>,
    pub dead_queue: Option<String>,
    pub interval_ms: Option<u64>,
    pub visibility_timeout_secs: Option<i64>,
}

impl ConnectionParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_dead_queue(mut self, dead_queue: impl Into<String>) -> Self {
        self.dead_queue = Some(dead_queue.into());
        self
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = Some(interval_ms);
        self
    }

    pub fn with_visibility_timeout_secs(mut self, secs: i64) -> Self {
        self.visibility_timeout_secs = Some(secs);
        self
    }
}

/// Access credentials for a queue backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialParams {
    pub access_id: Option<String>,
    pub access_key: Option<String>,
}

impl CredentialParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access_id(mut self, access_id: impl Into<String>) -> Self {
        self.access_id = Some(access_id.into());
        self
    }

    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }
}

/// Connection and credential parameters merged into a single validated
/// backend descriptor. Built once during open and cached for the lifetime of
/// the open connection.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub region: String,
    pub endpoint: String,
    pub access_id: String,
    pub access_key: String,
    pub queue_name: String,
    pub dead_queue_name: Option<String>,
    pub poll_interval: std::time::Duration,
    pub visibility_timeout: Duration,
}

impl ConnectionDescriptor {
    /// Merge and validate connection and credential parameters.
    ///
    /// Missing required fields (region, access credentials) fail with a
    /// `Configuration` error carrying the caller's correlation id.
    pub fn resolve(
        logical_name: &str,
        connection: &ConnectionParams,
        credentials: &CredentialParams,
        correlation_id: Option<&str>,
    ) -> Result<Self, MessagingError> {
        let region = required(&connection.region, "region", correlation_id)?;
        let access_id = required(&credentials.access_id, "access_id", correlation_id)?;
        let access_key = required(&credentials.access_key, "access_key", correlation_id)?;

        let endpoint = match &connection.endpoint {
            Some(raw) => {
                let url = Url::parse(raw).map_err(|err| {
                    MessagingError::configuration(
                        correlation_id,
                        format!("invalid endpoint '{raw}': {err}"),
                    )
                })?;
                url.as_str().trim_end_matches('/').to_string()
            }
            None => format!("https://sqs.{region}.amazonaws.com"),
        };

        let queue_name = connection
            .resource
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| connection.queue.clone().filter(|name| !name.is_empty()))
            .unwrap_or_else(|| logical_name.to_string());

        let dead_queue_name = connection.dead_queue.clone().filter(|name| !name.is_empty());

        let poll_interval = std::time::Duration::from_millis(
            connection.interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        );
        let visibility_timeout = Duration::seconds(
            connection
                .visibility_timeout_secs
                .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT_SECS)
                .max(0),
        );

        Ok(Self {
            region,
            endpoint,
            access_id,
            access_key,
            queue_name,
            dead_queue_name,
            poll_interval,
            visibility_timeout,
        })
    }
}

fn required(
    value: &Option<String>,
    field: &str,
    correlation_id: Option<&str>,
) -> Result<String, MessagingError> {
    value
        .clone()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            MessagingError::configuration(
                correlation_id,
                format!("connection parameter '{field}' is required"),
            )
        })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
