use crate::config::AwsConfig;
use aws_config::{retry::RetryConfig, BehaviorVersion, Region, SdkConfig};

/// Resolves credentials and region from the default provider chain, with
/// explicit overrides from configuration. SDK-level retries are disabled so
/// that `retry::with_retry` is the only retry loop.
pub async fn load_sdk_config(aws_config: &AwsConfig) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).retry_config(RetryConfig::disabled());

    if let Some(region) = &aws_config.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(profile) = &aws_config.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint_url) = &aws_config.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }

    let sdk_config = loader.load().await;
    tracing::debug!(
        "Loaded AWS configuration for region {:?}",
        sdk_config.region().map(|r| r.as_ref())
    );
    sdk_config
}

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottledException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "BandwidthLimitExceeded",
    "LimitExceededException",
    "SlowDown",
    "PriorRequestNotComplete",
];

const TRANSIENT_CODES: &[&str] = &["RequestTimeout", "RequestTimeoutException"];

/// Whether a service error response is worth another attempt: any 5xx or 429,
/// or a throttling/timeout error code regardless of status.
pub(crate) fn is_retryable_response(code: Option<&str>, status: u16) -> bool {
    if status == 429 || (500..600).contains(&status) {
        return true;
    }
    code.is_some_and(|code| THROTTLING_CODES.contains(&code) || TRANSIENT_CODES.contains(&code))
}
