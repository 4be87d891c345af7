//! Per-client-IP token-bucket rate limiting (spec §4.1 policy 4): a global limit plus
//! a stricter one scoped to the upload endpoints.

use std::sync::Arc;
use std::time::Duration;

use tower_governor::{governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer};

use crate::config::DynAppConfig;

fn period_ms(window_ms: u64, max_requests: u32) -> u64 {
    (window_ms / u64::from(max_requests.max(1))).max(1)
}

#[must_use]
pub fn global_layer(config: &DynAppConfig) -> GovernorLayer {
    let governor_conf = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .period(Duration::from_millis(period_ms(
            config.rate_limit_window_ms,
            config.rate_limit_max_requests,
        )))
        .burst_size(config.rate_limit_max_requests)
        .finish()
        .expect("static governor configuration is always valid");

    GovernorLayer {
        config: Arc::new(governor_conf),
    }
}

#[cfg(test)]
mod tests {
    use super::period_ms;

    #[test]
    fn splits_the_window_evenly_across_the_request_budget() {
        assert_eq!(period_ms(60_000, 300), 200);
    }

    #[test]
    fn never_divides_by_zero_requests() {
        assert_eq!(period_ms(60_000, 0), 60_000);
    }

    #[test]
    fn rounds_down_to_at_least_one_millisecond() {
        assert_eq!(period_ms(1, 1000), 1);
    }
}

#[must_use]
pub fn upload_layer(config: &DynAppConfig) -> GovernorLayer {
    let governor_conf = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .period(Duration::from_millis(period_ms(
            config.rate_limit_window_ms,
            config.upload_rate_limit_max_requests,
        )))
        .burst_size(config.upload_rate_limit_max_requests)
        .finish()
        .expect("static governor configuration is always valid");

    GovernorLayer {
        config: Arc::new(governor_conf),
    }
}
