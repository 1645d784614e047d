//! Test configuration helpers

use species_dl::Config;
use std::time::Duration;

/// Configuration with every politeness delay and retry switched off
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.browser.delay_min_ms = 0;
    config.browser.delay_max_ms = 0;
    config.browser.request_timeout = Duration::from_secs(2);
    config.download.timeout = Duration::from_secs(2);
    config.retry.max_attempts = 0;
    config.batch.species_delay_min_ms = 0;
    config.batch.species_delay_max_ms = 0;
    config
}
