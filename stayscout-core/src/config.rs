use rand::{thread_rng, Rng};
use std::time::Duration;

/// The configuration of the fetch pipeline
#[derive(Debug, Clone)]
pub struct Config {
    /// How many result pages a single destination run may consume, across resumes
    pub pages_per_destination: usize,
    /// How many attempts a single fetch gets before it is given up on
    pub max_fetch_attempts: u32,
    /// The starting delay between retries of a transient failure
    pub backoff_base: Duration,
    /// The largest delay the backoff is allowed to grow to, jitter excluded
    pub backoff_cap: Duration,
    /// How long an identity rests after being rate limited or blocked
    pub identity_cooldown: Duration,
    /// The longest a repeatedly failing identity can be made to rest
    pub identity_cooldown_cap: Duration,
    /// How long a fetch may wait for an identity when the whole pool is cooling down
    pub identity_wait_limit: Duration,
    /// Timeout for a single upstream request
    pub request_timeout: Duration,
    /// Lower bound of the politeness delay between result pages
    pub page_delay_min: Duration,
    /// Most likely politeness delay between result pages
    pub page_delay_mode: Duration,
    /// Upper bound of the politeness delay between result pages
    pub page_delay_max: Duration,
    /// How many listings a run may enrich with detail fetches after its page loop
    pub detail_budget_per_run: usize,
    /// A group below this listing count gets a fetch kicked off when filters are saved
    pub fetch_trigger_threshold: usize,
    /// How many entries a leaderboard snapshot carries
    pub leaderboard_limit: usize,
    /// Proxy urls to rotate through, in addition to the direct identity
    pub proxy_urls: Vec<String>,
}

impl Config {
    /// The delay before retrying attempt number `attempt`, with jitter applied
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .backoff_base
            .saturating_mul(3u32.saturating_pow(attempt));

        let jitter = Duration::from_millis(thread_rng().gen_range(0..1000));

        exponential.min(self.backoff_cap) + jitter
    }

    /// Samples a politeness delay from a triangular distribution over the configured bounds
    pub fn page_delay(&self) -> Duration {
        let min = self.page_delay_min.as_secs_f64();
        let max = self.page_delay_max.as_secs_f64();
        let mode = self.page_delay_mode.as_secs_f64().clamp(min, max);

        if max <= min {
            return self.page_delay_min;
        }

        let cut = (mode - min) / (max - min);
        let roll: f64 = thread_rng().gen();

        let seconds = if roll < cut {
            min + ((max - min) * (mode - min) * roll).sqrt()
        } else {
            max - ((max - min) * (max - mode) * (1. - roll)).sqrt()
        };

        Duration::from_secs_f64(seconds)
    }

    pub fn has_proxies(&self) -> bool {
        !self.proxy_urls.is_empty()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Enough to fill a group's deck without hammering upstream
            pages_per_destination: 4,
            max_fetch_attempts: 4,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(60),
            // Rate limit windows upstream tend to be about two minutes
            identity_cooldown: Duration::from_secs(120),
            identity_cooldown_cap: Duration::from_secs(600),
            identity_wait_limit: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            // Roughly human page turning speed
            page_delay_min: Duration::from_secs(1),
            page_delay_mode: Duration::from_secs(2),
            page_delay_max: Duration::from_secs(4),
            detail_budget_per_run: 8,
            // One result page's worth of listings
            fetch_trigger_threshold: 18,
            leaderboard_limit: 20,
            proxy_urls: vec![],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let config = Config::default();

        let first = config.backoff_delay(0);
        let second = config.backoff_delay(1);
        let late = config.backoff_delay(10);

        assert!(first >= config.backoff_base);
        assert!(second >= config.backoff_base * 3);
        // Jitter adds at most a second on top of the cap
        assert!(late <= config.backoff_cap + Duration::from_secs(1));
    }

    #[test]
    fn page_delay_stays_in_bounds() {
        let config = Config::default();

        for _ in 0..100 {
            let delay = config.page_delay();
            assert!(delay >= config.page_delay_min);
            assert!(delay <= config.page_delay_max);
        }
    }
}
