use log::warn;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::{Config, EventSender, FetchEvent};

mod headers;
mod identity;

pub use headers::*;
pub use identity::*;

/// Body substrings that mean upstream served a bot challenge instead of content
const BLOCK_MARKERS: &[&str] = &[
    "Please verify you are a human",
    "captcha-delivery",
    "/challenge?",
];

/// How an upstream fetch failed, as classified from the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Upstream asked us to slow down
    RateLimited,
    /// Upstream refused the identity outright, or served a challenge page
    Blocked,
    /// Timeouts, connection errors, upstream 5xx
    Transient,
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::RateLimited => "rate limited",
            Self::Blocked => "blocked",
            Self::Transient => "transient network failure",
        };

        write!(f, "{}", text)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// Every identity is cooling down and none became usable within the wait limit
    #[error("All identities are cooling down")]
    Saturated,

    #[error("Request failed after {attempts} attempts, last failure: {last}")]
    Exhausted { attempts: u32, last: FailureKind },

    #[error("Could not build http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid proxy url: {0}")]
    InvalidProxy(String),
}

/// Issues upstream requests through a rotating pool of identities,
/// classifying failures and benching identities that draw pushback.
pub struct Transport {
    config: Config,
    identities: Vec<Identity>,
    events: EventSender,
}

impl Transport {
    /// Builds the pool from the config: one direct identity plus one per proxy url.
    /// With no proxies configured the pool degrades to the direct identity alone.
    pub fn new(config: &Config, events: EventSender) -> Result<Self, TransportError> {
        let mut identities = vec![Identity::direct(config)?];

        for proxy_url in &config.proxy_urls {
            identities.push(Identity::proxied(proxy_url, config)?);
        }

        Ok(Self {
            config: config.clone(),
            identities,
            events,
        })
    }

    /// Fetches the url, rotating identities and retrying per classification,
    /// and returns the response body.
    pub async fn fetch(&self, url: &Url) -> Result<String, TransportError> {
        let mut last = FailureKind::Transient;

        for attempt in 0..self.config.max_fetch_attempts {
            let identity = self.acquire().await?;

            match perform(identity, url).await {
                Ok(body) => {
                    identity.mark_success();
                    return Ok(body);
                }
                Err(kind) => {
                    warn!(
                        "Fetch attempt {} via {} failed: {}",
                        attempt + 1,
                        identity.label(),
                        kind
                    );

                    match kind {
                        FailureKind::RateLimited | FailureKind::Blocked => {
                            let (failures, cooldown) = identity.mark_pushback(&self.config);

                            let _ = self.events.send(FetchEvent::IdentityQuarantined {
                                label: identity.label().to_string(),
                                failures,
                                cooldown_secs: cooldown.as_secs(),
                            });
                        }
                        FailureKind::Transient => {
                            identity.mark_transient();
                            tokio::time::sleep(self.config.backoff_delay(attempt)).await;
                        }
                    }

                    last = kind;
                }
            }
        }

        Err(TransportError::Exhausted {
            attempts: self.config.max_fetch_attempts,
            last,
        })
    }

    /// Per-identity pool status
    pub fn status(&self) -> Vec<IdentityStatus> {
        self.identities.iter().map(|i| i.status()).collect()
    }

    /// Picks a usable identity, preferring proxies so the direct identity
    /// stays clean as a fallback. Waits out cooldowns up to the configured
    /// limit when the whole pool is benched.
    async fn acquire(&self) -> Result<&Identity, TransportError> {
        let mut waited = Duration::ZERO;

        loop {
            let usable_proxies: Vec<&Identity> = self
                .identities
                .iter()
                .filter(|i| i.is_proxied() && i.usable())
                .collect();

            // Random among usable proxies so no single one is starved
            if let Some(identity) = usable_proxies.choose(&mut thread_rng()) {
                return Ok(identity);
            }

            if let Some(direct) = self.identities.iter().find(|i| !i.is_proxied() && i.usable())
            {
                return Ok(direct);
            }

            let soonest = self
                .identities
                .iter()
                .map(|i| i.cooldown_remaining())
                .min()
                .unwrap_or(Duration::ZERO);

            if waited + soonest > self.config.identity_wait_limit {
                return Err(TransportError::Saturated);
            }

            tokio::time::sleep(soonest).await;
            waited += soonest;
        }
    }
}

async fn perform(identity: &Identity, url: &Url) -> Result<String, FailureKind> {
    let response = identity
        .client()
        .get(url.clone())
        .headers(browser_headers())
        .send()
        .await
        .map_err(|_| FailureKind::Transient)?;

    if let Some(kind) = classify_status(response.status().as_u16()) {
        return Err(kind);
    }

    let body = response.text().await.map_err(|_| FailureKind::Transient)?;

    if body_blocked(&body) {
        return Err(FailureKind::Blocked);
    }

    Ok(body)
}

/// Classifies a status code, None meaning the response is worth reading
fn classify_status(status: u16) -> Option<FailureKind> {
    match status {
        200..=299 => None,
        429 => Some(FailureKind::RateLimited),
        403 => Some(FailureKind::Blocked),
        500..=599 => Some(FailureKind::Transient),
        _ => Some(FailureKind::Transient),
    }
}

fn body_blocked(body: &str) -> bool {
    BLOCK_MARKERS.iter().any(|marker| body.contains(marker))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event_channel;

    fn config() -> Config {
        Config {
            identity_cooldown: Duration::from_secs(60),
            identity_wait_limit: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[test]
    fn status_codes_classify_as_specified() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(204), None);
        assert_eq!(classify_status(429), Some(FailureKind::RateLimited));
        assert_eq!(classify_status(403), Some(FailureKind::Blocked));
        assert_eq!(classify_status(500), Some(FailureKind::Transient));
        assert_eq!(classify_status(503), Some(FailureKind::Transient));
        assert_eq!(classify_status(404), Some(FailureKind::Transient));
    }

    #[test]
    fn challenge_bodies_count_as_blocked() {
        assert!(body_blocked(
            "<html>Please verify you are a human to continue</html>"
        ));
        assert!(!body_blocked("<html><body>results</body></html>"));
    }

    #[tokio::test]
    async fn saturated_pool_gives_up_after_the_wait_limit() {
        let (sender, _receiver) = event_channel();
        let config = config();
        let transport = Transport::new(&config, sender).expect("builds transport");

        for identity in &transport.identities {
            identity.mark_pushback(&config);
        }

        let result = transport.acquire().await;

        assert!(matches!(result, Err(TransportError::Saturated)));
    }

    #[tokio::test]
    async fn pool_without_proxies_degrades_to_direct() {
        let (sender, _receiver) = event_channel();
        let config = config();
        let transport = Transport::new(&config, sender).expect("builds transport");

        let identity = transport.acquire().await.expect("acquires an identity");

        assert_eq!(identity.label(), DIRECT_LABEL);
    }

    #[tokio::test]
    async fn proxies_are_preferred_over_direct() {
        let (sender, _receiver) = event_channel();
        let config = Config {
            proxy_urls: vec!["http://proxy-a.example.com:8080".to_string()],
            ..config()
        };
        let transport = Transport::new(&config, sender).expect("builds transport");

        let identity = transport.acquire().await.expect("acquires an identity");

        assert_eq!(identity.label(), "proxy-a.example.com");
    }
}
