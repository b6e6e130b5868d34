use rand::seq::SliceRandom;
use rand::thread_rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};

/// A rotation of current desktop browser agents, so consecutive requests
/// don't present identical fingerprints.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36 Edg/123.0.2420.97",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.9",
    "de-CH,de;q=0.9,en;q=0.8",
    "fr-CH,fr;q=0.9,en;q=0.7",
    "de-DE,de;q=0.9,en;q=0.6",
];

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Builds a randomized set of browser-like headers for one request
pub fn browser_headers() -> HeaderMap {
    let mut rng = thread_rng();
    let mut headers = HeaderMap::new();

    let agent = USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(USER_AGENTS[0]);

    let language = ACCEPT_LANGUAGES
        .choose(&mut rng)
        .copied()
        .unwrap_or(ACCEPT_LANGUAGES[0]);

    headers.insert(USER_AGENT, HeaderValue::from_static(agent));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(language));
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));

    headers
}
