//! Client identity rotation.
//!
//! Every HTTP request and every browser context picks a fresh user-agent
//! string from a pool of realistic desktop and mobile browsers.

use rand::rng;
use rand::seq::IndexedRandom;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:131.0) Gecko/20100101 Firefox/131.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 17_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Mobile/15E148 Safari/604.1",
];

/// A random user-agent string.
pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// A random desktop user-agent, for browser contexts rendered at 1920×1080
/// where a phone identity would be inconsistent with the viewport.
pub fn random_desktop_user_agent() -> &'static str {
    let desktop: Vec<&'static str> = USER_AGENTS
        .iter()
        .copied()
        .filter(|ua| !ua.contains("Mobile"))
        .collect();
    desktop.choose(&mut rng()).copied().unwrap_or(USER_AGENTS[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_user_agent_comes_from_pool() {
        for _ in 0..50 {
            assert!(USER_AGENTS.contains(&random_user_agent()));
        }
    }

    #[test]
    fn test_random_user_agent_rotates() {
        let seen: HashSet<&str> = (0..200).map(|_| random_user_agent()).collect();
        assert!(seen.len() > 1);
    }

    #[test]
    fn test_desktop_user_agent_is_never_mobile() {
        for _ in 0..100 {
            assert!(!random_desktop_user_agent().contains("Mobile"));
        }
    }
}
