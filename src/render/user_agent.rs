use rand::seq::SliceRandom;
use std::sync::Arc;

const FALLBACK_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
);

/// User agent rotator for the HTTP fetcher
#[derive(Clone)]
pub struct UserAgentRotator {
    user_agents: Arc<Vec<String>>,
}

impl UserAgentRotator {
    pub fn new(user_agents: &[String]) -> Self {
        let agents = if user_agents.is_empty() {
            Self::default_user_agents()
        } else {
            user_agents.to_vec()
        };

        Self {
            user_agents: Arc::new(agents),
        }
    }

    /// Get a random user agent
    pub fn random(&self) -> &str {
        let mut rng = rand::thread_rng();
        self.user_agents
            .choose(&mut rng)
            .map(String::as_str)
            .unwrap_or(FALLBACK_USER_AGENT)
    }

    pub fn count(&self) -> usize {
        self.user_agents.len()
    }

    /// Desktop agents for the major browsers
    pub fn default_user_agents() -> Vec<String> {
        vec![
            FALLBACK_USER_AGENT.to_string(),
            concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) ",
                "Gecko/20100101 Firefox/121.0"
            )
            .to_string(),
            concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0"
            )
            .to_string(),
            concat!(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 ",
                "(KHTML, like Gecko) Version/17.1 Safari/605.1.15"
            )
            .to_string(),
            concat!(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            )
            .to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_falls_back_to_defaults() {
        let rotator = UserAgentRotator::new(&[]);
        assert_eq!(rotator.count(), UserAgentRotator::default_user_agents().len());
        assert!(rotator.random().starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_random_draws_from_configured_agents() {
        let agents = vec!["a".to_string(), "b".to_string()];
        let rotator = UserAgentRotator::new(&agents);
        assert_eq!(rotator.count(), 2);
        assert!(agents.iter().any(|agent| agent == rotator.random()));
    }
}
