use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Backend configuration
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,

    // Pagination
    pub notifications_per_page: u32,
    pub posts_per_page: u32,
    pub events_per_page: u32,

    // Message bus
    pub message_buffer_size: usize,

    // Runtime
    pub environment: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5000/api".to_string()),
            api_token: env::var("API_TOKEN").ok().filter(|t| !t.is_empty()),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            notifications_per_page: env::var("NOTIFICATIONS_PER_PAGE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            posts_per_page: env::var("POSTS_PER_PAGE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            events_per_page: env::var("EVENTS_PER_PAGE")
                .unwrap_or_else(|_| "12".to_string())
                .parse()?,

            message_buffer_size: env::var("MESSAGE_BUFFER_SIZE")
                .unwrap_or_else(|_| "64".to_string())
                .parse()?,

            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "rainbow_volunteer=debug".to_string()),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            api_token: None,
            request_timeout_secs: 30,
            notifications_per_page: 10,
            posts_per_page: 10,
            events_per_page: 12,
            message_buffer_size: 64,
            environment: "development".to_string(),
            log_level: "rainbow_volunteer=debug".to_string(),
        }
    }
}
