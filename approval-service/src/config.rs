use log::{info, warn};
use std::env;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;
const DEFAULT_PORT: u16 = 3002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Dynamo,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub route_prefix: String,
    pub store_backend: StoreBackend,
    pub moderation_page_size: usize,
    pub sns_topic_arn: Option<String>,
    pub port: u16,
    pub lambda_function: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            route_prefix: String::new(),
            store_backend: StoreBackend::Memory,
            moderation_page_size: DEFAULT_PAGE_SIZE,
            sns_topic_arn: None,
            port: DEFAULT_PORT,
            lambda_function: None,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // If REMOVE_BASE_PATH is set to true, don't add the /Prod prefix
        let remove_base_path = lookup("REMOVE_BASE_PATH")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);
        let route_prefix = if remove_base_path { "" } else { "/Prod" }.to_string();

        let store_backend = match lookup("STORE_BACKEND").as_deref() {
            Some("memory") => StoreBackend::Memory,
            Some("dynamodb") | None => StoreBackend::Dynamo,
            Some(other) => {
                warn!("Unknown STORE_BACKEND '{}', using dynamodb", other);
                StoreBackend::Dynamo
            }
        };

        let moderation_page_size = lookup("MODERATION_PAGE_SIZE")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let port = lookup("PORT")
            .and_then(|v| v.trim().parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let config = Self {
            route_prefix,
            store_backend,
            moderation_page_size,
            sns_topic_arn: lookup("SNS_TOPIC_ARN").filter(|arn| !arn.trim().is_empty()),
            port,
            lambda_function: lookup("AWS_LAMBDA_FUNCTION_NAME"),
        };
        info!("Loaded configuration: {:?}", config);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ServiceConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);

        assert_eq!(config.route_prefix, "/Prod");
        assert_eq!(config.store_backend, StoreBackend::Dynamo);
        assert_eq!(config.moderation_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.sns_topic_arn, None);
        assert_eq!(config.port, 3002);
        assert!(config.lambda_function.is_none());
    }

    #[test]
    fn test_overrides_and_clamping() {
        let config = config_from(&[
            ("REMOVE_BASE_PATH", "TRUE"),
            ("STORE_BACKEND", "memory"),
            ("MODERATION_PAGE_SIZE", "500"),
            ("SNS_TOPIC_ARN", "arn:aws:sns:ap-northeast-2:123456789012:approvals"),
            ("PORT", "8080"),
        ]);

        assert_eq!(config.route_prefix, "");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.moderation_page_size, MAX_PAGE_SIZE);
        assert!(config.sns_topic_arn.is_some());
        assert_eq!(config.port, 8080);

        assert_eq!(
            config_from(&[("MODERATION_PAGE_SIZE", "0")]).moderation_page_size,
            1
        );
    }
}
