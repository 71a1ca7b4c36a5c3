//! `StartupConfig`: process-wide settings read once from the environment
//! at boot (spec.md §6 "Environment variables").

#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub base_config_name: Option<String>,
    pub env_config_name: Option<String>,
    pub watch_namespace: Option<String>,
    pub filter_configmap_name: Option<String>,
    pub filter_configmap_namespace: Option<String>,
    pub filter_configmap_key: String,
    pub observation_filter_namespace: Option<String>,
    pub observation_dedup_config_namespace: Option<String>,
    pub observation_source_config_namespace: Option<String>,
    pub observation_type_config_namespace: Option<String>,
    pub api_group: String,
    pub in_cluster: bool,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl StartupConfig {
    pub fn from_env() -> Self {
        Self {
            base_config_name: env_opt("BASE_CONFIG_NAME"),
            env_config_name: env_opt("ENV_CONFIG_NAME"),
            watch_namespace: Self::watch_namespace_from_env(),
            filter_configmap_name: env_opt("FILTER_CONFIGMAP_NAME"),
            filter_configmap_namespace: env_opt("FILTER_CONFIGMAP_NAMESPACE"),
            filter_configmap_key: env_opt("FILTER_CONFIGMAP_KEY").unwrap_or_else(|| "filter.json".to_string()),
            observation_filter_namespace: env_opt("OBSERVATION_FILTER_NAMESPACE"),
            observation_dedup_config_namespace: env_opt("OBSERVATION_DEDUP_CONFIG_NAMESPACE"),
            observation_source_config_namespace: env_opt("OBSERVATION_SOURCE_CONFIG_NAMESPACE"),
            observation_type_config_namespace: env_opt("OBSERVATION_TYPE_CONFIG_NAMESPACE"),
            api_group: env_opt("ZEN_API_GROUP").unwrap_or_else(|| "zen.kube-zen.io".to_string()),
            in_cluster: env_opt("KUBERNETES_SERVICE_HOST").is_some(),
        }
    }

    pub fn watch_namespace_from_env() -> Option<String> {
        env_opt("WATCH_NAMESPACE")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_group_defaults_when_unset() {
        std::env::remove_var("ZEN_API_GROUP");
        assert_eq!(StartupConfig::from_env().api_group, "zen.kube-zen.io");
    }
}
