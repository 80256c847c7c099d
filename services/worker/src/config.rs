use anyhow::{Context, Result};

// Worker configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    // Coordinator base URL.
    pub api_url: String,
    // Pre-shared API key for this cluster.
    pub api_key: String,
    // The cluster this worker manages.
    pub cluster_id: String,
    // Path to a kubeconfig file; empty means in-cluster config.
    pub kubeconfig: Option<String>,
    // Comma-separated kind filter for the watcher; empty means all known.
    pub supported_gvrs: String,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("KONTROL_API_URL").context("KONTROL_API_URL is required")?;
        let api_key = std::env::var("KONTROL_API_KEY").context("KONTROL_API_KEY is required")?;
        let cluster_id =
            std::env::var("KONTROL_CLUSTER_ID").context("KONTROL_CLUSTER_ID is required")?;
        let kubeconfig = std::env::var("KONTROL_KUBECONFIG")
            .ok()
            .filter(|path| !path.is_empty());
        let supported_gvrs = std::env::var("KONTROL_SUPPORTED_GVRS").unwrap_or_default();
        Ok(Self {
            api_url,
            api_key,
            cluster_id,
            kubeconfig,
            supported_gvrs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_kontrol_env() {
        for (key, _) in env::vars() {
            if key.starts_with("KONTROL_") {
                env::remove_var(key);
            }
        }
    }

    fn set_required() {
        env::set_var("KONTROL_API_URL", "http://coordinator:8080");
        env::set_var("KONTROL_API_KEY", "kontrol_secret");
        env::set_var("KONTROL_CLUSTER_ID", "c1");
    }

    #[serial]
    #[test]
    fn from_env_requires_api_settings() {
        clear_kontrol_env();
        assert!(WorkerConfig::from_env().is_err());

        env::set_var("KONTROL_API_URL", "http://coordinator:8080");
        assert!(WorkerConfig::from_env().is_err());
        clear_kontrol_env();
    }

    #[serial]
    #[test]
    fn from_env_defaults_optional_settings() {
        clear_kontrol_env();
        set_required();
        let config = WorkerConfig::from_env().expect("from_env");
        assert_eq!(config.cluster_id, "c1");
        assert!(config.kubeconfig.is_none());
        assert!(config.supported_gvrs.is_empty());
        clear_kontrol_env();
    }

    #[serial]
    #[test]
    fn from_env_treats_empty_kubeconfig_as_in_cluster() {
        clear_kontrol_env();
        set_required();
        env::set_var("KONTROL_KUBECONFIG", "");
        env::set_var("KONTROL_SUPPORTED_GVRS", "deployment,service");
        let config = WorkerConfig::from_env().expect("from_env");
        assert!(config.kubeconfig.is_none());
        assert_eq!(config.supported_gvrs, "deployment,service");
        clear_kontrol_env();
    }
}
