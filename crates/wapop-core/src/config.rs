use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Name shared by the settings ConfigMap and Secret.
pub const SETTINGS_NAME: &str = "wifi-settings";

/// Namespace file mounted into every pod with a service account.
pub const NAMESPACE_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

pub const DEFAULT_IMAGE: &str =
    "registry.suse.com/suse/sl-micro/6.0/baremetal-os-container:2.1.3-4.7";

#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Home namespace holding the settings objects and the actuation jobs.
    pub namespace: String,
    /// Name of both the settings ConfigMap and the settings Secret.
    pub settings_name: String,
    /// ConfigMap carrying the enable/disable scripts.
    pub scripts_config_map: String,
    pub image: String,
    pub enable_script: String,
    pub disable_script: String,
    /// Job names are `<job_prefix><node name>`.
    pub job_prefix: String,
    /// Time-to-live of a finished job.
    pub job_ttl: Duration,
    /// Delay before retrying a pass that just deleted a stale job.
    pub stale_job_retry: Duration,
    /// Delay before retrying a failed pass.
    pub error_requeue: Duration,
    /// Upper bound on the duration of a single pass.
    pub pass_timeout: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            settings_name: SETTINGS_NAME.into(),
            scripts_config_map: "wapop-scripts".into(),
            image: DEFAULT_IMAGE.into(),
            enable_script: "/app/enable-ap.sh".into(),
            disable_script: "/app/disable-ap.sh".into(),
            job_prefix: "wifi-job-".into(),
            job_ttl: Duration::from_secs(86_400),
            stale_job_retry: Duration::from_secs(1),
            error_requeue: Duration::from_secs(5),
            pass_timeout: Duration::from_secs(30),
        }
    }
}

impl OperatorConfig {
    /// Build a config for the given home namespace with default settings otherwise.
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Resolve the home namespace once: an explicit value wins, otherwise the
    /// service-account namespace file must be readable and non-empty.
    pub fn resolve(explicit_namespace: Option<String>) -> Result<Self, ConfigError> {
        let namespace = resolve_namespace(explicit_namespace, Path::new(NAMESPACE_FILE))?;
        Ok(Self::for_namespace(namespace))
    }

    pub fn job_name(&self, node_name: &str) -> String {
        format!("{}{}", self.job_prefix, node_name)
    }

    /// Inverse of [`OperatorConfig::job_name`].
    pub fn node_for_job<'a>(&self, job_name: &'a str) -> Option<&'a str> {
        job_name
            .strip_prefix(self.job_prefix.as_str())
            .filter(|node| !node.is_empty())
    }

    pub fn script_for(&self, activate: bool) -> &str {
        if activate {
            &self.enable_script
        } else {
            &self.disable_script
        }
    }
}

pub fn resolve_namespace(explicit: Option<String>, file: &Path) -> Result<String, ConfigError> {
    if let Some(namespace) = explicit.map(|ns| ns.trim().to_string()).filter(|ns| !ns.is_empty()) {
        return Ok(namespace);
    }
    let raw = std::fs::read_to_string(file).map_err(|source| ConfigError::NamespaceUnreadable {
        path: PathBuf::from(file),
        source,
    })?;
    let namespace = raw.trim();
    if namespace.is_empty() {
        return Err(ConfigError::NamespaceEmpty(PathBuf::from(file)));
    }
    Ok(namespace.to_string())
}
