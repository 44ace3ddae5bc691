//! Driver configuration, loaded from a JSON file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::{AuthStyle, TransportType};
use crate::error::{Result, WfaError};
use crate::models::Operation;

fn default_login() -> String {
    "admin".to_string()
}

fn default_check_job_delay() -> f64 {
    10.0
}

fn default_max_attempts() -> u32 {
    20
}

fn default_share_name_template() -> String {
    "manila_%(share_id)s".to_string()
}

fn default_snapshot_name_template() -> String {
    "manila_%(snapshot_id)s_snapshot".to_string()
}

/// Workflow name template per operation.
///
/// Each template may carry one `%s` for the series id. An empty string
/// leaves the operation without a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowNames {
    pub wfa_create_share: String,
    pub wfa_delete_share: String,
    pub wfa_create_snapshot: String,
    pub wfa_delete_snapshot: String,
    pub wfa_create_share_from_snapshot: String,
    #[serde(alias = "wfa_access_allow")]
    pub wfa_allow_access: String,
    #[serde(alias = "wfa_access_deny")]
    pub wfa_deny_access: String,
}

impl Default for WorkflowNames {
    fn default() -> Self {
        let tmpl = |op: Operation| op.default_workflow_template().to_string();
        Self {
            wfa_create_share: tmpl(Operation::CreateShare),
            wfa_delete_share: tmpl(Operation::DeleteShare),
            wfa_create_snapshot: tmpl(Operation::CreateSnapshot),
            wfa_delete_snapshot: tmpl(Operation::DeleteSnapshot),
            wfa_create_share_from_snapshot: tmpl(Operation::CreateShareFromSnapshot),
            wfa_allow_access: tmpl(Operation::AllowAccess),
            wfa_deny_access: tmpl(Operation::DenyAccess),
        }
    }
}

impl WorkflowNames {
    /// Workflow name template configured for `operation`.
    pub fn template(&self, operation: Operation) -> &str {
        match operation {
            Operation::CreateShare => &self.wfa_create_share,
            Operation::DeleteShare => &self.wfa_delete_share,
            Operation::CreateSnapshot => &self.wfa_create_snapshot,
            Operation::DeleteSnapshot => &self.wfa_delete_snapshot,
            Operation::CreateShareFromSnapshot => &self.wfa_create_share_from_snapshot,
            Operation::AllowAccess => &self.wfa_allow_access,
            Operation::DenyAccess => &self.wfa_deny_access,
        }
    }
}

/// Names of the workflow input variables, remappable per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputNames {
    #[serde(rename = "accessIP")]
    pub access_ip: String,
    #[serde(rename = "aggrName")]
    pub aggregate_name: String,
    #[serde(rename = "clusName")]
    pub cluster_name: String,
    #[serde(rename = "levelOfAccess")]
    pub level_of_access: String,
    #[serde(rename = "snapName")]
    pub snapshot_name: String,
    #[serde(rename = "volName")]
    pub volume_name: String,
    #[serde(rename = "volSize")]
    pub volume_size: String,
    #[serde(rename = "vserverName")]
    pub vserver_name: String,
}

impl Default for InputNames {
    fn default() -> Self {
        Self {
            access_ip: "accessIP".to_string(),
            aggregate_name: "aggrName".to_string(),
            cluster_name: "clusName".to_string(),
            level_of_access: "levelOfAccess".to_string(),
            snapshot_name: "snapName".to_string(),
            volume_name: "volName".to_string(),
            volume_size: "volSize".to_string(),
            vserver_name: "vserverName".to_string(),
        }
    }
}

/// Configuration of the WFA driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Host name or IP address of the WFA server.
    pub wfa_endpoint: String,
    #[serde(default = "default_login")]
    pub wfa_login: String,
    #[serde(default)]
    pub wfa_password: Option<String>,
    #[serde(default)]
    pub wfa_port: Option<u16>,
    #[serde(default)]
    pub wfa_transport_type: TransportType,
    #[serde(default)]
    pub wfa_auth_style: AuthStyle,
    /// Request timeout in seconds; none means wait indefinitely.
    #[serde(default)]
    pub wfa_timeout: Option<u64>,
    /// Delay in seconds between job status checks.
    #[serde(default = "default_check_job_delay")]
    pub check_job_delay: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts_check_job: u32,
    /// Backend specific part of the workflow names.
    #[serde(default)]
    pub wfa_series_id: Option<String>,
    #[serde(default)]
    pub workflows: WorkflowNames,
    #[serde(default)]
    pub inputs: InputNames,
    #[serde(default = "default_share_name_template")]
    pub wfa_share_name_template: String,
    #[serde(default = "default_snapshot_name_template")]
    pub wfa_snapshot_name_template: String,
    /// Used instead of missing extra specs, keyed by input name
    /// (e.g. `clusName`).
    #[serde(default)]
    pub wfa_extra_configuration: HashMap<String, String>,
    #[serde(default)]
    pub share_backend_name: Option<String>,
}

impl DriverConfig {
    /// Configuration with defaults for everything but the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            wfa_endpoint: endpoint.into(),
            wfa_login: default_login(),
            wfa_password: None,
            wfa_port: None,
            wfa_transport_type: TransportType::default(),
            wfa_auth_style: AuthStyle::default(),
            wfa_timeout: None,
            check_job_delay: default_check_job_delay(),
            max_attempts_check_job: default_max_attempts(),
            wfa_series_id: None,
            workflows: WorkflowNames::default(),
            inputs: InputNames::default(),
            wfa_share_name_template: default_share_name_template(),
            wfa_snapshot_name_template: default_snapshot_name_template(),
            wfa_extra_configuration: HashMap::new(),
            share_backend_name: None,
        }
    }

    /// Load and validate a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: DriverConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the driver cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.wfa_endpoint.trim().is_empty() {
            return Err(WfaError::Configuration(
                "wfa_endpoint should be defined.".to_string(),
            ));
        }
        if Duration::try_from_secs_f64(self.check_job_delay).is_err() {
            return Err(WfaError::Configuration(format!(
                "check_job_delay must be a non-negative number of seconds, got {}.",
                self.check_job_delay
            )));
        }
        if self.max_attempts_check_job == 0 {
            return Err(WfaError::Configuration(
                "max_attempts_check_job must be at least 1.".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay between job status checks; the default for unrepresentable values.
    pub fn check_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.check_job_delay)
            .unwrap_or_else(|_| Duration::from_secs_f64(default_check_job_delay()))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.wfa_timeout.map(Duration::from_secs)
    }

    /// Backend name reported in share stats.
    pub fn backend_name(&self) -> &str {
        self.share_backend_name.as_deref().unwrap_or("NetApp_WFA")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config: DriverConfig = serde_json::from_str(r#"{"wfa_endpoint": "10.0.0.5"}"#).unwrap();

        assert_eq!(config.wfa_login, "admin");
        assert_eq!(config.check_job_delay, 10.0);
        assert_eq!(config.max_attempts_check_job, 20);
        assert_eq!(config.inputs.access_ip, "accessIP");
        assert_eq!(
            config.workflows.template(Operation::CreateShare),
            "os_create_nfs_share_%s"
        );
        assert_eq!(config.wfa_transport_type, TransportType::Http);
        assert_eq!(config.backend_name(), "NetApp_WFA");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config: DriverConfig = serde_json::from_str(
            r#"{
                "wfa_endpoint": "wfa.example.com",
                "wfa_transport_type": "https",
                "wfa_series_id": "7m",
                "workflows": {"wfa_access_allow": "os_grant_ip_%s", "wfa_deny_access": ""},
                "inputs": {"volName": "volumeName"},
                "wfa_extra_configuration": {"clusName": "cluster1"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.wfa_transport_type, TransportType::Https);
        assert_eq!(config.workflows.template(Operation::AllowAccess), "os_grant_ip_%s");
        assert_eq!(config.workflows.template(Operation::DenyAccess), "");
        assert_eq!(config.inputs.volume_name, "volumeName");
        assert_eq!(config.inputs.snapshot_name, "snapName");
        assert_eq!(
            config.wfa_extra_configuration.get("clusName").map(String::as_str),
            Some("cluster1")
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DriverConfig::new("wfa");
        config.max_attempts_check_job = 0;
        assert!(config.validate().is_err());

        let mut config = DriverConfig::new("wfa");
        config.check_job_delay = -1.0;
        assert!(config.validate().is_err());

        assert!(DriverConfig::new(" ").validate().is_err());
    }

    #[test]
    fn test_unrepresentable_delay() {
        for delay in [1e30, f64::INFINITY, f64::NAN] {
            let mut config = DriverConfig::new("wfa");
            config.check_job_delay = delay;
            assert!(
                matches!(config.validate(), Err(WfaError::Configuration(_))),
                "{} should be rejected",
                delay
            );
            assert_eq!(config.check_delay(), Duration::from_secs(10));
        }
    }
}
