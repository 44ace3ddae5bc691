//! Data models shared by the workflow client and the driver.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Workflow input variable name -> value.
pub type InputMap = BTreeMap<String, String>;

/// Share operations backed by a WFA workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateShare,
    DeleteShare,
    CreateSnapshot,
    DeleteSnapshot,
    CreateShareFromSnapshot,
    AllowAccess,
    DenyAccess,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::CreateShare,
        Operation::DeleteShare,
        Operation::CreateSnapshot,
        Operation::DeleteSnapshot,
        Operation::CreateShareFromSnapshot,
        Operation::AllowAccess,
        Operation::DenyAccess,
    ];

    /// Operation name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateShare => "create_share",
            Operation::DeleteShare => "delete_share",
            Operation::CreateSnapshot => "create_snapshot",
            Operation::DeleteSnapshot => "delete_snapshot",
            Operation::CreateShareFromSnapshot => "create_share_from_snapshot",
            Operation::AllowAccess => "allow_access",
            Operation::DenyAccess => "deny_access",
        }
    }

    /// Default workflow name template; `%s` is replaced by the series id.
    pub fn default_workflow_template(&self) -> &'static str {
        match self {
            Operation::CreateShare => "os_create_nfs_share_%s",
            Operation::DeleteShare => "os_delete_nfs_share_%s",
            Operation::CreateSnapshot => "os_create_snapshot_%s",
            Operation::DeleteSnapshot => "os_delete_snapshot_%s",
            Operation::CreateShareFromSnapshot => "os_create_nfs_share_snapshot_%s",
            Operation::AllowAccess => "os_allow_access_%s",
            Operation::DenyAccess => "os_deny_access_%s",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared user input of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInputSpec {
    pub name: String,
    pub mandatory: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    /// Empty means unconstrained.
    #[serde(default)]
    pub allowed_values: Vec<String>,
}

/// Workflow as discovered on the WFA server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub uuid: String,
    #[serde(default)]
    pub user_inputs: Vec<UserInputSpec>,
    #[serde(default)]
    pub return_parameters: Vec<String>,
}

impl WorkflowDefinition {
    /// Declared input named `name`.
    pub fn input(&self, name: &str) -> Option<&UserInputSpec> {
        self.user_inputs.iter().find(|input| input.name == name)
    }

    pub fn mandatory_inputs(&self) -> impl Iterator<Item = &UserInputSpec> {
        self.user_inputs.iter().filter(|input| input.mandatory)
    }
}

/// Outcome of a workflow execution.
///
/// `params` holds everything extracted from the last job response: `jobId`,
/// job status metadata, progress info and workflow return parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub error: bool,
    pub result: String,
    pub params: BTreeMap<String, String>,
}

impl JobResult {
    /// Create a successful result carrying `params`.
    pub fn from_params(params: BTreeMap<String, String>) -> Self {
        Self {
            error: false,
            result: String::new(),
            params,
        }
    }

    /// Value of a response parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn job_id(&self) -> Option<&str> {
        self.get("jobId")
    }

    pub fn job_status(&self) -> Option<&str> {
        self.get("jobStatus")
    }

    /// Subset of `params` restricted to `keys`.
    pub fn select(&self, keys: &[&str]) -> HashMap<String, String> {
        self.params
            .iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Flat view including `error` and `result`.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = self.params.clone();
        map.insert("error".to_string(), self.error.to_string());
        map.insert("result".to_string(), self.result.clone());
        map
    }
}

/// A share as handed over by the host service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Share {
    pub id: String,
    pub size: u64,
    pub share_proto: String,
    /// Extra specs of the share type, already resolved by the host.
    #[serde(default)]
    pub extra_specs: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub share_id: String,
}

/// Access rule for a share.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Access {
    pub access_type: String,
    pub access_to: String,
}

/// Capacity report of a backend pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub pool_name: String,
    pub total_capacity_gb: String,
    pub free_capacity_gb: String,
    pub allocated_capacity_gb: String,
    #[serde(rename = "QoS_support")]
    pub qos_support: bool,
    pub reserved_percentage: u32,
}

/// Backend capabilities reported to the host service.
///
/// WFA does not expose capacity, so every capacity is `unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareStats {
    pub share_backend_name: String,
    pub vendor_name: String,
    pub driver_version: String,
    pub netapp_storage_family: String,
    pub storage_protocol: String,
    pub total_capacity_gb: String,
    pub free_capacity_gb: String,
    pub reserved_percentage: u32,
    pub pools: Vec<PoolStats>,
}

impl ShareStats {
    /// Stats of a WFA backend with a single pool and unknown capacity.
    pub fn for_backend(backend_name: &str) -> Self {
        let unknown = || "unknown".to_string();
        Self {
            share_backend_name: backend_name.to_string(),
            vendor_name: "NetApp".to_string(),
            driver_version: "1.0".to_string(),
            netapp_storage_family: "wfa".to_string(),
            storage_protocol: "NFS".to_string(),
            total_capacity_gb: unknown(),
            free_capacity_gb: unknown(),
            reserved_percentage: 0,
            pools: vec![PoolStats {
                pool_name: "wfa".to_string(),
                total_capacity_gb: unknown(),
                free_capacity_gb: unknown(),
                allocated_capacity_gb: unknown(),
                qos_support: false,
                reserved_percentage: 0,
            }],
        }
    }
}
