//! NFS share operations mapped onto WFA workflow executions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::client::WorkflowClient;
use crate::config::DriverConfig;
use crate::connection::{ServerConnection, Transport};
use crate::error::{Result, WfaError};
use crate::lock::{LockGuard, LockProvider};
use crate::models::{
    Access, InputMap, JobResult, Operation, Share, ShareStats, Snapshot, WorkflowDefinition,
};
use crate::storage::PrivateStorage;
use crate::template::{object_name, workflow_name};

/// Prefix of the extra specs handed to workflows.
pub const SPECS_PREFIX: &str = "netapp:";

/// Input carrying the share protocol.
pub const PROTOCOL_INPUT: &str = "protocol";

pub const SUPPORTED_PROTOCOL: &str = "NFS";

pub const SUPPORTED_ACCESS_TYPE: &str = "ip";

/// Job fields persisted to private storage after share creation.
const METADATA_FIELDS: &[&str] = &["jobId", "jobStatus"];

/// Extra specs consulted per operation, with their mandatory flag.
fn extra_spec_checks(operation: Operation) -> &'static [(&'static str, bool)] {
    match operation {
        Operation::CreateShare => &[
            ("netapp:clusName", false),
            ("netapp:aggrName", false),
            ("netapp:vserverName", false),
        ],
        Operation::AllowAccess => &[("netapp:levelOfAccess", true)],
        _ => &[],
    }
}

/// Whether a failed deletion means the object was already gone.
pub fn is_already_deleted(result: &JobResult) -> bool {
    if result.job_status() != Some("FAILED") {
        return false;
    }
    let nothing_ran = result.get("current-command-index") == Some("0")
        && result.get("commands-number") == Some("0");
    nothing_ran || result.result.contains("not found") || result.result.contains("No volume named")
}

fn check_protocol(share: &Share) -> Result<()> {
    if share.share_proto != SUPPORTED_PROTOCOL {
        return Err(WfaError::UnsupportedProtocol(share.share_proto.clone()));
    }
    Ok(())
}

fn export_location(result: &JobResult) -> Result<String> {
    result
        .get("export_location")
        .map(str::to_string)
        .ok_or(WfaError::NoExportLocation)
}

/// Share driver proxying every operation to a WFA workflow.
pub struct WfaDriver<T: Transport = ServerConnection> {
    config: DriverConfig,
    client: WorkflowClient<T>,
    storage: Arc<dyn PrivateStorage>,
    locks: Arc<dyn LockProvider>,
}

impl WfaDriver<ServerConnection> {
    /// Create a driver talking to the configured WFA server.
    pub fn new(
        config: DriverConfig,
        storage: Arc<dyn PrivateStorage>,
        locks: Arc<dyn LockProvider>,
    ) -> Result<Self> {
        let client = WorkflowClient::from_config(&config)?;
        Ok(Self::with_client(config, client, storage, locks))
    }
}

impl<T: Transport> WfaDriver<T> {
    /// Create a driver around an existing workflow client.
    pub fn with_client(
        config: DriverConfig,
        client: WorkflowClient<T>,
        storage: Arc<dyn PrivateStorage>,
        locks: Arc<dyn LockProvider>,
    ) -> Self {
        Self {
            config,
            client,
            storage,
            locks,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Workflow client used for every operation.
    pub fn client(&self) -> &WorkflowClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut WorkflowClient<T> {
        &mut self.client
    }

    /// Resolved workflow per operation; `None` for unconfigured ones.
    pub fn workflows(&self) -> &HashMap<Operation, Option<WorkflowDefinition>> {
        self.client.workflows()
    }

    /// Workflow names for the configured series.
    pub fn workflow_names(&self) -> Result<BTreeMap<Operation, String>> {
        let series_id = self.config.wfa_series_id.as_deref().ok_or_else(|| {
            WfaError::Configuration("Config option wfa_series_id should be defined.".to_string())
        })?;

        Operation::ALL
            .iter()
            .map(|op| {
                let name = workflow_name(self.config.workflows.template(*op), series_id)?;
                Ok((*op, name))
            })
            .collect()
    }

    /// Resolve all workflows. Must run before any operation.
    pub async fn do_setup(&mut self) -> Result<()> {
        let names = self.workflow_names()?;
        self.client.set_workflow_inputs(self.config.inputs.clone());
        self.client.set_workflows(&names).await?;

        tracing::info!(
            backend = self.config.backend_name(),
            resolved = self.workflows().values().filter(|w| w.is_some()).count(),
            "WFA driver is set up"
        );
        Ok(())
    }

    /// Uuid of the operation's workflow, or the not-configured error.
    fn require_workflow(&self, operation: Operation) -> Result<String> {
        match self.client.workflows().get(&operation).and_then(Option::as_ref) {
            Some(workflow) => Ok(workflow.uuid.clone()),
            None => {
                let template = operation.default_workflow_template();
                let series_id = self.config.wfa_series_id.as_deref().unwrap_or_default();
                Err(WfaError::WorkflowNotConfigured {
                    operation: operation.to_string(),
                    default_workflow: workflow_name(template, series_id)
                        .unwrap_or_else(|_| template.to_string()),
                })
            }
        }
    }

    async fn lock(&self, name: String) -> Result<LockGuard> {
        tracing::debug!(lock = %name, "Waiting for lock");
        self.locks.acquire(&name).await
    }

    /// Backend volume name of a share.
    pub fn share_name(&self, share_id: &str) -> Result<String> {
        object_name(&self.config.wfa_share_name_template, "share_id", share_id)
    }

    /// Backend snapshot name of a snapshot.
    pub fn snapshot_name(&self, snapshot_id: &str) -> Result<String> {
        object_name(&self.config.wfa_snapshot_name_template, "snapshot_id", snapshot_id)
    }

    /// Workflow inputs taken from the share's extra specs.
    ///
    /// Checked specs missing on the share come from `wfa_extra_configuration`.
    /// Every `netapp:` spec of the share is passed on without its prefix.
    pub fn inputs_from_specs(&self, share: &Share, operation: Operation) -> Result<InputMap> {
        let mut inputs = InputMap::new();

        for (key, mandatory) in extra_spec_checks(operation) {
            if share.extra_specs.contains_key(*key) {
                continue;
            }
            let param = key.trim_start_matches(SPECS_PREFIX);
            match self.config.wfa_extra_configuration.get(param) {
                Some(value) => {
                    tracing::debug!(param, "Extra spec is missing, using config option");
                    inputs.insert(param.to_string(), value.clone());
                }
                None if *mandatory => {
                    return Err(WfaError::Configuration(format!(
                        "For wfa_extra_configuration {} is missing.",
                        param
                    )));
                }
                None => tracing::debug!(param, "Optional extra spec is undefined, skipping"),
            }
        }

        for (key, value) in &share.extra_specs {
            if let Some(param) = key.strip_prefix(SPECS_PREFIX) {
                inputs.insert(param.to_string(), value.clone());
            }
        }

        Ok(inputs)
    }

    async fn store_metadata(&self, share_id: &str, result: &JobResult) -> Result<()> {
        self.storage
            .update(share_id, result.select(METADATA_FIELDS))
            .await
    }

    async fn run(
        &self,
        operation: Operation,
        uuid: &str,
        inputs: &InputMap,
        comments: &str,
    ) -> Result<JobResult> {
        tracing::info!(operation = %operation, "Executing workflow");
        self.client.execute(uuid, inputs, comments, operation).await
    }

    /// Nothing to do: exports are managed by the workflows.
    pub async fn ensure_share(&self, share: &Share) -> Result<()> {
        tracing::debug!(share_id = %share.id, "ensure_share is a no-op");
        Ok(())
    }

    /// Static capacity report for the backend.
    pub fn share_stats(&self) -> ShareStats {
        tracing::debug!("Updating share stats.");
        ShareStats::for_backend(self.config.backend_name())
    }

    /// Create a share and return its export location.
    pub async fn create_share(&self, share: &Share) -> Result<String> {
        let operation = Operation::CreateShare;
        let uuid = self.require_workflow(operation)?;
        check_protocol(share)?;

        let names = &self.config.inputs;
        let mut inputs = InputMap::new();
        inputs.insert(names.volume_name.clone(), self.share_name(&share.id)?);
        inputs.insert(names.volume_size.clone(), share.size.to_string());
        inputs.insert(PROTOCOL_INPUT.to_string(), SUPPORTED_PROTOCOL.to_string());
        inputs.extend(self.inputs_from_specs(share, operation)?);

        let result = self
            .run(operation, &uuid, &inputs, "Creation of share from manila service")
            .await?;

        self.store_metadata(&share.id, &result).await?;
        self.client.check_result(&result, None)?;
        export_location(&result)
    }

    /// Delete a share. A share already gone from the backend is not an error.
    pub async fn delete_share(&self, share: &Share) -> Result<()> {
        let operation = Operation::DeleteShare;
        let uuid = self.require_workflow(operation)?;
        let _lock = self.lock(format!("delete_share:{}", share.id)).await?;

        let mut inputs = InputMap::new();
        inputs.insert(self.config.inputs.volume_name.clone(), self.share_name(&share.id)?);

        let result = self
            .run(operation, &uuid, &inputs, "Deletion of share from manila service")
            .await?;

        if let Err(e) = self.client.check_result(&result, None) {
            if !is_already_deleted(&result) {
                return Err(e);
            }
            tracing::warn!(
                share_id = %share.id,
                "Impossible to delete share. Share does not exist at backend."
            );
        }
        Ok(())
    }

    /// Snapshot a share's volume.
    pub async fn create_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let operation = Operation::CreateSnapshot;
        let uuid = self.require_workflow(operation)?;
        let _lock = self.lock(format!("delete_share:{}", snapshot.share_id)).await?;

        let names = &self.config.inputs;
        let mut inputs = InputMap::new();
        inputs.insert(names.volume_name.clone(), self.share_name(&snapshot.share_id)?);
        inputs.insert(names.snapshot_name.clone(), self.snapshot_name(&snapshot.id)?);

        let result = self
            .run(
                operation,
                &uuid,
                &inputs,
                "Creation of snapshot from share over manila service",
            )
            .await?;
        self.client.check_result(&result, None)
    }

    /// Create a share from a snapshot and return its export location.
    pub async fn create_share_from_snapshot(
        &self,
        share: &Share,
        snapshot: &Snapshot,
    ) -> Result<String> {
        let operation = Operation::CreateShareFromSnapshot;
        let uuid = self.require_workflow(operation)?;
        let _lock = self.lock(format!("delete_snapshot:{}", snapshot.id)).await?;
        check_protocol(share)?;

        let names = &self.config.inputs;
        let mut inputs = InputMap::new();
        inputs.insert(names.volume_name.clone(), self.share_name(&share.id)?);
        inputs.insert(names.volume_size.clone(), share.size.to_string());
        inputs.insert(PROTOCOL_INPUT.to_string(), SUPPORTED_PROTOCOL.to_string());
        inputs.insert(names.snapshot_name.clone(), self.snapshot_name(&snapshot.id)?);

        let result = self
            .run(
                operation,
                &uuid,
                &inputs,
                "Creation of share from snapshot over manila service",
            )
            .await?;

        self.store_metadata(&share.id, &result).await?;
        self.client.check_result(&result, None)?;
        export_location(&result)
    }

    /// Delete a snapshot. A snapshot already gone from the backend is not an error.
    pub async fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let operation = Operation::DeleteSnapshot;
        let uuid = self.require_workflow(operation)?;
        let _lock = self.lock(format!("delete_snapshot:{}", snapshot.id)).await?;

        let mut inputs = InputMap::new();
        inputs.insert(
            self.config.inputs.snapshot_name.clone(),
            self.snapshot_name(&snapshot.id)?,
        );

        let result = self
            .run(operation, &uuid, &inputs, "Deletion of snapshot over manila service")
            .await?;

        if let Err(e) = self.client.check_result(&result, None) {
            if !is_already_deleted(&result) {
                return Err(e);
            }
            tracing::warn!(
                snapshot_id = %snapshot.id,
                "Impossible to delete snapshot. Snapshot does not exist at backend."
            );
        }
        Ok(())
    }

    /// Grant an IP or network access to an NFS share.
    pub async fn allow_access(&self, share: &Share, access: &Access) -> Result<()> {
        let operation = Operation::AllowAccess;
        let uuid = self.require_workflow(operation)?;
        check_protocol(share)?;
        if access.access_type != SUPPORTED_ACCESS_TYPE {
            return Err(WfaError::UnsupportedAccessType(access.access_type.clone()));
        }

        let names = &self.config.inputs;
        let mut inputs = InputMap::new();
        inputs.insert(names.access_ip.clone(), access.access_to.clone());
        inputs.insert(PROTOCOL_INPUT.to_string(), SUPPORTED_PROTOCOL.to_string());
        inputs.insert(names.volume_name.clone(), self.share_name(&share.id)?);
        inputs.extend(self.inputs_from_specs(share, operation)?);

        let result = self
            .run(operation, &uuid, &inputs, "Allow access to a share from manila service")
            .await?;
        self.client.check_result(&result, None)
    }

    /// Revoke access previously granted with `allow_access`.
    pub async fn deny_access(&self, share: &Share, access: &Access) -> Result<()> {
        let operation = Operation::DenyAccess;
        let uuid = self.require_workflow(operation)?;

        let names = &self.config.inputs;
        let mut inputs = InputMap::new();
        inputs.insert(names.access_ip.clone(), access.access_to.clone());
        inputs.insert(names.volume_name.clone(), self.share_name(&share.id)?);

        let result = self
            .run(operation, &uuid, &inputs, "Denies access to a share from manila service")
            .await?;
        self.client.check_result(&result, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::lock::InProcessLocks;
    use crate::storage::InMemoryStorage;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn invoke(&self, path: &str, _body: Option<&Element>) -> Result<Element> {
            panic!("unexpected request to {}", path);
        }

        fn base_url(&self) -> String {
            "http://unreachable:80".to_string()
        }
    }

    fn driver(config: DriverConfig) -> WfaDriver<Unreachable> {
        let client = WorkflowClient::new(Unreachable, &config);
        WfaDriver::with_client(
            config,
            client,
            Arc::new(InMemoryStorage::new()),
            Arc::new(InProcessLocks::new()),
        )
    }

    fn share_with_specs(specs: &[(&str, &str)]) -> Share {
        Share {
            id: "1234-1234".to_string(),
            size: 1,
            share_proto: "NFS".to_string(),
            extra_specs: specs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn failed(result: &str, params: &[(&str, &str)]) -> JobResult {
        let mut job = JobResult::from_params(
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        job.error = true;
        job.result = result.to_string();
        job
    }

    #[test]
    fn test_inputs_from_specs_prefers_extra_specs() {
        let mut config = DriverConfig::new("wfa");
        config
            .wfa_extra_configuration
            .insert("clusName".to_string(), "config_cluster".to_string());
        config
            .wfa_extra_configuration
            .insert("aggrName".to_string(), "config_aggr".to_string());
        let driver = driver(config);

        let share = share_with_specs(&[
            ("netapp:clusName", "spec_cluster"),
            ("netapp:SpaceReservation", "true"),
            ("capabilities:dedupe", "true"),
        ]);
        let inputs = driver.inputs_from_specs(&share, Operation::CreateShare).unwrap();

        assert_eq!(inputs.get("clusName").map(String::as_str), Some("spec_cluster"));
        assert_eq!(inputs.get("aggrName").map(String::as_str), Some("config_aggr"));
        assert_eq!(inputs.get("SpaceReservation").map(String::as_str), Some("true"));
        assert!(!inputs.contains_key("vserverName"));
        assert!(!inputs.contains_key("dedupe"));
    }

    #[test]
    fn test_inputs_from_specs_mandatory_missing() {
        let driver = driver(DriverConfig::new("wfa"));
        let share = share_with_specs(&[]);
        assert!(matches!(
            driver.inputs_from_specs(&share, Operation::AllowAccess),
            Err(WfaError::Configuration(_))
        ));

        let share = share_with_specs(&[("netapp:levelOfAccess", "rw")]);
        let inputs = driver.inputs_from_specs(&share, Operation::AllowAccess).unwrap();
        assert_eq!(inputs.get("levelOfAccess").map(String::as_str), Some("rw"));
    }

    #[test]
    fn test_is_already_deleted() {
        assert!(is_already_deleted(&failed(
            "x",
            &[
                ("jobStatus", "FAILED"),
                ("current-command-index", "0"),
                ("commands-number", "0")
            ]
        )));
        assert!(is_already_deleted(&failed(
            "Volume vol1 not found",
            &[("jobStatus", "FAILED")]
        )));
        assert!(is_already_deleted(&failed(
            "No volume named vol1",
            &[("jobStatus", "FAILED")]
        )));
        assert!(!is_already_deleted(&failed(
            "no volume named vol1",
            &[("jobStatus", "FAILED")]
        )));
        assert!(!is_already_deleted(&failed(
            "not found",
            &[("jobStatus", "CANCELED")]
        )));
        assert!(!is_already_deleted(&failed(
            "x",
            &[
                ("jobStatus", "FAILED"),
                ("current-command-index", "0"),
                ("commands-number", "2")
            ]
        )));
    }

    #[test]
    fn test_object_names() {
        let driver = driver(DriverConfig::new("wfa"));
        assert_eq!(driver.share_name("ab-cd").unwrap(), "manila_ab_cd");
        assert_eq!(driver.snapshot_name("ef-01").unwrap(), "manila_ef_01_snapshot");
    }

    #[test]
    fn test_workflow_names_need_series() {
        let mut config = DriverConfig::new("wfa");
        assert!(driver(config.clone()).workflow_names().is_err());

        config.wfa_series_id = Some("7m".to_string());
        config.workflows.wfa_deny_access = String::new();
        config.workflows.wfa_allow_access = "custom_allow".to_string();
        let names = driver(config).workflow_names().unwrap();
        assert_eq!(names[&Operation::DeleteShare], "os_delete_nfs_share_7m");
        assert_eq!(names[&Operation::AllowAccess], "custom_allow");
        assert_eq!(names[&Operation::DenyAccess], "");
    }

    #[tokio::test]
    async fn test_unconfigured_workflow_fails_before_any_request() {
        let mut config = DriverConfig::new("wfa");
        config.wfa_series_id = Some("7m".to_string());
        let driver = driver(config);
        let snapshot = Snapshot {
            id: "s1".to_string(),
            share_id: "sh1".to_string(),
        };

        match driver.delete_snapshot(&snapshot).await {
            Err(WfaError::WorkflowNotConfigured {
                operation,
                default_workflow,
            }) => {
                assert_eq!(operation, "delete_snapshot");
                assert_eq!(default_workflow, "os_delete_snapshot_7m");
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn test_share_stats_backend_name() {
        let mut config = DriverConfig::new("wfa");
        config.share_backend_name = Some("wfa_backend".to_string());
        assert_eq!(driver(config).share_stats().share_backend_name, "wfa_backend");
    }
}
