//! WFA workflow client: discovery, input validation, job submission and
//! job status polling.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::config::{DriverConfig, InputNames};
use crate::connection::{ServerConnection, Transport};
use crate::element::Element;
use crate::error::{Result, WfaError};
use crate::models::{InputMap, JobResult, Operation, UserInputSpec, WorkflowDefinition};
use crate::template::is_ip_network;

/// Statuses of a job that is still on its way.
pub const PENDING_STATUS: &[&str] = &[
    "PAUSED",
    "RUNNING",
    "PENDING",
    "SCHEDULED",
    "EXECUTING",
    "PLANNING",
];

pub const DONE_STATUS: &[&str] = &["COMPLETED"];

pub const FAILED_STATUS: &[&str] = &["FAILED", "ABORTING", "CANCELED", "OBSOLETE"];

/// Reported when polling ran out of attempts on a pending job.
pub const NOT_ENOUGH_TIME_MESSAGE: &str =
    "Not enough time for checking of job. Enlarge check_job_delay config option.";

/// Job status children copied into the result when non-empty.
const JOB_ELEMENTS: &[&str] = &["jobStatus", "scheduleType", "plannedExecutionTime"];

const PROGRESS_ELEMENTS: &[&str] = &[
    "current-command",
    "current-command-index",
    "commands-number",
];

/// Probable causes of a failed request, by HTTP status.
fn failed_request_reasons(status: u16) -> Option<&'static [&'static str]> {
    match status {
        400 => Some(&[
            "the date format is not valid",
            "the date for the workflow is in the past",
            "the user input value was not provided in the right format",
            "provided user input is not defined for the workflow",
        ]),
        401 => Some(&["the client is not authenticated"]),
        404 => Some(&["the provided workflow uuid (job id) does not exist"]),
        _ => None,
    }
}

/// Classification of a job status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Done,
    Failed,
    Pending,
    Unexpected,
}

/// Map a WFA job status to its class.
pub fn classify_status(status: &str) -> StatusClass {
    if DONE_STATUS.contains(&status) {
        StatusClass::Done
    } else if FAILED_STATUS.contains(&status) {
        StatusClass::Failed
    } else if PENDING_STATUS.contains(&status) {
        StatusClass::Pending
    } else {
        StatusClass::Unexpected
    }
}

fn trimmed_content<'a>(element: &'a Element, name: &str) -> Option<&'a str> {
    element
        .child_content(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Append `<userInputValues>` with one `<userInputEntry key value/>` per input.
pub fn add_user_inputs(element: &mut Element, inputs: &InputMap) {
    let mut values = Element::new("userInputValues");
    for (key, value) in inputs {
        let mut entry = Element::new("userInputEntry");
        entry.add_attributes([("key", key.as_str()), ("value", value.as_str())]);
        values.add_child(entry);
    }
    element.add_child(values);
}

/// Request body for a workflow execution.
pub fn build_workflow_input(inputs: &InputMap, comments: Option<&str>) -> Element {
    let mut wf_input = Element::new("workflowInput");
    add_user_inputs(&mut wf_input, inputs);
    if let Some(comments) = comments.filter(|c| !c.is_empty()) {
        wf_input.add_new_child("comments", comments, false);
    }
    wf_input
}

/// Flatten a `<job>` response into a string map.
///
/// Picks up `jobId`, the job status metadata, the execution progress and the
/// `key`/`value` pairs under `jobStatus/returnParameters`.
pub fn parse_job_response(response: &Element) -> Result<BTreeMap<String, String>> {
    let mut params = BTreeMap::new();

    if let Some(job_id) = response.attribute("jobId") {
        params.insert("jobId".to_string(), job_id.to_string());
    }

    let job_info = response
        .find_child_by_tag_name("jobStatus")
        .ok_or_else(|| WfaError::MalformedResponse("job has no jobStatus element".to_string()))?;

    if let Some(progress) = job_info.find_child_by_tag_name("workflow-execution-progress") {
        for key in PROGRESS_ELEMENTS {
            if let Some(value) = progress.child_content(key) {
                params.insert(key.to_string(), value.trim().to_string());
            }
        }
    }

    for key in JOB_ELEMENTS {
        if let Some(value) = trimmed_content(job_info, key) {
            params.insert(key.to_string(), value.to_string());
        }
    }

    // Absent while the job is still being planned.
    if let Some(out_params) = job_info.find_child_by_tag_name("returnParameters") {
        for param in out_params.children() {
            let key = param.attribute("key");
            let value = param.attribute("value").filter(|v| !v.is_empty());
            if let (Some(key), Some(value)) = (key, value) {
                params.insert(key.to_string(), value.to_string());
            }
        }
    }

    Ok(params)
}

/// Build a [`WorkflowDefinition`] from a `<workflow>` element.
pub fn parse_workflow_definition(workflow: &Element) -> Result<WorkflowDefinition> {
    let uuid = workflow
        .attribute("uuid")
        .ok_or_else(|| WfaError::MalformedResponse("workflow has no uuid attribute".to_string()))?;

    let mut definition = WorkflowDefinition {
        name: trimmed_content(workflow, "name").unwrap_or_default().to_string(),
        uuid: uuid.to_string(),
        user_inputs: Vec::new(),
        return_parameters: Vec::new(),
    };

    if let Some(inputs) = workflow.find_child_by_tag_name("userInputList") {
        for input in inputs.children() {
            let allowed_values = input
                .find_child_by_tag_name("allowedValues")
                .map(|values| {
                    values
                        .children()
                        .iter()
                        .filter_map(|value| value.content())
                        .map(|value| value.trim().to_string())
                        .collect()
                })
                .unwrap_or_default();

            definition.user_inputs.push(UserInputSpec {
                name: trimmed_content(input, "name").unwrap_or_default().to_string(),
                mandatory: trimmed_content(input, "mandatory") == Some("true"),
                default_value: trimmed_content(input, "defaultValue").map(str::to_string),
                allowed_values,
            });
        }
    }

    if let Some(params) = workflow.find_child_by_tag_name("returnParameters") {
        definition.return_parameters = params
            .children()
            .iter()
            .filter_map(|param| trimmed_content(param, "name"))
            .map(str::to_string)
            .collect();
    }

    Ok(definition)
}

/// Client for WFA workflow executions.
pub struct WorkflowClient<T: Transport = ServerConnection> {
    transport: T,
    workflows: HashMap<Operation, Option<WorkflowDefinition>>,
    workflow_inputs: InputNames,
    check_delay: Duration,
    max_attempts: u32,
}

impl WorkflowClient<ServerConnection> {
    /// Create a client talking HTTP to the configured endpoint.
    pub fn from_config(config: &DriverConfig) -> Result<Self> {
        config.validate()?;

        let mut connection = ServerConnection::new(
            config.wfa_endpoint.clone(),
            Some(config.wfa_login.clone()),
            config.wfa_password.clone(),
        );
        connection.set_transport_type(config.wfa_transport_type);
        if let Some(port) = config.wfa_port {
            connection.set_port(port);
        }
        connection.set_style(config.wfa_auth_style);
        connection.set_timeout(config.timeout());

        Ok(Self::new(connection, config))
    }
}

impl<T: Transport> WorkflowClient<T> {
    /// Create a client over `transport` with the polling settings of `config`.
    pub fn new(transport: T, config: &DriverConfig) -> Self {
        Self {
            transport,
            workflows: HashMap::new(),
            workflow_inputs: config.inputs.clone(),
            check_delay: config.check_delay(),
            max_attempts: config.max_attempts_check_job.max(1),
        }
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Replace the input names used for validation.
    pub fn set_workflow_inputs(&mut self, inputs: InputNames) {
        self.workflow_inputs = inputs;
    }

    pub fn workflow_inputs(&self) -> &InputNames {
        &self.workflow_inputs
    }

    /// Cached workflow definitions per operation.
    pub fn workflows(&self) -> &HashMap<Operation, Option<WorkflowDefinition>> {
        &self.workflows
    }

    /// Replace the cached definition of a single operation.
    pub fn set_workflow(&mut self, operation: Operation, workflow: Option<WorkflowDefinition>) {
        self.workflows.insert(operation, workflow);
    }

    /// Resolved definition for `operation`.
    pub fn workflow(&self, operation: Operation) -> Result<&WorkflowDefinition> {
        self.workflows
            .get(&operation)
            .and_then(Option::as_ref)
            .ok_or_else(|| WfaError::WorkflowNotConfigured {
                operation: operation.to_string(),
                default_workflow: operation.default_workflow_template().to_string(),
            })
    }

    /// Send a request, mapping well known HTTP failures to probable causes.
    pub async fn send_request(&self, path: &str, body: Option<&Element>) -> Result<Element> {
        match self.transport.invoke(path, body).await {
            Err(WfaError::ApiError { code, message }) => {
                match code.status().and_then(failed_request_reasons) {
                    Some(reasons) => Err(WfaError::RequestFailed {
                        reasons: reasons.join(", "),
                        url: path.to_string(),
                        data: body.map(ToString::to_string).unwrap_or_default(),
                    }),
                    None => Err(WfaError::ApiError { code, message }),
                }
            }
            other => other,
        }
    }

    /// Look up the workflow definitions by name.
    ///
    /// Operations without a name (empty string) resolve to `None`.
    pub async fn resolve_workflows(
        &self,
        names: &BTreeMap<Operation, String>,
    ) -> Result<HashMap<Operation, Option<WorkflowDefinition>>> {
        tracing::debug!("Getting workflow list.");
        let mut workflows = HashMap::new();

        for (operation, name) in names {
            if name.is_empty() {
                workflows.insert(*operation, None);
                continue;
            }

            let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
            let collection = self
                .send_request(&format!("workflows?name={}", encoded), None)
                .await?;
            let tree = collection
                .children()
                .first()
                .ok_or_else(|| WfaError::WorkflowMissing(name.clone()))?;

            let definition = parse_workflow_definition(tree)?;
            tracing::debug!(
                operation = %operation,
                workflow = %definition.name,
                uuid = %definition.uuid,
                "Resolved workflow"
            );
            workflows.insert(*operation, Some(definition));
        }

        Ok(workflows)
    }

    /// Resolve and cache the workflow definitions, replacing earlier ones.
    pub async fn set_workflows(&mut self, names: &BTreeMap<Operation, String>) -> Result<()> {
        self.workflows = self.resolve_workflows(names).await?;
        Ok(())
    }

    /// Check `inputs` against the declared inputs of the operation's workflow.
    pub fn validate_inputs(&self, operation: Operation, inputs: &InputMap) -> Result<()> {
        let workflow = self.workflow(operation)?;

        let mut missing: Vec<String> = workflow
            .mandatory_inputs()
            .filter(|input| !inputs.contains_key(&input.name))
            .map(|input| input.name.clone())
            .collect();
        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(WfaError::MissingInputs {
                operation: operation.to_string(),
                names: missing,
            });
        }

        for (key, value) in inputs {
            if *key == self.workflow_inputs.access_ip {
                if !is_ip_network(value) {
                    return Err(WfaError::InvalidIp {
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
                continue;
            }

            match workflow.input(key) {
                None => {
                    return Err(WfaError::UnacceptableInput {
                        key: key.clone(),
                        allowed: workflow.user_inputs.iter().map(|i| i.name.clone()).collect(),
                    });
                }
                Some(spec) => {
                    if !spec.allowed_values.is_empty() && !spec.allowed_values.contains(value) {
                        return Err(WfaError::UnacceptableValue {
                            key: key.clone(),
                            value: value.clone(),
                            allowed: spec.allowed_values.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Start a job for the workflow and parse the immediate answer.
    pub async fn submit_job(
        &self,
        workflow_uuid: &str,
        inputs: &InputMap,
        comments: Option<&str>,
    ) -> Result<JobResult> {
        let body = build_workflow_input(inputs, comments);
        let path = format!("workflows/{}/jobs/", workflow_uuid);
        let response = self.send_request(&path, Some(&body)).await?;
        Ok(JobResult::from_params(parse_job_response(&response)?))
    }

    /// Poll the job until it reaches a terminal status or attempts run out.
    ///
    /// The returned result reflects the last response seen.
    pub async fn await_completion(&self, workflow_uuid: &str, job_id: &str) -> Result<JobResult> {
        let path = format!("workflows/{}/jobs/{}", workflow_uuid, job_id);
        let mut attempts = 0;
        let mut message: Option<String> = None;
        let mut still_pending = false;
        let mut last: Option<(Element, String)> = None;

        while attempts < self.max_attempts {
            attempts += 1;
            let response = self.send_request(&path, None).await?;
            let job_info = response.find_child_by_tag_name("jobStatus");
            let status = job_info
                .and_then(|info| info.child_content("jobStatus"))
                .map(str::trim)
                .unwrap_or_default()
                .to_string();

            tracing::debug!(job_id, attempt = attempts, status = %status, "Checked job status");

            still_pending = false;
            match classify_status(&status) {
                StatusClass::Done => {}
                StatusClass::Failed => {
                    let error = job_info
                        .and_then(|info| trimmed_content(info, "errorMessage"))
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Job status is {}.", status));
                    message = Some(error);
                }
                StatusClass::Unexpected => {
                    message = Some(format!("Unexpected job status: {}.", status));
                }
                StatusClass::Pending => still_pending = true,
            }

            last = Some((response, status));
            if !still_pending {
                break;
            }
            if attempts < self.max_attempts {
                tokio::time::sleep(self.check_delay).await;
            }
        }

        let (response, status) = last.ok_or_else(|| {
            WfaError::Configuration("max_attempts_check_job must be at least 1.".to_string())
        })?;

        let mut result = JobResult::from_params(parse_job_response(&response)?);
        if still_pending {
            message = Some(NOT_ENOUGH_TIME_MESSAGE.to_string());
        }

        match message {
            Some(message) => {
                result.error = true;
                result.result = format!("Job {} was failed. Result: {}", path, message);
            }
            None => {
                result.error = false;
                result.result = format!(
                    "Job {} for workflow {} has been finished as {}.",
                    job_id, workflow_uuid, status
                );
            }
        }
        Ok(result)
    }

    /// Validate, submit and wait for a workflow execution.
    pub async fn execute(
        &self,
        workflow_uuid: &str,
        inputs: &InputMap,
        comments: &str,
        operation: Operation,
    ) -> Result<JobResult> {
        self.validate_inputs(operation, inputs)?;
        let submitted = self.submit_job(workflow_uuid, inputs, Some(comments)).await?;

        tracing::debug!(
            endpoint = %self.transport.base_url(),
            workflow = self.workflow(operation).map(|w| w.name.as_str()).unwrap_or_default(),
            result = ?submitted.params,
            "Result of workflow execution"
        );

        let job_id = submitted.job_id().ok_or_else(|| {
            WfaError::MalformedResponse("job submission returned no jobId".to_string())
        })?;
        self.await_completion(workflow_uuid, job_id).await
    }

    /// Turn a failed job result into an error.
    ///
    /// `msg` is appended to the result message when given.
    pub fn check_result(&self, result: &JobResult, msg: Option<&str>) -> Result<()> {
        if result.error {
            let message = match msg {
                Some(msg) => format!("{} {}", result.result, msg),
                None => result.result.clone(),
            };
            return Err(WfaError::JobFailed(message));
        }
        tracing::debug!("{}", result.result);
        Ok(())
    }
}
