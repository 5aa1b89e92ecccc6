#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::core::config::Settings;
use crate::core::correlate::locate_triggered_run;
use crate::core::error::ServiceError;
use crate::core::github::GithubClient;
use crate::core::github::types::Workflow;
use crate::core::store::{
    Database, PLACEHOLDER_RUN_PREFIX, RunStatus, WorkflowConfigRecord, WorkflowRunRecord,
    is_placeholder_run_id,
};

/// The façade callers use: maps user/config selections onto GitHub calls
/// and mirrors the results into the store. Owns no state beyond the store
/// handle and settings; a GitHub client is built per call from the acting
/// user's token.
pub struct WorkflowService {
    db: Database,
    settings: Settings,
}

/// Ordered workflow input parameters, as entered.
pub type WorkflowInputs = Vec<(String, String)>;

/// What a trigger returns immediately: dispatch was accepted, correlation
/// is still running in the background.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerAck {
    pub internal_run_id: i64,
    pub placeholder_run_id: String,
    pub repo: String,
    pub workflow: String,
    pub reference: String,
    pub triggered_at: String,
}

/// A saved config with its inputs parsed back out of the JSON column.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigView {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub repo: String,
    pub workflow: String,
    pub branch: String,
    pub inputs: WorkflowInputs,
    pub created_at: String,
    pub updated_at: String,
    pub username: Option<String>,
}

impl From<WorkflowConfigRecord> for ConfigView {
    fn from(record: WorkflowConfigRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            name: record.name,
            repo: record.repo,
            workflow: record.workflow,
            branch: record.branch,
            inputs: parse_inputs_json(record.inputs.as_deref()),
            created_at: record.created_at,
            updated_at: record.updated_at,
            username: record.username,
        }
    }
}

/// Inputs must have unique, non-empty keys. Values are free-form strings.
pub fn validate_inputs(inputs: &[(String, String)]) -> Result<(), ServiceError> {
    let mut seen = std::collections::BTreeSet::new();
    for (key, _) in inputs {
        if key.trim().is_empty() {
            return Err(ServiceError::InvalidInputs(
                "input names must not be empty".into(),
            ));
        }
        if !seen.insert(key.as_str()) {
            return Err(ServiceError::InvalidInputs(format!(
                "duplicate input name '{key}'"
            )));
        }
    }
    Ok(())
}

/// None when there is nothing to store; otherwise a JSON object in entry
/// order.
pub(crate) fn inputs_to_json(inputs: &[(String, String)]) -> Option<String> {
    if inputs.is_empty() {
        return None;
    }
    let mut map = serde_json::Map::new();
    for (key, value) in inputs {
        map.insert(key.clone(), serde_json::Value::String(value.clone()));
    }
    serde_json::to_string(&serde_json::Value::Object(map)).ok()
}

/// Inverse of [`inputs_to_json`]. Malformed JSON degrades to an empty
/// list; non-string values are flattened to their JSON text.
pub(crate) fn parse_inputs_json(raw: Option<&str>) -> WorkflowInputs {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(s) => (key, s),
                other => (key, other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    }
}

impl WorkflowService {
    pub fn new(db: Database, settings: Settings) -> Self {
        Self { db, settings }
    }

    fn client_for(&self, token: &str) -> GithubClient {
        GithubClient::with_token(&self.settings, token)
    }

    async fn user_for_id(&self, user_id: i64) -> Result<(String, String), ServiceError> {
        match self.db.get_user_by_id(user_id).await? {
            Some(user) => Ok((user.username, user.token)),
            None => Err(ServiceError::UserNotFound(user_id)),
        }
    }

    async fn token_for_username(&self, username: &str) -> Result<String, ServiceError> {
        match self.db.get_user_by_username(username).await? {
            Some(user) => Ok(user.token),
            None => Err(ServiceError::UnknownUsername(username.to_string())),
        }
    }

    // ── Saved configs ──

    pub async fn save_config_with_name(
        &self,
        user_id: i64,
        name: &str,
        repo: &str,
        workflow: &str,
        branch: &str,
        inputs: &[(String, String)],
    ) -> Result<i64, ServiceError> {
        validate_inputs(inputs)?;
        if self.db.get_user_by_id(user_id).await?.is_none() {
            return Err(ServiceError::UserNotFound(user_id));
        }
        let id = self
            .db
            .insert_workflow_config(
                user_id,
                name,
                repo,
                workflow,
                branch,
                inputs_to_json(inputs).as_deref(),
            )
            .await?;
        info!("Saved config '{name}' (id {id}) for {repo}/{workflow}");
        Ok(id)
    }

    pub async fn update_config(
        &self,
        config_id: i64,
        user_id: i64,
        name: &str,
        repo: &str,
        workflow: &str,
        branch: &str,
        inputs: &[(String, String)],
    ) -> Result<(), ServiceError> {
        validate_inputs(inputs)?;
        let updated = self
            .db
            .update_workflow_config(
                config_id,
                user_id,
                name,
                repo,
                workflow,
                branch,
                inputs_to_json(inputs).as_deref(),
            )
            .await?;
        if !updated {
            return Err(ServiceError::ConfigNotFound(config_id));
        }
        Ok(())
    }

    pub async fn get_config(&self, config_id: i64) -> Result<Option<ConfigView>, ServiceError> {
        Ok(self
            .db
            .get_workflow_config_by_id(config_id)
            .await?
            .map(ConfigView::from))
    }

    pub async fn get_all_configs(&self) -> Result<Vec<ConfigView>, ServiceError> {
        Ok(self
            .db
            .get_all_workflow_configs()
            .await?
            .into_iter()
            .map(ConfigView::from)
            .collect())
    }

    pub async fn get_configs_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<ConfigView>, ServiceError> {
        Ok(self
            .db
            .get_workflow_configs_by_user(user_id)
            .await?
            .into_iter()
            .map(ConfigView::from)
            .collect())
    }

    pub async fn delete_config(&self, config_id: i64) -> Result<(), ServiceError> {
        if !self.db.delete_workflow_config(config_id).await? {
            return Err(ServiceError::ConfigNotFound(config_id));
        }
        info!("Deleted config {config_id}");
        Ok(())
    }

    // ── Remote workflow lookups ──

    pub async fn list_workflows(
        &self,
        user_id: i64,
        repo: &str,
    ) -> Result<Vec<Workflow>, ServiceError> {
        let (_, token) = self.user_for_id(user_id).await?;
        Ok(self.client_for(&token).list_workflows(repo).await)
    }

    /// Case-insensitive filter over workflow name and path. An empty
    /// keyword returns everything.
    pub async fn search_workflows(
        &self,
        user_id: i64,
        repo: &str,
        keyword: &str,
    ) -> Result<Vec<Workflow>, ServiceError> {
        let workflows = self.list_workflows(user_id, repo).await?;
        if keyword.is_empty() {
            return Ok(workflows);
        }
        let needle = keyword.to_lowercase();
        Ok(workflows
            .into_iter()
            .filter(|w| {
                w.name.to_lowercase().contains(&needle) || w.path.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// True iff `workflow` names an existing workflow in the repo, by
    /// display name, numeric id, or file name. Falls back to a direct
    /// lookup, which accepts both file names and ids.
    pub async fn validate_workflow_config(
        &self,
        user_id: i64,
        repo: &str,
        workflow: &str,
    ) -> Result<bool, ServiceError> {
        let (_, token) = self.user_for_id(user_id).await?;
        let client = self.client_for(&token);
        let listed = client.list_workflows(repo).await.iter().any(|w| {
            w.name == workflow
                || w.id.to_string() == workflow
                || w.path.rsplit('/').next() == Some(workflow)
        });
        if listed {
            return Ok(true);
        }
        Ok(client.get_workflow(repo, workflow).await.is_some())
    }

    pub async fn list_repositories(
        &self,
        user_id: i64,
        owner: Option<&str>,
    ) -> Result<Vec<crate::core::github::types::Repository>, ServiceError> {
        let (_, token) = self.user_for_id(user_id).await?;
        Ok(self.client_for(&token).list_repositories(owner).await)
    }

    pub async fn get_repository(
        &self,
        user_id: i64,
        repo: &str,
    ) -> Result<Option<crate::core::github::types::Repository>, ServiceError> {
        let (_, token) = self.user_for_id(user_id).await?;
        Ok(self.client_for(&token).get_repository(repo).await)
    }

    // ── Triggering ──

    /// Dispatches the workflow and acknowledges immediately. The run id is
    /// unknown at this point: a placeholder row is written and a
    /// fire-and-forget correlation task resolves it later through its own
    /// store connection.
    pub async fn trigger_workflow(
        &self,
        user_id: i64,
        repo: &str,
        workflow: &str,
        branch: &str,
        inputs: &[(String, String)],
        config_id: Option<i64>,
    ) -> Result<TriggerAck, ServiceError> {
        validate_inputs(inputs)?;
        let (username, token) = self.user_for_id(user_id).await?;
        let client = self.client_for(&token);

        if !client.test_connection().await {
            let _ = self
                .db
                .insert_system_log("error", &format!("trigger {repo}/{workflow}: not connected"))
                .await;
            return Err(ServiceError::NotConnected);
        }

        let trigger_time = Utc::now();
        if !client.trigger_workflow(repo, workflow, branch, inputs).await {
            let _ = self
                .db
                .insert_system_log("error", &format!("dispatch of {repo}/{workflow} rejected"))
                .await;
            return Err(ServiceError::DispatchFailed {
                repo: repo.to_string(),
                workflow: workflow.to_string(),
            });
        }

        let placeholder = format!("{PLACEHOLDER_RUN_PREFIX}{}", uuid::Uuid::new_v4());
        let internal_run_id = self
            .db
            .insert_workflow_run(
                config_id,
                &placeholder,
                RunStatus::Queued,
                workflow,
                repo,
                branch,
                &username,
            )
            .await?;
        let _ = self
            .db
            .insert_system_log("info", &format!("dispatched {repo}/{workflow} on {branch}"))
            .await;
        info!("Dispatched {repo}/{workflow} on {branch}, correlating in background");

        self.spawn_correlation(
            internal_run_id,
            repo.to_string(),
            workflow.to_string(),
            token,
            trigger_time,
        );

        Ok(TriggerAck {
            internal_run_id,
            placeholder_run_id: placeholder,
            repo: repo.to_string(),
            workflow: workflow.to_string(),
            reference: branch.to_string(),
            triggered_at: trigger_time.to_rfc3339(),
        })
    }

    /// Trigger a saved config.
    pub async fn trigger_config(&self, config_id: i64) -> Result<TriggerAck, ServiceError> {
        let Some(config) = self.get_config(config_id).await? else {
            return Err(ServiceError::ConfigNotFound(config_id));
        };
        self.trigger_workflow(
            config.user_id,
            &config.repo,
            &config.workflow,
            &config.branch,
            &config.inputs,
            Some(config_id),
        )
        .await
    }

    /// No cancellation handle: the task only ever writes to the store,
    /// which the foreground re-reads on its own schedule.
    fn spawn_correlation(
        &self,
        internal_run_id: i64,
        repo: String,
        workflow: String,
        token: String,
        trigger_time: DateTime<Utc>,
    ) {
        let db = self.db.clone();
        let settings = self.settings.clone();
        tokio::spawn(async move {
            // Own connection: the foreground handle is not shared across
            // tasks.
            let store = match db.reopen().await {
                Ok(store) => store,
                Err(e) => {
                    error!("correlation: could not reopen store: {e}");
                    return;
                }
            };
            let client = GithubClient::with_token(&settings, &token);
            let located = locate_triggered_run(
                &client,
                &repo,
                &workflow,
                trigger_time,
                Duration::from_secs(settings.grace_period_secs),
                settings.correlation_page_size,
            )
            .await;

            match located {
                Some(run) => {
                    let status = RunStatus::parse(run.status.as_deref().unwrap_or("unknown"));
                    let resolved = store
                        .resolve_pending_run(
                            internal_run_id,
                            &run.id.to_string(),
                            status,
                            run.conclusion.as_deref(),
                            run.html_url.as_deref(),
                            run.logs_url.as_deref(),
                            Some(&run.created_at),
                        )
                        .await;
                    match resolved {
                        Ok(true) => {
                            let _ = store
                                .insert_system_log(
                                    "info",
                                    &format!("correlated {repo}/{workflow} with run {}", run.id),
                                )
                                .await;
                        }
                        Ok(false) => {
                            warn!("correlation: row {internal_run_id} vanished before resolution")
                        }
                        Err(e) => error!("correlation: persisting run {} failed: {e}", run.id),
                    }
                }
                None => {
                    let _ = store
                        .insert_system_log(
                            "warn",
                            &format!("no run located for {repo}/{workflow} after dispatch"),
                        )
                        .await;
                }
            }
        });
    }

    // ── Mirrored runs ──

    pub async fn get_workflow_runs_from_db(
        &self,
        config_id: Option<i64>,
    ) -> Result<Vec<WorkflowRunRecord>, ServiceError> {
        Ok(self.db.get_workflow_runs(config_id).await?)
    }

    /// Re-reads the run from GitHub and updates the mirror row.
    pub async fn refresh_workflow_run_status(
        &self,
        internal_id: i64,
    ) -> Result<WorkflowRunRecord, ServiceError> {
        let Some(run) = self.db.get_workflow_run_by_id(internal_id).await? else {
            return Err(ServiceError::RunNotFound(internal_id));
        };
        if is_placeholder_run_id(&run.run_id) {
            return Err(ServiceError::PlaceholderRun(run.run_id));
        }

        let token = self.token_for_username(&run.trigger_user).await?;
        let Some(remote) = self
            .client_for(&token)
            .get_workflow_run(&run.repository, &run.run_id)
            .await
        else {
            return Err(ServiceError::RefreshFailed(run.run_id));
        };

        let status = RunStatus::parse(remote.status.as_deref().unwrap_or("unknown"));
        self.db
            .update_workflow_run_status(internal_id, status, remote.conclusion.as_deref())
            .await?;

        match self.db.get_workflow_run_by_id(internal_id).await? {
            Some(updated) => Ok(updated),
            None => Err(ServiceError::RunNotFound(internal_id)),
        }
    }

    /// Remote cancel. Refused locally for placeholder rows and runs that
    /// are already terminal — no doomed API call is made in either case.
    pub async fn cancel_workflow_run(&self, internal_id: i64) -> Result<(), ServiceError> {
        let Some(run) = self.db.get_workflow_run_by_id(internal_id).await? else {
            return Err(ServiceError::RunNotFound(internal_id));
        };
        if is_placeholder_run_id(&run.run_id) {
            return Err(ServiceError::PlaceholderRun(run.run_id));
        }
        if run.status.is_terminal() {
            return Err(ServiceError::AlreadyTerminal {
                run_id: run.run_id,
                status: run.status.as_str().to_string(),
            });
        }

        let token = self.token_for_username(&run.trigger_user).await?;
        if !self
            .client_for(&token)
            .cancel_workflow_run(&run.repository, &run.run_id)
            .await
        {
            return Err(ServiceError::CancelRejected(run.run_id));
        }
        let _ = self
            .db
            .insert_system_log("info", &format!("cancel requested for run {}", run.run_id))
            .await;
        Ok(())
    }

    pub async fn get_workflow_run_logs(
        &self,
        internal_id: i64,
    ) -> Result<BTreeMap<String, String>, ServiceError> {
        let Some(run) = self.db.get_workflow_run_by_id(internal_id).await? else {
            return Err(ServiceError::RunNotFound(internal_id));
        };
        if is_placeholder_run_id(&run.run_id) {
            return Err(ServiceError::PlaceholderRun(run.run_id));
        }

        let token = self.token_for_username(&run.trigger_user).await?;
        match self
            .client_for(&token)
            .get_workflow_run_logs(&run.repository, &run.run_id)
            .await
        {
            Some(logs) => Ok(logs),
            None => Err(ServiceError::LogsUnavailable(run.run_id)),
        }
    }

    /// Status string straight from GitHub, bypassing the mirror.
    pub async fn get_workflow_status(
        &self,
        user_id: i64,
        repo: &str,
        run_id: &str,
    ) -> Result<Option<String>, ServiceError> {
        let (_, token) = self.user_for_id(user_id).await?;
        Ok(self
            .client_for(&token)
            .get_workflow_run(repo, run_id)
            .await
            .and_then(|run| run.status))
    }

    pub async fn check_rate_limit(
        &self,
        user_id: Option<i64>,
    ) -> Result<Option<serde_json::Value>, ServiceError> {
        let client = match user_id {
            Some(id) => {
                let (_, token) = self.user_for_id(id).await?;
                self.client_for(&token)
            }
            None => GithubClient::new(&self.settings),
        };
        Ok(client.check_rate_limit().await)
    }
}
