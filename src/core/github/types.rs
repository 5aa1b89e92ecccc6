use serde::Deserialize;

// Wire shapes for the subset of the GitHub REST v3 payloads this tool
// reads. Unknown fields are ignored by serde.

#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub login: String,
    pub id: u64,
    pub name: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowList {
    pub total_count: u64,
    #[serde(default)]
    pub workflows: Vec<Workflow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub name: Option<String>,
    pub head_branch: Option<String>,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub html_url: Option<String>,
    pub logs_url: Option<String>,
    /// Left as the raw timestamp string; the correlator normalizes it to
    /// UTC before any comparison.
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRunList {
    pub total_count: u64,
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub full_name: String,
    pub private: bool,
    pub default_branch: Option<String>,
    pub html_url: Option<String>,
}
