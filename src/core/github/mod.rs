pub mod types;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;
use tracing::{error, warn};

use crate::core::config::Settings;
use types::{GithubUser, Repository, Workflow, WorkflowList, WorkflowRun, WorkflowRunList};

/// Authenticated wrapper over the GitHub Actions REST endpoints. One client
/// is built per credential; the token is fixed at construction. Transport
/// failures and non-2xx statuses uniformly become absent/empty/false
/// results with a logged diagnostic; nothing here retries.
pub struct GithubClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl GithubClient {
    pub fn new(settings: &Settings) -> Self {
        Self::build(settings, None)
    }

    pub fn with_token(settings: &Settings, token: &str) -> Self {
        Self::build(settings, Some(token.to_string()))
    }

    fn build(settings: &Settings, token: Option<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent)
                .unwrap_or_else(|_| HeaderValue::from_static("rundesk")),
        );
        if let Some(token) = &token {
            if let Ok(mut value) = HeaderValue::from_str(&format!("token {token}")) {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.http_timeout_secs))
            .default_headers(headers)
            .build()
            .expect("HTTP client construction only fails on broken TLS backends");

        Self {
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            token,
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Shared GET plumbing: fail fast without a token, reduce transport and
    /// status failures to None.
    async fn get_json<T: DeserializeOwned>(
        &self,
        op: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Option<T> {
        if self.token.is_none() {
            warn!("{op}: no token configured, skipping request");
            return None;
        }
        let res = match self.http.get(self.url(path)).query(query).send().await {
            Ok(res) => res,
            Err(e) => {
                error!("{op}: request failed: {e}");
                return None;
            }
        };
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("{op}: GitHub returned {status}: {body}");
            return None;
        }
        match res.json::<T>().await {
            Ok(value) => Some(value),
            Err(e) => {
                error!("{op}: malformed response body: {e}");
                None
            }
        }
    }

    /// `GET /user` with an explicit candidate token; true iff HTTP 200.
    pub async fn test_token(&self, token: &str) -> bool {
        let header = match HeaderValue::from_str(&format!("token {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                value
            }
            Err(_) => return false,
        };
        match self
            .http
            .get(self.url("/user"))
            .header(AUTHORIZATION, header)
            .send()
            .await
        {
            Ok(res) => res.status() == StatusCode::OK,
            Err(e) => {
                error!("test_token: request failed: {e}");
                false
            }
        }
    }

    /// `GET /user` with this client's own token.
    pub async fn test_connection(&self) -> bool {
        self.get_user_info().await.is_some()
    }

    pub async fn get_user_info(&self) -> Option<GithubUser> {
        self.get_json("get_user_info", "/user", &[]).await
    }

    pub async fn list_workflows(&self, repo: &str) -> Vec<Workflow> {
        self.get_json::<WorkflowList>(
            "list_workflows",
            &format!("/repos/{repo}/actions/workflows"),
            &[],
        )
        .await
        .map(|list| list.workflows)
        .unwrap_or_default()
    }

    pub async fn get_workflow(&self, repo: &str, workflow_id: &str) -> Option<Workflow> {
        self.get_json(
            "get_workflow",
            &format!("/repos/{repo}/actions/workflows/{workflow_id}"),
            &[],
        )
        .await
    }

    /// `POST .../dispatches`. GitHub acknowledges with 204 (sometimes 202)
    /// and an empty body; the run id is never returned here, which is why
    /// the correlator exists.
    pub async fn trigger_workflow(
        &self,
        repo: &str,
        workflow_id: &str,
        reference: &str,
        inputs: &[(String, String)],
    ) -> bool {
        if self.token.is_none() {
            warn!("trigger_workflow: no token configured, skipping request");
            return false;
        }

        let mut body = serde_json::Map::new();
        body.insert(
            "ref".to_string(),
            serde_json::Value::String(reference.to_string()),
        );
        if !inputs.is_empty() {
            let mut map = serde_json::Map::new();
            for (key, value) in inputs {
                map.insert(key.clone(), serde_json::Value::String(value.clone()));
            }
            body.insert("inputs".to_string(), serde_json::Value::Object(map));
        }

        let path = format!("/repos/{repo}/actions/workflows/{workflow_id}/dispatches");
        let res = match self.http.post(self.url(&path)).json(&body).send().await {
            Ok(res) => res,
            Err(e) => {
                error!("trigger_workflow: dispatch to {repo}/{workflow_id} failed: {e}");
                return false;
            }
        };
        let status = res.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::ACCEPTED {
            true
        } else {
            let body = res.text().await.unwrap_or_default();
            error!("trigger_workflow: {repo}/{workflow_id} rejected with {status}: {body}");
            false
        }
    }

    /// Newest-first page of runs, for the whole repo or one workflow.
    pub async fn list_workflow_runs(
        &self,
        repo: &str,
        workflow_id: Option<&str>,
        per_page: u32,
    ) -> Vec<WorkflowRun> {
        let path = match workflow_id {
            Some(id) => format!("/repos/{repo}/actions/workflows/{id}/runs"),
            None => format!("/repos/{repo}/actions/runs"),
        };
        self.get_json::<WorkflowRunList>(
            "list_workflow_runs",
            &path,
            &[("per_page", per_page.to_string())],
        )
        .await
        .map(|list| list.workflow_runs)
        .unwrap_or_default()
    }

    pub async fn get_workflow_run(&self, repo: &str, run_id: &str) -> Option<WorkflowRun> {
        self.get_json(
            "get_workflow_run",
            &format!("/repos/{repo}/actions/runs/{run_id}"),
            &[],
        )
        .await
    }

    /// Success iff GitHub answers 202.
    pub async fn cancel_workflow_run(&self, repo: &str, run_id: &str) -> bool {
        if self.token.is_none() {
            warn!("cancel_workflow_run: no token configured, skipping request");
            return false;
        }
        let path = format!("/repos/{repo}/actions/runs/{run_id}/cancel");
        match self.http.post(self.url(&path)).send().await {
            Ok(res) => {
                let status = res.status();
                if status == StatusCode::ACCEPTED {
                    true
                } else {
                    let body = res.text().await.unwrap_or_default();
                    error!("cancel_workflow_run: {repo}#{run_id} rejected with {status}: {body}");
                    false
                }
            }
            Err(e) => {
                error!("cancel_workflow_run: request for {repo}#{run_id} failed: {e}");
                false
            }
        }
    }

    /// Downloads the run's log archive (a zip of per-job text files) and
    /// returns {entry name → decoded text}. Undecodable bytes become
    /// U+FFFD; a malformed archive degrades to an empty mapping.
    pub async fn get_workflow_run_logs(
        &self,
        repo: &str,
        run_id: &str,
    ) -> Option<BTreeMap<String, String>> {
        if self.token.is_none() {
            warn!("get_workflow_run_logs: no token configured, skipping request");
            return None;
        }
        let path = format!("/repos/{repo}/actions/runs/{run_id}/logs");
        let res = match self.http.get(self.url(&path)).send().await {
            Ok(res) => res,
            Err(e) => {
                error!("get_workflow_run_logs: request for {repo}#{run_id} failed: {e}");
                return None;
            }
        };
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("get_workflow_run_logs: {repo}#{run_id} returned {status}: {body}");
            return None;
        }
        let bytes = match res.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("get_workflow_run_logs: reading archive for {repo}#{run_id} failed: {e}");
                return None;
            }
        };
        Some(unpack_log_archive(&bytes))
    }

    pub async fn list_repositories(&self, username: Option<&str>) -> Vec<Repository> {
        let path = match username {
            Some(name) => format!("/users/{name}/repos"),
            None => "/user/repos".to_string(),
        };
        self.get_json::<Vec<Repository>>("list_repositories", &path, &[])
            .await
            .unwrap_or_default()
    }

    pub async fn get_repository(&self, repo: &str) -> Option<Repository> {
        self.get_json("get_repository", &format!("/repos/{repo}"), &[])
            .await
    }

    /// Raw passthrough of GitHub's rate-limit payload. Works without a
    /// token; back-off policy is the caller's concern.
    pub async fn check_rate_limit(&self) -> Option<serde_json::Value> {
        let res = match self.http.get(self.url("/rate_limit")).send().await {
            Ok(res) => res,
            Err(e) => {
                error!("check_rate_limit: request failed: {e}");
                return None;
            }
        };
        if !res.status().is_success() {
            error!("check_rate_limit: GitHub returned {}", res.status());
            return None;
        }
        res.json().await.ok()
    }
}

fn unpack_log_archive(bytes: &[u8]) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    let mut archive = match zip::ZipArchive::new(std::io::Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(e) => {
            warn!("log archive is not a readable zip: {e}");
            return entries;
        }
    };
    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                warn!("skipping unreadable archive entry {index}: {e}");
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }
        let mut raw = Vec::new();
        if let Err(e) = file.read_to_end(&mut raw) {
            warn!("skipping archive entry {}: {e}", file.name());
            continue;
        }
        entries.insert(
            file.name().to_string(),
            String::from_utf8_lossy(&raw).into_owned(),
        );
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings_for(server: &mockito::ServerGuard) -> Settings {
        Settings {
            api_base_url: server.url(),
            ..Settings::default()
        }
    }

    fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            let options = zip::write::SimpleFileOptions::default();
            for (name, content) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[tokio::test]
    async fn test_token_is_true_only_on_200() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/user")
            .match_header("authorization", "token good")
            .with_status(200)
            .with_body(r#"{"login":"alice","id":1}"#)
            .create_async()
            .await;
        let client = GithubClient::new(&settings_for(&server));
        assert!(client.test_token("good").await);
        ok.assert_async().await;

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user")
            .with_status(401)
            .with_body(r#"{"message":"Bad credentials"}"#)
            .create_async()
            .await;
        let client = GithubClient::new(&settings_for(&server));
        assert!(!client.test_token("bad").await);
    }

    #[tokio::test]
    async fn operations_without_token_never_touch_the_network() {
        let mut server = mockito::Server::new_async().await;
        let untouched = server
            .mock("GET", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let untouched_post = server
            .mock("POST", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = GithubClient::new(&settings_for(&server));
        assert!(client.get_user_info().await.is_none());
        assert!(client.list_workflows("acme/app").await.is_empty());
        assert!(
            !client
                .trigger_workflow("acme/app", "ci.yml", "main", &[])
                .await
        );
        assert!(!client.cancel_workflow_run("acme/app", "1").await);
        assert!(client.get_workflow_run_logs("acme/app", "1").await.is_none());
        assert!(client.list_repositories(None).await.is_empty());

        untouched.assert_async().await;
        untouched_post.assert_async().await;
    }

    #[tokio::test]
    async fn list_workflows_parses_payload_and_degrades_on_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/app/actions/workflows")
            .with_status(200)
            .with_body(
                r#"{"total_count":2,"workflows":[
                    {"id":10,"name":"CI","path":".github/workflows/ci.yml","state":"active"},
                    {"id":11,"name":"Release","path":".github/workflows/release.yml","state":"active"}
                ]}"#,
            )
            .create_async()
            .await;
        let client = GithubClient::with_token(&settings_for(&server), "t");
        let workflows = client.list_workflows("acme/app").await;
        assert_eq!(workflows.len(), 2);
        assert_eq!(workflows[0].name, "CI");

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/app/actions/workflows")
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;
        let client = GithubClient::with_token(&settings_for(&server), "t");
        assert!(client.list_workflows("acme/app").await.is_empty());
    }

    #[tokio::test]
    async fn trigger_workflow_posts_ref_and_inputs() {
        let mut server = mockito::Server::new_async().await;
        let dispatch = server
            .mock("POST", "/repos/acme/app/actions/workflows/ci.yml/dispatches")
            .match_header("authorization", "token t")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "ref": "main",
                "inputs": {"env": "prod"}
            })))
            .with_status(204)
            .create_async()
            .await;
        let client = GithubClient::with_token(&settings_for(&server), "t");
        let inputs = vec![("env".to_string(), "prod".to_string())];
        assert!(
            client
                .trigger_workflow("acme/app", "ci.yml", "main", &inputs)
                .await
        );
        dispatch.assert_async().await;
    }

    #[tokio::test]
    async fn trigger_workflow_omits_inputs_when_empty() {
        let mut server = mockito::Server::new_async().await;
        let dispatch = server
            .mock("POST", "/repos/acme/app/actions/workflows/ci.yml/dispatches")
            .match_body(mockito::Matcher::Json(serde_json::json!({"ref": "main"})))
            .with_status(204)
            .create_async()
            .await;
        let client = GithubClient::with_token(&settings_for(&server), "t");
        assert!(
            client
                .trigger_workflow("acme/app", "ci.yml", "main", &[])
                .await
        );
        dispatch.assert_async().await;
    }

    #[tokio::test]
    async fn trigger_workflow_fails_on_remote_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/repos/acme/app/actions/workflows/ci.yml/dispatches")
            .with_status(422)
            .with_body(r#"{"message":"Unexpected inputs"}"#)
            .create_async()
            .await;
        let client = GithubClient::with_token(&settings_for(&server), "t");
        assert!(
            !client
                .trigger_workflow("acme/app", "ci.yml", "main", &[])
                .await
        );
    }

    #[tokio::test]
    async fn cancel_requires_exactly_202() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/repos/acme/app/actions/runs/9/cancel")
            .with_status(202)
            .create_async()
            .await;
        let client = GithubClient::with_token(&settings_for(&server), "t");
        assert!(client.cancel_workflow_run("acme/app", "9").await);

        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/repos/acme/app/actions/runs/9/cancel")
            .with_status(409)
            .with_body(r#"{"message":"Cannot cancel"}"#)
            .create_async()
            .await;
        let client = GithubClient::with_token(&settings_for(&server), "t");
        assert!(!client.cancel_workflow_run("acme/app", "9").await);
    }

    #[tokio::test]
    async fn list_workflow_runs_targets_workflow_or_repo_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let scoped = server
            .mock("GET", "/repos/acme/app/actions/workflows/ci.yml/runs")
            .match_query(mockito::Matcher::UrlEncoded(
                "per_page".into(),
                "5".into(),
            ))
            .with_status(200)
            .with_body(
                r#"{"total_count":1,"workflow_runs":[
                    {"id":42,"name":"CI","head_branch":"main","status":"queued",
                     "conclusion":null,"html_url":"h","logs_url":"l",
                     "created_at":"2024-06-01T12:00:05Z"}
                ]}"#,
            )
            .create_async()
            .await;
        let client = GithubClient::with_token(&settings_for(&server), "t");
        let runs = client.list_workflow_runs("acme/app", Some("ci.yml"), 5).await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].id, 42);
        scoped.assert_async().await;
    }

    #[tokio::test]
    async fn log_archive_is_unpacked_with_lossy_decoding() {
        let archive = zip_archive(&[
            ("1_setup.txt", b"checkout ok\n".as_slice()),
            ("2_build.txt", &[0x62, 0x61, 0xFF, 0xFE, 0x64][..]),
        ]);
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/app/actions/runs/42/logs")
            .with_status(200)
            .with_body(archive)
            .create_async()
            .await;

        let client = GithubClient::with_token(&settings_for(&server), "t");
        let logs = client.get_workflow_run_logs("acme/app", "42").await.unwrap();

        assert_eq!(
            logs.keys().collect::<Vec<_>>(),
            vec!["1_setup.txt", "2_build.txt"]
        );
        assert_eq!(logs["1_setup.txt"], "checkout ok\n");
        assert!(logs["2_build.txt"].contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn malformed_log_archive_degrades_to_empty_mapping() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repos/acme/app/actions/runs/42/logs")
            .with_status(200)
            .with_body("this is not a zip")
            .create_async()
            .await;
        let client = GithubClient::with_token(&settings_for(&server), "t");
        let logs = client.get_workflow_run_logs("acme/app", "42").await.unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn rate_limit_is_passed_through_verbatim() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rate_limit")
            .with_status(200)
            .with_body(r#"{"resources":{"core":{"limit":5000,"remaining":4999}}}"#)
            .create_async()
            .await;
        let client = GithubClient::new(&settings_for(&server));
        let payload = client.check_rate_limit().await.unwrap();
        assert_eq!(payload["resources"]["core"]["limit"], 5000);
    }
}
