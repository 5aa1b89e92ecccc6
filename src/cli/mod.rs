mod configs;
mod install;
mod runs;
mod users;

use anyhow::Result;
use console::style;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::core::config::Settings;
use crate::core::error::ServiceError;
use crate::core::store::Database;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::core::users::UserService;
use crate::core::workflows::WorkflowService;

/// Everything a command handler needs. Services are cheap throwaway
/// wrappers around the shared store handle.
pub(crate) struct AppContext {
    pub settings: Settings,
    pub db: Database,
}

impl AppContext {
    pub async fn init() -> Result<Self> {
        let settings = Settings::load().await;
        let db = Database::open(settings.db_path(), settings.encrypt_tokens).await?;
        Ok(Self { settings, db })
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.db.clone(), self.settings.clone())
    }

    pub fn workflows(&self) -> WorkflowService {
        WorkflowService::new(self.db.clone(), self.settings.clone())
    }

    /// `--user` takes a numeric id or a username.
    pub async fn resolve_user(&self, raw: &str) -> Result<i64> {
        if let Ok(id) = raw.parse::<i64>() {
            return Ok(id);
        }
        match self.users().get_user_by_username(raw).await? {
            Some(user) => Ok(user.id),
            None => Err(ServiceError::UnknownUsername(raw.to_string()).into()),
        }
    }
}

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Setup")
        .command("install", "Create the data directory, config and database")
        .print();

    GuideSection::new("Users")
        .command("user add <name>", "Store a GitHub user (token prompted)")
        .command("user list", "List stored users")
        .command("user info <id|name>", "Show the user's GitHub profile")
        .command("user login <name>", "Verify a token against a stored user")
        .command("user update <id|name>", "Rename a user (token re-checked)")
        .command("user refresh <id|name>", "Replace the stored token")
        .command("user remove <id|name>", "Delete a user and their configs")
        .command("user stats", "Count users with live tokens")
        .print();

    GuideSection::new("Workflows")
        .command("workflows <repo> --user <u>", "List (or search) workflows")
        .command("repos --user <u> [owner]", "List reachable repositories")
        .command("config save", "Save a trigger configuration")
        .command("config update <id>", "Edit a saved configuration")
        .command("config list [--user <u>]", "List saved configurations")
        .command("config delete <id>", "Delete a configuration")
        .print();

    GuideSection::new("Runs")
        .command("trigger --config <id>", "Dispatch a saved configuration")
        .command("trigger --user <u> --repo ...", "Dispatch ad hoc")
        .command("runs [--config <id>]", "List mirrored runs")
        .command("refresh <run>", "Re-read one run's status from GitHub")
        .command("status --user <u> --repo <r> <id>", "Live status of a remote run")
        .command("cancel <run>", "Cancel a run")
        .command("logs <run>", "Fetch a run's log files")
        .print();

    GuideSection::new("Diagnostics")
        .command("ratelimit [--user <u>]", "Show GitHub API quota")
        .command("syslog [--limit <n>]", "Show recent system log entries")
        .print();

    println!(
        " {} {} <command> [options]\n",
        style("Usage:").bold(),
        style("rundesk").green()
    );
}

/// `--flag value` lookup over raw args.
pub(crate) fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Collects repeated `--input key=value` pairs in order.
pub(crate) fn collect_inputs(args: &[String]) -> Result<Vec<(String, String)>> {
    let mut inputs = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--input" {
            let Some(pair) = args.get(i + 1) else {
                anyhow::bail!("--input expects key=value");
            };
            let Some((key, value)) = pair.split_once('=') else {
                anyhow::bail!("--input expects key=value, got '{pair}'");
            };
            inputs.push((key.to_string(), value.to_string()));
            i += 2;
        } else {
            i += 1;
        }
    }
    Ok(inputs)
}

pub async fn run_main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        print_help();
        return Ok(());
    };
    let rest = &args[1..];

    match command {
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        "install" => install::run().await,
        "user" => users::run(rest).await,
        "workflows" => runs::list_remote_workflows(rest).await,
        "repos" => runs::list_repositories(rest).await,
        "config" => configs::run(rest).await,
        "trigger" => runs::trigger(rest).await,
        "runs" => runs::list(rest).await,
        "refresh" => runs::refresh(rest).await,
        "status" => runs::live_status(rest).await,
        "cancel" => runs::cancel(rest).await,
        "logs" => runs::logs(rest).await,
        "ratelimit" => runs::rate_limit(rest).await,
        "syslog" => runs::syslog(rest).await,
        other => {
            print_error(&format!("Unknown command: {other}"));
            print_help();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn flag_value_finds_following_token() {
        let a = args(&["--user", "alice", "--repo", "acme/app"]);
        assert_eq!(flag_value(&a, "--user").as_deref(), Some("alice"));
        assert_eq!(flag_value(&a, "--repo").as_deref(), Some("acme/app"));
        assert!(flag_value(&a, "--branch").is_none());
    }

    #[test]
    fn collect_inputs_keeps_order_and_rejects_bad_pairs() {
        let a = args(&["--input", "env=prod", "--user", "1", "--input", "region=eu"]);
        assert_eq!(
            collect_inputs(&a).unwrap(),
            vec![
                ("env".to_string(), "prod".to_string()),
                ("region".to_string(), "eu".to_string())
            ]
        );
        assert!(collect_inputs(&args(&["--input", "novalue"])).is_err());
        assert!(collect_inputs(&args(&["--input"])).is_err());
    }
}
