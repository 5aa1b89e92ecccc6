use anyhow::Result;
use console::style;
use std::time::Duration;

use super::{AppContext, collect_inputs, flag_value};
use crate::core::store::is_placeholder_run_id;
use crate::core::terminal::{ROCKET, print_error, print_info, print_success, print_warn};

pub async fn list_remote_workflows(args: &[String]) -> Result<()> {
    let Some(repo) = args.first().filter(|a| !a.starts_with("--")) else {
        print_error("Usage: rundesk workflows <owner/name> --user <u> [keyword]");
        return Ok(());
    };
    let Some(user) = flag_value(args, "--user") else {
        print_error("Usage: rundesk workflows <owner/name> --user <u> [keyword]");
        return Ok(());
    };
    let ctx = AppContext::init().await?;
    let user_id = ctx.resolve_user(&user).await?;
    let keyword = args
        .iter()
        .skip(1)
        .find(|a| !a.starts_with("--") && Some(a.as_str()) != Some(user.as_str()))
        .cloned()
        .unwrap_or_default();

    let workflows = ctx
        .workflows()
        .search_workflows(user_id, repo, &keyword)
        .await?;
    if workflows.is_empty() {
        print_info("No workflows found (or the repo is not reachable with this token).");
        return Ok(());
    }
    println!(
        " {:<10} {:<28} {:<42} {}",
        style("id").bold(),
        style("name").bold(),
        style("path").bold(),
        style("state").bold()
    );
    for workflow in workflows {
        println!(
            " {:<10} {:<28} {:<42} {}",
            workflow.id, workflow.name, workflow.path, workflow.state
        );
    }
    Ok(())
}

pub async fn list_repositories(args: &[String]) -> Result<()> {
    let Some(user) = flag_value(args, "--user") else {
        print_error("Usage: rundesk repos --user <u> [owner | owner/name]");
        return Ok(());
    };
    let ctx = AppContext::init().await?;
    let user_id = ctx.resolve_user(&user).await?;
    let target = args
        .iter()
        .find(|a| !a.starts_with("--") && a.as_str() != user.as_str())
        .cloned();

    // `owner/name` shows one repository, a bare owner lists theirs, and no
    // argument lists the authenticated user's.
    if let Some(repo) = target.as_deref().filter(|t| t.contains('/')) {
        match ctx.workflows().get_repository(user_id, repo).await? {
            Some(repository) => {
                println!(" {}", style(&repository.full_name).bold());
                println!("   private: {}", repository.private);
                if let Some(branch) = repository.default_branch {
                    println!("   default branch: {branch}");
                }
                if let Some(url) = repository.html_url {
                    println!("   url: {url}");
                }
            }
            None => print_error("Repository not found or not reachable with this token."),
        }
        return Ok(());
    }

    let repositories = ctx
        .workflows()
        .list_repositories(user_id, target.as_deref())
        .await?;
    if repositories.is_empty() {
        print_info("No repositories visible.");
        return Ok(());
    }
    for repository in repositories {
        println!(
            " {:<40} {}",
            repository.full_name,
            if repository.private { "private" } else { "public" }
        );
    }
    Ok(())
}

pub async fn trigger(args: &[String]) -> Result<()> {
    let ctx = AppContext::init().await?;
    let service = ctx.workflows();

    let ack = if let Some(raw) = flag_value(args, "--config") {
        let config_id: i64 = raw.parse()?;
        service.trigger_config(config_id).await
    } else {
        let (Some(user), Some(repo), Some(workflow)) = (
            flag_value(args, "--user"),
            flag_value(args, "--repo"),
            flag_value(args, "--workflow"),
        ) else {
            print_error(
                "Usage: rundesk trigger --config <id>\n\
                        rundesk trigger --user <u> --repo <owner/name> --workflow <file> \
                 [--branch <ref>] [--input k=v ...]",
            );
            return Ok(());
        };
        let user_id = ctx.resolve_user(&user).await?;
        let branch = flag_value(args, "--branch").unwrap_or_else(|| "main".to_string());
        let inputs = collect_inputs(args)?;
        service
            .trigger_workflow(user_id, &repo, &workflow, &branch, &inputs, None)
            .await
    };

    let ack = match ack {
        Ok(ack) => ack,
        Err(e) => {
            print_error(&format!("Trigger failed: {e}"));
            return Ok(());
        }
    };

    println!(
        "{} Dispatched {} / {} on {}",
        ROCKET,
        style(&ack.repo).bold(),
        style(&ack.workflow).bold(),
        ack.reference
    );

    if args.iter().any(|a| a == "--no-wait") {
        print_info("Run discovery continues in the background; see `rundesk runs` later.");
        return Ok(());
    }

    // The service has already acknowledged; hang around only so the
    // process outlives the fire-and-forget correlation task.
    let deadline = ctx.settings.grace_period_secs + 15;
    for _ in 0..deadline * 5 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if let Some(run) = service
            .get_workflow_runs_from_db(None)
            .await?
            .into_iter()
            .find(|r| r.id == ack.internal_run_id)
        {
            if !is_placeholder_run_id(&run.run_id) {
                print_success(&format!(
                    "Run {} is {}{}",
                    run.run_id,
                    run.status.as_str(),
                    run.html_url
                        .map(|u| format!(" ({u})"))
                        .unwrap_or_default()
                ));
                return Ok(());
            }
        }
    }
    print_warn("Dispatch succeeded but no matching run was found yet.");
    Ok(())
}

pub async fn list(args: &[String]) -> Result<()> {
    let ctx = AppContext::init().await?;
    let config_id = match flag_value(args, "--config") {
        Some(raw) => Some(raw.parse::<i64>()?),
        None => None,
    };
    let runs = ctx.workflows().get_workflow_runs_from_db(config_id).await?;
    if runs.is_empty() {
        print_info("No runs recorded yet.");
        return Ok(());
    }
    println!(
        " {:<5} {:<14} {:<24} {:<16} {:<12} {:<10} {}",
        style("id").bold(),
        style("run").bold(),
        style("repo").bold(),
        style("workflow").bold(),
        style("status").bold(),
        style("result").bold(),
        style("started").bold()
    );
    for run in runs {
        let run_id = if is_placeholder_run_id(&run.run_id) {
            "(pending)".to_string()
        } else {
            run.run_id.clone()
        };
        println!(
            " {:<5} {:<14} {:<24} {:<16} {:<12} {:<10} {}",
            run.id,
            run_id,
            run.repository,
            run.workflow_name,
            run.status.as_str(),
            run.conclusion.as_deref().unwrap_or("-"),
            run.created_at
        );
    }
    Ok(())
}

pub async fn refresh(args: &[String]) -> Result<()> {
    let Some(raw) = args.first() else {
        print_error("Usage: rundesk refresh <run>");
        return Ok(());
    };
    let internal_id: i64 = raw.parse()?;
    let ctx = AppContext::init().await?;
    match ctx.workflows().refresh_workflow_run_status(internal_id).await {
        Ok(run) => print_success(&format!(
            "Run {} is {} ({})",
            run.run_id,
            run.status.as_str(),
            run.conclusion.as_deref().unwrap_or("no conclusion yet")
        )),
        Err(e) => print_error(&format!("Refresh failed: {e}")),
    }
    Ok(())
}

/// Live status straight from GitHub, for runs that were never mirrored
/// locally (or whose mirror is stale).
pub async fn live_status(args: &[String]) -> Result<()> {
    let (Some(user), Some(repo)) = (flag_value(args, "--user"), flag_value(args, "--repo"))
    else {
        print_error("Usage: rundesk status --user <u> --repo <owner/name> <run_id>");
        return Ok(());
    };
    let Some(run_id) = args
        .iter()
        .rev()
        .find(|a| !a.starts_with("--") && a.as_str() != user && a.as_str() != repo)
    else {
        print_error("Usage: rundesk status --user <u> --repo <owner/name> <run_id>");
        return Ok(());
    };
    let ctx = AppContext::init().await?;
    let user_id = ctx.resolve_user(&user).await?;
    match ctx
        .workflows()
        .get_workflow_status(user_id, &repo, run_id)
        .await?
    {
        Some(status) => print_success(&format!("Run {run_id} is {status}")),
        None => print_error("Run not found on GitHub."),
    }
    Ok(())
}

pub async fn cancel(args: &[String]) -> Result<()> {
    let Some(raw) = args.first() else {
        print_error("Usage: rundesk cancel <run>");
        return Ok(());
    };
    let internal_id: i64 = raw.parse()?;
    let ctx = AppContext::init().await?;
    match ctx.workflows().cancel_workflow_run(internal_id).await {
        Ok(()) => print_success("Cancellation requested."),
        Err(e) => print_error(&format!("Cancel failed: {e}")),
    }
    Ok(())
}

pub async fn logs(args: &[String]) -> Result<()> {
    let Some(raw) = args.first() else {
        print_error("Usage: rundesk logs <run>");
        return Ok(());
    };
    let internal_id: i64 = raw.parse()?;
    let ctx = AppContext::init().await?;
    match ctx.workflows().get_workflow_run_logs(internal_id).await {
        Ok(files) => {
            if files.is_empty() {
                print_info("The log archive was empty.");
            }
            for (name, content) in files {
                println!("{}", style(format!("── {name} ──")).bold().cyan());
                println!("{content}");
            }
        }
        Err(e) => print_error(&format!("Logs unavailable: {e}")),
    }
    Ok(())
}

pub async fn rate_limit(args: &[String]) -> Result<()> {
    let ctx = AppContext::init().await?;
    let user_id = match flag_value(args, "--user") {
        Some(raw) => Some(ctx.resolve_user(&raw).await?),
        None => None,
    };
    match ctx.workflows().check_rate_limit(user_id).await? {
        Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
        None => print_error("Rate limit endpoint not reachable."),
    }
    Ok(())
}

pub async fn syslog(args: &[String]) -> Result<()> {
    let ctx = AppContext::init().await?;
    let limit = flag_value(args, "--limit")
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(50);
    let entries = ctx.db.get_system_logs(limit).await?;
    if entries.is_empty() {
        print_info("System log is empty.");
        return Ok(());
    }
    for entry in entries {
        println!(
            " {} [{:<5}] {}",
            style(&entry.created_at).dim(),
            entry.level,
            entry.message
        );
    }
    Ok(())
}
