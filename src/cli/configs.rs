use anyhow::Result;
use console::style;

use super::{AppContext, collect_inputs, flag_value};
use crate::core::terminal::{print_error, print_info, print_success, print_warn};

pub async fn run(args: &[String]) -> Result<()> {
    let Some(action) = args.first().map(String::as_str) else {
        print_error("Usage: rundesk config <save|update|list|delete>");
        return Ok(());
    };
    let ctx = AppContext::init().await?;
    let rest = &args[1..];

    match action {
        "save" => {
            let (Some(user), Some(repo), Some(workflow)) = (
                flag_value(rest, "--user"),
                flag_value(rest, "--repo"),
                flag_value(rest, "--workflow"),
            ) else {
                print_error(
                    "Usage: rundesk config save --user <u> --repo <owner/name> --workflow <file> \
                     [--name <display>] [--branch <ref>] [--input k=v ...]",
                );
                return Ok(());
            };
            let user_id = ctx.resolve_user(&user).await?;
            let branch = flag_value(rest, "--branch").unwrap_or_else(|| "main".to_string());
            let name =
                flag_value(rest, "--name").unwrap_or_else(|| format!("{repo}/{workflow}"));
            let inputs = collect_inputs(rest)?;

            if !ctx
                .workflows()
                .validate_workflow_config(user_id, &repo, &workflow)
                .await
                .unwrap_or(false)
            {
                print_warn(&format!(
                    "'{workflow}' was not found in {repo}; saving anyway."
                ));
            }

            match ctx
                .workflows()
                .save_config_with_name(user_id, &name, &repo, &workflow, &branch, &inputs)
                .await
            {
                Ok(id) => print_success(&format!("Saved configuration '{name}' (id {id})")),
                Err(e) => print_error(&format!("Could not save configuration: {e}")),
            }
        }
        "list" => {
            let configs = match flag_value(rest, "--user") {
                Some(user) => {
                    let user_id = ctx.resolve_user(&user).await?;
                    ctx.workflows().get_configs_for_user(user_id).await?
                }
                None => ctx.workflows().get_all_configs().await?,
            };
            if configs.is_empty() {
                print_info("No configurations saved yet.");
                return Ok(());
            }
            println!(
                " {:<5} {:<22} {:<24} {:<18} {:<10} {}",
                style("id").bold(),
                style("name").bold(),
                style("repo").bold(),
                style("workflow").bold(),
                style("branch").bold(),
                style("owner").bold()
            );
            for config in configs {
                println!(
                    " {:<5} {:<22} {:<24} {:<18} {:<10} {}",
                    config.id,
                    config.name,
                    config.repo,
                    config.workflow,
                    config.branch,
                    config.username.as_deref().unwrap_or("-")
                );
                for (key, value) in &config.inputs {
                    println!("       {} {key}={value}", style("·").dim());
                }
            }
        }
        "update" => {
            let Some(raw) = rest.first() else {
                print_error("Usage: rundesk config update <id> [--name ...] [--repo ...] [--workflow ...] [--branch ...] [--input k=v ...]");
                return Ok(());
            };
            let config_id: i64 = raw.parse()?;
            let Some(existing) = ctx.workflows().get_config(config_id).await? else {
                print_error("No such configuration.");
                return Ok(());
            };

            let name = flag_value(rest, "--name").unwrap_or(existing.name);
            let repo = flag_value(rest, "--repo").unwrap_or(existing.repo);
            let workflow = flag_value(rest, "--workflow").unwrap_or(existing.workflow);
            let branch = flag_value(rest, "--branch").unwrap_or(existing.branch);
            let inputs = {
                let given = collect_inputs(rest)?;
                if given.is_empty() { existing.inputs } else { given }
            };

            match ctx
                .workflows()
                .update_config(
                    config_id,
                    existing.user_id,
                    &name,
                    &repo,
                    &workflow,
                    &branch,
                    &inputs,
                )
                .await
            {
                Ok(()) => print_success(&format!("Updated configuration {config_id}")),
                Err(e) => print_error(&format!("Could not update configuration: {e}")),
            }
        }
        "delete" => {
            let Some(raw) = rest.first() else {
                print_error("Usage: rundesk config delete <id>");
                return Ok(());
            };
            let config_id: i64 = raw.parse()?;
            match ctx.workflows().delete_config(config_id).await {
                Ok(()) => print_success("Configuration deleted."),
                Err(e) => print_error(&format!("Could not delete configuration: {e}")),
            }
        }
        other => print_error(&format!("Unknown config action: {other}")),
    }
    Ok(())
}
