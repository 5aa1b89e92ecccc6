use anyhow::Result;
use console::style;

use super::AppContext;
use crate::core::terminal::{print_error, print_info, print_success};

/// The token is always collected through a hidden prompt; it never appears
/// in argv, tables or log lines.
fn prompt_token() -> Result<String> {
    let token = inquire::Password::new("Personal-access token:")
        .without_confirmation()
        .with_display_mode(inquire::PasswordDisplayMode::Masked)
        .prompt()?;
    Ok(token)
}

pub async fn run(args: &[String]) -> Result<()> {
    let Some(action) = args.first().map(String::as_str) else {
        print_error("Usage: rundesk user <add|list|info|login|update|refresh|remove|stats>");
        return Ok(());
    };
    let ctx = AppContext::init().await?;
    let rest = &args[1..];

    match action {
        "add" => {
            let Some(username) = rest.first() else {
                print_error("Usage: rundesk user add <name>");
                return Ok(());
            };
            let token = prompt_token()?;
            match ctx.users().add_user(username, &token).await {
                Ok(id) => print_success(&format!("Stored user '{username}' (id {id})")),
                Err(e) => print_error(&format!("Could not add user: {e}")),
            }
        }
        "list" => {
            let users = ctx.users().list_users().await?;
            if users.is_empty() {
                print_info("No users stored yet.");
                return Ok(());
            }
            println!(
                " {:<5} {:<24} {}",
                style("id").bold(),
                style("username").bold(),
                style("added").bold()
            );
            for user in users {
                println!(" {:<5} {:<24} {}", user.id, user.username, user.created_at);
            }
        }
        "info" => {
            let Some(raw) = rest.first() else {
                print_error("Usage: rundesk user info <id|name>");
                return Ok(());
            };
            let id = ctx.resolve_user(raw).await?;
            let Some(user) = ctx.users().get_user(id).await? else {
                print_error("No such user.");
                return Ok(());
            };
            println!(" {} (id {}, added {})", style(&user.username).bold(), user.id, user.created_at);
            let live = ctx.users().test_user_token(id).await?;
            println!(" token: {}", if live { "live" } else { "rejected by GitHub" });
            if let Some(profile) = ctx.users().get_user_github_info(id).await? {
                println!(" login: {}", profile.login);
                if let Some(name) = profile.name {
                    println!(" name:  {name}");
                }
                if let Some(url) = profile.html_url {
                    println!(" url:   {url}");
                }
            }
        }
        "login" => {
            let Some(username) = rest.first() else {
                print_error("Usage: rundesk user login <name>");
                return Ok(());
            };
            let token = prompt_token()?;
            match ctx.users().authenticate_user(username, &token).await {
                Ok(id) => print_success(&format!("Authenticated as '{username}' (id {id})")),
                Err(e) => print_error(&format!("Authentication failed: {e}")),
            }
        }
        "update" => {
            let Some(raw) = rest.first() else {
                print_error("Usage: rundesk user update <id|name> --name <new-name>");
                return Ok(());
            };
            let Some(new_name) = super::flag_value(rest, "--name") else {
                print_error("Usage: rundesk user update <id|name> --name <new-name>");
                return Ok(());
            };
            let id = ctx.resolve_user(raw).await?;
            let token = prompt_token()?;
            match ctx.users().update_user(id, &new_name, &token).await {
                Ok(()) => print_success(&format!("User renamed to '{new_name}'")),
                Err(e) => print_error(&format!("Could not update user: {e}")),
            }
        }
        "refresh" => {
            let Some(raw) = rest.first() else {
                print_error("Usage: rundesk user refresh <id|name>");
                return Ok(());
            };
            let id = ctx.resolve_user(raw).await?;
            let token = prompt_token()?;
            match ctx.users().refresh_user_token(id, &token).await {
                Ok(()) => print_success("Token refreshed."),
                Err(e) => print_error(&format!("Could not refresh token: {e}")),
            }
        }
        "remove" => {
            let Some(raw) = rest.first() else {
                print_error("Usage: rundesk user remove <id|name>");
                return Ok(());
            };
            let id = ctx.resolve_user(raw).await?;
            match ctx.users().delete_user(id).await {
                Ok(()) => print_success("User and their configurations removed."),
                Err(e) => print_error(&format!("Could not remove user: {e}")),
            }
        }
        "stats" => {
            let stats = ctx.users().user_statistics().await?;
            println!(
                " {} users, {} with live tokens, {} stale",
                stats.total, stats.active, stats.inactive
            );
        }
        other => print_error(&format!("Unknown user action: {other}")),
    }
    Ok(())
}
