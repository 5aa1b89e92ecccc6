use anyhow::Result;

use crate::core::config::{self, CONFIG_FILE_NAME, Settings};
use crate::core::store::Database;
use crate::core::terminal::{print_info, print_status, print_step, print_success};

/// Creates `~/.rundesk/`, writes a default config if none exists, and opens
/// the database once so the schema (and any pending migration) is in place.
pub async fn run() -> Result<()> {
    print_step("Setting up rundesk...");

    let dir = config::data_dir();
    tokio::fs::create_dir_all(&dir).await?;

    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        print_info(&format!("Keeping existing {}", config_path.display()));
    } else {
        Settings::default().save_to(&config_path).await?;
        print_status("Config", &config_path.display().to_string());
    }

    let settings = Settings::load().await;
    let db = Database::open(settings.db_path(), settings.encrypt_tokens).await?;
    print_status("Database", &db.path().display().to_string());

    print_success("rundesk is ready. Add a user with: rundesk user add <name>");
    Ok(())
}
