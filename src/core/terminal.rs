use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

pub fn print_banner() {
    let lines: &[&str] = &[
        "                       _           _    ",
        "  _ __ _   _ _ __   __| | ___  ___| | __",
        " | '__| | | | '_ \\ / _` |/ _ \\/ __| |/ /",
        " | |  | |_| | | | | (_| |  __/\\__ \\   < ",
        " |_|   \\__,_|_| |_|\\__,_|\\___||___/_|\\_\\",
    ];
    println!();
    for line in lines {
        println!("{}", style(line).cyan());
    }
    println!("\n {}\n", style("Your GitHub Actions, on your desk.").dim());
}

pub fn print_goodbye() {
    println!("\n{} {}", SPARKLE, style("Done.").bold().cyan());
}

/// A titled block of `command  description` lines for the help screen.
pub struct GuideSection {
    title: String,
    commands: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            commands: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.commands
            .push((name.to_string(), description.to_string()));
        self
    }

    pub fn print(self) {
        println!(" {}", style(&self.title).bold().underlined());
        for (name, description) in &self.commands {
            println!("   {:<30} {}", style(name).green(), description);
        }
        println!();
    }
}
