use clap::Parser;
use std::path::PathBuf;

/// Server CLI for tombola
#[derive(Parser, Debug, Clone)]
#[command(name = "tombola", version, about = "Shared-room lottery server")]
pub struct ServerCli {
    /// Path to config file
    #[arg(long, default_value = "tombola.toml")]
    pub config: PathBuf,

    /// SQLite database URL (overrides config.database_url)
    #[arg(long)]
    pub db: Option<String>,

    /// Verbose debug logging
    #[arg(long, default_value_t = false)]
    pub debug: bool,

    /// Persist CLI overrides back to the config file
    #[arg(long, default_value_t = false)]
    pub persist: bool,
}
