//! Acorn CLI
//!
//! Run GPTScript scripts on an Acorn run server from the terminal, chat with
//! them, and manage the knowledge files they can read.

mod cmd_config;
mod cmd_notion;
mod cmd_run;
mod cmd_scripts;
mod display;
mod logging;

use std::io;
use std::path::PathBuf;

use acorn_connectors::ApiClient;
use acorn_relay::config::APP_NAME;
use acorn_relay::{CliOverrides, EnvOverrides, RelayConfig};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing::info;

use crate::cmd_notion::NotionCommands;
use crate::cmd_run::{parse_arg, RunOptions};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "acorn")]
#[command(about = "Run GPTScript scripts on an Acorn run server")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Run server base URL
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Scripts directory on the run server
    #[arg(long, global = true)]
    scripts_path: Option<String>,

    /// Workspace directory scripts run in
    #[arg(long, global = true)]
    workspace_dir: Option<PathBuf>,

    /// Local data directory (config, logs, knowledge manifest)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file to read instead of `<data-dir>/config.toml`
    #[arg(long, global = true, env = "ACORN_CONFIG")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
}

impl GlobalArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            server_url: self.server_url.clone(),
            scripts_path: self.scripts_path.clone(),
            workspace_dir: self.workspace_dir.clone(),
            data_dir: self.data_dir.clone(),
            config_path: self.config.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List scripts on the run server
    Scripts,
    /// Run a script and chat with it
    Run {
        /// Script file, as listed by `acorn scripts`
        file: String,
        /// Tool argument as name=value (repeatable)
        #[arg(short, long = "arg", value_parser = parse_arg)]
        args: Vec<(String, String)>,
        /// Chat message to send once the run is idle (repeatable, in order)
        #[arg(short, long = "message")]
        messages: Vec<String>,
        /// Exit once the run is idle and every --message was sent
        #[arg(long)]
        once: bool,
    },
    /// Import knowledge from Notion
    Notion {
        #[command(subcommand)]
        command: NotionCommands,
    },
    /// Show the local knowledge manifest
    Knowledge,
    /// Show the resolved configuration
    Config,
    /// Print shell completions
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "acorn", &mut io::stdout());
        return Ok(());
    }

    let config = RelayConfig::resolve(&cli.global.overrides(), &EnvOverrides::from_env())?;
    config.ensure_dirs()?;
    let logging = logging::init_logging(&config.log_dir())?;

    info!(
        component = "cli",
        event = "cli.start",
        run_id = %logging.run_id,
        version = VERSION,
        server_url = %config.server_url,
        data_dir = %config.data_dir.display(),
        "Starting {APP_NAME} CLI"
    );

    let api = ApiClient::new(config.server_url.clone());
    let json = cli.global.json;

    match cli.command {
        Commands::Scripts => cmd_scripts::run(&api, json).await,
        Commands::Run {
            file,
            args,
            messages,
            once,
        } => {
            let opts = RunOptions {
                file,
                args,
                messages,
                once,
            };
            cmd_run::run(&config, api, opts).await
        }
        Commands::Notion { command } => cmd_notion::run(command, &config, &api, json).await,
        Commands::Knowledge => cmd_notion::list_knowledge(&config, json),
        Commands::Config => cmd_config::run(&config, json),
        Commands::Completions { .. } => Ok(()),
    }
}
