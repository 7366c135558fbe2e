//! Chartbundle CLI - create release bundles from Helm charts

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

use commands::ConnectionArgs;
use commands::from_chart::FromChartArgs;
use error::{CliError, Result};

#[derive(Parser)]
#[command(name = "chartbundle")]
#[command(author = "Chartbundle Contributors")]
#[command(version)]
#[command(about = "Create release bundles from Helm charts stored in Artifactory", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a release bundle holding a chart, its dependencies and images
    #[command(name = "from-chart", visible_alias = "fc")]
    FromChart(FromChartArgs),

    /// Print the file spec of a local chart archive
    Spec {
        /// Chart archive (.tgz)
        archive: PathBuf,

        /// Docker repository holding the chart's images
        #[arg(long = "docker-repo")]
        docker_repo: String,

        /// Repository holding the chart and its dependencies
        #[arg(long = "chart-repo")]
        chart_repo: String,

        /// Print the expected artifact names instead
        #[arg(long)]
        expected: bool,
    },

    /// Manage configured servers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Make a configured server the default
    Use {
        /// Server id
        server_id: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Add or replace a server
    Add {
        /// Server id
        server_id: String,

        #[command(flatten)]
        connection: ConnectionArgs,

        /// Make this the default server
        #[arg(long)]
        default: bool,
    },

    /// Show configured servers
    Show {
        /// Only show this server
        server_id: Option<String>,
    },

    /// Delete a server
    Delete {
        /// Server id
        server_id: String,
    },

    /// Delete every server
    Clear,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::FromChart(args) => commands::from_chart::run(&args).await,

        Commands::Spec {
            archive,
            docker_repo,
            chart_repo,
            expected,
        } => commands::spec::run(&archive, &docker_repo, &chart_repo, expected),

        Commands::Config { command } => match command {
            ConfigCommands::Add {
                server_id,
                connection,
                default,
            } => commands::config::add(&server_id, &connection, default),
            ConfigCommands::Show { server_id } => commands::config::show(server_id.as_deref()),
            ConfigCommands::Delete { server_id } => commands::config::delete(&server_id),
            ConfigCommands::Clear => commands::config::clear(),
        },

        Commands::Use { server_id } => commands::use_server::run(&server_id),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err(err) => report(err),
    }
}

fn report(err: CliError) -> ExitCode {
    let code = err.exit_code();
    eprintln!("{:?}", miette::Report::new(err));
    ExitCode::from(code)
}
