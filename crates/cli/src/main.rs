//! Workspace bridge CLI
//!
//! Creates, inspects and removes workspace containers through the bridge
//! agent's HTTP API, and manages workspace project files on the cluster.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::containers::{self, CreateArgs};
use commands::workspaces;

/// Workspace bridge CLI
#[derive(Parser)]
#[command(name = "bridgectl")]
#[command(author, version, about = "CLI for the workspace bridge agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via BRIDGECTL_API_URL env var)
    #[arg(long, env = "BRIDGECTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a workspace container and wait until it runs
    Create {
        /// Container name (e.g. workspacek6n2_machine1_che_ws)
        #[arg(long)]
        name: String,

        /// Image reference
        image: String,

        /// Environment variable NAME=VALUE; must include CHE_WORKSPACE_ID
        #[arg(long, short)]
        env: Vec<String>,

        /// Exposed port PORT[/PROTOCOL]
        #[arg(long = "port", short)]
        ports: Vec<String>,

        /// Bind mount HOST_PATH:MOUNT_PATH[:MODE]
        #[arg(long = "volume", short)]
        volumes: Vec<String>,

        /// Label KEY=VALUE
        #[arg(long = "label", short)]
        labels: Vec<String>,
    },

    /// Show the engine view of a container
    Inspect {
        /// Container ID
        id: String,
    },

    /// Show the resolved servers of a container
    Servers {
        /// Container ID
        id: String,

        /// Server override REF=PORT[,PROTOCOL[,PATH]]
        #[arg(long = "server", short)]
        servers: Vec<String>,
    },

    /// Remove a container and its cluster resources
    Rm {
        /// Container ID
        id: String,

        /// Remove even if running
        #[arg(long)]
        force: bool,

        /// Remove associated volumes
        #[arg(long, short)]
        volumes: bool,
    },

    /// Create a workspace's project directory on the shared claim
    Files {
        /// Workspace name (e.g. java-mysql)
        workspace: String,

        /// Delete the project directory instead
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Create {
            name,
            image,
            env,
            ports,
            volumes,
            labels,
        } => {
            let args = CreateArgs {
                name,
                image,
                env,
                ports,
                volumes,
                labels,
            };
            containers::create(&client, args, cli.format).await?;
        }
        Commands::Inspect { id } => {
            containers::inspect(&client, &id, cli.format).await?;
        }
        Commands::Servers { id, servers } => {
            containers::servers(&client, &id, &servers, cli.format).await?;
        }
        Commands::Rm { id, force, volumes } => {
            containers::remove(&client, &id, force, volumes, cli.format).await?;
        }
        Commands::Files { workspace, clear } => {
            workspaces::files(&client, &workspace, clear, cli.format).await?;
        }
    }

    Ok(())
}
