// Toolgate - Main Entry Point
//
// CLI and MCP stdio server. All tool calls route through the admission
// pipeline, including one-shot CLI calls.
// Usage:
//   toolgate serve                          # Run MCP server (stdio)
//   toolgate tools                          # List the registered tools
//   toolgate call <tool> <args>             # One-shot tool call
//   toolgate metrics                        # Show a 24h metrics summary
//   toolgate security-report                # Show the active security policy
//   toolgate config-export <json_file>      # Write the effective config to JSON

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use toolgate::config::ServerConfig;
use toolgate::mcp::McpServer;

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(version)]
#[command(about = "MCP tool server with allow-list, rate-limit and metrics gating")]
struct Cli {
    /// Config file (JSON); defaults apply when missing
    #[arg(short, long, default_value = "toolgate.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run MCP server (stdio JSON-RPC)
    Serve,

    /// List registered tools and their schemas
    Tools,

    /// One-shot tool call through the full admission pipeline
    Call {
        /// Tool name (file_read, system_command, ...)
        tool: String,

        /// Arguments as a JSON object string
        #[arg(default_value = "{}")]
        args: String,
    },

    /// Show a metrics summary for the last 24 hours
    Metrics,

    /// Show the active security policy
    SecurityReport,

    /// Export the effective config to a JSON file
    ConfigExport {
        /// File to write JSON to
        json_file: PathBuf,
    },
}

fn main() -> Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    let cli = Cli::parse();
    let config = ServerConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    match &cli.command {
        Commands::Serve => {
            let server = McpServer::new(config)?;
            server.run()?;
        }

        Commands::Tools => {
            let server = McpServer::new(config)?;
            for tool in server.dispatcher().list_tools() {
                println!(
                    "{:<16} {}",
                    tool["name"].as_str().unwrap_or("?"),
                    tool["description"].as_str().unwrap_or("")
                );
            }
        }

        Commands::Call { tool, args } => {
            let args: serde_json::Value = serde_json::from_str(args)
                .with_context(|| format!("Invalid args JSON: {}", args))?;
            let server = McpServer::new(config)?;

            match server.dispatcher().call_tool(tool, &args) {
                Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                Err(err) => {
                    eprintln!("Error ({}): {}", err.code(), err);
                    std::process::exit(1);
                }
            }
        }

        Commands::Metrics => {
            let server = McpServer::new(config)?;
            let summary = server.dispatcher().metrics().get_metrics(24);
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::SecurityReport => {
            let server = McpServer::new(config)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&server.dispatcher().policy().report())?
            );
        }

        Commands::ConfigExport { json_file } => {
            config
                .save(json_file)
                .with_context(|| format!("Failed to write config to {:?}", json_file))?;
            println!("Config written to {:?}", json_file);
        }
    }

    Ok(())
}
