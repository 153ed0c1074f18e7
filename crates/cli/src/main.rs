//! Fabrica CLI - Command-line interface for the Fabrica Generation Engine

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9630";

#[derive(Parser)]
#[command(name = "fabrica")]
#[command(about = "Fabrica Generation Engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "FABRICA_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a generation job
    Create {
        /// Job type (outline, flashcards, lesson_plan)
        #[arg(short = 't', long)]
        job_type: String,

        /// Params as a JSON string, e.g. '{"title": "Learn Rust"}'
        #[arg(long)]
        params: String,

        /// User identity for admission control
        #[arg(short, long)]
        user: Option<String>,

        /// Override the job retry budget
        #[arg(long)]
        max_retries: Option<i32>,
    },

    /// Poll a job's status once
    Status {
        /// Job ID
        job_id: String,
    },

    /// Poll a job until it finishes, honoring the recommended delay
    Watch {
        /// Job ID
        job_id: String,
    },

    /// Cancel a still-pending job
    Cancel {
        /// Job ID
        job_id: String,
    },

    /// Show engine statistics
    Stats,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct CreateResult {
    job_id: String,
    job_type: String,
    status: String,
    estimated_duration_ms: i64,
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn print_status(status: &serde_json::Value) {
    let state = status["status"].as_str().unwrap_or("unknown");
    let state_colored = match state {
        "completed" => state.green().bold(),
        "failed" => state.red().bold(),
        "delayed" => state.yellow().bold(),
        _ => state.cyan().bold(),
    };
    println!("  {} {}", "Status:".bold(), state_colored);

    let progress = &status["progress"];
    if let Some(stage) = progress["stage"].as_str() {
        if !stage.is_empty() {
            println!(
                "  {} {} ({}%) - {}",
                "Progress:".bold(),
                stage,
                progress["percent"],
                progress["message"].as_str().unwrap_or("")
            );
        }
    }

    println!(
        "  {} {}ms / est. {}ms",
        "Running:".bold(),
        status["running_time_ms"],
        status["estimated_duration_ms"]
    );

    if status["is_delayed"].as_bool().unwrap_or(false) {
        println!(
            "  {} taking longer than estimated; work continues",
            "Note:".yellow().bold()
        );
    }

    if let Some(error) = status.get("error").filter(|e| !e.is_null()) {
        println!(
            "  {} [{}] {}",
            "Error:".red().bold(),
            error["kind"].as_str().unwrap_or("unknown"),
            error["message"].as_str().unwrap_or("")
        );
    }

    if let Some(result) = status.get("result").filter(|r| !r.is_null()) {
        if status["repaired"].as_bool().unwrap_or(false) {
            println!("  {} result was auto-repaired", "Note:".yellow().bold());
        }
        println!("{}", serde_json::to_string_pretty(result).unwrap_or_default());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Create {
            job_type,
            params,
            user,
            max_retries,
        } => {
            let params_json: serde_json::Value =
                serde_json::from_str(&params).context("Invalid JSON params")?;

            let rpc_params = json!({
                "job_type": job_type,
                "params": params_json,
                "options": {
                    "user_id": user,
                    "max_retries": max_retries,
                },
            });

            let result = call_rpc(&cli.rpc_url, "gen.create_job.v1", rpc_params).await?;
            let created: CreateResult = serde_json::from_value(result)?;

            println!("{}", "✓ Job created".green().bold());
            println!();
            let table = Table::new(vec![created]).to_string();
            println!("{}", table);
        }

        Commands::Status { job_id } => {
            let result = call_rpc(&cli.rpc_url, "gen.status.v1", json!({ "job_id": job_id })).await?;
            println!("{}", format!("Job {}", job_id).cyan().bold());
            print_status(&result);
        }

        Commands::Watch { job_id } => {
            println!("{}", format!("Watching job {}", job_id).cyan().bold());
            loop {
                let result =
                    call_rpc(&cli.rpc_url, "gen.status.v1", json!({ "job_id": job_id })).await?;
                print_status(&result);

                let state = result["status"].as_str().unwrap_or("unknown");
                if state == "completed" || state == "failed" {
                    break;
                }

                let delay_ms = result["recommended_next_poll_ms"].as_i64().unwrap_or(1_000);
                tokio::time::sleep(std::time::Duration::from_millis(
                    delay_ms.clamp(100, 10_000) as u64,
                ))
                .await;
                println!();
            }
        }

        Commands::Cancel { job_id } => {
            let result = call_rpc(&cli.rpc_url, "gen.cancel.v1", json!({ "job_id": job_id })).await?;

            if result["cancelled"].as_bool().unwrap_or(false) {
                println!("{}", format!("✓ Job {} cancelled", job_id).green().bold());
            } else {
                println!(
                    "{}",
                    format!("✗ Job {} already running or finished", job_id).yellow()
                );
            }
        }

        Commands::Stats => {
            println!("{}", "Engine Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Total Jobs:".bold(), stats["total_jobs"]);
                    println!("  {} {}", "Pending:".bold(), stats["pending_jobs"]);
                    println!("  {} {}", "Processing:".bold(), stats["processing_jobs"]);
                    println!("  {} {}", "Completed:".bold(), stats["completed_jobs"]);
                    println!("  {} {}", "Failed:".bold(), stats["failed_jobs"]);
                    println!();
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
