use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;

use cms_gate::config::{load_config, ConfigError};

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Management CLI for the CMS request gate", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a CSRF token for a session
    Token {
        #[arg(long)]
        session: String,
    },
    /// Show the principal behind a bearer token
    Session {
        #[arg(long)]
        token: String,
    },
    /// Show gate store statistics (admin only)
    Stats {
        #[arg(long)]
        token: String,
    },
    /// Load and validate a config file without starting the server
    CheckConfig { path: PathBuf },
}

fn bearer(token: &str) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token))?,
    );
    Ok(headers)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Token { session } => {
            let res = client
                .get(format!("{}/api/csrf-token", cli.url))
                .header("x-session-id", session)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Session { token } => {
            let res = client
                .get(format!("{}/api/auth/session", cli.url))
                .headers(bearer(&token)?)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Stats { token } => {
            let res = client
                .get(format!("{}/api/admin/gate", cli.url))
                .headers(bearer(&token)?)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::CheckConfig { path } => check_config(&path),
    }

    Ok(())
}

fn check_config(path: &std::path::Path) {
    match load_config(path) {
        Ok(config) => {
            println!("{}: OK", path.display());
            println!("  listener:   {}", config.listener.bind_address);
            println!("  rate limit: {}", if config.rate_limit.enabled { "enabled" } else { "disabled" });
            for (name, profile) in config.rate_limit.profiles() {
                println!("    {:<8} {} per {}s", name, profile.max, profile.window_secs);
            }
            println!("  sessions:   {}", config.sessions.len());
        }
        Err(ConfigError::Validation(errors)) => {
            eprintln!("{}: {} problem(s)", path.display(), errors.len());
            for error in errors {
                eprintln!("  - {}", error);
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(rejection(status, &body).into());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Error message for a non-2xx reply, preferring the gate's `error` field.
fn rejection(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_string());

    if detail.is_empty() {
        format!("gate returned status {status}")
    } else {
        format!("gate returned status {status}: {detail}")
    }
}
