//! Terraform Provider for vSphere
//!
//! Speaks the line-oriented JSON-RPC plugin protocol on stdin/stdout.

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use terraform_provider_vsphere::VsphereProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Terraform Provider for vSphere
#[derive(Parser, Debug)]
#[command(name = "terraform-provider-vsphere")]
#[command(about = "Terraform provider for vSphere licenses and namespaces")]
struct Args {
    /// Log filter, e.g. `debug` or `terraform_provider_vsphere=trace`
    #[arg(long, env = "TF_LOG", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn init_logging(args: &Args) {
    // stdout carries the protocol, so logs go to stderr
    let filter = EnvFilter::try_new(args.log_level.to_lowercase())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if args.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    tracing::info!("Starting Terraform Provider for vSphere");

    let provider = VsphereProvider::new().context("failed to create async runtime")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    for line in stdin.lock().lines() {
        let input = match line {
            Ok(input) => input,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        };
        if input.trim().is_empty() {
            continue;
        }

        let response = provider.handle_request(&input);
        writeln!(stdout_lock, "{}", response).context("failed to write response")?;
        stdout_lock.flush().context("failed to flush stdout")?;
    }

    tracing::info!("Terraform Provider shutting down");
    Ok(())
}
