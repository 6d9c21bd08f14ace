use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fwpush_core::{Keypair, SignatureAlgorithm, build_package};
use rand::RngCore;
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tasks for the project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project
    Build,
    /// Run the CLI
    Run {
        /// Arguments passed to fwpush
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Write a random firmware image
    Sample {
        #[arg(long, default_value_t = 1024)]
        size: usize,
        #[arg(long)]
        out: PathBuf,
    },
    /// Write a signed package for inspection
    Package {
        #[arg(long)]
        firmware: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Build => {
            println!("Building project...");
            let status = Command::new("cargo").arg("build").status()?;
            if !status.success() {
                anyhow::bail!("Build failed");
            }
        }
        Commands::Run { args } => {
            println!("Running CLI...");
            let status = Command::new("cargo")
                .arg("run")
                .arg("-p")
                .arg("fwpush-cli")
                .arg("--")
                .args(args)
                .status()?;
            if !status.success() {
                anyhow::bail!("Run failed");
            }
        }
        Commands::Sample { size, out } => {
            let mut data = vec![0u8; *size];
            rand::thread_rng().fill_bytes(&mut data);
            std::fs::write(out, &data).with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {} byte sample to {}", size, out.display());
        }
        Commands::Package { firmware, out } => {
            let key = Keypair::generate()?;
            let package = build_package(firmware, &key, SignatureAlgorithm::default())?;
            let header = package.header();
            std::fs::write(out, package.as_bytes())
                .with_context(|| format!("writing {}", out.display()))?;
            println!(
                "Wrote {} bytes to {} (sig {}, key {}, firmware {})",
                package.len(),
                out.display(),
                header.signature_len,
                header.public_key_len,
                header.firmware_len
            );
        }
    }

    Ok(())
}
