//! secs command-line interface: simple encrypted containers backed by LUKS.
//!
//! Root access (via sudo) is required for every subcommand; container
//! ownership is handed back to the invoking user afterwards.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::warn;
use secs_core::{logging, Container, ContainerService, Identity, SecsConfig};
use secs_luks::SystemLuksProvider;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "secs",
    version,
    about = "Simple encrypted containers backed by LUKS."
)]
struct Cli {
    /// Path to an optional secs configuration file.
    #[arg(short, long, default_value = "/etc/secs.toml")]
    config: PathBuf,

    /// Echo every external command before it runs.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// The four lifecycle transitions.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new encrypted container.
    Create {
        /// Path of the container to create.
        path: PathBuf,

        /// Size of the container in megabytes (at least 3).
        size: u64,

        /// Mapper name (defaults to the path basename).
        #[arg(short, long)]
        name: Option<String>,

        /// Overwrite an existing file without asking.
        #[arg(long)]
        force: bool,
    },

    /// Open (decrypt and mount) an encrypted container.
    Open {
        /// Path of the container to open.
        path: PathBuf,

        /// Mount path (default hides the container and mounts in its place).
        #[arg(short, long)]
        mount: Option<PathBuf>,

        /// Mapper name (defaults to the path basename).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Close (unmount and lock) an open container.
    Close {
        /// Path of the container to close.
        path: PathBuf,

        /// Mount path (required if one was given when the container was opened).
        #[arg(short, long)]
        mount: Option<PathBuf>,

        /// Mapper name (defaults to the path basename).
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Expand a closed container and its filesystem.
    Expand {
        /// Path of the container to expand.
        path: PathBuf,

        /// Amount to grow the container by, in megabytes.
        size: u64,

        /// Mapper name (defaults to the path basename).
        #[arg(short, long)]
        name: Option<String>,
    },
}

/// Entry point: parse arguments and surface errors with an exit code.
fn main() {
    if let Err(err) = run() {
        eprintln!("[!] {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(if cli.verbose { "debug" } else { "info" });

    if unsafe { libc::geteuid() } != 0 {
        bail!("must be run as root");
    }

    let config = Arc::new(
        SecsConfig::load_or_default(&cli.config)
            .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?,
    );
    let provider = SystemLuksProvider::from_config(&config)?;
    let service = ContainerService::new(config, provider, invoking_identity());

    match cli.command {
        Commands::Create {
            path,
            size,
            name,
            force,
        } => {
            let container = Container::new(path, name, None)?;
            if container.path.exists() && !force {
                confirm_overwrite(&container.path)?;
            }
            service.create(&container, size)?;
            println!("[*] container created: {}", container.path.display());
        }
        Commands::Open { path, mount, name } => {
            let container = Container::new(path, name, mount)?;
            let mount = service.open(&container)?;
            println!("[*] container open at: {}", mount.display());
        }
        Commands::Close { path, mount, name } => {
            let container = Container::new(path, name, mount)?;
            service.close(&container)?;
            println!("[*] container closed");
        }
        Commands::Expand { path, size, name } => {
            let container = Container::new(path, name, None)?;
            service.expand(&container, size)?;
            println!("[*] container expanded by {size}MB");
        }
    }

    Ok(())
}

/// The pre-escalation user, from the sudo environment when available.
fn invoking_identity() -> Identity {
    match Identity::from_sudo_env() {
        Some(identity) => identity,
        None => {
            warn!("SUDO_UID/SUDO_GID not set; container ownership stays with the current user");
            Identity::current()
        }
    }
}

/// Destructive-overwrite guard: demand the exact confirmation token.
fn confirm_overwrite(path: &Path) -> Result<()> {
    eprintln!("WARNING!");
    eprintln!("========");
    eprintln!(
        "This will overwrite data on {} irrevocably.\n",
        path.display()
    );
    print!("Are you sure? (Type uppercase yes): ");
    io::stdout().flush().ok();

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    if answer.trim() != "YES" {
        bail!("aborted");
    }
    Ok(())
}
