// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use hapinstall::config::{InstallerConfig, PlatformKind};
use hapinstall::installer::progress::LogProgress;
use hapinstall::installer::InstallerContext;
use hapinstall::packages::extract_bundle_param;
use hapinstall::permissions::JsonPermissionStore;
use hapinstall::signature::SidecarVerifier;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "hapinstall")]
#[command(author, version, about = "On-device HAP package installer with rollback", long_about = None)]
struct Cli {
    /// Root directory all installer paths live under
    #[arg(short, long, default_value = "/", global = true)]
    root: PathBuf,

    /// JSON config file (overrides --root)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Platform variant (lite or linux)
    #[arg(short, long, global = true)]
    platform: Option<PlatformKind>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install or upgrade a HAP package
    Install {
        /// Path to the package file
        package_path: PathBuf,
    },
    /// Uninstall a bundle
    Uninstall {
        /// Bundle name to remove
        bundle_name: String,
    },
    /// Show an installed bundle
    Query {
        /// Bundle name
        bundle_name: String,
    },
    /// List installed bundles
    List,
    /// Reload records and install missing pre-installed apps
    Scan,
    /// Print the bundle name declared by a package header
    Peek {
        /// Path to the package file
        package_path: PathBuf,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

fn load_config(cli: &Cli) -> Result<InstallerConfig> {
    let mut config = match &cli.config {
        Some(path) => InstallerConfig::load(path)?,
        None => InstallerConfig::with_root(&cli.root),
    };
    if let Some(platform) = cli.platform {
        config.platform = platform;
    }
    Ok(config)
}

/// Build and boot an installer context
fn open_installer(config: InstallerConfig) -> Result<InstallerContext> {
    let permissions = JsonPermissionStore::new(&config.permissions_path);
    let mut ctx = InstallerContext::new(config, Box::new(SidecarVerifier), Box::new(permissions));
    ctx.boot()?;
    Ok(ctx)
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let Some(command) = &cli.command else {
        println!("HAP Package Installer v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'hapinstall --help' for usage information");
        return Ok(());
    };

    match command {
        Commands::Install { package_path } => {
            let config = load_config(&cli)?;
            let mut ctx = open_installer(config)?;
            info!("Installing package: {}", package_path.display());

            let mut progress = LogProgress::new(package_path.display().to_string());
            let bundle = ctx.install(package_path, &mut progress).map_err(|e| {
                anyhow::anyhow!("Install failed (code {}): {}", e.code(), e)
            })?;

            println!(
                "Installed {} version {} ({})",
                bundle.bundle_name, bundle.version_code, bundle.version_name
            );
            println!("  Code path: {}", bundle.code_path.display());
            println!("  Data path: {}", bundle.data_path.display());
            println!("  Source: {}", bundle.source.as_str());
            Ok(())
        }
        Commands::Uninstall { bundle_name } => {
            let config = load_config(&cli)?;
            let mut ctx = open_installer(config)?;
            info!("Uninstalling bundle: {}", bundle_name);

            let mut progress = LogProgress::new(bundle_name.clone());
            ctx.uninstall(bundle_name, &mut progress).map_err(|e| {
                anyhow::anyhow!("Uninstall failed (code {}): {}", e.code(), e)
            })?;

            println!("Uninstalled {}", bundle_name);
            Ok(())
        }
        Commands::Query { bundle_name } => {
            let config = load_config(&cli)?;
            let ctx = open_installer(config)?;

            let bundle = ctx
                .query(bundle_name)
                .ok_or_else(|| anyhow::anyhow!("Bundle '{}' is not installed", bundle_name))?;
            println!("{}", serde_json::to_string_pretty(&bundle)?);
            Ok(())
        }
        Commands::List => {
            let config = load_config(&cli)?;
            let ctx = open_installer(config)?;

            let bundles = ctx.list();
            if bundles.is_empty() {
                println!("No bundles installed.");
            } else {
                println!("Installed bundles:");
                for bundle in &bundles {
                    let flag = if bundle.is_system_app { " [system]" } else { "" };
                    println!(
                        "  {} {} ({}){}",
                        bundle.bundle_name, bundle.version_name, bundle.version_code, flag
                    );
                }
                println!("\nTotal: {} bundle(s)", bundles.len());
            }
            Ok(())
        }
        Commands::Scan => {
            let config = load_config(&cli)?;
            let permissions = JsonPermissionStore::new(&config.permissions_path);
            let mut ctx =
                InstallerContext::new(config, Box::new(SidecarVerifier), Box::new(permissions));
            let report = ctx.boot()?;

            println!("Reloaded: {}", report.reloaded.len());
            for name in &report.installed {
                println!("Installed: {}", name);
            }
            for name in &report.skipped {
                println!("Skipped (uninstalled): {}", name);
            }
            for path in &report.failed {
                println!("Failed: {}", path.display());
            }
            Ok(())
        }
        Commands::Peek { package_path } => {
            let config = load_config(&cli)?;
            let bundle_name = extract_bundle_param(package_path, &config)?;
            println!("{}", bundle_name);
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "hapinstall", &mut std::io::stdout());
            Ok(())
        }
    }
}
