//! sitestage - command-line front end
//!
//! Serve a staged copy of a website until Ctrl+C, probe for a free port,
//! or stage a directory with the configured exclusions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use sitestage_core::{
    DirectoryStager, PortAllocator, PortPoolRange, Protocol, SiteHost, SiteHostConfig, WebsiteOptions,
    CONFIG_ENV_VAR,
};

#[derive(Parser)]
#[command(name = "sitestage")]
#[command(version)]
#[command(about = "Ephemeral, isolated web server instances", long_about = None)]
struct Cli {
    /// Configuration file (YAML); falls back to $SITESTAGE_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage a website and serve it until Ctrl+C
    Serve {
        /// Website directory to stage
        #[arg(long)]
        website: PathBuf,
        /// Host configuration template (applicationhost.config)
        #[arg(long)]
        template: PathBuf,
        /// Fixed http port; allocated from the http pool when omitted
        #[arg(long)]
        http_port: Option<u16>,
        /// Add an https binding
        #[arg(long)]
        https: bool,
        /// Fixed https port; implies --https
        #[arg(long)]
        https_port: Option<u16>,
        /// Custom host name for the bindings
        #[arg(long)]
        host_name: Option<String>,
        /// Configuration transform name (e.g. Release)
        #[arg(long)]
        transform: Option<String>,
        /// Root directory for generated staging and config paths
        #[arg(long)]
        temp_path: Option<PathBuf>,
        /// Environment variable for the server process (KEY=VALUE)
        #[arg(long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
        /// Keep the staged directory after shutdown
        #[arg(long)]
        keep: bool,
        /// Log instead of failing when the staged directory cannot be removed
        #[arg(long)]
        ignore_teardown_errors: bool,
        /// Print the instance summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the first free port in a range
    Port {
        /// First candidate port
        #[arg(long)]
        start: u32,
        /// Additional candidates after start
        #[arg(long, default_value_t = 100)]
        count: u32,
        /// Ports to skip
        #[arg(long)]
        exclude: Vec<u16>,
    },
    /// Copy a website into an empty directory using the staging exclusions
    Stage {
        /// Source directory
        source: PathBuf,
        /// Destination directory (missing or empty)
        destination: PathBuf,
    },
}

fn parse_env_pair(raw: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.trim().is_empty() {
        bail!("environment variable name is empty in '{}'", raw);
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SiteHostConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

    match path {
        Some(path) => SiteHostConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(SiteHostConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            website,
            template,
            http_port,
            https,
            https_port,
            host_name,
            transform,
            temp_path,
            env,
            keep,
            ignore_teardown_errors,
            json,
        } => {
            let mut options = WebsiteOptions::new(website, template)
                .remove_on_exit(!keep)
                .ignore_teardown_errors(ignore_teardown_errors);
            options.environment = env.into_iter().collect::<BTreeMap<_, _>>();
            if let Some(port) = http_port {
                options = options.http_port(port);
            }
            if https || https_port.is_some() {
                options = options.https(https_port);
            }
            if let Some(name) = host_name {
                options = options.host_name(&name);
            }
            if let Some(name) = transform {
                options = options.transform(&name);
            }
            if let Some(path) = temp_path {
                options = options.temp_root(path);
            }

            let host = SiteHost::new(config)?;
            let instance = host.start_website(options).await?;
            instance.wait_for_launch();

            if json {
                println!("{}", serde_json::to_string_pretty(&instance.summary())?);
            } else {
                println!("{} {}", "✓".green(), instance.site().name.bold());
                for protocol in [Protocol::Http, Protocol::Https] {
                    if let Some(url) = instance.url(protocol) {
                        println!("  {:<6} {}", protocol.to_string().dimmed(), url.cyan());
                    }
                }
                println!("  {:<6} {}", "staged".dimmed(), instance.staged_website_path().display());
                match instance.process_id() {
                    Some(pid) => println!("  {:<6} {}", "pid".dimmed(), pid),
                    None => println!("  {}", "server did not start".red()),
                }
                eprintln!("Press Ctrl+C to stop");
            }

            let (stop_tx, stop_rx) = mpsc::channel();
            ctrlc::set_handler(move || {
                let _ = stop_tx.send(());
            })?;

            loop {
                match stop_rx.recv_timeout(Duration::from_millis(500)) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if let Some(exit) = instance.exit_status() {
                            eprintln!("{} server exited with code {:?}", "!".yellow(), exit.code);
                            break;
                        }
                        if instance.state().is_disposing() {
                            break;
                        }
                    }
                }
            }

            instance.dispose()?;
            if !json {
                println!("{} stopped {}", "✓".green(), instance.site().name);
            }
        }
        Commands::Port { start, count, exclude } => {
            let range = PortPoolRange::new(start, count)?;
            let port = PortAllocator::default().get_available_port(&range, &exclude)?;
            println!("{}", port);
        }
        Commands::Stage { source, destination } => {
            let stager = DirectoryStager::new(config.staging.file_policy()?, config.staging.directory_policy());
            let copied = stager.stage(&source, &destination)?;
            println!(
                "{} staged {} item(s) into {}",
                "✓".green(),
                copied,
                destination.display()
            );
        }
    }

    Ok(())
}
