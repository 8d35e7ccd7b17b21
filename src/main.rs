use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fortis_hsm::{AccessPolicy, Hsm, HsmConfig, OsEntropy, Server, selftest};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, clap::Args)]
struct ModuleArgs {
    /// Largest request payload in bytes (default: 4096)
    #[arg(long, global = true, env = "FORTIS_HSM_MAX_PAYLOAD")]
    max_payload: Option<usize>,

    /// Number of key slots (default: 1000)
    #[arg(long, global = true, env = "FORTIS_HSM_KEY_CAPACITY")]
    key_capacity: Option<usize>,

    /// Random overwrite passes before zeroing on reset (minimum 3)
    #[arg(long, global = true, env = "FORTIS_HSM_ERASE_PASSES")]
    erase_passes: Option<u8>,

    /// Refuse key generation and key operations until INIT succeeds
    #[arg(long, global = true, env = "FORTIS_HSM_REQUIRE_AUTH")]
    require_auth: bool,

    /// Check key permission masks on encrypt/decrypt/sign/verify
    #[arg(long, global = true, env = "FORTIS_HSM_ENFORCE_PERMISSIONS")]
    enforce_permissions: bool,
}

impl ModuleArgs {
    fn to_config(&self) -> Result<HsmConfig> {
        let default = HsmConfig::default();

        HsmConfig::new(
            self.max_payload.unwrap_or(default.max_payload()),
            self.key_capacity.unwrap_or(default.key_capacity()),
            self.erase_passes.unwrap_or(default.erase_passes()),
            AccessPolicy {
                require_authentication: self.require_auth,
                enforce_permissions: self.enforce_permissions,
            },
        )
    }
}

#[derive(Debug, Parser)]
#[command(name = "fortis-hsm")]
#[command(
    version,
    about = "FORTIS security module command processor over a byte channel."
)]
struct Cli {
    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "FORTIS_HSM_LOG")]
    log_level: String,

    #[command(flatten)]
    module: ModuleArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Boots the module and serves binary frames on stdin/stdout
    Serve {
        /// Serve on a Unix-domain socket instead, one connection at a time
        #[arg(long, value_name = "PATH", env = "FORTIS_HSM_SOCKET")]
        socket: Option<PathBuf>,
    },

    /// Runs the built-in scenario and prints a JSON report
    Selftest,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    // stdout carries frames in stdio mode; logs go to stderr.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = args.module.to_config().context("invalid module configuration")?;

    match args.command {
        Commands::Serve { socket } => {
            let hsm = Hsm::boot_with(config, Box::new(OsEntropy)).context("module boot failed")?;
            let mut server = Server::new(hsm);
            match socket {
                Some(path) => listen(&mut server, &path)?,
                None => {
                    server.serve_stdio().context("stdio session failed")?;
                }
            }
        }
        Commands::Selftest => {
            if config.policy() != AccessPolicy::default() {
                tracing::info!("self test runs with the default access policy");
            }
            let config = config.with_policy(AccessPolicy::default());
            let hsm = Hsm::boot_with(config, Box::new(OsEntropy)).context("module boot failed")?;
            let report = selftest::run(hsm).context("self test aborted")?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.passed {
                anyhow::bail!("self test failed");
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
fn listen(server: &mut Server, path: &std::path::Path) -> Result<()> {
    server
        .listen(path)
        .with_context(|| format!("cannot serve on {}", path.display()))
}

#[cfg(not(unix))]
fn listen(_server: &mut Server, _path: &std::path::Path) -> Result<()> {
    anyhow::bail!("socket mode is only available on Unix")
}
