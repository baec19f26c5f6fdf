use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
mod auth;
use signergen::{
    DEFAULT_ITERATIONS, DEFAULT_SCRYPT_LOG_N, EthSignerRun, HashicorpRun, KeystoreRun, RawRun,
    RunSummary,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_VAULT_URL: &str = "http://localhost:8200/v1/secret";
const DEFAULT_KNOWN_SERVERS: &str = "/var/config/knownhosts";

fn parse_count(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("count must be a positive integer".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("count must be a positive integer: {e}")),
    }
}

#[derive(Debug, Parser)]
#[command(name = "signergen")]
#[command(
    version,
    about = "Generates signing keys and remote signer configuration files."
)]
struct Cli {
    /// Directory the configuration files are written to
    #[arg(
        long,
        global = true,
        value_name = "DIR",
        env = "SIGNERGEN_OUTPUT",
        default_value = "./keys"
    )]
    output: PathBuf,

    /// Number of keys to generate
    #[arg(long, global = true, value_name = "N", default_value = "50", value_parser = parse_count)]
    count: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Writes each secret key in plaintext into its configuration file
    Raw,

    /// Encrypts each key into a keystore next to its password file
    Keystores {
        /// Keystore password (prompted for when absent)
        #[arg(long, env = "SIGNERGEN_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// PBKDF2 iteration count
        #[arg(long, value_name = "N", default_value_t = DEFAULT_ITERATIONS)]
        kdf_iterations: u32,

        /// Directory written into configuration files instead of --output
        #[arg(long, value_name = "DIR")]
        config_dir: Option<PathBuf>,
    },

    /// Encrypts secp256k1 account keys into V3 wallet files with a TOML
    /// file-based-signer config each
    Ethsigner {
        /// Wallet password (prompted for when absent)
        #[arg(long, env = "SIGNERGEN_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// scrypt cost as log2(n)
        #[arg(long, value_name = "LOG_N", default_value_t = DEFAULT_SCRYPT_LOG_N)]
        scrypt_log_n: u8,

        /// Directory written into the TOML configs instead of --output
        #[arg(long, value_name = "DIR", visible_alias = "override-path-in-config")]
        config_dir: Option<PathBuf>,
    },

    /// Stores each key in a HashiCorp Vault KV engine
    Hashicorp {
        /// Base URL of the KV secret engine
        #[arg(long, value_name = "URL", default_value = DEFAULT_VAULT_URL)]
        url: String,

        /// Vault token
        #[arg(long, env = "SIGNERGEN_VAULT_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// File holding the Vault token
        #[arg(long, value_name = "PATH")]
        token_file: Option<PathBuf>,

        /// Host written into configuration files instead of the URL host
        #[arg(long, value_name = "HOST")]
        override_vault_host: Option<String>,

        /// Known servers file used by the signer for TLS connections
        #[arg(long, value_name = "PATH", default_value = DEFAULT_KNOWN_SERVERS)]
        tls_knownhosts_file: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<RunSummary> {
    let summary = match cli.command {
        Commands::Raw => signergen::run_raw(&RawRun {
            output: cli.output,
            count: cli.count,
        })
        .context("raw key generation failed")?,

        Commands::Keystores {
            password,
            kdf_iterations,
            config_dir,
        } => {
            let password = auth::read_password(password)?;
            signergen::run_keystores(&KeystoreRun {
                output: cli.output,
                count: cli.count,
                password,
                kdf_iterations,
                config_dir,
            })
            .context("keystore generation failed")?
        }

        Commands::Ethsigner {
            password,
            scrypt_log_n,
            config_dir,
        } => {
            let password = auth::read_password(password)?;
            signergen::run_ethsigner(&EthSignerRun {
                output: cli.output,
                count: cli.count,
                password,
                scrypt_log_n,
                config_dir,
            })
            .context("wallet file generation failed")?
        }

        Commands::Hashicorp {
            url,
            token,
            token_file,
            override_vault_host,
            tls_knownhosts_file,
        } => {
            let token = auth::read_token(token, token_file.as_deref())?;
            signergen::run_hashicorp(&HashicorpRun {
                output: cli.output,
                count: cli.count,
                url,
                token,
                host_override: override_vault_host,
                tls_known_servers_path: tls_knownhosts_file,
            })
            .context("secret store key generation failed")?
        }
    };

    Ok(summary)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let summary = run(cli)?;
    println!("{summary}");
    Ok(())
}
