use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "esc")]
#[command(about = "Commission escrow operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Moderation queue and decisions
    Review {
        /// Layered config paths in merge order (defaults apply when omitted)
        #[arg(long = "config", global = true)]
        config_paths: Vec<String>,

        #[command(subcommand)]
        cmd: ReviewCmd,
    },

    /// Wallet balance, deposits and log
    Wallet {
        #[arg(long = "config", global = true)]
        config_paths: Vec<String>,

        #[command(subcommand)]
        cmd: WalletCmd,
    },

    /// Commission inspection
    Commission {
        #[arg(long = "config", global = true)]
        config_paths: Vec<String>,

        #[command(subcommand)]
        cmd: CommissionCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum ReviewCmd {
    /// List commissions waiting for review, oldest first
    Pending {
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Record a PASS or FAIL decision
    Decide {
        /// Service code (C-YYYYMM-NNNNNN)
        #[arg(long)]
        code: String,

        /// PASS | FAIL
        #[arg(long)]
        result: String,

        /// Required for FAIL
        #[arg(long)]
        reason: Option<String>,

        #[arg(long)]
        reviewer: String,

        /// Review target type
        #[arg(long, default_value = "commission")]
        target: String,
    },
}

#[derive(Subcommand)]
enum WalletCmd {
    /// Print balances
    Show {
        #[arg(long)]
        user: String,
    },

    /// Credit a user's available balance
    Deposit {
        #[arg(long)]
        user: String,

        /// Settlement-currency minor units
        #[arg(long)]
        amount: i64,
    },

    /// Debit a user's available balance
    Withdraw {
        #[arg(long)]
        user: String,

        #[arg(long)]
        amount: i64,
    },

    /// Newest wallet log rows
    Logs {
        #[arg(long)]
        user: String,

        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum CommissionCmd {
    /// Print a commission with its order, receipt and shipping rows
    Show { code: String },

    /// Print the field-level history of a commission
    History { code: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; deployments inject env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = esc_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = esc_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_commissions_table={}",
                        s.ok, s.has_commissions_table
                    );
                }
                DbCmd::Migrate => {
                    esc_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = esc_config::load_layered_yaml(&path_refs)?;
            // Settings must parse even when only the hash is wanted.
            loaded.settings()?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Review { config_paths, cmd } => {
            let engine = commands::build_engine(&config_paths).await?;
            match cmd {
                ReviewCmd::Pending { limit } => commands::review::pending(&engine, limit).await?,
                ReviewCmd::Decide {
                    code,
                    result,
                    reason,
                    reviewer,
                    target,
                } => {
                    commands::review::decide(&engine, &code, &result, reason, &reviewer, &target)
                        .await?
                }
            }
        }

        Commands::Wallet { config_paths, cmd } => {
            let engine = commands::build_engine(&config_paths).await?;
            match cmd {
                WalletCmd::Show { user } => commands::wallet::show(&engine, &user).await?,
                WalletCmd::Deposit { user, amount } => {
                    commands::wallet::deposit(&engine, &user, amount).await?
                }
                WalletCmd::Withdraw { user, amount } => {
                    commands::wallet::withdraw(&engine, &user, amount).await?
                }
                WalletCmd::Logs { user, limit } => {
                    commands::wallet::logs(&engine, &user, limit).await?
                }
            }
        }

        Commands::Commission { config_paths, cmd } => {
            let engine = commands::build_engine(&config_paths).await?;
            match cmd {
                CommissionCmd::Show { code } => commands::commission::show(&engine, &code).await?,
                CommissionCmd::History { code } => {
                    commands::commission::history(&engine, &code).await?
                }
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
