//! Warden CLI - administration for the session store
//!
//! Applies schema migrations, purges stale sessions and issues or inspects
//! sessions and users from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use warden_core::{init_logging, Lifetime, LoggingConfig, WardenConfig, WardenResult};
use warden_store::{Migrator, Session, Warden};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Session store administration")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Manage schema migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },

    /// Delete sessions whose renewal window has closed
    Purge {
        /// Keep purging every N seconds instead of once
        #[arg(long)]
        every: Option<u64>,
    },

    /// Issue and inspect sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply every pending migration
    Build {
        #[arg(long, value_enum, default_value_t = Subsystem::All)]
        subsystem: Subsystem,
    },
    /// Revert every applied migration
    Teardown {
        #[arg(long, value_enum, default_value_t = Subsystem::All)]
        subsystem: Subsystem,
    },
    /// Apply the next migration of one subsystem
    Up {
        #[arg(value_enum)]
        subsystem: Subsystem,
    },
    /// Revert the last applied migration of one subsystem
    Down {
        #[arg(value_enum)]
        subsystem: Subsystem,
    },
    /// Show the migration cursor of every subsystem
    Status,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Issue a new session
    Create {
        /// Lifetime in seconds, defaults to the configured lifetime
        #[arg(long)]
        lifetime: Option<i64>,
        /// Renewal period in seconds, defaults to the configured period
        #[arg(long)]
        renewal: Option<i64>,
        /// Issue a session that never expires
        #[arg(long, conflicts_with_all = ["lifetime", "renewal"])]
        immortal: bool,
        /// Bind the session to this user
        #[arg(long)]
        user: Option<String>,
    },
    /// Show the session behind a token
    Open { token: String },
    /// Exchange a token pair for a fresh one
    Renew {
        token: String,
        renewal_token: String,
        #[arg(long)]
        lifetime: Option<i64>,
        #[arg(long)]
        renewal: Option<i64>,
    },
    /// Destroy a session, or every session of a user
    Revoke {
        #[arg(required_unless_present = "user")]
        token: Option<String>,
        #[arg(long, conflicts_with = "token")]
        user: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user
    Create { username: String },
    /// List every user
    List,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Subsystem {
    Users,
    Groups,
    Sessions,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            // No usable logging section, so report through the defaults
            let _ = init_logging(&LoggingConfig::default());
            e.log();
            return Err(e.into());
        }
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging = logging.verbose();
    }
    init_logging(&logging).context("Failed to initialize logging")?;

    info!("Starting Warden CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::InitConfig { force } => handle_init_config(cli.config, force),
        Commands::Migrate { action } => handle_migrate(action, &config).await,
        Commands::Purge { every } => handle_purge(every, &config).await,
        Commands::Session { action } => handle_session(action, &config).await,
        Commands::User { action } => handle_user(action, &config).await,
    }
}

fn load_config(config_path: Option<&PathBuf>) -> WardenResult<WardenConfig> {
    if let Some(path) = config_path {
        if path.exists() {
            return WardenConfig::from_file(path);
        }
        return Ok(WardenConfig::default());
    }

    let default_paths = [
        WardenConfig::default_path(),
        Some(PathBuf::from("warden.toml")),
    ];
    for path in default_paths.into_iter().flatten() {
        if path.exists() {
            return WardenConfig::from_file(&path);
        }
    }

    Ok(WardenConfig::default())
}

fn handle_init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match path.or_else(WardenConfig::default_path) {
        Some(path) => path,
        None => bail!("No configuration directory available, pass --config"),
    };
    if path.exists() && !force {
        bail!("{:?} already exists, use --force to overwrite", path);
    }

    WardenConfig::default().save_to_file(&path)?;
    println!("Configuration written to {:?}", path);
    Ok(())
}

fn migrators(warden: &Warden, subsystem: Subsystem) -> Result<Vec<(&'static str, Migrator)>> {
    let all = [
        ("users", warden.users().migrator()?),
        ("groups", warden.groups().migrator()?),
        ("sessions", warden.sessions().migrator()?),
    ];
    Ok(all
        .into_iter()
        .filter(|(name, _)| match subsystem {
            Subsystem::All => true,
            Subsystem::Users => *name == "users",
            Subsystem::Groups => *name == "groups",
            Subsystem::Sessions => *name == "sessions",
        })
        .collect())
}

async fn handle_migrate(action: MigrateAction, config: &WardenConfig) -> Result<()> {
    let pool = warden_store::connect_pool(&config.database).await?;
    let warden = Warden::unbuilt(pool);

    match action {
        MigrateAction::Build { subsystem } => {
            // Dependents reference users, so users are built first
            let mut applied = 0;
            for (_, migrator) in migrators(&warden, subsystem)? {
                applied += migrator.build().await?;
            }
            println!("Applied {} migration(s)", applied);
        }
        MigrateAction::Teardown { subsystem } => {
            let mut reverted = 0;
            for (_, migrator) in migrators(&warden, subsystem)?.into_iter().rev() {
                reverted += migrator.teardown().await?;
            }
            println!("Reverted {} migration(s)", reverted);
        }
        MigrateAction::Up { subsystem } => {
            for (name, migrator) in migrators(&warden, subsystem)? {
                let moved = migrator.step_up().await?;
                report_step(name, &migrator, moved).await?;
            }
        }
        MigrateAction::Down { subsystem } => {
            for (name, migrator) in migrators(&warden, subsystem)?.into_iter().rev() {
                let moved = migrator.step_down().await?;
                report_step(name, &migrator, moved).await?;
            }
        }
        MigrateAction::Status => {
            for (name, migrator) in migrators(&warden, Subsystem::All)? {
                println!(
                    "{:<10} {}/{} applied ({} pending)",
                    name,
                    migrator.current_cursor().await?,
                    migrator.len(),
                    migrator.pending().await?
                );
            }
        }
    }

    Ok(())
}

async fn report_step(name: &str, migrator: &Migrator, moved: bool) -> Result<()> {
    let cursor = migrator.current_cursor().await?;
    if moved {
        println!("{}: now at {}/{}", name, cursor, migrator.len());
    } else {
        println!("{}: nothing to do at {}/{}", name, cursor, migrator.len());
    }
    Ok(())
}

async fn handle_purge(every: Option<u64>, config: &WardenConfig) -> Result<()> {
    let warden = Warden::connect(config).await?;

    match every {
        None => {
            let purged = warden.sessions().purge().await?;
            println!("Purged {} session(s)", purged);
        }
        Some(seconds) => {
            let interval = Duration::from_secs(seconds.max(1));
            let task = warden.sessions().spawn_purge_task(interval)?;
            info!(seconds = interval.as_secs(), "Purging in the background, Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            task.abort();
        }
    }
    Ok(())
}

fn lifetime_arg(seconds: Option<i64>, default: Lifetime) -> Lifetime {
    seconds.map_or(default, Lifetime::seconds)
}

fn print_session(session: &Session) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&session.view())?);
    Ok(())
}

async fn handle_session(action: SessionAction, config: &WardenConfig) -> Result<()> {
    let warden = Warden::connect(config).await?;
    let defaults = &config.sessions;

    match action {
        SessionAction::Create {
            lifetime,
            renewal,
            immortal,
            user,
        } => {
            let (lifetime, renewal) = if immortal {
                (None, None)
            } else {
                (
                    Some(lifetime_arg(lifetime, defaults.lifetime)),
                    Some(lifetime_arg(renewal, defaults.renewal_period)),
                )
            };

            // User lookup and binding commit together with the new session
            let session = warden
                .atomic_operation(|w| async move {
                    let mut session = w.sessions().create(lifetime, renewal).await?;
                    if let Some(username) = user {
                        let Some(found) = w.users().get_by_username(&username).await? else {
                            bail!("No user named '{}'", username);
                        };
                        session.set_user_id(found.id).await?;
                    }
                    Ok::<_, anyhow::Error>(session.view())
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        SessionAction::Open { token } => {
            print_session(&warden.sessions().open(&token).await?)?;
        }
        SessionAction::Renew {
            token,
            renewal_token,
            lifetime,
            renewal,
        } => {
            let session = warden
                .sessions()
                .renew(
                    &token,
                    Some(lifetime_arg(lifetime, defaults.lifetime)),
                    &renewal_token,
                    Some(lifetime_arg(renewal, defaults.renewal_period)),
                )
                .await?;
            print_session(&session)?;
        }
        SessionAction::Revoke { token, user } => match (token, user) {
            (_, Some(username)) => {
                let Some(found) = warden.users().get_by_username(&username).await? else {
                    bail!("No user named '{}'", username);
                };
                let destroyed = warden.sessions().destroy_all_for_user(found.id).await?;
                println!("Revoked {} session(s)", destroyed);
            }
            (Some(token), None) => {
                if !warden.sessions().revoke(&token).await? {
                    bail!("No session carries that token");
                }
                println!("Revoked session");
            }
            (None, None) => bail!("Pass a token or --user"),
        },
    }

    Ok(())
}

async fn handle_user(action: UserAction, config: &WardenConfig) -> Result<()> {
    let warden = Warden::connect(config).await?;

    match action {
        UserAction::Create { username } => {
            let user = warden.users().create(&username).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        UserAction::List => {
            let users = warden.users().list().await?;
            println!("{}", serde_json::to_string_pretty(&users)?);
        }
    }
    Ok(())
}
