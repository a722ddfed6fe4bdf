//! User administration for the enrichment platform
//!
//! # Usage
//!
//! ```bash
//! manage_users add-user --email admin@example.org --password 'S3cure!pass' --superuser
//! manage_users list-users
//! manage_users make-superuser someone@example.org
//! manage_users disable-user someone@example.org
//! ```
//!
//! Connects with `DATABASE_URL` (or `--database-url`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::process::ExitCode;

use charity_enrich::auth::{hash_password_async, validate_password_strength};
use charity_enrich::database::{DatabaseConfig, DatabaseManager, NewUser, UserRepository};
use charity_enrich::Settings;

#[derive(Parser)]
#[command(name = "manage_users")]
#[command(version)]
#[command(about = "Create and administer platform users")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Postgres connection string (defaults to DATABASE_URL)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user
    AddUser {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        /// Full name
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        organization: Option<String>,

        /// Grant superuser rights
        #[arg(long)]
        superuser: bool,
    },

    /// List all users
    ListUsers,

    /// Grant superuser rights
    MakeSuperuser { email: String },

    /// Deactivate an account
    DisableUser { email: String },

    /// Reactivate an account
    EnableUser { email: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::from_env();
    if let Some(url) = cli.database_url {
        settings.database_url = url;
    }

    let db = DatabaseManager::new(DatabaseConfig::from_settings(&settings))
        .await
        .context("Failed to connect to database")?;
    let users = UserRepository::new(db.pool().clone());

    let result = match cli.command {
        Commands::AddUser {
            email,
            password,
            name,
            organization,
            superuser,
        } => cmd_add_user(&users, email, password, name, organization, superuser).await,
        Commands::ListUsers => cmd_list_users(&users).await,
        Commands::MakeSuperuser { email } => {
            require_user(users.set_superuser(&email, true).await?, &email)?;
            println!("{} is now a superuser", email);
            Ok(())
        }
        Commands::DisableUser { email } => {
            require_user(users.set_active(&email, false).await?, &email)?;
            println!("{} disabled", email);
            Ok(())
        }
        Commands::EnableUser { email } => {
            require_user(users.set_active(&email, true).await?, &email)?;
            println!("{} enabled", email);
            Ok(())
        }
    };

    db.close().await;
    result
}

fn require_user(found: bool, email: &str) -> Result<()> {
    if !found {
        bail!("no user with email {}", email);
    }
    Ok(())
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

async fn cmd_add_user(
    users: &UserRepository,
    email: String,
    password: String,
    full_name: Option<String>,
    organization: Option<String>,
    is_superuser: bool,
) -> Result<()> {
    let email = email.trim().to_lowercase();
    validate_password_strength(&password)?;

    if users.find_by_email(&email).await?.is_some() {
        bail!("a user with email {} already exists", email);
    }

    let hashed_password = hash_password_async(password).await?;
    let user = users
        .create(NewUser {
            email,
            hashed_password,
            full_name,
            organization,
            is_superuser,
        })
        .await?;

    println!(
        "Created {}user {} ({})",
        if user.is_superuser { "super" } else { "" },
        user.email,
        user.id
    );
    Ok(())
}

async fn cmd_list_users(users: &UserRepository) -> Result<()> {
    let all = users.list().await?;
    if all.is_empty() {
        println!("No users");
        return Ok(());
    }

    println!(
        "{:<36}  {:<32}  {:<6}  {:<5}  {:<3}  {}",
        "ID", "EMAIL", "ACTIVE", "SUPER", "2FA", "LAST LOGIN"
    );
    for user in all {
        println!(
            "{:<36}  {:<32}  {:<6}  {:<5}  {:<3}  {}",
            user.id,
            user.email,
            yes_no(user.is_active),
            yes_no(user.is_superuser),
            yes_no(user.two_factor_enabled),
            user.last_login_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string())
        );
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
