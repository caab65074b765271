//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use gatehouse_core::config::{self, paths};
use gatehouse_core::logging;

mod app;
mod commands;
mod forms;

#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(version)]
#[command(about = "Sign in, manage your account and check route access")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Password input shared by the commands that need one.
#[derive(clap::Args, Debug, Clone, Default)]
struct PasswordArgs {
    /// Password (read from stdin when omitted)
    #[arg(long, env = "GATEHOUSE_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create an account
    Signup {
        /// Display name
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[command(flatten)]
        password: PasswordArgs,
    },
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[command(flatten)]
        password: PasswordArgs,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show who is signed in
    Status,
    /// Send a password reset email
    ResetPassword {
        #[arg(long)]
        email: String,
    },
    /// Change the password of the signed-in user
    Password {
        #[command(flatten)]
        password: PasswordArgs,
    },
    /// Update name, avatar or email of the signed-in user
    Account {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Show or edit the extended profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Show or set the interface language
    Lang {
        #[command(subcommand)]
        command: LangCommands,
    },
    /// Check what the route guard does for a path
    Route {
        /// Path to visit, e.g. `/profile`
        #[arg(value_name = "PATH")]
        path: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ProfileCommands {
    /// Show the profile of the signed-in user
    Show,
    /// Update profile fields (creates the profile if missing)
    Update {
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
}

#[derive(clap::Subcommand)]
enum LangCommands {
    /// Show the effective language
    Show,
    /// Store a language preference (`en` or `es`)
    Set {
        #[arg(value_name = "LANG")]
        language: String,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = logging::init(&paths::logs_dir());

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;

    match cli.command {
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },

        Commands::Lang { command } => match command {
            LangCommands::Show => {
                commands::lang::show();
                Ok(())
            }
            LangCommands::Set { language } => commands::lang::set(&language),
        },

        Commands::Signup {
            name,
            email,
            password,
        } => {
            let (password, confirmation) = forms::read_new_password(password.password)?;
            forms::validate_signup(&name, &email, &password, &confirmation)?;
            let app = app::App::start(&config).await?;
            commands::auth::signup(&app, name.trim(), email.trim(), &password).await
        }
        Commands::Login { email, password } => {
            let password = forms::read_password(password.password, "Password: ")?;
            forms::validate_login(&email, &password)?;
            let app = app::App::start(&config).await?;
            commands::auth::login(&app, email.trim(), &password).await
        }
        Commands::Logout => commands::auth::logout(&app::App::start(&config).await?).await,
        Commands::Status => {
            commands::auth::status(&app::App::start(&config).await?);
            Ok(())
        }
        Commands::ResetPassword { email } => {
            forms::validate_email(&email)?;
            let app = app::App::start(&config).await?;
            commands::auth::reset_password(&app, email.trim()).await
        }
        Commands::Password { password } => {
            let password = forms::read_password(password.password, "New password: ")?;
            forms::validate_new_password(&password)?;
            let app = app::App::start(&config).await?;
            commands::auth::change_password(&app, &password).await
        }
        Commands::Account {
            name,
            avatar_url,
            email,
        } => {
            let update = forms::account_update(name, avatar_url, email)?;
            let app = app::App::start(&config).await?;
            commands::auth::update_account(&app, update).await
        }

        Commands::Profile { command } => {
            let app = app::App::start(&config).await?;
            match command {
                ProfileCommands::Show => commands::profile::show(&app).await,
                ProfileCommands::Update {
                    bio,
                    phone,
                    avatar_url,
                } => commands::profile::update(&app, bio, phone, avatar_url).await,
            }
        }

        Commands::Route { path } => {
            let app = app::App::start(&config).await?;
            commands::route::check(&app, &config.guard, &path)
        }
    }
}
