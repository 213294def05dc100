//! jotter - command-line front end for Jotter notes

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::{resolve_db_path, AppContext};
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::{run_list, run_search};
use crate::commands::reconcile::run_reconcile;
use crate::commands::show::run_show;
use crate::commands::status::run_status;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("jotter=info,jotter_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    let command = match cli.command {
        // Profile edits never touch the note database
        Some(Commands::Config { command }) => return run_config(command, profile),
        Some(command) => command,
        None if cli.note.is_empty() => {
            Cli::command().print_help()?;
            println!();
            return Ok(());
        }
        // Quick capture mode: jotter "my thought"
        None => Commands::Add {
            title: None,
            color: 0,
            content: cli.note,
        },
    };

    let db_path = resolve_db_path(cli.db_path)?;
    let ctx = AppContext::open(&db_path, profile).await?;
    tracing::debug!("Using database {}", db_path.display());

    match command {
        Commands::Add {
            title,
            color,
            content,
        } => run_add(&ctx, title.as_deref(), color, &content).await,
        Commands::List {
            user,
            mine,
            limit,
            json,
        } => run_list(&ctx, user.as_deref(), mine, limit, json).await,
        Commands::Search { query, limit, json } => run_search(&ctx, &query, limit, json).await,
        Commands::Show { id, json } => run_show(&ctx, &id, json).await,
        Commands::Edit {
            id,
            title,
            content,
            color,
        } => run_edit(&ctx, &id, title, content, color).await,
        Commands::Delete { id } => run_delete(&ctx, &id).await,
        Commands::Reconcile { user, json } => run_reconcile(&ctx, user.as_deref(), json).await,
        Commands::Watch => run_watch(&ctx).await,
        Commands::Status => run_status(&ctx).await,
        Commands::Auth { command } => run_auth(&ctx, command).await,
        Commands::Config { command } => run_config(command, profile),
    }
}
