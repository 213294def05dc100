use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "jotter")]
#[command(about = "Local-first notes with best-effort cloud mirroring")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Profile name for remote/auth configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Quick capture: jotter "my thought here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        #[arg(short, long)]
        title: Option<String>,
        /// Color tag (0 = default)
        #[arg(long, default_value_t = 0)]
        color: i32,
        /// Note content (stdin or $EDITOR when omitted)
        content: Vec<String>,
    },
    /// List notes, most recently updated first
    List {
        /// Only notes owned by this user id
        #[arg(long, value_name = "UID")]
        user: Option<String>,
        /// Only notes owned by the signed-in user
        #[arg(long, conflicts_with = "user")]
        mine: bool,
        /// Number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search note titles and content
    Search {
        /// Search text
        query: String,
        /// Number of notes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single note
    Show {
        /// Note ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note
    Edit {
        /// Note ID
        id: String,
        /// Replace the title
        #[arg(short, long)]
        title: Option<String>,
        /// Replace the content (opens $EDITOR when neither flag is given)
        #[arg(short, long)]
        content: Option<String>,
        /// Replace the color tag
        #[arg(long)]
        color: Option<i32>,
    },
    /// Delete a note locally and from the remote mirror
    Delete {
        /// Note ID
        id: String,
    },
    /// Pull the remote copy of a user's notes into the local store
    Reconcile {
        /// User id to reconcile (defaults to the signed-in user)
        #[arg(long, value_name = "UID")]
        user: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Live note feed; type a search and press enter, empty line clears it
    Watch,
    /// Show store, auth and mirror status
    Status,
    /// Configure profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the signed-in account
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the resolved profile configuration
    Show,
    /// Initialize or update a profile
    Init {
        /// Remote document API base URL
        #[arg(long, value_name = "URL")]
        remote_url: Option<String>,
        /// Remote document API key
        #[arg(long, value_name = "KEY")]
        remote_api_key: Option<String>,
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Create an account
    Signup {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
        #[arg(long, value_name = "NAME")]
        display_name: String,
    },
    /// Sign in and pull your notes
    Login {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Sign out and clear local notes
    Logout {
        /// Keep local notes on this device
        #[arg(long)]
        keep_local: bool,
    },
    /// Show who is signed in
    Status,
    /// Email a password reset link
    ResetPassword {
        #[arg(long, value_name = "EMAIL")]
        email: String,
    },
}
