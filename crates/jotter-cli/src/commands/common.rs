use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use jotter_core::remote::RemoteStore;
use jotter_core::{
    AuthProvider, HttpRemoteStore, JotterConfig, LocalStore, Note, NoteId, StaticAuthProvider,
    SyncCoordinator, SyncState,
};
use serde::Serialize;

use crate::auth::supabase_provider;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

/// Everything a command needs, built once per invocation.
pub struct AppContext {
    pub profile_name: String,
    pub config: JotterConfig,
    pub store: LocalStore,
    pub auth: Arc<dyn AuthProvider>,
    pub sync: SyncCoordinator,
}

impl AppContext {
    /// Resolve the profile from the CLI config file and open the store.
    pub async fn open(db_path: &Path, profile: Option<&str>) -> Result<Self, CliError> {
        let profiles = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = profiles.resolve_profile_name(profile);
        let config = profiles.resolve(&profile_name).map_err(CliError::Config)?;

        let auth: Arc<dyn AuthProvider> = match config.supabase()? {
            Some((url, anon_key)) => Arc::new(
                supabase_provider(&profile_name, &url, &anon_key)
                    .await
                    .map_err(|error| CliError::Auth(error.to_string()))?,
            ),
            None => Arc::new(StaticAuthProvider::anonymous()),
        };

        Self::open_with(db_path, profile_name, config, auth).await
    }

    pub async fn open_with(
        db_path: &Path,
        profile_name: String,
        config: JotterConfig,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self, CliError> {
        let remote: Option<Arc<dyn RemoteStore>> = match config.remote() {
            Some(remote) => Some(Arc::new(
                HttpRemoteStore::new(remote)?.with_auth(Arc::clone(&auth)),
            )),
            None => None,
        };

        let store = LocalStore::open_path(db_path).await?;
        let sync = SyncCoordinator::new(store.clone(), remote, Arc::clone(&auth), config.sync_options());
        if sync.is_local_only() {
            tracing::debug!("Profile '{profile_name}' has no remote; running local-only");
        }

        Ok(Self {
            profile_name,
            config,
            store,
            auth,
            sync,
        })
    }

    /// Wait for queued mirror operations and report failures on stderr.
    pub async fn finish_mirroring(&self) {
        self.sync.flush().await;
        let status = self.sync.status().borrow().clone();
        if status.state == SyncState::Error {
            eprintln!(
                "Warning: saved locally, but the remote mirror failed: {}",
                status.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    pub async fn require_note(&self, id: NoteId) -> Result<Note, CliError> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| CliError::NoteNotFound(id.to_string()))
    }
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: Option<NoteId>,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub user_id: String,
    pub color: i32,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        id: note.id,
        title: note.title.clone(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        user_id: note.user_id.clone(),
        color: note.color,
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms),
    }
}

pub fn print_notes(notes: &[Note], as_json: bool) -> Result<(), CliError> {
    if as_json {
        let items = notes.iter().map(note_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if notes.is_empty() {
        println!("No notes.");
    } else {
        for line in format_note_lines(notes) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let id = note.id.map(|id| id.to_string()).unwrap_or_default();
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);
            format!("{id:>6}  {preview:<40}  {relative_time}")
        })
        .collect()
}

/// Display title with whitespace collapsed, ellipsised past `max_chars`
pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let collapsed = note
        .display_title(usize::MAX)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn parse_note_id(id: &str) -> Result<NoteId, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyNoteId);
    }
    trimmed
        .parse::<NoteId>()
        .ok()
        .filter(|id| id.get() > 0)
        .ok_or_else(|| CliError::InvalidNoteId(trimmed.to_string()))
}

/// Content from arguments, then piped stdin, then `$EDITOR`.
pub fn resolve_note_content(content_parts: &[String]) -> Result<Option<String>, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(Some(content));
    }
    if let Some(content) = read_piped_stdin()? {
        return Ok(Some(content));
    }
    capture_editor_input_with_initial("")
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_search_query(query: &str) -> Result<String, CliError> {
    normalize_content(query).ok_or(CliError::EmptySearchQuery)
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let status = match Command::new(editor).arg(file_path).status() {
        Ok(status) => status,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            // EDITOR may carry arguments, e.g. "code --wait"
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };
            Command::new(program).args(parts).arg(file_path).status()?
        }
        Err(err) => return Err(CliError::Io(err)),
    };

    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("jotter-note-{}-{now}.md", std::process::id()))
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("JOTTER_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("jotter").join("jotter.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}
