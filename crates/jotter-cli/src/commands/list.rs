use jotter_core::NoteQuery;

use crate::commands::common::{normalize_search_query, print_notes, AppContext};
use crate::error::CliError;

pub async fn run_list(
    ctx: &AppContext,
    user: Option<&str>,
    mine: bool,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let query = if mine {
        NoteQuery::ByUser(ctx.auth.current_user_id().ok_or(CliError::NotSignedIn)?)
    } else {
        match user.map(str::trim).filter(|user| !user.is_empty()) {
            Some(user) => NoteQuery::ByUser(user.to_string()),
            None => NoteQuery::All,
        }
    };

    let mut notes = ctx.store.snapshot(&query).await?;
    notes.truncate(limit);
    print_notes(&notes, as_json)
}

pub async fn run_search(
    ctx: &AppContext,
    query: &str,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let term = normalize_search_query(query)?;
    let mut notes = ctx.store.snapshot(&NoteQuery::Search(term)).await?;
    notes.truncate(limit);
    print_notes(&notes, as_json)
}
