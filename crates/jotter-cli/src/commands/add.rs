use jotter_core::Note;

use crate::commands::common::{resolve_note_content, AppContext};
use crate::error::CliError;

pub async fn run_add(
    ctx: &AppContext,
    title: Option<&str>,
    color: i32,
    content_parts: &[String],
) -> Result<(), CliError> {
    let title = title.map(str::trim).unwrap_or_default();
    let content = if content_parts.is_empty() && !title.is_empty() {
        String::new()
    } else {
        resolve_note_content(content_parts)?.unwrap_or_default()
    };

    let note = Note::new(title, content).with_color(color);
    let id = ctx
        .sync
        .create_or_update(note)
        .await?
        .ok_or(CliError::EmptyContent)?;

    ctx.finish_mirroring().await;
    println!("{id}");
    Ok(())
}
