use crate::commands::common::{
    capture_editor_input_with_initial, normalize_content, parse_note_id, AppContext,
};
use crate::error::CliError;

pub async fn run_edit(
    ctx: &AppContext,
    id: &str,
    title: Option<String>,
    content: Option<String>,
    color: Option<i32>,
) -> Result<(), CliError> {
    let id = parse_note_id(id)?;
    let mut note = ctx.require_note(id).await?;

    let flags_given = title.is_some() || content.is_some() || color.is_some();
    if let Some(title) = title {
        note.title = title.trim().to_string();
    }
    if let Some(color) = color {
        note.color = color;
    }
    if let Some(content) = content {
        note.content = normalize_content(&content).unwrap_or_default();
    } else if !flags_given {
        note.content =
            capture_editor_input_with_initial(&note.content)?.ok_or(CliError::EmptyEditedContent)?;
    }

    if note.is_blank() {
        return Err(CliError::EmptyEditedContent);
    }

    ctx.sync.create_or_update(note).await?;
    ctx.finish_mirroring().await;
    println!("{id}");
    Ok(())
}
