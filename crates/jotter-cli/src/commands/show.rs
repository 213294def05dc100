use crate::commands::common::{format_timestamp, note_to_list_item, parse_note_id, AppContext};
use crate::error::CliError;

pub async fn run_show(ctx: &AppContext, id: &str, as_json: bool) -> Result<(), CliError> {
    let id = parse_note_id(id)?;
    let note = ctx.require_note(id).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&note_to_list_item(&note))?);
        return Ok(());
    }

    println!("id:       {id}");
    if !note.title.trim().is_empty() {
        println!("title:    {}", note.title);
    }
    if !note.user_id.is_empty() {
        println!("owner:    {}", note.user_id);
    }
    if note.color != 0 {
        println!("color:    {}", note.color);
    }
    println!("created:  {}", format_timestamp(note.created_at));
    println!("updated:  {}", format_timestamp(note.updated_at));
    println!();
    println!("{}", note.content);
    Ok(())
}
