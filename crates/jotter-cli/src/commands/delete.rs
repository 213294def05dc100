use crate::commands::common::{parse_note_id, AppContext};
use crate::error::CliError;

pub async fn run_delete(ctx: &AppContext, id: &str) -> Result<(), CliError> {
    let id = parse_note_id(id)?;
    if !ctx.sync.delete_by_id(id).await? {
        return Err(CliError::NoteNotFound(id.to_string()));
    }

    ctx.finish_mirroring().await;
    println!("Deleted note {id}");
    Ok(())
}
