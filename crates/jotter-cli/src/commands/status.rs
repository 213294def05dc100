use crate::commands::common::{format_timestamp, AppContext};
use crate::error::CliError;

pub async fn run_status(ctx: &AppContext) -> Result<(), CliError> {
    let notes = ctx.store.snapshot(&jotter_core::NoteQuery::All).await?;
    let status = ctx.sync.status().borrow().clone();

    println!("profile:  {}", ctx.profile_name);
    match ctx.store.path() {
        Some(path) => println!("database: {}", path.display()),
        None => println!("database: (in memory)"),
    }
    println!("notes:    {}", notes.len());

    match ctx.auth.current_user_id() {
        Some(user_id) => {
            println!("user:     {user_id}");
            match ctx.sync.last_reconciled_at(&user_id).await? {
                Some(at) => println!("pulled:   {}", format_timestamp(at)),
                None => println!("pulled:   never"),
            }
        }
        None => println!("user:     (signed out)"),
    }

    if ctx.sync.is_local_only() {
        println!("mirror:   disabled (no remote configured)");
    } else {
        println!("mirror:   {}", status.state);
        if let Some(error) = &status.last_error {
            println!("error:    {error}");
        }
    }
    Ok(())
}
