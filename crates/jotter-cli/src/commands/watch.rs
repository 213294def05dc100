use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use jotter_core::QueryBus;

use crate::commands::common::{format_note_lines, AppContext};
use crate::error::CliError;

/// Print the live feed and redraw it on every emission.
///
/// Each stdin line replaces the search text; an empty line clears it.
pub async fn run_watch(ctx: &AppContext) -> Result<(), CliError> {
    let bus = QueryBus::new(
        ctx.store.clone(),
        Arc::clone(&ctx.auth),
        ctx.config.query_options(),
    );
    let mut feed = bus.observe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    eprintln!("Watching notes. Type to search, Ctrl-C to quit.");
    render(&bus, &feed.current());

    loop {
        tokio::select! {
            notes = feed.changed() => {
                render(&bus, &notes?);
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(text) => bus.set_search(text),
                    None => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

fn render(bus: &QueryBus, notes: &[jotter_core::Note]) {
    let label = bus
        .active_query()
        .map_or_else(|| "-".to_string(), |query| query.to_string());
    println!("--- {label} ({} notes)", notes.len());
    for line in format_note_lines(notes) {
        println!("{line}");
    }
}
