use jotter_core::AuthOutcome;

use crate::cli::AuthCommands;
use crate::commands::common::AppContext;
use crate::commands::reconcile::print_report;
use crate::error::CliError;

pub async fn run_auth(ctx: &AppContext, command: AuthCommands) -> Result<(), CliError> {
    if !matches!(command, AuthCommands::Status) && ctx.config.supabase()?.is_none() {
        return Err(CliError::Config(format!(
            "Profile '{}' has no Supabase auth config. Run `jotter config init --supabase-url <URL> --supabase-anon-key <KEY>` first.",
            ctx.profile_name
        )));
    }

    match command {
        AuthCommands::Signup {
            email,
            password,
            display_name,
        } => {
            let outcome = ctx.auth.sign_up(&email, &password, &display_name).await;
            report_outcome(&outcome)?;
            if let AuthOutcome::Success(user) = outcome {
                pull_notes(ctx, &user.id).await?;
            }
            Ok(())
        }
        AuthCommands::Login { email, password } => {
            let outcome = ctx.auth.sign_in(&email, &password).await;
            report_outcome(&outcome)?;
            if let AuthOutcome::Success(user) = outcome {
                pull_notes(ctx, &user.id).await?;
            }
            Ok(())
        }
        AuthCommands::Logout { keep_local } => {
            // Pending mirror writes still need the outgoing session's token
            ctx.sync.flush().await;
            let outcome = ctx.auth.sign_out().await;
            report_outcome(&outcome)?;
            if !keep_local {
                let removed = ctx.sync.clear_local().await?;
                println!("Removed {removed} local notes from this device");
            }
            Ok(())
        }
        AuthCommands::Status => {
            let user = ctx.auth.auth_state().borrow().clone();
            match user {
                Some(user) => {
                    let email = user.email.as_deref().unwrap_or("(no email)");
                    println!(
                        "Profile '{}' is signed in as {email} (user id {})",
                        ctx.profile_name, user.id
                    );
                }
                None => println!("Profile '{}' is signed out", ctx.profile_name),
            }
            Ok(())
        }
        AuthCommands::ResetPassword { email } => {
            let outcome = ctx.auth.reset_password(&email).await;
            report_outcome(&outcome)
        }
    }
}

fn report_outcome(outcome: &AuthOutcome) -> Result<(), CliError> {
    if outcome.is_failure() {
        return Err(CliError::Auth(outcome.message()));
    }
    println!("{}", outcome.message());
    Ok(())
}

async fn pull_notes(ctx: &AppContext, user_id: &str) -> Result<(), CliError> {
    if ctx.sync.is_local_only() {
        return Ok(());
    }
    let report = ctx.sync.reconcile(user_id).await?;
    print_report(&report);
    Ok(())
}
