use jotter_core::util::normalize_text_option;
use jotter_core::JotterConfig;

use crate::cli::ConfigCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

/// Values passed to `config init`; `None` keeps the stored value.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub remote_url: Option<String>,
    pub remote_api_key: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => run_config_show(global_profile),
        ConfigCommands::Init {
            remote_url,
            remote_api_key,
            supabase_url,
            supabase_anon_key,
            no_activate,
        } => run_config_init(
            global_profile,
            ProfileUpdate {
                remote_url,
                remote_api_key,
                supabase_url,
                supabase_anon_key,
            },
            no_activate,
        ),
    }
}

fn run_config_show(global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);
    let resolved = config.resolve(&profile_name).map_err(CliError::Config)?;

    println!("# profile '{profile_name}'");
    println!("{}", serde_json::to_string_pretty(&redacted(&resolved))?);
    if resolved.remote().is_none() {
        println!("# no remote_url: notes stay on this device");
    }
    Ok(())
}

fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let profile = config.profile_mut_or_default(&profile_name);
    apply_profile_update(profile, update);
    profile
        .validate()
        .map_err(|error| CliError::Config(error.to_string()))?;
    let ready_for_auth = profile.supabase()?.is_some();

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!("Profile '{profile_name}' saved to {}", path.display());
    if ready_for_auth {
        println!("Run `jotter auth login --email <email> --password <password>` to sign in.");
    }
    Ok(())
}

pub fn apply_profile_update(profile: &mut JotterConfig, update: ProfileUpdate) {
    if let Some(value) = normalize_text_option(update.remote_url) {
        profile.remote_url = Some(value.trim_end_matches('/').to_string());
    }
    if let Some(value) = normalize_text_option(update.remote_api_key) {
        profile.remote_api_key = Some(value);
    }
    if let Some(value) = normalize_text_option(update.supabase_url) {
        profile.supabase_url = Some(value.trim_end_matches('/').to_string());
    }
    if let Some(value) = normalize_text_option(update.supabase_anon_key) {
        profile.supabase_anon_key = Some(value);
    }
}

/// Copy of `config` with secrets masked for display.
pub fn redacted(config: &JotterConfig) -> JotterConfig {
    let mask = |value: &Option<String>| value.as_ref().map(|secret| mask_secret(secret));
    JotterConfig {
        remote_api_key: mask(&config.remote_api_key),
        supabase_anon_key: mask(&config.supabase_anon_key),
        ..config.clone()
    }
}

fn mask_secret(secret: &str) -> String {
    let visible = secret.chars().take(4).collect::<String>();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}
