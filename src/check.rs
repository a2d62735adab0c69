//! `pdfa check`: validate configuration and report readiness.
//!
//! Loads the credentials file, then prints one row per configured page
//! (roles, providers, whether the keys it needs are present) and one row
//! per provider key.

use anyhow::Result;

use crate::config::{Config, Provider};
use crate::credentials::Credentials;
use crate::keys::ApiKeys;

pub fn run_check(config: &Config, keys: &ApiKeys) -> Result<()> {
    let credentials = Credentials::load(&config.auth.credentials_path)?;
    let users = credentials.users().count();
    let without_roles = credentials.users().filter(|u| u.roles.is_none()).count();
    println!(
        "credentials: {} ({} users, {} without roles)",
        config.auth.credentials_path.display(),
        users,
        without_roles
    );
    println!();

    println!(
        "{:<16} {:<24} {:<8} {:<10} READY",
        "PAGE", "ROLES", "LLM", "EMBEDDING"
    );
    for page in &config.apps {
        let embedding = config
            .embedding_provider_for(page)
            .map(|p| p.to_string())
            .unwrap_or_else(|| "disabled".to_string());
        let ready = match keys.for_page(config, page) {
            Ok(_) => "yes".to_string(),
            Err(e) => format!("no ({})", e),
        };
        println!(
            "{:<16} {:<24} {:<8} {:<10} {}",
            page.page,
            page.access_privilege_role.join(","),
            config.llm_provider_for(page),
            embedding,
            ready
        );
    }
    println!();

    println!("{:<16} SET", "KEY");
    for provider in [Provider::OpenAi, Provider::Gemini] {
        println!("{:<16} {}", provider.env_var(), keys.has(provider));
    }

    Ok(())
}
