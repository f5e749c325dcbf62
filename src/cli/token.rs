use anyhow::Result;

use crate::config::Config;
use crate::state::CredentialStore;

pub fn set_token(config: &Config, token: &str) -> Result<()> {
    let mut store = CredentialStore::load(&config.paths.data_dir)?;
    store.set(token)?;
    println!("Token saved to {}", store.token_path().display());
    Ok(())
}

pub fn clear_token(config: &Config) -> Result<()> {
    let mut store = CredentialStore::load(&config.paths.data_dir)?;
    store.clear()?;
    println!("Token removed");
    Ok(())
}
