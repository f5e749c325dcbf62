use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const TOKEN_FILE: &str = "auth.token";

/// Bearer token for the backend, stored next to the server state
pub struct CredentialStore {
    token_path: PathBuf,
    token: Option<String>,
}

impl CredentialStore {
    /// Load the token if one has been saved
    pub fn load(data_dir: &Path) -> Result<Self> {
        let token_path = data_dir.join(TOKEN_FILE);

        let token = if token_path.exists() {
            let raw = fs::read_to_string(&token_path)
                .with_context(|| format!("Failed to read {}", token_path.display()))?;
            Some(raw.trim().to_string()).filter(|t| !t.is_empty())
        } else {
            None
        };

        Ok(Self { token_path, token })
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set(&mut self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("Token must not be empty");
        }
        save_token(&self.token_path, token)?;
        self.token = Some(token.to_string());
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.token_path.exists() {
            fs::remove_file(&self.token_path)
                .with_context(|| format!("Failed to remove {}", self.token_path.display()))?;
        }
        self.token = None;
        Ok(())
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }
}

fn save_token(path: &Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, token)?;

    // Owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}
