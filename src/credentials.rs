//! Credentials file: users, password hashes, roles, and cookie settings.
//!
//! The file is YAML with two sections:
//!
//! ```yaml
//! credentials:
//!   usernames:
//!     jsmith:
//!       email: jsmith@example.com
//!       name: John Smith
//!       password: $2b$12$...   # bcrypt hash, or plaintext (hashed on load)
//!       roles: [user]
//! cookie:
//!   name: pdfa_auth
//!   key: some-signing-key
//!   expiry_days: 30
//! ```
//!
//! Usernames are matched case-insensitively. Plaintext passwords are
//! replaced by bcrypt hashes as the file is loaded.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Upper bound for `cookie.expiry_days` (ten years).
const MAX_EXPIRY_DAYS: f64 = 3650.0;

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    credentials: CredentialsSection,
    cookie: CookieConfig,
}

#[derive(Debug, Deserialize)]
struct CredentialsSection {
    usernames: BTreeMap<String, RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    password: String,
    #[serde(default)]
    roles: Option<Vec<String>>,
}

/// Cookie settings shared by every session.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub name: String,
    pub key: String,
    pub expiry_days: f64,
}

impl CookieConfig {
    pub fn max_age_secs(&self) -> i64 {
        (self.expiry_days * 86_400.0) as i64
    }
}

/// A user who may log in.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    /// `None` when the file declares no roles; such users see no apps.
    pub roles: Option<Vec<String>>,
    password_hash: String,
}

/// Loaded credentials file.
#[derive(Debug, Clone)]
pub struct Credentials {
    users: BTreeMap<String, UserRecord>,
    pub cookie: CookieConfig,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid credentials file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Self::from_yaml_with_cost(content, bcrypt::DEFAULT_COST)
    }

    /// Parse credentials, hashing plaintext passwords with the given bcrypt cost.
    pub fn from_yaml_with_cost(content: &str, cost: u32) -> Result<Self> {
        let file: CredentialsFile =
            serde_yaml::from_str(content).context("Failed to parse credentials YAML")?;

        if file.cookie.name.trim().is_empty() {
            bail!("cookie.name must not be empty");
        }
        if file.cookie.key.is_empty() {
            bail!("cookie.key must not be empty");
        }
        let days = file.cookie.expiry_days;
        if !days.is_finite() || days <= 0.0 || days > MAX_EXPIRY_DAYS {
            bail!(
                "cookie.expiry_days must be > 0 and <= {} (got {})",
                MAX_EXPIRY_DAYS,
                days
            );
        }

        let mut users = BTreeMap::new();
        let mut hashed = 0usize;
        for (username, raw) in file.credentials.usernames {
            let key = username.to_lowercase();
            let password_hash = if is_bcrypt_hash(&raw.password) {
                raw.password
            } else {
                hashed += 1;
                bcrypt::hash(&raw.password, cost)
                    .with_context(|| format!("Failed to hash password for '{}'", username))?
            };
            let record = UserRecord {
                name: raw.name.unwrap_or_else(|| username.clone()),
                username: key.clone(),
                email: raw.email,
                roles: raw.roles,
                password_hash,
            };
            if users.insert(key, record).is_some() {
                bail!("username '{}' is declared more than once", username);
            }
        }
        if hashed > 0 {
            tracing::warn!(
                users = hashed,
                "credentials file contains plaintext passwords; run `pdfa hash-password` and store hashes instead"
            );
        }

        Ok(Self {
            users,
            cookie: file.cookie,
        })
    }

    /// Check a username/password pair. Unknown users and wrong passwords
    /// both yield `None`.
    pub fn verify(&self, username: &str, password: &str) -> Option<&UserRecord> {
        let user = self.users.get(&username.trim().to_lowercase())?;
        match bcrypt::verify(password, &user.password_hash) {
            Ok(true) => Some(user),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(user = %user.username, error = %e, "stored password hash is unreadable");
                None
            }
        }
    }

    pub fn user(&self, username: &str) -> Option<&UserRecord> {
        self.users.get(&username.to_lowercase())
    }

    pub fn users(&self) -> impl Iterator<Item = &UserRecord> {
        self.users.values()
    }
}

fn is_bcrypt_hash(s: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"].iter().any(|p| s.starts_with(p)) && s.len() == 60
}

/// Produce a bcrypt hash suitable for the credentials file.
pub fn hash_password(password: &str) -> Result<String> {
    if password.is_empty() {
        bail!("password must not be empty");
    }
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}
