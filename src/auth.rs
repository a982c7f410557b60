use anyhow::{Context, Result, anyhow};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Analyst credential store, keyed by exact username. Loaded once at
/// startup; a load failure downgrades to "reject every login" at the
/// server layer rather than aborting.
pub struct UserStore {
    users: HashMap<String, String>,
}

impl UserStore {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open user store: {:?}", path))?;
        let mut rdr = ReaderBuilder::new().from_reader(file);
        let headers = rdr.headers()?.clone();

        let user_idx = headers
            .iter()
            .position(|h| h == "username")
            .ok_or_else(|| anyhow!("Column 'username' not found in {:?}", path))?;
        let pass_idx = headers
            .iter()
            .position(|h| h == "password")
            .ok_or_else(|| anyhow!("Column 'password' not found in {:?}", path))?;

        let mut users = HashMap::new();
        for result in rdr.records() {
            let record = result?;
            let username = record.get(user_idx).unwrap_or("").to_string();
            if username.is_empty() {
                continue;
            }
            users.insert(username, record.get(pass_idx).unwrap_or("").to_string());
        }

        Ok(Self { users })
    }

    /// Exact username match, then exact trimmed-password match. An unknown
    /// user is a rejection, indistinguishable from a wrong password.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        match self.users.get(username) {
            Some(stored) => stored.trim() == password.trim(),
            None => false,
        }
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            users: pairs
                .iter()
                .map(|(u, p)| (u.to_string(), p.to_string()))
                .collect(),
        }
    }
}
