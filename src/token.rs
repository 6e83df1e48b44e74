use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Deserialize, Debug)]
pub struct Token {
    pub access_token: String,
}

impl Token {
    /// Accepts either the OAuth JSON document or the bare token, with or without `oauth:`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Token> {
        let path = path.as_ref();
        let file_content = std::fs::read_to_string(path)
            .with_context(|| format!("couldn't read token from {}", path.display()))?;
        Self::parse(&file_content).with_context(|| format!("invalid token file {}", path.display()))
    }

    fn parse(contents: &str) -> Result<Token> {
        let trimmed = contents.trim();
        let raw = if trimmed.starts_with('{') {
            serde_json::from_str::<Token>(trimmed)?.access_token
        } else {
            trimmed.to_string()
        };

        let access_token = raw.strip_prefix("oauth:").unwrap_or(&raw).trim().to_string();
        if access_token.is_empty() {
            bail!("access token is empty");
        }
        Ok(Token { access_token })
    }
}
