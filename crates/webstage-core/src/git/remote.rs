//! Authenticated remote URLs.

use std::fmt;

use anyhow::Context;
use url::Url;

/// A clone URL carrying an access token as its user-info.
#[derive(Clone)]
pub struct Remote {
    url: Url,
    secrets: Vec<String>,
}

impl Remote {
    /// `<base>/<project>/_git/<repo>`, each segment percent-encoded.
    pub fn repository(base: &str, project: &str, repo: &str, token: &str) -> anyhow::Result<Self> {
        let mut url =
            Url::parse(base).with_context(|| format!("Invalid source-control URL: {}", base))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Source-control URL cannot carry a path: {}", base))?
            .pop_if_empty()
            .push(project)
            .push("_git")
            .push(repo);
        url.set_username(token)
            .map_err(|_| anyhow::anyhow!("Source-control URL cannot carry credentials: {}", base))?;

        let mut secrets = vec![token.to_string()];
        let encoded = url.username().to_string();
        if encoded != token {
            secrets.push(encoded);
        }
        Ok(Self { url, secrets })
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Values that must never appear in logs.
    pub fn secrets(&self) -> &[String] {
        &self.secrets
    }
}

impl fmt::Display for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut masked = self.url.clone();
        if !masked.username().is_empty() {
            let _ = masked.set_username("***");
        }
        write!(f, "{}", masked)
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Remote").field(&self.to_string()).finish()
    }
}
