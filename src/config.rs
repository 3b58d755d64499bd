use std::collections::HashSet;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Catalog configuration: which channel to enumerate and which playlists
/// form the authoritative allow-list for publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Channel handle (e.g. `@somechannel`) whose uploads are fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_handle: Option<String>,
    pub playlists: Vec<PlaylistConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistConfig {
    /// Short name published in the `playlist` field.
    pub short: String,
    /// Upstream playlist id.
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl CatalogConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read catalog config: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse catalog config: {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.playlists.is_empty() {
            anyhow::bail!("catalog config must list at least one playlist");
        }
        let mut shorts = HashSet::new();
        for playlist in &self.playlists {
            if playlist.short.trim().is_empty() {
                anyhow::bail!("playlist short name is empty (id: {})", playlist.id);
            }
            if playlist.id.trim().is_empty() {
                anyhow::bail!("playlist id is empty (short: {})", playlist.short);
            }
            if !shorts.insert(playlist.short.as_str()) {
                anyhow::bail!("duplicate playlist short name: {}", playlist.short);
            }
        }
        if let Some(handle) = self.channel_handle.as_deref()
            && handle.trim().is_empty()
        {
            anyhow::bail!("channel_handle is empty");
        }
        Ok(())
    }

    pub fn allow_list(&self) -> Vec<String> {
        self.playlists.iter().map(|p| p.short.clone()).collect()
    }
}
