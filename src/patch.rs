//! Game patch handling.
//!
//! The current catalog version is an explicit dependency: components that need
//! it take a [`PatchProvider`], which must be refreshed before first use.

use std::sync::RwLock;

use anyhow::{Context, Result, anyhow};

use crate::http_cache::fetch_json_cached;
use crate::http_client::http_client;

const DDRAGON_BASE: &str = "https://ddragon.leagueoflegends.com";

/// Source of the current catalog version (e.g. `"14.16.1"`).
pub trait PatchProvider: Send + Sync {
    /// Last known version, `None` before the first successful refresh.
    fn current(&self) -> Option<String>;

    fn refresh(&self) -> Result<String>;

    fn require(&self) -> Result<String> {
        self.current()
            .ok_or_else(|| anyhow!("patch version not initialized; call refresh first"))
    }
}

/// Pinned version, for tests and offline catalog loads.
#[derive(Debug, Clone)]
pub struct FixedPatch(pub String);

impl PatchProvider for FixedPatch {
    fn current(&self) -> Option<String> {
        Some(self.0.clone())
    }

    fn refresh(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Reads the newest version from the static data CDN.
#[derive(Debug, Default)]
pub struct DdragonPatchProvider {
    cached: RwLock<Option<String>>,
}

impl DdragonPatchProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatchProvider for DdragonPatchProvider {
    fn current(&self) -> Option<String> {
        self.cached
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn refresh(&self) -> Result<String> {
        let client = http_client()?;
        let url = format!("{DDRAGON_BASE}/api/versions.json");
        let body = fetch_json_cached(client, &url).context("fetch versions list")?;
        let version = parse_latest_version(&body)?;
        let mut guard = self
            .cached
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.as_deref() != Some(version.as_str()) {
            log::info!("catalog version now {version}");
        }
        *guard = Some(version.clone());
        Ok(version)
    }
}

pub fn parse_latest_version(raw: &str) -> Result<String> {
    let versions: Vec<String> =
        serde_json::from_str(raw.trim()).context("invalid versions json")?;
    versions
        .into_iter()
        .find(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("versions list is empty"))
}

/// First two dot-separated components of a game version: `"14.16.1.2"` -> `"14.16"`.
pub fn patch_from_version(version: &str) -> String {
    let mut parts = version.trim().split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => format!("{major}.{minor}"),
        (Some(major), None) => major.to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Champion,
    Item,
    ProfileIcon,
    SummonerSpell,
    Rune,
}

pub fn catalog_url(version: &str, file: &str) -> String {
    format!("{DDRAGON_BASE}/cdn/{version}/data/en_US/{file}")
}

/// CDN URL for a catalog image path.
pub fn asset_url(provider: &dyn PatchProvider, kind: AssetKind, image_path: &str) -> Result<String> {
    let folder = match kind {
        AssetKind::Champion => "champion",
        AssetKind::Item => "item",
        AssetKind::ProfileIcon => "profileicon",
        AssetKind::SummonerSpell => "spell",
        // Rune icons are versionless and already carry their folder.
        AssetKind::Rune => return Ok(format!("{DDRAGON_BASE}/cdn/img/{image_path}")),
    };
    let version = provider.require()?;
    Ok(format!("{DDRAGON_BASE}/cdn/{version}/img/{folder}/{image_path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_is_major_minor() {
        assert_eq!(patch_from_version("14.16.1.2"), "14.16");
        assert_eq!(patch_from_version("13.1.500"), "13.1");
        assert_eq!(patch_from_version("14"), "14");
        assert_eq!(patch_from_version(""), "");
    }

    #[test]
    fn latest_version_is_first_entry() {
        let raw = r#"["14.16.1", "14.15.1", "lolpatch_3.7"]"#;
        assert_eq!(parse_latest_version(raw).expect("parse"), "14.16.1");
        assert!(parse_latest_version("[]").is_err());
    }

    #[test]
    fn asset_urls_use_provider_version() {
        let provider = FixedPatch("14.16.1".to_string());
        assert_eq!(
            asset_url(&provider, AssetKind::Champion, "Ahri.png").expect("url"),
            "https://ddragon.leagueoflegends.com/cdn/14.16.1/img/champion/Ahri.png"
        );
        assert_eq!(
            asset_url(&provider, AssetKind::Rune, "perk-images/Styles/Domination.png")
                .expect("url"),
            "https://ddragon.leagueoflegends.com/cdn/img/perk-images/Styles/Domination.png"
        );
    }

    #[test]
    fn uninitialized_provider_refuses_urls() {
        let provider = DdragonPatchProvider::new();
        assert!(provider.current().is_none());
        assert!(asset_url(&provider, AssetKind::Item, "1001.png").is_err());
    }
}
