use anyhow::{Context, Result};
use serde::Deserialize;

use crate::client::Twoday;

/// Outcome of validating a dotted skin name against the hoptype registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hoptype {
    pub valid: bool,
    /// Component prototype, always lowercased.
    pub prototype: String,
    /// Skin name behind the dot, case preserved.
    pub name: String,
}

/// One entry of the GitLab repository-tree listing the registry is read
/// from. Directories ("tree") are hoptypes, everything else is noise.
#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    name: String,
}

/// Directory entries of the tree listing are the valid prototypes.
fn hoptypes_from(entries: Vec<TreeEntry>) -> Vec<String> {
    entries
        .into_iter()
        .filter(|entry| entry.kind == "tree")
        .map(|entry| entry.name.to_lowercase())
        .collect()
}

/// Splits "Site.page" into the lowercased prototype and the remainder.
/// A name without a dot is all prototype, with an empty remainder.
pub(crate) fn split_skin_name(skin_name: &str) -> (String, String) {
    let prototype = skin_name
        .split('.')
        .next()
        .unwrap_or(skin_name)
        .to_lowercase();
    let name = skin_name
        .get(prototype.len() + 1..)
        .unwrap_or_default()
        .to_string();

    (prototype, name)
}

impl Twoday {
    const REGISTRY_URL: &'static str =
        "https://gitlab.com/api/v4/projects/8966097/repository/tree?path=code&per_page=100";

    /// Lowercased names of all valid component prototypes, fetched from the
    /// public code repository once per client instance and cached for its
    /// lifetime. The cache is never invalidated.
    pub async fn valid_hoptypes(&self) -> Result<Vec<String>> {
        if let Some(cached) = self.hoptypes.lock().expect("hoptype cache poisoned").clone() {
            return Ok(cached);
        }

        let entries: Vec<TreeEntry> = self
            .get(Self::REGISTRY_URL)
            .await?
            .json()
            .await
            .context("getValidHoptypes failed")?;
        let hoptypes = hoptypes_from(entries);

        *self.hoptypes.lock().expect("hoptype cache poisoned") = Some(hoptypes.clone());

        Ok(hoptypes)
    }

    /// Checks the prototype part of a dotted skin name against the
    /// registry; the match is case-insensitive.
    pub async fn is_valid_hoptype(&self, skin_name: &str) -> Result<Hoptype> {
        let hoptypes = self.valid_hoptypes().await?;
        let (prototype, name) = split_skin_name(skin_name);

        Ok(Hoptype {
            valid: hoptypes.contains(&prototype),
            prototype,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_client() -> Twoday {
        let td = Twoday::builder("dev").silent(true).build().unwrap();
        *td.hoptypes.lock().unwrap() = Some(vec![
            "site".to_string(),
            "story".to_string(),
            "comment".to_string(),
        ]);
        td
    }

    #[test]
    fn test_registry_shape() {
        let body = r#"[
            {"id": "a1", "name": "Site", "type": "tree", "path": "code/Site"},
            {"id": "b2", "name": "Story", "type": "tree", "path": "code/Story"},
            {"id": "c3", "name": "README.md", "type": "blob", "path": "code/README.md"}
        ]"#;
        let entries: Vec<TreeEntry> = serde_json::from_str(body).unwrap();

        assert_eq!(hoptypes_from(entries), vec!["site", "story"]);
    }

    #[test]
    fn test_split_skin_name() {
        assert_eq!(
            split_skin_name("Site.page"),
            ("site".to_string(), "page".to_string())
        );
        assert_eq!(
            split_skin_name("StOrY.editForm"),
            ("story".to_string(), "editForm".to_string())
        );
        assert_eq!(
            split_skin_name("nodot"),
            ("nodot".to_string(), String::new())
        );
    }

    #[tokio::test]
    async fn test_is_valid_hoptype() {
        let td = seeded_client();

        let result = td.is_valid_hoptype("Site.page").await.unwrap();
        assert_eq!(
            result,
            Hoptype {
                valid: true,
                prototype: "site".to_string(),
                name: "page".to_string(),
            }
        );

        let result = td.is_valid_hoptype("hopsy.display").await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.prototype, "hopsy");
        assert_eq!(result.name, "display");
    }

    #[tokio::test]
    async fn test_hoptype_cache_reused() {
        let td = seeded_client();

        // a second call must be served from the cache, not the network
        td.is_valid_hoptype("story.main").await.unwrap();
        let result = td.is_valid_hoptype("story.main").await.unwrap();
        assert!(result.valid);
    }

    #[tokio::test]
    #[ignore]
    async fn test_registry_remote() {
        let td = Twoday::builder("prod").silent(true).build().unwrap();
        let hoptypes = td.valid_hoptypes().await.unwrap();
        assert!(hoptypes.len() > 40);
        assert!(hoptypes.contains(&"site".to_string()));
    }
}
