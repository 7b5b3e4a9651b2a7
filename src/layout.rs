use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, ensure};
use scraper::Html;
use tokio::fs;

use crate::client::Twoday;
use crate::page::{self, selector};
use crate::parser;

/// Cached layout state of one alias. Populated lazily on first access and
/// replaced only by an explicit refresh; it never expires on its own.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayoutData {
    /// Root url of the active layout, e.g. ".../layouts/rainy".
    pub active_layout_url: String,
    pub active_layout_name: String,
    /// All layouts installed on the alias.
    pub layout_names: Vec<String>,
}

/// A layout download target: layout name and local zip path.
#[derive(Clone, Debug)]
pub struct LayoutInfo {
    pub name: String,
    pub path: PathBuf,
}

pub(crate) fn extract_layout_data(page: &Html) -> Option<LayoutData> {
    let anchor = selector::from(".level2 a");

    let mut data = LayoutData::default();
    for a in page.select(&anchor) {
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let Some(name) = parser::segment_after(href, "layouts") else {
            continue;
        };

        data.layout_names.push(name.to_string());

        let active = a.value().classes().any(|class| class == "active");
        if active && data.active_layout_name.is_empty() {
            data.active_layout_name = name.to_string();
            data.active_layout_url = parser::fix_url(&parser::parent_url(href));
        }
    }

    (!data.active_layout_url.is_empty()).then_some(data)
}

impl Twoday {
    /// Layout state of the alias, from the cache unless absent or `refresh`
    /// is set, in which case the layouts page is scraped again.
    pub async fn get_layout(&self, alias: &str, refresh: bool) -> Result<LayoutData> {
        if !refresh {
            let cache = self.layouts.lock().expect("layout cache poisoned");
            if let Some(cached) = cache.get(alias) {
                return Ok(cached.clone());
            }
        }

        self.check_logged_in()?;

        let url = format!("{}/layouts/main", self.alias_domain(alias)?);
        let body = self
            .get_text(&url)
            .await
            .with_context(|| format!(r#"getLayout from "{alias}" failed"#))?;

        let data = extract_layout_data(&Html::parse_document(&body))
            .ok_or_else(|| anyhow!(r#"No active layout found for "{alias}""#))?;

        self.layouts
            .lock()
            .expect("layout cache poisoned")
            .insert(alias.to_string(), data.clone());

        Ok(data)
    }

    /// Root url of the alias' active layout; skin edit urls hang off it.
    pub async fn layout_url(&self, alias: &str) -> Result<String> {
        Ok(self.get_layout(alias, false).await?.active_layout_url)
    }

    pub async fn active_layout_name(&self, alias: &str) -> Result<String> {
        Ok(self.get_layout(alias, false).await?.active_layout_name)
    }

    pub async fn layout_names(&self, alias: &str) -> Result<Vec<String>> {
        Ok(self.get_layout(alias, false).await?.layout_names)
    }

    /// Switches the cached active layout optimistically: the cache entry is
    /// rewritten without a confirming round-trip, so subsequent skin
    /// operations target the chosen layout. A refreshed [`get_layout`] is
    /// the only way to detect drift from server state.
    ///
    /// [`get_layout`]: Self::get_layout
    pub async fn use_layout(&self, alias: &str, layout_name: &str) -> Result<LayoutData> {
        let mut data = self.get_layout(alias, false).await?;
        ensure!(
            data.layout_names.iter().any(|name| name == layout_name),
            r#"Layout "{layout_name}" is not installed on "{alias}"!"#
        );

        data.active_layout_url = format!(
            "{}/{layout_name}",
            parser::parent_url(&data.active_layout_url)
        );
        data.active_layout_name = layout_name.to_string();

        self.layouts
            .lock()
            .expect("layout cache poisoned")
            .insert(alias.to_string(), data.clone());

        Ok(data)
    }

    /// Downloads a layout export zip ("changes only") to `layout.path`.
    pub async fn download_layout(&self, alias: &str, layout: &LayoutInfo) -> Result<()> {
        self.check_logged_in()?;

        let download_url = format!(
            "{}/layouts/{}/download",
            self.alias_domain(alias)?,
            layout.name
        );
        let secret = self.fetch_secret_key(&download_url).await?;

        let response = self
            .post_form(
                &download_url,
                &[
                    ("secretKey", secret.as_str()),
                    ("changesonly", "Nur Änderungen"),
                ],
            )
            .await
            .with_context(|| {
                format!(r#"Error while downloading layout "{alias}/{}""#, layout.name)
            })?;

        let bytes = response.bytes().await?;
        fs::write(&layout.path, &bytes).await?;

        self.log(format!(
            r#"Layout "{alias}/{}" successfully downloaded."#,
            layout.name
        ));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUTS_PAGE: &str = r#"
        <div class="level2">
            <a class="active" href="//neonwilderness.twoday.xyz/layouts/rainy/main">rainy</a>
            <a href="//neonwilderness.twoday.xyz/layouts/alien/main">alien</a>
            <a href="//neonwilderness.twoday.xyz/layouts/classic/main">classic</a>
        </div>"#;

    #[test]
    fn test_extract_layout_data() {
        let data = extract_layout_data(&Html::parse_document(LAYOUTS_PAGE)).unwrap();

        assert_eq!(
            data.active_layout_url,
            "https://neonwilderness.twoday.xyz/layouts/rainy"
        );
        assert_eq!(data.active_layout_name, "rainy");
        assert_eq!(data.layout_names, vec!["rainy", "alien", "classic"]);
    }

    #[test]
    fn test_extract_layout_data_without_active() {
        let html = r#"
            <div class="level2">
                <a href="//neon.twoday.xyz/layouts/alien/main">alien</a>
            </div>"#;
        assert!(extract_layout_data(&Html::parse_document(html)).is_none());
    }

    #[tokio::test]
    async fn test_use_layout_rewrites_cache() {
        let td = Twoday::builder("dev").silent(true).build().unwrap();
        let data = extract_layout_data(&Html::parse_document(LAYOUTS_PAGE)).unwrap();
        td.layouts
            .lock()
            .unwrap()
            .insert("neonwilderness".to_string(), data);

        let updated = td.use_layout("neonwilderness", "alien").await.unwrap();
        assert_eq!(updated.active_layout_name, "alien");
        assert_eq!(
            updated.active_layout_url,
            "https://neonwilderness.twoday.xyz/layouts/alien"
        );

        // the optimistic rewrite sticks until an explicit refresh
        let cached = td.get_layout("neonwilderness", false).await.unwrap();
        assert_eq!(cached, updated);

        let missing = td.use_layout("neonwilderness", "nosuchlayout").await;
        assert!(missing.is_err());
    }
}
