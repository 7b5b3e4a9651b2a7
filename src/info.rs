use anyhow::{Context, Result};
use regex::Regex;
use scraper::Html;

use crate::client::Twoday;
use crate::page::selector;

/// Management metadata of one alias, scraped off its manage page. All
/// numbers come from fixed-position regex matches against the page text;
/// there is no schema to validate against.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AliasInfo {
    pub creator: String,
    /// Creation timestamp as printed, e.g. "24.10.2006 01:52".
    pub create_date: String,
    pub stories: u32,
    pub comments: u32,
    pub images: u32,
    pub files: u32,
    /// Quota usage in percent; 0 for trusted sites, which have no quota.
    pub disk_usage: f64,
    pub used_kb: u64,
    pub trusted_site: bool,
}

pub(crate) fn extract_alias_version(page: &Html) -> String {
    let body = selector::from("body");

    page.select(&body)
        .next()
        .and_then(|el| el.value().attr("data-version"))
        .unwrap_or("N/A")
        .to_string()
}

fn capture(re: &str, text: &str) -> Option<String> {
    Regex::new(re)
        .unwrap()
        .captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

fn capture_count(label: &str, text: &str) -> u32 {
    capture(&format!(r"(\d+)\s+{label}"), text)
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

pub(crate) fn extract_alias_info(text: &str) -> AliasInfo {
    let creator = capture(r"Erstellt von\s+(\S+)", text).unwrap_or_default();
    let create_date = capture(r"am\s+(\d{1,2}\.\d{1,2}\.\d{4} \d{1,2}:\d{2})", text)
        .unwrap_or_default();

    let used_kb = capture(r"\((\d+)\s*KB\)", text)
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);

    // trusted sites have no quota, so the percentage line is missing
    let percent = capture(r"(\d+(?:,\d+)?)\s*%", text);
    let trusted_site = percent.is_none();
    let disk_usage = percent
        .and_then(|p| p.replace(',', ".").parse().ok())
        .unwrap_or(0.0);

    AliasInfo {
        creator,
        create_date,
        stories: capture_count("Beiträge", text),
        comments: capture_count("Kommentare", text),
        images: capture_count("Bilder", text),
        files: capture_count("Dateien", text),
        disk_usage,
        used_kb,
        trusted_site,
    }
}

impl Twoday {
    /// Software version of an alien-hosted blog, read off the `data-version`
    /// body attribute; "N/A" when the alias does not run the alien stack.
    pub async fn alien_version(&self, alias: &str) -> Result<String> {
        let body = self
            .get_text(&self.alias_domain(alias)?)
            .await
            .with_context(|| format!(r#"Error while checking alien version of "{alias}""#))?;

        Ok(extract_alias_version(&Html::parse_document(&body)))
    }

    /// Creator, counts and quota usage of an alias from its manage page.
    pub async fn info(&self, alias: &str) -> Result<AliasInfo> {
        self.check_logged_in()?;

        let url = format!("{}/manage", self.alias_domain(alias)?);
        let body = self
            .get_text(&url)
            .await
            .with_context(|| format!(r#"Error while reading infos of "{alias}""#))?;

        let text = Html::parse_document(&body)
            .root_element()
            .text()
            .collect::<String>();

        Ok(extract_alias_info(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_alias_version() {
        let html = r#"<html><body data-version="1.4.2"><p>hi</p></body></html>"#;
        assert_eq!(extract_alias_version(&Html::parse_document(html)), "1.4.2");

        let html = "<html><body><p>hi</p></body></html>";
        assert_eq!(extract_alias_version(&Html::parse_document(html)), "N/A");
    }

    #[test]
    fn test_extract_alias_info() {
        let text = "Erstellt von NeonWilderness am 24.10.2006 01:52\n\
            397 Beiträge, 5773 Kommentare, 74 Bilder, 5 Dateien\n\
            6,8 % von 100 MB belegt (5973 KB)";
        let info = extract_alias_info(text);

        assert_eq!(info.creator, "NeonWilderness");
        assert_eq!(info.create_date, "24.10.2006 01:52");
        assert_eq!(info.stories, 397);
        assert_eq!(info.comments, 5773);
        assert_eq!(info.images, 74);
        assert_eq!(info.files, 5);
        assert_eq!(info.disk_usage, 6.8);
        assert_eq!(info.used_kb, 5973);
        assert!(!info.trusted_site);
    }

    #[test]
    fn test_extract_alias_info_trusted_site() {
        let text = "Erstellt von kunstbetrieb am 07.11.2008 00:31\n\
            412 Beiträge, 1202 Kommentare, 230 Bilder, 18 Dateien\n\
            Trusted Site, unbegrenzter Speicherplatz (104863 KB)";
        let info = extract_alias_info(text);

        assert_eq!(info.creator, "kunstbetrieb");
        assert_eq!(info.disk_usage, 0.0);
        assert_eq!(info.used_kb, 104863);
        assert!(info.trusted_site);
    }
}
