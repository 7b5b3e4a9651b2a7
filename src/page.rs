use anyhow::Result;
use scraper::{ElementRef, Html};

use crate::client::Twoday;
use crate::parser;

/// A name/url pair as listed on the CMS overview pages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameUrl {
    pub name: String,
    pub url: String,
}

pub(crate) mod selector {
    use scraper::Selector;

    pub fn from(s: &str) -> Selector {
        match Selector::parse(s) {
            Ok(s) => s,
            Err(_) => panic!("unable to parse selector {s}"),
        }
    }
}

/// Value of the named form field, `None` when the page has no such field.
///
/// Inputs carry their value in the `value` attribute, textareas as text
/// content. Absence is not an error; the caller decides what a missing
/// field means.
pub(crate) fn field_value(page: &Html, name: &str) -> Option<String> {
    let field = selector::from(&format!(r#"[name="{name}"]"#));
    let el = page.select(&field).next()?;

    match el.value().name() {
        "textarea" => Some(el.text().collect::<String>()),
        _ => el.value().attr("value").map(str::to_string),
    }
}

/// The per-form anti-forgery token replayed on the paired POST.
pub(crate) fn secret_key(page: &Html) -> Option<String> {
    field_value(page, "secretKey")
}

/// Full text of an element, whitespace preserved as-is.
pub(crate) fn text_of(el: ElementRef) -> String {
    el.text().collect::<String>()
}

/// Number of pages beyond page 0, derived from the first `.pageNavSummary`
/// (e.g. "zeige 1-20 (von 70)") with the fixed page size of 20. A missing
/// or reformatted summary silently yields a single page.
pub(crate) fn page_count(page: &Html) -> usize {
    summary_total(page).map(|total| total / 20).unwrap_or(0)
}

pub(crate) fn summary_total(page: &Html) -> Option<usize> {
    let summary = selector::from(".pageNavSummary");
    page.select(&summary)
        .next()
        .and_then(|el| parser::trailing_total(&text_of(el)))
}

impl Twoday {
    /// Walks a paginated listing in page order, concatenating whatever
    /// `extract` pulls off each page. `url` must end just before the page
    /// number ("…/files/?page="). Pages are fetched strictly one after the
    /// other, each gated by the request delay.
    pub(crate) async fn list_pages<T>(
        &self,
        url: &str,
        extract: fn(&Html) -> Vec<T>,
    ) -> Result<Vec<T>> {
        let body = self.get_text(&format!("{url}0")).await?;
        let (mut all, max_page) = {
            let page = Html::parse_document(&body);
            (extract(&page), page_count(&page))
        };

        for n in 1..=max_page {
            let body = self.get_text(&format!("{url}{n}")).await?;
            let page = Html::parse_document(&body);
            all.extend(extract(&page));
        }

        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_input() {
        let html = r#"
            <form>
                <input type="hidden" name="secretKey" value="abc123">
                <input type="text" name="title" value="Startseite">
                <input type="text" name="empty">
            </form>"#;
        let page = Html::parse_document(html);

        assert_eq!(secret_key(&page).as_deref(), Some("abc123"));
        assert_eq!(field_value(&page, "title").as_deref(), Some("Startseite"));
        assert_eq!(field_value(&page, "empty"), None);
        assert_eq!(field_value(&page, "missing"), None);
    }

    #[test]
    fn test_field_value_textarea() {
        let html = r#"
            <form>
                <textarea name="skin">&lt;p&gt;Hello&lt;/p&gt;</textarea>
            </form>"#;
        let page = Html::parse_document(html);

        assert_eq!(field_value(&page, "skin").as_deref(), Some("<p>Hello</p>"));
    }

    #[test]
    fn test_page_count() {
        let html = r#"<div class="pageNavSummary">zeige 1-20 (von 45)</div>"#;
        let page = Html::parse_document(html);
        assert_eq!(page_count(&page), 2);

        let html = r#"<div class="pageNavSummary">zeige 1-20 (von 70)</div>"#;
        let page = Html::parse_document(html);
        assert_eq!(page_count(&page), 3);

        let html = r#"<div class="listItem">no summary here</div>"#;
        let page = Html::parse_document(html);
        assert_eq!(page_count(&page), 0);
    }
}
