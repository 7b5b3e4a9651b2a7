use anyhow::{Context, Result, ensure};
use reqwest::Response;
use scraper::Html;

use crate::client::Twoday;
use crate::diff::eval_diff;
use crate::hoptype::split_skin_name;
use crate::page::{self, NameUrl, selector};
use crate::parser;

/// A skin reference as returned by the modified-skins listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skin {
    /// Dotted name, e.g. "Site.page".
    pub name: String,
    /// Edit form url.
    pub url: String,
}

/// Caller-supplied content fields for creating or updating a skin. With
/// `diff` set, an update is skipped (and reported) when nothing changed.
#[derive(Clone, Debug, Default)]
pub struct SkinOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub skin: Option<String>,
    pub diff: bool,
}

/// The edit form of a skin, bookkeeping fields included. Whatever the form
/// does not carry stays `None` and is left out of the resubmission.
#[derive(Clone, Debug, Default)]
pub struct SkinForm {
    pub name: String,
    pub url: String,
    pub secret_key: Option<String>,
    pub action: Option<String>,
    pub key: Option<String>,
    pub skinset: Option<String>,
    pub module: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub skin: Option<String>,
    pub save: Option<String>,
}

/// Hoptype validation plus the modification state of one skin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IsModifiedSkin {
    pub valid: bool,
    pub prototype: String,
    pub name: String,
    pub is_modified: bool,
    /// Edit url when modified, empty otherwise.
    pub url: String,
}

/// Filler body for freshly created skins.
const NEW_SKIN_BODY: &str = "<p><!-- new skin filler text -->Bacon ipsum dolor amet minim anim \
    duis cillum, esse aliquip non chislic leberkas rump drumstick ut. Burgdoggen hamburger \
    bresaola turkey, chicken commodo chislic anim.</p>\n";

pub(crate) fn extract_modified_skins(page: &Html) -> Vec<NameUrl> {
    let anchor = selector::from(".skin > a");

    page.select(&anchor)
        .filter_map(|a| {
            let name = a.value().attr("name")?;
            let url = a.value().attr("href")?;
            Some(NameUrl {
                name: name.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

fn extract_skin_form(page: &Html, skin: &Skin) -> SkinForm {
    SkinForm {
        name: skin.name.clone(),
        url: skin.url.clone(),
        secret_key: page::secret_key(page),
        action: page::field_value(page, "action"),
        key: page::field_value(page, "key"),
        skinset: page::field_value(page, "skinset"),
        module: page::field_value(page, "module"),
        title: page::field_value(page, "title"),
        description: page::field_value(page, "description"),
        skin: page::field_value(page, "skin"),
        save: page::field_value(page, "save"),
    }
}

/// Matches a dotted skin name against the listing, prototype
/// case-insensitive, name exact.
fn find_modified<'a>(skins: &'a [NameUrl], prototype: &str, name: &str) -> Option<&'a NameUrl> {
    skins.iter().find(|skin| {
        let (skin_prototype, skin_name) = split_skin_name(&skin.name);
        skin_prototype == prototype && skin_name == name
    })
}

impl Twoday {
    /// All skins of the alias that carry a site-specific override.
    pub async fn modified_skins(&self, alias: &str) -> Result<Vec<NameUrl>> {
        self.check_logged_in()?;

        let url = format!("{}/layout/skins/modified", self.alias_domain(alias)?);
        let body = self
            .get_text(&url)
            .await
            .with_context(|| format!(r#"getModifiedSkins from "{alias}" failed"#))?;

        Ok(extract_modified_skins(&Html::parse_document(&body)))
    }

    /// Whether the skin currently has an override on the alias; carries the
    /// edit url when it does.
    pub async fn is_modified_skin(&self, alias: &str, skin_name: &str) -> Result<IsModifiedSkin> {
        let hoptype = self.is_valid_hoptype(skin_name).await?;
        let modified_skins = self.modified_skins(alias).await?;

        let found = find_modified(&modified_skins, &hoptype.prototype, &hoptype.name);

        Ok(IsModifiedSkin {
            valid: hoptype.valid,
            prototype: hoptype.prototype,
            name: hoptype.name,
            is_modified: found.is_some(),
            url: found.map(|skin| skin.url.clone()).unwrap_or_default(),
        })
    }

    /// Enriches a skin reference with its edit form fields, secret key
    /// included.
    pub async fn get_skin(&self, skin: &Skin) -> Result<SkinForm> {
        self.check_logged_in()?;

        let skin = Skin {
            name: skin.name.clone(),
            url: parser::fix_url(&skin.url),
        };
        let body = self
            .get_text(&skin.url)
            .await
            .with_context(|| format!(r#"getSkin "{}" failed"#, skin.name))?;

        Ok(extract_skin_form(&Html::parse_document(&body), &skin))
    }

    /// Resubmits a skin's edit form. Fields the form did not carry are left
    /// out; the secret key from the preceding fetch rides along.
    pub async fn post_skin(&self, skin: &SkinForm) -> Result<Response> {
        self.check_logged_in()?;

        let mut form: Vec<(&str, &str)> = Vec::new();
        for (key, value) in [
            ("secretKey", &skin.secret_key),
            ("action", &skin.action),
            ("key", &skin.key),
            ("skinset", &skin.skinset),
            ("module", &skin.module),
            ("title", &skin.title),
            ("description", &skin.description),
            ("skin", &skin.skin),
            ("save", &skin.save),
        ] {
            if let Some(value) = value {
                form.push((key, value.as_str()));
            }
        }

        self.post_form(&skin.url, &form)
            .await
            .with_context(|| format!(r#"postSkin "{}" failed"#, skin.name))
    }

    /// Creates a skin override. The skin name needs a valid hoptype; fields
    /// not given in `options` fall back to name and filler text.
    pub async fn create_skin(
        &self,
        alias: &str,
        skin_name: &str,
        options: SkinOptions,
    ) -> Result<Response> {
        let hoptype = self.is_valid_hoptype(skin_name).await?;
        ensure!(hoptype.valid, "New skin does not have a valid Hoptype!");

        let layout_url = self.layout_url(alias).await?;
        let edit = Skin {
            name: skin_name.to_string(),
            url: format!("{layout_url}/skins/edit?key={skin_name}&skinset=&action="),
        };
        let data = self.get_skin(&edit).await?;

        let form = SkinForm {
            title: Some(options.title.unwrap_or_else(|| skin_name.to_string())),
            description: Some(options.description.unwrap_or_else(|| skin_name.to_string())),
            skin: Some(options.skin.unwrap_or_else(|| NEW_SKIN_BODY.to_string())),
            ..data
        };
        let response = self
            .post_skin(&form)
            .await
            .with_context(|| format!(r#"Error while creating skin "{alias}/{skin_name}""#))?;

        self.log(format!(
            r#"Skin "{alias}/{skin_name}" successfully created (status={})."#,
            response.status()
        ));

        Ok(response)
    }

    /// Updates a modified skin, or falls through to [`create_skin`] when no
    /// override exists yet. With `options.diff` set, unchanged content makes
    /// this a no-op returning `None`.
    ///
    /// [`create_skin`]: Self::create_skin
    pub async fn update_skin(
        &self,
        alias: &str,
        skin_name: &str,
        options: SkinOptions,
    ) -> Result<Option<Response>> {
        let modified = self.is_modified_skin(alias, skin_name).await?;
        if !modified.is_modified {
            return self.create_skin(alias, skin_name, options).await.map(Some);
        }

        let old = self
            .get_skin(&Skin {
                name: skin_name.to_string(),
                url: modified.url,
            })
            .await?;

        if options.diff {
            let item = format!("{skin_name} ({alias})");
            let mut changed = false;

            for (field, new_value, old_value) in [
                ("title", &options.title, &old.title),
                ("description", &options.description, &old.description),
                ("skin", &options.skin, &old.skin),
            ] {
                if let Some(new_value) = new_value
                    && Some(new_value) != old_value.as_ref()
                {
                    let result = eval_diff(
                        &format!("{field} of {item}"),
                        old_value.as_deref().unwrap_or_default(),
                        new_value,
                    );
                    self.log(&result.text);
                    changed = true;
                }
            }

            if !changed {
                self.log(format!("Skipping update of skin {skin_name} (unchanged)."));
                return Ok(None);
            }
        }

        let form = SkinForm {
            title: options.title.or(old.title),
            description: options.description.or(old.description),
            skin: options.skin.or(old.skin),
            ..old
        };
        let response = self
            .post_skin(&form)
            .await
            .with_context(|| format!(r#"Error while updating skin "{alias}/{skin_name}""#))?;

        self.log(format!(
            r#"Skin "{alias}/{skin_name}" successfully updated (status={})."#,
            response.status()
        ));

        Ok(Some(response))
    }

    /// Removes a skin override; only a modified skin is deletable.
    pub async fn delete_skin(&self, alias: &str, skin_name: &str) -> Result<Response> {
        self.check_logged_in()?;

        let modified = self.is_modified_skin(alias, skin_name).await?;
        ensure!(modified.is_modified, "Skin is not a modified/deletable skin!");

        let layout_url = self.layout_url(alias).await?;
        let delete_url = format!(
            "{layout_url}/skins/{}/{}/delete",
            modified.prototype, modified.name
        );

        let body = self.get_text(&delete_url).await?;
        let secret = {
            let page = Html::parse_document(&body);
            page::secret_key(&page).unwrap_or_default()
        };

        let response = self
            .post_form(
                &delete_url,
                &[("secretKey", secret.as_str()), ("remove", "Löschen")],
            )
            .await
            .with_context(|| format!(r#"Error while deleting skin "{alias}/{skin_name}""#))?;

        self.log(format!(
            r#"Skin "{alias}/{skin_name}" successfully deleted (status={})."#,
            response.status()
        ));

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODIFIED_SKINS: &str = r#"
        <div class="skin">
            <a name="Site.page" href="//neon.twoday.net/layouts/rainy/skins/site/page/edit">Site.page</a>
        </div>
        <div class="skin">
            <a name="Story.display" href="//neon.twoday.net/layouts/rainy/skins/story/display/edit">Story.display</a>
        </div>"#;

    #[test]
    fn test_extract_modified_skins() {
        let page = Html::parse_document(MODIFIED_SKINS);
        let skins = extract_modified_skins(&page);

        assert_eq!(skins.len(), 2);
        assert_eq!(skins[0].name, "Site.page");
        assert_eq!(
            skins[0].url,
            "//neon.twoday.net/layouts/rainy/skins/site/page/edit"
        );
    }

    #[test]
    fn test_extract_modified_skins_empty() {
        let page = Html::parse_document("<div class='listItem'>nothing here</div>");
        assert!(extract_modified_skins(&page).is_empty());
    }

    #[test]
    fn test_find_modified() {
        let page = Html::parse_document(MODIFIED_SKINS);
        let skins = extract_modified_skins(&page);

        assert!(find_modified(&skins, "site", "page").is_some());
        assert!(find_modified(&skins, "story", "display").is_some());
        assert!(find_modified(&skins, "story", "notModified").is_none());
        // prototype matches case-insensitively, the name does not
        assert!(find_modified(&skins, "site", "Page").is_none());
    }

    #[test]
    fn test_extract_skin_form() {
        let html = r#"
            <form>
                <input type="hidden" name="secretKey" value="sk-123">
                <input type="hidden" name="action" value="save">
                <input type="hidden" name="key" value="Site.page">
                <input type="hidden" name="skinset" value="">
                <input type="hidden" name="module" value="core">
                <input type="text" name="title" value="Page">
                <input type="text" name="description" value="Main page skin">
                <textarea name="skin">&lt;p&gt;body&lt;/p&gt;</textarea>
                <input type="submit" name="save" value="Sichern">
            </form>"#;
        let skin = Skin {
            name: "Site.page".to_string(),
            url: "https://neon.twoday.net/layouts/rainy/skins/site/page/edit".to_string(),
        };
        let form = extract_skin_form(&Html::parse_document(html), &skin);

        assert_eq!(form.secret_key.as_deref(), Some("sk-123"));
        assert_eq!(form.key.as_deref(), Some("Site.page"));
        assert_eq!(form.module.as_deref(), Some("core"));
        assert_eq!(form.skin.as_deref(), Some("<p>body</p>"));
        assert_eq!(form.save.as_deref(), Some("Sichern"));
        // the empty skinset input has no value attribute content
        assert_eq!(form.skinset.as_deref(), Some(""));
    }

    #[tokio::test]
    #[ignore]
    async fn test_skin_lifecycle_remote() {
        let td = Twoday::builder("dev").silent(true).build().unwrap();
        let alias = "neonwilderness";

        td.login().await.unwrap();
        td.create_skin(alias, "Site.newskin", SkinOptions::default())
            .await
            .unwrap();

        let state = td.is_modified_skin(alias, "Site.newskin").await.unwrap();
        assert!(state.is_modified);

        td.delete_skin(alias, "Site.newskin").await.unwrap();

        let state = td.is_modified_skin(alias, "Site.newskin").await.unwrap();
        assert!(!state.is_modified);
    }
}
