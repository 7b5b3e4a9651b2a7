use anyhow::{Context, Result, ensure};
use regex::Regex;
use reqwest::Response;
use scraper::Html;

use crate::client::Twoday;
use crate::page::{self, NameUrl, selector};
use crate::parser;

/// Target state declared by the caller; the server is trusted to apply it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoryAction {
    /// Keep (or put) the story in draft state.
    #[default]
    Save,
    Publish,
}

impl StoryAction {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Publish => "publish",
        }
    }
}

/// Story fields for create/update. `title` must not be empty; the nice url
/// is derived from it when not given explicitly.
#[derive(Clone, Debug, Default)]
pub struct StoryInfo {
    pub title: String,
    pub body: Option<String>,
    /// Numeric story id; updates fall back to the nice url without it.
    pub id: Option<String>,
    pub niceurl: Option<String>,
    pub topic: Option<String>,
    /// Publish timestamp handed through as `createtime`.
    pub publish: Option<String>,
    pub action: StoryAction,
}

impl StoryInfo {
    fn resolved_niceurl(&self) -> Result<String> {
        ensure!(!self.title.is_empty(), "Story title must not be empty!");
        Ok(parser::nice_url(self.niceurl.as_deref().unwrap_or(&self.title)))
    }
}

/// One row of the story admin listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoryListItem {
    pub id: String,
    pub create_date: String,
    pub title: String,
}

/// A page range of the story listing plus the summary total.
#[derive(Clone, Debug)]
pub struct StoryList {
    pub from_page: usize,
    pub to_page: usize,
    pub max_page: usize,
    pub total: usize,
    pub stories: Vec<StoryListItem>,
}

/// Current field values scraped off a story's edit form; whatever the
/// caller leaves out is resubmitted unchanged.
#[derive(Debug, Default)]
struct StoryParams {
    secret_key: Option<String>,
    content_text: Option<String>,
    add_to_front: Option<String>,
    add_to_topic: Option<String>,
    editableby: Option<String>,
    discussions: Option<String>,
    createtime: Option<String>,
}

fn extract_story_params(page: &Html) -> StoryParams {
    StoryParams {
        secret_key: page::secret_key(page),
        content_text: page::field_value(page, "content_text"),
        add_to_front: page::field_value(page, "addToFront"),
        add_to_topic: page::field_value(page, "addToTopic"),
        editableby: page::field_value(page, "editableby"),
        discussions: page::field_value(page, "discussions"),
        createtime: page::field_value(page, "createtime"),
    }
}

pub(crate) fn extract_story_rows(page: &Html) -> Vec<StoryListItem> {
    let row = selector::from(".listItem");
    let anchor = selector::from(r#"a[href*="/stories/"]"#);
    let date = Regex::new(r"\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}").unwrap();

    page.select(&row)
        .filter_map(|item| {
            let link = item.select(&anchor).next()?;
            let id = parser::segment_after(link.value().attr("href")?, "stories")?.to_string();
            let title = page::text_of(link).trim().to_string();
            let create_date = date
                .find(&page::text_of(item))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();

            Some(StoryListItem {
                id,
                create_date,
                title,
            })
        })
        .collect()
}

pub(crate) fn extract_topics(page: &Html) -> Vec<NameUrl> {
    let anchor = selector::from(".listItem td > a");

    page.select(&anchor)
        .filter_map(|a| {
            Some(NameUrl {
                name: page::text_of(a),
                url: a.value().attr("href")?.to_string(),
            })
        })
        .collect()
}

impl Twoday {
    /// Creates a story in the declared draft/publish state.
    pub async fn create_story(&self, alias: &str, story: &StoryInfo) -> Result<Response> {
        let niceurl = story.resolved_niceurl()?;

        let create_url = format!("{}/stories/create", self.alias_domain(alias)?);
        let secret = self.fetch_secret_key(&create_url).await?;

        let form = [
            ("secretKey", secret.as_str()),
            ("content_title", story.title.as_str()),
            ("modNiceUrls_urlid", niceurl.as_str()),
            ("content_text", story.body.as_deref().unwrap_or_default()),
            ("addToFront", "1"),
            ("checkbox_addToFront", "addToFront"),
            ("addToTopic", ""),
            ("topic", story.topic.as_deref().unwrap_or_default()),
            ("editableby", "0"),
            ("discussions", "1"),
            ("checkbox_discussions", "discussions"),
            ("createtime", story.publish.as_deref().unwrap_or_default()),
            (story.action.as_str(), "true"),
        ];
        let response = self
            .post_form(&create_url, &form)
            .await
            .with_context(|| format!(r#"Error while creating story "{alias}/{niceurl}""#))?;

        self.log(format!(
            r#"Story "{alias}/{niceurl}" successfully created (status={})."#,
            response.status()
        ));

        Ok(response)
    }

    /// Updates a story addressed by id or nice url, keeping whatever fields
    /// the caller left out at their current values.
    pub async fn update_story(&self, alias: &str, story: &StoryInfo) -> Result<Response> {
        let niceurl = story.resolved_niceurl()?;
        let story_id = story.id.clone().unwrap_or_else(|| niceurl.clone());

        let edit_url = format!("{}/stories/{story_id}/edit", self.alias_domain(alias)?);
        let body = self.get_text(&edit_url).await?;
        let params = extract_story_params(&Html::parse_document(&body));

        let form = [
            ("secretKey", params.secret_key.as_deref().unwrap_or_default()),
            ("content_title", story.title.as_str()),
            ("modNiceUrls_urlid", niceurl.as_str()),
            (
                "content_text",
                story
                    .body
                    .as_deref()
                    .or(params.content_text.as_deref())
                    .unwrap_or_default(),
            ),
            (
                "addToFront",
                params.add_to_front.as_deref().unwrap_or_default(),
            ),
            ("checkbox_addToFront", "addToFront"),
            (
                "addToTopic",
                params.add_to_topic.as_deref().unwrap_or_default(),
            ),
            ("topic", story.topic.as_deref().unwrap_or_default()),
            (
                "editableby",
                params.editableby.as_deref().unwrap_or_default(),
            ),
            (
                "discussions",
                params.discussions.as_deref().unwrap_or_default(),
            ),
            ("checkbox_discussions", "discussions"),
            (
                "createtime",
                story
                    .publish
                    .as_deref()
                    .or(params.createtime.as_deref())
                    .unwrap_or_default(),
            ),
            (story.action.as_str(), "true"),
        ];
        let response = self
            .post_form(&edit_url, &form)
            .await
            .with_context(|| format!(r#"Error while updating story "{alias}/{story_id}""#))?;

        self.log(format!(
            r#"Story "{alias}/{story_id}" successfully updated (status={})."#,
            response.status()
        ));

        Ok(response)
    }

    /// Existence check; network failure and absence both read as `false`.
    pub async fn has_story(&self, alias: &str, id: &str) -> bool {
        let Ok(domain) = self.alias_domain(alias) else {
            return false;
        };
        self.get(&format!("{domain}/stories/{id}")).await.is_ok()
    }

    /// Raw page body of one story.
    pub async fn get_story(&self, alias: &str, id: &str) -> Result<String> {
        let url = format!("{}/stories/{id}", self.alias_domain(alias)?);
        self.get_text(&url)
            .await
            .with_context(|| format!(r#"Error while reading story "{alias}/{id}""#))
    }

    /// Walks the admin story listing from `from_page` up to `to_page`
    /// (both clamped to what the summary reports). Defaults cover the whole
    /// listing.
    pub async fn list_stories(
        &self,
        alias: &str,
        from_page: Option<usize>,
        to_page: Option<usize>,
    ) -> Result<StoryList> {
        self.check_logged_in()?;

        let list_url = format!("{}/stories?page=", self.alias_domain(alias)?);
        let from_page = from_page.unwrap_or(0);

        let body = self.get_text(&format!("{list_url}{from_page}")).await?;
        let (mut stories, max_page, total) = {
            let page = Html::parse_document(&body);
            (
                extract_story_rows(&page),
                page::page_count(&page),
                page::summary_total(&page),
            )
        };

        let to_page = to_page.unwrap_or(max_page).min(max_page);
        for n in (from_page + 1)..=to_page {
            let body = self.get_text(&format!("{list_url}{n}")).await?;
            stories.extend(extract_story_rows(&Html::parse_document(&body)));
        }

        Ok(StoryList {
            from_page,
            to_page,
            max_page,
            total: total.unwrap_or(stories.len()),
            stories,
        })
    }

    /// All story topics of the alias as name/url pairs.
    pub async fn story_topics(&self, alias: &str) -> Result<Vec<NameUrl>> {
        let url = format!("{}/topics", self.alias_domain(alias)?);
        let body = self
            .get_text(&url)
            .await
            .with_context(|| format!(r#"Error while reading story topics of "{alias}""#))?;

        Ok(extract_topics(&Html::parse_document(&body)))
    }
}
