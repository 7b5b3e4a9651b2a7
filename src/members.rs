use anyhow::{Context, Result};
use regex::Regex;
use scraper::Html;

use crate::client::Twoday;
use crate::page::{self, selector};

/// Authorization level of a membership, as printed on the memberships page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberRole {
    Owner,
    Administrator,
    Contentmanager,
    Contributor,
    Subscriber,
}

impl MemberRole {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "Owner" => Some(Self::Owner),
            "Administrator" => Some(Self::Administrator),
            "Contentmanager" => Some(Self::Contentmanager),
            "Contributor" => Some(Self::Contributor),
            "Subscriber" => Some(Self::Subscriber),
            _ => None,
        }
    }

    /// Roles allowed to manage skins, files and layouts.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Owner | Self::Administrator)
    }
}

/// One row of the logged-in user's membership listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub alias: String,
    pub role: MemberRole,
    pub url: String,
}

pub(crate) fn extract_members(page: &Html) -> Vec<Member> {
    let row = selector::from(".listItem");
    let left = selector::from(".listItemLeft");
    let anchor = selector::from(".listItemRight a");
    let status = Regex::new(r"Status: (\S+)").unwrap();
    let alias = Regex::new(r"//(.*?)\.twoday\.").unwrap();

    page.select(&row)
        .filter_map(|item| {
            let status_text = item.select(&left).next().map(page::text_of)?;
            let role = MemberRole::parse(status.captures(&status_text)?.get(1)?.as_str())?;

            let url = item
                .select(&anchor)
                .next()
                .and_then(|a| a.value().attr("href"))?
                .to_string();
            let alias = alias.captures(&url)?.get(1)?.as_str().to_string();

            Some(Member { alias, role, url })
        })
        .collect()
}

pub(crate) fn extract_user_names(page: &Html) -> Vec<String> {
    let anchor = selector::from(".listItem a");

    page.select(&anchor)
        .map(|a| page::text_of(a).trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

impl Twoday {
    /// Aliases where the logged-in user is owner or administrator.
    pub async fn memberships(&self) -> Result<Vec<String>> {
        Ok(self
            .members()
            .await?
            .into_iter()
            .filter(|member| member.role.is_admin())
            .map(|member| member.alias)
            .collect())
    }

    /// All memberships of the logged-in user with their roles.
    pub async fn members(&self) -> Result<Vec<Member>> {
        self.check_logged_in()?;

        let url = format!("{}/members/memberships", self.base_url);
        let body = self
            .get_text(&url)
            .await
            .context("getMemberships failed")?;

        Ok(extract_members(&Html::parse_document(&body)))
    }

    /// User names matching a substring, via the system-manager search.
    /// Needs a privileged account; the server grants those an addon cookie
    /// on login.
    pub async fn sysmgr_users(&self, name_part: &str) -> Result<Vec<String>> {
        self.check_logged_in()?;

        let url = format!("{}/sysmgr/users?q={name_part}", self.base_url);
        let body = self
            .get_text(&url)
            .await
            .with_context(|| format!(r#"getSysMgrUsers "{name_part}" failed"#))?;

        Ok(extract_user_names(&Html::parse_document(&body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEMBERSHIPS_PAGE: &str = r#"
        <div class="listItem">
            <div class="listItemLeft">Status: Owner seit 24.10.2006</div>
            <div class="listItemRight">
                <a href="//neonwilderness.twoday.net/">neonwilderness</a>
            </div>
        </div>
        <div class="listItem">
            <div class="listItemLeft">Status: Administrator seit 07.11.2008</div>
            <div class="listItemRight">
                <a href="//foundation.twoday.net/">foundation</a>
            </div>
        </div>
        <div class="listItem">
            <div class="listItemLeft">Status: Subscriber seit 01.01.2019</div>
            <div class="listItemRight">
                <a href="//somewhere.twoday.net/">somewhere</a>
            </div>
        </div>"#;

    #[test]
    fn test_extract_members() {
        let members = extract_members(&Html::parse_document(MEMBERSHIPS_PAGE));

        assert_eq!(members.len(), 3);
        assert_eq!(members[0].alias, "neonwilderness");
        assert_eq!(members[0].role, MemberRole::Owner);
        assert_eq!(members[1].role, MemberRole::Administrator);
        assert_eq!(members[2].role, MemberRole::Subscriber);
    }

    #[test]
    fn test_admin_filter() {
        let members = extract_members(&Html::parse_document(MEMBERSHIPS_PAGE));
        let admins = members
            .iter()
            .filter(|m| m.role.is_admin())
            .map(|m| m.alias.as_str())
            .collect::<Vec<_>>();

        assert_eq!(admins, vec!["neonwilderness", "foundation"]);
    }

    #[test]
    fn test_extract_user_names() {
        let html = r#"
            <div class="listItem"><a href="/members/neon">neon</a></div>
            <div class="listItem"><a href="/members/neonwilderness">neonwilderness</a></div>"#;
        let names = extract_user_names(&Html::parse_document(html));

        assert_eq!(names, vec!["neon", "neonwilderness"]);
    }
}
