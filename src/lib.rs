//! Browser-less automation client for the Twoday blog-hosting CMS.
//!
//! Authenticates with a session cookie, then drives the CMS the way the
//! browser UI would: fetch a page, pull the hidden form fields (secret key,
//! current values) out of the markup, resubmit the modified form. Every
//! remote call is paced by a configurable delay.
//!
//! ```no_run
//! use twoday::{SkinOptions, Twoday};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let td = Twoday::new("prod")?;
//! td.login().await?;
//!
//! let options = SkinOptions {
//!     title: Some("Site page".into()),
//!     ..Default::default()
//! };
//! td.update_skin("mysite", "Site.page", options).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod diff;
mod hoptype;
mod info;
mod layout;
mod members;
mod page;
mod parser;
mod resources;
mod skins;
mod stories;

pub use client::{Platform, Twoday, TwodayBuilder};
pub use diff::{DiffChunk, DiffOutcome, DiffResult, DiffTag, eval_diff};
pub use hoptype::Hoptype;
pub use info::AliasInfo;
pub use layout::{LayoutData, LayoutInfo};
pub use members::{Member, MemberRole};
pub use page::NameUrl;
pub use parser::{fix_url, nice_url};
pub use resources::{FileInfo, ImageInfo, ResType, ResizeTo, ResourceInfo};
pub use skins::{IsModifiedSkin, Skin, SkinForm, SkinOptions};
pub use stories::{StoryAction, StoryInfo, StoryList, StoryListItem};
