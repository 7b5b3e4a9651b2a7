use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use regex::Regex;
use reqwest::{Response, multipart};
use scraper::Html;
use tokio::fs;

use crate::client::Twoday;
use crate::page::{self, selector};
use crate::parser;

/// The two static resource collections an alias carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResType {
    Files,
    Images,
}

impl ResType {
    pub(crate) fn path(&self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Images => "images",
        }
    }
}

/// One row of a files/images listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceInfo {
    pub name: String,
    pub mime: String,
    pub url: String,
}

/// A file upload: resource name, local source and description.
#[derive(Clone, Debug)]
pub struct FileInfo {
    pub name: String,
    pub path: PathBuf,
    pub description: String,
}

/// Server-side resize policy for image uploads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizeTo {
    #[default]
    Max,
    Crop,
    Scale,
    Exact,
    No,
}

impl ResizeTo {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Crop => "crop",
            Self::Scale => "scale",
            Self::Exact => "exact",
            Self::No => "no",
        }
    }
}

/// An image upload. Either a local `path` or a remote `url` must be given;
/// everything else is optional metadata.
#[derive(Clone, Debug, Default)]
pub struct ImageInfo {
    pub alias: Option<String>,
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub alttext: Option<String>,
    pub topic: Option<String>,
    pub resizeto: Option<ResizeTo>,
    pub width: Option<String>,
    pub height: Option<String>,
}

pub(crate) fn extract_resources(page: &Html) -> Vec<ResourceInfo> {
    let row = selector::from(".listItem");
    let name = selector::from("b");
    let anchor = selector::from("a[href]");
    let mime = Regex::new(r"\(([\w.+-]+/[\w.+-]+)\)").unwrap();

    page.select(&row)
        .filter_map(|item| {
            let name = item.select(&name).next().map(page::text_of)?;
            let url = item
                .select(&anchor)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(parser::fix_url)?;
            let mime = mime
                .captures(&page::text_of(item))
                .map(|cap| cap[1].to_string())
                .unwrap_or_default();

            Some(ResourceInfo { name, mime, url })
        })
        .collect()
}

fn file_part(path: &Path, bytes: Vec<u8>) -> multipart::Part {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.bin".to_string());

    multipart::Part::bytes(bytes).file_name(filename)
}

impl Twoday {
    /// All resources of one collection, every listing page walked in order.
    pub async fn list_items(&self, alias: &str, res_type: ResType) -> Result<Vec<ResourceInfo>> {
        self.check_logged_in()?;

        let url = format!("{}/{}/?page=", self.alias_domain(alias)?, res_type.path());
        self.list_pages(&url, extract_resources)
            .await
            .with_context(|| {
                format!(
                    r#"Error while getting the {} list of "{alias}""#,
                    res_type.path()
                )
            })
    }

    pub async fn list_files(&self, alias: &str) -> Result<Vec<ResourceInfo>> {
        self.list_items(alias, ResType::Files).await
    }

    pub async fn list_images(&self, alias: &str) -> Result<Vec<ResourceInfo>> {
        self.list_items(alias, ResType::Images).await
    }

    /// Existence check by fetching the resource page. A network or parse
    /// failure is indistinguishable from absence here; both come back as
    /// `false`.
    pub async fn has_file(&self, alias: &str, file_name: &str) -> bool {
        self.has_resource(alias, ResType::Files, file_name).await
    }

    /// Same contract as [`has_file`](Self::has_file).
    pub async fn has_image(&self, alias: &str, image_name: &str) -> bool {
        self.has_resource(alias, ResType::Images, image_name).await
    }

    async fn has_resource(&self, alias: &str, res_type: ResType, name: &str) -> bool {
        if self.check_logged_in().is_err() {
            return false;
        }
        let Ok(domain) = self.alias_domain(alias) else {
            return false;
        };

        let url = format!("{domain}/{}/{name}", res_type.path());
        self.get(&url).await.is_ok()
    }

    /// Uploads a file: scrape the create form's secret key, then multipart
    /// POST the content and metadata.
    pub async fn create_file(&self, alias: &str, file: &FileInfo) -> Result<Response> {
        self.check_logged_in()?;

        let create_url = format!("{}/files/create", self.alias_domain(alias)?);
        let secret = self.fetch_secret_key(&create_url).await?;

        let bytes = fs::read(&file.path)
            .await
            .with_context(|| format!("Unable to read {}", file.path.display()))?;

        let form = multipart::Form::new()
            .text("secretKey", secret)
            .part("rawfile", file_part(&file.path, bytes))
            .text("alias", file.name.clone())
            .text("description", file.description.clone())
            .text("save", "Sichern");

        let response = self
            .post_multipart(&create_url, form)
            .await
            .with_context(|| format!(r#"Error while creating file "{alias}/{}""#, file.name))?;

        self.log(format!(
            r#"File "{alias}/{}" successfully created (status={})."#,
            file.name,
            response.status()
        ));

        Ok(response)
    }

    /// Uploads an image from a local path or a remote url, with the resize
    /// policy and metadata the create form accepts.
    pub async fn create_image(&self, alias: &str, image: &ImageInfo) -> Result<Response> {
        self.check_logged_in()?;
        ensure!(
            image.path.is_some() || image.url.is_some(),
            "Image must have a path or an url!"
        );

        let create_url = format!("{}/images/create", self.alias_domain(alias)?);
        let secret = self.fetch_secret_key(&create_url).await?;

        let mut form = multipart::Form::new().text("secretKey", secret);

        if let Some(path) = &image.path {
            let bytes = fs::read(path)
                .await
                .with_context(|| format!("Unable to read {}", path.display()))?;
            form = form.part("rawimage", file_part(path, bytes));
        }
        for (key, value) in [
            ("url", &image.url),
            ("alias", &image.alias),
            ("alttext", &image.alttext),
            ("topic", &image.topic),
            ("width", &image.width),
            ("height", &image.height),
        ] {
            if let Some(value) = value {
                form = form.text(key, value.clone());
            }
        }
        if let Some(topic) = &image.topic
            && !topic.is_empty()
        {
            form = form.text("addToTopic", topic.clone());
        }
        form = form
            .text("resizeto", image.resizeto.unwrap_or_default().as_str())
            .text("save", "Sichern");

        let name = image.alias.as_deref().unwrap_or_default();
        let response = self
            .post_multipart(&create_url, form)
            .await
            .with_context(|| format!(r#"Error while creating image "{alias}/{name}""#))?;

        self.log(format!(
            r#"Image "{alias}/{name}" successfully created (status={})."#,
            response.status()
        ));

        Ok(response)
    }

    pub async fn delete_file(&self, alias: &str, file_name: &str) -> Result<Response> {
        self.delete_resource(alias, ResType::Files, file_name).await
    }

    pub async fn delete_image(&self, alias: &str, image_name: &str) -> Result<Response> {
        self.delete_resource(alias, ResType::Images, image_name)
            .await
    }

    async fn delete_resource(
        &self,
        alias: &str,
        res_type: ResType,
        name: &str,
    ) -> Result<Response> {
        self.check_logged_in()?;

        let delete_url = format!(
            "{}/{}/{name}/delete",
            self.alias_domain(alias)?,
            res_type.path()
        );
        let secret = self.fetch_secret_key(&delete_url).await?;

        let response = self
            .post_form(
                &delete_url,
                &[("secretKey", secret.as_str()), ("remove", "Löschen")],
            )
            .await
            .with_context(|| {
                format!(
                    r#"Error while deleting {} "{alias}/{name}""#,
                    res_type.path()
                )
            })?;

        self.log(format!(
            r#"{} "{alias}/{name}" successfully deleted (status={})."#,
            match res_type {
                ResType::Files => "File",
                ResType::Images => "Image",
            },
            response.status()
        ));

        Ok(response)
    }

    /// Replaces a file: delete the old entry when it exists, then create.
    /// No rollback; a failed create leaves the file deleted.
    pub async fn update_file(&self, alias: &str, file: &FileInfo) -> Result<Response> {
        if self.has_file(alias, &file.name).await {
            self.delete_file(alias, &file.name).await?;
        }
        self.create_file(alias, file).await
    }

    /// Same delete-then-create shorthand as [`update_file`](Self::update_file).
    pub async fn update_image(&self, alias: &str, image: &ImageInfo) -> Result<Response> {
        if let Some(name) = &image.alias {
            if self.has_image(alias, name).await {
                self.delete_image(alias, name).await?;
            }
        }
        self.create_image(alias, image).await
    }

    /// Downloads every listed file into `dir`, one paced fetch per file.
    pub async fn download_files(&self, alias: &str, dir: &Path) -> Result<usize> {
        self.download_resources(alias, ResType::Files, dir).await
    }

    pub async fn download_images(&self, alias: &str, dir: &Path) -> Result<usize> {
        self.download_resources(alias, ResType::Images, dir).await
    }

    async fn download_resources(
        &self,
        alias: &str,
        res_type: ResType,
        dir: &Path,
    ) -> Result<usize> {
        let items = self.list_items(alias, res_type).await?;

        if !dir.exists() {
            fs::create_dir_all(dir).await?;
        }

        for item in &items {
            let bytes = self.get(&item.url).await?.bytes().await?;
            fs::write(dir.join(&item.name), &bytes).await?;
        }

        self.log(format!(
            r#"Downloaded {} {} of "{alias}" to {}."#,
            items.len(),
            res_type.path(),
            dir.display()
        ));

        Ok(items.len())
    }

    /// GET a form page just for its secret key.
    pub(crate) async fn fetch_secret_key(&self, url: &str) -> Result<String> {
        let body = self.get_text(url).await?;
        let page = Html::parse_document(&body);

        Ok(page::secret_key(&page).unwrap_or_default())
    }
}
