use std::collections::HashMap;
use std::env;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail, ensure};
use cookie_store::CookieStore;
use futures::future;
use reqwest::{Client, Response, Url, multipart};
use reqwest_cookie_store::CookieStoreMutex;
use scraper::Html;
use serde::Serialize;
use tokio::time::sleep;

use crate::layout::LayoutData;
use crate::page;
use crate::resources::ResType;

/// The two remote environments the CMS is hosted on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Platform {
    Dev,
    #[default]
    Prod,
}

impl Platform {
    fn parse(tag: &str) -> Result<Self> {
        match tag.to_lowercase().as_str() {
            "dev" => Ok(Self::Dev),
            "prod" => Ok(Self::Prod),
            _ => bail!(r#"Unknown platform code: "{tag}". Must be "dev" or "prod"!"#),
        }
    }

    /// Top-level domain the platform lives under.
    pub fn tld(&self) -> &'static str {
        match self {
            Self::Dev => "xyz",
            Self::Prod => "net",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dev => write!(f, "dev"),
            Self::Prod => write!(f, "prod"),
        }
    }
}

#[derive(Debug)]
pub struct TwodayBuilder {
    platform: String,
    delay: u64,
    agreed_version: String,
    silent: bool,
}

impl TwodayBuilder {
    /// Milliseconds every remote call is padded to, 20 by default.
    pub fn delay(mut self, millis: u64) -> Self {
        self.delay = millis;
        self
    }

    /// Version tag of the consent cookie seeded at construction.
    pub fn agreed_version(mut self, version: &str) -> Self {
        self.agreed_version = version.to_string();
        self
    }

    /// Suppresses progress messages on stdout.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn build(self) -> Result<Twoday> {
        let platform = Platform::parse(&self.platform)?;
        let full_domain = format!("twoday.{}", platform.tld());
        let base_url = format!("https://{full_domain}");

        // The consent cookie has to be in the jar before the first request,
        // scoped to the wildcard parent domain and cross-site eligible.
        let mut store = CookieStore::default();
        let agreed = format!(
            "agreed={}; Domain=.{full_domain}; Path=/; SameSite=None; Secure",
            self.agreed_version
        );
        let url = Url::parse(&base_url)?;
        store
            .parse(&agreed, &url)
            .map_err(|err| anyhow!("unable to seed consent cookie: {err}"))?;

        let jar = Arc::new(CookieStoreMutex::new(store));
        let client = Client::builder()
            .user_agent(Twoday::USER_AGENT)
            .cookie_provider(jar.clone())
            .build()?;

        let td = Twoday {
            platform,
            full_domain,
            base_url,
            delay: Duration::from_millis(self.delay),
            silent: self.silent,
            client,
            jar,
            layouts: Mutex::new(HashMap::new()),
            hoptypes: Mutex::new(None),
        };
        td.log(format!(
            "Twoday v{} on {}.",
            env!("CARGO_PKG_VERSION"),
            td.platform
        ));

        Ok(td)
    }
}

/// Client for one CMS environment.
///
/// Owns the session cookie jar and paces every outbound request. Operations
/// are meant to be invoked sequentially on one instance; for parallel work
/// run independent instances, each with its own session.
pub struct Twoday {
    pub(crate) platform: Platform,
    pub(crate) full_domain: String,
    pub(crate) base_url: String,
    delay: Duration,
    silent: bool,
    client: Client,
    jar: Arc<CookieStoreMutex>,
    pub(crate) layouts: Mutex<HashMap<String, LayoutData>>,
    pub(crate) hoptypes: Mutex<Option<Vec<String>>>,
}

impl Twoday {
    const USER_AGENT: &'static str =
        concat!("twoday/", env!("CARGO_PKG_VERSION"), " (+https://twoday.net)");
    const DEFAULT_DELAY_MS: u64 = 20;
    const DEFAULT_AGREED_VERSION: &'static str = "20190210a";

    /// Client with default options: 20 ms delay, current consent version,
    /// progress messages on.
    pub fn new(platform: &str) -> Result<Self> {
        Self::builder(platform).build()
    }

    pub fn builder(platform: &str) -> TwodayBuilder {
        TwodayBuilder {
            platform: platform.to_string(),
            delay: Self::DEFAULT_DELAY_MS,
            agreed_version: Self::DEFAULT_AGREED_VERSION.to_string(),
            silent: false,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn full_domain(&self) -> &str {
        &self.full_domain
    }

    /// The session's cookie jar, e.g. for persisting a login across runs.
    pub fn cookie_store(&self) -> Arc<CookieStoreMutex> {
        self.jar.clone()
    }

    /// Base url of the sub-site identified by `alias`.
    pub fn alias_domain(&self, alias: &str) -> Result<String> {
        ensure!(!alias.is_empty(), "Alias must not be empty!");
        Ok(format!("https://{alias}.{}", self.full_domain))
    }

    /// Url of the static file host serving a resource collection.
    pub fn static_url(&self, alias: &str, res_type: ResType) -> Result<String> {
        ensure!(!alias.is_empty(), "Alias must not be empty!");
        Ok(format!(
            "https://static.{}/{alias}/{}/",
            self.full_domain,
            res_type.path()
        ))
    }

    /// Fails with "Must login before!" unless the session cookie marking a
    /// completed login round-trip is in the jar. Deliberately an error and
    /// not a boolean: acting without a session is a caller bug.
    pub fn check_logged_in(&self) -> Result<()> {
        let store = self.jar.lock().expect("cookie store poisoned");
        let logged_in = store
            .iter_any()
            .any(|c| c.name() == "avLoggedIn" && c.value() == "1");
        ensure!(logged_in, "Must login before!");
        Ok(())
    }

    /// Logs in with the credentials from `TWODAY_USER`/`TWODAY_PASSWORD`
    /// (a `.env` file is honored). Scrapes the login form's secret key,
    /// then submits it together with the credentials.
    pub async fn login(&self) -> Result<Response> {
        dotenvy::dotenv().ok();
        let (user, password) = match (env::var("TWODAY_USER"), env::var("TWODAY_PASSWORD")) {
            (Ok(user), Ok(password)) => (user, password),
            _ => bail!("Missing Twoday credentials in TWODAY_USER/TWODAY_PASSWORD"),
        };

        let login_url = format!("{}/members/login", self.base_url);
        let body = self.get_text(&login_url).await?;
        let secret = {
            let page = Html::parse_document(&body);
            page::secret_key(&page).unwrap_or_default()
        };

        let form = [
            ("secretKey", secret.as_str()),
            ("popup", ""),
            ("step", ""),
            ("isuser", "1"),
            ("name", user.as_str()),
            ("password", password.as_str()),
            ("remember", "1"),
            ("login", "Anmelden"),
        ];
        let response = self
            .post_form(&login_url, &form)
            .await
            .with_context(|| format!("{} login failed", self.full_domain))?;

        self.log(format!(
            "Login to {} successful (status={}).",
            self.full_domain,
            response.status()
        ));

        Ok(response)
    }

    pub async fn logout(&self) -> Result<Response> {
        let response = self
            .get(&format!("{}/members/logout", self.base_url))
            .await?;

        self.log(format!(
            "Logout from {} done (status={}).",
            self.full_domain,
            response.status()
        ));

        Ok(response)
    }

    /// Runs a request jointly with the pacing timer, so one remote call
    /// never completes faster than the configured delay while latency and
    /// delay overlap instead of stacking.
    pub(crate) async fn paced<T>(&self, fut: impl Future<Output = T>) -> T {
        let (result, ()) = future::join(fut, sleep(self.delay)).await;
        result
    }

    pub(crate) async fn get(&self, url: &str) -> Result<Response> {
        let response = self.paced(self.client.get(url).send()).await?;
        Ok(response.error_for_status()?)
    }

    pub(crate) async fn get_text(&self, url: &str) -> Result<String> {
        Ok(self.get(url).await?.text().await?)
    }

    pub(crate) async fn post_form<T>(&self, url: &str, form: &T) -> Result<Response>
    where
        T: Serialize + ?Sized,
    {
        let response = self.paced(self.client.post(url).form(form).send()).await?;
        Ok(response.error_for_status()?)
    }

    pub(crate) async fn post_multipart(&self, url: &str, form: multipart::Form) -> Result<Response> {
        let response = self
            .paced(self.client.post(url).multipart(form).send())
            .await?;
        Ok(response.error_for_status()?)
    }

    pub(crate) fn log(&self, msg: impl fmt::Display) {
        if !self.silent {
            println!("{msg}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_platform_mapping() {
        let td = Twoday::builder("prod").silent(true).build().unwrap();
        assert_eq!(td.platform(), Platform::Prod);
        assert_eq!(td.full_domain(), "twoday.net");
        assert_eq!(td.base_url(), "https://twoday.net");

        let td = Twoday::builder("dev").silent(true).build().unwrap();
        assert_eq!(td.platform(), Platform::Dev);
        assert_eq!(td.full_domain(), "twoday.xyz");
        assert_eq!(td.base_url(), "https://twoday.xyz");
    }

    #[test]
    fn test_platform_case_insensitive() {
        let td = Twoday::builder("PROD").silent(true).build().unwrap();
        assert_eq!(td.platform(), Platform::Prod);
    }

    #[test]
    fn test_unknown_platform_fails() {
        assert!(Twoday::new("xxx").is_err());
        assert!(Twoday::new("").is_err());
    }

    #[test]
    fn test_consent_cookie_seeded() {
        let td = Twoday::builder("dev")
            .agreed_version("20210517b")
            .silent(true)
            .build()
            .unwrap();

        let jar = td.cookie_store();
        let store = jar.lock().unwrap();
        let agreed = store
            .iter_any()
            .find(|c| c.name() == "agreed")
            .expect("consent cookie missing");

        assert_eq!(agreed.value(), "20210517b");
        assert_eq!(agreed.secure(), Some(true));
        assert_eq!(
            agreed.domain().map(|d| d.trim_start_matches('.')),
            Some("twoday.xyz")
        );
    }

    #[test]
    fn test_check_logged_in_before_login() {
        let td = Twoday::builder("dev").silent(true).build().unwrap();
        let err = td.check_logged_in().unwrap_err();
        assert_eq!(err.to_string(), "Must login before!");
    }

    #[test]
    fn test_alias_domain() {
        let td = Twoday::builder("prod").silent(true).build().unwrap();
        assert_eq!(
            td.alias_domain("neonwilderness").unwrap(),
            "https://neonwilderness.twoday.net"
        );
        assert!(td.alias_domain("").is_err());

        let td = Twoday::builder("dev").silent(true).build().unwrap();
        assert_eq!(
            td.alias_domain("info").unwrap(),
            "https://info.twoday.xyz"
        );
    }

    #[test]
    fn test_static_url() {
        let td = Twoday::builder("prod").silent(true).build().unwrap();
        assert_eq!(
            td.static_url("cdn", ResType::Files).unwrap(),
            "https://static.twoday.net/cdn/files/"
        );
        assert_eq!(
            td.static_url("cdn", ResType::Images).unwrap(),
            "https://static.twoday.net/cdn/images/"
        );
    }

    #[tokio::test]
    async fn test_pacing_lower_bound() {
        let td = Twoday::builder("dev").delay(50).silent(true).build().unwrap();

        let start = Instant::now();
        td.paced(async {}).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
