//! ChemBlink source implementation.
//!
//! ChemBlink publishes one MSDS page per CAS number, linking the supplier sheets it
//! mirrors. Unknown CAS numbers redirect to the site's landing page.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use crate::models::{cas_token_pattern, CasNumber, SdsHit};
use crate::sources::{Source, SourceCapabilities, SourceError};
use crate::utils::{absolute_url, fetch_optional_page, HttpClient, ACCEPT_HTML};

const CHEMBLINK_BASE_URL: &str = "https://www.chemblink.com";

/// Text of the document link on an MSDS page
const DOWNLOAD_LINK_TEXT: &str = "View / download";

/// ChemBlink source
#[derive(Debug, Clone)]
pub struct ChemBlinkSource {
    client: HttpClient,
    base_url: String,
}

impl ChemBlinkSource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_url(client, CHEMBLINK_BASE_URL)
    }

    /// Point the source at another host (used by tests)
    pub fn with_base_url(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn lookup_cas(&self, cas: &str) -> Result<Option<SdsHit>, SourceError> {
        let url = format!("{}/MSDS/{}MSDS.htm", self.base_url, cas);

        let page = match fetch_optional_page(self.client.get(&url).header("Accept", ACCEPT_HTML))
            .await?
        {
            Some(page) if !page.redirected() => page,
            _ => return Ok(None),
        };

        let Some(href) = parse_download_link(&page.body) else {
            return Ok(None);
        };

        let mut hit = SdsHit::new(absolute_url(&page.url, &href)?);
        if let Some(manufacturer) = manufacturer_from_file(&href) {
            hit = hit.manufacturer(manufacturer);
        }

        Ok(Some(hit))
    }
}

/// First link labelled "View / download" on an MSDS page
fn parse_download_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").ok()?;

    document
        .select(&selector)
        .find(|a| a.text().collect::<String>().contains(DOWNLOAD_LINK_TEXT))
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
}

/// Supplier encoded in the file name, e.g. `/MSDS/MSDSFiles/64-19-7Alfa-Aesar.pdf`
fn manufacturer_from_file(href: &str) -> Option<String> {
    static FILE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = FILE_RE
        .get_or_init(|| Regex::new(r"([a-zA-Z\-]+)\.pdf").ok())
        .as_ref()?;

    let raw = re.captures(href)?.get(1)?.as_str();
    let name = raw.trim_matches('-').replace('-', " ");
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// First CAS-shaped token on a search results page
fn first_cas_token(body: &str) -> Option<String> {
    cas_token_pattern()
        .find(body)
        .map(|m| m.as_str().to_string())
}

#[async_trait]
impl Source for ChemBlinkSource {
    fn id(&self) -> &str {
        "chemblink"
    }

    fn name(&self) -> &str {
        "ChemBlink"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::BY_CAS | SourceCapabilities::BY_NAME
    }

    async fn search_by_cas(&self, cas: &CasNumber) -> Result<Option<SdsHit>, SourceError> {
        self.lookup_cas(cas.as_str()).await
    }

    /// ChemBlink has no product-name index; search the site and follow the first
    /// CAS number that appears in the results
    async fn search_by_name(&self, name: &str) -> Result<Option<SdsHit>, SourceError> {
        let url = format!(
            "{}/search.htm?q={}",
            self.base_url,
            urlencoding::encode(name)
        );

        let page = match fetch_optional_page(self.client.get(&url).header("Accept", ACCEPT_HTML))
            .await?
        {
            Some(page) if !page.redirected() => page,
            _ => return Ok(None),
        };

        match first_cas_token(&page.body) {
            Some(cas) => {
                tracing::debug!("ChemBlink search for '{}' led to CAS {}", name, cas);
                self.lookup_cas(&cas).await
            }
            None => Ok(None),
        }
    }
}
