//! VWR / Avantor source implementation.
//!
//! CAS lookups try the Avantor catalog searches first and fall back to the legacy
//! VWR MSDS search. Product-name lookups use the VWR MSDS keyword search, whose
//! result table names the manufacturer of every sheet.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

use crate::models::{CasNumber, SdsHit};
use crate::sources::{Source, SourceCapabilities, SourceError};
use crate::utils::{absolute_url, fetch_page, HttpClient, ACCEPT_HTML};

const AVANTOR_BASE_URL: &str = "https://www.avantorsciences.com";
const VWR_BASE_URL: &str = "https://us.vwr.com";

/// VWR source
#[derive(Debug, Clone)]
pub struct VwrSource {
    client: HttpClient,
    avantor_url: String,
    vwr_url: String,
}

impl VwrSource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_urls(client, AVANTOR_BASE_URL, VWR_BASE_URL)
    }

    /// Point the source at other hosts (used by tests)
    pub fn with_base_urls(
        client: HttpClient,
        avantor_url: impl Into<String>,
        vwr_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            avantor_url: avantor_url.into().trim_end_matches('/').to_string(),
            vwr_url: vwr_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn cas_search_urls(&self, cas: &str) -> [String; 3] {
        let q = urlencoding::encode(cas);
        [
            format!("{}/us/en/certificates/search?q={}", self.avantor_url, q),
            format!("{}/us/en/search?q={}", self.avantor_url, q),
            format!("{}/store/msds?keyword={}", self.vwr_url, q),
        ]
    }
}

/// First link whose target looks like a safety document
fn parse_sds_link(base: &Url, html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").ok()?;

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| {
            let href = href.to_lowercase();
            ["sds", "msds", "safety"].iter().any(|term| href.contains(term))
        })
        .and_then(|href| absolute_url(base, href).ok())
}

/// First row of the MSDS keyword search, as `(document href, manufacturer)`.
///
/// The page must report a non-zero "N results were found" count.
fn parse_msds_results(html: &str) -> Option<(String, Option<String>)> {
    static COUNT_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let count_re = COUNT_RE
        .get_or_init(|| Regex::new(r"(\d+).*results were found").ok())
        .as_ref()?;

    let document = Html::parse_document(html);

    let count_selector = Selector::parse(".clearfix .pull-left").ok()?;
    let count_text = document
        .select(&count_selector)
        .next()?
        .text()
        .collect::<String>();
    let count: u64 = count_re.captures(&count_text)?.get(1)?.as_str().parse().ok()?;
    if count == 0 {
        return None;
    }

    let link_selector = Selector::parse(r#"td[data-title="SDS"] a"#).ok()?;
    let href = document
        .select(&link_selector)
        .next()?
        .value()
        .attr("href")?
        .trim()
        .to_string();

    let manufacturer_selector = Selector::parse(r#"td[data-title="Manufacturer"]"#).ok()?;
    let manufacturer = document
        .select(&manufacturer_selector)
        .next()
        .map(|td| td.text().collect::<String>().trim().to_string())
        .filter(|m| !m.is_empty());

    Some((href, manufacturer))
}

#[async_trait]
impl Source for VwrSource {
    fn id(&self) -> &str {
        "vwr"
    }

    fn name(&self) -> &str {
        "VWR"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::BY_CAS | SourceCapabilities::BY_NAME
    }

    async fn search_by_cas(&self, cas: &CasNumber) -> Result<Option<SdsHit>, SourceError> {
        let mut last_error = None;
        let mut answered = false;

        for url in self.cas_search_urls(cas.as_str()) {
            let page = match fetch_page(self.client.get(&url).header("Accept", ACCEPT_HTML)).await
            {
                Ok(page) => page,
                Err(e) => {
                    tracing::debug!("VWR search {} failed: {}", url, e);
                    last_error = Some(e);
                    continue;
                }
            };
            answered = true;

            if let Some(link) = parse_sds_link(&page.url, &page.body) {
                return Ok(Some(SdsHit::new(link).manufacturer("Avantor")));
            }
        }

        // a clean miss on any endpoint outranks errors on the others
        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(None),
        }
    }

    async fn search_by_name(&self, name: &str) -> Result<Option<SdsHit>, SourceError> {
        let url = format!(
            "{}/store/msds?keyword={}",
            self.vwr_url,
            urlencoding::encode(name)
        );

        let page = fetch_page(self.client.get(&url).header("Accept", ACCEPT_HTML)).await?;
        if page.redirected() {
            return Ok(None);
        }

        let Some((href, manufacturer)) = parse_msds_results(&page.body) else {
            return Ok(None);
        };

        let mut hit = SdsHit::new(absolute_url(&page.url, &href)?);
        if let Some(manufacturer) = manufacturer {
            hit = hit.manufacturer(manufacturer);
        }
        Ok(Some(hit))
    }
}
