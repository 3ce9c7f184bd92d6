//! Fluorochem source implementation.
//!
//! CAS lookups scrape the Fluorochem site search. Product names go through the
//! molecule discovery API, whose SDS links are relative to the document host.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::models::{CasNumber, SdsHit};
use crate::sources::{Source, SourceCapabilities, SourceError};
use crate::utils::{absolute_url, fetch_json, fetch_page, HttpClient, ACCEPT_HTML};

const FLUOROCHEM_SITE_URL: &str = "https://fluorochem.co.uk";
const FLUOROCHEM_API_URL: &str = "https://dougdiscovery.com";
const FLUOROCHEM_DOCUMENT_HOST: &str = "https://7128445.app.netsuite.com";

/// Results requested from the discovery API
const API_PAGE_SIZE: u32 = 12;

/// Fluorochem source
#[derive(Debug, Clone)]
pub struct FluorochemSource {
    client: HttpClient,
    site_url: String,
    api_url: String,
    document_host: String,
}

#[derive(Debug, Serialize)]
struct MoleculeQuery<'a> {
    q: &'a str,
    offset: u32,
    limit: u32,
}

#[derive(Debug, Default, Deserialize)]
struct MoleculeResults {
    #[serde(default)]
    data: Vec<MoleculeItem>,
}

#[derive(Debug, Default, Deserialize)]
struct MoleculeItem {
    #[serde(default)]
    molecule: Molecule,
}

#[derive(Debug, Default, Deserialize)]
struct Molecule {
    #[serde(default)]
    name: String,
    #[serde(default)]
    sds: Option<MoleculeSds>,
}

#[derive(Debug, Default, Deserialize)]
struct MoleculeSds {
    #[serde(default)]
    custrecord_sdslink_en: Option<String>,
}

impl FluorochemSource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_urls(
            client,
            FLUOROCHEM_SITE_URL,
            FLUOROCHEM_API_URL,
            FLUOROCHEM_DOCUMENT_HOST,
        )
    }

    /// Point the source at other hosts (used by tests)
    pub fn with_base_urls(
        client: HttpClient,
        site_url: impl Into<String>,
        api_url: impl Into<String>,
        document_host: impl Into<String>,
    ) -> Self {
        let trim = |s: String| s.trim_end_matches('/').to_string();
        Self {
            client,
            site_url: trim(site_url.into()),
            api_url: trim(api_url.into()),
            document_host: trim(document_host.into()),
        }
    }

    fn cas_search_urls(&self, cas: &str) -> [String; 3] {
        let q = urlencoding::encode(cas);
        [
            format!("{}/?s={}", self.site_url, q),
            format!("{}/Products/Search?q={}", self.site_url, q),
            format!("{}/shop/?s={}", self.site_url, q),
        ]
    }
}

/// First link that points at, or is labelled as, a safety data sheet
fn parse_sds_link(base: &Url, html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").ok()?;

    document
        .select(&selector)
        .find(|a| {
            let href = a.value().attr("href").unwrap_or_default().to_lowercase();
            let text = a.text().collect::<String>().trim().to_lowercase();
            ["sds", "msds", "safety"].iter().any(|t| href.contains(t))
                || ["sds", "msds", "safety data sheet"].iter().any(|t| text.contains(t))
        })
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| absolute_url(base, href).ok())
}

/// SDS path of the first molecule whose name contains the query or is contained in it
fn pick_molecule(results: MoleculeResults, name: &str) -> Option<String> {
    let query = name.trim().to_lowercase();

    results.data.into_iter().find_map(|item| {
        let molecule = item.molecule;
        let molecule_name = molecule.name.trim().to_lowercase();
        if molecule_name.is_empty()
            || !(molecule_name.contains(&query) || query.contains(&molecule_name))
        {
            return None;
        }
        molecule
            .sds
            .and_then(|sds| sds.custrecord_sdslink_en)
            .map(|link| link.trim().to_string())
            .filter(|link| !link.is_empty())
    })
}

#[async_trait]
impl Source for FluorochemSource {
    fn id(&self) -> &str {
        "fluorochem"
    }

    fn name(&self) -> &str {
        "Fluorochem"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::BY_CAS | SourceCapabilities::BY_NAME
    }

    async fn search_by_cas(&self, cas: &CasNumber) -> Result<Option<SdsHit>, SourceError> {
        let mut last_error = None;
        let mut answered = false;

        for url in self.cas_search_urls(cas.as_str()) {
            match fetch_page(self.client.get(&url).header("Accept", ACCEPT_HTML)).await {
                Ok(page) => {
                    answered = true;
                    if let Some(link) = parse_sds_link(&page.url, &page.body) {
                        return Ok(Some(SdsHit::new(link).manufacturer("Fluorochem")));
                    }
                }
                Err(e) => {
                    tracing::debug!("Fluorochem search {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(None),
        }
    }

    async fn search_by_name(&self, name: &str) -> Result<Option<SdsHit>, SourceError> {
        let url = format!("{}/api/v1/molecules/search", self.api_url);
        let results: MoleculeResults = fetch_json(
            self.client
                .post(&url)
                .header("Accept", "application/json")
                .json(&MoleculeQuery {
                    q: name,
                    offset: 0,
                    limit: API_PAGE_SIZE,
                }),
        )
        .await?;

        Ok(pick_molecule(results, name).map(|link| {
            SdsHit::new(format!("{}{}", self.document_host, link)).manufacturer("Fluorochem")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn molecules() -> serde_json::Value {
        json!({
            "data": [
                {"molecule": {"name": "4-Bromobenzyl alcohol", "sds": null}},
                {"molecule": {"name": "4-Bromobenzyl alcohol, 98%", "sds": {"custrecord_sdslink_en": "/core/media/media.nl?id=2"}}},
                {"molecule": {"name": "Benzyl alcohol", "sds": {"custrecord_sdslink_en": "/core/media/media.nl?id=1"}}}
            ]
        })
    }

    #[test]
    fn test_pick_molecule() {
        // the first name match has no sheet, so the next match wins
        let results: MoleculeResults = serde_json::from_value(molecules()).unwrap();
        assert_eq!(
            pick_molecule(results, "4-bromobenzyl alcohol").as_deref(),
            Some("/core/media/media.nl?id=2")
        );

        let results: MoleculeResults = serde_json::from_value(molecules()).unwrap();
        assert_eq!(pick_molecule(results, "toluene"), None);
    }

    #[test]
    fn test_parse_sds_link_by_text() {
        let base = Url::parse("https://fluorochem.co.uk/?s=64-19-7").unwrap();
        let html = r#"
            <a href="/product/f012345">Acetic acid</a>
            <a href="/download/f012345.pdf">Safety Data Sheet</a>
        "#;
        assert_eq!(
            parse_sds_link(&base, html).as_deref(),
            Some("https://fluorochem.co.uk/download/f012345.pdf")
        );
    }

    #[tokio::test]
    async fn test_search_by_name() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v1/molecules/search")
            .match_body(Matcher::PartialJson(json!({"q": "Benzyl alcohol, 99%", "limit": 12})))
            .with_header("content-type", "application/json")
            .with_body(molecules().to_string())
            .create_async()
            .await;

        let source = FluorochemSource::with_base_urls(
            HttpClient::new().unwrap(),
            server.url(),
            server.url(),
            "https://docs.example.com",
        );
        let hit = source.search_by_name("Benzyl alcohol, 99%").await.unwrap().unwrap();

        assert_eq!(hit.url, "https://docs.example.com/core/media/media.nl?id=1");
        assert_eq!(hit.manufacturer.as_deref(), Some("Fluorochem"));
    }

    #[tokio::test]
    async fn test_search_by_cas_miss() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", Matcher::Any)
            .with_body("<html><a href='/about'>About us</a></html>")
            .create_async()
            .await;

        let source = FluorochemSource::with_base_urls(
            HttpClient::new().unwrap(),
            server.url(),
            server.url(),
            server.url(),
        );
        let cas = CasNumber::parse("64-19-7").unwrap();

        assert_eq!(source.search_by_cas(&cas).await.unwrap(), None);
    }
}
