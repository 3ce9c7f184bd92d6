//! Fisher Scientific source implementation.
//!
//! The Fisher SDS search renders one row per product: an image cell whose
//! `img[src]` embeds the CAS number, followed by a catalog cell listing the
//! catalog numbers, each linking to its SDS.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::models::{CasNumber, SdsHit};
use crate::sources::{Source, SourceCapabilities, SourceError};
use crate::utils::{absolute_url, fetch_page, HttpClient, Page, ACCEPT_HTML};

const FISHER_BASE_URL: &str = "https://www.fishersci.com";

/// Fisher Scientific source
#[derive(Debug, Clone)]
pub struct FisherSource {
    client: HttpClient,
    base_url: String,
}

impl FisherSource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_url(client, FISHER_BASE_URL)
    }

    /// Point the source at another host (used by tests)
    pub fn with_base_url(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Run the SDS keyword search. Returns `None` when Fisher redirected away.
    async fn search_page(&self, keyword: &str) -> Result<Option<Page>, SourceError> {
        let url = format!(
            "{}/us/en/catalog/search/sds?selectLang=&store=&msdsKeyword={}",
            self.base_url,
            urlencoding::encode(keyword)
        );

        let page = fetch_page(
            self.client
                .get(&url)
                .header("Accept", ACCEPT_HTML)
                .header("Sec-Fetch-Dest", "document")
                .header("Sec-Fetch-Mode", "navigate")
                .header("Sec-Fetch-Site", "same-origin"),
        )
        .await?;

        if page.redirected() {
            return Ok(None);
        }
        Ok(Some(page))
    }
}

fn first_catalog_link(cell: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse(".catlog_items a[href]").ok()?;
    cell.select(&selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
}

/// SDS link of the row whose product image references `cas`.
///
/// Fisher falls back to fuzzy matches when there is no exact hit, so the first row
/// alone cannot be trusted for CAS lookups.
fn parse_cas_row(html: &str, cas: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let image_cell = Selector::parse(".msds_img").ok()?;
    let image = Selector::parse("img[src]").ok()?;

    for cell in document.select(&image_cell) {
        let matches = cell
            .select(&image)
            .filter_map(|img| img.value().attr("src"))
            .any(|src| mentions_cas(src, cas));
        if !matches {
            continue;
        }

        let catalog = cell
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .next()
            .filter(|sibling| sibling.value().classes().any(|c| c == "catalog_data"))?;

        return first_catalog_link(catalog);
    }

    None
}

/// Whether `cas` appears in `text` as a whole token, not inside a longer number
fn mentions_cas(text: &str, cas: &str) -> bool {
    text.split(|c: char| !(c.is_ascii_digit() || c == '-'))
        .any(|token| token == cas)
}

/// SDS link of the first catalog entry on the page
fn parse_first_row(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(".catlog_items a[href]").ok()?;

    document
        .select(&selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| href.trim().to_string())
}

#[async_trait]
impl Source for FisherSource {
    fn id(&self) -> &str {
        "fisher"
    }

    fn name(&self) -> &str {
        "Fisher"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::BY_CAS | SourceCapabilities::BY_NAME
    }

    async fn search_by_cas(&self, cas: &CasNumber) -> Result<Option<SdsHit>, SourceError> {
        let Some(page) = self.search_page(cas.as_str()).await? else {
            return Ok(None);
        };

        match parse_cas_row(&page.body, cas.as_str()) {
            Some(href) => Ok(Some(SdsHit::new(absolute_url(&page.url, &href)?))),
            None => Ok(None),
        }
    }

    async fn search_by_name(&self, name: &str) -> Result<Option<SdsHit>, SourceError> {
        let Some(page) = self.search_page(name).await? else {
            return Ok(None);
        };

        match parse_first_row(&page.body) {
            Some(href) => Ok(Some(SdsHit::new(absolute_url(&page.url, &href)?))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const RESULTS: &str = r#"
        <html><body>
        <div class="search_results">
          <div class="row">
            <div class="msds_img"><img src="/images/structures/67-63-0.gif"></div>
            <div class="catalog_data">
              <div class="catlog_items">
                <a href="/store/msds?partNumber=A416P4&productDescription=2-PROPANOL">A416P4</a>
                <a href="/store/msds?partNumber=A451-1">A451-1</a>
              </div>
            </div>
          </div>
          <div class="row">
            <div class="msds_img"><img src="/images/structures/67-64-1.gif"></div>
            <div class="catalog_data">
              <div class="catlog_items"><a href="/store/msds?partNumber=A18-1">A18-1</a></div>
            </div>
          </div>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_parse_cas_row_picks_matching_image() {
        assert_eq!(
            parse_cas_row(RESULTS, "67-64-1").as_deref(),
            Some("/store/msds?partNumber=A18-1")
        );
        assert_eq!(
            parse_cas_row(RESULTS, "67-63-0").as_deref(),
            Some("/store/msds?partNumber=A416P4&productDescription=2-PROPANOL")
        );
        assert_eq!(parse_cas_row(RESULTS, "64-17-5"), None);
    }

    #[test]
    fn test_parse_cas_row_ignores_longer_numbers() {
        let html = r#"
            <div class="row">
              <div class="msds_img"><img src="/images/structures/164-19-7.gif"></div>
              <div class="catalog_data">
                <div class="catlog_items"><a href="/store/msds?partNumber=X1">X1</a></div>
              </div>
            </div>
            <div class="row">
              <div class="msds_img"><img src="/images/structures/64-19-7.gif"></div>
              <div class="catalog_data">
                <div class="catlog_items"><a href="/store/msds?partNumber=A38-212">A38-212</a></div>
              </div>
            </div>
        "#;

        assert_eq!(
            parse_cas_row(html, "64-19-7").as_deref(),
            Some("/store/msds?partNumber=A38-212")
        );
        assert_eq!(parse_cas_row(html, "4-19-7"), None);
    }

    #[test]
    fn test_parse_first_row() {
        assert_eq!(
            parse_first_row(RESULTS).as_deref(),
            Some("/store/msds?partNumber=A416P4&productDescription=2-PROPANOL")
        );
        assert_eq!(parse_first_row("<html></html>"), None);
    }

    #[tokio::test]
    async fn test_search_by_cas() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/us/en/catalog/search/sds")
            .match_query(Matcher::UrlEncoded("msdsKeyword".into(), "67-64-1".into()))
            .with_body(RESULTS)
            .create_async()
            .await;

        let source = FisherSource::with_base_url(HttpClient::new().unwrap(), server.url());
        let cas = CasNumber::parse("67-64-1").unwrap();
        let hit = source.search_by_cas(&cas).await.unwrap().unwrap();

        assert_eq!(hit.url, format!("{}/store/msds?partNumber=A18-1", server.url()));
    }

    #[tokio::test]
    async fn test_search_by_name_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/us/en/catalog/search/sds")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let source = FisherSource::with_base_url(HttpClient::new().unwrap(), server.url());
        let err = source.search_by_name("Acetone").await.unwrap_err();

        assert!(matches!(err, SourceError::Api(_)));
    }
}
