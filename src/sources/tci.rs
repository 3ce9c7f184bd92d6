//! TCI Chemicals source implementation.
//!
//! TCI does not link SDS files from its search results. The lookup is a two-step
//! session flow:
//!
//! 1. GET the product search page, which carries a `CSRFToken` form field, the
//!    site's `encodedContextPath` and a "Products (N)" facet
//! 2. POST the first product code to the SDS document search; the SDS file name
//!    comes back in the `Content-Disposition` header
//!
//! Both requests share one cookie session.

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use scraper::{Html, Selector};
use std::sync::OnceLock;

use crate::models::{CasNumber, SdsHit};
use crate::sources::{Source, SourceCapabilities, SourceError};
use crate::utils::{fetch_page, HttpClient, ACCEPT_HTML};

const TCI_BASE_URL: &str = "https://www.tcichemicals.com";

/// Label of the product facet on the search page
const PRODUCTS_FACET: &str = "Products";

/// TCI Chemicals source
#[derive(Debug, Clone)]
pub struct TciSource {
    client: HttpClient,
    base_url: String,
}

/// First product on a search page, with the session values needed to request its SDS
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProductMatch {
    csrf_token: String,
    context_path: String,
    product_code: String,
}

impl TciSource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_url(client, TCI_BASE_URL)
    }

    /// Point the source at another host (used by tests)
    pub fn with_base_url(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Run the tokenized lookup. `cas` restricts the first hit to that CAS number.
    async fn lookup(&self, text: &str, cas: Option<&str>) -> Result<Option<SdsHit>, SourceError> {
        let session = self.client.session()?;
        let search_url = format!("{}/US/en/search/", self.base_url);

        let page = fetch_page(
            session
                .get(&search_url)
                .query(&[("text", text)])
                .header("Accept", ACCEPT_HTML)
                .header("Referer", search_url.as_str())
                .header("Sec-Fetch-Dest", "document")
                .header("Sec-Fetch-Mode", "navigate"),
        )
        .await?;

        if page.redirected() {
            return Ok(None);
        }

        let Some(product) = parse_search_page(&page.body, cas)? else {
            return Ok(None);
        };
        tracing::debug!("TCI product {} matches '{}'", product.product_code, text);

        let response = session
            .post(format!(
                "{}/US/en/documentSearch/productSDSSearchDoc",
                self.base_url
            ))
            .header("Referer", search_url.as_str())
            .form(&[
                ("productCode", product.product_code.as_str()),
                ("langSelector", "en"),
                ("selectedCountry", "US"),
                ("CSRFToken", product.csrf_token.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Api(format!(
                "TCI document search returned status: {}",
                response.status()
            )));
        }

        let Some(file) = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(sds_file_name)
        else {
            return Ok(None);
        };

        Ok(Some(
            SdsHit::new(format!(
                "{}{}/sds/{}",
                self.base_url, product.context_path, file
            ))
            .manufacturer("Tokyo Chemical Industry"),
        ))
    }
}

fn regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Read the session values and the first product from a search page.
///
/// A page without a CSRF token or context path is a layout change and reported as a
/// parse error; an empty product facet is a clean miss.
fn parse_search_page(html: &str, cas: Option<&str>) -> Result<Option<ProductMatch>, SourceError> {
    static CONTEXT_RE: OnceLock<Option<Regex>> = OnceLock::new();
    static COUNT_RE: OnceLock<Option<Regex>> = OnceLock::new();

    let selector = |css: &str| {
        Selector::parse(css).map_err(|e| SourceError::Parse(format!("selector {}: {}", css, e)))
    };

    let document = Html::parse_document(html);

    let csrf_token = document
        .select(&selector(r#"input[name="CSRFToken"]"#)?)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(str::to_string)
        .ok_or_else(|| SourceError::Parse("TCI search page has no CSRF token".to_string()))?;

    let context_path = regex(&CONTEXT_RE, r"encodedContextPath[^;]+?'(\S+)';")
        .and_then(|re| re.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().replace('\\', ""))
        .ok_or_else(|| SourceError::Parse("TCI search page has no context path".to_string()))?;

    let facet_css = "div#contentSearchFacet > span.facet__text:first-child > a:first-child";
    let Some(facet) = document.select(&selector(facet_css)?).next() else {
        return Ok(None);
    };
    if facet.text().collect::<String>().trim() != PRODUCTS_FACET {
        return Ok(None);
    }

    let count_css = format!("{} + span.facet__value__count", facet_css);
    let hits: u64 = document
        .select(&selector(count_css.as_str())?)
        .next()
        .map(|span| span.text().collect::<String>())
        .and_then(|text| {
            regex(&COUNT_RE, r"\((\d+)\)")
                .and_then(|re| re.captures(&text))
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        })
        .unwrap_or(0);
    if hits == 0 {
        return Ok(None);
    }

    let Some(first) = document.select(&selector("div.prductlist")?).next() else {
        return Ok(None);
    };

    if let Some(cas) = cas {
        if first.value().attr("data-casno").map(str::trim) != Some(cas) {
            return Ok(None);
        }
    }

    let product_code = match first.value().attr("data-id").map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Ok(None),
    };

    Ok(Some(ProductMatch {
        csrf_token,
        context_path,
        product_code,
    }))
}

/// File name from a `Content-Disposition` header value
fn sds_file_name(header: &str) -> Option<String> {
    static FILE_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let file = regex(&FILE_RE, r"filename=(\S+)$")?
        .captures(header.trim())?
        .get(1)?
        .as_str()
        .trim_matches('"');

    if file.is_empty() {
        None
    } else {
        Some(file.to_string())
    }
}

#[async_trait]
impl Source for TciSource {
    fn id(&self) -> &str {
        "tci"
    }

    fn name(&self) -> &str {
        "TCI"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::BY_CAS | SourceCapabilities::BY_NAME
    }

    async fn search_by_cas(&self, cas: &CasNumber) -> Result<Option<SdsHit>, SourceError> {
        self.lookup(cas.as_str(), Some(cas.as_str())).await
    }

    async fn search_by_name(&self, name: &str) -> Result<Option<SdsHit>, SourceError> {
        self.lookup(name, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn search_page(count: u32) -> String {
        format!(
            r##"<html><head>
            <script>
              ACC.config.encodedContextPath = '\/US\/en';
            </script>
            </head><body>
            <form><input type="hidden" name="CSRFToken" value="tok-123"></form>
            <div id="contentSearchFacet"><span class="facet__text"><a href="#">Products</a><span class="facet__value__count">({})</span></span></div>
            <div class="prductlist" data-id="A0003" data-casno="67-64-1"></div>
            <div class="prductlist" data-id="A0004" data-casno="67-63-0"></div>
            </body></html>"##,
            count
        )
    }

    #[test]
    fn test_parse_search_page() {
        let product = parse_search_page(&search_page(2), Some("67-64-1"))
            .unwrap()
            .unwrap();
        assert_eq!(
            product,
            ProductMatch {
                csrf_token: "tok-123".to_string(),
                context_path: "/US/en".to_string(),
                product_code: "A0003".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_search_page_first_hit_must_match_cas() {
        assert_eq!(
            parse_search_page(&search_page(2), Some("67-63-0")).unwrap(),
            None
        );
        // name lookups take the first product regardless of CAS
        assert!(parse_search_page(&search_page(2), None).unwrap().is_some());
    }

    #[test]
    fn test_parse_search_page_zero_products() {
        assert_eq!(parse_search_page(&search_page(0), None).unwrap(), None);
    }

    #[test]
    fn test_parse_search_page_without_token() {
        let err = parse_search_page("<html><body></body></html>", None).unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_sds_file_name() {
        assert_eq!(
            sds_file_name("attachment; filename=A0003_US_EN.pdf").as_deref(),
            Some("A0003_US_EN.pdf")
        );
        assert_eq!(
            sds_file_name(r#"attachment; filename="A0003_US_EN.pdf""#).as_deref(),
            Some("A0003_US_EN.pdf")
        );
        assert_eq!(sds_file_name("inline"), None);
    }

    #[tokio::test]
    async fn test_search_by_cas_session_flow() {
        let mut server = mockito::Server::new_async().await;
        let _search = server
            .mock("GET", "/US/en/search/")
            .match_query(Matcher::UrlEncoded("text".into(), "67-64-1".into()))
            .with_body(search_page(1))
            .create_async()
            .await;
        let _doc = server
            .mock("POST", "/US/en/documentSearch/productSDSSearchDoc")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("productCode".into(), "A0003".into()),
                Matcher::UrlEncoded("CSRFToken".into(), "tok-123".into()),
            ]))
            .with_header("content-disposition", "attachment; filename=A0003_US_EN.pdf")
            .create_async()
            .await;

        let source = TciSource::with_base_url(HttpClient::new().unwrap(), server.url());
        let cas = CasNumber::parse("67-64-1").unwrap();
        let hit = source.search_by_cas(&cas).await.unwrap().unwrap();

        assert_eq!(hit.url, format!("{}/US/en/sds/A0003_US_EN.pdf", server.url()));
    }
}
