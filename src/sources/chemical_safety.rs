//! ChemicalSafety source implementation.
//!
//! ChemicalSafety aggregates sheets from many suppliers behind a JSON search
//! endpoint. Results come back as a column list plus positional rows, so columns
//! are looked up by name.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::models::{CasNumber, SdsHit};
use crate::sources::{Source, SourceCapabilities, SourceError};
use crate::utils::{fetch_json, HttpClient};

const CHEMICAL_SAFETY_BASE_URL: &str = "https://chemicalsafety.com";

/// ChemicalSafety source
#[derive(Debug, Clone)]
pub struct ChemicalSafetySource {
    client: HttpClient,
    base_url: String,
}

/// Search request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SearchForm<'a> {
    is_contains: &'a str,
    include_synonyms: &'a str,
    search_sds_server: &'a str,
    criteria: Vec<String>,
    host_name: &'a str,
    bee: &'a str,
    action: &'a str,
    search_url: &'a str,
    result_columns: [&'a str; 1],
}

impl<'a> SearchForm<'a> {
    fn new(criterion: String, fuzzy: bool) -> Self {
        let flag = if fuzzy { "true" } else { "false" };
        Self {
            is_contains: flag,
            include_synonyms: flag,
            search_sds_server: "false",
            criteria: vec![criterion],
            host_name: "sfs website",
            bee: "stevia",
            action: "search",
            search_url: "",
            result_columns: ["revision_date"],
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchColumn {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResults {
    #[serde(default)]
    cols: Vec<SearchColumn>,
    #[serde(default)]
    rows: Vec<Vec<serde_json::Value>>,
}

/// One result row reduced to the columns this source reads
#[derive(Debug, Clone, PartialEq, Eq)]
struct SheetRow {
    cas: String,
    common_name: String,
    manufacturer: String,
    url: String,
}

impl SheetRow {
    fn has_pdf(&self) -> bool {
        static PDF_RE: OnceLock<Option<Regex>> = OnceLock::new();
        PDF_RE
            .get_or_init(|| Regex::new(r"^http.+\.pdf$").ok())
            .as_ref()
            .is_some_and(|re| re.is_match(&self.url))
    }

    fn into_hit(self) -> SdsHit {
        SdsHit::new(self.url).manufacturer(self.manufacturer)
    }
}

impl SearchResults {
    fn column(&self, name: &str) -> Result<usize, SourceError> {
        self.cols
            .iter()
            .position(|col| col.name == name)
            .ok_or_else(|| SourceError::Parse(format!("ChemicalSafety response lacks {} column", name)))
    }

    fn sheet_rows(&self) -> Result<Vec<SheetRow>, SourceError> {
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }

        let cas = self.column("CAS")?;
        let common = self.column("COMMON")?;
        let manufacturer = self.column("MANUFACT")?;
        let url = self.column("HTTPMSDSREF")?;

        let cell = |row: &[serde_json::Value], index: usize| {
            row.get(index)
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        Ok(self
            .rows
            .iter()
            .map(|row| SheetRow {
                cas: cell(row, cas),
                common_name: cell(row, common),
                manufacturer: cell(row, manufacturer),
                url: cell(row, url),
            })
            .collect())
    }
}

/// Several suppliers may list the same CAS number; the last row with a PDF link wins
fn pick_cas_row(rows: Vec<SheetRow>, cas: &str) -> Option<SheetRow> {
    rows.into_iter().rfind(|row| row.cas == cas && row.has_pdf())
}

/// First row whose product name contains the query or is contained in it
fn pick_name_row(rows: Vec<SheetRow>, name: &str) -> Option<SheetRow> {
    let query = name.trim().to_lowercase();
    rows.into_iter().find(|row| {
        let common = row.common_name.to_lowercase();
        !common.is_empty()
            && (common.contains(&query) || query.contains(&common))
            && row.has_pdf()
    })
}

impl ChemicalSafetySource {
    pub fn new(client: HttpClient) -> Self {
        Self::with_base_url(client, CHEMICAL_SAFETY_BASE_URL)
    }

    /// Point the source at another host (used by tests)
    pub fn with_base_url(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn run_search(&self, form: SearchForm<'_>) -> Result<Vec<SheetRow>, SourceError> {
        let url = format!("{}/sds1/sds_retriever.php?action=search", self.base_url);
        let results: SearchResults = fetch_json(
            self.client
                .post(&url)
                .header("Accept", "application/json")
                .json(&form),
        )
        .await?;

        results.sheet_rows()
    }
}

#[async_trait]
impl Source for ChemicalSafetySource {
    fn id(&self) -> &str {
        "chemical_safety"
    }

    fn name(&self) -> &str {
        "ChemicalSafety"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::BY_CAS | SourceCapabilities::BY_NAME
    }

    async fn search_by_cas(&self, cas: &CasNumber) -> Result<Option<SdsHit>, SourceError> {
        let rows = self
            .run_search(SearchForm::new(format!("cas|{}", cas), false))
            .await?;
        Ok(pick_cas_row(rows, cas.as_str()).map(SheetRow::into_hit))
    }

    /// Contains-match with synonym expansion on the provider side
    async fn search_by_name(&self, name: &str) -> Result<Option<SdsHit>, SourceError> {
        let rows = self
            .run_search(SearchForm::new(format!("common|{}", name), true))
            .await?;
        Ok(pick_name_row(rows, name).map(SheetRow::into_hit))
    }
}
