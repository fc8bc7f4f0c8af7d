//! Listing source contracts + fixture-first and HTTP implementations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use shpf_core::{ListingRecord, Source};
use shpf_match::strip_diacritics;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "shpf-adapters";

/// Where a source's listings come from during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    Fixture,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterContext {
    pub run_id: Uuid,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Anything that can produce the raw listings a marketplace shows for a
/// model search. The matching pipeline never looks behind this trait.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn source(&self) -> Source;

    async fn fetch_listings(
        &self,
        ctx: &AdapterContext,
        model: &str,
    ) -> Result<Vec<ListingRecord>, AdapterError>;
}

/// Fixed CSS selectors for one marketplace's search results page.
#[derive(Debug, Clone, Copy)]
pub struct ListingSelectors {
    pub card: &'static str,
    pub name: &'static str,
    pub price: &'static str,
    pub status: Option<&'static str>,
}

pub fn selectors_for(source: Source) -> ListingSelectors {
    match source {
        Source::Cex => ListingSelectors {
            card: ".search-product-card",
            name: ".card-title",
            price: ".product-main-price",
            status: None,
        },
        Source::CashConverters => ListingSelectors {
            card: ".product-card",
            name: ".product-card__title",
            price: ".product-card__price",
            status: Some(".product-card__condition"),
        },
        Source::BackMarket => ListingSelectors {
            card: r#"[data-qa="product-card"]"#,
            name: r#"[data-qa="product-card-title"]"#,
            price: r#"[data-qa="product-card-price"]"#,
            status: Some(r#"[data-qa="product-card-grade"]"#),
        },
    }
}

fn parse_selector(selector: &str) -> Result<Selector, AdapterError> {
    Selector::parse(selector).map_err(|e| AdapterError::Message(e.to_string()))
}

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn first_text(card: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    card.select(selector)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>()))
}

/// Extracts listing records from a search results page. Cards without a
/// name or a price are skipped.
pub fn parse_listing_html(source: Source, html: &str) -> Result<Vec<ListingRecord>, AdapterError> {
    let selectors = selectors_for(source);
    let card_sel = parse_selector(selectors.card)?;
    let name_sel = parse_selector(selectors.name)?;
    let price_sel = parse_selector(selectors.price)?;
    let status_sel = selectors.status.map(parse_selector).transpose()?;

    let document = Html::parse_document(html);
    let mut records = Vec::new();
    for card in document.select(&card_sel) {
        let (Some(name), Some(price)) = (first_text(&card, &name_sel), first_text(&card, &price_sel))
        else {
            debug!(%source, "skipping card without name or price");
            continue;
        };
        let mut record = ListingRecord::new(source, name, price);
        if let Some(status) = status_sel.as_ref().and_then(|sel| first_text(&card, sel)) {
            record = record.with_category_hint(status);
        }
        records.push(record);
    }
    Ok(records)
}

/// Search URL for `model` on `source`. Accents are folded before encoding.
pub fn search_url(source: Source, model: &str) -> Result<Url, AdapterError> {
    let (base, param) = match source {
        Source::Cex => ("https://es.webuy.com/search", "stext"),
        Source::CashConverters => ("https://www.cashconverters.es/es/es/buscar/", "q"),
        Source::BackMarket => ("https://www.backmarket.es/es-es/search", "q"),
    };
    let query = strip_diacritics(model.trim());
    Url::parse_with_params(base, &[(param, query.as_str())])
        .with_context(|| format!("building search url for {source}"))
        .map_err(AdapterError::from)
}

/// File-name slug for a model: accents folded, lowercase, dash-separated.
pub fn model_slug(model: &str) -> String {
    strip_diacritics(model)
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Reads captured search pages from `<root>/<source-id>/<model-slug>.html`.
#[derive(Debug, Clone)]
pub struct FixtureListingSource {
    source: Source,
    root: PathBuf,
}

impl FixtureListingSource {
    pub fn new(source: Source, root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            root: root.into(),
        }
    }

    pub fn fixture_path(&self, model: &str) -> PathBuf {
        self.root
            .join(self.source.id())
            .join(format!("{}.html", model_slug(model)))
    }
}

#[async_trait]
impl ListingSource for FixtureListingSource {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch_listings(
        &self,
        ctx: &AdapterContext,
        model: &str,
    ) -> Result<Vec<ListingRecord>, AdapterError> {
        let path = self.fixture_path(model);
        if !fs::try_exists(&path)
            .await
            .with_context(|| format!("checking fixture {}", path.display()))?
        {
            debug!(run_id = %ctx.run_id, source = %self.source, model, path = %path.display(), "no fixture for model");
            return Ok(Vec::new());
        }
        let html = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading fixture {}", path.display()))?;
        parse_listing_html(self.source, &html)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

/// Fetches the live search page with a single GET. No retries.
#[derive(Debug, Clone)]
pub struct HttpListingSource {
    source: Source,
    client: reqwest::Client,
}

impl HttpListingSource {
    pub fn new(source: Source, config: &HttpClientConfig) -> Result<Self, AdapterError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self { source, client })
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    fn source(&self) -> Source {
        self.source
    }

    async fn fetch_listings(
        &self,
        ctx: &AdapterContext,
        model: &str,
    ) -> Result<Vec<ListingRecord>, AdapterError> {
        let url = search_url(self.source, model)?;
        let span = info_span!("listing_fetch", run_id = %ctx.run_id, source = %self.source, %url);
        async {
            let resp = self.client.get(url.clone()).send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AdapterError::HttpStatus {
                    status: status.as_u16(),
                    url: resp.url().to_string(),
                });
            }
            let body = resp.text().await?;
            parse_listing_html(self.source, &body)
        }
        .instrument(span)
        .await
    }
}

pub fn listing_source_for(
    mode: SourceMode,
    source: Source,
    fixtures_root: &Path,
    http: &HttpClientConfig,
) -> Result<Box<dyn ListingSource>, AdapterError> {
    Ok(match mode {
        SourceMode::Fixture => Box::new(FixtureListingSource::new(source, fixtures_root)),
        SourceMode::Http => Box::new(HttpListingSource::new(source, http)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const CEX_PAGE: &str = r#"
        <html><body>
          <div class="search-product-card">
            <span class="card-title"> Apple iPhone 12 64GB Negro, Libre B </span>
            <p class="product-main-price">340,00 €</p>
          </div>
          <div class="search-product-card">
            <span class="card-title">Apple iPhone 12 64GB Negro, Libre C</span>
          </div>
        </body></html>
    "#;

    const BACK_MARKET_PAGE: &str = r#"
        <div data-qa="product-card">
          <h2 data-qa="product-card-title">iPhone 12 64 GB - Negro - Libre</h2>
          <span data-qa="product-card-grade">Muy bueno</span>
          <div data-qa="product-card-price">329,00&nbsp;€</div>
        </div>
        <div data-qa="product-card">
          <h2 data-qa="product-card-title">iPhone 12 128 GB - Azul - Libre</h2>
          <div data-qa="product-card-price">389,00&nbsp;€</div>
        </div>
    "#;

    #[test]
    fn parses_cex_cards_and_skips_incomplete_ones() {
        let records = parse_listing_html(Source::Cex, CEX_PAGE).unwrap();
        assert_eq!(
            records,
            vec![ListingRecord::new(Source::Cex, "Apple iPhone 12 64GB Negro, Libre B", "340,00 €")]
        );
    }

    #[test]
    fn parses_status_fields_when_the_source_has_them() {
        let records = parse_listing_html(Source::BackMarket, BACK_MARKET_PAGE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].category_hint.as_deref(), Some("Muy bueno"));
        assert_eq!(records[0].raw_price, "329,00\u{a0}€");
        assert_eq!(records[1].category_hint, None);
    }

    #[test]
    fn every_source_has_valid_selectors() {
        for source in Source::ALL {
            assert!(parse_listing_html(source, "<html></html>").unwrap().is_empty());
        }
    }

    #[test]
    fn search_urls_fold_accents_and_encode() {
        let url = search_url(Source::Cex, "Cámara Canon EOS").unwrap();
        assert_eq!(url.as_str(), "https://es.webuy.com/search?stext=Camara+Canon+EOS");
        let url = search_url(Source::BackMarket, "iPhone 12").unwrap();
        assert_eq!(url.query(), Some("q=iPhone+12"));
    }

    #[test]
    fn model_slugs_are_stable() {
        assert_eq!(model_slug("iPhone 12 64GB"), "iphone-12-64gb");
        assert_eq!(model_slug("  Cámara / Réflex  "), "camara-reflex");
    }

    #[tokio::test]
    async fn fixture_source_reads_pages_and_tolerates_missing_ones() {
        let dir = tempdir().expect("tempdir");
        let source = FixtureListingSource::new(Source::Cex, dir.path());
        std::fs::create_dir_all(dir.path().join("cex")).unwrap();
        std::fs::write(source.fixture_path("iPhone 12"), CEX_PAGE).unwrap();

        let ctx = AdapterContext { run_id: Uuid::new_v4() };
        let records = source.fetch_listings(&ctx, "iPhone 12").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(source.fetch_listings(&ctx, "Pixel 7").await.unwrap().is_empty());
    }

    #[test]
    fn registry_builds_both_modes() {
        let fixture = listing_source_for(
            SourceMode::Fixture,
            Source::CashConverters,
            Path::new("fixtures"),
            &HttpClientConfig::default(),
        )
        .unwrap();
        assert_eq!(fixture.source(), Source::CashConverters);
        let http = listing_source_for(
            SourceMode::Http,
            Source::Cex,
            Path::new("fixtures"),
            &HttpClientConfig::default(),
        )
        .unwrap();
        assert_eq!(http.source(), Source::Cex);
    }
}
