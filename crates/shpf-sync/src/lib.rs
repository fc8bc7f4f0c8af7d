//! Sync run orchestration: fetch listings per source, aggregate, export.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shpf_adapters::{listing_source_for, AdapterContext, HttpClientConfig, SourceMode};
use shpf_core::{AggregateRow, Source};
use shpf_match::{
    build_table, CategoryPolicy, NameMatcher, ObservationCounts, PipelineConfig, PriceAggregator,
    PricePipeline, ResultTable, SimilarityMetric, Threshold, MODEL_COLUMN,
};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "shpf-sync";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: Source,
    pub display_name: String,
    pub enabled: bool,
    pub mode: SourceMode,
    pub category_policy: CategoryPolicy,
    pub threshold: Threshold,
    #[serde(default)]
    pub metric: SimilarityMetric,
    #[serde(default)]
    pub request_delay_ms: u64,
    #[serde(default)]
    pub request_jitter_ms: u64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SourceConfig {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            matcher: NameMatcher::new(self.threshold).with_metric(self.metric),
            category_policy: self.category_policy,
        }
    }

    /// Pause before the next request to this source: the fixed delay plus a
    /// random share of the jitter. Fixture sources never wait.
    pub fn request_delay(&self) -> Duration {
        if self.mode == SourceMode::Fixture {
            return Duration::ZERO;
        }
        let jitter = if self.request_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.request_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.request_delay_ms + jitter)
    }
}

pub fn parse_source_registry(text: &str) -> Result<SourceRegistry> {
    serde_yaml::from_str(text).context("parsing source registry")
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub workspace_root: PathBuf,
    pub models_csv: PathBuf,
    pub fixtures_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub model_limit: Option<usize>,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let workspace_root = std::env::var("SHPF_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            models_csv: std::env::var("SHPF_MODELS_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("models.csv")),
            fixtures_dir: std::env::var("SHPF_FIXTURES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("fixtures")),
            reports_dir: std::env::var("SHPF_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| workspace_root.join("reports")),
            user_agent: std::env::var("SHPF_USER_AGENT")
                .unwrap_or_else(|_| "shpf-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("SHPF_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            model_limit: std::env::var("SHPF_MODEL_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok()),
            workspace_root,
        }
    }

    /// Config rooted at `root` with every path in its default place.
    pub fn for_workspace(root: impl Into<PathBuf>) -> Self {
        let workspace_root = root.into();
        Self {
            models_csv: workspace_root.join("models.csv"),
            fixtures_dir: workspace_root.join("fixtures"),
            reports_dir: workspace_root.join("reports"),
            user_agent: "shpf-bot/0.1".to_string(),
            http_timeout_secs: 20,
            model_limit: None,
            workspace_root,
        }
    }
}

/// Reads the `Modelo` column of a CSV file, skipping blank cells and repeated
/// models (first occurrence wins).
pub fn read_models_csv(path: impl AsRef<Path>, limit: Option<usize>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let column = reader
        .headers()
        .with_context(|| format!("reading headers of {}", path.display()))?
        .iter()
        .position(|h| h.trim() == MODEL_COLUMN)
        .ok_or_else(|| anyhow!("{} has no `{MODEL_COLUMN}` column", path.display()))?;

    let mut models = Vec::new();
    let mut seen = BTreeSet::new();
    for record in reader.records() {
        if limit.is_some_and(|limit| models.len() >= limit) {
            break;
        }
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        if let Some(model) = record.get(column).map(str::trim).filter(|m| !m.is_empty()) {
            if seen.insert(model.to_string()) {
                models.push(model.to_string());
            }
        }
    }
    Ok(models)
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRunSummary {
    pub source_id: Source,
    pub display_name: String,
    pub mode: SourceMode,
    pub counts: ObservationCounts,
    pub duplicates: usize,
    pub groups: usize,
    pub failed_fetches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub models: usize,
    pub enabled_sources: usize,
    pub table_columns: usize,
    pub sources: Vec<SourceRunSummary>,
    pub reports_dir: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub manifest: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportManifest {
    pub schema_version: u32,
    pub files: Vec<ReportManifestFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

pub struct SyncPipeline {
    config: SyncConfig,
    http: HttpClientConfig,
}

impl SyncPipeline {
    pub fn new(config: SyncConfig) -> Self {
        let http = HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        };
        Self { config, http }
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let registry = self.load_source_registry().await?;
        let enabled_sources: Vec<_> = registry.sources.into_iter().filter(|s| s.enabled).collect();
        let models = read_models_csv(&self.config.models_csv, self.config.model_limit)?;
        info!(%run_id, models = models.len(), sources = enabled_sources.len(), "starting sync run");

        let ctx = AdapterContext { run_id };
        let mut by_source: BTreeMap<Source, Vec<AggregateRow>> = BTreeMap::new();
        let mut summaries = Vec::new();

        for source in &enabled_sources {
            let adapter = listing_source_for(
                source.mode,
                source.source_id,
                &self.config.fixtures_dir,
                &self.http,
            )
            .with_context(|| format!("building listing source for {}", source.source_id))?;
            let pipeline = PricePipeline::new(source.pipeline_config());
            let mut aggregator = PriceAggregator::new();
            let mut counts = ObservationCounts::default();
            let mut failed_fetches = 0usize;

            for (idx, model) in models.iter().enumerate() {
                if idx > 0 {
                    let delay = source.request_delay();
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                match adapter.fetch_listings(&ctx, model).await {
                    Ok(records) => {
                        let batch = pipeline.observe(model, &records);
                        counts.merge(batch.counts);
                        aggregator.extend(batch.observations);
                    }
                    Err(err) => {
                        failed_fetches += 1;
                        warn!(%run_id, source = %source.source_id, model = %model, %err, "listing fetch failed");
                    }
                }
            }

            let rows = aggregator.rows();
            info!(
                source = %source.source_id,
                listings = counts.listings,
                matched = counts.matched,
                groups = rows.len(),
                "source aggregated"
            );
            summaries.push(SourceRunSummary {
                source_id: source.source_id,
                display_name: source.display_name.clone(),
                mode: source.mode,
                counts,
                duplicates: aggregator.duplicates(),
                groups: rows.len(),
                failed_fetches,
            });
            by_source.entry(source.source_id).or_default().extend(rows);
        }

        let table = build_table(models.iter().cloned(), by_source);
        let reports_dir = self.config.reports_dir.join(run_id.to_string());
        fs::create_dir_all(&reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let csv_path = reports_dir.join("prices.csv");
        let parquet_path = reports_dir.join("prices.parquet");
        write_table_csv(&csv_path, &table)?;
        write_table_parquet(&parquet_path, &table)?;

        let mut summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            models: models.len(),
            enabled_sources: enabled_sources.len(),
            table_columns: table.columns().len(),
            sources: summaries,
            reports_dir: reports_dir.display().to_string(),
            manifest: String::new(),
        };
        let summary_path = reports_dir.join("run_summary.json");
        let bytes = serde_json::to_vec_pretty(&summary).context("serializing run summary")?;
        fs::write(&summary_path, bytes)
            .await
            .with_context(|| format!("writing {}", summary_path.display()))?;

        let manifest = ReportManifest {
            schema_version: 1,
            files: vec![
                manifest_entry("prices_csv", &reports_dir, &csv_path)?,
                manifest_entry("prices_parquet", &reports_dir, &parquet_path)?,
                manifest_entry("run_summary", &reports_dir, &summary_path)?,
            ],
        };
        let manifest_path = reports_dir.join("manifest.json");
        let bytes = serde_json::to_vec_pretty(&manifest).context("serializing report manifest")?;
        fs::write(&manifest_path, bytes)
            .await
            .with_context(|| format!("writing {}", manifest_path.display()))?;

        summary.manifest = manifest_path.display().to_string();
        info!(%run_id, reports_dir = %summary.reports_dir, "sync run complete");
        Ok(summary)
    }

    async fn load_source_registry(&self) -> Result<SourceRegistry> {
        let path = self.config.workspace_root.join("sources.yaml");
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        parse_source_registry(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

pub async fn run_sync_once_from_env() -> Result<SyncRunSummary> {
    SyncPipeline::new(SyncConfig::from_env()).run_once().await
}

pub fn write_table_csv(path: &Path, table: &ResultTable) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer
        .write_record(table.headers())
        .with_context(|| format!("writing header to {}", path.display()))?;
    for record in table.to_records() {
        writer
            .write_record(&record)
            .with_context(|| format!("writing row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

pub fn write_table_parquet(path: &Path, table: &ResultTable) -> Result<()> {
    let mut fields = vec![ArrowField::new(MODEL_COLUMN, DataType::Utf8, false)];
    fields.extend(
        table
            .columns()
            .iter()
            .map(|c| ArrowField::new(c.name.as_str(), DataType::Float64, true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let models = StringArray::from(
        table
            .rows()
            .iter()
            .map(|r| Some(r.model.as_str()))
            .collect::<Vec<_>>(),
    );
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(models)];
    for idx in 0..table.columns().len() {
        let values = Float64Array::from(table.rows().iter().map(|r| r.cells[idx]).collect::<Vec<_>>());
        arrays.push(Arc::new(values));
    }

    let batch = RecordBatch::try_new(schema, arrays).context("building prices record batch")?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<ReportManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());
    let rel = path
        .strip_prefix(reports_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(ReportManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}
