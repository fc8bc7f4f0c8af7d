//! Wide per-model price table merged from every source.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use shpf_core::{AggregateRow, Source};
use tracing::debug;

pub const MODEL_COLUMN: &str = "Modelo";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub source: Source,
    pub category: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub model: String,
    pub cells: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    columns: Vec<Column>,
    rows: Vec<TableRow>,
}

impl ResultTable {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `Modelo` followed by every prefixed category column.
    pub fn headers(&self) -> Vec<String> {
        std::iter::once(MODEL_COLUMN.to_string())
            .chain(self.columns.iter().map(|c| c.name.clone()))
            .collect()
    }

    pub fn cell(&self, model: &str, column: &str) -> Option<f64> {
        let idx = self.columns.iter().position(|c| c.name == column)?;
        self.rows
            .iter()
            .find(|row| row.model == model)
            .and_then(|row| row.cells[idx])
    }

    /// Rows rendered as strings in header order; absent cells are empty.
    pub fn to_records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                std::iter::once(row.model.clone())
                    .chain(
                        row.cells
                            .iter()
                            .map(|cell| cell.map(|v| v.to_string()).unwrap_or_default()),
                    )
                    .collect()
            })
            .collect()
    }
}

/// Left-joins per-source aggregates onto the requested model list.
#[derive(Debug, Clone, Default)]
pub struct ResultTableBuilder {
    models: Vec<String>,
    by_source: BTreeMap<Source, Vec<AggregateRow>>,
}

impl ResultTableBuilder {
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let models = models
            .into_iter()
            .map(Into::into)
            .filter(|model: &String| seen.insert(model.clone()))
            .collect();
        Self {
            models,
            by_source: BTreeMap::new(),
        }
    }

    pub fn add_source(mut self, source: Source, rows: impl IntoIterator<Item = AggregateRow>) -> Self {
        self.by_source.entry(source).or_default().extend(rows);
        self
    }

    pub fn build(self) -> ResultTable {
        let mut columns = Vec::new();
        let mut values: HashMap<(String, usize), f64> = HashMap::new();

        for (source, rows) in &self.by_source {
            let categories: BTreeSet<&str> = rows.iter().map(|r| r.category.as_str()).collect();
            let base = columns.len();
            let offsets: HashMap<&str, usize> = categories
                .iter()
                .enumerate()
                .map(|(offset, category)| (*category, base + offset))
                .collect();
            columns.extend(categories.iter().map(|category| Column {
                source: *source,
                category: category.to_string(),
                name: source.column_name(category),
            }));

            for row in rows {
                let idx = offsets[row.category.as_str()];
                let key = (row.model.clone(), idx);
                if values.contains_key(&key) {
                    debug!(%source, model = %row.model, category = %row.category, "keeping first aggregate for cell");
                    continue;
                }
                values.insert(key, row.median_price);
            }
        }

        let rows = self
            .models
            .into_iter()
            .map(|model| {
                let cells = (0..columns.len())
                    .map(|idx| values.get(&(model.clone(), idx)).copied())
                    .collect();
                TableRow { model, cells }
            })
            .collect();

        ResultTable { columns, rows }
    }
}

pub fn build_table<I, S>(models: I, aggregates_by_source: BTreeMap<Source, Vec<AggregateRow>>) -> ResultTable
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    aggregates_by_source
        .into_iter()
        .fold(ResultTableBuilder::new(models), |builder, (source, rows)| {
            builder.add_source(source, rows)
        })
        .build()
}
