//! Uniform query surface over one loaded table.
//!
//! A [`Table`] wraps a `LazyFrame` that is either backed by an in-memory
//! `DataFrame` or by a lazy file scan. Every operation takes an optional
//! predicate, runs a single query plan, and returns plain Rust values, so
//! callers never see which backend they are talking to.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use polars::prelude::*;
use serde::Serialize;
use std::fmt;
use tempfile::NamedTempFile;

const COUNT: &str = "__count";
const ROW: &str = "__row";

/// Where a table's rows live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Materialized once when opened
    Memory,
    /// Re-scanned from disk for every query
    Lazy,
    /// Materialized bounded random subset of the source
    Sampled { rows: usize },
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => write!(f, "memory"),
            Backend::Lazy => write!(f, "lazy"),
            Backend::Sampled { rows } => write!(f, "sampled({rows})"),
        }
    }
}

/// A group key or distinct value read back from a query result
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl KeyValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            KeyValue::Int(v) => Some(*v),
            KeyValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeyValue::Int(_) => None,
            KeyValue::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{v}"),
            KeyValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// One row of a grouped count: the key column values and the row count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub keys: Vec<KeyValue>,
    pub count: u64,
}

/// Ordering of grouped counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOrder {
    /// Largest groups first, ties by ascending key
    CountDesc,
    /// Ascending by key columns
    KeyAsc,
}

/// Result of [`Table::sample`]: the drawn rows and the size of the set they were drawn from
pub struct Sample {
    pub rows: DataFrame,
    pub population: usize,
}

pub struct Table {
    name: String,
    backend: Backend,
    frame: LazyFrame,
    columns: Vec<String>,
    // Decompressed copy of the source; must outlive lazy scans of it.
    _spill: Option<NamedTempFile>,
}

impl Table {
    /// Wrap an already-prepared frame. Materialized backends should pass a
    /// frame built from a `DataFrame` (`df.lazy()`).
    pub fn new(
        name: impl Into<String>,
        backend: Backend,
        mut frame: LazyFrame,
        spill: Option<NamedTempFile>,
    ) -> Result<Self> {
        let columns = frame
            .collect_schema()?
            .iter_names()
            .map(|n| n.to_string())
            .collect();
        Ok(Self {
            name: name.into(),
            backend,
            frame,
            columns,
            _spill: spill,
        })
    }

    /// Build a materialized table directly from a `DataFrame`
    pub fn from_dataframe(name: impl Into<String>, df: DataFrame) -> Result<Self> {
        Self::new(name, Backend::Memory, df.lazy(), None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// The table restricted to `predicate`, as a lazy plan
    pub fn scan(&self, predicate: Option<&Expr>) -> LazyFrame {
        match predicate {
            Some(p) => self.frame.clone().filter(p.clone()),
            None => self.frame.clone(),
        }
    }

    pub fn count(&self, predicate: Option<&Expr>) -> Result<u64> {
        let df = self.scan(predicate).select([len().alias(COUNT)]).collect()?;
        first_u64(&df, COUNT)
    }

    /// Sum of `column` over matching rows, nulls counted as zero
    pub fn sum(&self, column: &str, predicate: Option<&Expr>) -> Result<i64> {
        let (_, sums) = self.totals(predicate, &[column])?;
        Ok(sums.first().copied().unwrap_or(0))
    }

    /// Row count and per-column sums in one pass
    pub fn totals(&self, predicate: Option<&Expr>, columns: &[&str]) -> Result<(u64, Vec<i64>)> {
        self.require(columns)?;
        let mut exprs = vec![len().alias(COUNT)];
        for (i, c) in columns.iter().enumerate() {
            exprs.push(
                col(*c)
                    .cast(DataType::Int64)
                    .fill_null(lit(0i64))
                    .sum()
                    .alias(format!("__sum_{i}")),
            );
        }
        let df = self.scan(predicate).select(exprs).collect()?;
        let count = first_u64(&df, COUNT)?;
        let mut sums = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            let column = df.column(&format!("__sum_{i}"))?.cast(&DataType::Int64)?;
            sums.push(column.i64()?.get(0).unwrap_or(0));
        }
        Ok((count, sums))
    }

    /// Row counts per distinct combination of `columns`.
    ///
    /// Rows with a null in any key column are not counted.
    pub fn group_count(
        &self,
        columns: &[&str],
        predicate: Option<&Expr>,
        order: GroupOrder,
        limit: Option<usize>,
    ) -> Result<Vec<GroupCount>> {
        if columns.is_empty() {
            return Err(eyre!("group_count needs at least one key column"));
        }
        self.require(columns)?;

        let keys: Vec<Expr> = columns.iter().map(|c| col(*c)).collect();
        let mut lf = self
            .scan(predicate)
            .select(keys.clone())
            .drop_nulls(None)
            .group_by(keys.clone())
            .agg([len().alias(COUNT)]);

        lf = match order {
            GroupOrder::CountDesc => {
                let mut by = vec![col(COUNT)];
                by.extend(keys);
                let mut descending = vec![true];
                descending.extend(columns.iter().map(|_| false));
                lf.sort_by_exprs(
                    by,
                    SortMultipleOptions {
                        descending,
                        ..Default::default()
                    },
                )
            }
            GroupOrder::KeyAsc => lf.sort_by_exprs(
                keys,
                SortMultipleOptions {
                    descending: columns.iter().map(|_| false).collect(),
                    ..Default::default()
                },
            ),
        };
        if let Some(limit) = limit {
            lf = lf.limit(limit as IdxSize);
        }

        let df = lf.collect()?;
        let key_columns = columns
            .iter()
            .map(|c| key_values(df.column(c)?))
            .collect::<Result<Vec<_>>>()?;
        let counts = df.column(COUNT)?.cast(&DataType::UInt64)?;
        let counts = counts.u64()?;

        Ok((0..df.height())
            .map(|row| GroupCount {
                keys: key_columns.iter().map(|k| k[row].clone()).collect(),
                count: counts.get(row).unwrap_or(0),
            })
            .collect())
    }

    /// Distinct non-null values of `column`, ascending
    pub fn distinct(&self, column: &str, predicate: Option<&Expr>) -> Result<Vec<KeyValue>> {
        Ok(self
            .group_count(&[column], predicate, GroupOrder::KeyAsc, None)?
            .into_iter()
            .filter_map(|g| g.keys.into_iter().next())
            .collect())
    }

    /// Draw up to `max_rows` rows without replacement from the matching
    /// rows that have every one of `columns` present.
    ///
    /// When the candidate set is no larger than `max_rows` all of it is
    /// returned. `seed` makes the draw reproducible. Only the drawn rows are
    /// ever collected.
    pub fn sample(
        &self,
        columns: &[&str],
        predicate: Option<&Expr>,
        max_rows: usize,
        seed: Option<u64>,
    ) -> Result<Sample> {
        self.require(columns)?;
        let keep: Vec<Expr> = columns.iter().map(|c| col(*c)).collect();
        let present = self.scan(predicate).select(keep.clone()).drop_nulls(None);

        let counted = present.clone().select([len().alias(COUNT)]).collect()?;
        let population = usize::try_from(first_u64(&counted, COUNT)?)?;
        if population <= max_rows {
            return Ok(Sample {
                rows: present.collect()?,
                population,
            });
        }

        // Positions are drawn once and joined back so every column keeps
        // the same rows.
        let numbered = present.with_row_index(ROW, None);
        let picked = numbered
            .clone()
            .select([col(ROW).sample_n(lit(max_rows as u64), false, false, seed)]);
        let rows = numbered
            .inner_join(picked, col(ROW), col(ROW))
            .sort_by_exprs([col(ROW)], SortMultipleOptions::default())
            .select(keep)
            .collect()?;
        Ok(Sample { rows, population })
    }

    /// Non-null values of an integer column, at most `limit` of them
    pub fn values(
        &self,
        column: &str,
        predicate: Option<&Expr>,
        limit: Option<usize>,
    ) -> Result<Vec<i64>> {
        self.require(&[column])?;
        let mut lf = self
            .scan(predicate)
            .select([col(column).cast(DataType::Int64)])
            .drop_nulls(None);
        if let Some(limit) = limit {
            lf = lf.limit(limit as IdxSize);
        }
        let df = lf.collect()?;
        Ok(df.column(column)?.i64()?.into_iter().flatten().collect())
    }

    fn require(&self, columns: &[&str]) -> Result<()> {
        match columns.iter().find(|c| !self.has_column(c)) {
            Some(missing) => Err(eyre!(
                "column '{}' not in {} table",
                missing,
                self.name
            )),
            None => Ok(()),
        }
    }
}

fn first_u64(df: &DataFrame, name: &str) -> Result<u64> {
    let column = df.column(name)?.cast(&DataType::UInt64)?;
    Ok(column.u64()?.get(0).unwrap_or(0))
}

fn key_values(column: &Column) -> Result<Vec<KeyValue>> {
    let dtype = column.dtype();
    if dtype.is_integer() {
        let ints = column.cast(&DataType::Int64)?;
        Ok(ints
            .i64()?
            .into_iter()
            .map(|v| KeyValue::Int(v.unwrap_or_default()))
            .collect())
    } else {
        let text = column.cast(&DataType::String)?;
        Ok(text
            .str()?
            .into_iter()
            .map(|v| KeyValue::Text(v.unwrap_or_default().to_string()))
            .collect())
    }
}
