//! Request-facing entry point.
//!
//! A [`Dashboard`] owns the opened [`Dataset`] behind an `Arc` and is cheap
//! to clone, so each concurrent request can hold its own handle. The tables
//! are never written after opening, so no locking is needed.

use crate::aggregate::{self, Report, ViewLimits};
use crate::config::AppConfig;
use crate::filter::{FilterModel, RawFilters};
use crate::schema::{SchemaCatalog, BOROUGH, YEAR};
use crate::search::{ParsedQuery, QueryParser};
use crate::source::{Dataset, OpenOptions};
use crate::table::{GroupOrder, KeyValue};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Values offered by the filter widgets, computed once at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub boroughs: Vec<String>,
    pub years: Vec<i32>,
    /// Most frequent values of the first vehicle column, alphabetical
    pub vehicle_types: Vec<String>,
    pub person_types: Vec<String>,
    pub crash_rows: u64,
    pub person_rows: u64,
}

impl FilterOptions {
    pub fn load(dataset: &Dataset, vehicle_options: usize) -> Result<Self> {
        let crash = &dataset.crash;
        let person = &dataset.person;

        let boroughs = texts(crash.distinct(BOROUGH, None)?);
        let years = crash
            .distinct(YEAR, None)?
            .iter()
            .filter_map(KeyValue::as_i64)
            .filter_map(|y| i32::try_from(y).ok())
            .collect();

        let mut vehicle_types = match dataset.catalog.primary_vehicle_column() {
            Some(column) => crash
                .group_count(&[column], None, GroupOrder::CountDesc, Some(vehicle_options))?
                .into_iter()
                .filter_map(|g| g.keys.into_iter().next())
                .map(|k| k.to_string())
                .collect(),
            None => Vec::new(),
        };
        vehicle_types.sort();

        let person_types = match dataset.catalog.person_type_column() {
            Some(column) => texts(person.distinct(column, None)?),
            None => Vec::new(),
        };

        Ok(Self {
            boroughs,
            years,
            vehicle_types,
            person_types,
            crash_rows: crash.count(None)?,
            person_rows: person.count(None)?,
        })
    }
}

fn texts(values: Vec<KeyValue>) -> Vec<String> {
    values.into_iter().map(|v| v.to_string()).collect()
}

#[derive(Clone)]
pub struct Dashboard {
    dataset: Arc<Dataset>,
    options: Arc<FilterOptions>,
    parser: Arc<QueryParser>,
    limits: ViewLimits,
}

impl Dashboard {
    /// Open the configured data files and build the option catalogs.
    /// Any failure here is fatal for the session.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let crash_path = config
            .data
            .crash_path
            .as_ref()
            .ok_or_else(|| eyre!("no crash data file configured (use --crash or COLLISION_DASH_CRASH_PATH)"))?;
        let person_path = config
            .data
            .person_path
            .as_ref()
            .ok_or_else(|| eyre!("no person data file configured (use --person or COLLISION_DASH_PERSON_PATH)"))?;

        let options = OpenOptions::from_config(config)?;
        let dataset = Dataset::open(crash_path, person_path, &options)?;
        let limits = ViewLimits {
            map_sample_max: config.limits.map_sample_max,
            age_row_max: config.limits.age_row_max,
            seed: config.sample_seed(),
        };
        Self::new(dataset, limits, config.limits.vehicle_options)
    }

    pub fn new(dataset: Dataset, limits: ViewLimits, vehicle_options: usize) -> Result<Self> {
        let started = Instant::now();
        let options = FilterOptions::load(&dataset, vehicle_options)?;
        log::info!(
            "{} crash rows, {} person rows, {} boroughs, {} years; options built in {:.2?}",
            options.crash_rows,
            options.person_rows,
            options.boroughs.len(),
            options.years.len(),
            started.elapsed()
        );
        let parser = QueryParser::new(
            options.boroughs.clone(),
            options.years.clone(),
            options.person_types.clone(),
        );
        Ok(Self {
            dataset: Arc::new(dataset),
            options: Arc::new(options),
            parser: Arc::new(parser),
            limits,
        })
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.dataset.catalog
    }

    pub fn limits(&self) -> ViewLimits {
        self.limits
    }

    pub fn apply_filters(&self, raw: &RawFilters) -> FilterModel {
        FilterModel::normalize(raw)
    }

    pub fn parse(&self, text: Option<&str>) -> ParsedQuery {
        self.parser.parse(text)
    }

    /// Merge a free-text query over the current selection
    pub fn search(&self, text: Option<&str>, current: &FilterModel) -> FilterModel {
        let parsed = self.parse(text);
        log::debug!("search {:?} resolved to {:?}", text, parsed);
        parsed.apply_to(current)
    }

    pub fn clear(&self) -> FilterModel {
        FilterModel::cleared()
    }

    pub fn generate_report(&self, filters: &FilterModel) -> Report {
        let started = Instant::now();
        let predicates = filters.predicates(&self.dataset.catalog);
        let report = aggregate::build_report(&self.dataset, filters, &predicates, &self.limits);

        let unavailable = report.unavailable_views();
        log::info!(
            "report generated in {:.2?} ({} unavailable view(s){})",
            started.elapsed(),
            unavailable.len(),
            if unavailable.is_empty() {
                String::new()
            } else {
                format!(": {}", unavailable.join(", "))
            }
        );
        report
    }
}
