//! The report views.
//!
//! Each view is a function of one table and the request's predicates that
//! returns a small, serializable result. Failures are contained per view:
//! a missing column family or a failing scan turns that view into
//! [`View::Unavailable`] and the rest of the report still computes.

use crate::filter::{FilterModel, Predicates};
use crate::schema::*;
use crate::source::Dataset;
use crate::table::{GroupCount, GroupOrder, KeyValue, Table};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use polars::prelude::*;
use serde::Serialize;
use std::time::Instant;

pub const VICTIM_LIMIT: usize = 5;
pub const FACTORS_LIMIT: usize = 10;
pub const VEHICLE_LIMIT: usize = 10;
/// Ages are kept only inside this open interval
pub const AGE_MIN_EXCLUSIVE: i64 = 0;
pub const AGE_MAX_EXCLUSIVE: i64 = 120;

pub const SEASONS: [&str; 4] = ["Spring", "Summer", "Fall", "Winter"];
pub const UNKNOWN_SEASON: &str = "Unknown";
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// A view result or the reason it could not be produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum View<T> {
    Ready { data: T },
    Unavailable { reason: String },
}

impl<T> View<T> {
    pub fn ready(data: T) -> Self {
        View::Ready { data }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        View::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            View::Ready { data } => Some(data),
            View::Unavailable { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, View::Ready { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub crashes: u64,
    pub injured: i64,
    pub killed: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourCount {
    pub hour: i32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapSample {
    pub points: Vec<MapPoint>,
    /// Matching rows with both coordinates, before sampling
    pub population: usize,
}

/// Crash counts pivoted to hours (rows) by weekdays (columns, Monday first)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heatmap {
    pub weekdays: Vec<String>,
    pub hours: Vec<i32>,
    pub cells: Vec<Vec<u64>>,
}

impl Heatmap {
    pub fn cell(&self, hour: i32, weekday: usize) -> Option<u64> {
        let row = self.hours.iter().position(|h| *h == hour)?;
        self.cells.get(row)?.get(weekday).copied()
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().flatten().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeValues {
    pub values: Vec<i64>,
    /// True when the row budget cut the values short
    pub limited: bool,
}

/// Row budgets and sampling seed applied to the heavy views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewLimits {
    pub map_sample_max: usize,
    pub age_row_max: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for ViewLimits {
    fn default() -> Self {
        Self {
            map_sample_max: 2000,
            age_row_max: None,
            seed: Some(42),
        }
    }
}

/// Everything one "generate" action produces. All fields are always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub filters: FilterModel,
    pub summary: View<Summary>,
    pub temporal: View<Vec<YearCount>>,
    pub borough: View<Vec<CategoryCount>>,
    pub hour: View<Vec<HourCount>>,
    pub victim: View<Vec<CategoryCount>>,
    pub factors: View<Vec<CategoryCount>>,
    pub vehicle: View<Vec<CategoryCount>>,
    pub map_sample: View<MapSample>,
    pub seasonal: View<Vec<CategoryCount>>,
    pub heatmap: View<Heatmap>,
    pub age: View<AgeValues>,
}

impl Report {
    pub fn unavailable_views(&self) -> Vec<&'static str> {
        let views = [
            ("summary", self.summary.is_ready()),
            ("temporal", self.temporal.is_ready()),
            ("borough", self.borough.is_ready()),
            ("hour", self.hour.is_ready()),
            ("victim", self.victim.is_ready()),
            ("factors", self.factors.is_ready()),
            ("vehicle", self.vehicle.is_ready()),
            ("map_sample", self.map_sample.is_ready()),
            ("seasonal", self.seasonal.is_ready()),
            ("heatmap", self.heatmap.is_ready()),
            ("age", self.age.is_ready()),
        ];
        views
            .into_iter()
            .filter(|(_, ready)| !ready)
            .map(|(name, _)| name)
            .collect()
    }
}

/// Compute every view for one filter model
pub fn build_report(
    dataset: &Dataset,
    filters: &FilterModel,
    predicates: &Predicates,
    limits: &ViewLimits,
) -> Report {
    let crash = &dataset.crash;
    let person = &dataset.person;
    let catalog = &dataset.catalog;
    let cp = predicates.crash();
    let pp = predicates.person();

    Report {
        filters: filters.clone(),
        summary: timed("summary", || summary(crash, cp)),
        temporal: timed("temporal", || temporal(crash, cp)),
        borough: timed("borough", || borough(crash, cp)),
        hour: timed("hour", || hour(crash, cp)),
        victim: timed("victim", || victim(person, catalog, pp)),
        factors: timed("factors", || factors(crash, catalog, cp)),
        vehicle: timed("vehicle", || vehicle(crash, catalog, cp)),
        map_sample: timed("map_sample", || map_sample(crash, cp, limits)),
        seasonal: timed("seasonal", || seasonal(crash, cp)),
        heatmap: timed("heatmap", || heatmap(crash, cp)),
        age: timed("age", || age(person, catalog, pp, limits)),
    }
}

fn timed<T>(name: &str, view: impl FnOnce() -> Result<View<T>>) -> View<T> {
    let started = Instant::now();
    let result = view();
    log::debug!("{} view in {:.2?}", name, started.elapsed());
    match result {
        Ok(view) => view,
        Err(err) => {
            log::warn!("{} view failed: {}", name, err);
            View::unavailable(err.to_string())
        }
    }
}

pub fn summary(crash: &Table, predicate: Option<&Expr>) -> Result<View<Summary>> {
    let (crashes, sums) = crash.totals(predicate, &[PERSONS_INJURED, PERSONS_KILLED])?;
    Ok(View::ready(Summary {
        crashes,
        injured: sums.first().copied().unwrap_or(0),
        killed: sums.get(1).copied().unwrap_or(0),
    }))
}

pub fn temporal(crash: &Table, predicate: Option<&Expr>) -> Result<View<Vec<YearCount>>> {
    let groups = crash.group_count(&[YEAR], predicate, GroupOrder::KeyAsc, None)?;
    let years = groups
        .iter()
        .map(|g| {
            Ok(YearCount {
                year: int_key(g, 0)?,
                count: g.count,
            })
        })
        .collect::<Result<_>>()?;
    Ok(View::ready(years))
}

pub fn borough(crash: &Table, predicate: Option<&Expr>) -> Result<View<Vec<CategoryCount>>> {
    let groups = crash.group_count(&[BOROUGH], predicate, GroupOrder::CountDesc, None)?;
    Ok(View::ready(categories(&groups)))
}

pub fn hour(crash: &Table, predicate: Option<&Expr>) -> Result<View<Vec<HourCount>>> {
    let groups = crash.group_count(&[HOUR], predicate, GroupOrder::KeyAsc, None)?;
    let hours = groups
        .iter()
        .map(|g| {
            Ok(HourCount {
                hour: int_key(g, 0)?,
                count: g.count,
            })
        })
        .collect::<Result<_>>()?;
    Ok(View::ready(hours))
}

pub fn victim(
    person: &Table,
    catalog: &SchemaCatalog,
    predicate: Option<&Expr>,
) -> Result<View<Vec<CategoryCount>>> {
    let Some(column) = catalog.person_type_column() else {
        return Ok(View::unavailable(format!("no {PERSON_TYPE} column")));
    };
    let groups = person.group_count(
        &[column],
        predicate,
        GroupOrder::CountDesc,
        Some(VICTIM_LIMIT),
    )?;
    Ok(View::ready(categories(&groups)))
}

/// Counts of the first contributing factor column only
pub fn factors(
    crash: &Table,
    catalog: &SchemaCatalog,
    predicate: Option<&Expr>,
) -> Result<View<Vec<CategoryCount>>> {
    let Some(column) = catalog.primary_factor_column() else {
        return Ok(View::unavailable("no contributing factor columns"));
    };
    let groups = crash.group_count(&[column], predicate, GroupOrder::CountDesc, Some(FACTORS_LIMIT))?;
    Ok(View::ready(categories(&groups)))
}

/// Counts of the first vehicle type column only, although the vehicle
/// filter matches on every vehicle column
pub fn vehicle(
    crash: &Table,
    catalog: &SchemaCatalog,
    predicate: Option<&Expr>,
) -> Result<View<Vec<CategoryCount>>> {
    let Some(column) = catalog.primary_vehicle_column() else {
        return Ok(View::unavailable("no vehicle type columns"));
    };
    let groups = crash.group_count(&[column], predicate, GroupOrder::CountDesc, Some(VEHICLE_LIMIT))?;
    Ok(View::ready(categories(&groups)))
}

pub fn map_sample(
    crash: &Table,
    predicate: Option<&Expr>,
    limits: &ViewLimits,
) -> Result<View<MapSample>> {
    let sample = crash.sample(
        &[LATITUDE, LONGITUDE],
        predicate,
        limits.map_sample_max,
        limits.seed,
    )?;
    let lat = sample.rows.column(LATITUDE)?.cast(&DataType::Float64)?;
    let lon = sample.rows.column(LONGITUDE)?.cast(&DataType::Float64)?;
    let points = lat
        .f64()?
        .into_iter()
        .zip(lon.f64()?)
        .filter_map(|(lat, lon)| {
            Some(MapPoint {
                latitude: lat?,
                longitude: lon?,
            })
        })
        .collect();
    Ok(View::ready(MapSample {
        points,
        population: sample.population,
    }))
}

/// Four seasons in fixed order, then `Unknown` when any row has no month
pub fn seasonal(crash: &Table, predicate: Option<&Expr>) -> Result<View<Vec<CategoryCount>>> {
    let groups = crash.group_count(&[SEASON], predicate, GroupOrder::KeyAsc, None)?;
    let count_of = |season: &str| {
        groups
            .iter()
            .filter(|g| g.keys.first().and_then(KeyValue::as_str) == Some(season))
            .map(|g| g.count)
            .sum::<u64>()
    };

    let mut seasons: Vec<CategoryCount> = SEASONS
        .iter()
        .map(|s| CategoryCount {
            category: s.to_string(),
            count: count_of(s),
        })
        .collect();
    let unknown = count_of(UNKNOWN_SEASON);
    if unknown > 0 {
        seasons.push(CategoryCount {
            category: UNKNOWN_SEASON.to_string(),
            count: unknown,
        });
    }
    Ok(View::ready(seasons))
}

pub fn heatmap(crash: &Table, predicate: Option<&Expr>) -> Result<View<Heatmap>> {
    let groups = crash.group_count(&[HOUR, WEEKDAY], predicate, GroupOrder::KeyAsc, None)?;

    let mut hours: Vec<i32> = Vec::new();
    let mut cells: Vec<Vec<u64>> = Vec::new();
    for g in &groups {
        let hour = int_key(g, 0)?;
        let weekday = int_key(g, 1)?;
        // ISO weekday: 1 = Monday
        let column = usize::try_from(weekday - 1)
            .ok()
            .filter(|c| *c < WEEKDAYS.len())
            .ok_or_else(|| eyre!("weekday out of range: {weekday}"))?;
        if hours.last() != Some(&hour) {
            hours.push(hour);
            cells.push(vec![0; WEEKDAYS.len()]);
        }
        if let Some(row) = cells.last_mut() {
            row[column] += g.count;
        }
    }

    Ok(View::ready(Heatmap {
        weekdays: WEEKDAYS.iter().map(|d| d.to_string()).collect(),
        hours,
        cells,
    }))
}

pub fn age(
    person: &Table,
    catalog: &SchemaCatalog,
    predicate: Option<&Expr>,
    limits: &ViewLimits,
) -> Result<View<AgeValues>> {
    let Some(column) = catalog.person_age_column() else {
        return Ok(View::unavailable(format!("no {PERSON_AGE} column")));
    };
    let in_domain = col(column)
        .gt(lit(AGE_MIN_EXCLUSIVE))
        .and(col(column).lt(lit(AGE_MAX_EXCLUSIVE)));
    let predicate = match predicate {
        Some(p) => p.clone().and(in_domain),
        None => in_domain,
    };

    // One extra row tells whether the budget cut anything off.
    let fetch = limits.age_row_max.map(|max| max + 1);
    let mut values = person.values(column, Some(&predicate), fetch)?;
    let limited = match limits.age_row_max {
        Some(max) if values.len() > max => {
            values.truncate(max);
            true
        }
        _ => false,
    };
    Ok(View::ready(AgeValues { values, limited }))
}

fn categories(groups: &[GroupCount]) -> Vec<CategoryCount> {
    groups
        .iter()
        .map(|g| CategoryCount {
            category: g.keys.first().map(|k| k.to_string()).unwrap_or_default(),
            count: g.count,
        })
        .collect()
}

fn int_key(group: &GroupCount, index: usize) -> Result<i32> {
    group
        .keys
        .get(index)
        .and_then(KeyValue::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| eyre!("expected an integer group key, got {:?}", group.keys))
}
