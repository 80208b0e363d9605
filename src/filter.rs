//! The user's current selection and its translation into table predicates.

use crate::schema::{SchemaCatalog, BOROUGH, PERSON_TYPE, YEAR};
use polars::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeSet;

/// Sentinel accepted from the UI (and emitted in JSON) for "no filter"
pub const ALL: &str = "ALL";

/// One filter dimension: everything, or a non-empty set of values
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection<T: Ord> {
    #[default]
    All,
    Only(BTreeSet<T>),
}

impl<T: Ord> Selection<T> {
    /// A set selection; an empty set is `All`
    pub fn only<I: IntoIterator<Item = T>>(values: I) -> Self {
        let set: BTreeSet<T> = values.into_iter().collect();
        if set.is_empty() {
            Selection::All
        } else {
            Selection::Only(set)
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    pub fn values(&self) -> Option<&BTreeSet<T>> {
        match self {
            Selection::All => None,
            Selection::Only(set) => Some(set),
        }
    }
}

impl<T: Ord + Serialize> Serialize for Selection<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Selection::All => serializer.serialize_str(ALL),
            Selection::Only(set) => set.serialize(serializer),
        }
    }
}

/// Selection as it arrives from a widget or request body, before validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFilters {
    pub boroughs: Option<Value>,
    pub years: Option<Value>,
    pub vehicle_types: Option<Value>,
    pub person_types: Option<Value>,
}

impl RawFilters {
    /// Raw filters from repeated command-line values; an empty list is absent
    pub fn from_lists(
        boroughs: &[String],
        years: &[String],
        vehicle_types: &[String],
        person_types: &[String],
    ) -> Self {
        fn list(values: &[String]) -> Option<Value> {
            if values.is_empty() {
                None
            } else {
                Some(Value::Array(
                    values.iter().cloned().map(Value::String).collect(),
                ))
            }
        }
        Self {
            boroughs: list(boroughs),
            years: list(years),
            vehicle_types: list(vehicle_types),
            person_types: list(person_types),
        }
    }
}

/// Validated, immutable filter selection for one request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FilterModel {
    pub boroughs: Selection<String>,
    pub years: Selection<i32>,
    pub vehicle_types: Selection<String>,
    pub person_types: Selection<String>,
}

impl FilterModel {
    /// Normalize raw input. Never fails: a malformed dimension becomes `All`.
    pub fn normalize(raw: &RawFilters) -> Self {
        Self {
            boroughs: normalize("borough", raw.boroughs.as_ref(), text_item),
            years: normalize("year", raw.years.as_ref(), year_item),
            vehicle_types: normalize("vehicle type", raw.vehicle_types.as_ref(), text_item),
            person_types: normalize("person type", raw.person_types.as_ref(), text_item),
        }
    }

    /// Every dimension reset to `All`
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn is_vacuous(&self) -> bool {
        self.boroughs.is_all()
            && self.years.is_all()
            && self.vehicle_types.is_all()
            && self.person_types.is_all()
    }

    /// Translate into per-table predicates. Done once per request.
    pub fn predicates(&self, catalog: &SchemaCatalog) -> Predicates {
        let mut crash = Vec::new();
        let mut person = Vec::new();

        if let Some(boroughs) = self.boroughs.values() {
            crash.push(text_in(BOROUGH, boroughs));
            person.push(text_in(BOROUGH, boroughs));
        }
        if let Some(years) = self.years.values() {
            crash.push(year_in(years));
            person.push(year_in(years));
        }
        if let Some(vehicles) = self.vehicle_types.values() {
            // Any vehicle column may match, not just the first.
            let any_vehicle = catalog
                .vehicle_type_columns()
                .iter()
                .map(|c| text_in(c, vehicles))
                .reduce(|a, b| a.or(b));
            match any_vehicle {
                Some(expr) => crash.push(expr),
                None => log::warn!("no vehicle type columns; ignoring vehicle filter"),
            }
        }
        if let Some(types) = self.person_types.values() {
            match catalog.person_type_column() {
                Some(column) => person.push(text_in(column, types)),
                None => log::warn!("no {} column; ignoring person type filter", PERSON_TYPE),
            }
        }

        Predicates {
            crash: conjunction(crash),
            person: conjunction(person),
        }
    }
}

/// Native predicates for both tables; `None` matches every row
#[derive(Debug, Clone, Default)]
pub struct Predicates {
    pub crash: Option<Expr>,
    pub person: Option<Expr>,
}

impl Predicates {
    pub fn crash(&self) -> Option<&Expr> {
        self.crash.as_ref()
    }

    pub fn person(&self) -> Option<&Expr> {
        self.person.as_ref()
    }
}

fn text_in(column: &str, values: &BTreeSet<String>) -> Expr {
    values
        .iter()
        .map(|v| col(column).eq(lit(v.clone())))
        .reduce(|a, b| a.or(b))
        .unwrap_or_else(|| lit(false))
}

fn year_in(years: &BTreeSet<i32>) -> Expr {
    years
        .iter()
        .map(|y| col(YEAR).eq(lit(*y)))
        .reduce(|a, b| a.or(b))
        .unwrap_or_else(|| lit(false))
}

fn conjunction(clauses: Vec<Expr>) -> Option<Expr> {
    clauses.into_iter().reduce(|a, b| a.and(b))
}

fn normalize<T: Ord>(
    dimension: &str,
    value: Option<&Value>,
    item: fn(&Value) -> Option<T>,
) -> Selection<T> {
    let items: Vec<&Value> = match value {
        None | Some(Value::Null) => return Selection::All,
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    };

    let mut set = BTreeSet::new();
    for value in items {
        if let Value::String(s) = value {
            if s.trim().eq_ignore_ascii_case(ALL) {
                return Selection::All;
            }
        }
        if is_blank(value) {
            continue;
        }
        match item(value) {
            Some(v) => {
                set.insert(v);
            }
            None => {
                log::warn!("malformed {} selection {}; using {}", dimension, value, ALL);
                return Selection::All;
            }
        }
    }
    Selection::only(set)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn text_item(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

fn year_item(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
