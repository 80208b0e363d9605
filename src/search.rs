//! Free-text search box: best-effort mapping of a phrase onto filter values.
//!
//! Each dimension is matched independently against a known catalog of
//! values; the first catalog entry that appears in the text wins. Vehicle
//! types are never read from text.

use crate::filter::{FilterModel, Selection};
use serde::Serialize;

/// Result of parsing a phrase; `None`/empty means the dimension was not found
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedQuery {
    pub borough: Option<String>,
    pub year: Option<i32>,
    pub person_types: Vec<String>,
}

impl ParsedQuery {
    pub fn is_empty(&self) -> bool {
        self.borough.is_none() && self.year.is_none() && self.person_types.is_empty()
    }

    /// Merge into `current`: only resolved dimensions are replaced
    pub fn apply_to(&self, current: &FilterModel) -> FilterModel {
        let mut merged = current.clone();
        if let Some(borough) = &self.borough {
            merged.boroughs = Selection::only([borough.clone()]);
        }
        if let Some(year) = self.year {
            merged.years = Selection::only([year]);
        }
        if !self.person_types.is_empty() {
            merged.person_types = Selection::only(self.person_types.iter().cloned());
        }
        merged
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryParser {
    boroughs: Vec<String>,
    years: Vec<i32>,
    person_types: Vec<String>,
}

impl QueryParser {
    /// Catalog order decides which value wins when several appear. Blank
    /// entries are dropped since every phrase would contain them.
    pub fn new(boroughs: Vec<String>, years: Vec<i32>, person_types: Vec<String>) -> Self {
        Self {
            boroughs: non_blank(boroughs),
            years,
            person_types: non_blank(person_types),
        }
    }

    pub fn parse(&self, text: Option<&str>) -> ParsedQuery {
        let query = match text.map(str::trim) {
            Some(q) if !q.is_empty() => q.to_lowercase(),
            _ => return ParsedQuery::default(),
        };

        let borough = self
            .boroughs
            .iter()
            .find(|b| query.contains(&b.to_lowercase()))
            .cloned();
        let year = self
            .years
            .iter()
            .copied()
            .find(|y| query.contains(&y.to_string()));

        let person_types = if query.contains("pedestrian") {
            self.person_types_containing(&["pedestrian"])
        } else if query.contains("cyclist") || query.contains("bicyclist") {
            self.person_types_containing(&["cyclist", "bicyclist"])
        } else {
            Vec::new()
        };

        ParsedQuery {
            borough,
            year,
            person_types,
        }
    }

    fn person_types_containing(&self, needles: &[&str]) -> Vec<String> {
        self.person_types
            .iter()
            .filter(|t| {
                let t = t.to_lowercase();
                needles.iter().any(|n| t.contains(n))
            })
            .cloned()
            .collect()
    }
}

fn non_blank(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .filter(|v| !v.trim().is_empty())
        .collect()
}
