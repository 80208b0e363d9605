//! Column names of the two collision tables and the startup-time catalog of
//! the column families whose names vary between dataset releases.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::Serialize;

pub const COLLISION_ID: &str = "COLLISION_ID";
pub const CRASH_DATE: &str = "CRASH DATE";
pub const CRASH_TIME: &str = "CRASH TIME";
pub const BOROUGH: &str = "BOROUGH";
pub const LATITUDE: &str = "LATITUDE";
pub const LONGITUDE: &str = "LONGITUDE";
pub const PERSONS_INJURED: &str = "NUMBER OF PERSONS INJURED";
pub const PERSONS_KILLED: &str = "NUMBER OF PERSONS KILLED";
pub const PERSON_TYPE: &str = "PERSON_TYPE";
pub const PERSON_AGE: &str = "PERSON_AGE";
pub const PERSON_SEX: &str = "PERSON_SEX";
pub const PERSON_INJURY: &str = "PERSON_INJURY";

// Derived when a table is opened
pub const YEAR: &str = "YEAR";
pub const MONTH: &str = "MONTH";
pub const HOUR: &str = "HOUR";
pub const WEEKDAY: &str = "WEEKDAY";
pub const SEASON: &str = "SEASON";

pub const VEHICLE_TYPE_PATTERN: &str = "VEHICLE TYPE CODE";
pub const CONTRIBUTING_FACTOR_PATTERN: &str = "CONTRIBUTING FACTOR";

pub const CRASH_REQUIRED: &[&str] = &[
    CRASH_DATE,
    CRASH_TIME,
    BOROUGH,
    LATITUDE,
    LONGITUDE,
    PERSONS_INJURED,
    PERSONS_KILLED,
];
pub const PERSON_REQUIRED: &[&str] = &[CRASH_DATE, BOROUGH];

/// Column families and optional person columns found in the two tables.
///
/// Built once when the dataset is opened; every query reads from it and
/// nothing re-derives column lists afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaCatalog {
    vehicle_type_columns: Vec<String>,
    contributing_factor_columns: Vec<String>,
    person_type_column: Option<String>,
    person_age_column: Option<String>,
}

impl SchemaCatalog {
    /// Classify the raw column names of the crash and person tables.
    ///
    /// Fails only when a required column is missing; absent families are
    /// recorded as empty and handled by the views that need them.
    pub fn discover<C, P>(crash_columns: C, person_columns: P) -> Result<Self>
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let crash: Vec<String> = crash_columns
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect();
        let person: Vec<String> = person_columns
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect();

        require_columns("crash", &crash, CRASH_REQUIRED)?;
        require_columns("person", &person, PERSON_REQUIRED)?;

        Ok(Self {
            vehicle_type_columns: columns_containing(&crash, VEHICLE_TYPE_PATTERN),
            contributing_factor_columns: columns_containing(&crash, CONTRIBUTING_FACTOR_PATTERN),
            person_type_column: find_column(&person, PERSON_TYPE),
            person_age_column: find_column(&person, PERSON_AGE),
        })
    }

    /// All vehicle type columns in source order
    pub fn vehicle_type_columns(&self) -> &[String] {
        &self.vehicle_type_columns
    }

    /// All contributing factor columns in source order
    pub fn contributing_factor_columns(&self) -> &[String] {
        &self.contributing_factor_columns
    }

    /// The vehicle column used by the vehicle view and the vehicle options.
    /// Filtering still looks at every vehicle column.
    pub fn primary_vehicle_column(&self) -> Option<&str> {
        self.vehicle_type_columns.first().map(String::as_str)
    }

    /// The factor column used by the factors view. Later factor columns are
    /// not counted.
    pub fn primary_factor_column(&self) -> Option<&str> {
        self.contributing_factor_columns.first().map(String::as_str)
    }

    pub fn person_type_column(&self) -> Option<&str> {
        self.person_type_column.as_deref()
    }

    pub fn person_age_column(&self) -> Option<&str> {
        self.person_age_column.as_deref()
    }

    pub fn has_person_type(&self) -> bool {
        self.person_type_column.is_some()
    }

    pub fn has_person_age(&self) -> bool {
        self.person_age_column.is_some()
    }
}

fn columns_containing(columns: &[String], pattern: &str) -> Vec<String> {
    let pattern = pattern.to_uppercase();
    columns
        .iter()
        .filter(|c| c.to_uppercase().contains(&pattern))
        .cloned()
        .collect()
}

fn find_column(columns: &[String], name: &str) -> Option<String> {
    columns.iter().find(|c| c.eq_ignore_ascii_case(name)).cloned()
}

fn require_columns(table: &str, columns: &[String], required: &[&str]) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| !columns.iter().any(|c| c == name))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(eyre!(
            "{} table is missing required column(s): {}",
            table,
            missing.join(", ")
        ))
    }
}
