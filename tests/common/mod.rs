#![allow(dead_code)]

use collision_dash::source::OpenOptions;
use collision_dash::{Backend, Dashboard, Dataset, ViewLimits};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Crash rows kept after load (two fixture rows fall outside 2015-2025 or
/// have no parseable date)
pub const CRASH_ROWS: u64 = 10;
pub const PERSON_ROWS: u64 = 8;

pub fn crash_frame() -> DataFrame {
    df!(
        "COLLISION_ID" => &["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12"],
        "CRASH DATE" => &[
            "2020-01-15", "2020-02-03", "2020-07-04", "2021-03-21", "2021-06-30", "2021-10-11",
            "2022-12-24", "2022-04-05", "2014-05-05", "not a date", "2023-09-09", "2025-08-08",
        ],
        "CRASH TIME" => &[
            "8:30", "17:10", "23:45", "0:05", "12:00", "", "19:20", "7:50", "10:00", "10:00",
            "9:09", "14:00",
        ],
        "BOROUGH" => &[
            "BRONX", "QUEENS", "BROOKLYN", "BROOKLYN", "MANHATTAN", "", "BROOKLYN",
            "STATEN ISLAND", "BRONX", "QUEENS", "QUEENS", "BRONX",
        ],
        "LATITUDE" => &[
            "40.85", "40.72", "", "40.65", "40.78", "40.70", "40.66", "40.58", "40.85", "40.72",
            "40.74", "40.84",
        ],
        "LONGITUDE" => &[
            "-73.88", "-73.79", "", "-73.95", "-73.97", "-73.90", "-73.94", "-74.15", "-73.88",
            "-73.79", "-73.80", "-73.86",
        ],
        "NUMBER OF PERSONS INJURED" => &["1", "0", "2", "0", "3", "1", "1", "0", "5", "5", "", "2"],
        "NUMBER OF PERSONS KILLED" => &["0", "0", "0", "1", "0", "0", "0", "0", "1", "1", "", "0"],
        "CONTRIBUTING FACTOR VEHICLE 1" => &[
            "Driver Inattention/Distraction", "Unspecified", "Following Too Closely",
            "Unspecified", "Driver Inattention/Distraction", "", "Unspecified", "Unspecified",
            "Unspecified", "Unspecified", "Unspecified", "Driver Inattention/Distraction",
        ],
        "CONTRIBUTING FACTOR VEHICLE 2" => &[
            "", "", "Unspecified", "", "", "", "", "", "", "", "", "",
        ],
        "VEHICLE TYPE CODE 1" => &[
            "Sedan", "Sedan", "Taxi", "", "Bus", "Sedan", "Sedan", "Pick-up Truck", "Sedan",
            "Sedan", "Sedan", "Station Wagon/Sport Utility Vehicle",
        ],
        "VEHICLE TYPE CODE 2" => &[
            "", "", "Sedan", "", "Sedan", "", "Bike", "", "", "", "", "",
        ]
    )
    .unwrap()
}

pub fn person_frame() -> DataFrame {
    df!(
        "UNIQUE_ID" => &["p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8", "p9"],
        "COLLISION_ID" => &["1", "3", "3", "4", "5", "7", "7", "12", "9"],
        "CRASH DATE" => &[
            "2020-01-15", "2020-07-04", "2020-07-04", "2021-03-21", "2021-06-30", "2022-12-24",
            "2022-12-24", "2025-08-08", "2014-05-05",
        ],
        "CRASH TIME" => &["8:30", "23:45", "23:45", "0:05", "12:00", "19:20", "19:20", "14:00", "10:00"],
        "BOROUGH" => &[
            "BRONX", "BROOKLYN", "BROOKLYN", "BROOKLYN", "MANHATTAN", "BROOKLYN", "BROOKLYN",
            "BRONX", "BRONX",
        ],
        "PERSON_TYPE" => &[
            "Occupant", "Pedestrian", "Occupant", "Pedestrian", "Bicyclist", "Pedestrian",
            "Occupant", "Other Motorized", "Occupant",
        ],
        "PERSON_INJURY" => &[
            "Injured", "Injured", "Unspecified", "Killed", "Injured", "Injured", "Unspecified",
            "Injured", "Injured",
        ],
        "PERSON_AGE" => &["34", "8", "0", "71", "27", "150", "", "45", "40"],
        "PERSON_SEX" => &["M", "F", "M", "F", "M", "F", "M", "F", "M"]
    )
    .unwrap()
}

/// Fixture CSVs written into a temp dir that lives as long as the value
pub struct Fixture {
    pub dir: TempDir,
    pub crash: PathBuf,
    pub person: PathBuf,
}

pub fn write_csv(path: &Path, df: &mut DataFrame) {
    let mut file = File::create(path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
}

pub fn csv_fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let crash = dir.path().join("crashes.csv");
    let person = dir.path().join("persons.csv");
    write_csv(&crash, &mut crash_frame());
    write_csv(&person, &mut person_frame());
    Fixture { dir, crash, person }
}

pub fn open(fixture: &Fixture, backend: Backend) -> Dashboard {
    let options = OpenOptions::new().with_backend(backend);
    let dataset = Dataset::open(&fixture.crash, &fixture.person, &options).unwrap();
    Dashboard::new(dataset, ViewLimits::default(), 30).unwrap()
}
