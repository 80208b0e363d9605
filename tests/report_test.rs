mod common;

use collision_dash::aggregate::{CategoryCount, SEASONS, WEEKDAYS};
use collision_dash::filter::Selection;
use collision_dash::schema::{COLLISION_ID, LATITUDE, LONGITUDE};
use collision_dash::{
    Backend, Dashboard, Dataset, FilterModel, OpenOptions, RawFilters, ViewLimits,
};
use common::{crash_frame, csv_fixture, open, person_frame, write_csv, CRASH_ROWS, PERSON_ROWS};
use polars::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn names(values: &[&str]) -> Selection<String> {
    Selection::only(values.iter().map(|v| v.to_string()))
}

#[test]
fn all_sentinel_matches_unfiltered_table() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);
    assert_eq!(dash.options().crash_rows, CRASH_ROWS);
    assert_eq!(dash.options().person_rows, PERSON_ROWS);

    let model = dash.apply_filters(&serde_json::from_value::<RawFilters>(json!({
        "boroughs": "ALL",
        "years": ["ALL"],
        "vehicle_types": null,
    }))
    .unwrap());
    assert!(model.is_vacuous());

    let report = dash.generate_report(&model);
    let summary = report.summary.data().unwrap();
    assert_eq!(summary.crashes, CRASH_ROWS);
    assert_eq!(summary.injured, 10);
    assert_eq!(summary.killed, 1);
    assert!(report.unavailable_views().is_empty());
}

#[test]
fn rows_outside_year_range_never_appear() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);
    assert_eq!(dash.options().years, vec![2020, 2021, 2022, 2023, 2025]);

    let report = dash.generate_report(&FilterModel::default());
    let years: Vec<i32> = report.temporal.data().unwrap().iter().map(|y| y.year).collect();
    assert_eq!(years, vec![2020, 2021, 2022, 2023, 2025]);
}

#[test]
fn vehicle_filter_matches_any_vehicle_column() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);

    let sedan = FilterModel {
        vehicle_types: names(&["Sedan"]),
        ..FilterModel::default()
    };
    let sedan_or_truck = FilterModel {
        vehicle_types: names(&["Sedan", "Truck"]),
        ..FilterModel::default()
    };
    // Crashes 1, 2, 6, 7, 11 have Sedan first; 3 and 5 only in the second column
    for model in [&sedan, &sedan_or_truck] {
        let report = dash.generate_report(model);
        assert_eq!(report.summary.data().map(|s| s.crashes), Some(7));
    }

    // The vehicle view still counts only the first column
    let report = dash.generate_report(&sedan);
    let top = report.vehicle.data().unwrap();
    assert_eq!(
        top[0],
        CategoryCount {
            category: "Sedan".into(),
            count: 5
        }
    );
}

#[test]
fn crash_without_vehicles_never_matches_a_vehicle_filter() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);
    let dataset_catalog = dash.catalog().clone();

    let model = FilterModel {
        vehicle_types: names(&["Sedan", "Taxi", "Bus", "Bike", "Pick-up Truck"]),
        boroughs: names(&["BROOKLYN"]),
        years: Selection::only([2021]),
        ..FilterModel::default()
    };
    // Crash 4 (Brooklyn 2021) has no vehicle types at all
    let report = dash.generate_report(&model);
    assert_eq!(report.summary.data().map(|s| s.crashes), Some(0));
    assert_eq!(dataset_catalog.vehicle_type_columns().len(), 2);
}

#[test]
fn dimensions_are_conjunctions_of_set_membership() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);
    let model = FilterModel {
        boroughs: names(&["BRONX", "QUEENS"]),
        years: Selection::only([2020]),
        ..FilterModel::default()
    };
    let report = dash.generate_report(&model);
    assert_eq!(report.summary.data().map(|s| s.crashes), Some(2));
    let by_borough = report.borough.data().unwrap();
    assert_eq!(by_borough.len(), 2);
    assert!(by_borough.iter().all(|b| b.category == "BRONX" || b.category == "QUEENS"));

    // The person table narrows with the same borough/year selection
    let victims = report.victim.data().unwrap();
    assert_eq!(victims.iter().map(|v| v.count).sum::<u64>(), 1);
}

#[test]
fn person_type_filter_only_narrows_person_views() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);
    let model = dash.search(Some("pedestrian"), &dash.clear());
    let report = dash.generate_report(&model);

    assert_eq!(report.summary.data().map(|s| s.crashes), Some(CRASH_ROWS));
    let victims = report.victim.data().unwrap();
    assert_eq!(victims.len(), 1);
    assert_eq!(victims[0].category, "Pedestrian");
    assert_eq!(victims[0].count, 3);
    // Ages 8 and 71; 150 is outside the valid domain
    assert_eq!(report.age.data().map(|a| a.values.clone()), Some(vec![8, 71]));
}

#[test]
fn search_then_clear() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);

    let current = FilterModel {
        vehicle_types: names(&["Sedan"]),
        ..FilterModel::default()
    };
    let model = dash.search(Some("Brooklyn 2022 pedestrian crashes"), &current);
    assert_eq!(model.boroughs, names(&["BROOKLYN"]));
    assert_eq!(model.years, Selection::only([2022]));
    assert_eq!(model.person_types, Selection::only(["Pedestrian".to_string()]));
    assert_eq!(model.vehicle_types, current.vehicle_types);

    assert_eq!(dash.search(None, &model), model);
    assert_eq!(dash.search(Some(""), &model), model);

    let cleared = dash.clear();
    assert!(cleared.is_vacuous());
}

#[test]
fn blank_categories_are_missing_values() {
    let dir = TempDir::new().unwrap();
    let crash = dir.path().join("crashes.csv");
    let person = dir.path().join("persons.csv");
    let mut frame = crash_frame();
    // Crash 6 already has a quoted "" borough; crash 1 gets a whitespace one
    let mut boroughs: Vec<String> = frame
        .column("BOROUGH")
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .map(|b| b.unwrap_or_default().to_string())
        .collect();
    boroughs[0] = " ".to_string();
    frame
        .with_column(Series::new("BOROUGH".into(), boroughs))
        .unwrap();
    write_csv(&crash, &mut frame);
    write_csv(&person, &mut person_frame());
    let dataset = Dataset::open(&crash, &person, &OpenOptions::new()).unwrap();
    let dash = Dashboard::new(dataset, ViewLimits::default(), 30).unwrap();

    let options = dash.options();
    assert_eq!(options.boroughs, vec!["BRONX", "BROOKLYN", "MANHATTAN", "QUEENS", "STATEN ISLAND"]);
    assert!(options.vehicle_types.iter().all(|v| !v.trim().is_empty()));

    let parsed = dash.parse(Some("Brooklyn 2022 pedestrian crashes"));
    assert_eq!(parsed.borough.as_deref(), Some("BROOKLYN"));

    let report = dash.generate_report(&FilterModel::default());
    let by_borough = report.borough.data().unwrap();
    assert!(by_borough.iter().all(|b| !b.category.trim().is_empty()));
    // Crashes 1 and 6 have no borough
    assert_eq!(by_borough.iter().map(|b| b.count).sum::<u64>(), CRASH_ROWS - 2);
    let vehicles = report.vehicle.data().unwrap();
    assert!(vehicles.iter().all(|v| !v.category.is_empty()));
    // Crash 4 has no vehicle types
    assert_eq!(vehicles.iter().map(|v| v.count).sum::<u64>(), CRASH_ROWS - 1);
}

#[test]
fn map_sample_size_is_min_of_budget_and_rows_with_coordinates() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);

    // Crash 3 has no coordinates
    let report = dash.generate_report(&FilterModel::default());
    let sample = report.map_sample.data().unwrap();
    assert_eq!(sample.population, 9);
    assert_eq!(sample.points.len(), 9);

    let brooklyn = FilterModel {
        boroughs: names(&["BROOKLYN"]),
        ..FilterModel::default()
    };
    let report = dash.generate_report(&brooklyn);
    assert_eq!(report.map_sample.data().map(|s| s.points.len()), Some(2));
}

#[test]
fn map_sample_respects_budget() {
    let fixture = csv_fixture();
    let dataset = Dataset::open(&fixture.crash, &fixture.person, &OpenOptions::new()).unwrap();
    let limits = ViewLimits {
        map_sample_max: 4,
        ..ViewLimits::default()
    };
    let dash = Dashboard::new(dataset, limits, 30).unwrap();
    let report = dash.generate_report(&FilterModel::default());
    let sample = report.map_sample.data().unwrap();
    assert_eq!(sample.points.len(), 4);
    assert_eq!(sample.population, 9);
}

#[test]
fn temporal_shapes_are_fixed() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);
    let report = dash.generate_report(&FilterModel::default());

    let seasons: Vec<&str> = report
        .seasonal
        .data()
        .unwrap()
        .iter()
        .map(|s| s.category.as_str())
        .collect();
    assert_eq!(seasons, SEASONS.to_vec());

    let heatmap = report.heatmap.data().unwrap();
    assert_eq!(heatmap.weekdays, WEEKDAYS.to_vec());
    // Crash 6 has no time and drops out of the hour-based views only
    assert_eq!(heatmap.total(), 9);
    let hours = report.hour.data().unwrap();
    assert_eq!(hours.iter().map(|h| h.count).sum::<u64>(), 9);
    assert_eq!(hours.first().map(|h| h.hour), Some(0));
    // 2020-02-03 17:10 was a Monday
    assert_eq!(heatmap.cell(17, 0), Some(1));
}

#[test]
fn ages_are_strictly_inside_domain() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);
    let report = dash.generate_report(&FilterModel::default());
    let ages = report.age.data().unwrap();
    assert_eq!(ages.values.len(), 5);
    assert!(ages.values.iter().all(|a| *a > 0 && *a < 120));
    assert!(!ages.limited);
}

#[test]
fn factors_use_first_column_only() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);
    let report = dash.generate_report(&FilterModel::default());
    let factors = report.factors.data().unwrap();
    assert_eq!(factors[0].category, "Unspecified");
    assert_eq!(factors[0].count, 5);
    assert_eq!(factors.iter().map(|f| f.count).sum::<u64>(), 9);
}

#[test]
fn reports_are_idempotent() {
    let fixture = csv_fixture();
    let dash = open(&fixture, Backend::Memory);
    let model = FilterModel {
        boroughs: names(&["BROOKLYN", "BRONX"]),
        ..FilterModel::default()
    };
    assert_eq!(dash.generate_report(&model), dash.generate_report(&model));
}

#[test]
fn count_equals_scan_length() {
    let fixture = csv_fixture();
    let dataset = Dataset::open(&fixture.crash, &fixture.person, &OpenOptions::new()).unwrap();

    let models = [
        FilterModel::default(),
        FilterModel {
            boroughs: names(&["BROOKLYN"]),
            ..FilterModel::default()
        },
        FilterModel {
            years: Selection::only([2021, 2022]),
            vehicle_types: names(&["Sedan"]),
            ..FilterModel::default()
        },
        FilterModel {
            boroughs: names(&["NOWHERE"]),
            ..FilterModel::default()
        },
    ];
    for model in &models {
        let predicates = model.predicates(&dataset.catalog);
        let count = dataset.crash.count(predicates.crash()).unwrap();
        let scanned = dataset.crash.scan(predicates.crash()).collect().unwrap();
        assert_eq!(count, scanned.height() as u64);
    }
}

#[test]
fn vehicle_disjunction_by_collision_id() {
    let fixture = csv_fixture();
    let dataset = Dataset::open(&fixture.crash, &fixture.person, &OpenOptions::new()).unwrap();
    let model = FilterModel {
        vehicle_types: names(&["Sedan"]),
        ..FilterModel::default()
    };
    let predicates = model.predicates(&dataset.catalog);
    let ids = dataset
        .crash
        .scan(predicates.crash())
        .select([col(COLLISION_ID).cast(DataType::String)])
        .collect()
        .unwrap();
    let mut ids: Vec<String> = ids
        .column(COLLISION_ID)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect();
    ids.sort_by_key(|id| id.parse::<u32>().unwrap());
    // Crash 1 is ["Sedan", null]; crash 4 is [null, null]
    assert_eq!(ids, vec!["1", "2", "3", "5", "6", "7", "11"]);

    let with_coords = dataset
        .crash
        .sample(&[LATITUDE, LONGITUDE], predicates.crash(), 100, None)
        .unwrap();
    assert_eq!(with_coords.population, 6);
}
