//! End-to-end run of the no-data safe combination against the real engine.
//!
//! Needs the GDAL library and the `gdal_calc` command line tool, so the
//! tests are ignored by default; run them with `cargo test -- --ignored`
//! on a machine with a full GDAL installation.

use std::path::Path;

use gdal::raster::Buffer;
use gdal::DriverManager;
use inf::feedback::LogFeedback;
use treatments::rastercalc::{self, CalcOptions};
use treatments::{expr, Registry};

const NODATA: f64 = expr::DEFAULT_NODATA;

fn write_raster(path: &Path, values: Vec<f64>) {
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<f64, _>(path, 2, 2, 1)
        .unwrap();
    dataset.set_geo_transform(&[0.0, 1.0, 0.0, 2.0, 0.0, -1.0]).unwrap();

    let mut band = dataset.rasterband(1).unwrap();
    band.set_no_data_value(Some(NODATA)).unwrap();
    let mut buffer = Buffer::new((2, 2), values);
    band.write((0, 0), (2, 2), &mut buffer).unwrap();
}

fn read_raster(path: &Path) -> (Vec<f64>, Option<f64>) {
    let dataset = gdal::Dataset::open(path).unwrap();
    let band = dataset.rasterband(1).unwrap();
    let nodata = band.no_data_value();
    (band.read_band_as::<f64>().unwrap().data().to_vec(), nodata)
}

#[test_log::test]
#[ignore = "requires the GDAL library and gdal_calc on PATH"]
fn nodata_safe_minimum_propagates_nodata() {
    let dir = tempfile::tempdir().unwrap();
    let a_path = dir.path().join("a.tif");
    let b_path = dir.path().join("b.tif");
    let out_path = dir.path().join("min.tif");

    write_raster(&a_path, vec![1.0, NODATA, 5.0, NODATA]);
    write_raster(&b_path, vec![3.0, 7.0, NODATA, NODATA]);

    let registry = Registry::with_default_providers();
    rastercalc::apply_raster_calc_min(&registry, &a_path, &b_path, &out_path, &CalcOptions::default(), &LogFeedback)
        .unwrap();

    let (values, nodata) = read_raster(&out_path);
    assert_eq!(values, vec![1.0, 7.0, 5.0, NODATA]);
    assert_eq!(nodata, Some(NODATA));
}

#[test_log::test]
#[ignore = "requires the GDAL library and gdal_calc on PATH"]
fn nodata_safe_minimum_is_commutative() {
    let dir = tempfile::tempdir().unwrap();
    let a_path = dir.path().join("a.tif");
    let b_path = dir.path().join("b.tif");
    let ab_path = dir.path().join("min_ab.tif");
    let ba_path = dir.path().join("min_ba.tif");

    write_raster(&a_path, vec![1.0, NODATA, 5.0, 2.5]);
    write_raster(&b_path, vec![3.0, 7.0, NODATA, 2.0]);

    let registry = Registry::with_default_providers();
    let options = CalcOptions::default();
    rastercalc::apply_raster_calc_min(&registry, &a_path, &b_path, &ab_path, &options, &LogFeedback).unwrap();
    rastercalc::apply_raster_calc_min(&registry, &b_path, &a_path, &ba_path, &options, &LogFeedback).unwrap();

    assert_eq!(read_raster(&ab_path).0, read_raster(&ba_path).0);
}
