//! Loading, removing and introspecting raster/vector datasets.
//!
//! Missing or unreadable files are user errors. Statistics that the engine
//! can compute (min/max) are delegated to it, only light introspection
//! (unique values, medians) reads the band directly.

use std::collections::BTreeMap;
use std::path::Path;

use gdal::spatial_ref::SpatialRef;
use gdal::vector::{FieldValue, LayerAccess};
use gdal::Dataset;

use crate::{Error, Extent, Result};

/// Sidecars the engine writes next to a raster
const RASTER_SIDECARS: [&str; 2] = [".aux.xml", ".ovr"];

pub fn check_file_exists(path: &Path, description: &str) -> Result {
    if !path.is_file() {
        return Err(Error::InvalidInput(format!(
            "{description}'{}' does not exist",
            path.to_string_lossy()
        )));
    }

    Ok(())
}

/// Layer name derived from the file name, as the engine does
pub fn layer_name_of_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

pub fn open_raster(path: &Path) -> Result<Dataset> {
    check_file_exists(path, "")?;
    let ds = Dataset::open(path)
        .map_err(|e| Error::InvalidInput(format!("Invalid raster layer '{}': {e}", path.to_string_lossy())))?;
    if ds.raster_count() == 0 {
        return Err(Error::InvalidInput(format!(
            "Invalid raster layer '{}': no raster bands",
            path.to_string_lossy()
        )));
    }

    Ok(ds)
}

pub fn open_vector(path: &Path) -> Result<Dataset> {
    check_file_exists(path, "")?;
    let ds = Dataset::open(path)
        .map_err(|e| Error::InvalidInput(format!("Invalid vector layer '{}': {e}", path.to_string_lossy())))?;
    if ds.layer_count() == 0 {
        return Err(Error::InvalidInput(format!(
            "Invalid vector layer '{}': no layers",
            path.to_string_lossy()
        )));
    }

    Ok(ds)
}

/// Delete a raster file together with its sidecar files
pub fn remove_raster(path: &Path) -> Result {
    inf::fs::remove_with_sidecars(path, &RASTER_SIDECARS)?;
    Ok(())
}

pub fn remove_vector(path: &Path) -> Result {
    inf::fs::remove_file_if_exists(path)?;
    Ok(())
}

/// The identification of a layer that matters for combining it with another
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerInfo {
    pub name: String,
    /// Lowercase authority id (e.g. `epsg:2154`), when known
    pub crs: Option<String>,
    /// Geometry type display name for vector layers
    pub geometry_type: Option<String>,
}

/// Checks CRS and geometry compatibility of two layers, rejecting the pair
/// before any geometry operation runs on it
pub fn check_layers_compatible(first: &LayerInfo, second: &LayerInfo) -> Result {
    if first.crs != second.crs {
        return Err(Error::InvalidInput(format!(
            "Layer {} SRID '{}' not compatible with SRID '{}' of layer {}",
            first.name,
            first.crs.as_deref().unwrap_or("unknown"),
            second.crs.as_deref().unwrap_or("unknown"),
            second.name
        )));
    }

    if first.geometry_type != second.geometry_type {
        return Err(Error::InvalidInput(format!(
            "Layer {} geometry '{}' not compatible with geometry '{}' of layer {}",
            first.name,
            first.geometry_type.as_deref().unwrap_or("unknown"),
            second.geometry_type.as_deref().unwrap_or("unknown"),
            second.name
        )));
    }

    Ok(())
}

pub fn raster_info(path: &Path) -> Result<LayerInfo> {
    let ds = open_raster(path)?;
    Ok(LayerInfo {
        name: layer_name_of_path(path),
        crs: ds.spatial_ref().ok().as_ref().and_then(authid_of_srs),
        geometry_type: None,
    })
}

pub fn vector_info(path: &Path) -> Result<LayerInfo> {
    let ds = open_vector(path)?;
    let layer = ds.layer(0)?;
    Ok(LayerInfo {
        name: layer_name_of_path(path),
        crs: layer.spatial_ref().as_ref().and_then(authid_of_srs),
        geometry_type: Some(geometry_type_name(layer.defn().geometry_type())),
    })
}

/// Identify a layer of either kind, trying vector first like the engine's
/// generic loader
pub fn layer_info(path: &Path) -> Result<LayerInfo> {
    match vector_info(path) {
        Ok(info) => Ok(info),
        Err(_) => raster_info(path)
            .map_err(|_| Error::InvalidInput(format!("Could not load layer '{}'", path.to_string_lossy()))),
    }
}

/// Lowercase `authority:code` of a spatial reference, when it carries one
pub fn authid_of_srs(srs: &SpatialRef) -> Option<String> {
    let name = srs.auth_name()?;
    let code = srs.auth_code().ok()?;
    Some(format!("{}:{}", name.to_lowercase(), code))
}

fn geometry_type_name(geometry_type: gdal_sys::OGRwkbGeometryType::Type) -> String {
    let name = unsafe { gdal_sys::OGRGeometryTypeToName(geometry_type) };
    if name.is_null() {
        return "Unknown".to_string();
    }

    unsafe { std::ffi::CStr::from_ptr(name) }.to_string_lossy().into_owned()
}

pub fn extent_of_raster(path: &Path) -> Result<Extent> {
    let ds = open_raster(path)?;
    let transform = ds.geo_transform()?;
    let (columns, rows) = ds.raster_size();

    let x_edge = transform[0] + transform[1] * columns as f64;
    let y_edge = transform[3] + transform[5] * rows as f64;
    Ok([
        transform[0].min(x_edge),
        transform[3].min(y_edge),
        transform[0].max(x_edge),
        transform[3].max(y_edge),
    ])
}

pub fn extent_of_vector(path: &Path) -> Result<Extent> {
    let ds = open_vector(path)?;
    let layer = ds.layer(0)?;
    let envelope = layer.get_extent()?;
    Ok([envelope.MinX, envelope.MinY, envelope.MaxX, envelope.MaxY])
}

/// Extent of a layer of either kind, vector first
pub fn extent_of_layer(path: &Path) -> Result<Extent> {
    extent_of_vector(path).or_else(|_| extent_of_raster(path))
}

pub fn raster_nodata_value(path: &Path) -> Result<Option<f64>> {
    let ds = open_raster(path)?;
    Ok(ds.rasterband(1)?.no_data_value())
}

/// Distinct band values, no-data excluded, sorted ascending
pub fn raster_unique_values(path: &Path) -> Result<Vec<f64>> {
    let ds = open_raster(path)?;
    let band = ds.rasterband(1)?;
    let nodata = band.no_data_value();
    let buffer = band.read_band_as::<f64>()?;

    let mut values: Vec<f64> = buffer
        .data()
        .iter()
        .copied()
        .filter(|v| !v.is_nan() && Some(*v) != nodata)
        .collect();
    values.sort_by(|a, b| a.partial_cmp(b).expect("non-nan values compare"));
    values.dedup();
    Ok(values)
}

/// Unique band values narrowed to integers when every value is integral
#[derive(Clone, Debug, PartialEq)]
pub enum UniqueValues {
    Integer(Vec<i64>),
    Real(Vec<f64>),
}

pub fn raster_unique_values_narrowed(path: &Path) -> Result<UniqueValues> {
    let values = raster_unique_values(path)?;
    if values.iter().all(|v| v.fract() == 0.0) {
        Ok(UniqueValues::Integer(values.into_iter().map(|v| v as i64).collect()))
    } else {
        Ok(UniqueValues::Real(values))
    }
}

/// Combined minimum and maximum over several rasters, computed by the engine
pub fn rasters_min_max(paths: &[&Path]) -> Result<(f64, f64)> {
    if paths.is_empty() {
        return Err(Error::InvalidInput("No rasters provided".to_string()));
    }

    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for path in paths {
        let ds = open_raster(path)?;
        let stats = ds.rasterband(1)?.compute_raster_min_max(false)?;
        min = min.min(stats.min);
        max = max.max(stats.max);
    }

    Ok((min, max))
}

/// Minimum, median and maximum of a band, the shape the renderers consume
pub fn raster_min_med_max(path: &Path) -> Result<(f64, f64, f64)> {
    let ds = open_raster(path)?;
    let band = ds.rasterband(1)?;
    let nodata = band.no_data_value();
    let buffer = band.read_band_as::<f64>()?;

    let mut values: Vec<f64> = buffer
        .data()
        .iter()
        .copied()
        .filter(|v| !v.is_nan() && Some(*v) != nodata)
        .collect();
    if values.is_empty() {
        return Err(Error::InvalidInput(format!("Empty layer: '{}'", path.to_string_lossy())));
    }

    values.sort_by(|a, b| a.partial_cmp(b).expect("non-nan values compare"));
    let median = values[values.len() / 2];
    Ok((values[0], median, values[values.len() - 1]))
}

fn render_field_value(value: &FieldValue) -> String {
    match value {
        FieldValue::StringValue(v) => v.clone(),
        FieldValue::IntegerValue(v) => v.to_string(),
        FieldValue::Integer64Value(v) => v.to_string(),
        FieldValue::RealValue(v) => v.to_string(),
        other => format!("{other:?}"),
    }
}

fn check_field_exists<L: LayerAccess>(layer: &L, field: &str, path: &Path) -> Result {
    let exists = layer.defn().fields().any(|f| f.name() == field);
    if !exists {
        return Err(Error::Internal(format!(
            "No field named '{field}' in layer {}",
            path.to_string_lossy()
        )));
    }

    Ok(())
}

/// Distinct values of a vector field, rendered as strings
pub fn vector_field_values(path: &Path, field: &str) -> Result<Vec<String>> {
    let ds = open_vector(path)?;
    let mut layer = ds.layer(0)?;
    check_field_exists(&layer, field, path)?;

    let mut values = Vec::new();
    for feature in layer.features() {
        if let Some(value) = feature.field(feature.field_index(field)?)? {
            let rendered = render_field_value(&value);
            if !values.contains(&rendered) {
                values.push(rendered);
            }
        }
    }

    Ok(values)
}

/// Distinct `key -> [values]` associations over two fields of a layer
pub fn vector_layer_assocs(path: &Path, key_field: &str, val_field: &str) -> Result<BTreeMap<String, Vec<String>>> {
    let ds = open_vector(path)?;
    let mut layer = ds.layer(0)?;
    check_field_exists(&layer, key_field, path)?;
    check_field_exists(&layer, val_field, path)?;

    let mut assocs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for feature in layer.features() {
        let (Some(key), Some(value)) = (feature.field(feature.field_index(key_field)?)?, feature.field(feature.field_index(val_field)?)?) else {
            continue;
        };
        let key = render_field_value(&key);
        let value = render_field_value(&value);
        let entry = assocs.entry(key).or_default();
        if !entry.contains(&value) {
            entry.push(value);
        }
    }

    Ok(assocs)
}

/// Name of the geometry column the engine's SQL dialect sees for this layer
pub(crate) fn geometry_column_name<L: LayerAccess>(layer: &L) -> String {
    let name = layer
        .defn()
        .geom_fields()
        .next()
        .map(|f| f.name())
        .unwrap_or_default();
    if name.is_empty() {
        "geometry".to_string()
    } else {
        name
    }
}

/// Attribute field names of a layer, quoted for use in SQL
pub(crate) fn quoted_field_names<L: LayerAccess>(layer: &L) -> Vec<String> {
    layer.defn().fields().map(|f| format!("\"{}\"", f.name())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, crs: Option<&str>, geometry: Option<&str>) -> LayerInfo {
        LayerInfo {
            name: name.to_string(),
            crs: crs.map(str::to_string),
            geometry_type: geometry.map(str::to_string),
        }
    }

    #[test]
    fn differing_crs_is_rejected_before_any_geometry_work() {
        let first = info("zones", Some("epsg:2154"), Some("Polygon"));
        let second = info("paths", Some("epsg:4326"), Some("Polygon"));
        let err = check_layers_compatible(&first, &second).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("epsg:2154"));
        assert!(err.to_string().contains("epsg:4326"));
    }

    #[test]
    fn differing_geometry_types_are_rejected() {
        let first = info("zones", Some("epsg:2154"), Some("Polygon"));
        let second = info("paths", Some("epsg:2154"), Some("Line String"));
        assert!(check_layers_compatible(&first, &second).is_err());
    }

    #[test]
    fn matching_layers_pass() {
        let first = info("zones", Some("epsg:2154"), Some("Polygon"));
        let second = info("grid", Some("epsg:2154"), Some("Polygon"));
        check_layers_compatible(&first, &second).unwrap();
        // raster infos carry no geometry type
        let raster_a = info("cost", Some("epsg:2154"), None);
        let raster_b = info("start", Some("epsg:2154"), None);
        check_layers_compatible(&raster_a, &raster_b).unwrap();
    }

    #[test]
    fn layer_name_comes_from_the_file_stem() {
        assert_eq!(layer_name_of_path(Path::new("/data/forest_disp_1000.tif")), "forest_disp_1000");
        assert_eq!(layer_name_of_path(Path::new("zones.gpkg")), "zones");
    }

    #[test]
    fn missing_files_are_user_errors() {
        let err = check_file_exists(Path::new("/nonexistent/layer.tif"), "Buffer input layer ").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("Buffer input layer"));
    }
}
