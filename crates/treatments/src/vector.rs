//! Vector treatment proxies and the expression based selection helpers.
//!
//! The proxies assemble parameter maps for the `native` provider. The
//! selection/classification helpers at the bottom write features through
//! the engine's attribute filter into a fresh layer with provenance
//! attributes; a failed feature insertion there is an internal error.

use std::path::{Path, PathBuf};

use gdal::vector::{Feature, FieldValue, LayerAccess, LayerOptions, OGRFieldType};
use gdal::DriverManager;
use inf::Feedback;

use crate::parameters::{ParamValue, Parameters};
use crate::processing::Registry;
use crate::{layers, Error, Extent, Result};

/// Filter expression retained on a layer, applied when the selection is
/// saved
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub path: PathBuf,
    pub expression: Option<String>,
}

/// Extracts the features matching `expression` into a new layer
pub fn extract_by_expression(
    registry: &Registry,
    in_path: &Path,
    expression: &str,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    let parameters = Parameters::new()
        .set("EXPRESSION", expression)
        .set("INPUT", in_path)
        .set("OUTPUT", out_path);
    registry.run_for_output_path("native:extractbyexpression", &parameters, feedback)
}

/// Remembers a filter expression for a later save
pub fn select_by_expression(in_path: &Path, expression: &str) -> Selection {
    Selection {
        path: in_path.to_path_buf(),
        expression: Some(expression.to_string()),
    }
}

/// Writes the selected features (all of them for an unfiltered selection)
/// to a new layer
pub fn save_selected_features(
    registry: &Registry,
    selection: &Selection,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Save selected");
    let parameters = Parameters::new()
        .set("EXPRESSION", selection.expression.as_deref())
        .set("INPUT", selection.path.as_path())
        .set("OUTPUT", out_path);
    registry.run_for_output_path("native:saveselectedfeatures", &parameters, feedback)
}

/// Copies a layer in full
pub fn clone_layer(registry: &Registry, in_path: &Path, out_path: &Path, feedback: &dyn Feedback) -> Result<PathBuf> {
    let selection = Selection {
        path: in_path.to_path_buf(),
        expression: None,
    };
    save_selected_features(registry, &selection, out_path, feedback)
}

pub fn multi_to_single_geom(
    registry: &Registry,
    in_path: &Path,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Multi to single geometry");
    let parameters = Parameters::new().set("INPUT", in_path).set("OUTPUT", out_path);
    registry.run_for_output_path("native:multiparttosingleparts", &parameters, feedback)
}

pub fn dissolve_layer(registry: &Registry, in_path: &Path, out_path: &Path, feedback: &dyn Feedback) -> Result<PathBuf> {
    feedback.set_sub_text("Dissolve");
    let parameters = Parameters::new()
        .set("FIELD", Vec::<ParamValue>::new())
        .set("INPUT", in_path)
        .set("OUTPUT", out_path);
    registry.run_for_output_path("native:dissolve", &parameters, feedback)
}

/// Buffer defaults of the engine's buffer algorithm
const BUFFER_SEGMENTS: i64 = 5;
const BUFFER_MITER_LIMIT: f64 = 2.0;

/// Buffers with a per-feature distance expression over the layer's fields
pub fn apply_buffer_from_expr(
    registry: &Registry,
    in_path: &Path,
    expression: &str,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Buffering");
    let parameters = Parameters::new()
        .set("DISSOLVE", false)
        .set("DISTANCE_EXPRESSION", expression)
        .set("END_CAP_STYLE", 0)
        .set("INPUT", in_path)
        .set("JOIN_STYLE", 0)
        .set("MITER_LIMIT", BUFFER_MITER_LIMIT)
        .set("OUTPUT", out_path)
        .set("SEGMENTS", BUFFER_SEGMENTS);
    registry.run_for_output_path("native:buffer", &parameters, feedback)
}

pub fn apply_buffer(
    registry: &Registry,
    in_path: &Path,
    distance: f64,
    out_path: &Path,
    dissolve: bool,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Buffering");
    let parameters = Parameters::new()
        .set("DISSOLVE", dissolve)
        .set("DISTANCE", distance)
        .set("END_CAP_STYLE", 0)
        .set("INPUT", in_path)
        .set("JOIN_STYLE", 0)
        .set("MITER_LIMIT", BUFFER_MITER_LIMIT)
        .set("OUTPUT", out_path)
        .set("SEGMENTS", BUFFER_SEGMENTS);
    registry.run_for_output_path("native:buffer", &parameters, feedback)
}

pub fn merge_vector_layers(
    registry: &Registry,
    in_paths: &[&Path],
    crs: Option<&str>,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Merge vector layers");
    let layers: Vec<ParamValue> = in_paths.iter().map(|p| (*p).into()).collect();
    let parameters = Parameters::new()
        .set("CRS", crs)
        .set("LAYERS", layers)
        .set("OUTPUT", out_path);
    registry.run_for_output_path("native:mergevectorlayers", &parameters, feedback)
}

fn check_overlay_compatible(in_path: &Path, overlay_path: &Path) -> Result<()> {
    let input = layers::vector_info(in_path)?;
    let overlay = layers::vector_info(overlay_path)?;
    layers::check_layers_compatible(&input, &overlay)
}

fn run_overlay_algorithm(
    registry: &Registry,
    algorithm: &str,
    in_path: &Path,
    overlay_path: &Path,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    check_overlay_compatible(in_path, overlay_path)?;
    let parameters = Parameters::new()
        .set("INPUT", in_path)
        .set("OUTPUT", out_path)
        .set("OVERLAY", overlay_path);
    registry.run_for_output_path(algorithm, &parameters, feedback)
}

/// Removes the overlay area from the input features
pub fn apply_difference(
    registry: &Registry,
    in_path: &Path,
    diff_path: &Path,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Difference");
    run_overlay_algorithm(registry, "native:difference", in_path, diff_path, out_path, feedback)
}

/// Restricts the input features to the overlay area
pub fn apply_vector_clip(
    registry: &Registry,
    in_path: &Path,
    clip_path: &Path,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Clip");
    run_overlay_algorithm(registry, "native:clip", in_path, clip_path, out_path, feedback)
}

pub fn apply_intersection(
    registry: &Registry,
    in_path: &Path,
    overlay_path: &Path,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Intersection");
    run_overlay_algorithm(registry, "native:intersection", in_path, overlay_path, out_path, feedback)
}

/// Extracts the input features intersecting the other layer
pub fn select_intersection(
    registry: &Registry,
    in_path: &Path,
    intersect_path: &Path,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    let parameters = Parameters::new()
        .set("INPUT", in_path)
        .set("INTERSECT", intersect_path)
        .set("OUTPUT", out_path)
        .set("PREDICATE", vec![ParamValue::Int(0)]);
    registry.run_for_output_path("native:extractbylocation", &parameters, feedback)
}

pub fn clip_vector_by_extent(
    registry: &Registry,
    in_path: &Path,
    extent: Extent,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Clip");
    let parameters = Parameters::new()
        .set("EXTENT", extent)
        .set("INPUT", in_path)
        .set("OUTPUT", out_path);
    registry.run_for_output_path("gdal:clipvectorbyextent", &parameters, feedback)
}

pub fn apply_reproject_layer(
    registry: &Registry,
    in_path: &Path,
    target_crs: &str,
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Reproject");
    let parameters = Parameters::new()
        .set("INPUT", in_path)
        .set("OUTPUT", out_path)
        .set("TARGET_CRS", target_crs);
    registry.run_for_output_path("native:reprojectlayer", &parameters, feedback)
}

fn vector_driver_for(path: &Path) -> Result<gdal::Driver> {
    let driver_name = match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
        "gpkg" => "GPKG",
        "shp" => "ESRI Shapefile",
        "geojson" | "json" => "GeoJSON",
        other => {
            return Err(Error::InvalidInput(format!(
                "Unsupported vector output format: '{other}' ({})",
                path.to_string_lossy()
            )));
        }
    };

    Ok(DriverManager::get_driver_by_name(driver_name)?)
}

fn insert_filtered_features(
    in_layer: &mut gdal::vector::Layer,
    out_layer: &mut gdal::vector::Layer,
    expression: Option<&str>,
    fields: &[(&str, FieldValue)],
) -> Result<()> {
    match expression {
        Some(expression) => in_layer.set_attribute_filter(expression)?,
        None => in_layer.clear_attribute_filter(),
    }

    let names: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
    let values: Vec<FieldValue> = fields.iter().map(|(_, value)| value.clone()).collect();

    for feature in in_layer.features() {
        let geometry = feature
            .geometry()
            .ok_or_else(|| Error::Internal("Feature without geometry".to_string()))?;
        let mut feature = Feature::new(out_layer.defn())?;
        feature.set_geometry(geometry.clone())?;
        for (name, value) in names.iter().zip(values.iter()) {
            let idx = feature.field_index(name)?;
            feature.set_field(idx, value)?;
        }
        feature
            .create(out_layer)
            .map_err(|e| Error::Internal(format!("Feature insertion failed: {e}")))?;
    }

    Ok(())
}

/// Writes the features matching `expression` to a new layer carrying an
/// `Origin` attribute with the source layer name
pub fn select_geom_by_expression(in_path: &Path, expression: Option<&str>, out_path: &Path, out_name: &str) -> Result<()> {
    let recorder = inf::duration::Recorder::new();
    layers::remove_vector(out_path)?;

    let in_ds = layers::open_vector(in_path)?;
    let mut in_layer = in_ds.layer(0)?;
    let origin = layers::layer_name_of_path(in_path);

    let driver = vector_driver_for(out_path)?;
    let mut out_ds = driver.create_vector_only(out_path)?;
    let srs = in_layer.spatial_ref();
    let mut out_layer = out_ds.create_layer(LayerOptions {
        name: out_name,
        srs: srs.as_ref(),
        ty: in_layer.defn().geometry_type(),
        ..Default::default()
    })?;
    out_layer.create_defn_fields(&[("Origin", OGRFieldType::OFTString)])?;

    insert_filtered_features(
        &mut in_layer,
        &mut out_layer,
        expression,
        &[("Origin", FieldValue::StringValue(origin))],
    )?;

    log::debug!("select_geom_by_expression done in {recorder}");
    Ok(())
}

/// Writes every feature to a new layer with a binary `Value` attribute:
/// 1 when the feature matches `expression`, 0 when it does not, plus the
/// `Origin` provenance attribute
pub fn classify_by_expression(in_path: &Path, expression: Option<&str>, out_path: &Path, out_name: &str) -> Result<()> {
    layers::remove_vector(out_path)?;

    let in_ds = layers::open_vector(in_path)?;
    let mut in_layer = in_ds.layer(0)?;
    let origin = layers::layer_name_of_path(in_path);

    let driver = vector_driver_for(out_path)?;
    let mut out_ds = driver.create_vector_only(out_path)?;
    let srs = in_layer.spatial_ref();
    let mut out_layer = out_ds.create_layer(LayerOptions {
        name: out_name,
        srs: srs.as_ref(),
        ty: in_layer.defn().geometry_type(),
        ..Default::default()
    })?;
    out_layer.create_defn_fields(&[("Value", OGRFieldType::OFTInteger), ("Origin", OGRFieldType::OFTString)])?;

    insert_filtered_features(
        &mut in_layer,
        &mut out_layer,
        expression,
        &[
            ("Value", FieldValue::IntegerValue(1)),
            ("Origin", FieldValue::StringValue(origin.clone())),
        ],
    )?;

    if let Some(expression) = expression {
        let negated = format!("NOT({expression})");
        insert_filtered_features(
            &mut in_layer,
            &mut out_layer,
            Some(&negated),
            &[
                ("Value", FieldValue::IntegerValue(0)),
                ("Origin", FieldValue::StringValue(origin)),
            ],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::Outputs;
    use crate::processing::Provider;
    use inf::feedback::{FeedbackEvent, RecordingFeedback};
    use std::sync::{Arc, Mutex};

    struct RecordingNative {
        calls: Arc<Mutex<Vec<(String, Parameters)>>>,
    }

    impl Provider for RecordingNative {
        fn name(&self) -> &'static str {
            "native"
        }

        fn run(&self, algorithm: &str, parameters: &Parameters, _feedback: &dyn Feedback) -> Result<Outputs> {
            self.calls.lock().unwrap().push((algorithm.to_string(), parameters.clone()));
            Ok(Outputs::single(parameters.path("OUTPUT").unwrap()))
        }
    }

    fn recording_registry() -> (Registry, Arc<Mutex<Vec<(String, Parameters)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        registry.register(Box::new(RecordingNative { calls: calls.clone() }));
        (registry, calls)
    }

    #[test]
    fn dissolve_reports_its_sub_task_and_dispatches() {
        let (registry, calls) = recording_registry();
        let feedback = RecordingFeedback::new();

        let output = dissolve_layer(&registry, Path::new("/data/zones.gpkg"), Path::new("/data/out.gpkg"), &feedback).unwrap();
        assert_eq!(output, PathBuf::from("/data/out.gpkg"));

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, "dissolve");
        assert_eq!(calls[0].1.list("FIELD").unwrap(), &[]);
        assert!(feedback.events().contains(&FeedbackEvent::SubText("Dissolve".into())));
    }

    #[test]
    fn buffer_from_expr_uses_the_engine_defaults() {
        let (registry, calls) = recording_registry();
        let feedback = RecordingFeedback::new();

        apply_buffer_from_expr(
            &registry,
            Path::new("/data/roads.gpkg"),
            "\"width\" * 2",
            Path::new("/data/out.gpkg"),
            &feedback,
        )
        .unwrap();

        let calls = calls.lock().unwrap();
        let (algorithm, parameters) = &calls[0];
        assert_eq!(algorithm, "buffer");
        assert_eq!(parameters.string("DISTANCE_EXPRESSION").unwrap(), "\"width\" * 2");
        assert!(!parameters.flag("DISSOLVE").unwrap());
        assert_eq!(parameters.int("SEGMENTS").unwrap(), 5);
        assert_eq!(parameters.int("END_CAP_STYLE").unwrap(), 0);
        assert_eq!(parameters.float("MITER_LIMIT").unwrap(), 2.0);
    }

    #[test]
    fn saving_an_unfiltered_selection_copies_the_layer() {
        let (registry, calls) = recording_registry();
        let feedback = RecordingFeedback::new();

        clone_layer(&registry, Path::new("/data/zones.gpkg"), Path::new("/data/copy.gpkg"), &feedback).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, "saveselectedfeatures");
        assert!(!calls[0].1.contains("EXPRESSION"));
    }

    #[test]
    fn selection_keeps_the_expression_for_the_save() {
        let selection = select_by_expression(Path::new("/data/zones.gpkg"), "\"class\" = 1");
        assert_eq!(selection.expression.as_deref(), Some("\"class\" = 1"));

        let (registry, calls) = recording_registry();
        let feedback = RecordingFeedback::new();
        save_selected_features(&registry, &selection, Path::new("/data/out.gpkg"), &feedback).unwrap();
        assert_eq!(calls.lock().unwrap()[0].1.string("EXPRESSION").unwrap(), "\"class\" = 1");
    }

    #[test]
    fn select_intersection_requests_the_intersects_predicate() {
        let (registry, calls) = recording_registry();
        let feedback = RecordingFeedback::new();

        select_intersection(
            &registry,
            Path::new("/data/zones.gpkg"),
            Path::new("/data/grid.gpkg"),
            Path::new("/data/out.gpkg"),
            &feedback,
        )
        .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].0, "extractbylocation");
        assert_eq!(calls[0].1.list("PREDICATE").unwrap(), &[ParamValue::Int(0)]);
    }

    #[test]
    fn unsupported_output_formats_are_user_errors() {
        let err = match vector_driver_for(Path::new("/data/out.xyz")) {
            Ok(_) => panic!("expected an error for an unsupported output format"),
            Err(err) => err,
        };
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
