//! The `native` provider: vector algorithms.
//!
//! Geometry work is delegated to the engine's SQL dialect (ST_Union,
//! ST_Buffer, ST_Difference, ST_Intersection run on GEOS inside the
//! engine) or to plain vector translate options (`-where`,
//! `-explodecollections`, `-t_srs`). Operations over two datasets first
//! copy both into a scratch package so a single SQL statement can see
//! them side by side.

use std::path::{Path, PathBuf};

use gdal::vector::LayerAccess;
use inf::Feedback;
use itertools::Itertools;

use crate::parameters::{Outputs, Parameters};
use crate::processing::Provider;
use crate::scratch::Scratch;
use crate::{engine, layers, Error, Result};

/// Layer names used inside the scratch package
const INPUT_LAYER: &str = "input";
const OVERLAY_LAYER: &str = "overlay";
/// Geometry column name of layers written into the scratch package
const SCRATCH_GEOMETRY: &str = "geom";

pub struct NativeProvider;

impl Provider for NativeProvider {
    fn name(&self) -> &'static str {
        "native"
    }

    fn run(&self, algorithm: &str, parameters: &Parameters, _feedback: &dyn Feedback) -> Result<Outputs> {
        match algorithm {
            "extractbyexpression" => run_extract_by_expression(parameters),
            "saveselectedfeatures" => run_save_selected_features(parameters),
            "multiparttosingleparts" => run_multi_to_single(parameters),
            "reprojectlayer" => run_reproject(parameters),
            "mergevectorlayers" => run_merge_layers(parameters),
            "dissolve" => run_dissolve(parameters),
            "buffer" => run_buffer(parameters),
            "difference" => run_overlay(parameters, OverlayOperation::Difference),
            "clip" => run_overlay(parameters, OverlayOperation::Clip),
            "intersection" => run_overlay(parameters, OverlayOperation::Intersection),
            "extractbylocation" => run_extract_by_location(parameters),
            other => Err(Error::InvalidInput(format!("Unknown algorithm: 'native:{other}'"))),
        }
    }
}

fn translate_input(params: &Parameters, options: Vec<String>) -> Result<Outputs> {
    let input = params.path("INPUT")?.to_path_buf();
    let output = params.path("OUTPUT")?.to_path_buf();
    let src = layers::open_vector(&input)?;
    engine::vector_translate_to_disk(&src, &output, &options)?;
    Ok(Outputs::single(output))
}

fn run_extract_by_expression(params: &Parameters) -> Result<Outputs> {
    let expression = params.string("EXPRESSION")?.to_string();
    translate_input(params, vec!["-where".to_string(), expression])
}

fn run_save_selected_features(params: &Parameters) -> Result<Outputs> {
    let options = match params.opt_string("EXPRESSION")? {
        Some(expression) => vec!["-where".to_string(), expression.to_string()],
        None => Vec::new(),
    };
    translate_input(params, options)
}

fn run_multi_to_single(params: &Parameters) -> Result<Outputs> {
    translate_input(params, vec!["-explodecollections".to_string()])
}

fn run_reproject(params: &Parameters) -> Result<Outputs> {
    let target_crs = params.string("TARGET_CRS")?.to_string();
    translate_input(params, vec!["-t_srs".to_string(), target_crs])
}

fn run_merge_layers(params: &Parameters) -> Result<Outputs> {
    let output = params.path("OUTPUT")?.to_path_buf();
    let inputs = params.list("LAYERS")?;
    if inputs.is_empty() {
        return Err(Error::InvalidInput("Merge needs at least one input layer".to_string()));
    }

    let layer_name = layers::layer_name_of_path(&output);
    for (index, value) in inputs.iter().enumerate() {
        let path = value
            .as_path()
            .ok_or_else(|| Error::InvalidInput("Merge inputs must be paths".to_string()))?;
        let src = layers::open_vector(path)?;

        let mut options = vec!["-nln".to_string(), layer_name.clone()];
        if let Some(crs) = params.opt_string("CRS")? {
            options.push("-t_srs".to_string());
            options.push(crs.to_string());
        }
        if index > 0 {
            options.push("-update".to_string());
            options.push("-append".to_string());
        }
        engine::vector_translate_to_disk(&src, &output, &options)?;
    }

    Ok(Outputs::single(output))
}

/// `SELECT` list holding the combined geometry first and the attribute
/// columns after it
fn select_list(geometry_expr: &str, attributes: &[String]) -> String {
    let mut columns = vec![format!("{geometry_expr} AS {SCRATCH_GEOMETRY}")];
    columns.extend(attributes.iter().cloned());
    columns.join(", ")
}

pub(crate) fn dissolve_sql(layer: &str, geometry: &str, fields: &[String]) -> String {
    if fields.is_empty() {
        format!("SELECT ST_Union(\"{geometry}\") AS {geometry} FROM \"{layer}\"")
    } else {
        let field_list = fields.iter().join(", ");
        format!(
            "SELECT ST_Union(\"{geometry}\") AS {geometry}, {field_list} FROM \"{layer}\" GROUP BY {field_list}"
        )
    }
}

pub(crate) fn buffer_sql(layer: &str, geometry: &str, distance: &str, dissolve: bool, attributes: &[String]) -> String {
    let buffered = format!("ST_Buffer(\"{geometry}\", {distance})");
    if dissolve {
        format!("SELECT ST_Union({buffered}) AS {geometry} FROM \"{layer}\"")
    } else {
        let columns = {
            let mut columns = vec![format!("{buffered} AS {geometry}")];
            columns.extend(attributes.iter().cloned());
            columns.join(", ")
        };
        format!("SELECT {columns} FROM \"{layer}\"")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OverlayOperation {
    Difference,
    Clip,
    Intersection,
}

pub(crate) fn overlay_sql(operation: OverlayOperation, attributes: &[String]) -> String {
    let overlay_union = format!("(SELECT ST_Union({SCRATCH_GEOMETRY}) FROM {OVERLAY_LAYER})");
    let prefixed: Vec<String> = attributes.iter().map(|a| format!("i.{a}")).collect();
    match operation {
        OverlayOperation::Difference => {
            let difference = format!("ST_Difference(i.{SCRATCH_GEOMETRY}, {overlay_union})");
            format!(
                "SELECT {} FROM {INPUT_LAYER} i WHERE {difference} IS NOT NULL",
                select_list(&difference, &prefixed)
            )
        }
        OverlayOperation::Clip => {
            let intersection = format!("ST_Intersection(i.{SCRATCH_GEOMETRY}, {overlay_union})");
            format!(
                "SELECT {} FROM {INPUT_LAYER} i WHERE ST_Intersects(i.{SCRATCH_GEOMETRY}, {overlay_union})",
                select_list(&intersection, &prefixed)
            )
        }
        OverlayOperation::Intersection => {
            let intersection = format!("ST_Intersection(i.{SCRATCH_GEOMETRY}, o.{SCRATCH_GEOMETRY})");
            format!(
                "SELECT {} FROM {INPUT_LAYER} i JOIN {OVERLAY_LAYER} o \
                 ON ST_Intersects(i.{SCRATCH_GEOMETRY}, o.{SCRATCH_GEOMETRY})",
                select_list(&intersection, &prefixed)
            )
        }
    }
}

pub(crate) fn extract_by_location_sql() -> String {
    format!(
        "SELECT i.* FROM {INPUT_LAYER} i WHERE EXISTS \
         (SELECT 1 FROM {OVERLAY_LAYER} o WHERE ST_Intersects(i.{SCRATCH_GEOMETRY}, o.{SCRATCH_GEOMETRY}))"
    )
}

fn run_dissolve(params: &Parameters) -> Result<Outputs> {
    let input = params.path("INPUT")?.to_path_buf();
    let output = params.path("OUTPUT")?.to_path_buf();

    let fields: Vec<String> = match params.get("FIELD") {
        None => Vec::new(),
        Some(crate::ParamValue::List(values)) => values
            .iter()
            .map(|v| {
                v.as_str()
                    .map(|s| format!("\"{s}\""))
                    .ok_or_else(|| Error::InvalidInput("Parameter 'FIELD' must hold field names".to_string()))
            })
            .collect::<Result<_>>()?,
        Some(_) => return Err(Error::InvalidInput("Parameter 'FIELD' is not a list".to_string())),
    };

    let src = layers::open_vector(&input)?;
    let (layer_name, geometry) = {
        let layer = src.layer(0)?;
        (layer.name(), layers::geometry_column_name(&layer))
    };

    let sql = dissolve_sql(&layer_name, &geometry, &fields);
    run_sql(&src, &output, &sql)
}

fn run_buffer(params: &Parameters) -> Result<Outputs> {
    let input = params.path("INPUT")?.to_path_buf();
    let output = params.path("OUTPUT")?.to_path_buf();
    let dissolve = params.flag("DISSOLVE")?;

    // a plain distance or a SQL expression over the layer's fields
    let distance = match (params.opt_float("DISTANCE")?, params.opt_string("DISTANCE_EXPRESSION")?) {
        (_, Some(expression)) => expression.to_string(),
        (Some(distance), None) => crate::expr::operand(distance),
        (None, None) => return Err(Error::InvalidInput("Buffer needs a DISTANCE or DISTANCE_EXPRESSION".to_string())),
    };

    let src = layers::open_vector(&input)?;
    let (layer_name, geometry, attributes) = {
        let layer = src.layer(0)?;
        (
            layer.name(),
            layers::geometry_column_name(&layer),
            layers::quoted_field_names(&layer),
        )
    };

    let sql = buffer_sql(&layer_name, &geometry, &distance, dissolve, &attributes);
    run_sql(&src, &output, &sql)
}

fn run_sql(src: &gdal::Dataset, output: &Path, sql: &str) -> Result<Outputs> {
    let options = vec![
        "-dialect".to_string(),
        "SQLITE".to_string(),
        "-sql".to_string(),
        sql.to_string(),
        "-nln".to_string(),
        layers::layer_name_of_path(output),
    ];
    engine::vector_translate_to_disk(src, output, &options)?;
    Ok(Outputs::single(output.to_path_buf()))
}

/// Copies the input (and overlay) into a scratch package whose layer and
/// geometry column names the SQL statements rely on
fn build_scratch_package(input: &Path, overlay: Option<&Path>) -> Result<(Scratch, PathBuf)> {
    let scratch = Scratch::from_config()?;
    let package = scratch.path("overlay_input.gpkg");

    let src = layers::open_vector(input)?;
    engine::vector_translate_to_disk(
        &src,
        &package,
        &[
            "-f".to_string(),
            "GPKG".to_string(),
            "-nln".to_string(),
            INPUT_LAYER.to_string(),
            "-lco".to_string(),
            format!("GEOMETRY_NAME={SCRATCH_GEOMETRY}"),
        ],
    )?;

    if let Some(overlay) = overlay {
        let overlay_src = layers::open_vector(overlay)?;
        engine::vector_translate_to_disk(
            &overlay_src,
            &package,
            &[
                "-update".to_string(),
                "-nln".to_string(),
                OVERLAY_LAYER.to_string(),
                "-lco".to_string(),
                format!("GEOMETRY_NAME={SCRATCH_GEOMETRY}"),
            ],
        )?;
    }

    Ok((scratch, package))
}

fn run_overlay(params: &Parameters, operation: OverlayOperation) -> Result<Outputs> {
    let input = params.path("INPUT")?.to_path_buf();
    let overlay = params.path("OVERLAY")?.to_path_buf();
    let output = params.path("OUTPUT")?.to_path_buf();

    let (_scratch, package) = build_scratch_package(&input, Some(&overlay))?;
    let package_ds = layers::open_vector(&package)?;

    let attributes = {
        let src = layers::open_vector(&input)?;
        let layer = src.layer(0)?;
        layers::quoted_field_names(&layer)
    };

    let sql = overlay_sql(operation, &attributes);
    run_sql(&package_ds, &output, &sql)
}

fn run_extract_by_location(params: &Parameters) -> Result<Outputs> {
    let input = params.path("INPUT")?.to_path_buf();
    let intersect = params.path("INTERSECT")?.to_path_buf();
    let output = params.path("OUTPUT")?.to_path_buf();

    // only the intersects predicate of the engine encoding is supported
    if let Some(predicates) = params.get("PREDICATE") {
        let only_intersects = match predicates {
            crate::ParamValue::List(values) => values.iter().all(|v| v.as_int() == Some(0)),
            _ => false,
        };
        if !only_intersects {
            return Err(Error::InvalidInput("Only the 'intersects' predicate is supported".to_string()));
        }
    }

    let (_scratch, package) = build_scratch_package(&input, Some(&intersect))?;
    let package_ds = layers::open_vector(&package)?;
    run_sql(&package_ds, &output, &extract_by_location_sql())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dissolve_sql_shapes() {
        assert_eq!(
            dissolve_sql("zones", "geometry", &[]),
            "SELECT ST_Union(\"geometry\") AS geometry FROM \"zones\""
        );
        assert_eq!(
            dissolve_sql("zones", "geom", &["\"class\"".to_string()]),
            "SELECT ST_Union(\"geom\") AS geom, \"class\" FROM \"zones\" GROUP BY \"class\""
        );
    }

    #[test]
    fn buffer_sql_keeps_attributes_unless_dissolving() {
        let sql = buffer_sql("roads", "geometry", "100", false, &["\"kind\"".to_string()]);
        assert_eq!(
            sql,
            "SELECT ST_Buffer(\"geometry\", 100) AS geometry, \"kind\" FROM \"roads\""
        );

        let sql = buffer_sql("roads", "geometry", "\"width\"*2", true, &["\"kind\"".to_string()]);
        assert_eq!(
            sql,
            "SELECT ST_Union(ST_Buffer(\"geometry\", \"width\"*2)) AS geometry FROM \"roads\""
        );
    }

    #[test]
    fn overlay_sql_uses_the_scratch_layer_names() {
        let sql = overlay_sql(OverlayOperation::Difference, &["\"kind\"".to_string()]);
        assert!(sql.contains("ST_Difference(i.geom, (SELECT ST_Union(geom) FROM overlay))"));
        assert!(sql.contains("FROM input i"));
        assert!(sql.contains("i.\"kind\""));

        let sql = overlay_sql(OverlayOperation::Intersection, &[]);
        assert!(sql.contains("JOIN overlay o"));
        assert!(sql.contains("ST_Intersects(i.geom, o.geom)"));

        let sql = overlay_sql(OverlayOperation::Clip, &[]);
        assert!(sql.contains("ST_Intersection(i.geom, (SELECT ST_Union(geom) FROM overlay))"));
    }

    #[test]
    fn extract_by_location_filters_with_exists() {
        let sql = extract_by_location_sql();
        assert!(sql.starts_with("SELECT i.* FROM input i WHERE EXISTS"));
    }
}
