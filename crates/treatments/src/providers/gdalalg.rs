//! The `gdal` provider: raster utilities of the engine.
//!
//! Each algorithm translates its parameter map into the option vector of the
//! matching engine utility. The raster calculator and the proximity tool are
//! external python utilities and go through the command runner instead of a
//! library entry point.

use std::path::PathBuf;

use gdal::vector::LayerAccess;
use inf::Feedback;
use itertools::Itertools;

use crate::datatype::{CALC_TYPES, DataType};
use crate::parameters::{Outputs, Parameters};
use crate::processing::Provider;
use crate::{commands, config, engine, layers, Error, Result};

/// Resampling mode names in the fixed order the engine uses to encode its
/// `RESAMPLING` parameter
pub const RESAMPLING_MODES: [&str; 12] = [
    "near",
    "bilinear",
    "cubic",
    "cubicspline",
    "lanczos",
    "average",
    "mode",
    "max",
    "min",
    "med",
    "q1",
    "q3",
];

pub struct GdalProvider;

impl Provider for GdalProvider {
    fn name(&self) -> &'static str {
        "gdal"
    }

    fn run(&self, algorithm: &str, parameters: &Parameters, feedback: &dyn Feedback) -> Result<Outputs> {
        match algorithm {
            "warpreproject" => run_warp(parameters),
            "translate" => run_translate(parameters),
            "rasterize" => run_rasterize(parameters),
            "cliprasterbymasklayer" => run_clip_raster(parameters),
            "merge" => run_merge(parameters),
            "clipvectorbyextent" => run_clip_vector_by_extent(parameters),
            "rastercalculator" => run_raster_calculator(parameters, feedback),
            "proximity" => run_proximity(parameters, feedback),
            other => Err(Error::InvalidInput(format!("Unknown algorithm: 'gdal:{other}'"))),
        }
    }
}

fn push_float_arg(args: &mut Vec<String>, flag: &str, value: f64) {
    args.push(flag.to_string());
    args.push(crate::expr::operand(value));
}

fn resampling_mode(index: i64) -> Result<&'static str> {
    usize::try_from(index)
        .ok()
        .and_then(|i| RESAMPLING_MODES.get(i).copied())
        .ok_or_else(|| Error::InvalidInput(format!("Unexpected resampling mode index: {index}")))
}

/// `DATA_TYPE` encoding of the warp/translate tools: 0 keeps the input
/// type, anything else indexes the ordered type list shifted by one
fn optional_data_type(index: i64) -> Result<Option<DataType>> {
    if index == 0 {
        return Ok(None);
    }

    usize::try_from(index - 1)
        .map_err(|_| Error::InvalidInput(format!("Unexpected data type index: {index}")))
        .and_then(DataType::from_index)
        .map(Some)
}

pub(crate) fn warp_args(params: &Parameters) -> Result<(PathBuf, PathBuf, Vec<String>)> {
    let input = params.path("INPUT")?.to_path_buf();
    let output = params.path("OUTPUT")?.to_path_buf();

    let mut args = vec!["-overwrite".to_string(), "-of".to_string(), "GTiff".to_string()];

    let mode = resampling_mode(params.opt_int("RESAMPLING")?.unwrap_or(0))?;
    args.push("-r".to_string());
    args.push(mode.to_string());

    if let Some(crs) = params.opt_string("SOURCE_CRS")? {
        args.push("-s_srs".to_string());
        args.push(crs.to_string());
    }
    if let Some(crs) = params.opt_string("TARGET_CRS")? {
        args.push("-t_srs".to_string());
        args.push(crs.to_string());
    }
    if let Some(extent) = params.opt_extent("TARGET_EXTENT")? {
        args.push("-te".to_string());
        args.extend(extent.iter().map(|c| crate::expr::operand(*c)));
        if let Some(crs) = params.opt_string("TARGET_EXTENT_CRS")? {
            args.push("-te_srs".to_string());
            args.push(crs.to_string());
        }
    }
    if let Some(resolution) = params.opt_float("TARGET_RESOLUTION")? {
        args.push("-tr".to_string());
        args.push(crate::expr::operand(resolution));
        args.push(crate::expr::operand(resolution));
    }
    if let Some(nodata) = params.opt_float("NODATA")? {
        push_float_arg(&mut args, "-dstnodata", nodata);
    }
    if let Some(data_type) = optional_data_type(params.opt_int("DATA_TYPE")?.unwrap_or(0))? {
        args.push("-ot".to_string());
        args.push(data_type.name().to_string());
    }
    if params.flag("MULTITHREADING")? {
        args.push("-multi".to_string());
    }

    Ok((input, output, args))
}

fn run_warp(params: &Parameters) -> Result<Outputs> {
    let (input, output, args) = warp_args(params)?;
    let src = layers::open_raster(&input)?;
    engine::warp_to_disk(&[&src], &output, &args)?;
    Ok(Outputs::single(output))
}

pub(crate) fn translate_args(params: &Parameters) -> Result<(PathBuf, PathBuf, Vec<String>)> {
    let input = params.path("INPUT")?.to_path_buf();
    let output = params.path("OUTPUT")?.to_path_buf();

    let mut args = Vec::new();
    if let Some(nodata) = params.opt_float("NODATA")? {
        push_float_arg(&mut args, "-a_nodata", nodata);
    }
    if let Some(crs) = params.opt_string("TARGET_CRS")? {
        args.push("-a_srs".to_string());
        args.push(crs.to_string());
    }
    if let Some(data_type) = optional_data_type(params.opt_int("DATA_TYPE")?.unwrap_or(0))? {
        args.push("-ot".to_string());
        args.push(data_type.name().to_string());
    }

    Ok((input, output, args))
}

fn run_translate(params: &Parameters) -> Result<Outputs> {
    let (input, output, args) = translate_args(params)?;
    let src = layers::open_raster(&input)?;
    engine::translate_to_disk(&src, &output, &args)?;
    Ok(Outputs::single(output))
}

pub(crate) fn rasterize_args(params: &Parameters, layer_name: &str) -> Result<Vec<String>> {
    let mut args = vec!["-of".to_string(), "GTiff".to_string(), "-l".to_string(), layer_name.to_string()];

    match (params.opt_string("FIELD")?, params.opt_float("BURN")?) {
        (Some(field), _) => {
            args.push("-a".to_string());
            args.push(field.to_string());
        }
        (None, Some(burn)) => push_float_arg(&mut args, "-burn", burn),
        (None, None) => {
            return Err(Error::InvalidInput("Rasterize needs either a FIELD or a BURN value".to_string()));
        }
    }

    if params.flag("ALL_TOUCH")? {
        args.push("-at".to_string());
    }
    if let Some(extra) = params.opt_string("EXTRA")? {
        args.extend(extra.split_whitespace().map(str::to_string));
    }

    if let Some(extent) = params.opt_extent("EXTENT")? {
        args.push("-te".to_string());
        args.extend(extent.iter().map(|c| crate::expr::operand(*c)));
    }

    let width = params.float("WIDTH")?;
    let height = params.float("HEIGHT")?;
    if width == 0.0 || height == 0.0 {
        return Err(Error::InvalidInput("Empty resolution".to_string()));
    }

    // UNITS 0: target size in pixels, UNITS 1: resolution in georeferenced units
    match params.opt_int("UNITS")?.unwrap_or(1) {
        0 => {
            args.push("-ts".to_string());
            args.push(crate::expr::operand(width));
            args.push(crate::expr::operand(height));
        }
        1 => {
            args.push("-tr".to_string());
            args.push(crate::expr::operand(width));
            args.push(crate::expr::operand(height));
        }
        other => return Err(Error::InvalidInput(format!("Unexpected rasterize units: {other}"))),
    }

    if let Some(nodata) = params.opt_float("NODATA")? {
        push_float_arg(&mut args, "-a_nodata", nodata);
    }

    let data_type = match params.opt_int("DATA_TYPE")? {
        None => DataType::Float32,
        Some(index) => DataType::from_index(usize::try_from(index).map_err(|_| {
            Error::InvalidInput(format!("Unexpected data type index: {index}"))
        })?)?,
    };
    args.push("-ot".to_string());
    args.push(data_type.name().to_string());

    Ok(args)
}

fn run_rasterize(params: &Parameters) -> Result<Outputs> {
    let input = params.path("INPUT")?.to_path_buf();
    let output = params.path("OUTPUT")?.to_path_buf();

    let src = layers::open_vector(&input)?;
    let layer_name = src.layer(0)?.name();
    let args = rasterize_args(params, &layer_name)?;
    engine::rasterize_to_disk(&src, &output, &args)?;
    Ok(Outputs::single(output))
}

pub(crate) fn clip_raster_args(params: &Parameters, input_resolution: Option<(f64, f64)>) -> Result<Vec<String>> {
    let mask = params.path("MASK")?;

    let mut args = vec![
        "-overwrite".to_string(),
        "-of".to_string(),
        "GTiff".to_string(),
        "-cutline".to_string(),
        mask.to_string_lossy().to_string(),
    ];

    if params.flag("CROP_TO_CUTLINE")? {
        args.push("-crop_to_cutline".to_string());
    }
    if params.flag("ALPHA_BAND")? {
        args.push("-dstalpha".to_string());
    }

    if params.flag("SET_RESOLUTION")? {
        let x_res = params.float("X_RESOLUTION")?;
        let y_res = params.float("Y_RESOLUTION")?;
        args.push("-tr".to_string());
        args.push(crate::expr::operand(x_res));
        args.push(crate::expr::operand(y_res));
    } else if params.flag("KEEP_RESOLUTION")? {
        if let Some((x_res, y_res)) = input_resolution {
            args.push("-tr".to_string());
            args.push(crate::expr::operand(x_res));
            args.push(crate::expr::operand(y_res));
        }
    }

    if let Some(nodata) = params.opt_float("NODATA")? {
        push_float_arg(&mut args, "-dstnodata", nodata);
    }
    if let Some(data_type) = optional_data_type(params.opt_int("DATA_TYPE")?.unwrap_or(0))? {
        args.push("-ot".to_string());
        args.push(data_type.name().to_string());
    }

    Ok(args)
}

fn run_clip_raster(params: &Parameters) -> Result<Outputs> {
    let input = params.path("INPUT")?.to_path_buf();
    let output = params.path("OUTPUT")?.to_path_buf();

    let src = layers::open_raster(&input)?;
    let resolution = src.geo_transform().ok().map(|gt| (gt[1].abs(), gt[5].abs()));
    let args = clip_raster_args(params, resolution)?;
    engine::warp_to_disk(&[&src], &output, &args)?;
    Ok(Outputs::single(output))
}

fn run_merge(params: &Parameters) -> Result<Outputs> {
    let output = params.path("OUTPUT")?.to_path_buf();
    let inputs = params.list("INPUT")?;
    if inputs.is_empty() {
        return Err(Error::InvalidInput("Merge needs at least one input raster".to_string()));
    }

    let mut vrt_args = Vec::new();
    if let Some(nodata) = params.opt_float("NODATA_INPUT")? {
        push_float_arg(&mut vrt_args, "-srcnodata", nodata);
    }
    if let Some(nodata) = params.opt_float("NODATA_OUTPUT")? {
        push_float_arg(&mut vrt_args, "-vrtnodata", nodata);
    }

    let mut translate_args = Vec::new();
    if let Some(nodata) = params.opt_float("NODATA_OUTPUT")? {
        push_float_arg(&mut translate_args, "-a_nodata", nodata);
    }
    let data_type = match params.opt_int("DATA_TYPE")? {
        None => DataType::Float32,
        Some(index) => DataType::from_index(usize::try_from(index).map_err(|_| {
            Error::InvalidInput(format!("Unexpected data type index: {index}"))
        })?)?,
    };
    translate_args.push("-ot".to_string());
    translate_args.push(data_type.name().to_string());

    let mut datasets = Vec::with_capacity(inputs.len());
    for value in inputs {
        let path = value
            .as_path()
            .ok_or_else(|| Error::InvalidInput("Merge inputs must be paths".to_string()))?;
        datasets.push(layers::open_raster(path)?);
    }
    let dataset_refs: Vec<&gdal::Dataset> = datasets.iter().collect();

    let vrt_path = PathBuf::from(format!("/vsimem/merge_{}.vrt", std::process::id()));
    let vrt = engine::build_vrt(&dataset_refs, &vrt_path, &vrt_args)?;
    let result = engine::translate_to_disk(&vrt, &output, &translate_args);
    drop(vrt);
    unsafe {
        let c_path = std::ffi::CString::new(vrt_path.to_string_lossy().as_ref())?;
        gdal_sys::VSIUnlink(c_path.as_ptr());
    }
    result?;

    Ok(Outputs::single(output))
}

fn run_clip_vector_by_extent(params: &Parameters) -> Result<Outputs> {
    let input = params.path("INPUT")?.to_path_buf();
    let output = params.path("OUTPUT")?.to_path_buf();
    let extent = params
        .opt_extent("EXTENT")?
        .ok_or_else(|| Error::InvalidInput("Missing required parameter 'EXTENT'".to_string()))?;

    let mut args = vec!["-clipsrc".to_string()];
    args.extend(extent.iter().map(|c| crate::expr::operand(*c)));

    let src = layers::open_vector(&input)?;
    engine::vector_translate_to_disk(&src, &output, &args)?;
    Ok(Outputs::single(output))
}

pub(crate) fn raster_calculator_args(params: &Parameters) -> Result<Vec<String>> {
    let input_a = params.path("INPUT_A")?;
    let output = params.path("OUTPUT")?;
    let formula = params.string("FORMULA")?;

    let mut args = vec![
        "-A".to_string(),
        input_a.to_string_lossy().to_string(),
        format!("--A_band={}", params.opt_int("BAND_A")?.unwrap_or(1)),
    ];

    if let Some(input_b) = params.opt_path("INPUT_B")? {
        args.push("-B".to_string());
        args.push(input_b.to_string_lossy().to_string());
        args.push(format!("--B_band={}", params.opt_int("BAND_B")?.unwrap_or(1)));
    }

    args.push(format!("--outfile={}", output.to_string_lossy()));
    args.push(format!("--calc={formula}"));

    match params.get("NO_DATA") {
        None => {}
        Some(value) => match (value.as_float(), value.as_str()) {
            (Some(nodata), _) => args.push(format!("--NoDataValue={}", crate::expr::operand(nodata))),
            (None, Some("none")) => args.push("--NoDataValue=none".to_string()),
            _ => return Err(Error::InvalidInput("Parameter 'NO_DATA' is not a number or 'none'".to_string())),
        },
    }

    if let Some(index) = params.opt_int("RTYPE")? {
        let data_type = usize::try_from(index)
            .ok()
            .and_then(|i| CALC_TYPES.get(i).copied())
            .ok_or_else(|| Error::InvalidInput(format!("Unexpected calculator type index: {index}")))?;
        args.push(format!("--type={}", data_type.name()));
    }

    if params.flag("HIDE_NODATA")? {
        args.push("--hideNoData".to_string());
    }
    if let Some(extra) = params.opt_string("EXTRA")? {
        args.extend(extra.split_whitespace().map(str::to_string));
    }

    args.push("--overwrite".to_string());
    Ok(args)
}

fn run_raster_calculator(params: &Parameters, feedback: &dyn Feedback) -> Result<Outputs> {
    let args = raster_calculator_args(params)?;
    let output = params.path("OUTPUT")?.to_path_buf();
    feedback.push_debug(&format!("calculator args: {}", args.iter().join(" ")));
    commands::execute(&config::current().commands.gdal_calc, &args)?;
    Ok(Outputs::single(output))
}

pub(crate) fn proximity_args(params: &Parameters) -> Result<Vec<String>> {
    let input = params.path("INPUT")?;
    let output = params.path("OUTPUT")?;

    let mut args = vec![
        input.to_string_lossy().to_string(),
        output.to_string_lossy().to_string(),
    ];

    if let Some(values) = params.get("VALUES") {
        let values = match values {
            crate::ParamValue::List(values) => values
                .iter()
                .map(|v| {
                    v.as_float()
                        .map(crate::expr::operand)
                        .ok_or_else(|| Error::InvalidInput("Parameter 'VALUES' must hold numbers".to_string()))
                })
                .collect::<Result<Vec<String>>>()?,
            _ => return Err(Error::InvalidInput("Parameter 'VALUES' is not a list".to_string())),
        };
        args.push("-values".to_string());
        args.push(values.join(","));
    }

    // UNITS 0: georeferenced distances, 1: pixel distances
    match params.opt_int("UNITS")?.unwrap_or(0) {
        0 => args.extend(["-distunits".to_string(), "GEO".to_string()]),
        1 => args.extend(["-distunits".to_string(), "PIXEL".to_string()]),
        other => return Err(Error::InvalidInput(format!("Unexpected proximity units: {other}"))),
    }

    if let Some(max_distance) = params.opt_float("MAX_DISTANCE")? {
        push_float_arg(&mut args, "-maxdist", max_distance);
    }
    if let Some(nodata) = params.opt_float("NODATA")? {
        push_float_arg(&mut args, "-nodata", nodata);
    }

    args.push("-ot".to_string());
    args.push(DataType::Float32.name().to_string());
    Ok(args)
}

fn run_proximity(params: &Parameters, feedback: &dyn Feedback) -> Result<Outputs> {
    let args = proximity_args(params)?;
    let output = params.path("OUTPUT")?.to_path_buf();
    feedback.push_debug(&format!("proximity args: {}", args.iter().join(" ")));
    commands::execute(&config::current().commands.gdal_proximity, &args)?;
    Ok(Outputs::single(output))
}
