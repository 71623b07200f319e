//! Raster treatment proxies: assemble the parameter map, dispatch, return
//! the produced artifact path.

use std::path::{Path, PathBuf};

use inf::Feedback;

use crate::datatype::DataType;
use crate::expr::{self, BoundariesMode, ReclassRule};
use crate::parameters::Parameters;
use crate::processing::Registry;
use crate::providers::gdalalg::RESAMPLING_MODES;
use crate::rastercalc::CalcOptions;
use crate::scratch::Scratch;
use crate::{layers, Error, Extent, Result};

#[derive(Clone, Debug)]
pub struct RasterizationOptions {
    /// Attribute to burn; burns `burn_value` (or 1) when absent
    pub field: Option<String>,
    pub burn_value: Option<f64>,
    pub out_type: DataType,
    pub nodata: f64,
    pub all_touch: bool,
    pub overwrite: bool,
}

impl Default for RasterizationOptions {
    fn default() -> Self {
        RasterizationOptions {
            field: None,
            burn_value: None,
            out_type: DataType::Float32,
            nodata: expr::DEFAULT_NODATA,
            all_touch: false,
            overwrite: false,
        }
    }
}

pub(crate) fn rasterization_parameters(
    in_path: &Path,
    out_path: &Path,
    extent: Extent,
    resolution: f64,
    options: &RasterizationOptions,
) -> Parameters {
    let mut parameters = Parameters::new()
        .set("ALL_TOUCH", options.all_touch)
        .set("BURN", options.burn_value)
        .set("DATA_TYPE", options.out_type.index())
        .set("EXTENT", extent)
        .set("FIELD", options.field.as_deref())
        .set("HEIGHT", resolution)
        .set("INPUT", in_path)
        .set("NODATA", options.nodata)
        .set("OUTPUT", out_path)
        .set("UNITS", 1)
        .set("WIDTH", resolution);
    if options.all_touch {
        parameters = parameters.set("EXTRA", "-at");
    }
    parameters
}

/// Rasterizes a vector layer over `extent` at `resolution`
pub fn apply_rasterization(
    registry: &Registry,
    in_path: &Path,
    out_path: &Path,
    extent: Extent,
    resolution: f64,
    options: &RasterizationOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    log::debug!("apply_rasterization");
    feedback.set_sub_text("Rasterize");
    if options.overwrite {
        layers::remove_raster(out_path)?;
    }

    let parameters = rasterization_parameters(in_path, out_path, extent, resolution, options);
    registry.run_for_output_path("gdal:rasterize", &parameters, feedback)
}

#[derive(Clone, Debug)]
pub struct WarpReprojectOptions {
    pub resampling_mode: String,
    pub dst_crs: Option<String>,
    pub src_crs: Option<String>,
    pub extent: Option<Extent>,
    pub extent_crs: Option<String>,
    pub resolution: Option<f64>,
    /// `None` keeps the input data type
    pub out_type: Option<DataType>,
    pub nodata: f64,
    pub overwrite: bool,
}

impl Default for WarpReprojectOptions {
    fn default() -> Self {
        WarpReprojectOptions {
            resampling_mode: "near".to_string(),
            dst_crs: None,
            src_crs: None,
            extent: None,
            extent_crs: None,
            resolution: None,
            out_type: None,
            nodata: expr::DEFAULT_NODATA,
            overwrite: false,
        }
    }
}

pub(crate) fn warp_parameters(in_path: &Path, out_path: &Path, options: &WarpReprojectOptions) -> Result<Parameters> {
    let mode_index = RESAMPLING_MODES
        .iter()
        .position(|&m| m == options.resampling_mode)
        .ok_or_else(|| Error::InvalidInput(format!("Unexpected resampling mode: {}", options.resampling_mode)))?;

    Ok(Parameters::new()
        .set("DATA_TYPE", options.out_type.map_or(0, |t| t.index() as i64 + 1))
        .set("INPUT", in_path)
        .set("NODATA", options.nodata)
        .set("OUTPUT", out_path)
        .set("RESAMPLING", mode_index)
        .set("SOURCE_CRS", options.src_crs.as_deref())
        .set("TARGET_CRS", options.dst_crs.as_deref())
        .set("TARGET_EXTENT", options.extent)
        .set("TARGET_EXTENT_CRS", options.extent_crs.as_deref())
        .set("TARGET_RESOLUTION", options.resolution))
}

/// Warps/reprojects a raster; the resampling mode is validated against the
/// engine's ordered mode list
pub fn apply_warp_reproject(
    registry: &Registry,
    in_path: &Path,
    out_path: &Path,
    options: &WarpReprojectOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Warp");
    if options.overwrite {
        layers::remove_raster(out_path)?;
    }

    let parameters = warp_parameters(in_path, out_path, options)?;
    registry.run_for_output_path("gdal:warpreproject", &parameters, feedback)
}

#[derive(Clone, Debug, Default)]
pub struct TranslateOptions {
    /// `None` keeps the input data type
    pub out_type: Option<DataType>,
    pub nodata: Option<f64>,
    pub crs: Option<String>,
}

pub fn apply_translate(
    registry: &Registry,
    in_path: &Path,
    out_path: &Path,
    options: &TranslateOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Translate");
    let parameters = Parameters::new()
        .set("DATA_TYPE", options.out_type.map_or(0, |t| t.index() as i64 + 1))
        .set("INPUT", in_path)
        .set("NODATA", options.nodata)
        .set("OUTPUT", out_path)
        .set("TARGET_CRS", options.crs.as_deref());
    registry.run_for_output_path("gdal:translate", &parameters, feedback)
}

#[derive(Clone, Debug)]
pub struct ClipRasterOptions {
    /// Shared resolution for both axes
    pub resolution: Option<f64>,
    /// Explicit per-axis resolution, wins over `resolution` when both are set
    pub x_res: Option<f64>,
    pub y_res: Option<f64>,
    pub crop_cutline: bool,
    pub nodata: Option<f64>,
    /// `None` keeps the input data type
    pub out_type: Option<DataType>,
}

impl Default for ClipRasterOptions {
    fn default() -> Self {
        ClipRasterOptions {
            resolution: None,
            x_res: None,
            y_res: None,
            crop_cutline: true,
            nodata: None,
            out_type: None,
        }
    }
}

pub(crate) fn clip_raster_parameters(
    raster_path: &Path,
    vector_path: &Path,
    out_path: &Path,
    options: &ClipRasterOptions,
) -> Parameters {
    let mut parameters = Parameters::new()
        .set("ALPHA_BAND", false)
        .set("CROP_TO_CUTLINE", options.crop_cutline)
        .set("DATA_TYPE", options.out_type.map_or(0, |t| t.index() as i64 + 1))
        .set("INPUT", raster_path)
        .set("KEEP_RESOLUTION", false)
        .set("MASK", vector_path)
        .set("NODATA", options.nodata)
        .set("OUTPUT", out_path);

    // most specific wins: the shared resolution first, explicit per-axis
    // values override it when both are supplied
    if let Some(resolution) = options.resolution {
        parameters = parameters
            .set("SET_RESOLUTION", true)
            .set("X_RESOLUTION", resolution)
            .set("Y_RESOLUTION", resolution);
    }
    if let (Some(x_res), Some(y_res)) = (options.x_res, options.y_res) {
        parameters = parameters
            .set("SET_RESOLUTION", true)
            .set("X_RESOLUTION", x_res)
            .set("Y_RESOLUTION", y_res);
    }

    parameters
}

/// Clips a raster with a vector mask layer
pub fn clip_raster_from_vector(
    registry: &Registry,
    raster_path: &Path,
    vector_path: &Path,
    out_path: &Path,
    options: &ClipRasterOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Clip raster");
    let parameters = clip_raster_parameters(raster_path, vector_path, out_path, options);
    registry.run_for_output_path("gdal:cliprasterbymasklayer", &parameters, feedback)
}

#[derive(Clone, Debug)]
pub struct MergeRasterOptions {
    pub nodata_output: f64,
    pub out_type: DataType,
    pub nodata_input: Option<f64>,
}

impl Default for MergeRasterOptions {
    fn default() -> Self {
        MergeRasterOptions {
            nodata_output: expr::DEFAULT_NODATA,
            out_type: DataType::Float32,
            nodata_input: None,
        }
    }
}

/// Merges several rasters into one
pub fn apply_merge_raster(
    registry: &Registry,
    files: &[&Path],
    out_path: &Path,
    options: &MergeRasterOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Merge raster");
    let inputs: Vec<crate::ParamValue> = files.iter().map(|f| (*f).into()).collect();
    let parameters = Parameters::new()
        .set("DATA_TYPE", options.out_type.index())
        .set("INPUT", inputs)
        .set("NODATA_INPUT", options.nodata_input)
        .set("NODATA_OUTPUT", options.nodata_output)
        .set("OUTPUT", out_path);
    registry.run_for_output_path("gdal:merge", &parameters, feedback)
}

#[derive(Clone, Debug)]
pub struct ReclassifyOptions {
    pub nodata: f64,
    pub out_type: DataType,
    pub boundaries_mode: BoundariesMode,
    /// Map pixels outside every range to no-data instead of keeping them
    pub nodata_for_missing: bool,
}

impl Default for ReclassifyOptions {
    fn default() -> Self {
        ReclassifyOptions {
            nodata: expr::DEFAULT_NODATA,
            out_type: DataType::Float32,
            boundaries_mode: BoundariesMode::default(),
            nodata_for_missing: false,
        }
    }
}

/// Reclassifies a raster by a range table, compiled into a calculator
/// expression
pub fn apply_reclassify_by_table(
    registry: &Registry,
    in_path: &Path,
    rules: &[ReclassRule],
    out_path: &Path,
    options: &ReclassifyOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    if rules.is_empty() {
        return Err(Error::InvalidInput("Reclassification needs at least one range".to_string()));
    }

    feedback.set_sub_text("Reclassify");
    let formula = expr::reclass_table_expr(rules, options.boundaries_mode, options.nodata, options.nodata_for_missing);
    let calc_options = CalcOptions {
        nodata: options.nodata,
        out_type: options.out_type,
    };
    crate::rastercalc::apply_raster_calc(registry, in_path, out_path, &formula, &calc_options, feedback)
}

/// Ring classification of the distances to the valid cells of `in_path`:
/// value 1 marks the cells themselves, value `k + 1` the k-th distance
/// ring. Pixels beyond the last distance are no-data.
pub fn apply_proximity_buffer(
    registry: &Registry,
    in_path: &Path,
    distances: &[f64],
    out_path: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    layers::check_file_exists(in_path, "Buffer input layer ")?;
    if distances.is_empty() {
        return Err(Error::InvalidInput("Buffer needs at least one distance".to_string()));
    }
    if distances.windows(2).any(|w| w[0] >= w[1]) || distances[0] <= 0.0 {
        return Err(Error::InvalidInput("Buffer distances must be positive and increasing".to_string()));
    }

    feedback.set_sub_text("Raster buffer");
    let scratch = Scratch::from_config()?;
    let proximity_path = scratch.path("proximity.tif");

    let parameters = Parameters::new()
        .set("INPUT", in_path)
        .set("OUTPUT", proximity_path.as_path())
        .set("UNITS", 0)
        .set("MAX_DISTANCE", *distances.last().expect("distances are not empty"))
        .set("NODATA", expr::DEFAULT_NODATA);
    registry.run("gdal:proximity", &parameters, feedback)?;

    let mut rules = vec![ReclassRule::new(-1.0, 0.0, 1.0)];
    let mut lower = 0.0;
    for (ring, &distance) in distances.iter().enumerate() {
        rules.push(ReclassRule::new(lower, distance, ring as f64 + 2.0));
        lower = distance;
    }

    let options = ReclassifyOptions {
        out_type: DataType::Int32,
        boundaries_mode: BoundariesMode::MinExclMaxIncl,
        nodata_for_missing: true,
        ..Default::default()
    };
    apply_reclassify_by_table(registry, &proximity_path, &rules, out_path, &options, feedback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_per_axis_resolution_wins_over_the_shared_one() {
        let options = ClipRasterOptions {
            resolution: Some(25.0),
            x_res: Some(5.0),
            y_res: Some(10.0),
            ..Default::default()
        };
        let parameters = clip_raster_parameters(
            Path::new("/data/cost.tif"),
            Path::new("/data/zones.gpkg"),
            Path::new("/data/out.tif"),
            &options,
        );
        assert!(parameters.flag("SET_RESOLUTION").unwrap());
        assert_eq!(parameters.float("X_RESOLUTION").unwrap(), 5.0);
        assert_eq!(parameters.float("Y_RESOLUTION").unwrap(), 10.0);
    }

    #[test]
    fn shared_resolution_applies_to_both_axes() {
        let options = ClipRasterOptions {
            resolution: Some(25.0),
            ..Default::default()
        };
        let parameters = clip_raster_parameters(
            Path::new("/data/cost.tif"),
            Path::new("/data/zones.gpkg"),
            Path::new("/data/out.tif"),
            &options,
        );
        assert_eq!(parameters.float("X_RESOLUTION").unwrap(), 25.0);
        assert_eq!(parameters.float("Y_RESOLUTION").unwrap(), 25.0);
    }

    #[test]
    fn no_resolution_means_no_resampling() {
        let parameters = clip_raster_parameters(
            Path::new("/data/cost.tif"),
            Path::new("/data/zones.gpkg"),
            Path::new("/data/out.tif"),
            &ClipRasterOptions::default(),
        );
        assert!(!parameters.contains("SET_RESOLUTION"));
        assert!(!parameters.contains("X_RESOLUTION"));
    }

    #[test]
    fn unknown_resampling_mode_is_a_user_error() {
        let options = WarpReprojectOptions {
            resampling_mode: "nearest".to_string(),
            ..Default::default()
        };
        let err = warp_parameters(Path::new("in.tif"), Path::new("out.tif"), &options).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("Unexpected resampling mode"));
    }

    #[test]
    fn warp_encodes_the_mode_as_its_list_index() {
        let options = WarpReprojectOptions {
            resampling_mode: "cubic".to_string(),
            out_type: Some(DataType::Int16),
            ..Default::default()
        };
        let parameters = warp_parameters(Path::new("in.tif"), Path::new("out.tif"), &options).unwrap();
        assert_eq!(parameters.int("RESAMPLING").unwrap(), 2);
        // the warp type list is shifted by the "keep input type" slot
        assert_eq!(parameters.int("DATA_TYPE").unwrap(), 2);
    }

    #[test]
    fn rasterization_carries_the_all_touch_flag_both_ways() {
        let options = RasterizationOptions {
            field: Some("class".to_string()),
            all_touch: true,
            ..Default::default()
        };
        let parameters =
            rasterization_parameters(Path::new("in.gpkg"), Path::new("out.tif"), [0.0, 0.0, 1.0, 1.0], 25.0, &options);
        assert!(parameters.flag("ALL_TOUCH").unwrap());
        assert_eq!(parameters.string("EXTRA").unwrap(), "-at");
        assert_eq!(parameters.float("WIDTH").unwrap(), 25.0);
        assert_eq!(parameters.float("HEIGHT").unwrap(), 25.0);
        assert_eq!(parameters.int("UNITS").unwrap(), 1);
    }
}
