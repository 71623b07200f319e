//! Legacy path invoking the external GDAL command line tools directly.
//!
//! The tools report usage problems on standard error while still exiting
//! with code 0 in several wrapper scripts, so failure is detected through a
//! non empty standard error stream rather than the exit code.

use std::path::{Path, PathBuf};

use itertools::Itertools;

use crate::expr;
use crate::{config, layers, Error, Result};

/// Runs an external tool to completion. Anything written to standard error
/// fails the invocation.
pub fn execute(program: &Path, args: &[String]) -> Result<()> {
    let name = layers::layer_name_of_path(program);
    log::debug!("cmd: {} {}", program.to_string_lossy(), args.iter().join(" "));

    let output = std::process::Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::Delegate {
            algorithm: name.clone(),
            message: format!("could not be started: {e}"),
        })?;

    if !output.stdout.is_empty() {
        log::info!("{}", String::from_utf8_lossy(&output.stdout).trim_end());
    }
    if !output.stderr.is_empty() {
        return Err(Error::Delegate {
            algorithm: name,
            message: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        });
    }

    Ok(())
}

/// Sibling path with a suffix inserted before the extension
/// (`cost.tif` -> `cost_nonull.tif`)
pub(crate) fn mk_tmp_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}{extension}"))
}

pub(crate) fn gdal_calc_args(in_path: &Path, out_path: &Path, expr: &str, more_args: &[String]) -> Vec<String> {
    let mut args = vec![
        "-A".to_string(),
        in_path.to_string_lossy().to_string(),
        "--type=Int32".to_string(),
        format!("--outfile={}", out_path.to_string_lossy()),
        format!("--NoDataValue={}", expr::operand(expr::DEFAULT_NODATA)),
        "--overwrite".to_string(),
    ];
    args.extend(more_args.iter().cloned());
    args.push(format!("--calc={expr}"));
    args
}

/// Raster calculator over a single input renamed `A`, Int32 output unless
/// overridden through `more_args`
pub fn apply_gdal_calc(in_path: &Path, out_path: &Path, expr: &str, more_args: &[String]) -> Result<()> {
    log::debug!("apply_gdal_calc({expr})");
    if out_path.is_file() {
        layers::remove_raster(out_path)?;
    }

    execute(&config::current().commands.gdal_calc, &gdal_calc_args(in_path, out_path, expr, more_args))
}

/// Keeps values within `[0, max_val]`, everything else becomes no-data
pub fn apply_filter_from_max_val(in_path: &Path, out_path: &Path, max_val: f64) -> Result<()> {
    let expr = expr::bounded_filter_expr(max_val, expr::DEFAULT_NODATA);
    apply_gdal_calc(in_path, out_path, &expr, &["--type=Float32".to_string()])
}

/// Rewrites pixel values according to `old -> new` associations
pub fn apply_reclass_from_dict(in_path: &Path, out_path: &Path, mapping: &[(f64, f64)]) -> Result<()> {
    log::debug!("apply_reclass_from_dict({mapping:?})");
    apply_gdal_calc(in_path, out_path, &expr::reclass_dict_expr(mapping), &[])
}

pub(crate) fn gdal_calc_ab_args(a_path: &Path, b_path: &Path, out_path: &Path, expr: &str) -> Vec<String> {
    vec![
        "-A".to_string(),
        a_path.to_string_lossy().to_string(),
        "-B".to_string(),
        b_path.to_string_lossy().to_string(),
        format!("--NoDataValue={}", expr::operand(expr::DEFAULT_NODATA)),
        "--overwrite".to_string(),
        format!("--outfile={}", out_path.to_string_lossy()),
        format!("--calc={expr}"),
    ]
}

/// Binary combination without the no-data dance: no-data pixels of `A`
/// simply follow the calculator's masking
pub fn apply_gdal_calc_ab_anull(a_path: &Path, b_path: &Path, out_path: &Path, expr: &str) -> Result<()> {
    log::debug!("apply_gdal_calc_ab_anull");
    if out_path.is_file() {
        layers::remove_raster(out_path)?;
    }

    execute(&config::current().commands.gdal_calc, &gdal_calc_ab_args(a_path, b_path, out_path, expr))
}

/// Clears the no-data marking of a raster by rewriting flagged cells to the
/// legacy sentinel, so a following combination can branch on it
fn clear_nodata_to_sentinel(in_path: &Path, out_path: &Path) -> Result<()> {
    let calc_expr = match layers::raster_nodata_value(in_path)? {
        Some(nodata) => expr::replace_value_expr(nodata, expr::LEGACY_INTERNAL_SENTINEL),
        None => "A".to_string(),
    };

    let args = vec![
        "-A".to_string(),
        in_path.to_string_lossy().to_string(),
        format!("--outfile={}", out_path.to_string_lossy()),
        "--NoDataValue=none".to_string(),
        "--hideNoData".to_string(),
        "--overwrite".to_string(),
        format!("--calc={calc_expr}"),
    ];
    execute(&config::current().commands.gdal_calc, &args)
}

/// No-data safe binary combination on the legacy path: both inputs are
/// cleared to the `-1` sentinel, combined, and the sentinel is mapped back
/// to the external no-data value. Temporaries are removed unless debug
/// retention is on.
pub fn apply_gdal_calc_ab(a_path: &Path, b_path: &Path, out_path: &Path, expr: &str) -> Result<()> {
    log::debug!("apply_gdal_calc_ab");
    if out_path.is_file() {
        layers::remove_raster(out_path)?;
    }

    let nonull_a = mk_tmp_path(a_path, "_nonull");
    let nonull_b = mk_tmp_path(b_path, "_nonull");
    let nonull_out = mk_tmp_path(out_path, "_nonull");

    clear_nodata_to_sentinel(a_path, &nonull_a)?;
    clear_nodata_to_sentinel(b_path, &nonull_b)?;

    let guarded = expr::nodata_guard_expr(expr, expr::LEGACY_INTERNAL_SENTINEL);
    execute(
        &config::current().commands.gdal_calc,
        &gdal_calc_ab_args(&nonull_a, &nonull_b, &nonull_out, &guarded),
    )?;

    let reset_expr = expr::replace_value_expr(expr::LEGACY_INTERNAL_SENTINEL, expr::DEFAULT_NODATA);
    apply_gdal_calc(&nonull_out, out_path, &reset_expr, &[])?;

    if !config::current().keep_artifacts {
        layers::remove_raster(&nonull_a)?;
        layers::remove_raster(&nonull_b)?;
        layers::remove_raster(&nonull_out)?;
    }

    Ok(())
}

/// Keeps the larger of both inputs per pixel
pub fn apply_max_gdal(a_path: &Path, b_path: &Path, out_path: &Path) -> Result<()> {
    apply_gdal_calc_ab(a_path, b_path, out_path, &expr::max_expr())
}

/// Keeps the smaller of both inputs per pixel
pub fn apply_min_gdal(a_path: &Path, b_path: &Path, out_path: &Path) -> Result<()> {
    apply_gdal_calc_ab(a_path, b_path, out_path, &expr::min_expr())
}

/// Weights `A` by `B`, optionally restricted to non-negative operands
pub fn apply_ponderation_gdal(a_path: &Path, b_path: &Path, out_path: &Path, pos_values: bool) -> Result<()> {
    log::debug!("apply_ponderation_gdal");
    if out_path.is_file() {
        layers::remove_raster(out_path)?;
    }

    execute(
        &config::current().commands.gdal_calc,
        &gdal_calc_ab_args(a_path, b_path, out_path, &expr::ponderation_expr(pos_values)),
    )
}

pub(crate) fn gdal_merge_args(files: &[PathBuf], out_path: &Path) -> Vec<String> {
    let nodata = expr::operand(expr::DEFAULT_NODATA);
    let mut args = vec![
        "-o".to_string(),
        out_path.to_string_lossy().to_string(),
        "-of".to_string(),
        "GTiff".to_string(),
        "-ot".to_string(),
        "Int32".to_string(),
        "-n".to_string(),
        nodata.clone(),
        "-a_nodata".to_string(),
        nodata,
    ];
    args.extend(files.iter().map(|f| f.to_string_lossy().to_string()));
    args
}

pub fn apply_gdal_merge(files: &[PathBuf], out_path: &Path) -> Result<()> {
    execute(&config::current().commands.gdal_merge, &gdal_merge_args(files, out_path))
}

pub struct RasterizationCmdOptions {
    pub resolution: f64,
    pub to_byte: bool,
    pub more_args: Vec<String>,
}

pub(crate) fn rasterize_cmd_args(
    in_path: &Path,
    field: &str,
    out_path: &Path,
    extent: crate::Extent,
    options: &RasterizationCmdOptions,
) -> Result<Vec<String>> {
    if options.resolution == 0.0 {
        return Err(Error::InvalidInput("Empty resolution".to_string()));
    }

    let [x_min, y_min, x_max, y_max] = extent;
    let mut args = vec![
        "-at".to_string(),
        "-te".to_string(),
        expr::operand(x_min),
        expr::operand(y_min),
        expr::operand(x_max),
        expr::operand(y_max),
        "-tr".to_string(),
        expr::operand(options.resolution),
        expr::operand(options.resolution),
        "-of".to_string(),
        "GTiff".to_string(),
    ];

    if options.to_byte {
        args.extend([
            "-ot".to_string(),
            "Int16".to_string(),
            "-a_nodata".to_string(),
            expr::operand(expr::DEFAULT_NODATA),
        ]);
    }

    // burning the geometry itself instead of an attribute
    if field == "geom" {
        args.extend(["-burn".to_string(), "1".to_string()]);
    } else {
        args.extend(["-a".to_string(), field.to_string()]);
    }

    args.extend(options.more_args.iter().cloned());
    args.push(in_path.to_string_lossy().to_string());
    args.push(out_path.to_string_lossy().to_string());
    Ok(args)
}

/// Rasterizes `field` of the input layer over the extent of `extent_path`
/// (or the input itself)
pub fn apply_rasterization_cmd(
    in_path: &Path,
    field: &str,
    out_path: &Path,
    extent_path: Option<&Path>,
    options: &RasterizationCmdOptions,
) -> Result<()> {
    log::debug!("apply_rasterization_cmd");
    let extent = layers::extent_of_layer(extent_path.unwrap_or(in_path))?;
    let args = rasterize_cmd_args(in_path, field, out_path, extent, options)?;
    execute(&config::current().commands.gdal_rasterize, &args)
}

pub struct WarpCmdOptions {
    pub resampling_mode: Option<String>,
    pub target_crs: Option<String>,
    pub resolution: Option<f64>,
    pub to_byte: bool,
}

/// Warps a raster with `gdalwarp`; extent and source CRS are derived from
/// the extent layer (or the input when none is given)
pub fn apply_warp_cmd(in_path: &Path, out_path: &Path, extent_path: Option<&Path>, options: &WarpCmdOptions) -> Result<()> {
    log::debug!("apply_warp_cmd");
    let extent = layers::extent_of_layer(extent_path.unwrap_or(in_path))?;

    let resolution = match options.resolution {
        Some(resolution) => resolution,
        None => {
            let transform = layers::open_raster(in_path)?.geo_transform()?;
            log::warn!("Setting warp resolution to {}", transform[1]);
            transform[1]
        }
    };
    if resolution == 0.0 {
        return Err(Error::InvalidInput("Empty resolution".to_string()));
    }

    let source_crs = layers::raster_info(in_path)?.crs;

    let [x_min, y_min, x_max, y_max] = extent;
    let mut args = Vec::new();
    if let Some(crs) = &source_crs {
        args.extend(["-s_srs".to_string(), crs.clone()]);
    }
    if let Some(crs) = &options.target_crs {
        args.extend(["-t_srs".to_string(), crs.clone()]);
    }
    args.extend([
        "-te".to_string(),
        expr::operand(x_min),
        expr::operand(y_min),
        expr::operand(x_max),
        expr::operand(y_max),
        "-tr".to_string(),
        expr::operand(resolution),
        expr::operand(resolution),
        "-overwrite".to_string(),
    ]);
    if let Some(mode) = &options.resampling_mode {
        args.extend(["-r".to_string(), mode.clone()]);
    }
    if options.to_byte {
        args.extend([
            "-dstnodata".to_string(),
            expr::operand(expr::DEFAULT_NODATA),
            "-ot".to_string(),
            "Int16".to_string(),
        ]);
    }
    args.push(in_path.to_string_lossy().to_string());
    args.push(out_path.to_string_lossy().to_string());

    execute(&config::current().commands.gdal_warp, &args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_path_inserts_the_suffix_before_the_extension() {
        assert_eq!(
            mk_tmp_path(Path::new("/data/cost.tif"), "_nonull"),
            PathBuf::from("/data/cost_nonull.tif")
        );
        assert_eq!(mk_tmp_path(Path::new("/data/cost"), "_tmp"), PathBuf::from("/data/cost_tmp"));
    }

    #[test]
    fn calc_args_end_with_the_expression() {
        let args = gdal_calc_args(
            Path::new("/data/in.tif"),
            Path::new("/data/out.tif"),
            "A*2",
            &["--type=Float32".to_string()],
        );
        assert_eq!(args.first().map(String::as_str), Some("-A"));
        assert_eq!(args.last().map(String::as_str), Some("--calc=A*2"));
        assert!(args.contains(&"--NoDataValue=-9999".to_string()));
        // the default type is overridden, not replaced
        assert!(args.contains(&"--type=Int32".to_string()));
        assert!(args.contains(&"--type=Float32".to_string()));
    }

    #[test]
    fn merge_args_carry_the_nodata_through() {
        let files = vec![PathBuf::from("a.tif"), PathBuf::from("b.tif")];
        let args = gdal_merge_args(&files, Path::new("out.tif"));
        let rendered = args.join(" ");
        assert!(rendered.contains("-n -9999"));
        assert!(rendered.contains("-a_nodata -9999"));
        assert!(rendered.ends_with("a.tif b.tif"));
    }

    #[test]
    fn rasterize_cmd_rejects_an_empty_resolution() {
        let options = RasterizationCmdOptions {
            resolution: 0.0,
            to_byte: false,
            more_args: Vec::new(),
        };
        let err = rasterize_cmd_args(
            Path::new("in.gpkg"),
            "class",
            Path::new("out.tif"),
            [0.0, 0.0, 100.0, 100.0],
            &options,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Empty resolution"));
    }

    #[test]
    fn rasterize_cmd_burns_geometry_with_a_constant() {
        let options = RasterizationCmdOptions {
            resolution: 25.0,
            to_byte: true,
            more_args: Vec::new(),
        };
        let args = rasterize_cmd_args(
            Path::new("in.gpkg"),
            "geom",
            Path::new("out.tif"),
            [0.0, 0.0, 100.0, 100.0],
            &options,
        )
        .unwrap();
        let rendered = args.join(" ");
        assert!(rendered.contains("-burn 1"));
        assert!(rendered.contains("-ot Int16"));
        assert!(rendered.contains("-te 0 0 100 100"));
    }

    #[cfg(unix)]
    #[test_log::test]
    fn stderr_output_fails_the_invocation_even_with_exit_code_zero() {
        let err = execute(Path::new("sh"), &["-c".to_string(), "echo oops >&2; exit 0".to_string()]).unwrap_err();
        match err {
            Error::Delegate { message, .. } => assert_eq!(message, "oops"),
            other => panic!("expected a delegate failure, got {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn quiet_commands_succeed() {
        execute(Path::new("sh"), &["-c".to_string(), "echo fine".to_string()]).unwrap();
    }
}
