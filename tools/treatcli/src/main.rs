use std::path::PathBuf;

use clap::{Parser, Subcommand};
use env_logger::{Env, TimestampPrecision};
use inf::feedback::LogFeedback;
use treatments::raster::{
    ClipRasterOptions, MergeRasterOptions, RasterizationOptions, TranslateOptions, WarpReprojectOptions,
};
use treatments::rastercalc::CalcOptions;
use treatments::{config::RuntimeConfiguration, layers, raster, rastercalc, vector, Registry, Result};

#[derive(Parser, Debug)]
#[command(name = "treatcli")]
#[command(about = "Geoprocessing treatments over the GDAL stack")]
struct Cli {
    /// Keep scratch artifacts for inspection
    #[arg(long = "keep-artifacts", global = true)]
    keep_artifacts: bool,

    /// Forward the engine's debug output to the log
    #[arg(long = "gdal-debug", global = true)]
    gdal_debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Rasterize a vector layer over its own extent")]
    Rasterize {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(short = 'f', long = "field", help = "Attribute to burn, burns 1 when omitted")]
        field: Option<String>,
        #[arg(short = 'r', long = "resolution")]
        resolution: f64,
        #[arg(long = "all-touch")]
        all_touch: bool,
    },
    #[command(about = "Warp/reproject a raster")]
    Warp {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(short = 't', long = "target-crs")]
        target_crs: Option<String>,
        #[arg(short = 'r', long = "resolution")]
        resolution: Option<f64>,
        #[arg(short = 'm', long = "resampling-mode", default_value = "near")]
        resampling_mode: String,
    },
    #[command(about = "Copy a raster while adjusting nodata/type/CRS metadata")]
    Translate {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(short = 'n', long = "nodata")]
        nodata: Option<f64>,
        #[arg(long = "crs")]
        crs: Option<String>,
    },
    #[command(name = "clip-raster", about = "Clip a raster with a vector mask")]
    ClipRaster {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(short = 'm', long = "mask")]
        mask: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(short = 'r', long = "resolution", help = "Shared resolution for both axes")]
        resolution: Option<f64>,
        #[arg(long = "x-res", help = "Explicit x resolution, wins over --resolution")]
        x_res: Option<f64>,
        #[arg(long = "y-res", help = "Explicit y resolution, wins over --resolution")]
        y_res: Option<f64>,
    },
    #[command(about = "Merge rasters into one")]
    Merge {
        #[arg(short = 'i', long = "input", required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    #[command(about = "Raster calculator over one or two inputs")]
    Calc {
        #[arg(short = 'a', long = "input-a")]
        input_a: PathBuf,
        #[arg(short = 'b', long = "input-b")]
        input_b: Option<PathBuf>,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(short = 'e', long = "expr")]
        expr: String,
        #[arg(long = "nodata-safe", help = "Propagate nodata through the combination")]
        nodata_safe: bool,
    },
    #[command(name = "calc-min", about = "Pixel-wise minimum of two rasters, nodata safe")]
    CalcMin {
        #[arg(short = 'a', long = "input-a")]
        input_a: PathBuf,
        #[arg(short = 'b', long = "input-b")]
        input_b: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    #[command(name = "calc-max", about = "Pixel-wise maximum of two rasters, nodata safe")]
    CalcMax {
        #[arg(short = 'a', long = "input-a")]
        input_a: PathBuf,
        #[arg(short = 'b', long = "input-b")]
        input_b: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    #[command(about = "Dissolve a vector layer")]
    Dissolve {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    #[command(about = "Buffer a vector layer")]
    Buffer {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(short = 'd', long = "distance")]
        distance: f64,
        #[arg(long = "dissolve")]
        dissolve: bool,
    },
    #[command(about = "Remove the overlay area from the input features")]
    Difference {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(long = "overlay")]
        overlay: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    #[command(about = "Intersect the input features with the overlay")]
    Intersection {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(long = "overlay")]
        overlay: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    #[command(about = "Reproject a vector layer")]
    Reproject {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(short = 't', long = "target-crs")]
        target_crs: String,
    },
    #[command(about = "Extract the features matching an attribute expression")]
    Extract {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(short = 'e', long = "expr")]
        expr: String,
    },
    #[command(about = "Classify features into 1/0 by an attribute expression")]
    Classify {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(short = 'e', long = "expr")]
        expr: String,
    },
    #[command(name = "unique-values", about = "Print the distinct band values")]
    UniqueValues {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
    },
}

fn run(command: Commands, registry: &Registry) -> Result<()> {
    let feedback = LogFeedback;
    match command {
        Commands::Rasterize {
            input,
            output,
            field,
            resolution,
            all_touch,
        } => {
            let extent = layers::extent_of_layer(&input)?;
            let options = RasterizationOptions {
                field,
                burn_value: Some(1.0),
                all_touch,
                ..Default::default()
            };
            raster::apply_rasterization(registry, &input, &output, extent, resolution, &options, &feedback)?;
        }
        Commands::Warp {
            input,
            output,
            target_crs,
            resolution,
            resampling_mode,
        } => {
            let options = WarpReprojectOptions {
                resampling_mode,
                dst_crs: target_crs,
                resolution,
                ..Default::default()
            };
            raster::apply_warp_reproject(registry, &input, &output, &options, &feedback)?;
        }
        Commands::Translate {
            input,
            output,
            nodata,
            crs,
        } => {
            let options = TranslateOptions {
                nodata,
                crs,
                ..Default::default()
            };
            raster::apply_translate(registry, &input, &output, &options, &feedback)?;
        }
        Commands::ClipRaster {
            input,
            mask,
            output,
            resolution,
            x_res,
            y_res,
        } => {
            let options = ClipRasterOptions {
                resolution,
                x_res,
                y_res,
                ..Default::default()
            };
            raster::clip_raster_from_vector(registry, &input, &mask, &output, &options, &feedback)?;
        }
        Commands::Merge { inputs, output } => {
            let files: Vec<&std::path::Path> = inputs.iter().map(PathBuf::as_path).collect();
            raster::apply_merge_raster(registry, &files, &output, &MergeRasterOptions::default(), &feedback)?;
        }
        Commands::Calc {
            input_a,
            input_b,
            output,
            expr,
            nodata_safe,
        } => {
            let options = CalcOptions::default();
            match (input_b, nodata_safe) {
                (Some(input_b), true) => {
                    rastercalc::apply_raster_calc_ab_nodata_safe(
                        registry, &input_a, &input_b, &output, &expr, &options, &feedback,
                    )?;
                }
                (Some(input_b), false) => {
                    rastercalc::apply_raster_calc_ab(registry, &input_a, &input_b, &output, &expr, &options, &feedback)?;
                }
                (None, _) => {
                    rastercalc::apply_raster_calc(registry, &input_a, &output, &expr, &options, &feedback)?;
                }
            }
        }
        Commands::CalcMin {
            input_a,
            input_b,
            output,
        } => {
            rastercalc::apply_raster_calc_min(registry, &input_a, &input_b, &output, &CalcOptions::default(), &feedback)?;
        }
        Commands::CalcMax {
            input_a,
            input_b,
            output,
        } => {
            rastercalc::apply_raster_calc_max(registry, &input_a, &input_b, &output, &CalcOptions::default(), &feedback)?;
        }
        Commands::Dissolve { input, output } => {
            vector::dissolve_layer(registry, &input, &output, &feedback)?;
        }
        Commands::Buffer {
            input,
            output,
            distance,
            dissolve,
        } => {
            vector::apply_buffer(registry, &input, distance, &output, dissolve, &feedback)?;
        }
        Commands::Difference { input, overlay, output } => {
            vector::apply_difference(registry, &input, &overlay, &output, &feedback)?;
        }
        Commands::Intersection { input, overlay, output } => {
            vector::apply_intersection(registry, &input, &overlay, &output, &feedback)?;
        }
        Commands::Reproject {
            input,
            output,
            target_crs,
        } => {
            vector::apply_reproject_layer(registry, &input, &target_crs, &output, &feedback)?;
        }
        Commands::Extract { input, output, expr } => {
            vector::extract_by_expression(registry, &input, &expr, &output, &feedback)?;
        }
        Commands::Classify { input, output, expr } => {
            let name = layers::layer_name_of_path(&output);
            vector::classify_by_expression(&input, Some(&expr), &output, &name)?;
        }
        Commands::UniqueValues { input } => {
            match layers::raster_unique_values_narrowed(&input)? {
                layers::UniqueValues::Integer(values) => {
                    for value in values {
                        println!("{value}");
                    }
                }
                layers::UniqueValues::Real(values) => {
                    for value in values {
                        println!("{value}");
                    }
                }
            }
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    RuntimeConfiguration {
        debug_logging: cli.gdal_debug,
        keep_artifacts: cli.keep_artifacts,
        config_options: vec![("GDAL_PAM_ENABLED".to_string(), "YES".to_string())],
        ..Default::default()
    }
    .apply()?;

    let registry = Registry::with_default_providers();
    run(cli.command, &registry)?;
    Ok(())
}
