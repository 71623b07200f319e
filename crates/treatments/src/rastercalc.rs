//! Raster calculator treatments, including the no-data safe binary
//! combination.
//!
//! The calculator cannot test for no-data itself, so combining two rasters
//! takes three delegate calls: clear the no-data markers of both inputs to
//! an internal sentinel, evaluate a guarded expression that branches on
//! sentinel equality, and map the sentinel back to the external no-data
//! value. The intermediates live in a scratch space that is dropped when
//! the operation completes.

use std::path::{Path, PathBuf};

use inf::Feedback;

use crate::datatype::DataType;
use crate::expr;
use crate::parameters::Parameters;
use crate::processing::Registry;
use crate::scratch::Scratch;
use crate::{layers, Result};

#[derive(Clone, Debug)]
pub struct CalcOptions {
    /// External no-data sentinel of the produced raster
    pub nodata: f64,
    pub out_type: DataType,
}

impl Default for CalcOptions {
    fn default() -> Self {
        CalcOptions {
            nodata: expr::DEFAULT_NODATA,
            out_type: DataType::Float32,
        }
    }
}

fn calc_parameters(input: &Path, output: &Path, formula: &str, options: &CalcOptions) -> Result<Parameters> {
    Ok(Parameters::new()
        .set("BAND_A", 1)
        .set("FORMULA", formula)
        .set("INPUT_A", input)
        .set("NO_DATA", options.nodata)
        .set("OUTPUT", output)
        .set("RTYPE", options.out_type.calc_index()?))
}

fn calc_ab_parameters(
    input_a: &Path,
    input_b: &Path,
    output: &Path,
    formula: &str,
    options: &CalcOptions,
) -> Result<Parameters> {
    Ok(calc_parameters(input_a, output, formula, options)?
        .set("BAND_B", 1)
        .set("INPUT_B", input_b))
}

/// Parameters of the clearing step: rewrite the cells marked with
/// `src_nodata` to the internal sentinel and drop the no-data flag, so the
/// following combination can branch on the sentinel
fn clear_nodata_parameters(input: &Path, output: &Path, src_nodata: Option<f64>, sentinel: f64) -> Parameters {
    let formula = match src_nodata {
        Some(nodata) => expr::replace_value_expr(nodata, sentinel),
        None => "A".to_string(),
    };

    Parameters::new()
        .set("BAND_A", 1)
        .set("FORMULA", formula)
        .set("INPUT_A", input)
        .set("NO_DATA", "none")
        .set("HIDE_NODATA", true)
        .set("OUTPUT", output)
}

/// Single input raster calculator over the expression `formula`
pub fn apply_raster_calc(
    registry: &Registry,
    input: &Path,
    output: &Path,
    formula: &str,
    options: &CalcOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    feedback.set_sub_text("Raster Calc");
    let parameters = calc_parameters(input, output, formula, options)?;
    registry.run_for_output_path("gdal:rastercalculator", &parameters, feedback)
}

/// Keeps values strictly below `max_val`
pub fn apply_raster_calc_lt(
    registry: &Registry,
    input: &Path,
    output: &Path,
    max_val: f64,
    options: &CalcOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    let formula = expr::lt_filter_expr(max_val, options.nodata);
    apply_raster_calc(registry, input, output, &formula, options, feedback)
}

/// Keeps values up to and including `max_val`
pub fn apply_raster_calc_le(
    registry: &Registry,
    input: &Path,
    output: &Path,
    max_val: f64,
    options: &CalcOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    let formula = expr::le_filter_expr(max_val, options.nodata);
    apply_raster_calc(registry, input, output, &formula, options, feedback)
}

/// Binary raster calculator without the no-data dance
pub fn apply_raster_calc_ab(
    registry: &Registry,
    input_a: &Path,
    input_b: &Path,
    output: &Path,
    formula: &str,
    options: &CalcOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    let parameters = calc_ab_parameters(input_a, input_b, output, formula, options)?;
    registry.run_for_output_path("gdal:rastercalculator", &parameters, feedback)
}

/// Binary combination where a no-data pixel in either input propagates to
/// the output instead of polluting the arithmetic. A pixel that is no-data
/// in both inputs comes out as the external no-data sentinel.
pub fn apply_raster_calc_ab_nodata_safe(
    registry: &Registry,
    input_a: &Path,
    input_b: &Path,
    output: &Path,
    formula: &str,
    options: &CalcOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    if output.is_file() {
        layers::remove_raster(output)?;
    }

    let scratch = Scratch::from_config()?;
    let nonull_a = scratch.path("nonull_a.tif");
    let nonull_b = scratch.path("nonull_b.tif");
    let nonull_ab = scratch.path("nonull_ab.tif");

    let sentinel = expr::INTERNAL_SENTINEL;
    let clear_a = clear_nodata_parameters(input_a, &nonull_a, layers::raster_nodata_value(input_a)?, sentinel);
    registry.run("gdal:rastercalculator", &clear_a, feedback)?;
    let clear_b = clear_nodata_parameters(input_b, &nonull_b, layers::raster_nodata_value(input_b)?, sentinel);
    registry.run("gdal:rastercalculator", &clear_b, feedback)?;

    let guarded = expr::nodata_guard_expr(formula, sentinel);
    let combine = calc_ab_parameters(&nonull_a, &nonull_b, &nonull_ab, &guarded, options)?;
    registry.run("gdal:rastercalculator", &combine, feedback)?;

    let reset = expr::replace_value_expr(sentinel, options.nodata);
    apply_raster_calc(registry, &nonull_ab, output, &reset, options, feedback)?;

    // scratch drops here, removing the intermediates unless retention is on
    Ok(output.to_path_buf())
}

pub fn apply_raster_calc_mult(
    registry: &Registry,
    input_a: &Path,
    input_b: &Path,
    output: &Path,
    options: &CalcOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    apply_raster_calc_ab(registry, input_a, input_b, output, &expr::mult_expr(), options, feedback)
}

pub fn apply_raster_calc_min(
    registry: &Registry,
    input_a: &Path,
    input_b: &Path,
    output: &Path,
    options: &CalcOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    apply_raster_calc_ab_nodata_safe(registry, input_a, input_b, output, &expr::min_expr(), options, feedback)
}

pub fn apply_raster_calc_max(
    registry: &Registry,
    input_a: &Path,
    input_b: &Path,
    output: &Path,
    options: &CalcOptions,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    apply_raster_calc_ab_nodata_safe(registry, input_a, input_b, output, &expr::max_expr(), options, feedback)
}

/// Clears the no-data marking of a raster by rewriting flagged cells to
/// `new_val` (counterpart of the engine's null-filling operation)
pub fn replace_nodata(
    registry: &Registry,
    input: &Path,
    new_val: f64,
    output: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    let parameters = clear_nodata_parameters(input, output, layers::raster_nodata_value(input)?, new_val);
    registry.run_for_output_path("gdal:rastercalculator", &parameters, feedback)
}

/// Declares `new_val` as the no-data sentinel of a raster without touching
/// the pixel values (counterpart of the engine's null-marking operation)
pub fn set_nodata(
    registry: &Registry,
    input: &Path,
    new_val: f64,
    output: &Path,
    feedback: &dyn Feedback,
) -> Result<PathBuf> {
    let parameters = Parameters::new()
        .set("INPUT", input)
        .set("NODATA", new_val)
        .set("DATA_TYPE", 0)
        .set("OUTPUT", output);
    registry.run_for_output_path("gdal:translate", &parameters, feedback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{Outputs, ParamValue};
    use crate::processing::Provider;
    use inf::feedback::RecordingFeedback;
    use std::sync::{Arc, Mutex};

    /// Records every calculator invocation and pretends the output exists
    struct RecordingCalculator {
        calls: Arc<Mutex<Vec<Parameters>>>,
    }

    impl Provider for RecordingCalculator {
        fn name(&self) -> &'static str {
            "gdal"
        }

        fn run(&self, algorithm: &str, parameters: &Parameters, _feedback: &dyn Feedback) -> Result<Outputs> {
            assert_eq!(algorithm, "rastercalculator");
            self.calls.lock().unwrap().push(parameters.clone());
            Ok(Outputs::single(parameters.path("OUTPUT").unwrap()))
        }
    }

    fn recording_registry() -> (Registry, Arc<Mutex<Vec<Parameters>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        registry.register(Box::new(RecordingCalculator { calls: calls.clone() }));
        (registry, calls)
    }

    #[test]
    fn single_input_calc_dispatches_the_formula() {
        let (registry, calls) = recording_registry();
        let feedback = RecordingFeedback::new();

        let output = apply_raster_calc(
            &registry,
            Path::new("/data/a.tif"),
            Path::new("/data/out.tif"),
            "A*2",
            &CalcOptions::default(),
            &feedback,
        )
        .unwrap();
        assert_eq!(output, PathBuf::from("/data/out.tif"));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].string("FORMULA").unwrap(), "A*2");
        assert_eq!(calls[0].float("NO_DATA").unwrap(), expr::DEFAULT_NODATA);
        assert_eq!(calls[0].int("RTYPE").unwrap(), 5);
        assert!(!calls[0].contains("INPUT_B"));
    }

    #[test]
    fn filters_embed_the_threshold_into_the_formula() {
        let (registry, calls) = recording_registry();
        let feedback = RecordingFeedback::new();

        apply_raster_calc_lt(
            &registry,
            Path::new("/data/a.tif"),
            Path::new("/data/out.tif"),
            1000.0,
            &CalcOptions::default(),
            &feedback,
        )
        .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(
            calls[0].string("FORMULA").unwrap(),
            "less(A,1000)*A+less_equal(1000,A)*-9999"
        );
    }

    #[test]
    fn clearing_step_parameters_disable_the_nodata_masking() {
        let parameters = clear_nodata_parameters(
            Path::new("/data/a.tif"),
            Path::new("/tmp/nonull_a.tif"),
            Some(-9999.0),
            expr::INTERNAL_SENTINEL,
        );

        assert_eq!(parameters.string("FORMULA").unwrap(), "(A==-9999)*-998+(A!=-9999)*A");
        assert_eq!(parameters.get("NO_DATA"), Some(&ParamValue::Str("none".into())));
        assert!(parameters.flag("HIDE_NODATA").unwrap());

        // an unflagged input passes through unchanged
        let parameters = clear_nodata_parameters(
            Path::new("/data/a.tif"),
            Path::new("/tmp/nonull_a.tif"),
            None,
            expr::INTERNAL_SENTINEL,
        );
        assert_eq!(parameters.string("FORMULA").unwrap(), "A");
    }

    #[test]
    fn ab_combination_keeps_both_bands_on_one() {
        let parameters = calc_ab_parameters(
            Path::new("/data/a.tif"),
            Path::new("/data/b.tif"),
            Path::new("/data/out.tif"),
            "A*B",
            &CalcOptions::default(),
        )
        .unwrap();
        assert_eq!(parameters.int("BAND_A").unwrap(), 1);
        assert_eq!(parameters.int("BAND_B").unwrap(), 1);
        assert_eq!(parameters.path("INPUT_B").unwrap(), Path::new("/data/b.tif"));
    }
}
