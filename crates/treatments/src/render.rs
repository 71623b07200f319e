//! Color ramp legends for raster bands.
//!
//! Builds the value-to-color mapping a renderer consumes: linear ramps over
//! the band range, quantile classed ramps, and paletted legends over the
//! distinct values. Classification inputs (min/median/max, quantile breaks,
//! unique values) come from the band itself; an empty legend is an internal
//! error.

use std::path::Path;

use inf::colormap::SINGLE_HUE_PRESETS;
use inf::{ColorMap, Legend};

use crate::{layers, Error, Result};

pub const DEFAULT_CLASS_COUNT: usize = 5;

/// The green/yellow/red gradient the renderers default to: low values map
/// to green, high values to red
pub fn gradient_green_yellow_red() -> ColorMap {
    ColorMap::preset("RdYlGn").expect("RdYlGn is a known preset").inverted()
}

/// One of the single hue ramps, dark to light; `index` wraps around the
/// preset list so callers can pick pseudo randomly
pub fn single_hue_ramp(index: usize) -> ColorMap {
    let name = SINGLE_HUE_PRESETS[index % SINGLE_HUE_PRESETS.len()];
    ColorMap::preset(name).expect("single hue presets are known").inverted()
}

fn non_empty(legend: Legend) -> Result<Legend> {
    if legend.is_empty() {
        return Err(Error::Internal("Empty color ramp shader".to_string()));
    }

    Ok(legend)
}

/// Quantile breaks over the band values: `classes + 1` boundaries with an
/// equal share of pixels per class
pub(crate) fn quantile_bounds(sorted_values: &[f64], classes: usize) -> Vec<f64> {
    let mut bounds = Vec::with_capacity(classes + 1);
    for class in 0..=classes {
        let position = (class * (sorted_values.len() - 1)) / classes;
        let bound = sorted_values[position];
        if bounds.last() != Some(&bound) {
            bounds.push(bound);
        }
    }
    bounds
}

/// Linear legend between the band minimum and maximum
pub fn linear_legend(raster_path: &Path, color_map: &ColorMap) -> Result<Legend> {
    let (min, _med, max) = layers::raster_min_med_max(raster_path)?;
    non_empty(Legend::banded_equal(DEFAULT_CLASS_COUNT, min..max, color_map)?)
}

/// Quantile classed legend over the band values
pub fn quantile_legend(raster_path: &Path, classes: usize, color_map: &ColorMap) -> Result<Legend> {
    let values = layers::raster_unique_values(raster_path)?;
    if values.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Empty layer: '{}'",
            raster_path.to_string_lossy()
        )));
    }

    let bounds = quantile_bounds(&values, classes);
    if bounds.len() < 2 {
        // a constant band classifies into a single degenerate bound
        let value = bounds[0];
        return non_empty(Legend::categoric(&[value], color_map)?);
    }

    non_empty(Legend::banded_with_bounds(&bounds, color_map)?)
}

/// One category per distinct band value
pub fn paletted_legend(raster_path: &Path, color_map: &ColorMap) -> Result<Legend> {
    let values = layers::raster_unique_values(raster_path)?;
    if values.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Empty layer: '{}'",
            raster_path.to_string_lossy()
        )));
    }

    non_empty(Legend::categoric(&values, color_map)?)
}

/// The default renderer legend: green/yellow/red quantiles
pub fn legend_green_yellow_red(raster_path: &Path) -> Result<Legend> {
    quantile_legend(raster_path, DEFAULT_CLASS_COUNT, &gradient_green_yellow_red())
}

/// Single hue legend over the band range, hue picked by `index`
pub fn legend_single_hue(raster_path: &Path, index: usize) -> Result<Legend> {
    linear_legend(raster_path, &single_hue_ramp(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_bounds_split_the_values_evenly() {
        let values: Vec<f64> = (0..=100).map(f64::from).collect();
        let bounds = quantile_bounds(&values, 4);
        assert_eq!(bounds, vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn quantile_bounds_collapse_duplicates() {
        let values = vec![1.0, 1.0, 1.0, 1.0];
        assert_eq!(quantile_bounds(&values, 4), vec![1.0]);

        let values = vec![1.0, 1.0, 1.0, 9.0];
        assert_eq!(quantile_bounds(&values, 2), vec![1.0, 9.0]);
    }

    #[test]
    fn hue_index_wraps_around_the_preset_list() {
        assert_eq!(single_hue_ramp(0), single_hue_ramp(SINGLE_HUE_PRESETS.len()));
    }

    #[test]
    fn the_default_gradient_runs_green_to_red() {
        let ramp = gradient_green_yellow_red();
        let low = ramp.color_at(0.0);
        let high = ramp.color_at(1.0);
        assert!(low.g > low.r, "low end should be green-ish");
        assert!(high.r > high.g, "high end should be red-ish");
    }
}
