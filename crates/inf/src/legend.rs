use std::ops::Range;

use crate::{Color, ColorMap, Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct LegendBand {
    pub range: Range<f64>,
    pub color: Color,
    pub label: String,
}

impl LegendBand {
    pub fn new(range: Range<f64>, color: Color, label: String) -> Self {
        LegendBand { range, color, label }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LegendCategory {
    pub value: f64,
    pub color: Color,
    pub label: String,
}

/// Value to color mapping for rendering a raster band
#[derive(Clone, Debug, PartialEq)]
pub enum Legend {
    /// Contiguous value ranges, each with its own color
    Banded(Vec<LegendBand>),
    /// Discrete values, each with its own color
    Categoric(Vec<LegendCategory>),
}

impl Legend {
    /// Equally sized bands over the value range
    pub fn banded_equal(band_count: usize, value_range: Range<f64>, color_map: &ColorMap) -> Result<Legend> {
        if band_count == 0 {
            return Err(Error::InvalidArgument("Legend band count must not be zero".into()));
        }

        let width = (value_range.end - value_range.start) / band_count as f64;
        let bounds: Vec<f64> = (0..=band_count).map(|i| value_range.start + i as f64 * width).collect();
        Legend::banded_with_bounds(&bounds, color_map)
    }

    /// Bands between the provided boundary values (e.g. quantile breaks),
    /// colored by sampling the map at the band midpoints
    pub fn banded_with_bounds(bounds: &[f64], color_map: &ColorMap) -> Result<Legend> {
        if bounds.len() < 2 {
            return Err(Error::InvalidArgument("A banded legend needs at least two boundary values".into()));
        }

        if bounds.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::InvalidArgument("Legend boundary values must be sorted".into()));
        }

        let band_count = bounds.len() - 1;
        let color_step = if band_count == 1 { 0.0 } else { 1.0 / (band_count - 1) as f64 };
        let bands = bounds
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                LegendBand::new(
                    w[0]..w[1],
                    color_map.color_at(i as f64 * color_step),
                    format!("{} - {}", w[0], w[1]),
                )
            })
            .collect();

        Ok(Legend::Banded(bands))
    }

    /// One category per distinct value, colored along the map
    pub fn categoric(values: &[f64], color_map: &ColorMap) -> Result<Legend> {
        if values.is_empty() {
            return Err(Error::InvalidArgument("A categoric legend needs at least one value".into()));
        }

        let color_step = if values.len() == 1 { 0.0 } else { 1.0 / (values.len() - 1) as f64 };
        let categories = values
            .iter()
            .enumerate()
            .map(|(i, &value)| LegendCategory {
                value,
                color: color_map.color_at(i as f64 * color_step),
                label: value.to_string(),
            })
            .collect();

        Ok(Legend::Categoric(categories))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Legend::Banded(bands) => bands.is_empty(),
            Legend::Categoric(categories) => categories.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Legend::Banded(bands) => bands.len(),
            Legend::Categoric(categories) => categories.len(),
        }
    }

    pub fn color_for_value(&self, value: f64) -> Option<Color> {
        match self {
            Legend::Banded(bands) => {
                if let Some(band) = bands.iter().find(|b| b.range.contains(&value)) {
                    return Some(band.color);
                }
                // the last band is inclusive on its upper edge
                bands
                    .last()
                    .filter(|b| (value - b.range.end).abs() <= f64::EPSILON)
                    .map(|b| b.color)
            }
            Legend::Categoric(categories) => categories
                .iter()
                .find(|c| (c.value - value).abs() <= f64::EPSILON)
                .map(|c| c.color),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banded_legend_covers_the_range() {
        let map = ColorMap::preset("RdYlGn").unwrap();
        let legend = Legend::banded_equal(5, 0.0..100.0, &map).unwrap();
        assert_eq!(legend.len(), 5);

        assert_eq!(legend.color_for_value(0.0), Some(map.color_at(0.0)));
        assert_eq!(legend.color_for_value(50.0), Some(map.color_at(0.5)));
        assert_eq!(legend.color_for_value(100.0), Some(map.color_at(1.0)));
        assert_eq!(legend.color_for_value(150.0), None);
    }

    #[test]
    fn quantile_bounds_build_uneven_bands() {
        let map = ColorMap::preset("Blues").unwrap();
        let legend = Legend::banded_with_bounds(&[0.0, 1.0, 10.0, 100.0], &map).unwrap();
        assert_eq!(legend.len(), 3);
        assert_eq!(legend.color_for_value(5.0), Some(map.color_at(0.5)));
    }

    #[test]
    fn categoric_legend_maps_exact_values() {
        let map = ColorMap::preset("Reds").unwrap();
        let legend = Legend::categoric(&[1.0, 2.0, 5.0], &map).unwrap();
        assert_eq!(legend.len(), 3);
        assert_eq!(legend.color_for_value(2.0), Some(map.color_at(0.5)));
        assert_eq!(legend.color_for_value(3.0), None);
    }

    #[test]
    fn degenerate_legends_are_rejected() {
        let map = ColorMap::preset("Greens").unwrap();
        assert!(Legend::banded_with_bounds(&[1.0], &map).is_err());
        assert!(Legend::banded_with_bounds(&[3.0, 1.0], &map).is_err());
        assert!(Legend::categoric(&[], &map).is_err());
        assert!(Legend::banded_equal(0, 0.0..1.0, &map).is_err());
    }
}
