use crate::{Color, Error, Result};

/// Names of the single hue gradient presets, from light to dark
pub const SINGLE_HUE_PRESETS: [&str; 5] = ["Blues", "Greens", "Oranges", "Purples", "Reds"];

/// A color gradient described by positioned stops in the [0.0, 1.0] range
#[derive(Clone, Debug, PartialEq)]
pub struct ColorMap {
    stops: Vec<(f64, Color)>,
}

impl ColorMap {
    pub fn new(stops: Vec<(f64, Color)>) -> Result<Self> {
        if stops.is_empty() {
            return Err(Error::InvalidArgument("A color map needs at least one stop".into()));
        }

        if stops.iter().any(|(pos, _)| !(0.0..=1.0).contains(pos)) {
            return Err(Error::InvalidArgument("Color map stop positions must be within [0, 1]".into()));
        }

        if stops.windows(2).any(|w| w[0].0 > w[1].0) {
            return Err(Error::InvalidArgument("Color map stops must be sorted by position".into()));
        }

        Ok(ColorMap { stops })
    }

    /// Gradient with the provided colors equally spaced over [0, 1]
    pub fn from_colors(colors: &[Color]) -> Result<Self> {
        if colors.is_empty() {
            return Err(Error::InvalidArgument("A color map needs at least one color".into()));
        }

        if colors.len() == 1 {
            return ColorMap::new(vec![(0.0, colors[0])]);
        }

        let step = 1.0 / (colors.len() - 1) as f64;
        ColorMap::new(colors.iter().enumerate().map(|(i, &c)| (i as f64 * step, c)).collect())
    }

    /// Look up a named gradient preset ("RdYlGn", the single hue names,
    /// or the red/yellow/green traffic preset "RdYlGn-preset")
    pub fn preset(name: &str) -> Option<ColorMap> {
        let hex: &[&str] = match name {
            "RdYlGn" => &["#d7191c", "#fdae61", "#ffffbf", "#a6d96a", "#1a9641"],
            "RdYlGn-preset" => &["#ff0000", "#ffff00", "#00ff00"],
            "Blues" => &["#f7fbff", "#6baed6", "#08306b"],
            "Greens" => &["#f7fcf5", "#74c476", "#00441b"],
            "Oranges" => &["#fff5eb", "#fd8d3c", "#7f2704"],
            "Purples" => &["#fcfbfd", "#9e9ac8", "#3f007d"],
            "Reds" => &["#fff5f0", "#fb6a4a", "#67000d"],
            _ => return None,
        };

        let colors: Vec<Color> = hex
            .iter()
            .map(|h| Color::from_hex(h).expect("preset colors are valid hex"))
            .collect();
        Some(ColorMap::from_colors(&colors).expect("preset color list is not empty"))
    }

    /// Same gradient traversed in the opposite direction
    pub fn inverted(&self) -> ColorMap {
        let mut stops: Vec<(f64, Color)> = self.stops.iter().map(|&(pos, color)| (1.0 - pos, color)).collect();
        stops.reverse();
        ColorMap { stops }
    }

    /// Interpolated color at the given position, clamped to [0, 1]
    pub fn color_at(&self, pos: f64) -> Color {
        let pos = pos.clamp(0.0, 1.0);

        let first = self.stops.first().expect("color map is never empty");
        if pos <= first.0 {
            return first.1;
        }

        let last = self.stops.last().expect("color map is never empty");
        if pos >= last.0 {
            return last.1;
        }

        for window in self.stops.windows(2) {
            let (start_pos, start) = window[0];
            let (end_pos, end) = window[1];
            if pos <= end_pos {
                if (end_pos - start_pos).abs() < f64::EPSILON {
                    return end;
                }

                let t = (pos - start_pos) / (end_pos - start_pos);
                let lerp = |a: u8, b: u8| -> u8 { (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8 };
                return Color::rgba(
                    lerp(start.r, end.r),
                    lerp(start.g, end.g),
                    lerp(start.b, end.b),
                    lerp(start.a, end.a),
                );
            }
        }

        last.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_between_stops() {
        let map = ColorMap::from_colors(&[Color::rgb(0, 0, 0), Color::rgb(255, 255, 255)]).unwrap();
        assert_eq!(map.color_at(0.0), Color::rgb(0, 0, 0));
        assert_eq!(map.color_at(1.0), Color::rgb(255, 255, 255));
        assert_eq!(map.color_at(0.5), Color::rgb(128, 128, 128));
        // out of range positions clamp to the edge colors
        assert_eq!(map.color_at(-2.0), Color::rgb(0, 0, 0));
        assert_eq!(map.color_at(5.0), Color::rgb(255, 255, 255));
    }

    #[test]
    fn inversion_flips_the_gradient() {
        let map = ColorMap::preset("RdYlGn").unwrap();
        let inverted = map.inverted();
        assert_eq!(map.color_at(0.0), inverted.color_at(1.0));
        assert_eq!(map.color_at(1.0), inverted.color_at(0.0));
        assert_eq!(map.color_at(0.5), inverted.color_at(0.5));
    }

    #[test]
    fn all_presets_resolve() {
        for name in SINGLE_HUE_PRESETS {
            assert!(ColorMap::preset(name).is_some(), "missing preset {name}");
        }
        assert!(ColorMap::preset("RdYlGn").is_some());
        assert!(ColorMap::preset("NoSuchRamp").is_none());
    }

    #[test]
    fn unsorted_stops_are_rejected() {
        let stops = vec![(0.8, Color::rgb(0, 0, 0)), (0.2, Color::rgb(1, 1, 1))];
        assert!(ColorMap::new(stops).is_err());
    }
}
