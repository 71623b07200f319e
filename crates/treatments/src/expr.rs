//! Pixel expression builders for the external raster calculator.
//!
//! The calculator evaluates a closed-form arithmetic/boolean expression per
//! pixel and has no conditional primitive, so every piecewise operation is
//! written as a sum of terms, each gated by a 0/1 indicator built from
//! comparison functions (`less`, `less_equal`, `equal`, `not_equal`,
//! `logical_and`).

use itertools::Itertools;

/// No-data value callers and downstream consumers expect
pub const DEFAULT_NODATA: f64 = -9999.0;
/// Stand-in written into no-data cells while combining two rasters through
/// the processing dispatch path
pub const INTERNAL_SENTINEL: f64 = -998.0;
/// Stand-in used by the legacy command line path
pub const LEGACY_INTERNAL_SENTINEL: f64 = -1.0;

/// Renders a value the way the calculator expects its literals,
/// without a trailing `.0` for integral values
pub fn operand(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// `min(A, B)` for valid pixels
pub fn min_expr() -> String {
    "A*less_equal(A,B) + B*less(B,A)".to_string()
}

/// `max(A, B)` for valid pixels
pub fn max_expr() -> String {
    "B*less_equal(A,B) + A*less(B,A)".to_string()
}

pub fn mult_expr() -> String {
    "A*B".to_string()
}

/// `A*B`, optionally zeroing any pixel where either operand is negative
pub fn ponderation_expr(positive_values_only: bool) -> String {
    if positive_values_only {
        "A*B*less_equal(0,A)*less_equal(0,B)".to_string()
    } else {
        mult_expr()
    }
}

/// Keeps values strictly below `max_val`, everything else becomes `nodata`
pub fn lt_filter_expr(max_val: f64, nodata: f64) -> String {
    format!("less(A,{m})*A+less_equal({m},A)*{nd}", m = operand(max_val), nd = operand(nodata))
}

/// Keeps values up to and including `max_val`, everything else becomes `nodata`
pub fn le_filter_expr(max_val: f64, nodata: f64) -> String {
    format!("less_equal(A,{m})*A+less({m},A)*{nd}", m = operand(max_val), nd = operand(nodata))
}

/// Keeps values within `[0, max_val]`, everything else becomes `nodata`
pub fn bounded_filter_expr(max_val: f64, nodata: f64) -> String {
    let m = operand(max_val);
    let nd = operand(nodata);
    format!("(A*less_equal(A,{m})*less_equal(0,A))+({nd}*less({m},A))+({nd}*less(A,0))")
}

/// Rewrites one value into another and leaves everything else untouched.
/// Used to materialize a sentinel into cleared no-data cells and to restore
/// the external sentinel afterwards.
pub fn replace_value_expr(from: f64, to: f64) -> String {
    let from = operand(from);
    format!("(A=={from})*{to}+(A!={from})*A", to = operand(to))
}

/// Wraps a binary expression so that a no-data pixel (marked with
/// `sentinel`) in either input propagates instead of polluting the
/// arithmetic: the first matching branch wins, `inner` only applies where
/// both inputs are valid.
pub fn nodata_guard_expr(inner: &str, sentinel: f64) -> String {
    let nd = operand(sentinel);
    let mut expr = format!("equal(A,{nd}) * B ");
    expr += &format!(" + logical_and(not_equal(A,{nd}),equal(B,{nd})) * A");
    expr += &format!(" + logical_and(not_equal(A,{nd}),not_equal(B,{nd})) * ({inner})");
    expr
}

/// One term per `old -> new` association: `new*(A==old) + ...`
pub fn reclass_dict_expr(mapping: &[(f64, f64)]) -> String {
    mapping
        .iter()
        .map(|&(old, new)| format!("{}*(A=={})", operand(new), operand(old)))
        .join("+")
}

/// Range boundary handling of a reclassification table, using the engine's
/// encoding (0: min < value <= max, 1: min <= value < max,
/// 2: min <= value <= max, 3: min < value < max)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoundariesMode {
    MinExclMaxIncl,
    #[default]
    MinInclMaxExcl,
    MinInclMaxIncl,
    MinExclMaxExcl,
}

impl BoundariesMode {
    pub fn from_index(index: i64) -> crate::Result<Self> {
        match index {
            0 => Ok(BoundariesMode::MinExclMaxIncl),
            1 => Ok(BoundariesMode::MinInclMaxExcl),
            2 => Ok(BoundariesMode::MinInclMaxIncl),
            3 => Ok(BoundariesMode::MinExclMaxExcl),
            other => Err(crate::Error::InvalidInput(format!("Unexpected boundaries mode: {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReclassRule {
    pub min: f64,
    pub max: f64,
    pub value: f64,
}

impl ReclassRule {
    pub fn new(min: f64, max: f64, value: f64) -> Self {
        ReclassRule { min, max, value }
    }

    fn indicator(&self, mode: BoundariesMode) -> String {
        let min = operand(self.min);
        let max = operand(self.max);
        let (lower, upper) = match mode {
            BoundariesMode::MinExclMaxIncl => (format!("less({min},A)"), format!("less_equal(A,{max})")),
            BoundariesMode::MinInclMaxExcl => (format!("less_equal({min},A)"), format!("less(A,{max})")),
            BoundariesMode::MinInclMaxIncl => (format!("less_equal({min},A)"), format!("less_equal(A,{max})")),
            BoundariesMode::MinExclMaxExcl => (format!("less({min},A)"), format!("less(A,{max})")),
        };
        format!("logical_and({lower},{upper})")
    }
}

/// Compiles a reclassification table into a single expression. Ranges are
/// expected to be disjoint; with `nodata_for_missing` pixels outside every
/// range map to `nodata`, otherwise they keep their value.
pub fn reclass_table_expr(rules: &[ReclassRule], mode: BoundariesMode, nodata: f64, nodata_for_missing: bool) -> String {
    let terms = rules
        .iter()
        .map(|rule| format!("{}*{}", operand(rule.value), rule.indicator(mode)))
        .join(" + ");

    let unmatched = rules.iter().map(|rule| format!("(1-{})", rule.indicator(mode))).join("*");

    let fallback = if nodata_for_missing { operand(nodata) } else { "A".to_string() };

    format!("{terms} + {fallback}*{unmatched}")
}

#[cfg(test)]
pub(crate) mod eval {
    //! Minimal evaluator for the calculator grammar the builders emit,
    //! used to verify the piecewise formulas pixel by pixel.

    #[derive(Clone, Copy)]
    pub struct Pixel {
        pub a: f64,
        pub b: f64,
    }

    pub fn eval(expr: &str, a: f64, b: f64) -> f64 {
        let mut parser = Parser {
            chars: expr.chars().filter(|c| !c.is_whitespace()).collect(),
            pos: 0,
            pixel: Pixel { a, b },
        };
        let value = parser.expression();
        assert_eq!(parser.pos, parser.chars.len(), "trailing input in '{expr}'");
        value
    }

    struct Parser {
        chars: Vec<char>,
        pos: usize,
        pixel: Pixel,
    }

    impl Parser {
        fn peek(&self) -> Option<char> {
            self.chars.get(self.pos).copied()
        }

        fn bump(&mut self) -> char {
            let c = self.chars[self.pos];
            self.pos += 1;
            c
        }

        fn expression(&mut self) -> f64 {
            let truth = |v: bool| if v { 1.0 } else { 0.0 };
            let lhs = self.additive();
            match self.peek() {
                Some('=') => {
                    self.bump();
                    assert_eq!(self.bump(), '=');
                    truth(lhs == self.additive())
                }
                Some('!') => {
                    self.bump();
                    assert_eq!(self.bump(), '=');
                    truth(lhs != self.additive())
                }
                _ => lhs,
            }
        }

        fn additive(&mut self) -> f64 {
            let mut value = self.term();
            while let Some(op) = self.peek() {
                match op {
                    '+' => {
                        self.bump();
                        value += self.term();
                    }
                    '-' => {
                        self.bump();
                        value -= self.term();
                    }
                    _ => break,
                }
            }
            value
        }

        fn term(&mut self) -> f64 {
            let mut value = self.factor();
            while self.peek() == Some('*') {
                self.bump();
                value *= self.factor();
            }
            value
        }

        fn factor(&mut self) -> f64 {
            match self.peek().expect("unexpected end of expression") {
                '(' => {
                    self.bump();
                    let value = self.expression();
                    assert_eq!(self.bump(), ')');
                    value
                }
                '-' => {
                    self.bump();
                    -self.factor()
                }
                c if c.is_ascii_digit() => self.number(),
                _ => self.identifier(),
            }
        }

        fn at_identifier_start(&self) -> bool {
            self.peek().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        }

        fn number(&mut self) -> f64 {
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
                self.bump();
            }
            self.chars[start..self.pos].iter().collect::<String>().parse().expect("invalid number")
        }

        fn identifier(&mut self) -> f64 {
            let start = self.pos;
            while self.at_identifier_start() {
                self.bump();
            }
            let name: String = self.chars[start..self.pos].iter().collect();
            match name.as_str() {
                "A" => self.pixel.a,
                "B" => self.pixel.b,
                func => {
                    assert_eq!(self.bump(), '(');
                    let lhs = self.argument();
                    assert_eq!(self.bump(), ',');
                    let rhs = self.argument();
                    assert_eq!(self.bump(), ')');
                    let truth = |v: bool| if v { 1.0 } else { 0.0 };
                    match func {
                        "less" => truth(lhs < rhs),
                        "less_equal" => truth(lhs <= rhs),
                        "equal" => truth(lhs == rhs),
                        "not_equal" => truth(lhs != rhs),
                        "logical_and" => truth(lhs != 0.0 && rhs != 0.0),
                        other => panic!("unsupported function '{other}'"),
                    }
                }
            }
        }

        fn argument(&mut self) -> f64 {
            self.expression()
        }
    }
}
