//! The closed function table for channel expressions
//!
//! Anything not listed here is rejected at parse time; there is no way for
//! an expression to name an identifier outside this table plus the two time
//! variables.

use super::Value;

/// Built-in functions callable from expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Abs,
    Min,
    Max,
    Round,
    Sqrt,
    Pow,
    Floor,
    Ceil,
    Log,
    Exp,
    Mod,
    Clamp,
    ClampDmx,
    HsvToRgb,
    HsvToRgbR,
    HsvToRgbG,
    HsvToRgbB,
}

impl Func {
    /// Resolve a function name, or `None` for anything outside the table
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "abs" => Self::Abs,
            "min" => Self::Min,
            "max" => Self::Max,
            "round" => Self::Round,
            "sqrt" => Self::Sqrt,
            "pow" => Self::Pow,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "log" => Self::Log,
            "exp" => Self::Exp,
            "mod" => Self::Mod,
            "clamp" => Self::Clamp,
            "clamp_dmx" => Self::ClampDmx,
            "hsv_to_rgb" => Self::HsvToRgb,
            "hsv_to_rgb_r" => Self::HsvToRgbR,
            "hsv_to_rgb_g" => Self::HsvToRgbG,
            "hsv_to_rgb_b" => Self::HsvToRgbB,
            _ => return None,
        })
    }

    /// Canonical name, used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Abs => "abs",
            Self::Min => "min",
            Self::Max => "max",
            Self::Round => "round",
            Self::Sqrt => "sqrt",
            Self::Pow => "pow",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Log => "log",
            Self::Exp => "exp",
            Self::Mod => "mod",
            Self::Clamp => "clamp",
            Self::ClampDmx => "clamp_dmx",
            Self::HsvToRgb => "hsv_to_rgb",
            Self::HsvToRgbR => "hsv_to_rgb_r",
            Self::HsvToRgbG => "hsv_to_rgb_g",
            Self::HsvToRgbB => "hsv_to_rgb_b",
        }
    }

    /// Number of arguments the function takes
    pub fn arity(&self) -> usize {
        match self {
            Self::Min | Self::Max | Self::Pow | Self::Mod => 2,
            Self::Clamp => 3,
            Self::HsvToRgb | Self::HsvToRgbR | Self::HsvToRgbG | Self::HsvToRgbB => 3,
            _ => 1,
        }
    }

    /// Whether the result is an RGB triple rather than a scalar
    pub fn returns_rgb(&self) -> bool {
        matches!(self, Self::HsvToRgb)
    }

    /// Apply to already-evaluated scalar arguments.
    ///
    /// `args` has exactly `arity()` entries; non-finite intermediate results
    /// collapse to 0 so expressions can never emit NaN or infinity.
    pub fn apply(&self, args: &[f64]) -> Value {
        let scalar = match self {
            Self::Sin => args[0].sin(),
            Self::Cos => args[0].cos(),
            Self::Tan => args[0].tan(),
            Self::Abs => args[0].abs(),
            Self::Min => args[0].min(args[1]),
            Self::Max => args[0].max(args[1]),
            Self::Round => args[0].round(),
            Self::Sqrt => args[0].sqrt(),
            Self::Pow => args[0].powf(args[1]),
            Self::Floor => args[0].floor(),
            Self::Ceil => args[0].ceil(),
            Self::Log => args[0].ln(),
            Self::Exp => args[0].exp(),
            Self::Mod => {
                if args[1] == 0.0 {
                    0.0
                } else {
                    args[0].rem_euclid(args[1])
                }
            }
            Self::Clamp => {
                let (lo, hi) = if args[1] <= args[2] {
                    (args[1], args[2])
                } else {
                    (args[2], args[1])
                };
                args[0].clamp(lo, hi)
            }
            Self::ClampDmx => args[0].clamp(0.0, 255.0),
            Self::HsvToRgb => return Value::Rgb(hsv_to_rgb(args[0], args[1], args[2])),
            Self::HsvToRgbR => hsv_to_rgb(args[0], args[1], args[2])[0],
            Self::HsvToRgbG => hsv_to_rgb(args[0], args[1], args[2])[1],
            Self::HsvToRgbB => hsv_to_rgb(args[0], args[1], args[2])[2],
        };
        Value::Scalar(finite_or_zero(scalar))
    }
}

/// Replace NaN and infinities with 0
pub fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// HSV to RGB with `h` in degrees, `s` and `v` in 0..=1.
///
/// Returns component values scaled into 0..=255.
pub fn hsv_to_rgb(h_degrees: f64, s: f64, v: f64) -> [f64; 3] {
    let h = finite_or_zero(h_degrees / 360.0).rem_euclid(1.0);
    let s = finite_or_zero(s).clamp(0.0, 1.0);
    let v = finite_or_zero(v).clamp(0.0, 1.0);

    let h_i = (h * 6.0) as i32;
    let f = h * 6.0 - h_i as f64;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    let (r, g, b) = match h_i % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    [r * 255.0, g * 255.0, b * 255.0]
}
