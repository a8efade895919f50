//! Sandboxed arithmetic expressions for programmable scenes
//!
//! Expressions are parsed once into an immutable tree and evaluated every
//! engine tick with two free variables: `t` (seconds since scene start) and
//! `p` (percent of the scene duration, 0-100). The function table is closed;
//! identifiers outside it are rejected at parse time, and evaluation is
//! allocation-free and side-effect-free. Division by zero and non-finite
//! intermediates collapse to 0, so the output contract
//! `clamp(round(result), 0, 255)` always holds.

mod functions;
mod parser;

pub use functions::{hsv_to_rgb, Func};
pub use parser::parse;

use thiserror::Error;

/// Maximum nesting depth for parsing and evaluation
pub const MAX_DEPTH: usize = 64;

/// Expression parse or evaluation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    /// Character outside the grammar
    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    /// Malformed numeric literal
    #[error("Invalid number '{0}' at position {1}")]
    BadNumber(String, usize),

    /// Expression ended mid-production
    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    /// Token in an illegal position
    #[error("Unexpected {0} at position {1}")]
    UnexpectedToken(String, usize),

    /// Identifier that is neither `t`, `p` nor a known function
    #[error("Unknown identifier '{0}' (allowed: t, p and the built-in functions)")]
    UnknownIdentifier(String),

    /// Function called with the wrong number of arguments
    #[error("{func} takes {expected} argument(s), got {got}")]
    WrongArity {
        /// Function name
        func: &'static str,
        /// Declared arity
        expected: usize,
        /// Arguments supplied
        got: usize,
    },

    /// Nesting beyond [`MAX_DEPTH`]
    #[error("Expression nested too deeply")]
    TooDeep,

    /// Subscript on something other than `hsv_to_rgb(..)`
    #[error("Subscript is only valid directly on hsv_to_rgb(..)")]
    BadSubscript,

    /// Subscript outside 0..=2
    #[error("Subscript must be 0, 1 or 2, got {0} at position {1}")]
    SubscriptRange(String, usize),

    /// RGB triple used where a number is required
    #[error("hsv_to_rgb(..) must be subscripted before use in arithmetic")]
    NotScalar,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Evaluation result: a number, or the triple produced by `hsv_to_rgb`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Plain number
    Scalar(f64),
    /// RGB components in 0..=255
    Rgb([f64; 3]),
}

impl Value {
    fn scalar(self) -> Result<f64, ExprError> {
        match self {
            Value::Scalar(v) => Ok(v),
            Value::Rgb(_) => Err(ExprError::NotScalar),
        }
    }
}

/// A compiled expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Num(f64),
    /// The variable `t`: seconds since scene start
    Time,
    /// The variable `p`: percent of duration elapsed, 0-100
    Percent,
    /// Unary minus
    Neg(Box<Expr>),
    /// Binary operation
    Bin(BinOp, Box<Expr>, Box<Expr>),
    /// Function call
    Call(Func, Vec<Expr>),
    /// Subscript on an RGB triple, index 0..=2
    Index(Box<Expr>, u8),
}

impl Expr {
    /// Parse and validate an expression
    pub fn compile(src: &str) -> Result<Self, ExprError> {
        parse(src)
    }

    /// Evaluate with the given time variables
    pub fn eval(&self, t: f64, p: f64) -> Result<Value, ExprError> {
        self.eval_depth(t, p, 0)
    }

    /// Evaluate and apply the DMX output contract: finite, rounded, clamped
    /// to 0..=255.
    pub fn eval_dmx(&self, t: f64, p: f64) -> Result<u8, ExprError> {
        let value = match self.eval(t, p)? {
            Value::Scalar(v) => v,
            // a bare hsv_to_rgb(..) channel emits its red component
            Value::Rgb(rgb) => rgb[0],
        };
        let value = functions::finite_or_zero(value);
        Ok(value.round().clamp(0.0, 255.0) as u8)
    }

    fn eval_depth(&self, t: f64, p: f64, depth: usize) -> Result<Value, ExprError> {
        if depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        match self {
            Expr::Num(n) => Ok(Value::Scalar(*n)),
            Expr::Time => Ok(Value::Scalar(t)),
            Expr::Percent => Ok(Value::Scalar(p)),
            Expr::Neg(inner) => {
                let v = inner.eval_depth(t, p, depth + 1)?.scalar()?;
                Ok(Value::Scalar(-v))
            }
            Expr::Bin(op, lhs, rhs) => {
                let l = lhs.eval_depth(t, p, depth + 1)?.scalar()?;
                let r = rhs.eval_depth(t, p, depth + 1)?.scalar()?;
                let out = match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => {
                        if r == 0.0 {
                            0.0
                        } else {
                            l / r
                        }
                    }
                    BinOp::Rem => {
                        if r == 0.0 {
                            0.0
                        } else {
                            l % r
                        }
                    }
                };
                Ok(Value::Scalar(functions::finite_or_zero(out)))
            }
            Expr::Call(func, args) => {
                // arity is checked at parse time; 3 covers every function
                let mut evaluated = [0.0f64; 3];
                for (slot, arg) in evaluated.iter_mut().zip(args.iter()) {
                    *slot = arg.eval_depth(t, p, depth + 1)?.scalar()?;
                }
                Ok(func.apply(&evaluated[..args.len()]))
            }
            Expr::Index(inner, index) => {
                match inner.eval_depth(t, p, depth + 1)? {
                    Value::Rgb(rgb) => Ok(Value::Scalar(rgb[*index as usize])),
                    // unreachable after parse validation
                    Value::Scalar(_) => Err(ExprError::BadSubscript),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn eval_scalar(src: &str, t: f64, p: f64) -> f64 {
        match Expr::compile(src).unwrap().eval(t, p).unwrap() {
            Value::Scalar(v) => v,
            Value::Rgb(_) => panic!("expected scalar"),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval_scalar("2 + 3 * 4", 0.0, 0.0), 14.0);
        assert_eq!(eval_scalar("(2 + 3) * 4", 0.0, 0.0), 20.0);
        assert_eq!(eval_scalar("10 - 4 - 3", 0.0, 0.0), 3.0);
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(eval_scalar("-5 + 3", 0.0, 0.0), -2.0);
        assert_eq!(eval_scalar("--5", 0.0, 0.0), 5.0);
        assert_eq!(eval_scalar("2 * -3", 0.0, 0.0), -6.0);
    }

    #[test]
    fn test_time_variables() {
        assert_eq!(eval_scalar("t", 2.5, 0.0), 2.5);
        assert_eq!(eval_scalar("p", 0.0, 80.0), 80.0);
        assert_eq!(eval_scalar("255 * p / 100", 0.0, 50.0), 127.5);
    }

    #[test]
    fn test_sine_fade() {
        let expr = Expr::compile("255*sin(t)").unwrap();
        assert_eq!(expr.eval_dmx(PI / 2.0, 0.0).unwrap(), 255);
        assert_eq!(expr.eval_dmx(PI, 0.0).unwrap(), 0);
        // negative half wave clamps to 0
        assert_eq!(expr.eval_dmx(1.5 * PI, 0.0).unwrap(), 0);
    }

    #[test]
    fn test_division_by_zero_is_zero() {
        assert_eq!(eval_scalar("1 / 0", 0.0, 0.0), 0.0);
        assert_eq!(eval_scalar("5 % 0", 0.0, 0.0), 0.0);
        assert_eq!(eval_scalar("1 / (t - t)", 1.0, 0.0), 0.0);
    }

    #[test]
    fn test_output_clamped_and_rounded() {
        let expr = Expr::compile("300").unwrap();
        assert_eq!(expr.eval_dmx(0.0, 0.0).unwrap(), 255);
        let expr = Expr::compile("-12").unwrap();
        assert_eq!(expr.eval_dmx(0.0, 0.0).unwrap(), 0);
        let expr = Expr::compile("127.6").unwrap();
        assert_eq!(expr.eval_dmx(0.0, 0.0).unwrap(), 128);
    }

    #[test]
    fn test_hsv_subscript() {
        let expr = Expr::compile("hsv_to_rgb(0, 1, 1)[0]").unwrap();
        assert_eq!(expr.eval_dmx(0.0, 0.0).unwrap(), 255);
        let expr = Expr::compile("hsv_to_rgb(0, 1, 1)[1]").unwrap();
        assert_eq!(expr.eval_dmx(0.0, 0.0).unwrap(), 0);
    }

    #[test]
    fn test_hsv_component_functions() {
        assert_eq!(eval_scalar("hsv_to_rgb_r(120, 1, 1)", 0.0, 0.0) as u8, 0);
        assert_eq!(eval_scalar("hsv_to_rgb_g(120, 1, 1)", 0.0, 0.0) as u8, 255);
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        assert!(matches!(
            Expr::compile("open(t)"),
            Err(ExprError::UnknownIdentifier(_))
        ));
        assert!(matches!(
            Expr::compile("x + 1"),
            Err(ExprError::UnknownIdentifier(_))
        ));
    }

    #[test]
    fn test_wrong_arity_rejected() {
        assert!(matches!(
            Expr::compile("sin(1, 2)"),
            Err(ExprError::WrongArity { .. })
        ));
        assert!(matches!(
            Expr::compile("clamp(1)"),
            Err(ExprError::WrongArity { .. })
        ));
    }

    #[test]
    fn test_subscript_restrictions() {
        assert!(matches!(
            Expr::compile("sin(t)[0]"),
            Err(ExprError::BadSubscript)
        ));
        assert!(matches!(
            Expr::compile("hsv_to_rgb(0,1,1)[3]"),
            Err(ExprError::SubscriptRange(..))
        ));
        // second subscript lands on a scalar
        assert!(Expr::compile("hsv_to_rgb(0,1,1)[0][1]").is_err());
    }

    #[test]
    fn test_depth_cap() {
        let mut src = String::new();
        for _ in 0..80 {
            src.push('(');
        }
        src.push('1');
        for _ in 0..80 {
            src.push(')');
        }
        assert!(matches!(Expr::compile(&src), Err(ExprError::TooDeep)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(Expr::compile("").is_err());
        assert!(Expr::compile("1 +").is_err());
        assert!(Expr::compile("1 2").is_err());
        assert!(Expr::compile("@t").is_err());
    }

    #[test]
    fn test_clamp_and_mod() {
        assert_eq!(eval_scalar("clamp(300, 0, 255)", 0.0, 0.0), 255.0);
        assert_eq!(eval_scalar("clamp_dmx(-4)", 0.0, 0.0), 0.0);
        assert_eq!(eval_scalar("mod(7, 3)", 0.0, 0.0), 1.0);
        assert_eq!(eval_scalar("mod(-1, 3)", 0.0, 0.0), 2.0);
    }
}
