//! Floating-point evaluation of trees.
//!
//! Evaluation is a single post-order walk: every node folds the values of
//! its children through its row in the dispatch table. Intermediate
//! results are complex so that expressions like `sqrt(-4) * sqrt(-9)`
//! come out right; the projection to a real answer happens once, at the
//! end, according to the complex format preference.
//!
//! There is no error channel here. Anything without a numeric value
//! (an unbound symbol, a list, a division of zero by zero) evaluates to
//! NaN and NaN propagates.

use std::collections::HashMap;

use crate::node::Node;
use crate::pool::Pool;
use crate::prefs::{AngleUnit, ComplexFormat, Preferences};

/// Imaginary residue below this relative threshold is rounding noise
/// from intermediate complex values, not a genuinely complex result.
const IMAGINARY_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn real(re: f64) -> Complex {
        Complex { re, im: 0.0 }
    }

    pub fn nan() -> Complex {
        Complex {
            re: f64::NAN,
            im: f64::NAN,
        }
    }

    pub fn is_nan(&self) -> bool {
        self.re.is_nan() || self.im.is_nan()
    }

    fn is_real(&self) -> bool {
        self.im == 0.0
    }

    pub fn add(self, other: Complex) -> Complex {
        Complex {
            re: self.re + other.re,
            im: self.im + other.im,
        }
    }

    pub fn sub(self, other: Complex) -> Complex {
        Complex {
            re: self.re - other.re,
            im: self.im - other.im,
        }
    }

    pub fn mul(self, other: Complex) -> Complex {
        Complex {
            re: self.re * other.re - self.im * other.im,
            im: self.re * other.im + self.im * other.re,
        }
    }

    pub fn div(self, other: Complex) -> Complex {
        let norm = other.re * other.re + other.im * other.im;
        Complex {
            re: (self.re * other.re + self.im * other.im) / norm,
            im: (self.im * other.re - self.re * other.im) / norm,
        }
    }

    pub fn opp(self) -> Complex {
        Complex {
            re: -self.re,
            im: -self.im,
        }
    }

    fn abs(self) -> f64 {
        self.re.hypot(self.im)
    }

    fn arg(self) -> f64 {
        self.im.atan2(self.re)
    }

    pub fn ln(self) -> Complex {
        if self.is_real() && self.re > 0.0 {
            return Complex::real(self.re.ln());
        }
        if self.abs() == 0.0 {
            return Complex::nan();
        }
        Complex {
            re: self.abs().ln(),
            im: self.arg(),
        }
    }

    fn exp(self) -> Complex {
        let magnitude = self.re.exp();
        Complex {
            re: magnitude * self.im.cos(),
            im: magnitude * self.im.sin(),
        }
    }

    pub fn pow(self, exponent: Complex) -> Complex {
        if self.is_real() && exponent.is_real() {
            // Real fast paths keep exact answers exact
            if self.re > 0.0 || (exponent.re.fract() == 0.0 && self.re != 0.0) {
                return Complex::real(self.re.powf(exponent.re));
            }
            if self.re == 0.0 {
                return if exponent.re > 0.0 {
                    Complex::real(0.0)
                } else {
                    Complex::nan()
                };
            }
        }
        exponent.mul(self.ln()).exp()
    }

    pub fn sqrt(self) -> Complex {
        if self.is_real() && self.re >= 0.0 {
            return Complex::real(self.re.sqrt());
        }
        self.pow(Complex::real(0.5))
    }
}

pub struct ApproxContext {
    pub angle_unit: AngleUnit,
    pub complex_format: ComplexFormat,
    /// Values of free symbols during evaluation.
    pub env: HashMap<String, f64>,
}

impl ApproxContext {
    pub fn new(prefs: &Preferences) -> ApproxContext {
        ApproxContext {
            angle_unit: prefs.angle_unit,
            complex_format: prefs.complex_format,
            env: HashMap::new(),
        }
    }

    pub fn with_variable(mut self, name: &str, value: f64) -> ApproxContext {
        self.env.insert(name.to_string(), value);
        self
    }

    /// Collapse a complex result to the real answer the display shows.
    pub fn project(&self, value: Complex) -> f64 {
        match self.complex_format {
            ComplexFormat::Real => {
                if value.im.abs() <= IMAGINARY_TOLERANCE * value.re.abs().max(1.0) {
                    value.re
                } else {
                    f64::NAN
                }
            }
            ComplexFormat::Cartesian => value.re,
        }
    }
}

impl Default for ApproxContext {
    fn default() -> ApproxContext {
        ApproxContext::new(&Preferences::default())
    }
}

/// Evaluate the tree at `offset`.
pub fn approximate(pool: &Pool, offset: usize, ctx: &ApproxContext) -> Complex {
    let node = pool.view(offset);
    let children: Vec<Complex> = node
        .children()
        .map(|child| approximate(pool, child.offset(), ctx))
        .collect();
    (node.properties().approximate)(node, &children, ctx)
}

/// Evaluate with one free variable bound, for plots and tables.
pub fn sample(pool: &Pool, offset: usize, name: &str, value: f64, prefs: &Preferences) -> f64 {
    let ctx = ApproxContext::new(prefs).with_variable(name, value);
    let result = approximate(pool, offset, &ctx);
    ctx.project(result)
}

// -- Dispatch table rows ----------------------------------------------------

pub fn approx_integer(node: Node, _children: &[Complex], _ctx: &ApproxContext) -> Complex {
    match node.as_integer() {
        Some(big) => Complex::real(big.to_f64()),
        None => Complex::nan(),
    }
}

pub fn approx_float(node: Node, _children: &[Complex], _ctx: &ApproxContext) -> Complex {
    match node.as_float() {
        Some(value) => Complex::real(value),
        None => Complex::nan(),
    }
}

pub fn approx_constant(node: Node, _children: &[Complex], _ctx: &ApproxContext) -> Complex {
    match node.constant_id() {
        Some(id) => Complex::real(id.value()),
        None => Complex::nan(),
    }
}

pub fn approx_symbol(node: Node, _children: &[Complex], ctx: &ApproxContext) -> Complex {
    match node.symbol_name().and_then(|name| ctx.env.get(name)) {
        Some(value) => Complex::real(*value),
        None => Complex::nan(),
    }
}

pub fn approx_undefined(_node: Node, _children: &[Complex], _ctx: &ApproxContext) -> Complex {
    Complex::nan()
}

pub fn approx_add(_node: Node, children: &[Complex], _ctx: &ApproxContext) -> Complex {
    children
        .iter()
        .fold(Complex::real(0.0), |sum, term| sum.add(*term))
}

pub fn approx_mul(_node: Node, children: &[Complex], _ctx: &ApproxContext) -> Complex {
    children
        .iter()
        .fold(Complex::real(1.0), |product, factor| product.mul(*factor))
}

pub fn approx_sub(_node: Node, children: &[Complex], _ctx: &ApproxContext) -> Complex {
    children[0].sub(children[1])
}

pub fn approx_div(_node: Node, children: &[Complex], _ctx: &ApproxContext) -> Complex {
    children[0].div(children[1])
}

pub fn approx_pow(_node: Node, children: &[Complex], _ctx: &ApproxContext) -> Complex {
    children[0].pow(children[1])
}

pub fn approx_opp(_node: Node, children: &[Complex], _ctx: &ApproxContext) -> Complex {
    children[0].opp()
}

pub fn approx_sqrt(_node: Node, children: &[Complex], _ctx: &ApproxContext) -> Complex {
    children[0].sqrt()
}

pub fn approx_log(_node: Node, children: &[Complex], _ctx: &ApproxContext) -> Complex {
    children[0].ln().div(children[1].ln())
}

pub fn approx_ln(_node: Node, children: &[Complex], _ctx: &ApproxContext) -> Complex {
    children[0].ln()
}

pub fn approx_sin(_node: Node, children: &[Complex], ctx: &ApproxContext) -> Complex {
    let angle = children[0];
    if !angle.is_real() {
        return Complex::nan();
    }
    Complex::real(ctx.angle_unit.to_radians(angle.re).sin())
}

pub fn approx_cos(_node: Node, children: &[Complex], ctx: &ApproxContext) -> Complex {
    let angle = children[0];
    if !angle.is_real() {
        return Complex::nan();
    }
    Complex::real(ctx.angle_unit.to_radians(angle.re).cos())
}

/// Lists, matrices and placeholders have no scalar value.
pub fn approx_opaque(_node: Node, _children: &[Complex], _ctx: &ApproxContext) -> Complex {
    Complex::nan()
}

#[cfg(test)]
mod specs {
    use super::*;
    use crate::block::ConstantId;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn power_of_two() {
        let mut pool = Pool::new(256);
        pool.push_integer(2).unwrap();
        pool.push_integer(10).unwrap();
        let pow = pool.push_pow().unwrap();
        let ctx = ApproxContext::default();
        let value = approximate(&pool, pow, &ctx);
        assert_eq!(ctx.project(value), 1024.0);
    }

    #[test]
    fn trigonometry_honors_the_angle_unit() {
        let mut pool = Pool::new(256);
        pool.push_integer(90).unwrap();
        let sin = pool.push_sin().unwrap();

        let radians = ApproxContext::default();
        assert!(close(
            radians.project(approximate(&pool, sin, &radians)),
            (90.0f64).sin()
        ));

        let mut degrees = ApproxContext::default();
        degrees.angle_unit = AngleUnit::Degree;
        assert!(close(degrees.project(approximate(&pool, sin, &degrees)), 1.0));
    }

    #[test]
    fn complex_intermediates_can_cancel() {
        // sqrt(-4) * sqrt(-9) = -6
        let mut pool = Pool::new(256);
        pool.push_integer(-4).unwrap();
        pool.push_sqrt().unwrap();
        pool.push_integer(-9).unwrap();
        pool.push_sqrt().unwrap();
        let mul = pool.push_mul(2).unwrap();
        let ctx = ApproxContext::default();
        let value = approximate(&pool, mul, &ctx);
        assert!(close(ctx.project(value), -6.0));
    }

    #[test]
    fn complex_results_are_rejected_in_real_format() {
        let mut pool = Pool::new(256);
        pool.push_integer(-1).unwrap();
        let sqrt = pool.push_sqrt().unwrap();
        let ctx = ApproxContext::default();
        assert!(ctx.project(approximate(&pool, sqrt, &ctx)).is_nan());
    }

    #[test]
    fn free_symbols_come_from_the_environment() {
        // x^2 + 1 at x = 3
        let mut pool = Pool::new(256);
        pool.push_symbol("x").unwrap();
        pool.push_integer(2).unwrap();
        pool.push_pow().unwrap();
        pool.push_integer(1).unwrap();
        let add = pool.push_add(2).unwrap();

        let prefs = Preferences::default();
        assert_eq!(sample(&pool, add, "x", 3.0, &prefs), 10.0);
        // Unbound symbol
        let ctx = ApproxContext::default();
        assert!(ctx.project(approximate(&pool, add, &ctx)).is_nan());
    }

    #[test]
    fn several_free_symbols() {
        use maplit::hashmap;
        // x * y + x at x = 2, y = 5
        let mut pool = Pool::new(256);
        pool.push_symbol("x").unwrap();
        pool.push_symbol("y").unwrap();
        pool.push_mul(2).unwrap();
        pool.push_symbol("x").unwrap();
        let add = pool.push_add(2).unwrap();
        let ctx = ApproxContext {
            env: hashmap! {
                "x".to_string() => 2.0,
                "y".to_string() => 5.0,
            },
            ..ApproxContext::default()
        };
        assert_eq!(ctx.project(approximate(&pool, add, &ctx)), 12.0);
    }

    #[test]
    fn constants_and_logs() {
        // log(e^3, e) via Log(Pow(e, 3), e)
        let mut pool = Pool::new(256);
        pool.push_constant(ConstantId::E).unwrap();
        pool.push_integer(3).unwrap();
        pool.push_pow().unwrap();
        pool.push_constant(ConstantId::E).unwrap();
        let log = pool.push_log().unwrap();
        let ctx = ApproxContext::default();
        assert!(close(ctx.project(approximate(&pool, log, &ctx)), 3.0));
    }

    #[test]
    fn undefined_is_nan() {
        let mut pool = Pool::new(256);
        pool.push_undefined().unwrap();
        pool.push_integer(5).unwrap();
        let add = pool.push_add(2).unwrap();
        let ctx = ApproxContext::default();
        assert!(approximate(&pool, add, &ctx).is_nan());
    }
}
