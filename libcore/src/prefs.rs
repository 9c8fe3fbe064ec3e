//! Computation preferences.
//!
//! Loaded from configuration (the sandbox reads them from a YAML file) or
//! built programmatically; [`Preferences::default`] matches the behavior
//! of a freshly reset device.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AngleUnit {
    Radian,
    Degree,
}

impl AngleUnit {
    pub fn to_radians(self, angle: f64) -> f64 {
        match self {
            AngleUnit::Radian => angle,
            AngleUnit::Degree => angle.to_radians(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplexFormat {
    /// Results with an imaginary part become undefined.
    Real,
    /// Keep the real part, accepting a small imaginary residue.
    Cartesian,
}

/// How hard to try before falling back to a numeric answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Symbolic reduction only. Interrupted reductions return the input.
    Symbolic,
    /// Symbolic first; on interruption, retry as a pure approximation.
    /// At most one downgrade per computation.
    SymbolicThenApprox,
    /// Straight to numerics.
    ApproxOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budgets {
    /// Shallow reductions allowed per computation.
    pub reduction_steps: usize,
    /// Applications of a single rewrite rule on a single node.
    pub rewrite_passes: usize,
    /// How deep the reduction walk may recurse.
    pub recursion_depth: usize,
}

impl Default for Budgets {
    fn default() -> Budgets {
        Budgets {
            reduction_steps: 4096,
            rewrite_passes: 64,
            recursion_depth: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_angle_unit")]
    pub angle_unit: AngleUnit,
    #[serde(default = "default_complex_format")]
    pub complex_format: ComplexFormat,
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,
    #[serde(default)]
    pub budgets: Budgets,
}

fn default_angle_unit() -> AngleUnit {
    AngleUnit::Radian
}

fn default_complex_format() -> ComplexFormat {
    ComplexFormat::Real
}

fn default_strategy() -> Strategy {
    Strategy::SymbolicThenApprox
}

impl Default for Preferences {
    fn default() -> Preferences {
        Preferences {
            angle_unit: default_angle_unit(),
            complex_format: default_complex_format(),
            strategy: default_strategy(),
            budgets: Budgets::default(),
        }
    }
}
