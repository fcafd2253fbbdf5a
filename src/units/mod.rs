//! Physical quantities with units: lengths, pixels and stitch counts.
//!
//! Expressions follow `<number> <unit> [/ <number> <unit>]`, for example `5 stitches / 1 mm`
//! or `0.26 mm / 1 px`.

mod parse;

pub use parse::{parse, parse_as, parse_as_ratio};

/// Physical dimension of a [`UnitKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    Scalar,
    Length,
    Pixel,
    Stitch,
    Wale,
    Course,
}

/// A concrete unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitKind {
    None,
    Mm,
    Cm,
    Dm,
    M,
    In,
    Px,
    Stitches,
    Wales,
    Courses,
}

impl UnitKind {
    pub fn from_token(tok: &str) -> Option<Self> {
        Some(match tok {
            "mm" => Self::Mm,
            "cm" => Self::Cm,
            "dm" => Self::Dm,
            "m" => Self::M,
            "in" | "inch" | "inches" => Self::In,
            "px" => Self::Px,
            "stitches" | "stitch" | "st" => Self::Stitches,
            "wales" | "wale" => Self::Wales,
            "courses" | "course" => Self::Courses,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Mm => "mm",
            Self::Cm => "cm",
            Self::Dm => "dm",
            Self::M => "m",
            Self::In => "in",
            Self::Px => "px",
            Self::Stitches => "stitches",
            Self::Wales => "wales",
            Self::Courses => "courses",
        }
    }

    pub fn dimension(self) -> Dimension {
        match self {
            Self::None => Dimension::Scalar,
            Self::Mm | Self::Cm | Self::Dm | Self::M | Self::In => Dimension::Length,
            Self::Px => Dimension::Pixel,
            Self::Stitches => Dimension::Stitch,
            Self::Wales => Dimension::Wale,
            Self::Courses => Dimension::Course,
        }
    }

    /// Multiplicative factor to the dimension's base unit (mm for lengths).
    fn base_factor(self) -> f64 {
        match self {
            Self::Cm => 10.0,
            Self::Dm => 100.0,
            Self::M => 1000.0,
            Self::In => 25.4,
            _ => 1.0,
        }
    }

    pub fn is_length(self) -> bool {
        self.dimension() == Dimension::Length
    }

    /// Whether values in `self` can be converted into `other`.
    pub fn compatible(self, other: Self) -> bool {
        let (a, b) = (self.dimension(), other.dimension());
        if a == b {
            return true;
        }
        // Generic stitch counts stand for either wales or courses.
        matches!(
            (a, b),
            (Dimension::Stitch, Dimension::Wale | Dimension::Course)
                | (Dimension::Wale | Dimension::Course, Dimension::Stitch)
        )
    }
}

/// Errors raised while parsing or converting quantities.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("malformed token '{0}'")]
    MalformedToken(String),
    #[error("empty expression")]
    Empty,
    #[error("double division in '{0}'")]
    DoubleDivision(String),
    #[error("multiple numbers in one term: '{0}'")]
    MultiNumber(String),
    #[error("cannot convert {from} into {to}")]
    Incompatible { from: String, to: String },
    #[error("expected a ratio, found '{0}'")]
    NotARatio(String),
    #[error("expected a single quantity, found '{0}'")]
    NotAUnit(String),
    #[error("division by zero in '{0}'")]
    ZeroDenominator(String),
}

impl From<UnitError> for crate::foundation::error::KnitError {
    fn from(e: UnitError) -> Self {
        Self::units(e.to_string())
    }
}

/// A value with a unit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unit {
    pub value: f64,
    pub unit: UnitKind,
}

impl Unit {
    pub fn new(value: f64, unit: UnitKind) -> Self {
        Self { value, unit }
    }

    /// Convert into `target`, failing across incompatible dimensions.
    pub fn to(self, target: UnitKind) -> Result<Self, UnitError> {
        if !self.unit.compatible(target) {
            return Err(UnitError::Incompatible {
                from: self.unit.symbol().to_string(),
                to: target.symbol().to_string(),
            });
        }
        let base = self.value * self.unit.base_factor();
        Ok(Self::new(base / target.base_factor(), target))
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.unit == UnitKind::None {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit.symbol())
        }
    }
}

/// Ratio of two quantities, e.g. stitches per millimetre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitRatio {
    pub top: Unit,
    pub bot: Unit,
}

impl UnitRatio {
    pub fn new(top: Unit, bot: Unit) -> Self {
        Self { top, bot }
    }

    /// Numeric value of `top / bot`.
    pub fn value(&self) -> f64 {
        self.top.value / self.bot.value
    }

    /// Express the ratio in `top / bot` units, keeping a unit denominator.
    pub fn to(&self, top: UnitKind, bot: UnitKind) -> Result<Self, UnitError> {
        let t = self.top.to(top)?;
        let b = self.bot.to(bot)?;
        Ok(Self::new(Unit::new(t.value / b.value, top), Unit::new(1.0, bot)))
    }

    /// Swap numerator and denominator.
    pub fn inverse(&self) -> Self {
        Self::new(self.bot, self.top)
    }

    /// Collapse to a scalar when both sides share a dimension (or are the same unit).
    pub fn compact(&self) -> Option<f64> {
        if self.top.unit == self.bot.unit {
            return Some(self.value());
        }
        if self.top.unit.is_length() && self.bot.unit.is_length() {
            let t = self.top.value * self.top.unit.base_factor();
            let b = self.bot.value * self.bot.unit.base_factor();
            return Some(t / b);
        }
        None
    }
}

impl std::fmt::Display for UnitRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {}", self.top, self.bot)
    }
}

/// Result of [`parse`]: a single quantity or a ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Measure {
    Unit(Unit),
    Ratio(UnitRatio),
}

#[cfg(test)]
#[path = "../../tests/unit/units/units.rs"]
mod tests;
