//! Data curves and time patterns referenced by network elements.

use crate::error::{NetworkError, NetworkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CurveKind {
    Volume,
    /// Head (y) against flow (x).
    Pump,
    Efficiency,
    Headloss,
    #[default]
    Generic,
}

/// Piecewise-linear x/y curve, kept sorted by x.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub id: String,
    pub kind: CurveKind,
    points: Vec<(f64, f64)>,
}

impl Curve {
    pub fn new(
        id: impl Into<String>,
        kind: CurveKind,
        mut points: Vec<(f64, f64)>,
    ) -> NetworkResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(NetworkError::invalid(&id, "id", "must not be empty"));
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(NetworkError::invalid(&id, "points", "must be finite"));
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { id, kind, points })
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Linear interpolation, clamped to the end points. Empty curves yield 0.
    pub fn value_at(&self, x: f64) -> f64 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 0.0;
        };
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        for pair in self.points.windows(2) {
            let (x1, y1) = pair[0];
            let (x2, y2) = pair[1];
            if x1 <= x && x <= x2 {
                if x2 == x1 {
                    return y1;
                }
                let t = (x - x1) / (x2 - x1);
                return y1 + t * (y2 - y1);
            }
        }
        last.1
    }
}

/// Multipliers applied per pattern period, wrapping around.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub id: String,
    pub multipliers: Vec<f64>,
}

impl Pattern {
    pub fn new(id: impl Into<String>, multipliers: Vec<f64>) -> NetworkResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(NetworkError::invalid(&id, "id", "must not be empty"));
        }
        if multipliers.iter().any(|m| !m.is_finite()) {
            return Err(NetworkError::invalid(&id, "multipliers", "must be finite"));
        }
        Ok(Self { id, multipliers })
    }

    /// Multiplier for a 0-based period; 1.0 for an empty pattern.
    pub fn multiplier(&self, period: usize) -> f64 {
        if self.multipliers.is_empty() {
            return 1.0;
        }
        self.multipliers[period % self.multipliers.len()]
    }

    pub fn average(&self) -> f64 {
        if self.multipliers.is_empty() {
            return 1.0;
        }
        self.multipliers.iter().sum::<f64>() / self.multipliers.len() as f64
    }
}
