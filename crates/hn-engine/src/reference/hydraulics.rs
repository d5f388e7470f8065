//! Link head-loss laws and the nodal head balance.
//!
//! Unknowns are junction heads. Each link's flow is an explicit, monotone
//! function of the head difference across it, so a junction residual is
//! inflow minus outflow minus demand.

use std::f64::consts::PI;

use hn_core::constants::G0_MPS2;
use hn_project::HeadlossFormula;
use nalgebra::{DMatrix, DVector};

use super::newton::{NewtonConfig, newton_solve};
use crate::error::SolverFault;
use crate::input::{EngineOptions, LinkSpec, LinkSpecKind};
use hn_network::ValveType;

/// Flow through a closed link per metre of head difference.
pub(crate) const CLOSED_CONDUCTANCE: f64 = 1e-8;
/// Head difference below which power laws are linearised.
const LINEAR_BAND: f64 = 1e-4;
const MIN_LOSS_COEFF: f64 = 1e-3;
/// Head rise below which a constant-power pump is linearised.
const POWER_PUMP_MIN_HEAD: f64 = 1.0;
const WATER_DENSITY: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Law {
    /// h = r |q|^n
    Resistance { r: f64, n: f64, check_valve: bool },
    /// (flow, head) at unit speed, strictly decreasing head, first point at zero flow.
    PumpCurve { points: Vec<(f64, f64)> },
    PumpPower { watts: f64 },
    FixedFlow { q: f64 },
}

#[derive(Debug, Clone)]
pub(crate) struct HydLink {
    pub start: usize,
    pub end: usize,
    pub law: Law,
    pub base_open: bool,
    /// Flow area, zero for pumps.
    pub area: f64,
    pub length: f64,
    pub speed: f64,
    pub speed_pattern: Vec<f64>,
    pub is_pump: bool,
}

/// Flow through one link at one head difference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LinkFlow {
    pub q: f64,
    /// dq / d(h_start - h_end), always positive.
    pub dq: f64,
    pub active: bool,
}

impl LinkFlow {
    fn closed(dh: f64) -> Self {
        Self {
            q: CLOSED_CONDUCTANCE * dh,
            dq: CLOSED_CONDUCTANCE,
            active: false,
        }
    }
}

fn area(diameter: f64) -> f64 {
    PI * diameter * diameter / 4.0
}

/// Build the static law for a link, or the reason it cannot be modelled.
pub(crate) fn prepare(spec: &LinkSpec, options: &EngineOptions) -> Result<HydLink, String> {
    let mut link = HydLink {
        start: spec.start.index() as usize,
        end: spec.end.index() as usize,
        law: Law::FixedFlow { q: 0.0 },
        base_open: spec.initially_open,
        area: 0.0,
        length: 0.0,
        speed: 1.0,
        speed_pattern: Vec::new(),
        is_pump: false,
    };
    match &spec.kind {
        LinkSpecKind::Pipe {
            length,
            diameter,
            roughness,
            check_valve,
            ..
        } => {
            let (d, l) = (*diameter, *length);
            let r = match options.headloss {
                HeadlossFormula::Hw => 10.667 * l / (roughness.powf(1.852) * d.powf(4.871)),
                HeadlossFormula::Dw => {
                    // Fully rough turbulent friction factor.
                    let eps = roughness.max(1e-7);
                    let f = 0.25 / (eps / (3.7 * d)).log10().powi(2);
                    8.0 * f * l / (G0_MPS2 * PI * PI * d.powi(5))
                }
                HeadlossFormula::Cm => 10.294 * roughness * roughness * l / d.powf(16.0 / 3.0),
            };
            let n = match options.headloss {
                HeadlossFormula::Hw => 1.852,
                HeadlossFormula::Dw | HeadlossFormula::Cm => 2.0,
            };
            if !(r.is_finite() && r > 0.0) {
                return Err(format!("pipe resistance {r} is not usable"));
            }
            link.law = Law::Resistance {
                r,
                n,
                check_valve: *check_valve,
            };
            link.area = area(d);
            link.length = l;
        }
        LinkSpecKind::Pump {
            curve,
            power_kw,
            speed,
            speed_pattern,
        } => {
            link.is_pump = true;
            link.speed = *speed;
            link.speed_pattern = speed_pattern.clone();
            link.law = match (curve, power_kw) {
                (Some(points), _) => Law::PumpCurve {
                    points: pump_curve(points)?,
                },
                (None, Some(kw)) => Law::PumpPower { watts: kw * 1000.0 },
                (None, None) => return Err("pump has neither curve nor power".into()),
            };
        }
        LinkSpecKind::Valve {
            valve_type,
            diameter,
            setting,
            minor_loss,
        } => {
            let a = area(*diameter);
            link.area = a;
            let throttle = |k: f64| Law::Resistance {
                r: k.max(MIN_LOSS_COEFF) / (2.0 * G0_MPS2 * a * a),
                n: 2.0,
                check_valve: false,
            };
            link.law = match valve_type {
                ValveType::Tcv => throttle(*setting),
                ValveType::Fcv => Law::FixedFlow { q: *setting },
                ValveType::Prv | ValveType::Psv | ValveType::Pbv => throttle(*minor_loss),
                ValveType::Gpv => {
                    return Err("general purpose valves are not supported".into());
                }
            };
        }
    }
    Ok(link)
}

/// Normalise a pump curve: one point becomes the usual three-point curve,
/// and a curve not starting at zero flow is extended back to shutoff.
fn pump_curve(points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>, String> {
    let mut pts: Vec<(f64, f64)> = match points {
        [] => return Err("pump curve has no points".into()),
        [(q, h)] => vec![(0.0, 1.33 * h), (*q, *h), (2.0 * q, 0.0)],
        _ => points.to_vec(),
    };
    for pair in pts.windows(2) {
        let (q1, h1) = pair[0];
        let (q2, h2) = pair[1];
        if !(q2 > q1 && h2 < h1) {
            return Err("pump curve head must decrease as flow increases".into());
        }
    }
    if pts[0].0 < 0.0 {
        return Err("pump curve has negative flow".into());
    }
    if pts[0].0 > 0.0 {
        let (q1, h1) = pts[0];
        let (q2, h2) = pts[1];
        let slope = (h2 - h1) / (q2 - q1);
        pts.insert(0, (0.0, h1 - slope * q1));
    }
    Ok(pts)
}

fn power_law(dh: f64, r: f64, n: f64) -> LinkFlow {
    let a = dh.abs();
    if a < LINEAR_BAND {
        let g = (LINEAR_BAND / r).powf(1.0 / n) / LINEAR_BAND;
        return LinkFlow {
            q: g * dh,
            dq: g,
            active: true,
        };
    }
    let q = (a / r).powf(1.0 / n);
    LinkFlow {
        q: q.copysign(dh),
        dq: q / (n * a),
        active: true,
    }
}

fn curve_flow(points: &[(f64, f64)], w: f64, dh: f64) -> LinkFlow {
    let rise = -dh;
    let shutoff = w * w * points[0].1;
    if rise >= shutoff {
        // Pump cannot deliver; it behaves like a closed check valve.
        return LinkFlow {
            q: CLOSED_CONDUCTANCE * (shutoff - rise),
            dq: CLOSED_CONDUCTANCE,
            active: false,
        };
    }
    let x = rise / (w * w);
    let seg = points
        .windows(2)
        .position(|p| x >= p[1].1)
        .unwrap_or(points.len() - 2);
    let (q1, h1) = points[seg];
    let (q2, h2) = points[seg + 1];
    let slope = (h2 - h1) / (q2 - q1);
    let q_unit = q1 + (x - h1) / slope;
    LinkFlow {
        q: w * q_unit,
        dq: -1.0 / (w * slope),
        active: true,
    }
}

fn power_flow(watts: f64, dh: f64) -> LinkFlow {
    let rise = -dh;
    let q_max = watts / (WATER_DENSITY * G0_MPS2 * POWER_PUMP_MIN_HEAD);
    if rise < POWER_PUMP_MIN_HEAD {
        LinkFlow {
            q: q_max + (POWER_PUMP_MIN_HEAD - rise) * q_max / POWER_PUMP_MIN_HEAD,
            dq: q_max / POWER_PUMP_MIN_HEAD,
            active: true,
        }
    } else {
        LinkFlow {
            q: watts / (WATER_DENSITY * G0_MPS2 * rise),
            dq: watts / (WATER_DENSITY * G0_MPS2 * rise * rise),
            active: true,
        }
    }
}

impl HydLink {
    /// Relative speed at a pattern period.
    pub fn speed_at(&self, period: usize) -> f64 {
        let mult = if self.speed_pattern.is_empty() {
            1.0
        } else {
            self.speed_pattern[period % self.speed_pattern.len()]
        };
        self.speed * mult
    }

    pub fn flow(&self, speed: f64, dh: f64) -> LinkFlow {
        if !self.base_open || (self.is_pump && speed <= 0.0) {
            return LinkFlow::closed(dh);
        }
        match &self.law {
            Law::Resistance { r, n, check_valve } => {
                if *check_valve && dh < 0.0 {
                    LinkFlow::closed(dh)
                } else {
                    power_law(dh, *r, *n)
                }
            }
            Law::PumpCurve { points } => curve_flow(points, speed, dh),
            Law::PumpPower { watts } => power_flow(watts * speed.powi(3), dh),
            Law::FixedFlow { q } => LinkFlow {
                q: q + CLOSED_CONDUCTANCE * dh,
                dq: CLOSED_CONDUCTANCE,
                active: true,
            },
        }
    }
}

/// Per-step loads on the balance.
pub(crate) struct Loads<'a> {
    /// Head at each node; entries for junctions are ignored.
    pub fixed_heads: &'a [f64],
    /// Demand at each node (m³/s), zero for fixed-head nodes.
    pub demands: &'a [f64],
    /// Emitter coefficient at each node.
    pub emitters: &'a [f64],
    pub emitter_exponent: f64,
    pub elevations: &'a [f64],
    /// Speed per link.
    pub speeds: &'a [f64],
}

pub(crate) struct Balance<'a> {
    pub links: &'a [HydLink],
    /// Unknown index for each node, `None` for fixed-head nodes.
    pub vars: &'a [Option<usize>],
    pub n_vars: usize,
}

fn emitter(coeff: f64, exponent: f64, pressure: f64) -> (f64, f64) {
    if coeff <= 0.0 || pressure <= 0.0 {
        return (0.0, 0.0);
    }
    if pressure < LINEAR_BAND {
        let g = coeff * LINEAR_BAND.powf(exponent) / LINEAR_BAND;
        return (g * pressure, g);
    }
    let q = coeff * pressure.powf(exponent);
    (q, exponent * q / pressure)
}

pub(crate) struct HydSolution {
    pub heads: Vec<f64>,
    pub flows: Vec<LinkFlow>,
    /// Emitter outflow per node.
    pub emitter_flows: Vec<f64>,
    pub iterations: usize,
}

impl Balance<'_> {
    fn heads(&self, x: &DVector<f64>, loads: &Loads<'_>) -> Vec<f64> {
        self.vars
            .iter()
            .enumerate()
            .map(|(i, v)| match v {
                Some(k) => x[*k],
                None => loads.fixed_heads[i],
            })
            .collect()
    }

    fn residual(&self, x: &DVector<f64>, loads: &Loads<'_>) -> DVector<f64> {
        let h = self.heads(x, loads);
        let mut r = DVector::zeros(self.n_vars);
        for (i, v) in self.vars.iter().enumerate() {
            if let Some(k) = v {
                let (qe, _) = emitter(
                    loads.emitters[i],
                    loads.emitter_exponent,
                    h[i] - loads.elevations[i],
                );
                r[*k] -= loads.demands[i] + qe;
            }
        }
        for (l, link) in self.links.iter().enumerate() {
            let f = link.flow(loads.speeds[l], h[link.start] - h[link.end]);
            if let Some(k) = self.vars[link.end] {
                r[k] += f.q;
            }
            if let Some(k) = self.vars[link.start] {
                r[k] -= f.q;
            }
        }
        r
    }

    fn jacobian(&self, x: &DVector<f64>, loads: &Loads<'_>) -> DMatrix<f64> {
        let h = self.heads(x, loads);
        let mut jac = DMatrix::zeros(self.n_vars, self.n_vars);
        for (i, v) in self.vars.iter().enumerate() {
            if let Some(k) = v {
                let (_, de) = emitter(
                    loads.emitters[i],
                    loads.emitter_exponent,
                    h[i] - loads.elevations[i],
                );
                jac[(*k, *k)] -= de;
            }
        }
        for (l, link) in self.links.iter().enumerate() {
            let g = link.flow(loads.speeds[l], h[link.start] - h[link.end]).dq;
            let s = self.vars[link.start];
            let e = self.vars[link.end];
            if let Some(e) = e {
                jac[(e, e)] -= g;
                if let Some(s) = s {
                    jac[(e, s)] += g;
                }
            }
            if let Some(s) = s {
                jac[(s, s)] -= g;
                if let Some(e) = e {
                    jac[(s, e)] += g;
                }
            }
        }
        jac
    }

    /// Solve junction heads starting from `guess` (one entry per node).
    pub fn solve(
        &self,
        loads: &Loads<'_>,
        guess: &[f64],
        config: &NewtonConfig,
    ) -> Result<HydSolution, SolverFault> {
        let mut x0 = DVector::zeros(self.n_vars);
        for (i, v) in self.vars.iter().enumerate() {
            if let Some(k) = v {
                x0[*k] = guess[i];
            }
        }

        let (x, iterations) = if self.n_vars == 0 {
            (x0, 0)
        } else {
            let result = newton_solve(
                x0,
                |x| self.residual(x, loads),
                |x| self.jacobian(x, loads),
                config,
            )?;
            (result.x, result.iterations)
        };

        let heads = self.heads(&x, loads);
        let flows = self
            .links
            .iter()
            .enumerate()
            .map(|(l, link)| link.flow(loads.speeds[l], heads[link.start] - heads[link.end]))
            .collect();
        let emitter_flows = heads
            .iter()
            .enumerate()
            .map(|(i, h)| {
                emitter(
                    loads.emitters[i],
                    loads.emitter_exponent,
                    h - loads.elevations[i],
                )
                .0
            })
            .collect();
        Ok(HydSolution {
            heads,
            flows,
            emitter_flows,
            iterations,
        })
    }
}
