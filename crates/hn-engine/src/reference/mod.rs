//! Built-in reference solver.
//!
//! Newton iteration on junction heads per hydraulic step, explicit tank
//! level integration between steps and steady quality transport. Link
//! controls are applied before each step is solved. Pressure regulating
//! valves are modelled as open throttles.

mod hydraulics;
mod newton;
mod quality;

use hn_core::ElementKind;
use tracing::{debug, warn};

use self::hydraulics::{Balance, HydLink, Loads, prepare};
use self::newton::NewtonConfig;
use self::quality::{Injection, QualityNet};
use crate::error::SolverFault;
use crate::input::{
    ControlCondition, EngineInput, LinkSpecKind, NodeSpecKind, QualityMode, SourceSpec,
};
use crate::solver::{EngineFactory, LinkValues, NodeValues, RawStep, Solver};
use hn_core::LinkHandle;
use hn_network::{ControlAction, SourceKind, ValveType};

const TRACE_SOURCE: f64 = 100.0;
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceFactory;

impl EngineFactory for ReferenceFactory {
    fn create(&self) -> Box<dyn Solver> {
        Box::new(ReferenceSolver::default())
    }

    fn name(&self) -> &str {
        "reference"
    }
}

#[derive(Default)]
pub struct ReferenceSolver {
    run: Option<Run>,
}

struct Run {
    input: EngineInput,
    links: Vec<HydLink>,
    bulk: Vec<Option<f64>>,
    vars: Vec<Option<usize>>,
    n_vars: usize,
    elevations: Vec<f64>,
    emitters: Vec<f64>,
    /// Tank level per node, zero elsewhere.
    levels: Vec<f64>,
    tank_areas: Vec<f64>,
    heads: Vec<f64>,
    quality: Vec<f64>,
    is_source: Vec<bool>,
    time_s: i64,
    last_time_s: Option<i64>,
    done: bool,
}

impl Solver for ReferenceSolver {
    fn open(&mut self, input: &EngineInput) -> Result<(), SolverFault> {
        self.run = None;
        self.run = Some(Run::new(input)?);
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<RawStep>, SolverFault> {
        let run = self.run.as_mut().ok_or(SolverFault::NotOpen)?;
        run.advance()
    }

    fn close(&mut self) {
        if let Some(run) = self.run.take() {
            debug!(last_time_s = ?run.last_time_s, "reference solver closed");
        }
    }
}

fn pattern_value(pattern: &[f64], period: usize) -> f64 {
    if pattern.is_empty() {
        1.0
    } else {
        pattern[period % pattern.len()]
    }
}

/// Whether elapsed time `at` falls in `(prev, t]`.
fn time_reached(prev: i64, t: i64, at: i64) -> bool {
    prev < at && at <= t
}

/// Whether time of day `at` occurs in `(prev, t]`, with the clock reading
/// `start` at t = 0.
fn clock_reached(prev: i64, t: i64, start: i64, at: i64) -> bool {
    let occurrences = |x: i64| (start + x - at).div_euclid(SECONDS_PER_DAY);
    occurrences(t) > occurrences(prev)
}

/// What a node source adds this step, given the node's demand (m³/s).
fn injection(
    source: &SourceSpec,
    kind: &NodeSpecKind,
    period: usize,
    demand: f64,
) -> Option<Injection> {
    let strength = source.strength * pattern_value(&source.pattern, period);
    match (source.kind, kind) {
        // Reservoirs take the concentration as their own quality.
        (SourceKind::Concentration, NodeSpecKind::Reservoir { .. }) => None,
        (SourceKind::Concentration, NodeSpecKind::Junction { .. }) if demand < 0.0 => {
            Some(Injection::Inflow {
                c: strength,
                q: -demand,
            })
        }
        (SourceKind::Concentration, _) => None,
        (SourceKind::Mass, _) => Some(Injection::Mass(strength)),
        (SourceKind::Setpoint, _) => Some(Injection::Setpoint(strength)),
        (SourceKind::FlowPaced, _) => Some(Injection::Boost(strength)),
    }
}

impl Run {
    fn new(input: &EngineInput) -> Result<Self, SolverFault> {
        let n = input.nodes.len();
        let mut vars = vec![None; n];
        let mut n_vars = 0;
        let mut elevations = vec![0.0; n];
        let mut emitters = vec![0.0; n];
        let mut levels = vec![0.0; n];
        let mut tank_areas = vec![0.0; n];
        let mut is_source = vec![false; n];
        let mut heads = vec![0.0; n];

        for (i, node) in input.nodes.iter().enumerate() {
            elevations[i] = node.elevation;
            match &node.kind {
                NodeSpecKind::Junction { emitter_coeff, .. } => {
                    vars[i] = Some(n_vars);
                    n_vars += 1;
                    emitters[i] = *emitter_coeff;
                }
                NodeSpecKind::Reservoir { head, pattern } => {
                    is_source[i] = true;
                    heads[i] = head * pattern_value(pattern, input.options.pattern_period(0));
                }
                NodeSpecKind::Tank {
                    init_level,
                    diameter,
                    ..
                } => {
                    if *diameter <= 0.0 {
                        return Err(SolverFault::Unsupported {
                            kind: ElementKind::Node,
                            handle: node.handle,
                            reason: "tank diameter must be positive".into(),
                        });
                    }
                    is_source[i] = true;
                    levels[i] = *init_level;
                    tank_areas[i] = std::f64::consts::PI * diameter * diameter / 4.0;
                    heads[i] = node.elevation + init_level;
                }
            }
        }

        let mut links = Vec::with_capacity(input.links.len());
        let mut bulk = Vec::with_capacity(input.links.len());
        for spec in &input.links {
            if let LinkSpecKind::Valve { valve_type, .. } = &spec.kind
                && matches!(valve_type, ValveType::Prv | ValveType::Psv | ValveType::Pbv)
            {
                warn!(
                    link = %spec.handle,
                    valve = valve_type.name(),
                    "pressure regulating valve modelled as an open throttle"
                );
            }
            let link = prepare(spec, &input.options).map_err(|reason| SolverFault::Unsupported {
                kind: ElementKind::Link,
                handle: spec.handle,
                reason,
            })?;
            links.push(link);
            bulk.push(match &spec.kind {
                LinkSpecKind::Pipe { bulk_coeff, .. } => *bulk_coeff,
                _ => None,
            });
        }

        // Junctions start level with the highest fixed head.
        let start = (0..n)
            .filter(|i| vars[*i].is_none())
            .map(|i| heads[i])
            .fold(f64::NEG_INFINITY, f64::max);
        for i in 0..n {
            if vars[i].is_some() {
                heads[i] = if start.is_finite() { start } else { elevations[i] };
            }
        }

        let mut quality: Vec<f64> = match &input.options.quality {
            QualityMode::Chemical { .. } => input.nodes.iter().map(|n| n.initial_quality).collect(),
            _ => vec![0.0; n],
        };
        if let QualityMode::Trace { node } = &input.options.quality {
            let i = node.index() as usize;
            if i < n {
                is_source[i] = true;
                quality[i] = TRACE_SOURCE;
            }
        }

        Ok(Self {
            input: input.clone(),
            links,
            bulk,
            vars,
            n_vars,
            elevations,
            emitters,
            levels,
            tank_areas,
            heads,
            quality,
            is_source,
            time_s: 0,
            last_time_s: None,
            done: false,
        })
    }

    /// Fire every control whose condition holds at `t`, in list order.
    fn apply_controls(&mut self, t: i64) {
        let prev = self.last_time_s.unwrap_or(-1);
        let controls = self.input.controls.clone();
        for control in controls {
            let fires = match control.condition {
                ControlCondition::AtTime { time_s } => time_reached(prev, t, time_s),
                ControlCondition::AtClockTime { time_of_day_s } => {
                    clock_reached(prev, t, self.input.options.start_clock_s, time_of_day_s)
                }
                ControlCondition::NodeAbove { node, value } => {
                    self.watched_value(node.index() as usize, t).is_some_and(|v| v > value)
                }
                ControlCondition::NodeBelow { node, value } => {
                    self.watched_value(node.index() as usize, t).is_some_and(|v| v < value)
                }
            };
            if fires {
                self.set_link(control.link, control.action, t);
            }
        }
    }

    /// Tank level, reservoir head or junction pressure as of `t`. Junction
    /// pressure is unknown until the first solve.
    fn watched_value(&self, i: usize, t: i64) -> Option<f64> {
        let node = self.input.nodes.get(i)?;
        match &node.kind {
            NodeSpecKind::Tank { .. } => Some(self.levels[i]),
            NodeSpecKind::Reservoir { head, pattern } => {
                Some(head * pattern_value(pattern, self.input.options.pattern_period(t)))
            }
            NodeSpecKind::Junction { .. } => self
                .last_time_s
                .map(|_| self.heads[i] - self.elevations[i]),
        }
    }

    fn set_link(&mut self, handle: LinkHandle, action: ControlAction, t: i64) {
        let l = handle.index() as usize;
        let Some(link) = self.links.get_mut(l) else {
            return;
        };
        match action {
            ControlAction::Open => link.base_open = true,
            ControlAction::Closed => link.base_open = false,
            ControlAction::Setting(v) if link.is_pump => {
                link.speed = v;
                link.base_open = true;
            }
            ControlAction::Setting(v) => {
                let mut spec = self.input.links[l].clone();
                let LinkSpecKind::Valve { setting, .. } = &mut spec.kind else {
                    return;
                };
                *setting = v;
                spec.initially_open = true;
                match prepare(&spec, &self.input.options) {
                    Ok(prepared) => *link = prepared,
                    Err(reason) => {
                        warn!(link = %handle, time_s = t, %reason, "control setting ignored");
                        return;
                    }
                }
            }
        }
        debug!(link = %handle, time_s = t, ?action, "control applied");
    }

    fn advance(&mut self) -> Result<Option<RawStep>, SolverFault> {
        if self.done {
            return Ok(None);
        }
        let t = self.time_s;
        self.apply_controls(t);
        let options = &self.input.options;
        let period = options.pattern_period(t);
        let n = self.input.nodes.len();

        let mut fixed_heads = vec![0.0; n];
        let mut demands = vec![0.0; n];
        for (i, node) in self.input.nodes.iter().enumerate() {
            match &node.kind {
                NodeSpecKind::Junction {
                    demand, pattern, ..
                } => {
                    demands[i] = demand * pattern_value(pattern, period) * options.demand_multiplier;
                }
                NodeSpecKind::Reservoir { head, pattern } => {
                    fixed_heads[i] = head * pattern_value(pattern, period);
                }
                NodeSpecKind::Tank { .. } => {
                    fixed_heads[i] = node.elevation + self.levels[i];
                }
            }
        }
        let speeds: Vec<f64> = self.links.iter().map(|l| l.speed_at(period)).collect();

        let balance = Balance {
            links: &self.links,
            vars: &self.vars,
            n_vars: self.n_vars,
        };
        let loads = Loads {
            fixed_heads: &fixed_heads,
            demands: &demands,
            emitters: &self.emitters,
            emitter_exponent: options.emitter_exponent,
            elevations: &self.elevations,
            speeds: &speeds,
        };
        let config = NewtonConfig {
            max_iterations: options.max_trials.max(1) as usize,
            abs_tol: (options.accuracy * 1e-4).max(1e-12),
            ..NewtonConfig::default()
        };
        let solution = balance
            .solve(&loads, &self.heads, &config)
            .map_err(|fault| match fault {
                SolverFault::ConvergenceFailed { what } => SolverFault::ConvergenceFailed {
                    what: format!("t={t}s: {what}"),
                },
                other => other,
            })?;
        debug!(time_s = t, iterations = solution.iterations, "hydraulics solved");

        let mut net_inflow = vec![0.0; n];
        for (link, f) in self.links.iter().zip(&solution.flows) {
            net_inflow[link.end] += f.q;
            net_inflow[link.start] -= f.q;
        }

        let dt_prev = self.last_time_s.map_or(0.0, |last| (t - last) as f64);
        let injections: Vec<Option<Injection>> = match options.quality {
            QualityMode::Chemical { .. } => self
                .input
                .nodes
                .iter()
                .enumerate()
                .map(|(i, node)| {
                    let source = node.source.as_ref()?;
                    injection(source, &node.kind, period, demands[i])
                })
                .collect(),
            _ => vec![None; n],
        };
        let quality_net = QualityNet {
            links: &self.links,
            bulk: &self.bulk,
            is_source: &self.is_source,
            injections: &injections,
            mode: &options.quality,
            global_bulk: match options.quality {
                QualityMode::Chemical { bulk_coeff } => bulk_coeff,
                _ => 0.0,
            },
        };
        let quality = if matches!(options.quality, QualityMode::None) {
            None
        } else {
            let sources: Vec<f64> = (0..n)
                .map(|i| {
                    let node = &self.input.nodes[i];
                    match (&options.quality, &node.kind) {
                        (QualityMode::Trace { node }, _) if node.index() as usize == i => {
                            TRACE_SOURCE
                        }
                        (_, NodeSpecKind::Tank { .. }) => self.quality[i],
                        (QualityMode::Chemical { .. }, NodeSpecKind::Reservoir { .. }) => {
                            match &node.source {
                                Some(s) if s.kind == SourceKind::Concentration => {
                                    s.strength * pattern_value(&s.pattern, period)
                                }
                                _ => node.initial_quality,
                            }
                        }
                        (QualityMode::Chemical { .. }, _) => node.initial_quality,
                        _ => 0.0,
                    }
                })
                .collect();
            Some(quality_net.propagate(&sources, &self.quality, &solution.flows, dt_prev))
        };

        let nodes: Vec<NodeValues> = (0..n)
            .map(|i| {
                let head = solution.heads[i];
                let (demand, pressure) = match &self.input.nodes[i].kind {
                    NodeSpecKind::Junction { .. } => {
                        (demands[i] + solution.emitter_flows[i], head - self.elevations[i])
                    }
                    NodeSpecKind::Reservoir { .. } => (net_inflow[i], 0.0),
                    NodeSpecKind::Tank { .. } => (net_inflow[i], self.levels[i]),
                };
                NodeValues {
                    demand,
                    head,
                    pressure,
                    quality: quality.as_ref().map_or(0.0, |q| q.nodes[i]),
                }
            })
            .collect();

        let links: Vec<LinkValues> = self
            .links
            .iter()
            .zip(&solution.flows)
            .enumerate()
            .map(|(l, (link, f))| {
                let flow = if f.active { f.q } else { 0.0 };
                LinkValues {
                    flow,
                    velocity: if link.area > 0.0 {
                        flow.abs() / link.area
                    } else {
                        0.0
                    },
                    headloss: solution.heads[link.start] - solution.heads[link.end],
                    open: f.active,
                    quality: quality.as_ref().map_or(0.0, |q| q.links[l]),
                }
            })
            .collect();

        // Schedule the next instant and carry tanks forward to it.
        if t >= options.duration_s {
            self.done = true;
        } else {
            let next = (t + options.hydraulic_step_s.max(1)).min(options.duration_s);
            let dt = (next - t) as f64;
            for (i, node) in self.input.nodes.iter().enumerate() {
                let NodeSpecKind::Tank {
                    min_level,
                    max_level,
                    ..
                } = node.kind
                else {
                    continue;
                };
                let area = self.tank_areas[i];
                let volume = area * self.levels[i];
                if let Some(q) = &quality {
                    let (mut mass, mut inflow) = (0.0, 0.0);
                    for (l, (link, f)) in self.links.iter().zip(&solution.flows).enumerate() {
                        let into = if link.end == i { f.q } else if link.start == i { -f.q } else { 0.0 };
                        if f.active && into > 0.0 {
                            mass += q.links[l] * into;
                            inflow += into;
                        }
                    }
                    let c_in = if inflow > 0.0 { mass / inflow } else { 0.0 };
                    self.quality[i] =
                        quality_net.mix_tank(self.quality[i], volume, c_in, inflow * dt, dt);
                }
                let level = self.levels[i] + net_inflow[i] * dt / area;
                self.levels[i] = level.clamp(min_level, max_level);
            }
            self.time_s = next;
        }

        if let Some(q) = quality {
            for i in 0..n {
                if !matches!(self.input.nodes[i].kind, NodeSpecKind::Tank { .. }) {
                    self.quality[i] = q.nodes[i];
                }
            }
        }
        self.heads = solution.heads;
        self.last_time_s = Some(t);

        Ok(Some(RawStep {
            time_s: t,
            nodes,
            links,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_requires_open() {
        let mut solver = ReferenceSolver::default();
        assert_eq!(solver.advance().unwrap_err(), SolverFault::NotOpen);
        solver.close();
        assert_eq!(solver.advance().unwrap_err(), SolverFault::NotOpen);
    }

    #[test]
    fn elapsed_times_fire_once() {
        assert!(time_reached(-1, 0, 0));
        assert!(!time_reached(0, 3600, 0));
        assert!(time_reached(0, 3600, 1800));
        assert!(time_reached(0, 3600, 3600));
        assert!(!time_reached(3600, 7200, 3600));
    }

    #[test]
    fn clock_times_repeat_daily() {
        // Clock starts at 22:00; 06:00 is 8 h in, then every 24 h.
        let start = 22 * 3600;
        let six = 6 * 3600;
        assert!(!clock_reached(-1, 7 * 3600, start, six));
        assert!(clock_reached(7 * 3600, 8 * 3600, start, six));
        assert!(!clock_reached(8 * 3600, 31 * 3600, start, six));
        assert!(clock_reached(31 * 3600, 32 * 3600, start, six));
        assert!(clock_reached(-1, 0, six, six));
    }

    #[test]
    fn empty_pattern_is_unity() {
        assert_eq!(pattern_value(&[], 7), 1.0);
        assert_eq!(pattern_value(&[0.5, 2.0], 3), 2.0);
    }
}
