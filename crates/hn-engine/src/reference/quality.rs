//! Steady water quality transport over one hydraulic solution.
//!
//! Quality is carried along the flow direction: a junction takes the
//! flow-weighted mix of what arrives, each pipe applies its travel time.
//! Reservoirs and tanks act as sources with their own quality; source
//! injections adjust what a node releases.

use std::collections::VecDeque;

use crate::input::QualityMode;

use super::hydraulics::{HydLink, LinkFlow};

const FLOW_EPS: f64 = 1e-9;
const SECONDS_PER_HOUR: f64 = 3600.0;
const LITRES_PER_M3: f64 = 1000.0;

/// Constituent added at a node for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Injection {
    /// External inflow of `q` m³/s at concentration `c`, mixed with the
    /// arriving water.
    Inflow { c: f64, q: f64 },
    /// Released water is raised to at least this concentration.
    Setpoint(f64),
    /// Added to the released concentration.
    Boost(f64),
    /// mg/s spread over the node's throughflow.
    Mass(f64),
}

pub(crate) struct QualityNet<'a> {
    pub links: &'a [HydLink],
    /// Per-link bulk coefficient override (1/s).
    pub bulk: &'a [Option<f64>],
    pub is_source: &'a [bool],
    pub injections: &'a [Option<Injection>],
    pub mode: &'a QualityMode,
    pub global_bulk: f64,
}

/// Quality at each node and on each link.
pub(crate) struct QualityState {
    pub nodes: Vec<f64>,
    pub links: Vec<f64>,
}

impl QualityNet<'_> {
    /// Quality leaving a link given what enters it.
    fn across(&self, l: usize, inlet: f64, flow: &LinkFlow) -> f64 {
        let link = &self.links[l];
        let velocity = if link.area > 0.0 {
            flow.q.abs() / link.area
        } else {
            0.0
        };
        let travel = if link.length > 0.0 && velocity > 0.0 {
            link.length / velocity
        } else {
            0.0
        };
        match self.mode {
            QualityMode::Chemical { .. } => {
                let k = self.bulk[l].unwrap_or(self.global_bulk);
                inlet * (k * travel).exp()
            }
            QualityMode::Age => inlet + travel / SECONDS_PER_HOUR,
            QualityMode::Trace { .. } | QualityMode::None => inlet,
        }
    }

    /// Propagate from `sources` (values for source nodes) through `flows`.
    ///
    /// Nodes with no arriving flow keep `previous`, aged by `dt_s` in age mode.
    /// Injections apply only to nodes that water passes through.
    pub fn propagate(
        &self,
        sources: &[f64],
        previous: &[f64],
        flows: &[LinkFlow],
        dt_s: f64,
    ) -> QualityState {
        let n = previous.len();
        // Incoming active links per node, with upstream node.
        let mut inflows: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
        let mut outflows: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut through_in = vec![0.0; n];
        let mut through_out = vec![0.0; n];
        for (l, (link, f)) in self.links.iter().zip(flows).enumerate() {
            if !f.active || f.q.abs() < FLOW_EPS {
                continue;
            }
            let (up, down) = if f.q > 0.0 {
                (link.start, link.end)
            } else {
                (link.end, link.start)
            };
            inflows[down].push((l, up));
            outflows[up].push(l);
            through_in[down] += f.q.abs();
            through_out[up] += f.q.abs();
        }
        for (i, injection) in self.injections.iter().enumerate() {
            if let Some(Injection::Inflow { q, .. }) = injection {
                through_in[i] += q;
            }
        }
        let through: Vec<f64> = through_in
            .iter()
            .zip(&through_out)
            .map(|(a, b)| a.max(*b))
            .collect();

        let mut nodes: Vec<Option<f64>> = vec![None; n];
        let mut pending: Vec<usize> = inflows.iter().map(Vec::len).collect();
        let mut queue = VecDeque::new();
        for i in 0..n {
            if self.is_source[i] {
                nodes[i] = Some(self.inject(i, sources[i], through[i]));
                queue.push_back(i);
            }
        }

        let mut links = vec![0.0; self.links.len()];
        let resolve = |i: usize, nodes: &mut [Option<f64>]| {
            let mut mass = 0.0;
            let mut volume = 0.0;
            for &(l, up) in &inflows[i] {
                let inlet = nodes[up].unwrap_or(previous[up]);
                let q = flows[l].q.abs();
                mass += self.across(l, inlet, &flows[l]) * q;
                volume += q;
            }
            if let Some(Injection::Inflow { c, q }) = self.injections.get(i).copied().flatten() {
                mass += c * q;
                volume += q;
            }
            let value = if volume > 0.0 {
                self.inject(i, mass / volume, through[i])
            } else {
                self.stagnant(previous[i], dt_s)
            };
            nodes[i] = Some(value);
        };
        for i in 0..n {
            if nodes[i].is_none() && pending[i] == 0 {
                resolve(i, &mut nodes);
                queue.push_back(i);
            }
        }

        loop {
            while let Some(i) = queue.pop_front() {
                for &l in &outflows[i] {
                    let link = &self.links[l];
                    let down = if flows[l].q > 0.0 { link.end } else { link.start };
                    if nodes[down].is_some() {
                        continue;
                    }
                    pending[down] -= 1;
                    if pending[down] == 0 {
                        resolve(down, &mut nodes);
                        queue.push_back(down);
                    }
                }
            }
            // Loops in the flow graph (pumped recirculation): break at the
            // first unresolved node using last step's upstream values.
            match (0..n).find(|&i| nodes[i].is_none()) {
                Some(i) => {
                    resolve(i, &mut nodes);
                    queue.push_back(i);
                }
                None => break,
            }
        }

        let nodes: Vec<f64> = nodes
            .into_iter()
            .zip(previous)
            .map(|(v, p)| v.unwrap_or(*p))
            .collect();
        for (l, (link, f)) in self.links.iter().zip(flows).enumerate() {
            let up = if f.q >= 0.0 { link.start } else { link.end };
            let inlet = nodes[up];
            links[l] = 0.5 * (inlet + self.across(l, inlet, f));
        }
        QualityState { nodes, links }
    }

    fn inject(&self, i: usize, value: f64, through: f64) -> f64 {
        if through < FLOW_EPS {
            return value;
        }
        match self.injections.get(i).copied().flatten() {
            Some(Injection::Setpoint(c)) => value.max(c),
            Some(Injection::Boost(c)) => value + c,
            Some(Injection::Mass(rate)) => value + rate / (through * LITRES_PER_M3),
            Some(Injection::Inflow { .. }) | None => value,
        }
    }

    fn stagnant(&self, previous: f64, dt_s: f64) -> f64 {
        match self.mode {
            QualityMode::Age => previous + dt_s / SECONDS_PER_HOUR,
            _ => previous,
        }
    }

    /// Complete-mix update of a tank holding `volume` that receives
    /// `inflow_volume` at quality `inflow` over `dt_s`.
    pub fn mix_tank(&self, current: f64, volume: f64, inflow: f64, inflow_volume: f64, dt_s: f64) -> f64 {
        let aged = match self.mode {
            QualityMode::Chemical { .. } => current * (self.global_bulk * dt_s).exp(),
            QualityMode::Age => current + dt_s / SECONDS_PER_HOUR,
            QualityMode::Trace { .. } | QualityMode::None => current,
        };
        let total = volume + inflow_volume;
        if inflow_volume <= 0.0 || total <= 0.0 {
            return aged;
        }
        (aged * volume + inflow * inflow_volume) / total
    }
}
