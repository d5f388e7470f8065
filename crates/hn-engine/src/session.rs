//! Scoped engine session: one opened solver for one run.

use hn_core::{Attribute, ElementKey, ElementKind, UnitConverter, Velocity, m};
use hn_network::Network;
use hn_project::ScenarioConfig;
use tracing::{debug, info};
use uom::si::velocity::meter_per_second;

use crate::error::{EngineError, EngineResult, SolverFault};
use crate::handles::HandleMap;
use crate::input::EngineInput;
use crate::solver::{EngineFactory, RawStep, Solver};

/// One value of one series at one instant, in project units.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub key: ElementKey,
    pub attribute: Attribute,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepSnapshot {
    pub time_s: i64,
    pub samples: Vec<Sample>,
}

/// Attributes reported for an element kind.
pub fn series_attributes(kind: ElementKind, quality: bool) -> Vec<Attribute> {
    let mut attrs: Vec<Attribute> = match kind {
        ElementKind::Node => Attribute::NODE_HYDRAULICS.to_vec(),
        ElementKind::Link => Attribute::LINK_HYDRAULICS.to_vec(),
    };
    if quality {
        attrs.push(Attribute::Quality);
    }
    attrs
}

/// An opened engine bound to one network snapshot and scenario.
///
/// The solver is closed exactly once: by [`EngineSession::close`], or on
/// drop if the session is abandoned on an error or cancellation path.
pub struct EngineSession {
    solver: Box<dyn Solver>,
    map: HandleMap,
    converter: UnitConverter,
    quality: bool,
    duration_s: i64,
    last_time_s: Option<i64>,
    open: bool,
}

impl EngineSession {
    pub fn open(
        factory: &dyn EngineFactory,
        net: &Network,
        config: &ScenarioConfig,
    ) -> EngineResult<Self> {
        let map = HandleMap::from_network(net);
        let input = EngineInput::build(net, config, &map)?;

        let mut solver = factory.create();
        if let Err(fault) = solver.open(&input) {
            solver.close();
            return Err(open_error(&map, fault));
        }
        info!(
            engine = factory.name(),
            nodes = map.node_count(),
            links = map.link_count(),
            "engine opened"
        );

        Ok(Self {
            solver,
            map,
            converter: config.converter(),
            quality: config.quality().is_enabled(),
            duration_s: input.options.duration_s,
            last_time_s: None,
            open: true,
        })
    }

    pub fn duration_s(&self) -> i64 {
        self.duration_s
    }

    pub fn handles(&self) -> &HandleMap {
        &self.map
    }

    /// Every (element, attribute) pair this session reports.
    pub fn series_keys(&self) -> Vec<(ElementKey, Attribute)> {
        let node_attrs = series_attributes(ElementKind::Node, self.quality);
        let link_attrs = series_attributes(ElementKind::Link, self.quality);
        let mut keys = Vec::with_capacity(
            self.map.node_count() * node_attrs.len() + self.map.link_count() * link_attrs.len(),
        );
        for key in self.map.node_keys() {
            keys.extend(node_attrs.iter().map(|a| (key.clone(), *a)));
        }
        for key in self.map.link_keys() {
            keys.extend(link_attrs.iter().map(|a| (key.clone(), *a)));
        }
        keys
    }

    /// True once a step at the configured duration has been reported.
    pub fn reached_horizon(&self) -> bool {
        self.last_time_s.is_some_and(|t| t >= self.duration_s)
    }

    /// Advance one step. `Ok(None)` once the horizon is complete.
    ///
    /// The engine is not advanced past the duration. Stopping short of it or
    /// reporting a time beyond it is a step error. A failed step is never
    /// retried here.
    pub fn run_step(&mut self) -> EngineResult<Option<StepSnapshot>> {
        if !self.open {
            return Err(self.step_error(SolverFault::NotOpen.to_string()));
        }
        if self.reached_horizon() {
            return Ok(None);
        }
        let raw = match self.solver.advance() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                let stopped_at = self.last_time_s.unwrap_or(0);
                return Err(self.step_error(format!(
                    "engine stopped at t={stopped_at}s before duration {}s",
                    self.duration_s
                )));
            }
            Err(fault) => return Err(self.step_error(fault.to_string())),
        };
        if raw.time_s > self.duration_s {
            return Err(EngineError::Step {
                time_s: raw.time_s,
                reason: format!("engine stepped past duration {}s", self.duration_s),
            });
        }
        if raw.nodes.len() != self.map.node_count() || raw.links.len() != self.map.link_count() {
            return Err(EngineError::Step {
                time_s: raw.time_s,
                reason: format!(
                    "engine returned {} node / {} link values, expected {} / {}",
                    raw.nodes.len(),
                    raw.links.len(),
                    self.map.node_count(),
                    self.map.link_count()
                ),
            });
        }
        debug!(time_s = raw.time_s, "engine step");
        self.last_time_s = Some(raw.time_s);
        Ok(Some(self.translate(raw)))
    }

    /// Release the engine.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.open {
            self.solver.close();
            self.open = false;
            info!(last_time_s = ?self.last_time_s, "engine closed");
        }
    }

    fn step_error(&self, reason: String) -> EngineError {
        EngineError::Step {
            time_s: self.last_time_s.unwrap_or(0),
            reason,
        }
    }

    fn translate(&self, raw: RawStep) -> StepSnapshot {
        let conv = &self.converter;
        let per_node = if self.quality { 4 } else { 3 };
        let per_link = if self.quality { 5 } else { 4 };
        let mut samples =
            Vec::with_capacity(raw.nodes.len() * per_node + raw.links.len() * per_link);

        for (key, v) in self.map.node_keys().iter().zip(&raw.nodes) {
            let mut push = |attribute, value| {
                samples.push(Sample {
                    key: key.clone(),
                    attribute,
                    value,
                })
            };
            push(Attribute::Demand, conv.flow_to_project(hn_core::cms(v.demand)));
            push(Attribute::Head, conv.length_to_project(m(v.head)));
            push(Attribute::Pressure, conv.pressure_to_project(m(v.pressure)));
            if self.quality {
                push(Attribute::Quality, v.quality);
            }
        }

        for (key, v) in self.map.link_keys().iter().zip(&raw.links) {
            let mut push = |attribute, value| {
                samples.push(Sample {
                    key: key.clone(),
                    attribute,
                    value,
                })
            };
            push(Attribute::Flow, conv.flow_to_project(hn_core::cms(v.flow)));
            push(
                Attribute::Velocity,
                conv.velocity_to_project(Velocity::new::<meter_per_second>(v.velocity)),
            );
            push(Attribute::Headloss, conv.length_to_project(m(v.headloss)));
            push(Attribute::Status, if v.open { 1.0 } else { 0.0 });
            if self.quality {
                push(Attribute::Quality, v.quality);
            }
        }

        StepSnapshot {
            time_s: raw.time_s,
            samples,
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_error(map: &HandleMap, fault: SolverFault) -> EngineError {
    match fault {
        SolverFault::Unsupported {
            kind,
            handle,
            reason,
        } => EngineError::Open {
            element: map.key(kind, handle).ok().cloned(),
            reason,
        },
        other => EngineError::Open {
            element: None,
            reason: other.to_string(),
        },
    }
}
