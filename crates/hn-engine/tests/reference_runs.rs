//! End-to-end runs of the built-in reference solver through a session.

use hn_core::{Attribute, ElementKey};
use hn_engine::{EngineError, EngineSession, ReferenceFactory, StepSnapshot};
use hn_network::{
    Control, Curve, CurveKind, Junction, Link, Network, Node, NodePatch, Patch, Pattern, Pipe,
    Pump, QualitySource, Reservoir, SourceKind, Tank, Valve, ValveType,
};
use hn_project::{QualityModel, ScenarioConfig, ScenarioOptions};

fn source_and_junction() -> Network {
    let mut net = Network::new();
    net.add_node(Node::reservoir("R1", Reservoir::with_head(100.0)))
        .unwrap();
    net.add_node(Node::junction("J1", 50.0, Junction::with_demand(10.0)))
        .unwrap();
    net.add_link(Link::pipe("P1", "R1", "J1", Pipe::new(500.0, 200.0, 100.0)))
        .unwrap();
    net
}

fn run_all(net: &Network, options: ScenarioOptions) -> Vec<StepSnapshot> {
    let config = ScenarioConfig::validated(options).unwrap();
    let mut session = EngineSession::open(&ReferenceFactory, net, &config).unwrap();
    let mut steps = Vec::new();
    while let Some(step) = session.run_step().unwrap() {
        steps.push(step);
    }
    session.close();
    steps
}

fn value(step: &StepSnapshot, key: &ElementKey, attribute: Attribute) -> f64 {
    step.samples
        .iter()
        .find(|s| &s.key == key && s.attribute == attribute)
        .map(|s| s.value)
        .unwrap()
}

#[test]
fn day_long_run_reports_every_hour() {
    let steps = run_all(&source_and_junction(), ScenarioOptions::default());

    assert_eq!(steps.len(), 25);
    let times: Vec<i64> = steps.iter().map(|s| s.time_s).collect();
    assert_eq!(times.first(), Some(&0));
    assert_eq!(times.last(), Some(&86_400));
    assert!(times.windows(2).all(|w| w[1] - w[0] == 3600));

    let j1 = ElementKey::node("J1");
    let p1 = ElementKey::link("P1");
    for step in &steps {
        let pressure = value(step, &j1, Attribute::Pressure);
        assert!((49.0..50.0).contains(&pressure), "pressure {pressure}");
        assert!((value(step, &p1, Attribute::Flow) - 10.0).abs() < 1e-3);
        assert_eq!(value(step, &p1, Attribute::Status), 1.0);
    }
}

#[test]
fn partial_last_step_stops_at_the_horizon() {
    let options = ScenarioOptions {
        duration_s: 5400,
        ..ScenarioOptions::default()
    };
    let steps = run_all(&source_and_junction(), options);
    let times: Vec<i64> = steps.iter().map(|s| s.time_s).collect();
    assert_eq!(times, vec![0, 3600, 5400]);
}

#[test]
fn closed_pipe_carries_no_flow() {
    let mut net = source_and_junction();
    net.add_node(Node::junction("J2", 40.0, Junction::default()))
        .unwrap();
    net.add_link(Link::pipe("P2", "J1", "J2", Pipe::new(100.0, 150.0, 100.0)).closed())
        .unwrap();
    let options = ScenarioOptions {
        duration_s: 3600,
        ..ScenarioOptions::default()
    };
    let steps = run_all(&net, options);

    let p2 = ElementKey::link("P2");
    for step in &steps {
        assert_eq!(value(step, &p2, Attribute::Flow), 0.0);
        assert_eq!(value(step, &p2, Attribute::Status), 0.0);
    }
}

#[test]
fn tank_fills_between_steps() {
    let mut net = Network::new();
    net.add_node(Node::reservoir("R1", Reservoir::with_head(100.0)))
        .unwrap();
    net.add_node(Node::tank(
        "T1",
        50.0,
        Tank {
            init_level: 5.0,
            min_level: 0.0,
            max_level: 20.0,
            diameter: 10.0,
            ..Tank::default()
        },
    ))
    .unwrap();
    net.add_link(Link::pipe("P1", "R1", "T1", Pipe::new(1000.0, 150.0, 100.0)))
        .unwrap();

    let options = ScenarioOptions {
        duration_s: 6 * 3600,
        ..ScenarioOptions::default()
    };
    let steps = run_all(&net, options);

    let t1 = ElementKey::node("T1");
    let levels: Vec<f64> = steps
        .iter()
        .map(|s| value(s, &t1, Attribute::Pressure))
        .collect();
    assert!((levels[0] - 5.0).abs() < 1e-9);
    assert!(levels.windows(2).all(|w| w[1] >= w[0]));
    assert!(levels.iter().all(|l| *l <= 20.0));
    assert!(levels[levels.len() - 1] > 5.0);
}

#[test]
fn pump_lifts_to_its_design_head() {
    let mut net = Network::new();
    net.add_curve(Curve::new("C1", CurveKind::Pump, vec![(10.0, 30.0)]).unwrap())
        .unwrap();
    net.add_node(Node::reservoir("R1", Reservoir::with_head(10.0)))
        .unwrap();
    net.add_node(Node::junction("J1", 0.0, Junction::with_demand(10.0)))
        .unwrap();
    net.add_link(Link::pump("PU1", "R1", "J1", Pump::with_curve("C1")))
        .unwrap();

    let options = ScenarioOptions {
        duration_s: 0,
        hydraulic_step_s: 0,
        ..ScenarioOptions::default()
    };
    let config = ScenarioConfig::create(options);
    let mut session = EngineSession::open(&ReferenceFactory, &net, &config).unwrap();
    let step = session.run_step().unwrap().unwrap();
    let head = value(&step, &ElementKey::node("J1"), Attribute::Head);
    assert!((head - 40.0).abs() < 0.5, "head {head}");
    assert_eq!(value(&step, &ElementKey::link("PU1"), Attribute::Velocity), 0.0);
    assert!(session.run_step().unwrap().is_none());
}

#[test]
fn general_purpose_valve_is_rejected_with_its_id() {
    let mut net = source_and_junction();
    net.add_node(Node::junction("J2", 45.0, Junction::default()))
        .unwrap();
    net.add_link(Link::valve(
        "V1",
        "J1",
        "J2",
        Valve::new(ValveType::Gpv, 150.0, 0.0),
    ))
    .unwrap();
    let config = ScenarioConfig::validated(ScenarioOptions::default()).unwrap();

    let err = EngineSession::open(&ReferenceFactory, &net, &config)
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::Open { .. }));
    assert_eq!(err.element(), Some(&ElementKey::link("V1")));
}

#[test]
fn age_grows_downstream_of_the_source() {
    let mut net = source_and_junction();
    net.add_node(Node::junction("J2", 40.0, Junction::with_demand(5.0)))
        .unwrap();
    net.add_link(Link::pipe("P2", "J1", "J2", Pipe::new(2000.0, 150.0, 100.0)))
        .unwrap();
    let options = ScenarioOptions {
        duration_s: 3600,
        quality: QualityModel::Age,
        ..ScenarioOptions::default()
    };
    let steps = run_all(&net, options);

    let last = steps.last().unwrap();
    let r1 = value(last, &ElementKey::node("R1"), Attribute::Quality);
    let j1 = value(last, &ElementKey::node("J1"), Attribute::Quality);
    let j2 = value(last, &ElementKey::node("J2"), Attribute::Quality);
    assert_eq!(r1, 0.0);
    assert!(j1 > r1);
    assert!(j2 > j1);
}

#[test]
fn trace_source_reaches_every_downstream_node() {
    let options = ScenarioOptions {
        duration_s: 3600,
        quality: QualityModel::Trace { node: "R1".into() },
        ..ScenarioOptions::default()
    };
    let steps = run_all(&source_and_junction(), options);
    for step in &steps {
        let j1 = value(step, &ElementKey::node("J1"), Attribute::Quality);
        assert!((j1 - 100.0).abs() < 1e-9);
    }
}

fn chlorine() -> QualityModel {
    QualityModel::Chemical {
        name: "Chlorine".into(),
        units: "mg/L".into(),
        bulk_coeff: 0.0,
    }
}

/// R1 -> J1 (10 L/s) -> J2 (5 L/s).
fn two_junction_line(r1_quality: f64) -> Network {
    let mut net = Network::new();
    let mut r1 = Node::reservoir("R1", Reservoir::with_head(100.0));
    r1.initial_quality = r1_quality;
    net.add_node(r1).unwrap();
    net.add_node(Node::junction("J1", 50.0, Junction::with_demand(10.0)))
        .unwrap();
    net.add_node(Node::junction("J2", 40.0, Junction::with_demand(5.0)))
        .unwrap();
    net.add_link(Link::pipe("P1", "R1", "J1", Pipe::new(500.0, 200.0, 100.0)))
        .unwrap();
    net.add_link(Link::pipe("P2", "J1", "J2", Pipe::new(500.0, 150.0, 100.0)))
        .unwrap();
    net
}

fn add_source(net: &mut Network, node: &str, source: QualitySource) {
    net.update_attributes(
        node,
        Patch::Node(NodePatch {
            source: Some(Some(source)),
            ..NodePatch::default()
        }),
    )
    .unwrap();
}

fn quality_at(step: &StepSnapshot, node: &str) -> f64 {
    value(step, &ElementKey::node(node), Attribute::Quality)
}

#[test]
fn setpoint_booster_raises_downstream_concentration() {
    let mut net = two_junction_line(0.2);
    add_source(&mut net, "J1", QualitySource::new(SourceKind::Setpoint, 1.0));
    let options = ScenarioOptions {
        duration_s: 3600,
        quality: chlorine(),
        ..ScenarioOptions::default()
    };
    for step in run_all(&net, options) {
        assert!((quality_at(&step, "R1") - 0.2).abs() < 1e-9);
        assert!((quality_at(&step, "J1") - 1.0).abs() < 1e-9);
        assert!((quality_at(&step, "J2") - 1.0).abs() < 1e-9);
    }
}

#[test]
fn mass_booster_adds_rate_over_throughflow() {
    // 900 mg/min = 15 mg/s into 15 L/s adds 1 mg/L.
    let mut net = two_junction_line(0.5);
    add_source(&mut net, "J1", QualitySource::new(SourceKind::Mass, 900.0));
    let options = ScenarioOptions {
        duration_s: 3600,
        quality: chlorine(),
        ..ScenarioOptions::default()
    };
    let steps = run_all(&net, options);
    let last = steps.last().unwrap();
    assert!((quality_at(last, "J1") - 1.5).abs() < 1e-3);
    assert!((quality_at(last, "J2") - 1.5).abs() < 1e-3);
}

#[test]
fn reservoir_concentration_source_follows_its_pattern() {
    let mut net = Network::new();
    net.add_pattern(Pattern::new("FEED", vec![1.0, 0.5]).unwrap())
        .unwrap();
    let r1 = Node::reservoir("R1", Reservoir::with_head(100.0))
        .with_source(QualitySource::new(SourceKind::Concentration, 0.8).with_pattern("FEED"));
    net.add_node(r1).unwrap();
    net.add_node(Node::junction("J1", 50.0, Junction::with_demand(10.0)))
        .unwrap();
    net.add_link(Link::pipe("P1", "R1", "J1", Pipe::new(500.0, 200.0, 100.0)))
        .unwrap();
    let options = ScenarioOptions {
        duration_s: 3600,
        quality: chlorine(),
        ..ScenarioOptions::default()
    };
    let steps = run_all(&net, options);
    assert!((quality_at(&steps[0], "J1") - 0.8).abs() < 1e-9);
    assert!((quality_at(&steps[1], "J1") - 0.4).abs() < 1e-9);
}

/// R1 feeds J1 through two parallel pipes.
fn parallel_feed() -> Network {
    let mut net = source_and_junction();
    net.add_link(Link::pipe("P2", "R1", "J1", Pipe::new(500.0, 200.0, 100.0)))
        .unwrap();
    net
}

fn flows(steps: &[StepSnapshot], link: &str) -> Vec<f64> {
    let key = ElementKey::link(link);
    steps
        .iter()
        .map(|s| value(s, &key, Attribute::Flow))
        .collect()
}

#[test]
fn timed_controls_close_and_reopen_a_pipe() {
    let mut net = parallel_feed();
    for text in ["LINK P2 CLOSED AT TIME 2:00", "LINK P2 OPEN AT TIME 4:00"] {
        net.add_control(text.parse::<Control>().unwrap()).unwrap();
    }
    let options = ScenarioOptions {
        duration_s: 6 * 3600,
        ..ScenarioOptions::default()
    };
    let steps = run_all(&net, options);

    let p1 = flows(&steps, "P1");
    let p2 = flows(&steps, "P2");
    for (i, (q1, q2)) in p1.iter().zip(&p2).enumerate() {
        let closed = (2..4).contains(&i);
        if closed {
            assert_eq!(*q2, 0.0, "step {i}");
            assert!((q1 - 10.0).abs() < 1e-3, "step {i}: {q1}");
            assert_eq!(value(&steps[i], &ElementKey::link("P2"), Attribute::Status), 0.0);
        } else {
            assert!((q1 - 5.0).abs() < 1e-3, "step {i}: {q1}");
            assert!((q2 - 5.0).abs() < 1e-3, "step {i}: {q2}");
        }
    }
}

#[test]
fn clock_time_control_follows_the_start_clock() {
    let mut net = parallel_feed();
    net.add_control("LINK P2 CLOSED AT CLOCKTIME 12:00 AM".parse().unwrap())
        .unwrap();
    let options = ScenarioOptions {
        duration_s: 4 * 3600,
        start_clocktime_s: 22 * 3600,
        ..ScenarioOptions::default()
    };
    let p2 = flows(&run_all(&net, options), "P2");
    assert!(p2[0] > 0.0 && p2[1] > 0.0);
    assert!(p2[2..].iter().all(|q| *q == 0.0), "{p2:?}");
}

#[test]
fn tank_level_control_stops_filling() {
    let mut net = Network::new();
    net.add_node(Node::reservoir("R1", Reservoir::with_head(100.0)))
        .unwrap();
    net.add_node(Node::tank(
        "T1",
        50.0,
        Tank {
            init_level: 5.0,
            min_level: 0.0,
            max_level: 20.0,
            diameter: 10.0,
            ..Tank::default()
        },
    ))
    .unwrap();
    net.add_link(Link::pipe("P1", "R1", "T1", Pipe::new(1000.0, 150.0, 100.0)))
        .unwrap();
    net.add_control("LINK P1 CLOSED IF NODE T1 ABOVE 8".parse().unwrap())
        .unwrap();

    let options = ScenarioOptions {
        duration_s: 8 * 3600,
        ..ScenarioOptions::default()
    };
    let steps = run_all(&net, options);
    let t1 = ElementKey::node("T1");
    let levels: Vec<f64> = steps
        .iter()
        .map(|s| value(s, &t1, Attribute::Pressure))
        .collect();

    let k = levels
        .iter()
        .position(|l| *l > 8.0)
        .expect("tank rises past the threshold");
    assert!(k > 0 && k < levels.len() - 1);
    assert!(levels[..k].windows(2).all(|w| w[1] > w[0]));
    for (i, level) in levels.iter().enumerate().skip(k) {
        assert!((level - levels[k]).abs() < 1e-3, "step {i}: {level}");
        assert_eq!(value(&steps[i], &ElementKey::link("P1"), Attribute::Flow), 0.0);
    }
}

#[test]
fn pump_speed_setting_lowers_delivered_head() {
    let mut net = Network::new();
    net.add_curve(Curve::new("C1", CurveKind::Pump, vec![(10.0, 30.0)]).unwrap())
        .unwrap();
    net.add_node(Node::reservoir("R1", Reservoir::with_head(10.0)))
        .unwrap();
    net.add_node(Node::junction("J1", 0.0, Junction::with_demand(10.0)))
        .unwrap();
    net.add_link(Link::pump("PU1", "R1", "J1", Pump::with_curve("C1")))
        .unwrap();
    net.add_control("LINK PU1 0.8 AT TIME 1:00".parse().unwrap())
        .unwrap();
    let options = ScenarioOptions {
        duration_s: 2 * 3600,
        ..ScenarioOptions::default()
    };
    let steps = run_all(&net, options);
    let j1 = ElementKey::node("J1");
    let heads: Vec<f64> = steps.iter().map(|s| value(s, &j1, Attribute::Head)).collect();
    assert!((heads[0] - 40.0).abs() < 0.5, "{heads:?}");
    assert!(heads[1] < heads[0] - 5.0 && heads[1] > 10.0, "{heads:?}");
    assert!((heads[2] - heads[1]).abs() < 1e-3);
}
