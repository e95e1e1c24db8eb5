//! Structural problems are reported when the simulator is built.

use circuitsim_core::components::{
    Ammeter, Capacitor, Inductor, Rail, Resistor, Switch2, VoltageSource, Voltmeter, Wire,
};
use circuitsim_core::{Circuit, SimError, Simulator, SimulatorConfig};

fn build_error(circuit: Circuit) -> SimError {
    match Simulator::new(circuit) {
        Ok(_) => panic!("expected the circuit to be rejected"),
        Err(e) => e,
    }
}

#[test]
fn test_empty_circuit() {
    let err = build_error(Circuit::new());
    assert_eq!(err, SimError::EmptyCircuit);
    assert!(err.is_topology_error());
}

#[test]
fn test_missing_ground() {
    let mut c = Circuit::new();
    c.add("R1", Resistor::new(1000.0), &["a", "b"]).unwrap();
    assert_eq!(build_error(c), SimError::MissingGround);
}

#[test]
fn test_conflicting_parallel_sources() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["a", "gnd"]).unwrap();
    c.add("V2", VoltageSource::dc(3.0), &["a", "gnd"]).unwrap();
    c.add("R1", Resistor::new(1000.0), &["a", "gnd"]).unwrap();
    let err = build_error(c);
    assert!(matches!(err, SimError::VoltageSourceLoop { .. }), "{}", err);
    assert!(err.is_topology_error());
    assert!(!err.is_recoverable());
}

#[test]
fn test_source_shorted_by_wire() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["a", "gnd"]).unwrap();
    c.add("W1", Wire::new(), &["a", "gnd"]).unwrap();
    assert!(matches!(build_error(c), SimError::VoltageSourceLoop { .. }));
}

#[test]
fn test_parallel_ammeters_form_a_source_loop() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["a", "gnd"]).unwrap();
    c.add("A1", Ammeter::new(), &["a", "b"]).unwrap();
    c.add("A2", Ammeter::new(), &["a", "b"]).unwrap();
    c.add("R1", Resistor::new(1000.0), &["b", "gnd"]).unwrap();
    let err = build_error(c);
    assert!(matches!(err, SimError::VoltageSourceLoop { .. }), "{}", err);
}

#[test]
fn test_ammeter_in_series_reads_loop_current() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["a", "gnd"]).unwrap();
    c.add("A1", Ammeter::new(), &["a", "b"]).unwrap();
    c.add("R1", Resistor::new(1000.0), &["b", "gnd"]).unwrap();
    let mut sim = Simulator::new(c).unwrap();
    sim.step().unwrap();
    assert!((sim.element("A1").unwrap().current() - 5e-3).abs() < 1e-12);
}

#[test]
fn test_open_throw_is_not_a_path() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["in", "gnd"]).unwrap();
    c.add("S1", Switch2::new(0), &["in", "a", "b"]).unwrap();
    c.add("RA", Resistor::new(1000.0), &["a", "gnd"]).unwrap();
    c.add("RB", Resistor::new(1000.0), &["b", "c"]).unwrap();
    match build_error(c) {
        SimError::FloatingNode { node } => assert!(node == "b" || node == "c", "{}", node),
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn test_rail_tied_to_source() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["a", "gnd"]).unwrap();
    c.add("VCC", Rail::dc(5.0), &["a"]).unwrap();
    assert!(matches!(build_error(c), SimError::VoltageSourceLoop { .. }));
}

#[test]
fn test_capacitor_straight_across_source() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["a", "gnd"]).unwrap();
    c.add("C1", Capacitor::new(1e-6), &["a", "gnd"]).unwrap();
    assert!(matches!(build_error(c), SimError::CapacitorLoop { .. }));
}

#[test]
fn test_floating_node_is_reported_by_name() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["a", "gnd"]).unwrap();
    c.add("R1", Resistor::new(1000.0), &["a", "gnd"]).unwrap();
    c.add("R2", Resistor::new(1000.0), &["x", "y"]).unwrap();
    match build_error(c) {
        SimError::FloatingNode { node } => assert!(node == "x" || node == "y", "{}", node),
        other => panic!("unexpected {}", other),
    }
}

#[test]
fn test_floating_nodes_can_be_tied_to_ground() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["a", "gnd"]).unwrap();
    c.add("R1", Resistor::new(1000.0), &["a", "gnd"]).unwrap();
    c.add("R2", Resistor::new(1000.0), &["x", "y"]).unwrap();
    c.add("VM", Voltmeter::new(), &["a", "z"]).unwrap();
    let config = SimulatorConfig::new().with_ground_floating_nodes(true);
    let mut sim = Simulator::with_config(c, config).unwrap();
    sim.step().unwrap();
    assert_eq!(sim.node_voltage("x").unwrap(), 0.0);
    assert_eq!(sim.node_voltage("z").unwrap(), 0.0);
    assert!((sim.node_voltage("a").unwrap() - 5.0).abs() < 1e-9);
}

#[test]
fn test_unconnected_inductor_is_cleared() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(1.0), &["a", "gnd"]).unwrap();
    c.add("R1", Resistor::new(100.0), &["a", "gnd"]).unwrap();
    c.add("R2", Resistor::new(100.0), &["b", "gnd"]).unwrap();
    c.add("L1", Inductor::new(1e-3).with_current(0.2), &["b", "c"])
        .unwrap();
    c.add("R3", Resistor::new(100.0), &["c", "d"]).unwrap();
    let sim = Simulator::new(c).unwrap();
    assert_eq!(sim.element("L1").unwrap().current(), 0.0);
}

#[test]
fn test_wires_merge_nets() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(6.0), &["in", "gnd"]).unwrap();
    c.add("W1", Wire::new(), &["in", "in2"]).unwrap();
    c.add("R1", Resistor::new(1000.0), &["in2", "out"]).unwrap();
    c.add("R2", Resistor::new(2000.0), &["out", "gnd"]).unwrap();
    let mut sim = Simulator::new(c).unwrap();
    // gnd, in/in2, out
    assert_eq!(sim.topology().node_count, 3);
    sim.step().unwrap();
    assert_eq!(sim.node_voltage("in").unwrap(), sim.node_voltage("in2").unwrap());
    assert!((sim.node_voltage("out").unwrap() - 4.0).abs() < 1e-9);
}

#[test]
fn test_construction_errors() {
    let mut c = Circuit::new();
    c.add("R1", Resistor::new(1000.0), &["a", "gnd"]).unwrap();
    assert_eq!(
        c.add("R1", Resistor::new(1000.0), &["a", "b"]).unwrap_err(),
        SimError::DuplicateElement {
            name: "R1".to_string()
        }
    );
    assert!(matches!(
        c.add("R2", Resistor::new(1000.0), &["a"]),
        Err(SimError::TerminalMismatch { expected: 2, given: 1, .. })
    ));

    c.add("V1", VoltageSource::dc(1.0), &["a", "gnd"]).unwrap();
    let sim = Simulator::new(c).unwrap();
    assert!(matches!(sim.node_voltage("nowhere"), Err(SimError::NetNotFound { .. })));
    assert!(matches!(sim.element("Q9"), Err(SimError::ElementNotFound { .. })));
}
