//! Operating points of the active and reactive devices inside full circuits.

use approx::assert_relative_eq;
use circuitsim_core::components::{
    Cccs, Component, CurrentSource, Inductor, Mosfet, OpAmp, Region, Resistor, Switch, Switch2,
    Transformer, Transistor, VoltageSource, Waveform,
};
use circuitsim_core::{Circuit, Simulator, SimulatorConfig};

#[test]
fn test_current_source_into_resistor() {
    let mut c = Circuit::new();
    c.add("I1", CurrentSource::new(1e-3), &["0", "out"]).unwrap();
    c.add("R1", Resistor::new(2200.0), &["out", "0"]).unwrap();
    let mut sim = Simulator::new(c).unwrap();
    sim.step().unwrap();
    assert_relative_eq!(sim.node_voltage("out").unwrap(), 2.2, max_relative = 1e-12);
}

#[test]
fn test_inductor_current_builds_up() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["in", "gnd"]).unwrap();
    c.add("R1", Resistor::new(10.0), &["in", "a"]).unwrap();
    c.add("L1", Inductor::new(1e-3), &["a", "gnd"]).unwrap();
    let config = SimulatorConfig::new().with_time_step(1e-6);
    let mut sim = Simulator::with_config(c, config).unwrap();

    let mut last = 0.0;
    for _ in 0..100 {
        sim.step().unwrap();
        let i = sim.element("L1").unwrap().current();
        assert!(i >= last);
        last = i;
    }
    // one time constant
    assert_relative_eq!(last, 0.5 * (1.0 - (-1.0f64).exp()), max_relative = 0.02);

    sim.run(2000).unwrap();
    assert_relative_eq!(sim.element("L1").unwrap().current(), 0.5, max_relative = 1e-6);
    assert!(sim.node_voltage("a").unwrap().abs() < 1e-5);
}

#[test]
fn test_op_amp_follower() {
    let mut c = Circuit::new();
    c.add("VIN", VoltageSource::dc(2.0), &["in", "gnd"]).unwrap();
    c.add("U1", OpAmp::default(), &["out", "in", "out"]).unwrap();
    c.add("RL", Resistor::new(10_000.0), &["out", "gnd"]).unwrap();
    let mut sim = Simulator::new(c).unwrap();
    sim.step().unwrap();
    let expected = 2.0 * 100_000.0 / 100_001.0;
    assert_relative_eq!(sim.node_voltage("out").unwrap(), expected, max_relative = 1e-9);
}

#[test]
fn test_op_amp_inverting_gain() {
    let mut c = Circuit::new();
    c.add("VIN", VoltageSource::dc(0.5), &["in", "gnd"]).unwrap();
    c.add("R1", Resistor::new(1000.0), &["in", "n"]).unwrap();
    c.add("R2", Resistor::new(10_000.0), &["n", "out"]).unwrap();
    c.add("U1", OpAmp::default(), &["out", "gnd", "n"]).unwrap();
    let mut sim = Simulator::new(c).unwrap();
    sim.step().unwrap();
    assert_relative_eq!(sim.node_voltage("out").unwrap(), -5.0, max_relative = 1e-3);
    assert!(sim.node_voltage("n").unwrap().abs() < 1e-3);
}

#[test]
fn test_common_emitter_bias_point() {
    let mut c = Circuit::new();
    c.add("VCC", VoltageSource::dc(12.0), &["vcc", "gnd"]).unwrap();
    c.add("R1", Resistor::new(100_000.0), &["vcc", "base"]).unwrap();
    c.add("R2", Resistor::new(22_000.0), &["base", "gnd"]).unwrap();
    c.add("RC", Resistor::new(4700.0), &["vcc", "col"]).unwrap();
    c.add("RE", Resistor::new(1000.0), &["emit", "gnd"]).unwrap();
    c.add("Q1", Transistor::npn(), &["col", "base", "emit"]).unwrap();
    let mut sim = Simulator::new(c).unwrap();
    let report = sim.step().unwrap();
    assert!(report.iterations > 1);

    let col = sim.node_voltage("col").unwrap();
    let base = sim.node_voltage("base").unwrap();
    let emit = sim.node_voltage("emit").unwrap();
    assert!(col > 5.0 && col < 6.7, "collector at {}", col);
    assert!(emit > 1.0 && emit < 1.6, "emitter at {}", emit);
    let vbe = base - emit;
    assert!(vbe > 0.55 && vbe < 0.7, "vbe {}", vbe);
}

#[test]
fn test_mosfet_as_low_side_switch() {
    let build = |gate: f64| {
        let mut c = Circuit::new();
        c.add("VDD", VoltageSource::dc(10.0), &["vdd", "gnd"]).unwrap();
        c.add("VG", VoltageSource::dc(gate), &["g", "gnd"]).unwrap();
        c.add("RD", Resistor::new(1000.0), &["vdd", "d"]).unwrap();
        c.add("M1", Mosfet::n_channel(), &["d", "g", "gnd"]).unwrap();
        let mut sim = Simulator::new(c).unwrap();
        sim.run(5).unwrap();
        sim
    };

    let on = build(5.0);
    assert!(on.node_voltage("d").unwrap() < 0.2);
    match on.component("M1").unwrap() {
        Component::Mosfet(m) => assert_eq!(m.region(), Region::Linear),
        other => panic!("unexpected {}", other.kind()),
    }

    let off = build(0.0);
    assert!(off.node_voltage("d").unwrap() > 9.99);
    match off.component("M1").unwrap() {
        Component::Mosfet(m) => assert_eq!(m.region(), Region::Cutoff),
        other => panic!("unexpected {}", other.kind()),
    }
}

#[test]
fn test_switch_toggle_takes_effect_next_step() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["in", "gnd"]).unwrap();
    c.add("S1", Switch::new(false), &["in", "out"]).unwrap();
    c.add("R1", Resistor::new(1000.0), &["out", "gnd"]).unwrap();
    let mut sim = Simulator::new(c).unwrap();

    sim.step().unwrap();
    assert!(sim.node_voltage("out").unwrap() < 1e-4);

    match sim.component_mut("S1").unwrap() {
        Component::Switch(s) => s.toggle(),
        other => panic!("unexpected {}", other.kind()),
    }
    sim.step().unwrap();
    assert_relative_eq!(sim.node_voltage("out").unwrap(), 5.0, max_relative = 1e-4);
}

#[test]
fn test_transformer_steps_up_by_turns_ratio() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::with_waveform(Waveform::Sine, 10.0), &["p", "gnd"])
        .unwrap();
    c.add("T1", Transformer::new(4.0, 2.0), &["p", "gnd", "s", "gnd"])
        .unwrap();
    c.add("RL", Resistor::new(10_000.0), &["s", "gnd"]).unwrap();
    let mut sim = Simulator::new(c).unwrap();

    // one full period at the default 40 Hz
    let mut peak: f64 = 0.0;
    let mut correlation = 0.0;
    for _ in 0..5000 {
        sim.step().unwrap();
        let vp = sim.node_voltage("p").unwrap();
        let vs = sim.node_voltage("s").unwrap();
        correlation += vp * vs;
        peak = peak.max(vs);
    }
    assert!(correlation > 0.0, "secondary out of phase");
    let k = Transformer::DEFAULT_COUPLING;
    assert_relative_eq!(peak, 2.0 * k * 10.0, max_relative = 0.01);

    // the load current is reflected into the primary
    let t = match sim.component("T1").unwrap() {
        Component::Transformer(t) => t.clone(),
        other => panic!("unexpected {}", other.kind()),
    };
    let vs = sim.node_voltage("s").unwrap();
    assert_relative_eq!(
        -t.secondary_current(),
        vs / 10_000.0,
        max_relative = 1e-6,
        epsilon = 1e-9
    );
}

#[test]
fn test_cccs_mirrors_sensed_current() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["in", "gnd"]).unwrap();
    c.add("R1", Resistor::new(1000.0), &["in", "sense"]).unwrap();
    c.add("F1", Cccs::new(2.0), &["gnd", "out", "sense", "gnd"])
        .unwrap();
    c.add("R2", Resistor::new(100.0), &["out", "gnd"]).unwrap();
    let mut sim = Simulator::new(c).unwrap();
    sim.step().unwrap();

    // 5 mA sensed, 10 mA pushed into the 100 ohm load
    match sim.component("F1").unwrap() {
        Component::Cccs(f) => assert_relative_eq!(f.sense_current(), 5e-3, max_relative = 1e-12),
        other => panic!("unexpected {}", other.kind()),
    }
    assert_relative_eq!(sim.node_voltage("out").unwrap(), 1.0, max_relative = 1e-12);
    assert_relative_eq!(sim.node_voltage("sense").unwrap(), 0.0, epsilon = 1e-12);
}

#[test]
fn test_switch2_moves_the_source_between_throws() {
    let mut c = Circuit::new();
    c.add("V1", VoltageSource::dc(5.0), &["in", "gnd"]).unwrap();
    c.add("S1", Switch2::new(0), &["in", "a", "b"]).unwrap();
    c.add("RA", Resistor::new(1000.0), &["a", "gnd"]).unwrap();
    c.add("RB", Resistor::new(1000.0), &["b", "gnd"]).unwrap();
    let mut sim = Simulator::new(c).unwrap();

    sim.step().unwrap();
    assert_relative_eq!(sim.node_voltage("a").unwrap(), 5.0, max_relative = 1e-12);
    assert_relative_eq!(sim.node_voltage("b").unwrap(), 0.0, epsilon = 1e-12);
    assert_relative_eq!(sim.element("S1").unwrap().current(), 5e-3, max_relative = 1e-12);

    match sim.component_mut("S1").unwrap() {
        Component::Switch2(s) => s.toggle(),
        other => panic!("unexpected {}", other.kind()),
    }
    sim.step().unwrap();
    assert_relative_eq!(sim.node_voltage("a").unwrap(), 0.0, epsilon = 1e-12);
    assert_relative_eq!(sim.node_voltage("b").unwrap(), 5.0, max_relative = 1e-12);
    assert_eq!(sim.element("S1").unwrap().current_into_terminal(1), 0.0);
}
