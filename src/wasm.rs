//! WASM bindings for CircuitSim Core.
//!
//! This module provides JavaScript-friendly bindings for driving the
//! simulator from a browser animation loop.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { WasmCircuitSim } from 'circuitsim_core';
//!
//! await init();
//!
//! const sim = new WasmCircuitSim();
//! sim.add_voltage_source("V1", "in", "gnd", 5);
//! sim.add_resistor("R1", "in", "out", 1000);
//! sim.add_capacitor("C1", "out", "gnd", 1e-6);
//! sim.start(5e-6);
//!
//! // In requestAnimationFrame():
//! sim.tick();
//! const v = sim.node_voltage("out");
//! ```

use wasm_bindgen::prelude::*;

use crate::circuit::Circuit;
use crate::components::{
    Capacitor, Component, Diode, Gate, GateKind, Inductor, LogicInput, Resistor, Switch, Switch2,
    Transformer, Transistor, VoltageSource, Waveform, Wire,
};
use crate::error::SimError;
use crate::solver::{Simulator, SimulatorConfig};

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

fn js_err(e: SimError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// WASM-compatible circuit simulator.
///
/// Elements are added by name while building; [`start`](Self::start)
/// analyzes the circuit and from then on the handle steps and reads back.
#[wasm_bindgen]
pub struct WasmCircuitSim {
    building: Option<Circuit>,
    simulator: Option<Simulator>,
}

impl WasmCircuitSim {
    fn add(&mut self, name: &str, component: impl Into<Component>, nets: &[&str]) -> Result<(), JsValue> {
        let circuit = self
            .building
            .as_mut()
            .ok_or_else(|| JsValue::from_str("circuit already started"))?;
        circuit.add(name, component, nets).map(|_| ()).map_err(js_err)
    }

    fn sim(&mut self) -> Result<&mut Simulator, JsValue> {
        self.simulator
            .as_mut()
            .ok_or_else(|| js_err(SimError::NotAnalyzed))
    }
}

impl Default for WasmCircuitSim {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
impl WasmCircuitSim {
    /// Create an empty circuit.
    #[wasm_bindgen(constructor)]
    pub fn new() -> WasmCircuitSim {
        WasmCircuitSim {
            building: Some(Circuit::new()),
            simulator: None,
        }
    }

    pub fn add_resistor(&mut self, name: &str, a: &str, b: &str, ohms: f64) -> Result<(), JsValue> {
        self.add(name, Resistor::new(ohms), &[a, b])
    }

    pub fn add_capacitor(&mut self, name: &str, a: &str, b: &str, farads: f64) -> Result<(), JsValue> {
        self.add(name, Capacitor::new(farads), &[a, b])
    }

    pub fn add_inductor(&mut self, name: &str, a: &str, b: &str, henries: f64) -> Result<(), JsValue> {
        self.add(name, Inductor::new(henries), &[a, b])
    }

    pub fn add_wire(&mut self, name: &str, a: &str, b: &str) -> Result<(), JsValue> {
        self.add(name, Wire::new(), &[a, b])
    }

    pub fn add_switch(&mut self, name: &str, a: &str, b: &str, closed: bool) -> Result<(), JsValue> {
        self.add(name, Switch::new(closed), &[a, b])
    }

    /// Double-throw switch: `common` joins `throw0` or `throw1`.
    pub fn add_switch2(
        &mut self,
        name: &str,
        common: &str,
        throw0: &str,
        throw1: &str,
        position: usize,
    ) -> Result<(), JsValue> {
        self.add(name, Switch2::new(position), &[common, throw0, throw1])
    }

    /// Transformer with primary `p1`-`p2` and secondary `s1`-`s2`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_transformer(
        &mut self,
        name: &str,
        p1: &str,
        p2: &str,
        s1: &str,
        s2: &str,
        henries: f64,
        ratio: f64,
    ) -> Result<(), JsValue> {
        self.add(name, Transformer::new(henries, ratio), &[p1, p2, s1, s2])
    }

    /// DC voltage source, positive terminal first.
    pub fn add_voltage_source(&mut self, name: &str, pos: &str, neg: &str, volts: f64) -> Result<(), JsValue> {
        self.add(name, VoltageSource::dc(volts), &[pos, neg])
    }

    /// Sine voltage source.
    pub fn add_sine_source(
        &mut self,
        name: &str,
        pos: &str,
        neg: &str,
        amplitude: f64,
        frequency: f64,
    ) -> Result<(), JsValue> {
        let source = VoltageSource::with_waveform(Waveform::Sine, amplitude).frequency(frequency);
        self.add(name, source, &[pos, neg])
    }

    /// Diode using one of the built-in model names.
    pub fn add_diode(&mut self, name: &str, anode: &str, cathode: &str, model: &str) -> Result<(), JsValue> {
        let diode = Diode::with_model_name(model).map_err(js_err)?;
        self.add(name, diode, &[anode, cathode])
    }

    pub fn add_npn(&mut self, name: &str, c: &str, b: &str, e: &str) -> Result<(), JsValue> {
        self.add(name, Transistor::npn(), &[c, b, e])
    }

    pub fn add_pnp(&mut self, name: &str, c: &str, b: &str, e: &str) -> Result<(), JsValue> {
        self.add(name, Transistor::pnp(), &[c, b, e])
    }

    /// Two-input NAND gate.
    pub fn add_nand(&mut self, name: &str, a: &str, b: &str, out: &str) -> Result<(), JsValue> {
        self.add(name, Gate::new(GateKind::Nand, 2), &[a, b, out])
    }

    pub fn add_inverter(&mut self, name: &str, input: &str, out: &str) -> Result<(), JsValue> {
        self.add(name, Gate::inverter(), &[input, out])
    }

    pub fn add_logic_input(&mut self, name: &str, net: &str, high: bool) -> Result<(), JsValue> {
        self.add(name, LogicInput::new(high), &[net])
    }

    /// Analyze the circuit and get ready to step.
    pub fn start(&mut self, time_step: f64) -> Result<(), JsValue> {
        let circuit = self
            .building
            .take()
            .ok_or_else(|| JsValue::from_str("circuit already started"))?;
        let config = SimulatorConfig::new().with_time_step(time_step);
        self.simulator = Some(Simulator::with_config(circuit, config).map_err(js_err)?);
        Ok(())
    }

    /// Advance one step, retrying with smaller steps if needed.
    /// Returns the number of linear solves used.
    pub fn step(&mut self) -> Result<usize, JsValue> {
        let report = self.sim()?.step_adaptive().map_err(js_err)?;
        Ok(report.iterations)
    }

    /// Run one tick (`steps_per_tick` steps).
    pub fn tick(&mut self) -> Result<usize, JsValue> {
        self.sim()?.tick().map_err(js_err)
    }

    pub fn reset(&mut self) -> Result<(), JsValue> {
        self.sim()?.reset();
        Ok(())
    }

    /// Toggle a switch or logic input by name.
    pub fn toggle(&mut self, name: &str) -> Result<(), JsValue> {
        match self.sim()?.component_mut(name).map_err(js_err)? {
            Component::Switch(s) => s.toggle(),
            Component::Switch2(s) => s.toggle(),
            Component::LogicInput(l) => l.set_high(!l.high),
            _ => return Err(JsValue::from_str("element cannot be toggled")),
        }
        Ok(())
    }

    /// Get the current voltage of a named net, or `undefined`.
    pub fn node_voltage(&self, net: &str) -> Option<f64> {
        self.simulator.as_ref()?.node_voltage(net).ok()
    }

    /// Current through a named element, or `undefined`.
    pub fn current(&self, name: &str) -> Option<f64> {
        let e = self.simulator.as_ref()?.element(name).ok()?;
        Some(e.current())
    }

    /// Simulation time in seconds.
    #[wasm_bindgen(getter)]
    pub fn time(&self) -> f64 {
        self.simulator.as_ref().map_or(0.0, |s| s.time())
    }
}

/// Get the library version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
