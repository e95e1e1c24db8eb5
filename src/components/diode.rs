//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! with a mirrored, steeper exponential for Zener breakdown when a breakdown
//! voltage is set. For Newton-Raphson iteration the junction is linearized
//! around the current operating point (see [`DiodeCore`]). A non-zero series
//! resistance is modeled with one internal node.

use super::limiter::DiodeCore;
use super::{Element, History, Pins};
use crate::error::{Result, SimError};
use crate::solver::SolverContext;
use crate::THERMAL_VOLTAGE;

/// Emission coefficient used when a model is built from a forward drop.
const FORWARD_DROP_EMISSION: f64 = 2.0;

/// Parameters for a diode model.
#[derive(Debug, Clone, PartialEq)]
pub struct DiodeModel {
    pub name: String,
    /// Saturation current (Is)
    pub saturation_current: f64,
    /// Series resistance (Rs), 0 = none
    pub series_resistance: f64,
    /// Emission coefficient (N)
    pub emission_coefficient: f64,
    /// Zener breakdown voltage, 0 = no breakdown
    pub breakdown_voltage: f64,
}

impl Default for DiodeModel {
    fn default() -> Self {
        Self::new("default", 1.7143528192808883e-7, 0.0, 2.0, 0.0)
    }
}

impl DiodeModel {
    /// Names of the built-in models.
    pub const NAMES: [&'static str; 9] = [
        "spice-default",
        "default",
        "default-zener",
        "default-led",
        "1N5711",
        "1N5712",
        "1N34",
        "1N4004",
        "1N4148",
    ];

    pub fn new(
        name: impl Into<String>,
        saturation_current: f64,
        series_resistance: f64,
        emission_coefficient: f64,
        breakdown_voltage: f64,
    ) -> Self {
        Self {
            name: name.into(),
            saturation_current,
            series_resistance,
            emission_coefficient,
            breakdown_voltage,
        }
    }

    /// The SPICE default diode: Is = 1e-14, N = 1.
    pub fn spice_default() -> Self {
        Self::new("spice-default", 1e-14, 0.0, 1.0, 0.0)
    }

    /// The default diode with a 5.6 V breakdown.
    pub fn default_zener() -> Self {
        Self {
            name: "default-zener".to_string(),
            breakdown_voltage: 5.6,
            ..Self::default()
        }
    }

    /// Default LED model.
    pub fn led() -> Self {
        Self::new("default-led", 93.2e-12, 0.042, 3.73, 0.0)
    }

    /// Look up a built-in model by name.
    pub fn by_name(name: &str) -> Result<Self> {
        let model = match name {
            "spice-default" => Self::spice_default(),
            "default" => Self::default(),
            "default-zener" => Self::default_zener(),
            "default-led" => Self::led(),
            "1N5711" => Self::new(name, 315e-9, 2.8, 2.03, 70.0),
            "1N5712" => Self::new(name, 680e-12, 12.0, 1.003, 20.0),
            "1N34" => Self::new(name, 200e-12, 84e-3, 2.19, 60.0),
            "1N4004" => Self::new(name, 18.8e-9, 28.6e-3, 2.0, 400.0),
            "1N4148" => Self::new(name, 4.352e-9, 0.6458, 1.906, 75.0),
            _ => {
                return Err(SimError::invalid_parameter(
                    "diode",
                    "model",
                    format!("unknown diode model '{}'", name),
                ))
            }
        };
        Ok(model)
    }

    /// Model whose current is 1 A at `forward_drop`, with an optional
    /// Zener voltage (0 for none).
    pub fn from_forward_drop(forward_drop: f64, zener_voltage: f64) -> Self {
        let vdcoef = 1.0 / (FORWARD_DROP_EMISSION * THERMAL_VOLTAGE);
        let leakage = 1.0 / ((forward_drop * vdcoef).exp() - 1.0);
        let name = if zener_voltage != 0.0 {
            format!("fwdrop={} zvoltage={}", forward_drop, zener_voltage)
        } else {
            format!("fwdrop={}", forward_drop)
        };
        Self::new(name, leakage, 0.0, FORWARD_DROP_EMISSION, zener_voltage)
    }

    /// The default model with the given Zener voltage.
    pub fn zener(zener_voltage: f64) -> Self {
        Self {
            name: format!("zvoltage={}", zener_voltage),
            breakdown_voltage: zener_voltage,
            ..Self::default()
        }
    }

    /// Voltage increase that raises the current by a factor of e.
    pub fn vscale(&self) -> f64 {
        self.emission_coefficient * THERMAL_VOLTAGE
    }

    /// Voltage at which the current reaches 1 A.
    pub fn forward_drop(&self) -> f64 {
        (1.0 / self.saturation_current + 1.0).ln() * self.vscale()
    }
}

/// A diode component. Terminals: [anode, cathode].
#[derive(Debug, Clone)]
pub struct Diode {
    pins: Pins,
    pub model: DiodeModel,
    core: DiodeCore,
}

impl Diode {
    /// Create a new diode.
    pub fn new(model: DiodeModel) -> Self {
        let internal = usize::from(model.series_resistance > 0.0);
        Self {
            pins: Pins::new(2 + internal),
            core: DiodeCore::new(&model),
            model,
        }
    }

    /// Create a diode from a built-in model name.
    pub fn with_model_name(name: &str) -> Result<Self> {
        DiodeModel::by_name(name).map(Self::new)
    }

    fn has_resistance(&self) -> bool {
        self.model.series_resistance > 0.0
    }

    /// Index of the node the junction ends on.
    fn junction_end(&self) -> usize {
        if self.has_resistance() {
            2
        } else {
            1
        }
    }

    /// Voltage across the junction itself.
    pub fn junction_voltage(&self) -> f64 {
        self.pins.volts[0] - self.pins.volts[self.junction_end()]
    }
}

impl Element for Diode {
    fn pins(&self) -> &Pins {
        &self.pins
    }

    fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    fn terminal_count(&self) -> usize {
        2
    }

    fn internal_node_count(&self) -> usize {
        usize::from(self.has_resistance())
    }

    fn reset(&mut self) {
        self.pins.reset();
        self.core.reset();
    }

    fn stamp(&mut self, ctx: &mut SolverContext) {
        if self.has_resistance() {
            ctx.stamp_resistor(
                self.pins.node(2),
                self.pins.node(1),
                self.model.series_resistance,
            );
        }
    }

    fn do_iteration(&mut self, ctx: &mut SolverContext) {
        let end = self.junction_end();
        let voltdiff = self.junction_voltage();
        self.core
            .do_iteration(ctx, self.pins.node(0), self.pins.node(end), voltdiff);
    }

    fn calculate_current(&mut self) {
        self.pins.current = self.core.current(self.junction_voltage());
    }

    fn save_history(&self, history: &mut History) {
        history.save_pins(&self.pins);
        self.core.save_history(history);
    }

    fn restore_history(&mut self, history: &mut History) {
        history.restore_pins(&mut self.pins);
        self.core.restore_history(history);
    }

    fn is_nonlinear(&self) -> bool {
        true
    }
}
