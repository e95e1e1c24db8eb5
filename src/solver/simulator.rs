//! Main simulator interface.

use log::{debug, info, warn};

use crate::circuit::{allocate, validate_circuit, Circuit, ElementId, NodeId, Topology};
use crate::components::{Component, Element, History};
use crate::error::{Result, SimError};

use super::context::{Checkpoint, Halt, SolverContext};
use super::{NewtonRaphson, FLOATING_NODE_CONDUCTANCE, OVERFLOW_LIMIT, SUB_ITER_MAX};

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Time step (seconds).
    pub time_step: f64,
    /// Maximum Newton-Raphson sub-iterations per step.
    pub max_sub_iterations: usize,
    /// Steps run by one [`Simulator::tick`].
    pub steps_per_tick: usize,
    /// Seed of the random generator behind the tie-breaking heuristics.
    pub seed: u64,
    /// Tie floating nodes to ground instead of failing the analysis.
    pub ground_floating_nodes: bool,
    /// How many times [`Simulator::step_adaptive`] may halve the step.
    pub max_step_halvings: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            time_step: 5e-6,
            max_sub_iterations: SUB_ITER_MAX,
            steps_per_tick: 1,
            seed: 0,
            ground_floating_nodes: false,
            max_step_halvings: 4,
        }
    }
}

impl SimulatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time step (in seconds).
    pub fn with_time_step(mut self, time_step: f64) -> Self {
        self.time_step = time_step;
        self
    }

    /// Set the maximum Newton-Raphson sub-iterations.
    ///
    /// Circuits with many stiff junctions (ring oscillators, power stages)
    /// may need the default 5000; small analog circuits rarely use more
    /// than a few dozen.
    pub fn with_max_sub_iterations(mut self, max_sub_iterations: usize) -> Self {
        self.max_sub_iterations = max_sub_iterations;
        self
    }

    pub fn with_steps_per_tick(mut self, steps: usize) -> Self {
        self.steps_per_tick = steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_ground_floating_nodes(mut self, enabled: bool) -> Self {
        self.ground_floating_nodes = enabled;
        self
    }

    pub fn with_max_step_halvings(mut self, halvings: u32) -> Self {
        self.max_step_halvings = halvings;
        self
    }

    /// Check the parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(SimError::invalid_sim_param(format!(
                "time step must be positive, got {}",
                self.time_step
            )));
        }
        if self.max_sub_iterations == 0 {
            return Err(SimError::invalid_sim_param(
                "max_sub_iterations must be at least 1",
            ));
        }
        if self.steps_per_tick == 0 {
            return Err(SimError::invalid_sim_param(
                "steps_per_tick must be at least 1",
            ));
        }
        if self.max_step_halvings > 20 {
            return Err(SimError::invalid_sim_param(format!(
                "max_step_halvings of {} would take over a million sub-steps",
                self.max_step_halvings
            )));
        }
        Ok(())
    }
}

/// Outcome of one committed step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Linear solves used (summed over sub-steps of an adaptive step)
    pub iterations: usize,
    /// Simulation time after the step (seconds)
    pub time: f64,
}

/// The main circuit simulator.
///
/// Owns the circuit, its numbering and the solver context. Analysis runs
/// once at construction; element parameter changes made through
/// [`component_mut`](Self::component_mut) are picked up by a restamp
/// before the next step.
pub struct Simulator {
    /// The circuit being simulated
    circuit: Circuit,
    config: SimulatorConfig,
    topology: Topology,
    /// Nodes tied to ground because they float
    ties: Vec<NodeId>,
    ctx: SolverContext,
    newton: NewtonRaphson,
    /// Element state at the start of an adaptive step
    history: History,
    needs_restamp: bool,
    running: bool,
    /// Set when a fatal condition stopped the run
    stop_reason: Option<String>,
}

impl Simulator {
    /// Create a new simulator for the given circuit with default configuration.
    pub fn new(circuit: Circuit) -> Result<Self> {
        Self::with_config(circuit, SimulatorConfig::default())
    }

    /// Create a new simulator for the given circuit with custom configuration.
    pub fn with_config(circuit: Circuit, config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        let mut sim = Self {
            circuit,
            ctx: SolverContext::new(config.time_step, config.seed),
            newton: NewtonRaphson::new(config.max_sub_iterations),
            history: History::new(),
            config,
            topology: Topology::default(),
            ties: Vec::new(),
            needs_restamp: true,
            running: true,
            stop_reason: None,
        };
        sim.analyze()?;
        Ok(sim)
    }

    /// Number nodes and unknowns, check the topology and stamp.
    pub fn analyze(&mut self) -> Result<()> {
        self.topology = allocate(&mut self.circuit)?;
        self.ties = validate_circuit(
            &mut self.circuit,
            &self.topology,
            self.config.ground_floating_nodes,
        )?;
        self.ctx
            .allocate(self.topology.node_count, self.topology.branch_count);
        self.restamp()?;
        debug!(
            "analyzed {} elements: {} nodes, {} branches, {} floating node(s) tied",
            self.circuit.len(),
            self.topology.node_count,
            self.topology.branch_count,
            self.ties.len()
        );
        Ok(())
    }

    /// Rebuild the cached linear system from the current element parameters.
    pub fn restamp(&mut self) -> Result<()> {
        let ctx = &mut self.ctx;
        ctx.matrix_mut().clear();
        for c in self.circuit.components_mut() {
            c.element_mut().stamp(ctx);
        }
        for &node in &self.ties {
            ctx.stamp_matrix(node, node, FLOATING_NODE_CONDUCTANCE);
        }
        ctx.matrix_mut().cache_linear();
        if self.topology.linear {
            ctx.matrix_mut().factor()?;
        }
        self.needs_restamp = false;
        Ok(())
    }

    /// Clear all element history, rewind time and reseed the generator.
    /// Also clears a stopped state.
    pub fn reset(&mut self) {
        for c in self.circuit.components_mut() {
            c.element_mut().reset();
        }
        self.ctx.reset();
        self.stop_reason = None;
        self.running = true;
        self.needs_restamp = true;
        info!("simulation reset");
    }

    fn stop(&mut self, reason: String) {
        info!("simulation stopped: {}", reason);
        self.running = false;
        self.stop_reason = Some(reason);
    }

    /// Advance the simulation by one time step.
    pub fn step(&mut self) -> Result<StepReport> {
        if let Some(reason) = &self.stop_reason {
            return Err(SimError::Stopped {
                reason: reason.clone(),
            });
        }
        if self.needs_restamp {
            self.restamp()?;
        }

        match self.solve_step() {
            Ok(report) => Ok(report),
            Err(e) => {
                if e.is_recoverable() {
                    warn!("{}", e);
                } else {
                    self.stop(e.to_string());
                }
                Err(e)
            }
        }
    }

    fn solve_step(&mut self) -> Result<StepReport> {
        let ctx = &mut self.ctx;
        let elements = self.circuit.components_mut();

        for c in elements.iter_mut() {
            c.element_mut().start_iteration(ctx);
        }
        let iterations = self.newton.run(elements, &self.topology, ctx)?;

        let mut halt: Option<(ElementId, Halt)> = None;
        for (i, c) in elements.iter_mut().enumerate() {
            let e = c.element_mut();
            e.finish_iteration(ctx);
            let current = e.current();
            if !current.is_finite() || current.abs() > OVERFLOW_LIMIT {
                ctx.halt(Halt::Overflow { value: current });
            }
            if let Some(h) = ctx.take_halt() {
                halt.get_or_insert((ElementId(i), h));
            }
        }
        if let Some((id, h)) = halt {
            let element = self.circuit.name(id).to_string();
            return Err(match h {
                Halt::Overflow { value } => SimError::overflow(element, value),
                Halt::Broken { message } => {
                    warn!("{} broke: {}", element, message);
                    SimError::DeviceBroken { element, message }
                }
            });
        }

        ctx.time += ctx.time_step;
        Ok(StepReport {
            iterations,
            time: ctx.time,
        })
    }

    /// Advance by one time step, retrying with halved steps when the
    /// Newton iteration does not converge.
    ///
    /// On retry the element state is rolled back and the same interval is
    /// covered by 2^k sub-steps. The configured step is restored afterwards.
    /// Only element history and the solution vector are saved per step.
    pub fn step_adaptive(&mut self) -> Result<StepReport> {
        self.history.clear();
        for c in self.circuit.components() {
            c.element().save_history(&mut self.history);
        }
        let checkpoint = self.ctx.checkpoint();

        let mut last_err = match self.step() {
            Ok(report) => return Ok(report),
            Err(e) if e.is_recoverable() => e,
            Err(e) => return Err(e),
        };

        let base = self.config.time_step;
        let start = checkpoint.time();
        for k in 1..=self.config.max_step_halvings {
            self.rollback(&checkpoint);
            let sub_steps = 1usize << k;
            self.ctx.time_step = base / sub_steps as f64;
            warn!(
                "retrying step at t={:.6e} with {} sub-steps of {:.3e} s",
                start, sub_steps, self.ctx.time_step
            );
            self.restamp()?;

            match self.run_sub_steps(sub_steps) {
                Ok(iterations) => {
                    self.ctx.time_step = base;
                    self.ctx.time = start + base;
                    self.restamp()?;
                    return Ok(StepReport {
                        iterations,
                        time: self.ctx.time,
                    });
                }
                Err(e) if e.is_recoverable() => last_err = e,
                Err(e) => {
                    self.ctx.time_step = base;
                    self.needs_restamp = true;
                    return Err(e);
                }
            }
        }

        self.rollback(&checkpoint);
        self.needs_restamp = true;
        Err(last_err)
    }

    fn run_sub_steps(&mut self, count: usize) -> Result<usize> {
        let mut iterations = 0;
        for _ in 0..count {
            iterations += self.step()?.iterations;
        }
        Ok(iterations)
    }

    fn rollback(&mut self, checkpoint: &Checkpoint) {
        self.history.rewind();
        for c in self.circuit.components_mut() {
            c.element_mut().restore_history(&mut self.history);
        }
        self.ctx.rollback(checkpoint);
    }

    /// Run `steps_per_tick` steps, stopping early if the run is paused.
    /// Returns the number of steps taken.
    pub fn tick(&mut self) -> Result<usize> {
        let mut taken = 0;
        for _ in 0..self.config.steps_per_tick {
            if !self.running {
                break;
            }
            self.step()?;
            taken += 1;
        }
        Ok(taken)
    }

    /// Run up to `steps` steps while the run flag stays set.
    /// Returns the total number of linear solves.
    pub fn run(&mut self, steps: usize) -> Result<usize> {
        let mut iterations = 0;
        for _ in 0..steps {
            if !self.running {
                break;
            }
            iterations += self.step()?.iterations;
        }
        Ok(iterations)
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Why the run was stopped, if it was.
    pub fn stopped(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    /// Current simulation time (seconds).
    pub fn time(&self) -> f64 {
        self.ctx.time
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Get the current voltage of a net by name.
    pub fn node_voltage(&self, net: &str) -> Result<f64> {
        let id = self.circuit.net(net).ok_or_else(|| SimError::NetNotFound {
            net: net.to_string(),
        })?;
        Ok(self.ctx.solution(self.topology.net_node(id)))
    }

    /// Read-back access to an element by name.
    pub fn element(&self, name: &str) -> Result<&dyn Element> {
        let id = self.circuit.require(name)?;
        Ok(self.circuit.component(id).element())
    }

    pub fn component(&self, name: &str) -> Result<&Component> {
        let id = self.circuit.require(name)?;
        Ok(self.circuit.component(id))
    }

    /// Mutable access to an element. The system is restamped before the
    /// next step so parameter changes take effect.
    pub fn component_mut(&mut self, name: &str) -> Result<&mut Component> {
        let id = self.circuit.require(name)?;
        self.needs_restamp = true;
        Ok(self.circuit.component_mut(id))
    }

    /// Get a reference to the circuit.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn context(&self) -> &SolverContext {
        &self.ctx
    }
}
