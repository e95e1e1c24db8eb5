//! CircuitSim - transient circuit simulator
//!
//! Runs one of the built-in demo circuits and prints a voltage trace table.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug circuitsim rc --steps 400 --every 20 --net out
//! ```

use clap::{Parser, ValueEnum};
use circuitsim_core::components::{
    Capacitor, Diode, DiodeModel, Gate, OpAmp, Resistor, Transistor, VoltageSource, Waveform,
};
use circuitsim_core::{Circuit, Result, Simulator, SimulatorConfig};

/// Built-in demo circuits
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Demo {
    /// 9 V across two 10k resistors
    Divider,
    /// 5 V step into 1k / 1uF
    Rc,
    /// Sine through 1k into a diode
    Diode,
    /// Common-emitter amplifier
    Bjt,
    /// Two cross-coupled NAND gates
    NandRing,
    /// Op-amp voltage follower
    Follower,
}

/// Transient circuit simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Demo circuit to simulate
    #[arg(value_enum)]
    demo: Demo,

    /// Number of time steps
    #[arg(short, long, default_value_t = 200)]
    steps: usize,

    /// Time step in seconds
    #[arg(short, long)]
    time_step: Option<f64>,

    /// Print every K-th step
    #[arg(short, long, default_value_t = 10)]
    every: usize,

    /// Net to print (repeatable); defaults depend on the demo
    #[arg(short, long)]
    net: Vec<String>,

    /// Seed for the tie-breaking heuristics
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn build(demo: Demo) -> Result<(Circuit, Vec<&'static str>)> {
    let mut c = Circuit::new();
    let nets = match demo {
        Demo::Divider => {
            c.add("V1", VoltageSource::dc(9.0), &["in", "gnd"])?;
            c.add("R1", Resistor::new(10_000.0), &["in", "out"])?;
            c.add("R2", Resistor::new(10_000.0), &["out", "gnd"])?;
            vec!["out"]
        }
        Demo::Rc => {
            c.add("V1", VoltageSource::dc(5.0), &["in", "gnd"])?;
            c.add("R1", Resistor::new(1000.0), &["in", "out"])?;
            c.add("C1", Capacitor::new(1e-6), &["out", "gnd"])?;
            vec!["out"]
        }
        Demo::Diode => {
            let vin = VoltageSource::with_waveform(Waveform::Sine, 5.0).frequency(500.0);
            c.add("V1", vin, &["in", "gnd"])?;
            c.add("R1", Resistor::new(1000.0), &["in", "a"])?;
            c.add("D1", Diode::new(DiodeModel::default()), &["a", "gnd"])?;
            vec!["in", "a"]
        }
        Demo::Bjt => {
            let vin = VoltageSource::with_waveform(Waveform::Sine, 0.05).frequency(1000.0);
            c.add("VCC", VoltageSource::dc(12.0), &["vcc", "gnd"])?;
            c.add("VIN", vin, &["in", "gnd"])?;
            // signal rides on the bottom of the bias divider
            c.add("R1", Resistor::new(100_000.0), &["vcc", "base"])?;
            c.add("R2", Resistor::new(22_000.0), &["base", "in"])?;
            c.add("RC", Resistor::new(4700.0), &["vcc", "col"])?;
            c.add("RE", Resistor::new(1000.0), &["emit", "gnd"])?;
            c.add("Q1", Transistor::npn(), &["col", "base", "emit"])?;
            vec!["in", "base", "col"]
        }
        Demo::NandRing => {
            c.add("G1", Gate::nand(2), &["b", "b", "a"])?;
            c.add("G2", Gate::nand(2), &["a", "a", "b"])?;
            vec!["a", "b"]
        }
        Demo::Follower => {
            let vin = VoltageSource::with_waveform(Waveform::Sine, 2.0).frequency(200.0);
            c.add("VIN", vin, &["in", "gnd"])?;
            c.add("U1", OpAmp::default(), &["out", "in", "out"])?;
            c.add("RL", Resistor::new(10_000.0), &["out", "gnd"])?;
            vec!["in", "out"]
        }
    };
    Ok((c, nets))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (circuit, default_nets) = build(args.demo)?;
    let nets: Vec<String> = if args.net.is_empty() {
        default_nets.iter().map(|p| p.to_string()).collect()
    } else {
        args.net
    };

    let mut config = SimulatorConfig::new().with_seed(args.seed);
    if let Some(dt) = args.time_step {
        config = config.with_time_step(dt);
    }
    let mut sim = Simulator::with_config(circuit, config)?;

    println!("{:>14} {}", "time", nets.join(" "));
    let every = args.every.max(1);
    for n in 0..args.steps {
        let report = sim.step_adaptive()?;
        if n % every == 0 || n + 1 == args.steps {
            let mut row = format!("{:>14.6e}", report.time);
            for p in &nets {
                row.push_str(&format!(" {:>12.6}", sim.node_voltage(p)?));
            }
            println!("{}", row);
        }
    }

    Ok(())
}
