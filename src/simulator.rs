use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::circuit::Netlist;
use crate::companion::{CompanionConfig, CompanionModelBuilder};
use crate::error::{ConfigurationError, Result, SimError, SolveLocation};
use crate::history::History;
use crate::mna::MnaSystem;
use crate::solver::{LinearSolver, SolverConfig, SolverMethod};

/// Relative guard so that e.g. t = 0.3, dt = 0.1 yields 3 and not 2 samples.
const STEP_COUNT_GUARD: f64 = 1e-9;

/// Time series produced by a transient run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientResult {
    pub time: Vec<f64>,
    /// `"node<k>"` -> voltage series
    pub voltage_node: BTreeMap<String, Vec<f64>>,
    /// Designator -> voltage series
    pub voltage_component: BTreeMap<String, Vec<f64>>,
    /// Designator -> current series
    pub current_component: BTreeMap<String, Vec<f64>>,
    pub convergence_info: Vec<ConvergenceInfo>,
    pub total_time: f64,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceInfo {
    pub step: usize,
    pub residual_norm: f64,
    pub solve_time: f64,
    pub solver_method: SolverMethod,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    pub solver_config: SolverConfig,
    pub companion: CompanionConfig,
}

/// Observer called once per completed step with `(step, total)`.
pub trait ProgressSink {
    fn on_step(&mut self, step: usize, total: usize);
}

impl<F: FnMut(usize, usize)> ProgressSink for F {
    fn on_step(&mut self, step: usize, total: usize) {
        self(step, total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Done,
}

/// Main simulator engine
#[derive(Debug, Clone, Default)]
pub struct Simulator {
    config: SimulatorConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl Simulator {
    /// Create a new simulator with default configuration
    pub fn new() -> Self {
        Simulator::default()
    }

    /// Create a new simulator with custom configuration
    pub fn with_config(config: SimulatorConfig) -> Self {
        Simulator { config, cancel: None }
    }

    /// Abort runs at the next step boundary once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Prepare a run that can be driven step by step
    pub fn start<'a>(&self, netlist: &'a Netlist, t: f64, dt: f64) -> Result<TransientRun<'a>> {
        let total_samples = sample_count(t, dt)?;
        Ok(TransientRun {
            netlist,
            builder: CompanionModelBuilder::new(self.config.companion),
            solver: LinearSolver::with_config(self.config.solver_config.clone()),
            history: History::new(netlist),
            dt,
            total_samples,
            state: if total_samples > 1 { RunState::Running } else { RunState::Done },
            cancel: self.cancel.clone(),
            convergence_info: Vec::new(),
            started: Instant::now(),
        })
    }

    /// Run transient analysis over `[0, t)` with timestep `dt`
    pub fn run_transient(&self, netlist: &Netlist, t: f64, dt: f64) -> Result<TransientResult> {
        self.run_transient_with_progress(netlist, t, dt, &mut |_: usize, _: usize| {})
    }

    /// Run transient analysis, reporting each completed step to `progress`
    pub fn run_transient_with_progress(
        &self,
        netlist: &Netlist,
        t: f64,
        dt: f64,
        progress: &mut dyn ProgressSink,
    ) -> Result<TransientResult> {
        info!(
            "Starting transient analysis: {} components, {} nodes, dt={}, t={}",
            netlist.len(),
            netlist.node_count(),
            dt,
            t
        );

        let mut run = self.start(netlist, t, dt)?;
        let total = run.total_steps();
        while run.step()? == RunState::Running {
            progress.on_step(run.completed_steps(), total);
        }
        if total > 0 {
            progress.on_step(run.completed_steps(), total);
        }

        let result = run.finish();
        info!(
            "Transient analysis completed with {} time points in {:.3}ms",
            result.time.len(),
            result.total_time * 1000.0
        );
        Ok(result)
    }
}

/// Number of samples N in the run (including t = 0)
fn sample_count(t: f64, dt: f64) -> Result<usize> {
    if !(t.is_finite() && dt.is_finite() && dt > 0.0 && t >= dt) {
        return Err(ConfigurationError::InvalidTimeStep { t, dt }.into());
    }
    let samples = ((t / dt) * (1.0 + STEP_COUNT_GUARD)).floor();
    // Also catches t / dt overflowing to infinity.
    if !(samples < usize::MAX as f64) {
        return Err(ConfigurationError::InvalidTimeStep { t, dt }.into());
    }
    Ok(samples as usize)
}

/// One transient run: RUNNING over steps 1..N-1, then DONE.
///
/// A failed step leaves the history of the previous steps intact.
pub struct TransientRun<'a> {
    netlist: &'a Netlist,
    builder: CompanionModelBuilder,
    solver: LinearSolver,
    history: History,
    dt: f64,
    total_samples: usize,
    state: RunState,
    cancel: Option<Arc<AtomicBool>>,
    convergence_info: Vec<ConvergenceInfo>,
    started: Instant,
}

impl<'a> TransientRun<'a> {
    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Steps solved so far
    pub fn completed_steps(&self) -> usize {
        self.history.len() - 1
    }

    /// Steps the run will solve in total (N - 1)
    pub fn total_steps(&self) -> usize {
        self.total_samples - 1
    }

    /// Solve and commit the next step
    pub fn step(&mut self) -> Result<RunState> {
        if self.state == RunState::Done {
            return Ok(RunState::Done);
        }

        let step = self.history.len();
        let time = step as f64 * self.dt;

        if let Some(cancel) = &self.cancel {
            if cancel.load(Ordering::Relaxed) {
                warn!("Transient analysis cancelled before step {}", step);
                return Err(SimError::Cancelled { step });
            }
        }

        debug!("Transient step {}: t = {:.6}s", step, time);

        let universal = self.builder.build(self.netlist, &self.history, self.dt)?;
        let system = MnaSystem::assemble(universal.num_nodes, &universal.to_branches())?;
        let (solution, stats) = system
            .solve(&self.solver)
            .map_err(|e| e.at(SolveLocation::TransientStep { step, time }))?;

        if !stats.success {
            warn!(
                "Poor residual at t = {:.6}s: {:.3e}",
                time, stats.residual_norm
            );
        }
        debug!(
            "Solved {}x{} system in {:.3}us, residual {:.3e}",
            system.size(),
            system.size(),
            stats.solve_time * 1e6,
            stats.residual_norm
        );

        self.history.commit(universal.reconstruct(&solution))?;
        self.convergence_info.push(ConvergenceInfo {
            step,
            residual_norm: stats.residual_norm,
            solve_time: stats.solve_time,
            solver_method: stats.method_used,
        });

        if self.history.len() >= self.total_samples {
            self.state = RunState::Done;
        }
        Ok(self.state)
    }

    /// Collect the recorded series and apply the reporting directions.
    /// Called before DONE it returns the steps completed so far.
    pub fn finish(self) -> TransientResult {
        let samples = self.history.len();
        let time = (0..samples).map(|i| i as f64 * self.dt).collect();
        let (node_series, voltage_series, current_series) = self.history.into_series();

        let voltage_node = node_series
            .into_iter()
            .enumerate()
            .map(|(i, series)| (Netlist::node_name(i + 1), series))
            .collect();

        let mut voltage_component = BTreeMap::new();
        let mut current_component = BTreeMap::new();
        for ((component, mut voltages), mut currents) in self
            .netlist
            .components()
            .iter()
            .zip(voltage_series)
            .zip(current_series)
        {
            if !component.vol_dir {
                negate(&mut voltages);
            }
            // Sources report the current they deliver, everything else the current it absorbs.
            let flip_current = if component.kind().is_independent_source() {
                component.cur_dir
            } else {
                !component.cur_dir
            };
            if flip_current {
                negate(&mut currents);
            }

            let designator = component.designator();
            voltage_component.insert(designator.clone(), voltages);
            current_component.insert(designator, currents);
        }

        let success = self.state == RunState::Done;
        TransientResult {
            time,
            voltage_node,
            voltage_component,
            current_component,
            convergence_info: self.convergence_info,
            total_time: self.started.elapsed().as_secs_f64(),
            success,
        }
    }
}

fn negate(series: &mut [f64]) {
    for value in series.iter_mut() {
        *value = -*value;
    }
}
