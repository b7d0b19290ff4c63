//! Backward-Euler companion models.
//!
//! For each timestep the physical component list is rewritten into a
//! universal netlist that contains only resistive branches, independent
//! sources and controlled sources. Each universal branch remembers which
//! component it came from and what role it plays, so the component's
//! voltage and current can be reconstructed after the solve.

use crate::circuit::{ComponentType, Netlist, ResolvedCoupling};
use crate::error::{ConfigurationError, Result};
use crate::history::{History, StepRecord};
use crate::mna::{Branch, BranchRelation, MnaSolution};

/// Diode resistances used by the piecewise-linear diode model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompanionConfig {
    /// Resistance of a non-conducting diode, in ohms.
    pub diode_open_resistance: f64,
    /// Series resistance of a conducting diode, in ohms.
    pub diode_close_resistance: f64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        CompanionConfig {
            diode_open_resistance: 1e6,
            diode_close_resistance: 1e-3,
        }
    }
}

/// Operating region of the piecewise-linear diode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiodeRegime {
    /// 0 <= u < Vf: open resistance only.
    Off,
    /// u >= Vf: closed resistance in series with Vf.
    Conducting,
    /// u < 0: open resistance in parallel with the reverse current.
    Reverse,
}

impl DiodeRegime {
    /// Pick the regime from the previous step's diode voltage
    pub fn select(voltage: f64, forward_voltage: f64) -> Self {
        if voltage >= forward_voltage {
            DiodeRegime::Conducting
        } else if voltage >= 0.0 {
            DiodeRegime::Off
        } else {
            DiodeRegime::Reverse
        }
    }
}

/// Role of a universal branch within its originating component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchRole {
    /// The branch that carries the component's controlling quantities.
    Main,
    /// Series voltage source holding the capacitor's previous voltage.
    CapacitorSourceTerm,
    /// Parallel current source holding the inductor's previous current.
    InductorSourceTerm,
    /// Series forward-voltage source of a conducting diode.
    DiodeForwardDrop,
    /// Parallel leakage current source of a reverse-biased diode.
    DiodeLeakage,
}

impl BranchRole {
    /// Series sub-branches add to the component voltage, parallel ones to its current.
    fn is_series(&self) -> bool {
        matches!(self, BranchRole::CapacitorSourceTerm | BranchRole::DiodeForwardDrop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchOrigin {
    pub component: usize,
    pub role: BranchRole,
}

/// Element of the universal netlist
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniversalElement {
    Conductance(f64),
    Resistor(f64),
    VoltageSource(f64),
    CurrentSource(f64),
    /// Coupling still refers to the controlling *component*.
    Controlled(ResolvedCoupling),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniversalBranch {
    pub node1: usize,
    pub node2: usize,
    pub element: UniversalElement,
    pub origin: BranchOrigin,
}

/// The netlist for one timestep
#[derive(Debug, Clone)]
pub struct UniversalNetlist {
    pub branches: Vec<UniversalBranch>,
    /// Physical plus internal nodes (excluding ground).
    pub num_nodes: usize,
    pub num_physical_nodes: usize,
    /// Index of each component's `Main` branch.
    pub main_branch: Vec<usize>,
}

impl UniversalNetlist {
    /// Lower to MNA branches, mapping controlling components to their main branch
    pub fn to_branches(&self) -> Vec<Branch<f64>> {
        self.branches
            .iter()
            .map(|branch| {
                let relation = match branch.element {
                    UniversalElement::Conductance(g) => BranchRelation::Admittance(g),
                    UniversalElement::Resistor(r) => BranchRelation::Impedance(r),
                    UniversalElement::VoltageSource(u) => BranchRelation::VoltageSource(u),
                    UniversalElement::CurrentSource(i) => BranchRelation::CurrentSource(i),
                    UniversalElement::Controlled(coupling) => BranchRelation::Controlled {
                        kind: coupling.kind,
                        gain: coupling.gain,
                        control: self.main_branch[coupling.control],
                    },
                };
                Branch::new(branch.node1, branch.node2, relation)
            })
            .collect()
    }

    /// Fold the solved branch quantities back onto the physical components.
    pub fn reconstruct(&self, solution: &MnaSolution<f64>) -> StepRecord {
        let num_components = self.main_branch.len();
        let mut component_voltages = vec![0.0; num_components];
        let mut component_currents = vec![0.0; num_components];

        for (k, branch) in self.branches.iter().enumerate() {
            let BranchOrigin { component, role } = branch.origin;
            let v = solution.branch_voltages[k];
            let i = solution.branch_currents[k];

            match role {
                BranchRole::Main => {
                    component_voltages[component] += v;
                    component_currents[component] += i;
                }
                role if role.is_series() => component_voltages[component] += v,
                _ => component_currents[component] += i,
            }
        }

        StepRecord {
            node_voltages: solution
                .node_voltages
                .iter()
                .take(self.num_physical_nodes)
                .copied()
                .collect(),
            component_voltages,
            component_currents,
        }
    }
}

/// Builds the per-step universal netlist
#[derive(Debug, Clone, Default)]
pub struct CompanionModelBuilder {
    config: CompanionConfig,
}

impl CompanionModelBuilder {
    pub fn new(config: CompanionConfig) -> Self {
        CompanionModelBuilder { config }
    }

    /// Build the universal netlist for the step following the last sample in `history`
    pub fn build(&self, netlist: &Netlist, history: &History, dt: f64) -> Result<UniversalNetlist> {
        if netlist.is_empty() {
            return Err(ConfigurationError::EmptyNetlist.into());
        }

        let num_physical_nodes = netlist.node_count();
        let mut next_node = num_physical_nodes + 1;
        let mut branches = Vec::with_capacity(netlist.len() * 2);
        let mut main_branch = Vec::with_capacity(netlist.len());

        for (index, component) in netlist.components().iter().enumerate() {
            let (node1, node2) = (component.node1, component.node2);
            let branch = |n1: usize, n2: usize, element: UniversalElement, role: BranchRole| UniversalBranch {
                node1: n1,
                node2: n2,
                element,
                origin: BranchOrigin { component: index, role },
            };

            main_branch.push(branches.len());
            match &component.component_type {
                ComponentType::Resistor { resistance } => {
                    branches.push(branch(node1, node2, UniversalElement::Resistor(*resistance), BranchRole::Main));
                }
                ComponentType::Conductance { conductance } => {
                    branches.push(branch(node1, node2, UniversalElement::Conductance(*conductance), BranchRole::Main));
                }
                ComponentType::Capacitor { capacitance, .. } => {
                    let internal = next_node;
                    next_node += 1;
                    branches.push(branch(
                        node1,
                        internal,
                        UniversalElement::Conductance(capacitance / dt),
                        BranchRole::Main,
                    ));
                    branches.push(branch(
                        internal,
                        node2,
                        UniversalElement::VoltageSource(history.last_voltage(index)),
                        BranchRole::CapacitorSourceTerm,
                    ));
                }
                ComponentType::Inductor { inductance, .. } => {
                    branches.push(branch(node1, node2, UniversalElement::Resistor(inductance / dt), BranchRole::Main));
                    branches.push(branch(
                        node1,
                        node2,
                        UniversalElement::CurrentSource(history.last_current(index)),
                        BranchRole::InductorSourceTerm,
                    ));
                }
                ComponentType::Diode { forward_voltage, reverse_current } => {
                    let open = UniversalElement::Resistor(self.config.diode_open_resistance);
                    match DiodeRegime::select(history.last_voltage(index), *forward_voltage) {
                        DiodeRegime::Off => {
                            branches.push(branch(node1, node2, open, BranchRole::Main));
                        }
                        DiodeRegime::Conducting => {
                            let internal = next_node;
                            next_node += 1;
                            branches.push(branch(
                                node1,
                                internal,
                                UniversalElement::Resistor(self.config.diode_close_resistance),
                                BranchRole::Main,
                            ));
                            branches.push(branch(
                                internal,
                                node2,
                                UniversalElement::VoltageSource(*forward_voltage),
                                BranchRole::DiodeForwardDrop,
                            ));
                        }
                        DiodeRegime::Reverse => {
                            branches.push(branch(node1, node2, open, BranchRole::Main));
                            branches.push(branch(
                                node1,
                                node2,
                                UniversalElement::CurrentSource(-reverse_current),
                                BranchRole::DiodeLeakage,
                            ));
                        }
                    }
                }
                ComponentType::VoltageSource { waveform } => {
                    let value = waveform.sample(history.samples_for(index), dt);
                    branches.push(branch(node1, node2, UniversalElement::VoltageSource(value), BranchRole::Main));
                }
                ComponentType::CurrentSource { waveform } => {
                    let value = waveform.sample(history.samples_for(index), dt);
                    branches.push(branch(node1, node2, UniversalElement::CurrentSource(value), BranchRole::Main));
                }
                ComponentType::Controlled { .. } => {
                    let coupling = netlist.coupling(index).ok_or_else(|| {
                        ConfigurationError::malformed_coupling(component.designator(), "coupling was not resolved")
                    })?;
                    branches.push(branch(node1, node2, UniversalElement::Controlled(coupling), BranchRole::Main));
                }
            }
        }

        Ok(UniversalNetlist {
            branches,
            num_nodes: next_node - 1,
            num_physical_nodes,
            main_branch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{Component, Waveform};
    use crate::mna::MnaSystem;
    use crate::solver::LinearSolver;

    fn rc_netlist() -> Netlist {
        Netlist::new(vec![
            Component::new_voltage_source(1, 1, 0, Waveform::Dc { amplitude: 5.0 }),
            Component::new_resistor(1, 1, 2, 1000.0),
            Component::new_capacitor(1, 2, 0, 1e-6, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_diode_regime_boundaries() {
        assert_eq!(DiodeRegime::select(0.0, 0.7), DiodeRegime::Off);
        assert_eq!(DiodeRegime::select(0.69, 0.7), DiodeRegime::Off);
        assert_eq!(DiodeRegime::select(0.7, 0.7), DiodeRegime::Conducting);
        assert_eq!(DiodeRegime::select(5.0, 0.7), DiodeRegime::Conducting);
        assert_eq!(DiodeRegime::select(-1e-12, 0.7), DiodeRegime::Reverse);
        // Zero threshold: conducting from 0 upwards.
        assert_eq!(DiodeRegime::select(0.0, 0.0), DiodeRegime::Conducting);
    }

    #[test]
    fn test_capacitor_expands_with_internal_node() {
        let netlist = rc_netlist();
        let history = History::new(&netlist);
        let universal = CompanionModelBuilder::default().build(&netlist, &history, 1e-3).unwrap();

        assert_eq!(universal.branches.len(), 4);
        assert_eq!(universal.num_physical_nodes, 2);
        assert_eq!(universal.num_nodes, 3);
        assert_eq!(universal.main_branch, vec![0, 1, 2]);

        let main = universal.branches[2];
        assert_eq!((main.node1, main.node2), (2, 3));
        match main.element {
            UniversalElement::Conductance(g) => assert!((g - 1e-3).abs() < 1e-15),
            other => panic!("unexpected element {:?}", other),
        }

        let source = universal.branches[3];
        assert_eq!((source.node1, source.node2), (3, 0));
        assert_eq!(source.element, UniversalElement::VoltageSource(1.0));
        assert_eq!(source.origin, BranchOrigin { component: 2, role: BranchRole::CapacitorSourceTerm });
    }

    #[test]
    fn test_inductor_and_diode_expansions() {
        let netlist = Netlist::new(vec![
            Component::new_voltage_source(1, 1, 0, Waveform::Dc { amplitude: 1.0 }),
            Component::new_inductor(1, 1, 2, 1e-3, 0.25),
            Component::new_diode(1, 2, 0, 0.7, 1e-9),
        ])
        .unwrap();
        let history = History::new(&netlist);
        let builder = CompanionModelBuilder::default();
        let universal = builder.build(&netlist, &history, 1e-4).unwrap();

        // Source, inductor (R + I), diode (off: R only).
        assert_eq!(universal.branches.len(), 4);
        match universal.branches[1].element {
            UniversalElement::Resistor(r) => assert!((r - 10.0).abs() < 1e-9),
            other => panic!("unexpected element {:?}", other),
        }
        assert_eq!(universal.branches[2].element, UniversalElement::CurrentSource(0.25));
        assert_eq!(universal.branches[3].element, UniversalElement::Resistor(1e6));
        assert_eq!(universal.num_nodes, 2);
    }

    #[test]
    fn test_source_sampled_at_history_length() {
        let netlist = Netlist::new(vec![
            Component::new_voltage_source(1, 1, 0, Waveform::Ac { amplitude: 2.0, frequency: 1.0, phase: 0.0 }),
            Component::new_resistor(1, 1, 0, 1.0),
        ])
        .unwrap();
        let mut history = History::new(&netlist);
        history
            .commit(StepRecord {
                node_voltages: vec![0.0],
                component_voltages: vec![0.0, 0.0],
                component_currents: vec![0.0, 0.0],
            })
            .unwrap();

        // Two samples recorded: t_index = 2, t = 0.25 s -> quarter period.
        let universal = CompanionModelBuilder::default().build(&netlist, &history, 0.125).unwrap();
        match universal.branches[0].element {
            UniversalElement::VoltageSource(u) => assert!((u - 2.0).abs() < 1e-12),
            other => panic!("unexpected element {:?}", other),
        }
    }

    #[test]
    fn test_capacitor_round_trip() {
        let netlist = rc_netlist();
        let mut history = History::new(&netlist);
        let builder = CompanionModelBuilder::default();
        let solver = LinearSolver::new();

        let universal = builder.build(&netlist, &history, 1e-3).unwrap();
        let system = MnaSystem::assemble(universal.num_nodes, &universal.to_branches()).unwrap();
        let (solution, _) = system.solve(&solver).unwrap();
        let record = universal.reconstruct(&solution);
        let capacitor_voltage = record.component_voltages[2];

        // Backward Euler: (5 - v) / 1000 = 1e-6 * (v - 1) / 1e-3
        assert!((capacitor_voltage - 3.0).abs() < 1e-9);
        assert!((record.node_voltages[1] - capacitor_voltage).abs() < 1e-9);
        assert_eq!(record.node_voltages.len(), 2);

        history.commit(record).unwrap();
        let next = builder.build(&netlist, &history, 1e-3).unwrap();
        assert_eq!(next.branches[3].element, UniversalElement::VoltageSource(capacitor_voltage));
    }
}
