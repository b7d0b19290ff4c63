//! Sinusoidal steady-state (phasor) analysis.
//!
//! Takes a table of linear components, builds one complex MNA system at the
//! common source frequency and solves it once. Pure DC tables without
//! reactive elements are solved at zero frequency.

use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;
use std::str::FromStr;

use log::{debug, info};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::circuit::{ControlledKind, Netlist};
use crate::error::{ConfigurationError, Result, SimError, SolveLocation};
use crate::mna::{Branch, BranchRelation, MnaSystem};
use crate::parser::{parse_coupling, parse_passive_value, parse_source_spec, ControlTarget, SourceSpec};
use crate::solver::{LinearSolver, SolverConfig};

/// One row of the steady-state component table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateRow {
    /// One of `R, G, L, C, Us, Is, VCVS, VCCS, CCVS, CCCS`
    pub name: String,
    pub serial: u32,
    pub value: String,
    pub node1: usize,
    pub node2: usize,
}

impl SteadyStateRow {
    pub fn new(name: &str, serial: u32, value: &str, node1: usize, node2: usize) -> Self {
        SteadyStateRow {
            name: name.to_string(),
            serial,
            value: value.to_string(),
            node1,
            node2,
        }
    }

    pub fn designator(&self) -> String {
        format!("{}-{}", self.name, self.serial)
    }
}

/// Phasor results keyed by `"node<k>"` and by designator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateSolution {
    /// Common source frequency, `None` for a DC table.
    pub frequency: Option<f64>,
    pub node_voltages: BTreeMap<String, Complex<f64>>,
    pub branch_voltages: BTreeMap<String, Complex<f64>>,
    pub branch_currents: BTreeMap<String, Complex<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Resistor,
    Conductance,
    Inductor,
    Capacitor,
    VoltageSource,
    CurrentSource,
    Controlled(ControlledKind),
}

impl RowKind {
    fn is_reactive(&self) -> bool {
        matches!(self, RowKind::Inductor | RowKind::Capacitor)
    }
}

impl FromStr for RowKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let kind = match s {
            "R" => RowKind::Resistor,
            "G" => RowKind::Conductance,
            "L" => RowKind::Inductor,
            "C" => RowKind::Capacitor,
            "Us" => RowKind::VoltageSource,
            "Is" => RowKind::CurrentSource,
            "VCVS" => RowKind::Controlled(ControlledKind::Vcvs),
            "VCCS" => RowKind::Controlled(ControlledKind::Vccs),
            "CCVS" => RowKind::Controlled(ControlledKind::Ccvs),
            "CCCS" => RowKind::Controlled(ControlledKind::Cccs),
            _ => {
                return Err(ConfigurationError::UnknownKind {
                    kind: s.to_string(),
                })
            }
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RowValue {
    Passive(f64),
    Source(SourceSpec),
    Coupling { gain: f64, target: ControlTarget },
}

#[derive(Debug, Clone)]
struct ParsedRow {
    kind: RowKind,
    designator: String,
    node1: usize,
    node2: usize,
    value: RowValue,
}

/// Stateless phasor solver
#[derive(Debug, Clone, Default)]
pub struct SteadyStateSolver {
    solver: LinearSolver,
}

impl SteadyStateSolver {
    pub fn new() -> Self {
        SteadyStateSolver::default()
    }

    pub fn with_config(config: SolverConfig) -> Self {
        SteadyStateSolver {
            solver: LinearSolver::with_config(config),
        }
    }

    /// Solve the table at its common source frequency
    pub fn solve(&self, rows: &[SteadyStateRow]) -> Result<SteadyStateSolution> {
        if rows.is_empty() {
            return Err(ConfigurationError::EmptyNetlist.into());
        }
        info!("Starting steady-state analysis: {} branches", rows.len());

        let parsed = parse_rows(rows)?;
        let num_nodes = check_nodes(&parsed)?;
        let frequency = common_frequency(&parsed)?;
        let omega = 2.0 * PI * frequency.unwrap_or(0.0);
        debug!("Steady-state frequency: {:?} Hz", frequency);

        let index: HashMap<&str, usize> = parsed
            .iter()
            .enumerate()
            .map(|(i, row)| (row.designator.as_str(), i))
            .collect();

        let branches = parsed
            .iter()
            .enumerate()
            .map(|(k, row)| phasor_branch(k, row, omega, &index))
            .collect::<Result<Vec<_>>>()?;

        let system = MnaSystem::assemble(num_nodes, &branches)?;
        let (solution, stats) = system
            .solve(&self.solver)
            .map_err(|e| e.at(SolveLocation::SteadyState))?;
        debug!(
            "Solved {}x{} complex system, residual {:.3e}",
            system.size(),
            system.size(),
            stats.residual_norm
        );

        let node_voltages = solution
            .node_voltages
            .iter()
            .enumerate()
            .map(|(i, v)| (Netlist::node_name(i + 1), *v))
            .collect();
        let branch_voltages = parsed
            .iter()
            .zip(solution.branch_voltages.iter())
            .map(|(row, v)| (row.designator.clone(), *v))
            .collect();
        let branch_currents = parsed
            .iter()
            .zip(solution.branch_currents.iter())
            .map(|(row, i)| (row.designator.clone(), *i))
            .collect();

        Ok(SteadyStateSolution {
            frequency,
            node_voltages,
            branch_voltages,
            branch_currents,
        })
    }
}

fn parse_rows(rows: &[SteadyStateRow]) -> Result<Vec<ParsedRow>> {
    let mut seen = HashMap::new();
    let mut parsed = Vec::with_capacity(rows.len());

    for (i, row) in rows.iter().enumerate() {
        let kind: RowKind = row.name.trim().parse()?;
        let designator = row.designator();
        if seen.insert(designator.clone(), i).is_some() {
            return Err(ConfigurationError::DuplicateDesignator { designator }.into());
        }
        if row.node1 == row.node2 {
            return Err(ConfigurationError::DegenerateBranch {
                designator,
                node: row.node1,
            }
            .into());
        }

        let value = match kind {
            RowKind::VoltageSource | RowKind::CurrentSource => {
                RowValue::Source(parse_source_spec(&designator, &row.value)?)
            }
            RowKind::Controlled(_) => {
                let (gain, target) = parse_coupling(&designator, &row.value)?;
                RowValue::Coupling { gain, target }
            }
            RowKind::Conductance => {
                let g = parse_passive_value(&designator, &row.value)?;
                if !g.is_finite() {
                    return Err(ConfigurationError::invalid_value(&designator, "conductance must be finite").into());
                }
                RowValue::Passive(g)
            }
            RowKind::Resistor | RowKind::Inductor | RowKind::Capacitor => {
                let x = parse_passive_value(&designator, &row.value)?;
                if !(x.is_finite() && x > 0.0) {
                    return Err(ConfigurationError::invalid_value(
                        &designator,
                        format!("value must be positive and finite, got {}", x),
                    )
                    .into());
                }
                RowValue::Passive(x)
            }
        };

        parsed.push(ParsedRow {
            kind,
            designator,
            node1: row.node1,
            node2: row.node2,
            value,
        });
    }

    Ok(parsed)
}

/// Highest node id, after checking that every id below it is used
fn check_nodes(rows: &[ParsedRow]) -> Result<usize> {
    let num_nodes = rows.iter().map(|r| r.node1.max(r.node2)).max().unwrap_or(0);
    let mut used = vec![false; num_nodes + 1];
    for row in rows {
        used[row.node1] = true;
        used[row.node2] = true;
    }
    match (1..=num_nodes).find(|&n| !used[n]) {
        Some(missing) => Err(ConfigurationError::NonContiguousNodes { missing, max: num_nodes }.into()),
        None => Ok(num_nodes),
    }
}

fn common_frequency(rows: &[ParsedRow]) -> Result<Option<f64>> {
    let mut frequency: Option<(f64, &str)> = None;
    let mut constant: Option<&str> = None;

    for row in rows {
        match row.value {
            // A 0 Hz sinusoid is a DC excitation.
            RowValue::Source(SourceSpec::Sinusoid { frequency: f, .. }) if f == 0.0 => {
                constant.get_or_insert(row.designator.as_str());
            }
            RowValue::Source(SourceSpec::Sinusoid { frequency: f, .. }) => match frequency {
                Some((existing, first)) if existing != f => {
                    return Err(SimError::inconsistent_source(format!(
                        "'{}' runs at {} Hz but '{}' runs at {} Hz",
                        row.designator, f, first, existing
                    )));
                }
                Some(_) => {}
                None => frequency = Some((f, row.designator.as_str())),
            },
            RowValue::Source(SourceSpec::Constant(_)) => {
                constant.get_or_insert(row.designator.as_str());
            }
            _ => {}
        }
    }

    if let Some(reactive) = rows.iter().find(|r| r.kind.is_reactive()) {
        if let Some(source) = constant {
            return Err(SimError::inconsistent_source(format!(
                "constant source '{}' cannot drive a circuit containing '{}'",
                source, reactive.designator
            )));
        }
        if frequency.is_none() {
            return Err(SimError::inconsistent_source(format!(
                "'{}' needs a sinusoidal source to set the frequency",
                reactive.designator
            )));
        }
    }

    Ok(frequency.map(|(f, _)| f))
}

fn phasor_branch(
    k: usize,
    row: &ParsedRow,
    omega: f64,
    index: &HashMap<&str, usize>,
) -> Result<Branch<Complex<f64>>> {
    let j = Complex::new(0.0, 1.0);

    let relation = match (&row.kind, &row.value) {
        (RowKind::Resistor, RowValue::Passive(r)) => BranchRelation::Impedance(Complex::from(*r)),
        (RowKind::Conductance, RowValue::Passive(g)) => BranchRelation::Admittance(Complex::from(*g)),
        (RowKind::Inductor, RowValue::Passive(l)) => BranchRelation::Impedance(j * (omega * *l)),
        (RowKind::Capacitor, RowValue::Passive(c)) => BranchRelation::Admittance(j * (omega * *c)),
        (RowKind::VoltageSource, RowValue::Source(spec)) => BranchRelation::VoltageSource(phasor(spec)),
        (RowKind::CurrentSource, RowValue::Source(spec)) => BranchRelation::CurrentSource(phasor(spec)),
        (RowKind::Controlled(kind), RowValue::Coupling { gain, target }) => {
            let control = match target {
                ControlTarget::Branch(i) => *i,
                ControlTarget::Designator(d) => *index.get(d.as_str()).ok_or_else(|| {
                    ConfigurationError::malformed_coupling(&row.designator, format!("no branch named '{}'", d))
                })?,
            };
            if control >= index.len() || control == k {
                return Err(ConfigurationError::malformed_coupling(
                    &row.designator,
                    format!("branch {} is out of range or the source itself", control),
                )
                .into());
            }
            BranchRelation::Controlled {
                kind: *kind,
                gain: Complex::from(*gain),
                control,
            }
        }
        _ => {
            return Err(ConfigurationError::invalid_value(&row.designator, "value does not match the component kind").into());
        }
    };

    Ok(Branch::new(row.node1, row.node2, relation))
}

fn phasor(spec: &SourceSpec) -> Complex<f64> {
    match *spec {
        SourceSpec::Sinusoid { amplitude, phase, .. } => Complex::from_polar(amplitude, phase),
        SourceSpec::Constant(value) => Complex::from(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rc_table() -> Vec<SteadyStateRow> {
        vec![
            SteadyStateRow::new("Us", 1, "sin,10,50,0", 1, 0),
            SteadyStateRow::new("R", 1, "3185", 1, 2),
            SteadyStateRow::new("C", 1, "1u", 2, 0),
        ]
    }

    #[test]
    fn test_rc_phasor() {
        let solution = SteadyStateSolver::new().solve(&rc_table()).unwrap();
        let omega = 2.0 * PI * 50.0;
        let expected = Complex::from(10.0) / (Complex::new(1.0, omega * 3185.0 * 1e-6));

        assert_eq!(solution.frequency, Some(50.0));
        assert!((solution.node_voltages["node2"] - expected).norm() < 1e-9);
        assert!((solution.branch_voltages["C-1"] - expected).norm() < 1e-9);
        assert!((solution.node_voltages["node1"] - Complex::from(10.0)).norm() < 1e-9);

        let i_r = solution.branch_currents["R-1"];
        let i_c = solution.branch_currents["C-1"];
        assert!((i_r - i_c).norm() < 1e-12);
        assert!((solution.branch_currents["Us-1"] + i_r).norm() < 1e-12);
    }

    #[test]
    fn test_solve_is_idempotent() {
        let solver = SteadyStateSolver::new();
        let first = solver.solve(&rc_table()).unwrap();
        let second = solver.solve(&rc_table()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rl_with_phase() {
        let table = vec![
            SteadyStateRow::new("Us", 1, "sin,1,1000,1.5707963267948966", 1, 0),
            SteadyStateRow::new("R", 1, "10", 1, 2),
            SteadyStateRow::new("L", 1, "1m", 2, 0),
        ];
        let solution = SteadyStateSolver::new().solve(&table).unwrap();
        let omega = 2.0 * PI * 1000.0;
        let source = Complex::new(0.0, 1.0);
        let expected = source / Complex::new(10.0, omega * 1e-3);

        assert!((solution.branch_currents["L-1"] - expected).norm() < 1e-12);
    }

    #[test]
    fn test_dc_resistive_table() {
        let table = vec![
            SteadyStateRow::new("Us", 1, "const,12", 1, 0),
            SteadyStateRow::new("R", 1, "2k", 1, 2),
            SteadyStateRow::new("R", 2, "1k", 2, 0),
            SteadyStateRow::new("Is", 1, "const,0.001", 0, 2),
        ];
        let solution = SteadyStateSolver::new().solve(&table).unwrap();

        assert_eq!(solution.frequency, None);
        // Superposition: 12 * 1/3 + 1 mA * (2k || 1k) = 4 + 0.6667
        assert!((solution.node_voltages["node2"].re - (4.0 + 2.0 / 3.0)).abs() < 1e-9);
        assert!(solution.node_voltages["node2"].im.abs() < 1e-12);
    }

    #[test]
    fn test_controlled_sources_by_index_and_designator() {
        let table = vec![
            SteadyStateRow::new("Us", 1, "const,2", 1, 0),
            SteadyStateRow::new("R", 1, "100", 1, 0),
            SteadyStateRow::new("VCVS", 1, "3*1", 2, 0),
            SteadyStateRow::new("R", 2, "50", 2, 0),
            SteadyStateRow::new("CCCS", 1, "0.01*R-1", 0, 3),
            SteadyStateRow::new("R", 3, "10", 3, 0),
        ];
        let solution = SteadyStateSolver::new().solve(&table).unwrap();

        assert!((solution.node_voltages["node2"].re - 6.0).abs() < 1e-9);
        // 0.01 * v(R-1) = 20 mA into node 3 through 10 ohm.
        assert!((solution.node_voltages["node3"].re - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_ccvs_scales_controlling_branch_voltage() {
        let table = vec![
            SteadyStateRow::new("Us", 1, "const,2", 1, 0),
            SteadyStateRow::new("R", 1, "100", 1, 0),
            SteadyStateRow::new("CCVS", 1, "3*1", 2, 0),
            SteadyStateRow::new("R", 2, "50", 2, 0),
        ];
        let solution = SteadyStateSolver::new().solve(&table).unwrap();

        assert!((solution.node_voltages["node2"] - Complex::from(6.0)).norm() < 1e-9);
        assert!((solution.branch_currents["R-2"] - Complex::from(0.12)).norm() < 1e-12);
    }

    #[test]
    fn test_zero_frequency_sinusoid_is_dc() {
        let table = vec![
            SteadyStateRow::new("Us", 1, "sin,10,50,0", 1, 0),
            SteadyStateRow::new("R", 1, "10", 1, 0),
            SteadyStateRow::new("Is", 1, "sin,1,0,0", 0, 2),
            SteadyStateRow::new("R", 2, "5", 2, 0),
        ];
        let solution = SteadyStateSolver::new().solve(&table).unwrap();
        assert_eq!(solution.frequency, Some(50.0));
        assert!((solution.node_voltages["node2"] - Complex::from(5.0)).norm() < 1e-9);

        // Still a DC source as far as reactive elements are concerned.
        let mut reactive = rc_table();
        reactive.push(SteadyStateRow::new("Is", 1, "sin,1,0,0", 0, 2));
        assert!(matches!(
            SteadyStateSolver::new().solve(&reactive),
            Err(SimError::InconsistentSource { .. })
        ));
    }

    #[test]
    fn test_mixed_frequencies_rejected() {
        let mut table = rc_table();
        table.push(SteadyStateRow::new("Is", 1, "sin,1,60,0", 0, 2));
        assert!(matches!(
            SteadyStateSolver::new().solve(&table),
            Err(SimError::InconsistentSource { .. })
        ));
    }

    #[test]
    fn test_constant_source_with_capacitor_rejected() {
        let mut table = rc_table();
        table[0].value = "const,10".to_string();
        assert!(matches!(
            SteadyStateSolver::new().solve(&table),
            Err(SimError::InconsistentSource { .. })
        ));
    }

    #[test]
    fn test_reactive_without_source_rejected() {
        let table = vec![
            SteadyStateRow::new("R", 1, "10", 1, 0),
            SteadyStateRow::new("L", 1, "1m", 1, 0),
        ];
        assert!(matches!(
            SteadyStateSolver::new().solve(&table),
            Err(SimError::InconsistentSource { .. })
        ));
    }

    #[test]
    fn test_table_validation() {
        let solver = SteadyStateSolver::new();

        let unknown = vec![SteadyStateRow::new("Q", 1, "1", 1, 0)];
        assert!(matches!(
            solver.solve(&unknown),
            Err(SimError::Configuration(ConfigurationError::UnknownKind { .. }))
        ));

        let duplicate = vec![
            SteadyStateRow::new("R", 1, "1", 1, 0),
            SteadyStateRow::new("R", 1, "2", 1, 0),
        ];
        assert!(matches!(
            solver.solve(&duplicate),
            Err(SimError::Configuration(ConfigurationError::DuplicateDesignator { .. }))
        ));

        let self_control = vec![
            SteadyStateRow::new("R", 1, "1", 1, 0),
            SteadyStateRow::new("VCCS", 1, "1*1", 1, 0),
        ];
        assert!(matches!(
            solver.solve(&self_control),
            Err(SimError::Configuration(ConfigurationError::MalformedCoupling { .. }))
        ));

        assert!(matches!(
            solver.solve(&[]),
            Err(SimError::Configuration(ConfigurationError::EmptyNetlist))
        ));
    }

    #[test]
    fn test_singular_table_reports_steady_state() {
        let table = vec![
            SteadyStateRow::new("Us", 1, "const,1", 1, 0),
            SteadyStateRow::new("Us", 2, "const,2", 1, 0),
        ];
        assert!(matches!(
            SteadyStateSolver::new().solve(&table),
            Err(SimError::SingularSystem { location: SolveLocation::SteadyState })
        ));
    }
}
