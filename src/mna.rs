use nalgebra::{DMatrix, DVector};

use crate::circuit::ControlledKind;
use crate::error::{ConfigurationError, Result, SimError};
use crate::solver::{LinearSolver, MnaScalar, SolverStats};

/// Characteristic equation of one branch: `F[k,k]*v_k + H[k,k]*i_k = u_s[k] + i_s[k]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BranchRelation<T> {
    /// i = y * v  (F = y, H = -1)
    Admittance(T),
    /// v = z * i  (F = -1, H = z)
    Impedance(T),
    /// v = u  (F = 1, H = 0, u_s = u)
    VoltageSource(T),
    /// i = j  (F = 0, H = 1, i_s = j)
    CurrentSource(T),
    /// Linear controlled source driven by the voltage of branch `control`:
    /// `F[k,control] = -gain`, with `F[k,k] = 1` (voltage output) or `H[k,k] = 1`
    /// (current output).
    Controlled {
        kind: ControlledKind,
        gain: T,
        control: usize,
    },
}

/// A two-terminal branch of the graph. Current flows node1 -> node2 through
/// the branch; the branch voltage is v(node1) - v(node2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Branch<T> {
    pub node1: usize,
    pub node2: usize,
    pub relation: BranchRelation<T>,
}

impl<T> Branch<T> {
    pub fn new(node1: usize, node2: usize, relation: BranchRelation<T>) -> Self {
        Branch { node1, node2, relation }
    }
}

/// Build the reduced incidence matrix A (nodes x branches). Ground (node 0)
/// has no row.
pub fn incidence_matrix<T: MnaScalar>(num_nodes: usize, branches: &[Branch<T>]) -> Result<DMatrix<T>> {
    let mut a = DMatrix::from_element(num_nodes, branches.len(), T::from_real(0.0));

    for (k, branch) in branches.iter().enumerate() {
        if branch.node1 == branch.node2 {
            return Err(ConfigurationError::DegenerateBranch {
                designator: format!("branch {}", k),
                node: branch.node1,
            }
            .into());
        }
        for node in [branch.node1, branch.node2] {
            if node > num_nodes {
                return Err(SimError::DimensionMismatch {
                    expected: num_nodes,
                    actual: node,
                });
            }
        }

        if branch.node1 > 0 {
            a[(branch.node1 - 1, k)] = T::from_real(1.0);
        }
        if branch.node2 > 0 {
            a[(branch.node2 - 1, k)] = T::from_real(-1.0);
        }
    }

    Ok(a)
}

/// Per-branch characteristic equations in matrix form
#[derive(Debug, Clone, PartialEq)]
pub struct BranchEquations<T: MnaScalar> {
    pub f: DMatrix<T>,
    pub h: DMatrix<T>,
    pub u_s: DVector<T>,
    pub i_s: DVector<T>,
}

/// Build F, H, u_s and i_s from the branch list
pub fn branch_relations<T: MnaScalar>(branches: &[Branch<T>]) -> Result<BranchEquations<T>> {
    let b = branches.len();
    let zero = T::from_real(0.0);
    let one = T::from_real(1.0);

    let mut f = DMatrix::from_element(b, b, zero);
    let mut h = DMatrix::from_element(b, b, zero);
    let mut u_s = DVector::from_element(b, zero);
    let mut i_s = DVector::from_element(b, zero);

    for (k, branch) in branches.iter().enumerate() {
        match branch.relation {
            BranchRelation::Admittance(y) => {
                f[(k, k)] = y;
                h[(k, k)] = -one;
            }
            BranchRelation::Impedance(z) => {
                f[(k, k)] = -one;
                h[(k, k)] = z;
            }
            BranchRelation::VoltageSource(u) => {
                f[(k, k)] = one;
                u_s[k] = u;
            }
            BranchRelation::CurrentSource(i) => {
                h[(k, k)] = one;
                i_s[k] = i;
            }
            BranchRelation::Controlled { kind, gain, control } => {
                if control >= b || control == k {
                    return Err(ConfigurationError::malformed_coupling(
                        format!("branch {}", k),
                        format!("controlling branch {} is out of range or self-referencing", control),
                    )
                    .into());
                }

                if kind.is_voltage_output() {
                    f[(k, k)] = one;
                } else {
                    h[(k, k)] = one;
                }
                f[(k, control)] = -gain;
            }
        }
    }

    Ok(BranchEquations { f, h, u_s, i_s })
}

/// Augmented MNA system:
///
/// ```text
/// [ 0    0   A ] [un]   [    0    ]
/// [-A^T  I   0 ] [u ] = [    0    ]
/// [ 0    F   H ] [i ]   [ u_s+i_s ]
/// ```
#[derive(Debug, Clone)]
pub struct MnaSystem<T: MnaScalar> {
    /// System matrix
    pub matrix: DMatrix<T>,
    /// Right-hand side vector
    pub rhs: DVector<T>,
    /// Number of nodes (excluding ground)
    pub num_nodes: usize,
    /// Number of branches
    pub num_branches: usize,
}

/// Solution of an [`MnaSystem`], sliced into its three segments.
#[derive(Debug, Clone, PartialEq)]
pub struct MnaSolution<T: MnaScalar> {
    pub node_voltages: DVector<T>,
    pub branch_voltages: DVector<T>,
    pub branch_currents: DVector<T>,
}

impl<T: MnaScalar> MnaSystem<T> {
    /// Assemble the system for the given branch list
    pub fn assemble(num_nodes: usize, branches: &[Branch<T>]) -> Result<Self> {
        let a = incidence_matrix(num_nodes, branches)?;
        let equations = branch_relations(branches)?;
        Ok(Self::from_parts(&a, &equations))
    }

    /// Combine A, F, H, u_s and i_s into the augmented system
    pub fn from_parts(a: &DMatrix<T>, equations: &BranchEquations<T>) -> Self {
        let n = a.nrows();
        let b = a.ncols();
        let size = n + 2 * b;

        let mut matrix = DMatrix::from_element(size, size, T::from_real(0.0));
        matrix.view_mut((0, n + b), (n, b)).copy_from(a);
        matrix.view_mut((n, 0), (b, n)).copy_from(&(-a.transpose()));
        matrix
            .view_mut((n, n), (b, b))
            .copy_from(&DMatrix::<T>::identity(b, b));
        matrix.view_mut((n + b, n), (b, b)).copy_from(&equations.f);
        matrix.view_mut((n + b, n + b), (b, b)).copy_from(&equations.h);

        let mut rhs = DVector::from_element(size, T::from_real(0.0));
        rhs.rows_mut(n + b, b).copy_from(&(&equations.u_s + &equations.i_s));

        MnaSystem {
            matrix,
            rhs,
            num_nodes: n,
            num_branches: b,
        }
    }

    /// Total system size
    pub fn size(&self) -> usize {
        self.num_nodes + 2 * self.num_branches
    }

    /// Solve and slice the result into node voltages, branch voltages and branch currents
    pub fn solve(&self, solver: &LinearSolver) -> Result<(MnaSolution<T>, SolverStats)> {
        let (x, stats) = solver.solve_dense(&self.matrix, &self.rhs)?;
        let n = self.num_nodes;
        let b = self.num_branches;

        let solution = MnaSolution {
            node_voltages: x.rows(0, n).into_owned(),
            branch_voltages: x.rows(n, b).into_owned(),
            branch_currents: x.rows(n + b, b).into_owned(),
        };
        Ok((solution, stats))
    }
}
