use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use elecsim::*;

fn rc_netlist() -> Netlist {
    Netlist::new(vec![
        Component::new_voltage_source(1, 1, 0, Waveform::Ac { amplitude: 10.0, frequency: 50.0, phase: 0.0 }),
        Component::new_resistor(1, 1, 2, 3185.0),
        Component::new_capacitor(1, 2, 0, 1e-6, 0.0),
    ])
    .unwrap()
}

/// R-C ladder with `sections` stages driven by a sine source
fn ladder_netlist(sections: usize) -> Netlist {
    let mut components = vec![Component::new_voltage_source(
        1,
        1,
        0,
        Waveform::Ac { amplitude: 1.0, frequency: 1e3, phase: 0.0 },
    )];
    for k in 1..=sections {
        let serial = k as u32;
        components.push(Component::new_resistor(serial, k, k + 1, 100.0));
        components.push(Component::new_capacitor(serial, k + 1, 0, 1e-7, 0.0));
    }
    Netlist::new(components).unwrap()
}

fn bench_transient_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("transient_analysis");

    let netlist = rc_netlist();
    group.bench_function("rc_reference", |b| {
        let simulator = Simulator::new();
        b.iter(|| simulator.run_transient(black_box(&netlist), 0.1, 0.01).unwrap());
    });

    for sections in [5, 20, 50].iter() {
        let netlist = ladder_netlist(*sections);
        group.bench_with_input(BenchmarkId::new("rc_ladder", sections), &netlist, |b, netlist| {
            let simulator = Simulator::new();
            b.iter(|| simulator.run_transient(netlist, 1e-3, 1e-5).unwrap());
        });
    }

    group.finish();
}

fn bench_steady_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("steady_state");

    let table = vec![
        SteadyStateRow::new("Us", 1, "sin,10,50,0", 1, 0),
        SteadyStateRow::new("R", 1, "3185", 1, 2),
        SteadyStateRow::new("C", 1, "1u", 2, 0),
        SteadyStateRow::new("L", 1, "10m", 2, 3),
        SteadyStateRow::new("R", 2, "50", 3, 0),
    ];
    let solver = SteadyStateSolver::new();
    group.bench_function("rlc_phasor", |b| {
        b.iter(|| solver.solve(black_box(&table)).unwrap());
    });

    group.finish();
}

fn bench_matrix_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix_solver");

    // Test different matrix sizes
    for size in [10, 50, 100, 200].iter() {
        group.bench_with_input(BenchmarkId::new("lu_solver", size), size, |b, &size| {
            use elecsim::solver::LinearSolver;
            use nalgebra::{DMatrix, DVector};

            let mut matrix = DMatrix::<f64>::identity(size, size);
            for i in 0..size {
                matrix[(i, i)] = 2.0;
                if i > 0 {
                    matrix[(i, i - 1)] = -1.0;
                    matrix[(i - 1, i)] = -1.0;
                }
            }

            let rhs = DVector::from_element(size, 1.0);
            let solver = LinearSolver::new();

            b.iter(|| solver.solve_dense(&matrix, &rhs).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_transient_analysis, bench_steady_state, bench_matrix_sizes);
criterion_main!(benches);
