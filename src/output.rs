use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use csv::Writer;
use log::info;
use num_complex::Complex;
use serde::Serialize;

use crate::cli::OutputFormat;
use crate::simulator::TransientResult;
use crate::steady_state::SteadyStateSolution;

/// Export transient results to `filename`
pub fn export_transient(result: &TransientResult, filename: &Path, format: OutputFormat) -> Result<()> {
    let file = File::create(filename)?;
    match format {
        OutputFormat::Csv => write_transient_csv(result, file)?,
        OutputFormat::Json => write_json(result, file)?,
    }
    info!("Results exported to {:?}: {}", format, filename.display());
    Ok(())
}

/// Export steady-state results to `filename`
pub fn export_steady_state(solution: &SteadyStateSolution, filename: &Path, format: OutputFormat) -> Result<()> {
    let file = File::create(filename)?;
    match format {
        OutputFormat::Csv => write_steady_state_csv(solution, file)?,
        OutputFormat::Json => write_json(solution, file)?,
    }
    info!("Results exported to {:?}: {}", format, filename.display());
    Ok(())
}

/// One row per time point: `time, V(node..), V(desig..), I(desig..)`
pub fn write_transient_csv<W: Write>(result: &TransientResult, writer: W) -> Result<()> {
    let mut writer = Writer::from_writer(writer);

    let mut header = vec!["time".to_string()];
    header.extend(result.voltage_node.keys().map(|name| format!("V({})", name)));
    header.extend(result.voltage_component.keys().map(|name| format!("V({})", name)));
    header.extend(result.current_component.keys().map(|name| format!("I({})", name)));
    writer.write_record(&header)?;

    let columns: Vec<&Vec<f64>> = result
        .voltage_node
        .values()
        .chain(result.voltage_component.values())
        .chain(result.current_component.values())
        .collect();

    for (i, time) in result.time.iter().enumerate() {
        let mut record = Vec::with_capacity(columns.len() + 1);
        record.push(time.to_string());
        record.extend(columns.iter().map(|series| series.get(i).copied().unwrap_or(0.0).to_string()));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// One row per phasor: `quantity, name, re, im, magnitude, phase_deg`
pub fn write_steady_state_csv<W: Write>(solution: &SteadyStateSolution, writer: W) -> Result<()> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(["quantity", "name", "re", "im", "magnitude", "phase_deg"])?;

    let groups = [
        ("V", &solution.node_voltages),
        ("V", &solution.branch_voltages),
        ("I", &solution.branch_currents),
    ];
    for (quantity, values) in groups {
        for (name, value) in values {
            let (magnitude, phase) = value.to_polar();
            writer.write_record(&[
                quantity.to_string(),
                name.clone(),
                value.re.to_string(),
                value.im.to_string(),
                magnitude.to_string(),
                phase.to_degrees().to_string(),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

pub fn write_json<W: Write, T: Serialize>(value: &T, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

/// Print transient summary
pub fn print_transient_summary(result: &TransientResult) {
    println!("\n=== Transient Summary ===");
    println!("Total simulation time: {:.3}ms", result.total_time * 1000.0);
    println!("Success: {}", result.success);
    println!("Number of time points: {}", result.time.len());

    if !result.voltage_node.is_empty() {
        println!("\nNode voltages (final values):");
        for (name, series) in &result.voltage_node {
            if let Some(v) = series.last() {
                println!("  V({}): {:.6}V", name, v);
            }
        }
    }

    if !result.voltage_component.is_empty() {
        println!("\nComponent voltages / currents (final values):");
        for (name, series) in &result.voltage_component {
            let v = series.last().copied().unwrap_or_default();
            let i = result
                .current_component
                .get(name)
                .and_then(|s| s.last().copied())
                .unwrap_or_default();
            println!("  {}: {:.6}V, {:.6}A", name, v, i);
        }
    }

    if !result.convergence_info.is_empty() {
        let steps = result.convergence_info.len();
        let avg_residual =
            result.convergence_info.iter().map(|info| info.residual_norm).sum::<f64>() / steps as f64;
        println!("\nConvergence info:");
        println!("  Steps solved: {}", steps);
        println!("  Average residual norm: {:.2e}", avg_residual);
    }
}

/// Print steady-state phasors in polar form
pub fn print_steady_state_summary(solution: &SteadyStateSolution) {
    println!("\n=== Steady-State Summary ===");
    match solution.frequency {
        Some(f) => println!("Frequency: {} Hz", f),
        None => println!("Frequency: DC"),
    }

    println!("\nNode voltages:");
    for (name, v) in &solution.node_voltages {
        println!("  V({}): {}", name, polar(v));
    }
    println!("\nBranch voltages / currents:");
    for (name, v) in &solution.branch_voltages {
        let i = solution.branch_currents.get(name).copied().unwrap_or_default();
        println!("  {}: {}, {}", name, polar(v), polar(&i));
    }
}

fn polar(value: &Complex<f64>) -> String {
    let (magnitude, phase) = value.to_polar();
    format!("{:.6} ∠ {:.3}°", magnitude, phase.to_degrees())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_result() -> TransientResult {
        let mut voltage_node = BTreeMap::new();
        voltage_node.insert("node1".to_string(), vec![0.0, 5.0]);
        let mut voltage_component = BTreeMap::new();
        voltage_component.insert("R-1".to_string(), vec![0.0, 5.0]);
        let mut current_component = BTreeMap::new();
        current_component.insert("R-1".to_string(), vec![0.0, 0.005]);

        TransientResult {
            time: vec![0.0, 0.1],
            voltage_node,
            voltage_component,
            current_component,
            convergence_info: Vec::new(),
            total_time: 0.0,
            success: true,
        }
    }

    #[test]
    fn test_transient_csv_layout() {
        let mut buffer = Vec::new();
        write_transient_csv(&sample_result(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "time,V(node1),V(R-1),I(R-1)");
        assert_eq!(lines[2], "0.1,5,5,0.005");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_steady_state_csv_layout() {
        let mut node_voltages = BTreeMap::new();
        node_voltages.insert("node1".to_string(), Complex::new(2.0, 0.0));
        let solution = SteadyStateSolution {
            frequency: Some(50.0),
            node_voltages,
            branch_voltages: BTreeMap::new(),
            branch_currents: BTreeMap::new(),
        };

        let mut buffer = Vec::new();
        write_steady_state_csv(&solution, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert!(text.starts_with("quantity,name,re,im,magnitude,phase_deg\n"));
        assert!(text.contains("V,node1,2,0,2,0\n"));
    }

    #[test]
    fn test_json_output_parses_back() {
        let mut buffer = Vec::new();
        write_json(&sample_result(), &mut buffer).unwrap();
        let parsed: TransientResult = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed, sample_result());
    }
}
