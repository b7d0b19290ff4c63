//! Time histories of a transient run.
//!
//! One append-only series per physical node (voltage) and per component
//! (voltage and current). All series always have the same length: a step is
//! committed to every series at once or not at all.

use crate::circuit::Netlist;
use crate::error::{Result, SimError};

/// Values produced by one solved step, ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub node_voltages: Vec<f64>,
    pub component_voltages: Vec<f64>,
    pub component_currents: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct History {
    node_voltages: Vec<Vec<f64>>,
    component_voltages: Vec<Vec<f64>>,
    component_currents: Vec<Vec<f64>>,
    len: usize,
}

impl History {
    /// Seed every series with its t = 0 value
    pub fn new(netlist: &Netlist) -> Self {
        let node_voltages = vec![vec![0.0]; netlist.node_count()];
        let component_voltages = netlist
            .components()
            .iter()
            .map(|c| vec![c.initial_voltage()])
            .collect();
        let component_currents = netlist
            .components()
            .iter()
            .map(|c| vec![c.initial_current()])
            .collect();

        History {
            node_voltages,
            component_voltages,
            component_currents,
            len: 1,
        }
    }

    /// Number of recorded samples in every series
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Most recent voltage across component `index`
    pub fn last_voltage(&self, index: usize) -> f64 {
        self.component_voltages[index].last().copied().unwrap_or_default()
    }

    /// Most recent current through component `index`
    pub fn last_current(&self, index: usize) -> f64 {
        self.component_currents[index].last().copied().unwrap_or_default()
    }

    /// Number of samples recorded for component `index`
    pub fn samples_for(&self, index: usize) -> usize {
        self.component_voltages[index].len()
    }

    pub fn node_voltages(&self) -> &[Vec<f64>] {
        &self.node_voltages
    }

    /// Append one step to every series. Rejects records of the wrong shape
    /// without touching any series.
    pub fn commit(&mut self, record: StepRecord) -> Result<()> {
        check_len(self.node_voltages.len(), record.node_voltages.len())?;
        check_len(self.component_voltages.len(), record.component_voltages.len())?;
        check_len(self.component_currents.len(), record.component_currents.len())?;

        for (series, value) in self.node_voltages.iter_mut().zip(record.node_voltages) {
            series.push(value);
        }
        for (series, value) in self.component_voltages.iter_mut().zip(record.component_voltages) {
            series.push(value);
        }
        for (series, value) in self.component_currents.iter_mut().zip(record.component_currents) {
            series.push(value);
        }
        self.len += 1;
        Ok(())
    }

    /// Consume the history, returning (node voltages, component voltages, component currents)
    pub fn into_series(self) -> (Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<Vec<f64>>) {
        (self.node_voltages, self.component_voltages, self.component_currents)
    }
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SimError::DimensionMismatch { expected, actual })
    }
}
