use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result};
use crate::parser::parse_designator;

/// Ground / reference node id.
pub const GROUND: usize = 0;

/// Device kind, as written in the designator prefix (`R-1`, `Uac-2`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Resistor,
    Conductance,
    Capacitor,
    Inductor,
    Diode,
    VoltageAc,
    CurrentAc,
    VoltageDc,
    CurrentDc,
    Vcvs,
    Vccs,
    Ccvs,
    Cccs,
}

impl DeviceKind {
    /// Designator prefix for this kind
    pub fn prefix(&self) -> &'static str {
        match self {
            DeviceKind::Resistor => "R",
            DeviceKind::Conductance => "G",
            DeviceKind::Capacitor => "C",
            DeviceKind::Inductor => "L",
            DeviceKind::Diode => "D",
            DeviceKind::VoltageAc => "Uac",
            DeviceKind::CurrentAc => "Iac",
            DeviceKind::VoltageDc => "Udc",
            DeviceKind::CurrentDc => "Idc",
            DeviceKind::Vcvs => "VCVS",
            DeviceKind::Vccs => "VCCS",
            DeviceKind::Ccvs => "CCVS",
            DeviceKind::Cccs => "CCCS",
        }
    }

    /// Returns true for independent voltage/current sources
    pub fn is_independent_source(&self) -> bool {
        matches!(
            self,
            DeviceKind::VoltageAc | DeviceKind::CurrentAc | DeviceKind::VoltageDc | DeviceKind::CurrentDc
        )
    }

    /// Returns true for energy-storage elements
    pub fn is_reactive(&self) -> bool {
        matches!(self, DeviceKind::Capacitor | DeviceKind::Inductor)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for DeviceKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let kind = match s {
            "R" => DeviceKind::Resistor,
            "G" => DeviceKind::Conductance,
            "C" => DeviceKind::Capacitor,
            "L" => DeviceKind::Inductor,
            "D" => DeviceKind::Diode,
            "Uac" => DeviceKind::VoltageAc,
            "Iac" => DeviceKind::CurrentAc,
            "Udc" => DeviceKind::VoltageDc,
            "Idc" => DeviceKind::CurrentDc,
            "VCVS" => DeviceKind::Vcvs,
            "VCCS" => DeviceKind::Vccs,
            "CCVS" => DeviceKind::Ccvs,
            "CCCS" => DeviceKind::Cccs,
            _ => {
                return Err(ConfigurationError::UnknownKind {
                    kind: s.to_string(),
                })
            }
        };
        Ok(kind)
    }
}

/// The four linear controlled sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlledKind {
    Vcvs,
    Vccs,
    Ccvs,
    Cccs,
}

impl ControlledKind {
    /// True when the controlled branch behaves as a voltage source
    pub fn is_voltage_output(&self) -> bool {
        matches!(self, ControlledKind::Vcvs | ControlledKind::Ccvs)
    }

    pub fn device_kind(&self) -> DeviceKind {
        match self {
            ControlledKind::Vcvs => DeviceKind::Vcvs,
            ControlledKind::Vccs => DeviceKind::Vccs,
            ControlledKind::Ccvs => DeviceKind::Ccvs,
            ControlledKind::Cccs => DeviceKind::Cccs,
        }
    }
}

/// Coupling of a controlled source to the component whose voltage or current
/// controls it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupling {
    pub gain: f64,
    /// Designator of the controlling component, e.g. `R-2`.
    pub control: String,
}

/// Time dependence of an independent source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Waveform {
    Dc { amplitude: f64 },
    /// `amplitude * sin(2*pi*frequency*t + phase)`, phase in degrees.
    Ac { amplitude: f64, frequency: f64, phase: f64 },
}

impl Waveform {
    /// Sample the waveform at `t_index * dt`.
    pub fn sample(&self, t_index: usize, dt: f64) -> f64 {
        match *self {
            Waveform::Dc { amplitude } => amplitude,
            Waveform::Ac { amplitude, frequency, phase } => {
                amplitude * (2.0 * PI * frequency * t_index as f64 * dt + phase.to_radians()).sin()
            }
        }
    }

    fn is_finite(&self) -> bool {
        match *self {
            Waveform::Dc { amplitude } => amplitude.is_finite(),
            Waveform::Ac { amplitude, frequency, phase } => {
                amplitude.is_finite() && frequency.is_finite() && phase.is_finite()
            }
        }
    }
}

/// Types of circuit components, with their kind-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentType {
    Resistor { resistance: f64 },
    Conductance { conductance: f64 },
    Capacitor { capacitance: f64, #[serde(default)] initial_voltage: f64 },
    Inductor { inductance: f64, #[serde(default)] initial_current: f64 },
    /// Piecewise-linear diode: forward threshold and reverse leakage current.
    Diode { forward_voltage: f64, reverse_current: f64 },
    VoltageSource { waveform: Waveform },
    CurrentSource { waveform: Waveform },
    Controlled { kind: ControlledKind, coupling: Coupling },
}

impl ComponentType {
    pub fn device_kind(&self) -> DeviceKind {
        match self {
            ComponentType::Resistor { .. } => DeviceKind::Resistor,
            ComponentType::Conductance { .. } => DeviceKind::Conductance,
            ComponentType::Capacitor { .. } => DeviceKind::Capacitor,
            ComponentType::Inductor { .. } => DeviceKind::Inductor,
            ComponentType::Diode { .. } => DeviceKind::Diode,
            ComponentType::VoltageSource { waveform: Waveform::Ac { .. } } => DeviceKind::VoltageAc,
            ComponentType::VoltageSource { waveform: Waveform::Dc { .. } } => DeviceKind::VoltageDc,
            ComponentType::CurrentSource { waveform: Waveform::Ac { .. } } => DeviceKind::CurrentAc,
            ComponentType::CurrentSource { waveform: Waveform::Dc { .. } } => DeviceKind::CurrentDc,
            ComponentType::Controlled { kind, .. } => kind.device_kind(),
        }
    }
}

/// Circuit component/element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub serial: u32,
    pub node1: usize,
    pub node2: usize,
    #[serde(flatten)]
    pub component_type: ComponentType,
    /// Report the voltage in the node1 -> node2 reference direction.
    #[serde(default = "default_true")]
    pub vol_dir: bool,
    /// Report the current in the device's default reference direction.
    #[serde(default = "default_true")]
    pub cur_dir: bool,
}

fn default_true() -> bool {
    true
}

impl Component {
    pub fn new(serial: u32, node1: usize, node2: usize, component_type: ComponentType) -> Self {
        Component {
            serial,
            node1,
            node2,
            component_type,
            vol_dir: true,
            cur_dir: true,
        }
    }

    pub fn new_resistor(serial: u32, node1: usize, node2: usize, resistance: f64) -> Self {
        Self::new(serial, node1, node2, ComponentType::Resistor { resistance })
    }

    pub fn new_conductance(serial: u32, node1: usize, node2: usize, conductance: f64) -> Self {
        Self::new(serial, node1, node2, ComponentType::Conductance { conductance })
    }

    pub fn new_capacitor(serial: u32, node1: usize, node2: usize, capacitance: f64, initial_voltage: f64) -> Self {
        Self::new(serial, node1, node2, ComponentType::Capacitor { capacitance, initial_voltage })
    }

    pub fn new_inductor(serial: u32, node1: usize, node2: usize, inductance: f64, initial_current: f64) -> Self {
        Self::new(serial, node1, node2, ComponentType::Inductor { inductance, initial_current })
    }

    pub fn new_diode(serial: u32, node1: usize, node2: usize, forward_voltage: f64, reverse_current: f64) -> Self {
        Self::new(serial, node1, node2, ComponentType::Diode { forward_voltage, reverse_current })
    }

    pub fn new_voltage_source(serial: u32, node_pos: usize, node_neg: usize, waveform: Waveform) -> Self {
        Self::new(serial, node_pos, node_neg, ComponentType::VoltageSource { waveform })
    }

    pub fn new_current_source(serial: u32, node_pos: usize, node_neg: usize, waveform: Waveform) -> Self {
        Self::new(serial, node_pos, node_neg, ComponentType::CurrentSource { waveform })
    }

    pub fn new_controlled(
        serial: u32,
        node1: usize,
        node2: usize,
        kind: ControlledKind,
        gain: f64,
        control: impl Into<String>,
    ) -> Self {
        let coupling = Coupling { gain, control: control.into() };
        Self::new(serial, node1, node2, ComponentType::Controlled { kind, coupling })
    }

    /// Set the reporting directions
    pub fn with_directions(mut self, vol_dir: bool, cur_dir: bool) -> Self {
        self.vol_dir = vol_dir;
        self.cur_dir = cur_dir;
        self
    }

    pub fn kind(&self) -> DeviceKind {
        self.component_type.device_kind()
    }

    /// Designator such as `C-1`
    pub fn designator(&self) -> String {
        format!("{}-{}", self.kind(), self.serial)
    }

    /// Value to seed the voltage history with at t = 0
    pub fn initial_voltage(&self) -> f64 {
        match self.component_type {
            ComponentType::Capacitor { initial_voltage, .. } => initial_voltage,
            _ => 0.0,
        }
    }

    /// Value to seed the current history with at t = 0
    pub fn initial_current(&self) -> f64 {
        match self.component_type {
            ComponentType::Inductor { initial_current, .. } => initial_current,
            _ => 0.0,
        }
    }

    /// Validate parameter values and terminals
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        let designator = self.designator();

        if self.node1 == self.node2 {
            return Err(ConfigurationError::DegenerateBranch {
                designator,
                node: self.node1,
            });
        }

        let positive = |value: f64, what: &str| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ConfigurationError::invalid_value(
                    &designator,
                    format!("{} must be positive and finite, got {}", what, value),
                ))
            }
        };
        let non_negative = |value: f64, what: &str| {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigurationError::invalid_value(
                    &designator,
                    format!("{} must be non-negative and finite, got {}", what, value),
                ))
            }
        };
        let finite = |value: f64, what: &str| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(ConfigurationError::invalid_value(&designator, format!("{} must be finite", what)))
            }
        };

        match &self.component_type {
            ComponentType::Resistor { resistance } => positive(*resistance, "resistance"),
            ComponentType::Conductance { conductance } => finite(*conductance, "conductance"),
            ComponentType::Capacitor { capacitance, initial_voltage } => {
                positive(*capacitance, "capacitance")?;
                finite(*initial_voltage, "initial voltage")
            }
            ComponentType::Inductor { inductance, initial_current } => {
                positive(*inductance, "inductance")?;
                finite(*initial_current, "initial current")
            }
            ComponentType::Diode { forward_voltage, reverse_current } => {
                non_negative(*forward_voltage, "forward voltage")?;
                non_negative(*reverse_current, "reverse current")
            }
            ComponentType::VoltageSource { waveform } | ComponentType::CurrentSource { waveform } => {
                if waveform.is_finite() {
                    Ok(())
                } else {
                    Err(ConfigurationError::invalid_value(&designator, "waveform parameters must be finite"))
                }
            }
            ComponentType::Controlled { coupling, .. } => {
                if coupling.gain.is_finite() {
                    Ok(())
                } else {
                    Err(ConfigurationError::malformed_coupling(&designator, "gain must be finite"))
                }
            }
        }
    }
}

/// A controlled source's coupling resolved to an index into the netlist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedCoupling {
    pub kind: ControlledKind,
    pub gain: f64,
    pub control: usize,
}

/// Validated, immutable component arena. Built once before simulating.
#[derive(Debug, Clone)]
pub struct Netlist {
    components: Vec<Component>,
    couplings: Vec<Option<ResolvedCoupling>>,
    index: HashMap<String, usize>,
    num_nodes: usize,
}

impl Netlist {
    /// Validate the components and build the arena
    pub fn new(components: Vec<Component>) -> Result<Self> {
        if components.is_empty() {
            return Err(ConfigurationError::EmptyNetlist.into());
        }

        let mut index = HashMap::new();
        for (i, component) in components.iter().enumerate() {
            component.validate()?;
            let designator = component.designator();
            if index.insert(designator.clone(), i).is_some() {
                return Err(ConfigurationError::DuplicateDesignator { designator }.into());
            }
        }

        let num_nodes = components
            .iter()
            .map(|c| c.node1.max(c.node2))
            .max()
            .unwrap_or(GROUND);

        // Every node id in 1..=num_nodes must be used, otherwise its KCL row is empty.
        let mut used = vec![false; num_nodes + 1];
        for component in &components {
            used[component.node1] = true;
            used[component.node2] = true;
        }
        if let Some(missing) = (1..=num_nodes).find(|&n| !used[n]) {
            return Err(ConfigurationError::NonContiguousNodes { missing, max: num_nodes }.into());
        }

        let couplings = components
            .iter()
            .enumerate()
            .map(|(i, component)| resolve_coupling(i, component, &components, &index))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Netlist {
            components,
            couplings,
            index,
            num_nodes,
        })
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of non-ground nodes
    pub fn node_count(&self) -> usize {
        self.num_nodes
    }

    /// Resolved coupling of component `index`, if it is a controlled source
    pub fn coupling(&self, index: usize) -> Option<ResolvedCoupling> {
        self.couplings.get(index).copied().flatten()
    }

    /// Find a component by designator
    pub fn find(&self, designator: &str) -> Option<usize> {
        self.index.get(designator).copied()
    }

    /// Name used for node `n` in results
    pub fn node_name(n: usize) -> String {
        format!("node{}", n)
    }

    /// Returns true if any capacitor or inductor is present
    pub fn has_reactive(&self) -> bool {
        self.components.iter().any(|c| c.kind().is_reactive())
    }
}

fn resolve_coupling(
    own_index: usize,
    component: &Component,
    components: &[Component],
    index: &HashMap<String, usize>,
) -> std::result::Result<Option<ResolvedCoupling>, ConfigurationError> {
    let (kind, coupling) = match &component.component_type {
        ComponentType::Controlled { kind, coupling } => (*kind, coupling),
        _ => return Ok(None),
    };
    let designator = component.designator();

    // Validates the reference's syntax before looking it up.
    parse_designator(&coupling.control)
        .map_err(|e| ConfigurationError::malformed_coupling(&designator, e.to_string()))?;

    let control = *index.get(coupling.control.trim()).ok_or_else(|| {
        ConfigurationError::malformed_coupling(&designator, format!("no component named '{}'", coupling.control))
    })?;

    if control == own_index {
        return Err(ConfigurationError::malformed_coupling(&designator, "a source cannot control itself"));
    }

    let target = components[control].kind();
    if !controllable_by(target) {
        return Err(ConfigurationError::malformed_coupling(
            &designator,
            format!("the voltage of '{}' is not a single branch quantity", coupling.control),
        ));
    }

    Ok(Some(ResolvedCoupling {
        kind,
        gain: coupling.gain,
        control,
    }))
}

/// Whether the voltage of a component of kind `target` appears across its main
/// companion branch alone. Every controlled source reads that voltage.
fn controllable_by(target: DeviceKind) -> bool {
    // Series source terms split the capacitor (and conducting diode) voltage.
    !matches!(target, DeviceKind::Diode | DeviceKind::Capacitor)
}
