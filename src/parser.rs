use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{alpha0, alpha1, char, digit1, space0},
    combinator::{all_consuming, map, map_res, recognize},
    number::complete::double,
    sequence::{delimited, pair, preceded, separated_pair, tuple},
    IResult,
};
use regex::Regex;
use lazy_static::lazy_static;

use crate::circuit::DeviceKind;
use crate::error::ConfigurationError;

lazy_static! {
    static ref DESIGNATOR_PATTERN: Regex = Regex::new(r"^([A-Za-z]+)-([0-9]+)$").unwrap();
}

/// Source description used by the steady-state table (`sin,...` or `const,...`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceSpec {
    /// `sin,<amplitude>,<frequency>,<phase>`; phase in radians.
    Sinusoid { amplitude: f64, frequency: f64, phase: f64 },
    /// `const,<value>`
    Constant(f64),
}

/// What a controlled source in the steady-state table points at.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlTarget {
    /// Zero-based row of the table.
    Branch(usize),
    /// Designator such as `R-2`.
    Designator(String),
}

/// Split a designator like `C-12` into its kind and serial number.
pub fn parse_designator(designator: &str) -> Result<(DeviceKind, u32), ConfigurationError> {
    let captures = DESIGNATOR_PATTERN
        .captures(designator.trim())
        .ok_or_else(|| ConfigurationError::MalformedDesignator {
            designator: designator.to_string(),
        })?;

    let kind: DeviceKind = captures[1].parse()?;
    let serial = captures[2]
        .parse::<u32>()
        .map_err(|_| ConfigurationError::MalformedDesignator {
            designator: designator.to_string(),
        })?;

    Ok((kind, serial))
}

/// Parse value with unit suffix (e.g., 1k, 1meg, 1m, 1u, 1n, 1p, 2.2e-6)
pub fn parse_value_with_unit(value_str: &str) -> Option<f64> {
    all_consuming(delimited(space0, scaled_number, space0))(value_str)
        .ok()
        .map(|(_, value)| value)
}

/// Parse the numeric part of a passive element's table entry. Anything after
/// the first comma is ignored.
pub fn parse_passive_value(designator: &str, value_str: &str) -> Result<f64, ConfigurationError> {
    let head = value_str.split(',').next().unwrap_or_default();
    parse_value_with_unit(head).ok_or_else(|| {
        ConfigurationError::invalid_value(designator, format!("cannot parse '{}' as a number", value_str))
    })
}

/// Parse `sin,<amp>,<freq>,<phase>` or `const,<value>`.
pub fn parse_source_spec(designator: &str, value_str: &str) -> Result<SourceSpec, ConfigurationError> {
    all_consuming(delimited(space0, source_spec, space0))(value_str)
        .map(|(_, spec)| spec)
        .map_err(|_| {
            ConfigurationError::invalid_value(
                designator,
                format!("expected 'sin,<amp>,<freq>,<phase>' or 'const,<value>', got '{}'", value_str),
            )
        })
}

/// Parse `<gain>*<target>` where target is a row index or a designator.
pub fn parse_coupling(designator: &str, value_str: &str) -> Result<(f64, ControlTarget), ConfigurationError> {
    all_consuming(delimited(space0, coupling, space0))(value_str)
        .map(|(_, parsed)| parsed)
        .map_err(|_| {
            ConfigurationError::malformed_coupling(
                designator,
                format!("expected '<gain>*<branch>', got '{}'", value_str),
            )
        })
}

// Parser functions using nom
fn scaled_number(input: &str) -> IResult<&str, f64> {
    map_res(pair(double, alpha0), |(value, unit): (f64, &str)| {
        unit_multiplier(unit).map(|multiplier| value * multiplier).ok_or(())
    })(input)
}

fn unit_multiplier(unit: &str) -> Option<f64> {
    let multiplier = match unit.to_lowercase().as_str() {
        "f" => 1e-15,
        "p" => 1e-12,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "meg" => 1e6,
        "g" => 1e9,
        "t" => 1e12,
        "" => 1.0,
        _ => return None,
    };
    Some(multiplier)
}

fn field(input: &str) -> IResult<&str, f64> {
    preceded(tuple((space0, char(','), space0)), scaled_number)(input)
}

fn source_spec(input: &str) -> IResult<&str, SourceSpec> {
    alt((
        map(
            preceded(tag_no_case("sin"), tuple((field, field, field))),
            |(amplitude, frequency, phase)| SourceSpec::Sinusoid { amplitude, frequency, phase },
        ),
        map(preceded(tag_no_case("const"), field), SourceSpec::Constant),
    ))(input)
}

fn control_target(input: &str) -> IResult<&str, ControlTarget> {
    alt((
        map(
            recognize(tuple((alpha1, tag("-"), digit1))),
            |s: &str| ControlTarget::Designator(s.to_string()),
        ),
        map_res(digit1, |s: &str| s.parse::<usize>().map(ControlTarget::Branch)),
    ))(input)
}

fn coupling(input: &str) -> IResult<&str, (f64, ControlTarget)> {
    separated_pair(double, delimited(space0, char('*'), space0), control_target)(input)
}
