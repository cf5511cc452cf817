//! Unit validation and conversion.
//!
//! [`UnitRegistry`] is an explicitly constructed service: callers build one (usually via
//! [`UnitRegistry::default`]), optionally add their own definitions, and hand it to the
//! engine behind an `Arc`. There is no process-wide registry.
//!
//! # Unit expressions
//!
//! A unit expression is a product of factors, optionally divided by further factors:
//!
//! ```text
//! kWh        W/m^2        m3/h        kg*m2/s2        degC        %
//! ```
//!
//! - factors are separated by `*`, `·` or whitespace; every `/` starts a denominator
//! - exponents are written `^n`, `**n` or as trailing digits (`m2`, `m^-1`)
//! - SI prefixes (`n µ u m c d k M G T`) apply to the metric base symbols
//!
//! Every unit resolves to a scale and offset relative to a coherent base unit, plus a
//! dimension vector. Two units convert into each other only when their dimensions match.
//! Offsets (°C, °F) are only honoured for a bare temperature unit; inside a compound
//! expression (`degC/h`) the unit is treated as a temperature difference.

use crate::error::{Result, TimeseriesError};
use crate::frame::{ColumnKind, TimeFrame};
use std::collections::HashMap;
use std::fmt;

/// Synthetic unit of `count` aggregates.
pub const COUNT_UNIT: &str = "count";

const BASE_NAMES: [&str; DIMENSIONS] = ["time", "length", "mass", "current", "temperature"];
const DIMENSIONS: usize = 5;

const PREFIXES: &[(&str, f64)] = &[
    ("n", 1e-9),
    ("µ", 1e-6),
    ("u", 1e-6),
    ("m", 1e-3),
    ("c", 1e-2),
    ("d", 1e-1),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
];

/// Exponents of the base dimensions (time, length, mass, current, temperature).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Dimension([i8; DIMENSIONS]);

impl Dimension {
    pub const NONE: Dimension = Dimension([0; DIMENSIONS]);
    pub const TIME: Dimension = Dimension([1, 0, 0, 0, 0]);
    pub const LENGTH: Dimension = Dimension([0, 1, 0, 0, 0]);
    pub const MASS: Dimension = Dimension([0, 0, 1, 0, 0]);
    pub const CURRENT: Dimension = Dimension([0, 0, 0, 1, 0]);
    pub const TEMPERATURE: Dimension = Dimension([0, 0, 0, 0, 1]);

    pub fn is_dimensionless(&self) -> bool {
        *self == Self::NONE
    }

    fn combine(self, other: Dimension, factor: i8) -> Dimension {
        let mut out = self.0;
        for (slot, exp) in out.iter_mut().zip(other.0) {
            *slot += exp * factor;
        }
        Dimension(out)
    }

    fn powi(self, exponent: i8) -> Dimension {
        Dimension::NONE.combine(self, exponent)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return f.write_str("dimensionless");
        }
        let parts: Vec<String> = BASE_NAMES
            .iter()
            .zip(self.0)
            .filter(|(_, exp)| *exp != 0)
            .map(|(name, exp)| {
                if exp == 1 {
                    format!("[{name}]")
                } else {
                    format!("[{name}]^{exp}")
                }
            })
            .collect();
        f.write_str(&parts.join("*"))
    }
}

/// A validated unit: `base = value * scale + offset`.
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub symbol: String,
    pub scale: f64,
    pub offset: f64,
    pub dimension: Dimension,
}

impl Unit {
    fn dimensionless(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            scale: 1.0,
            offset: 0.0,
            dimension: Dimension::NONE,
        }
    }
}

/// A prepared conversion between two commensurable units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Converter {
    from_scale: f64,
    from_offset: f64,
    to_scale: f64,
    to_offset: f64,
}

impl Converter {
    pub const IDENTITY: Converter = Converter {
        from_scale: 1.0,
        from_offset: 0.0,
        to_scale: 1.0,
        to_offset: 0.0,
    };

    pub fn apply(&self, value: f64) -> f64 {
        let base = value * self.from_scale + self.from_offset;
        (base - self.to_offset) / self.to_scale
    }

    pub fn is_identity(&self) -> bool {
        self.from_scale == self.to_scale && self.from_offset == self.to_offset
    }

    /// Converts every present value in place; nulls stay null.
    pub fn apply_slice(&self, values: &mut [Option<f64>]) {
        for value in values.iter_mut().flatten() {
            *value = self.apply(*value);
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Definition {
    scale: f64,
    offset: f64,
    dimension: Dimension,
    prefixable: bool,
}

/// Registry of known units.
#[derive(Clone, Debug)]
pub struct UnitRegistry {
    definitions: HashMap<String, Definition>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.load_builtin();
        registry
    }
}

impl UnitRegistry {
    /// A registry with no units at all.
    pub fn empty() -> Self {
        Self {
            definitions: HashMap::new(),
        }
    }

    fn load_builtin(&mut self) {
        let energy = Dimension::MASS.combine(Dimension::LENGTH, 2).combine(Dimension::TIME, -2);
        let power = energy.combine(Dimension::TIME, -1);
        let pressure = Dimension::MASS
            .combine(Dimension::LENGTH, -1)
            .combine(Dimension::TIME, -2);
        let voltage = power.combine(Dimension::CURRENT, -1);
        let resistance = voltage.combine(Dimension::CURRENT, -1);
        let volume = Dimension::LENGTH.powi(3);
        let illuminance = Dimension::LENGTH.powi(-2);

        // time
        self.insert("s", 1.0, 0.0, Dimension::TIME, true);
        self.insert("min", 60.0, 0.0, Dimension::TIME, false);
        self.insert("h", 3_600.0, 0.0, Dimension::TIME, false);
        self.insert("d", 86_400.0, 0.0, Dimension::TIME, false);
        // length, volume, mass
        self.insert("m", 1.0, 0.0, Dimension::LENGTH, true);
        self.insert("L", 1e-3, 0.0, volume, true);
        self.insert("l", 1e-3, 0.0, volume, true);
        self.insert("g", 1e-3, 0.0, Dimension::MASS, true);
        self.insert("t", 1e3, 0.0, Dimension::MASS, false);
        // energy and power
        self.insert("J", 1.0, 0.0, energy, true);
        self.insert("Wh", 3_600.0, 0.0, energy, true);
        self.insert("cal", 4.184, 0.0, energy, true);
        self.insert("W", 1.0, 0.0, power, true);
        self.insert("VA", 1.0, 0.0, power, true);
        self.insert("var", 1.0, 0.0, power, true);
        // electrical
        self.insert("A", 1.0, 0.0, Dimension::CURRENT, true);
        self.insert("V", 1.0, 0.0, voltage, true);
        self.insert("Ohm", 1.0, 0.0, resistance, true);
        self.insert("Ω", 1.0, 0.0, resistance, true);
        // pressure
        self.insert("Pa", 1.0, 0.0, pressure, true);
        self.insert("bar", 1e5, 0.0, pressure, true);
        // temperature
        self.insert("K", 1.0, 0.0, Dimension::TEMPERATURE, false);
        for alias in ["degC", "°C", "celsius"] {
            self.insert(alias, 1.0, 273.15, Dimension::TEMPERATURE, false);
        }
        for alias in ["degF", "°F", "fahrenheit"] {
            self.insert(alias, 5.0 / 9.0, 273.15 - 32.0 * 5.0 / 9.0, Dimension::TEMPERATURE, false);
        }
        // light
        self.insert("lx", 1.0, 0.0, illuminance, true);
        // dimensionless
        for alias in ["1", "dimensionless", COUNT_UNIT] {
            self.insert(alias, 1.0, 0.0, Dimension::NONE, false);
        }
        for alias in ["%", "percent"] {
            self.insert(alias, 1e-2, 0.0, Dimension::NONE, false);
        }
        self.insert("ppm", 1e-6, 0.0, Dimension::NONE, false);
    }

    fn insert(&mut self, symbol: &str, scale: f64, offset: f64, dimension: Dimension, prefixable: bool) {
        self.definitions.insert(
            symbol.to_string(),
            Definition {
                scale,
                offset,
                dimension,
                prefixable,
            },
        );
    }

    /// Adds (or replaces) a unit defined as `scale × base`, where `base` is any
    /// expression the registry already understands.
    pub fn define(&mut self, symbol: &str, scale: f64, base: &str) -> Result<()> {
        let unit = self.validate_unit(base)?;
        self.insert(symbol, scale * unit.scale, 0.0, unit.dimension, false);
        Ok(())
    }

    /// Parses a unit expression.
    ///
    /// The empty string is accepted as dimensionless.
    ///
    /// # Errors
    ///
    /// Returns [`TimeseriesError::UndefinedUnit`] if any factor is not known.
    pub fn validate_unit(&self, text: &str) -> Result<Unit> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Unit::dimensionless(""));
        }
        let undefined = || TimeseriesError::UndefinedUnit {
            unit: text.to_string(),
        };

        // a bare symbol keeps its offset
        if let Some(def) = self.definitions.get(trimmed) {
            return Ok(Unit {
                symbol: trimmed.to_string(),
                scale: def.scale,
                offset: def.offset,
                dimension: def.dimension,
            });
        }

        let mut scale = 1.0;
        let mut dimension = Dimension::NONE;
        for (position, part) in trimmed.split('/').enumerate() {
            let sign: i8 = if position == 0 { 1 } else { -1 };
            let factors: Vec<&str> = part
                .split(|c: char| c == '*' || c == '·' || c.is_whitespace())
                .filter(|f| !f.is_empty())
                .collect();
            if factors.is_empty() && position > 0 {
                return Err(undefined());
            }
            for factor in factors {
                let (symbol, exponent) = split_exponent(factor).ok_or_else(undefined)?;
                let (factor_scale, factor_dim) = self.lookup(symbol).ok_or_else(undefined)?;
                let exponent = exponent * sign;
                scale *= factor_scale.powi(i32::from(exponent));
                dimension = dimension.combine(factor_dim, exponent);
            }
        }

        Ok(Unit {
            symbol: trimmed.to_string(),
            scale,
            offset: 0.0,
            dimension,
        })
    }

    fn lookup(&self, symbol: &str) -> Option<(f64, Dimension)> {
        if let Some(def) = self.definitions.get(symbol) {
            return Some((def.scale, def.dimension));
        }
        PREFIXES.iter().find_map(|(prefix, factor)| {
            let rest = symbol.strip_prefix(prefix)?;
            let def = self.definitions.get(rest)?;
            def.prefixable.then(|| (factor * def.scale, def.dimension))
        })
    }

    /// Prepares a conversion from `from` to `to`.
    ///
    /// # Errors
    ///
    /// [`TimeseriesError::UndefinedUnit`] for unknown units, and
    /// [`TimeseriesError::Dimensionality`] when the units are not commensurable.
    pub fn converter(&self, from: &str, to: &str) -> Result<Converter> {
        let source = self.validate_unit(from)?;
        let target = self.validate_unit(to)?;
        if source.dimension != target.dimension {
            return Err(TimeseriesError::Dimensionality {
                from: from.to_string(),
                to: to.to_string(),
                from_dimension: source.dimension.to_string(),
                to_dimension: target.dimension.to_string(),
            });
        }
        Ok(Converter {
            from_scale: source.scale,
            from_offset: source.offset,
            to_scale: target.scale,
            to_offset: target.offset,
        })
    }

    /// Converts a single value.
    pub fn convert(&self, value: f64, from: &str, to: &str) -> Result<f64> {
        Ok(self.converter(from, to)?.apply(value))
    }

    /// Converts a slice of nullable values in place.
    pub fn convert_slice(&self, values: &mut [Option<f64>], from: &str, to: &str) -> Result<()> {
        self.converter(from, to)?.apply_slice(values);
        Ok(())
    }

    /// Converts the columns of `frame` named in `to_units`.
    ///
    /// Columns absent from `to_units` are left untouched. A column whose source unit is
    /// missing from `from_units` is treated as dimensionless. All conversions are
    /// validated before any column is modified.
    pub fn convert_frame(
        &self,
        frame: &mut TimeFrame,
        from_units: &HashMap<String, String>,
        to_units: &HashMap<String, String>,
    ) -> Result<()> {
        let mut plan = Vec::new();
        for (label, to) in to_units {
            if frame.column(label).is_none() {
                continue;
            }
            let from = from_units.get(label).map(String::as_str).unwrap_or("");
            plan.push((label.as_str(), self.converter(from, to)?));
        }
        for (label, converter) in plan {
            if let Some(column) = frame.column_mut(label) {
                convert_column_values(&converter, &mut column.values, &mut column.kind);
            }
        }
        Ok(())
    }
}

/// Applies `converter` to a column, demoting count columns to floats when values change.
pub(crate) fn convert_column_values(
    converter: &Converter,
    values: &mut [Option<f64>],
    kind: &mut ColumnKind,
) {
    if converter.is_identity() {
        return;
    }
    converter.apply_slice(values);
    *kind = ColumnKind::Float;
}

fn split_exponent(factor: &str) -> Option<(&str, i8)> {
    if let Some((symbol, exp)) = factor.split_once("**").or_else(|| factor.split_once('^')) {
        return Some((symbol, exp.parse().ok()?));
    }
    let digits = factor
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '-')
        .last()
        .map(|(i, _)| i);
    match digits {
        // "1" on its own is the dimensionless unit, not an exponent
        Some(0) | None => Some((factor, 1)),
        Some(i) => Some((&factor[..i], factor[i..].parse().ok()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn test_energy_conversions() {
        let units = UnitRegistry::default();
        assert!(close(units.convert(1.0, "kWh", "Wh").unwrap(), 1_000.0));
        assert!(close(units.convert(1.0, "kWh", "MJ").unwrap(), 3.6));
        assert!(close(units.convert(2.5, "MWh", "kWh").unwrap(), 2_500.0));
        assert!(close(units.convert(1.0, "kW*h", "kWh").unwrap(), 1.0));
    }

    #[test]
    fn test_compound_units() {
        let units = UnitRegistry::default();
        assert!(close(units.convert(3.6, "m3/h", "L/s").unwrap(), 1.0));
        assert!(close(units.convert(1.0, "W/m^2", "kW/m2").unwrap(), 1e-3));
        assert!(close(units.convert(1.0, "bar", "kPa").unwrap(), 100.0));
    }

    #[test]
    fn test_temperature_offsets() {
        let units = UnitRegistry::default();
        assert!(close(units.convert(20.0, "degC", "K").unwrap(), 293.15));
        assert!(close(units.convert(212.0, "degF", "°C").unwrap(), 100.0));
        // inside a compound, degC is a difference
        assert!(close(units.convert(1.0, "degC/h", "K/min").unwrap(), 1.0 / 60.0));
    }

    #[test]
    fn test_dimensionless_units() {
        let units = UnitRegistry::default();
        assert!(close(units.convert(3.0, COUNT_UNIT, "%").unwrap(), 300.0));
        assert!(close(units.convert(0.5, "", "percent").unwrap(), 50.0));
        assert!(units.validate_unit("1").unwrap().dimension.is_dimensionless());
    }

    #[test]
    fn test_undefined_unit() {
        let units = UnitRegistry::default();
        let err = units.validate_unit("furlong").unwrap_err();
        assert!(matches!(err, TimeseriesError::UndefinedUnit { ref unit } if unit == "furlong"));
        assert!(units.validate_unit("kW/").is_err());
        // offsets are not prefixable
        assert!(units.validate_unit("kdegC").is_err());
    }

    #[test]
    fn test_dimensionality_error() {
        let units = UnitRegistry::default();
        let err = units.convert(1.0, "m", "s").unwrap_err();
        match err {
            TimeseriesError::Dimensionality {
                from_dimension,
                to_dimension,
                ..
            } => {
                assert_eq!(from_dimension, "[length]");
                assert_eq!(to_dimension, "[time]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_custom_definition() {
        let mut units = UnitRegistry::default();
        units.define("toe", 11.63, "MWh").unwrap();
        assert!(close(units.convert(1.0, "toe", "kWh").unwrap(), 11_630.0));
    }

    #[test]
    fn test_convert_slice_keeps_nulls() {
        let units = UnitRegistry::default();
        let mut values = vec![Some(1.0), None, Some(2.0)];
        units.convert_slice(&mut values, "kW", "W").unwrap();
        assert_eq!(values, vec![Some(1_000.0), None, Some(2_000.0)]);
    }
}
