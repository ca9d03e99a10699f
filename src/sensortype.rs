//! Translation tables between dbus naming and IPMI type and unit codes.

use log::warn;
use phf::phf_ordered_map;

/// The IPMI classification of a legacy (system-manager) sensor, keyed by the leaf
/// name of its dbus object.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LegacyType {
	/// IPMI sensor type.
	pub sensor_type: u8,
	/// The type code reported by Get Sensor Type.
	pub type_code: u8,
}

const fn lt(sensor_type: u8, type_code: u8) -> LegacyType {
	LegacyType { sensor_type, type_code }
}

/// Legacy sensor names and their types.
///
/// `OccStatus` uses an internal sensor type of 0xE9 to stand in for type 0x09.
static LEGACY_TYPES: phf::OrderedMap<&'static str, LegacyType> = phf_ordered_map! {
	"Temp" => lt(0x01, 0x6F),
	"DIMM" => lt(0x0C, 0x6F),
	"MEMORY_BUFFER" => lt(0x0C, 0x6F),
	"PROC" => lt(0x07, 0x6F),
	"CORE" => lt(0x07, 0x6F),
	"CPU" => lt(0x07, 0x6F),
	"BootProgress" => lt(0x0F, 0x6F),
	"OccStatus" => lt(0xE9, 0x09),
	"BootCount" => lt(0xC3, 0x6F),
	"OperatingSystemStatus" => lt(0x1F, 0x6F),
	"SYSTEM_EVENT" => lt(0x12, 0x6F),
	"SYSTEM" => lt(0xC7, 0x03),
	"MAIN_PLANAR" => lt(0xC7, 0x03),
	"PowerCap" => lt(0xC2, 0xC2),
	"PowerSupplyRedundancy" => lt(0x0B, 0xCA),
	"TurboAllowed" => lt(0xDA, 0x03),
	"PowerSupplyDerating" => lt(0xD8, 0xC8),
};

/// Look up the full legacy classification for a sensor name.
pub fn legacy_type(name: &str) -> Option<LegacyType> {
	LEGACY_TYPES.get(name).copied()
}

/// Map a legacy sensor name to its type code.
///
/// Returns 0 (meaning "not an IPMI-visible sensor") if the name isn't known.
pub fn type_from_legacy_name(name: &str) -> u8 {
	match legacy_type(name) {
		Some(t) => t.type_code,
		None => {
			warn!("Failed to find sensor type for '{}'", name);
			0
		},
	}
}

/// Measurement units with an IPMI equivalent.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Unit {
	DegreesC,
	RPMS,
	Volts,
	Meters,
	Amperes,
	Joules,
	Watts,
}

const UNIT_PREFIX: &str = "xyz.openbmc_project.Sensor.Value.Unit.";

impl Unit {
	/// Parse a dbus unit string, in either its fully-qualified
	/// (`xyz.openbmc_project.Sensor.Value.Unit.Volts`) or short (`Volts`) form.
	pub fn from_dbus_str(s: &str) -> Option<Self> {
		match s.strip_prefix(UNIT_PREFIX).unwrap_or(s) {
			"DegreesC" => Some(Self::DegreesC),
			"RPMS" => Some(Self::RPMS),
			"Volts" => Some(Self::Volts),
			"Meters" => Some(Self::Meters),
			"Amperes" => Some(Self::Amperes),
			"Joules" => Some(Self::Joules),
			"Watts" => Some(Self::Watts),
			_ => None,
		}
	}

	/// The IPMI base unit code.
	fn base_code(self) -> u8 {
		match self {
			Self::DegreesC => 1,
			Self::Volts => 4,
			Self::Amperes => 5,
			Self::Watts => 6,
			Self::Joules => 7,
			Self::Meters => 34,
			Self::RPMS => 41, // revolutions
		}
	}

	/// The IPMI rate unit (3 bits).
	fn rate_code(self) -> u8 {
		match self {
			Self::RPMS => 0b100, // per minute
			_ => 0,
		}
	}
}

/// The three IPMI unit fields of a full sensor record.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct UnitFields {
	pub base: u8,
	pub rate: u8,
	pub modifier: u8,
}

/// Translate a dbus unit string into IPMI unit fields.
///
/// Unknown units are not an error; they're logged and reported as "unspecified".
pub fn unit_fields(unit: &str) -> UnitFields {
	match Unit::from_dbus_str(unit) {
		Some(u) => UnitFields {
			base: u.base_code(),
			rate: u.rate_code(),
			modifier: 0,
		},
		None => {
			warn!("no IPMI unit for sensor unit '{}'", unit);
			UnitFields::default()
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn legacy_names() {
		assert_eq!(type_from_legacy_name("DIMM"), 0x6F);
		assert_eq!(type_from_legacy_name("OccStatus"), 0x09);
		assert_eq!(type_from_legacy_name("PowerSupplyDerating"), 0xC8);
		assert_eq!(type_from_legacy_name("dimm"), 0);
		assert_eq!(type_from_legacy_name(""), 0);
		assert_eq!(legacy_type("CORE").map(|t| t.sensor_type), Some(0x07));
	}

	#[test]
	fn units() {
		assert_eq!(unit_fields("xyz.openbmc_project.Sensor.Value.Unit.DegreesC").base, 1);
		assert_eq!(unit_fields("Volts"), UnitFields { base: 4, rate: 0, modifier: 0 });
		assert_eq!(unit_fields("RPMS"), UnitFields { base: 41, rate: 0b100, modifier: 0 });
		assert_eq!(unit_fields("Meters").base, 34);
		assert_eq!(unit_fields("Percent"), UnitFields::default());
	}
}
