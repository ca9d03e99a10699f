//! Loading of the sensor and FRU metadata tables.
//!
//! Both tables are YAML lists.  A sensor entry looks like:
//!
//! ```yaml
//! - number: 0x01
//!   entityType: 0x03
//!   instance: 1
//!   sensorType: 0x01
//!   readingType: 0x01
//!   path: /xyz/openbmc_project/sensors/temperature/cpu0
//!   interfaces: [xyz.openbmc_project.Sensor.Value]
//!   unit: xyz.openbmc_project.Sensor.Value.Unit.DegreesC
//!   scale: -3
//!   mutability: [Read]
//!   codec:
//!     kind: value
//! ```
//!
//! and a FRU entry like:
//!
//! ```yaml
//! - fruId: 0
//!   entityId: 0x03
//!   entityInstance: 1
//!   path: /xyz/openbmc_project/inventory/system/chassis/motherboard/cpu0
//! ```

use std::path::Path;
use serde::Deserialize;

use crate::{
	bus::PropertyValue,
	sensor::{
		AssertionEntry,
		Codec,
		Directory,
		FruInfo,
		Linear,
		NameSource,
		SensorHooks,
		SensorInfo,
		VALUE_INTERFACE,
	},
	types::*,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
enum MutabilityFlag {
	Read,
	Write,
}

#[derive(Debug, Copy, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
enum NameFrom {
	Leaf,
	ParentLeaf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct OffsetConfig {
	offset: u8,
	interface: String,
	property: String,
	assert: PropertyValue,
	#[serde(default)]
	deassert: Option<PropertyValue>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum CodecConfig {
	Value {
		#[serde(default)]
		interface: Option<String>,
		#[serde(default)]
		property: Option<String>,
	},
	Assertion {
		offsets: Vec<OffsetConfig>,
	},
}

fn one() -> i16 {
	1
}

/// Raw sensor config data as it appears in the YAML file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SensorConfig {
	number: u8,
	#[serde(alias = "entityID")]
	entity_type: u8,
	#[serde(alias = "entityInstance")]
	instance: u8,
	sensor_type: u8,
	#[serde(alias = "sensorReadingType")]
	reading_type: u8,
	path: String,
	#[serde(default)]
	service: Option<String>,
	interfaces: Vec<String>,
	#[serde(default)]
	unit: String,
	#[serde(default = "one")]
	m: i16,
	#[serde(default)]
	b: i16,
	#[serde(default)]
	b_exp: i8,
	#[serde(default)]
	r_exp: i8,
	#[serde(default)]
	scale: i8,
	#[serde(default)]
	name: Option<String>,
	#[serde(default)]
	name_from: Option<NameFrom>,
	mutability: Vec<MutabilityFlag>,
	codec: CodecConfig,
}

/// The widest offset an IPMI discrete sensor can report (15 state bits).
const MAX_OFFSET: u8 = 14;

impl TryFrom<SensorConfig> for SensorInfo {
	type Error = Box<dyn std::error::Error>;

	fn try_from(cfg: SensorConfig) -> ErrResult<Self> {
		let num = cfg.number;
		let bad = |msg: &str| err_invalid_data(format!("sensor 0x{:02x}: {}", num, msg));

		if cfg.interfaces.is_empty() {
			return Err(bad("no interfaces given"));
		}

		let codec = match cfg.codec {
			CodecConfig::Value { interface, property } => {
				if cfg.m == 0 {
					return Err(bad("M coefficient must be non-zero"));
				}
				Codec::Value {
					interface: interface.unwrap_or_else(|| VALUE_INTERFACE.into()),
					property: property.unwrap_or_else(|| "Value".into()),
				}
			},
			CodecConfig::Assertion { offsets } => {
				let mut entries = Vec::with_capacity(offsets.len());
				for o in offsets {
					if o.offset > MAX_OFFSET {
						return Err(bad(&format!("assertion offset {} out of range", o.offset)));
					}
					entries.push(AssertionEntry {
						offset: o.offset,
						interface: o.interface,
						property: o.property,
						assert: o.assert,
						deassert: o.deassert,
					});
				}
				Codec::Assertion(entries)
			},
		};

		let read = cfg.mutability.contains(&MutabilityFlag::Read);
		let write = cfg.mutability.contains(&MutabilityFlag::Write);
		let hooks = match (read, write) {
			(true, true) => SensorHooks::ReadWrite(codec),
			(true, false) => SensorHooks::ReadOnly(codec),
			(false, true) => SensorHooks::WriteOnly(codec),
			(false, false) => return Err(bad("mutability must include Read and/or Write")),
		};

		let name = match (cfg.name, cfg.name_from) {
			(Some(n), _) => NameSource::Fixed(n),
			(None, Some(NameFrom::ParentLeaf)) => NameSource::ParentLeaf,
			(None, _) => NameSource::Leaf,
		};

		Ok(Self {
			number: num,
			entity_type: cfg.entity_type,
			instance: cfg.instance,
			sensor_type: cfg.sensor_type,
			reading_type: cfg.reading_type,
			path: cfg.path,
			service: cfg.service,
			interfaces: cfg.interfaces,
			unit: cfg.unit,
			linear: Linear {
				m: cfg.m,
				b: cfg.b,
				b_exp: cfg.b_exp,
				r_exp: cfg.r_exp,
				scale: cfg.scale,
			},
			name,
			hooks,
		})
	}
}

/// Raw FRU config data as it appears in the YAML file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct FruConfig {
	#[serde(alias = "fruID")]
	fru_id: u8,
	#[serde(alias = "entityID")]
	entity_id: u8,
	entity_instance: u8,
	path: String,
}

impl From<FruConfig> for FruInfo {
	fn from(cfg: FruConfig) -> Self {
		Self {
			fru_id: cfg.fru_id,
			entity_id: cfg.entity_id,
			entity_instance: cfg.entity_instance,
			path: cfg.path,
		}
	}
}

/// Parse a YAML sensor table.
pub fn parse_sensors(yaml: &str) -> ErrResult<Vec<SensorInfo>> {
	let raw: Vec<SensorConfig> = serde_yaml::from_str(yaml)?;
	raw.into_iter().map(SensorInfo::try_from).collect()
}

/// Parse a YAML FRU table.
pub fn parse_frus(yaml: &str) -> ErrResult<Vec<FruInfo>> {
	let raw: Vec<FruConfig> = serde_yaml::from_str(yaml)?;
	Ok(raw.into_iter().map(FruInfo::from).collect())
}

fn read_file(path: &Path) -> ErrResult<String> {
	std::fs::read_to_string(path)
		.map_err(|e| err_not_found(format!("{}: {}", path.display(), e)))
}

/// Load the sensor table at `sensors` and (optionally) the FRU table at `frus`.
pub fn load_directory(sensors: &Path, frus: Option<&Path>) -> ErrResult<Directory> {
	let sensors = parse_sensors(&read_file(sensors)?)
		.map_err(|e| err_invalid_data(format!("{}: {}", sensors.display(), e)))?;
	let frus = match frus {
		Some(p) => parse_frus(&read_file(p)?)
			.map_err(|e| err_invalid_data(format!("{}: {}", p.display(), e)))?,
		None => vec![],
	};
	Directory::new(sensors, frus)
}


#[cfg(test)]
mod tests {
	use std::io::Write;

	use super::*;

	#[test]
	fn fixture_parses() {
		let dir = fixtures::directory();
		assert_eq!(dir.sensor_count(), 5);
		assert_eq!(dir.fru_count(), 3);

		let temp = dir.sensor(0x01).unwrap();
		assert_eq!(temp.service.as_deref(), Some("xyz.openbmc_project.HwmonTempSensor"));
		assert_eq!(temp.linear, Linear { m: 1, b: 0, b_exp: 0, r_exp: 0, scale: -3 });
		assert!(temp.is_analog());
		assert_eq!(temp.id_string(), "cpu0_temp");

		let dimm = dir.sensor(0x0c).unwrap();
		assert_eq!(dimm.entity_type, 0x20);
		assert_eq!(dimm.reading_type, 0x6f);
		assert!(!dimm.is_analog());
		let Codec::Assertion(entries) = dimm.hooks.codec() else {
			panic!("wrong codec");
		};
		assert_eq!(entries.len(), 2);
		assert_eq!(entries[0].deassert, Some(PropertyValue::Bool(true)));

		assert_eq!(dir.sensor(0x1f).unwrap().id_string(), "host0");
		assert_eq!(dir.fru(3).unwrap().entity_id, 0x0a);
	}

	#[test]
	fn rejects_bad_entries() {
		let no_access = r#"
- number: 2
  entityType: 1
  instance: 0
  sensorType: 1
  readingType: 1
  path: /a/b
  interfaces: [xyz.openbmc_project.Sensor.Value]
  mutability: []
  codec: { kind: value }
"#;
		assert!(parse_sensors(no_access).is_err());

		let zero_m = no_access.replace("mutability: []", "mutability: [Read]\n  m: 0");
		assert!(parse_sensors(&zero_m).is_err());

		let no_intfs = no_access
			.replace("mutability: []", "mutability: [Read]")
			.replace("[xyz.openbmc_project.Sensor.Value]", "[]");
		assert!(parse_sensors(&no_intfs).is_err());

		let ok = no_access.replace("mutability: []", "mutability: [Read]");
		assert_eq!(parse_sensors(&ok).unwrap().len(), 1);

		let dup = format!("{}{}", ok, ok.trim_start_matches('\n'));
		let sensors = parse_sensors(&dup).unwrap();
		assert!(Directory::new(sensors, vec![]).is_err());
	}

	#[test]
	fn directory_rejects_interfaceless_sensors() {
		let mut sensors = parse_sensors(fixtures::SENSORS).unwrap();
		sensors[0].interfaces.clear();
		assert!(Directory::new(sensors, vec![]).is_err());
	}

	#[test]
	fn loads_from_files() {
		let mut sensors = tempfile::NamedTempFile::new().unwrap();
		sensors.write_all(fixtures::SENSORS.as_bytes()).unwrap();
		let mut frus = tempfile::NamedTempFile::new().unwrap();
		frus.write_all(fixtures::FRUS.as_bytes()).unwrap();

		let dir = load_directory(sensors.path(), Some(frus.path())).unwrap();
		assert_eq!(dir.sensor_count(), 5);
		assert_eq!(dir.fru_count(), 3);

		let dir = load_directory(sensors.path(), None).unwrap();
		assert_eq!(dir.fru_count(), 0);

		assert!(load_directory(std::path::Path::new("/nonexistent/sensors.yaml"), None).is_err());
	}
}
