//! Backend-independent sensor and FRU metadata.

use std::{
	collections::BTreeMap,
	ops::Bound,
};

use crate::{
	bus::PropertyValue,
	types::*,
};

/// The dbus interface carrying an analog sensor's reading.
pub const VALUE_INTERFACE: &str = "xyz.openbmc_project.Sensor.Value";

/// Interfaces whose presence (as a sensor's primary interface) marks it as analog.
const ANALOG_INTERFACES: [&str; 2] = [
	VALUE_INTERFACE,
	"xyz.openbmc_project.Control.FanPwm",
];

/// Which operations the IPMI side may perform on a sensor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Mutability(u8);

impl Mutability {
	pub const READ: Self = Self(1 << 0);
	pub const WRITE: Self = Self(1 << 1);

	/// True if every flag set in `other` is also set in `self`.
	pub fn contains(self, other: Self) -> bool {
		self.0 & other.0 == other.0
	}
}

impl std::ops::BitOr for Mutability {
	type Output = Self;
	fn bitor(self, rhs: Self) -> Self {
		Self(self.0 | rhs.0)
	}
}

/// Parameters of the IPMI linear sensor formula.
///
/// The physical value `y` of a raw reading `x` is
/// `y = (M * x + B * 10^Bexp) * 10^(Rexp - scale)`, where `scale` is the power of ten
/// applied by the dbus sensor to its own value.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Linear {
	pub m: i16,
	pub b: i16,
	pub b_exp: i8,
	pub r_exp: i8,
	pub scale: i8,
}

impl Default for Linear {
	fn default() -> Self {
		Self {
			m: 1,
			b: 0,
			b_exp: 0,
			r_exp: 0,
			scale: 0,
		}
	}
}

impl Linear {
	/// `B * 10^Bexp`.
	pub fn scaled_offset(&self) -> f64 {
		f64::from(self.b) * 10f64.powi(self.b_exp.into())
	}

	fn rescale(&self) -> f64 {
		10f64.powi(i32::from(self.scale) - i32::from(self.r_exp))
	}

	/// Convert a physical value to the raw byte IPMI transmits.
	///
	/// Out-of-range results saturate at 0 or 255.
	pub fn to_raw(&self, value: f64) -> u8 {
		let v = value * self.rescale();
		((v - self.scaled_offset()) / f64::from(self.m)) as u8
	}

	/// Convert a raw byte back to a physical value.
	pub fn to_physical(&self, raw: u8) -> f64 {
		(f64::from(self.m) * f64::from(raw) + self.scaled_offset()) / self.rescale()
	}
}

/// Where a sensor's SDR ID string comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSource {
	/// The last component of the sensor's object path.
	Leaf,
	/// The second-to-last component of the object path (for sensors whose objects
	/// are named after what they measure, e.g. `.../cpu0/temperature`).
	ParentLeaf,
	/// A name given in the sensor's configuration.
	Fixed(String),
}

/// One offset of a discrete (assertion-style) sensor and the property backing it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionEntry {
	/// Bit offset in the 15-bit assertion state field.
	pub offset: u8,
	pub interface: String,
	pub property: String,
	/// Property value meaning "asserted".
	pub assert: PropertyValue,
	/// Property value to write on deassertion; if absent deassertion is ignored.
	pub deassert: Option<PropertyValue>,
}

/// How a sensor's reading is encoded to and decoded from IPMI.
#[derive(Debug, Clone, PartialEq)]
pub enum Codec {
	/// A numeric property, translated with the sensor's [`Linear`] parameters.
	Value {
		interface: String,
		property: String,
	},
	/// A set of boolean-ish properties, each mapped to one assertion offset.
	Assertion(Vec<AssertionEntry>),
}

/// A sensor's get/update behavior, tagged with which of the two it supports.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorHooks {
	ReadOnly(Codec),
	WriteOnly(Codec),
	ReadWrite(Codec),
}

impl SensorHooks {
	pub fn mutability(&self) -> Mutability {
		match self {
			Self::ReadOnly(_) => Mutability::READ,
			Self::WriteOnly(_) => Mutability::WRITE,
			Self::ReadWrite(_) => Mutability::READ | Mutability::WRITE,
		}
	}

	pub fn codec(&self) -> &Codec {
		match self {
			Self::ReadOnly(c) | Self::WriteOnly(c) | Self::ReadWrite(c) => c,
		}
	}
}

/// Static metadata for one IPMI sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorInfo {
	/// IPMI sensor number.
	pub number: u8,
	/// IPMI entity ID.
	pub entity_type: u8,
	pub instance: u8,
	pub sensor_type: u8,
	/// IPMI event/reading type code.
	pub reading_type: u8,
	/// Object path of the backing dbus object.
	pub path: String,
	/// Bus name of the owning service, if known in advance; otherwise it's looked
	/// up through the object mapper on use.
	pub service: Option<String>,
	/// The dbus interfaces the sensor's properties live on; the first is the
	/// sensor's primary interface.  Never empty.
	pub interfaces: Vec<String>,
	pub unit: String,
	pub linear: Linear,
	pub name: NameSource,
	pub hooks: SensorHooks,
}

impl SensorInfo {
	/// The sensor's primary interface.
	pub fn interface(&self) -> &str {
		&self.interfaces[0]
	}

	pub fn mutability(&self) -> Mutability {
		self.hooks.mutability()
	}

	/// True for sensors whose SDR carries units and conversion coefficients.
	pub fn is_analog(&self) -> bool {
		ANALOG_INTERFACES.contains(&self.interface())
	}

	/// True if the sensor implements the analog value interface (and can hence have
	/// thresholds).
	pub fn has_value_interface(&self) -> bool {
		self.interfaces.iter().any(|i| i == VALUE_INTERFACE)
	}

	/// The (untruncated) SDR ID string for the sensor.
	pub fn id_string(&self) -> String {
		match &self.name {
			NameSource::Leaf => path_leaf(&self.path).to_string(),
			NameSource::ParentLeaf => path_parent_leaf(&self.path)
				.unwrap_or_else(|| path_leaf(&self.path))
				.to_string(),
			NameSource::Fixed(s) => s.clone(),
		}
	}
}

/// Static metadata for one FRU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FruInfo {
	pub fru_id: u8,
	pub entity_id: u8,
	pub entity_instance: u8,
	/// Inventory object path.
	pub path: String,
}

impl FruInfo {
	/// The FRU's device ID string (the last component of its inventory path).
	pub fn device_id(&self) -> &str {
		path_leaf(&self.path)
	}
}

/// The immutable sensor and FRU tables the command handler serves from.
#[derive(Debug, Default)]
pub struct Directory {
	sensors: BTreeMap<u8, SensorInfo>,
	frus: BTreeMap<u8, FruInfo>,
}

impl Directory {
	/// Build a directory, rejecting duplicate sensor numbers and FRU IDs and
	/// sensors with no interfaces.
	pub fn new(sensors: Vec<SensorInfo>, frus: Vec<FruInfo>) -> ErrResult<Self> {
		let mut dir = Self::default();
		for s in sensors {
			let num = s.number;
			if s.interfaces.is_empty() {
				return Err(err_invalid_data(format!("sensor 0x{:02x} has no interfaces", num)));
			}
			if dir.sensors.insert(num, s).is_some() {
				return Err(err_invalid_data(format!("duplicate sensor number 0x{:02x}", num)));
			}
		}
		for f in frus {
			let id = f.fru_id;
			if dir.frus.insert(id, f).is_some() {
				return Err(err_invalid_data(format!("duplicate FRU ID {}", id)));
			}
		}
		Ok(dir)
	}

	pub fn sensor(&self, number: u8) -> Option<&SensorInfo> {
		self.sensors.get(&number)
	}

	pub fn fru(&self, fru_id: u8) -> Option<&FruInfo> {
		self.frus.get(&fru_id)
	}

	pub fn sensor_count(&self) -> usize {
		self.sensors.len()
	}

	pub fn fru_count(&self) -> usize {
		self.frus.len()
	}

	pub fn first_sensor(&self) -> Option<&SensorInfo> {
		self.sensors.values().next()
	}

	pub fn first_fru(&self) -> Option<&FruInfo> {
		self.frus.values().next()
	}

	/// The sensor following `number` in table order.
	pub fn sensor_after(&self, number: u8) -> Option<&SensorInfo> {
		self.sensors.range((Bound::Excluded(number), Bound::Unbounded))
			.next()
			.map(|(_, s)| s)
	}

	/// The FRU following `fru_id` in table order.
	pub fn fru_after(&self, fru_id: u8) -> Option<&FruInfo> {
		self.frus.range((Bound::Excluded(fru_id), Bound::Unbounded))
			.next()
			.map(|(_, f)| f)
	}

	pub fn sensors(&self) -> impl Iterator<Item = &SensorInfo> {
		self.sensors.values()
	}
}
