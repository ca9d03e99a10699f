//! Get/Set Sensor Reading dispatch.

use std::collections::HashMap;
use log::{error, warn};

use crate::{
	bus::{Bus, PropertyMap, PropertyValue, prop_get_mandatory},
	ipmi::CompletionCode,
	legacy,
	locator::{self, Locator},
	sensor::{Codec, Directory, Mutability, SensorInfo},
	types::*,
};

/// Bit in [`ReadingResponse::operation`] indicating sensor scanning is enabled.
pub const SCANNING_ENABLED: u8 = 1 << 6;

/// The response body of Get Sensor Reading.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ReadingResponse {
	/// Raw (linearized) reading.
	pub value: u8,
	pub operation: u8,
	/// Discrete state bits 0-7 and 8-14.
	pub indication: [u8; 2],
}

impl ReadingResponse {
	pub fn to_bytes(self) -> [u8; 4] {
		[self.value, self.operation, self.indication[0], self.indication[1]]
	}

	fn set_offset(&mut self, offset: u8) {
		let bits = u16::from_le_bytes(self.indication) | (1 << offset);
		self.indication = bits.to_le_bytes();
	}
}

/// The request body of Set Sensor Reading and Event Status.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct SetReadingRequest {
	pub number: u8,
	pub operation: u8,
	/// Raw reading to set.
	pub reading: u8,
	/// Offsets to assert, as a bitmask.
	pub assert: u16,
	/// Offsets to deassert, as a bitmask.
	pub deassert: u16,
	pub event_data: [u8; 3],
}

impl SetReadingRequest {
	/// Parse a request.  Everything after the operation byte is optional and
	/// treated as zero when absent.
	pub fn from_bytes(data: &[u8]) -> Option<Self> {
		if data.len() < 2 {
			return None;
		}
		let mut buf = [0u8; 10];
		let n = data.len().min(buf.len());
		buf[..n].copy_from_slice(&data[..n]);
		Some(Self {
			number: buf[0],
			operation: buf[1],
			reading: buf[2],
			assert: u16::from_le_bytes([buf[3], buf[4]]),
			deassert: u16::from_le_bytes([buf[5], buf[6]]),
			event_data: [buf[7], buf[8], buf[9]],
		})
	}
}

impl Codec {
	/// Fill in `resp` with the sensor's current state.
	///
	/// On error `resp` may have been partially filled in.
	pub fn encode(&self, sensor: &SensorInfo, loc: &Locator, bus: &dyn Bus,
	              resp: &mut ReadingResponse) -> ErrResult<()> {
		match self {
			Codec::Value { interface, property } => {
				let v = bus.get(&loc.service, &loc.path, interface, property)?;
				let Some(v) = v.as_f64() else {
					return Err(err_invalid_data(format!("{}: non-numeric {} {}",
					                                    loc.path, property, v)));
				};
				resp.value = sensor.linear.to_raw(v);
			},
			Codec::Assertion(entries) => {
				let mut intfs: HashMap<&str, PropertyMap> = HashMap::new();
				for entry in entries {
					let intf = entry.interface.as_str();
					if !intfs.contains_key(intf) {
						intfs.insert(intf, bus.get_all(&loc.service, &loc.path, intf)?);
					}
					if prop_get_mandatory(&intfs[intf], &entry.property)?.matches(&entry.assert) {
						resp.set_offset(entry.offset);
					}
				}
			},
		}
		Ok(())
	}

	/// Apply a Set Sensor Reading request to the sensor's backing properties.
	pub fn apply(&self, sensor: &SensorInfo, loc: &Locator, bus: &dyn Bus,
	             req: &SetReadingRequest) -> ErrResult<()> {
		match self {
			Codec::Value { interface, property } => {
				let value = sensor.linear.to_physical(req.reading);
				bus.set(&loc.service, &loc.path, interface, property,
				        &PropertyValue::Double(value))
			},
			Codec::Assertion(entries) => {
				for entry in entries {
					let bit = 1u16 << entry.offset;
					let value = if req.assert & bit != 0 {
						&entry.assert
					} else if req.deassert & bit != 0 {
						match &entry.deassert {
							Some(d) => d,
							None => continue,
						}
					} else {
						continue;
					};
					bus.set(&loc.service, &loc.path, &entry.interface, &entry.property, value)?;
				}
				Ok(())
			},
		}
	}
}

/// Handle Get Sensor Reading for `number`.
///
/// A failure while reading a known sensor is not reported to the caller: it gets
/// whatever part of the reading was assembled before the failure, with a
/// successful completion code.
pub fn get_reading(dir: &Directory, bus: &dyn Bus, number: u8) -> Result<ReadingResponse, CompletionCode> {
	let Some(sensor) = dir.sensor(number) else {
		return legacy::get_reading(dir, bus, number);
	};

	if !sensor.mutability().contains(Mutability::READ) {
		error!("Sensor get operation is not allowed for sensor 0x{:02x}", number);
		return Err(CompletionCode::IllegalCommand);
	}

	let loc = match locator::locate(sensor, bus) {
		Ok(l) => l,
		Err(e) => {
			error!("Failed to find sensor 0x{:02x}: {}", number, e);
			return Err(CompletionCode::SensorInvalid);
		},
	};

	let mut resp = ReadingResponse::default();
	match sensor.hooks.codec().encode(sensor, &loc, bus, &mut resp) {
		Ok(()) => resp.operation = SCANNING_ENABLED,
		Err(e) => warn!("{}: reading sensor 0x{:02x} failed: {}", loc.path, number, e),
	}
	Ok(resp)
}

/// Set a sensor's reading using the sensor table's hooks only.
fn set_reading_typed(dir: &Directory, bus: &dyn Bus, req: &SetReadingRequest) -> Result<(), CompletionCode> {
	let Some(sensor) = dir.sensor(req.number) else {
		return Err(CompletionCode::SensorInvalid);
	};

	if !sensor.mutability().contains(Mutability::WRITE) {
		error!("Sensor set operation is not allowed for sensor 0x{:02x}", req.number);
		return Err(CompletionCode::IllegalCommand);
	}

	let loc = locator::locate(sensor, bus).map_err(|e| {
		error!("Failed to find sensor 0x{:02x}: {}", req.number, e);
		CompletionCode::SensorInvalid
	})?;

	sensor.hooks.codec().apply(sensor, &loc, bus, req).map_err(|e| {
		error!("Set sensor 0x{:02x} failed: {}", req.number, e);
		CompletionCode::UnspecifiedError
	})
}

/// Handle Set Sensor Reading and Event Status.
///
/// Sensors the sensor table can't handle get a second chance through the legacy
/// record-update path (presence and functional state of older sensor classes).
pub fn set_reading(dir: &Directory, bus: &dyn Bus, req: &SetReadingRequest) -> Result<(), CompletionCode> {
	match set_reading_typed(dir, bus, req) {
		Err(CompletionCode::SensorInvalid) => legacy::update_record(bus, req),
		res => res,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		bus::mock::MockBus,
		config::fixtures::{self, *},
		sensor::VALUE_INTERFACE,
	};

	fn set_req(number: u8, reading: u8, assert: u16, deassert: u16) -> SetReadingRequest {
		SetReadingRequest {
			number,
			operation: 0x01,
			reading,
			assert,
			deassert,
			event_data: [0; 3],
		}
	}

	#[test]
	fn parse_set_request() {
		let req = SetReadingRequest::from_bytes(&[0x0c, 0x20, 0x00, 0x40, 0x00, 0x10]).unwrap();
		assert_eq!(req.number, 0x0c);
		assert_eq!(req.assert, 0x0040);
		assert_eq!(req.deassert, 0x0010);
		assert_eq!(req.event_data, [0; 3]);
		assert!(SetReadingRequest::from_bytes(&[0x0c]).is_none());
	}

	#[test]
	fn analog_reading() {
		let dir = fixtures::directory();
		let bus = fixtures::bus();
		// 41.5 degrees (in millidegrees, scale -3) truncates to 41
		let resp = get_reading(&dir, &bus, 0x01).unwrap();
		assert_eq!(resp.to_bytes(), [41, SCANNING_ENABLED, 0, 0]);

		// 12.09 V with M = 6, Rexp = -2 => 201
		let resp = get_reading(&dir, &bus, 0x30).unwrap();
		assert_eq!(resp.value, 201);
	}

	#[test]
	fn assertion_reading() {
		let dir = fixtures::directory();
		let bus = fixtures::bus();
		// present (offset 6) and functional (offset 4 asserts on false)
		let resp = get_reading(&dir, &bus, 0x0c).unwrap();
		assert_eq!(resp.to_bytes(), [0, SCANNING_ENABLED, 0x40, 0]);

		let bus = bus.with_props(DIMM_PATH, OPSTATUS_INTF,
		                         &[("Functional", PropertyValue::Bool(false))]);
		let resp = get_reading(&dir, &bus, 0x0c).unwrap();
		assert_eq!(resp.indication, [0x50, 0]);
	}

	#[test]
	fn failed_reading_returns_partial_payload() {
		let dir = fixtures::directory();
		// DIMM present, but the operational status interface is missing
		let bus = MockBus::new()
			.with_service(DIMM_PATH, MAPPED_SERVICE)
			.with_props(DIMM_PATH, ITEM_INTF, &[("Present", PropertyValue::Bool(true))]);
		let resp = get_reading(&dir, &bus, 0x0c).unwrap();
		// offset 4 is checked first and fails, so nothing was filled in
		assert_eq!(resp.to_bytes(), [0, 0, 0, 0]);

		let bus = MockBus::new();
		let resp = get_reading(&dir, &bus, 0x01).unwrap();
		assert_eq!(resp.operation & SCANNING_ENABLED, 0);
	}

	#[test]
	fn write_only_sensor_cannot_be_read() {
		let dir = fixtures::directory();
		assert_eq!(get_reading(&dir, &fixtures::bus(), 0x1f),
		           Err(CompletionCode::IllegalCommand));
	}

	#[test]
	fn read_only_sensors_are_never_written() {
		let dir = fixtures::directory();
		for sensor in dir.sensors().filter(|s| !s.mutability().contains(Mutability::WRITE)) {
			let bus = fixtures::bus();
			let res = set_reading(&dir, &bus, &set_req(sensor.number, 0x7f, 0xffff, 0));
			assert_eq!(res, Err(CompletionCode::IllegalCommand));
			assert_eq!(bus.writes.get(), 0);
			assert_eq!(bus.failed_writes.get(), 0);
			assert!(bus.calls.borrow().is_empty());
		}
	}

	#[test]
	fn analog_write() {
		let dir = fixtures::directory();
		let bus = fixtures::bus();
		// M = 100 RPM per count
		set_reading(&dir, &bus, &set_req(0x05, 42, 0, 0)).unwrap();
		assert_eq!(bus.prop(FAN_PATH, VALUE_INTERFACE, "Value"),
		           Some(PropertyValue::Double(4200.0)));
		assert_eq!(bus.writes.get(), 1);
	}

	#[test]
	fn assertion_write() {
		let dir = fixtures::directory();
		let bus = fixtures::bus();
		// deassert presence, assert the "non-functional" offset
		set_reading(&dir, &bus, &set_req(0x0c, 0, 1 << 4, 1 << 6)).unwrap();
		assert_eq!(bus.prop(DIMM_PATH, ITEM_INTF, "Present"), Some(PropertyValue::Bool(false)));
		assert_eq!(bus.prop(DIMM_PATH, OPSTATUS_INTF, "Functional"),
		           Some(PropertyValue::Bool(false)));

		// OS status has no deassert value; deasserting is a no-op
		set_reading(&dir, &bus, &set_req(0x1f, 0, 0, 1 << 1)).unwrap();
		assert_eq!(bus.prop(OS_PATH, OS_INTF, "OperatingSystemState"), None);
		set_reading(&dir, &bus, &set_req(0x1f, 0, 1 << 1, 0)).unwrap();
		assert!(bus.prop(OS_PATH, OS_INTF, "OperatingSystemState").is_some());
	}

	#[test]
	fn backend_write_failure() {
		let dir = fixtures::directory();
		let bus = fixtures::bus().with_broken(FAN_PATH);
		assert_eq!(set_reading(&dir, &bus, &set_req(0x05, 1, 0, 0)),
		           Err(CompletionCode::UnspecifiedError));
		assert_eq!(bus.failed_writes.get(), 1);
	}
}
