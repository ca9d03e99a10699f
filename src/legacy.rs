//! Support for sensors known only to the legacy system manager.
//!
//! These have no entry in the sensor table, so both directions go through small
//! static tables keyed by the sensor's type instead of per-sensor hooks.

use log::{debug, error};

use crate::{
	bus::{Bus, PropertyValue},
	ipmi::CompletionCode,
	locator,
	reading::{ReadingResponse, SetReadingRequest},
	sensor::Directory,
	sensortype,
	types::*,
};

/// How to turn a legacy sensor's `value` property into a reading.
struct LegacyReading {
	/// The type code (as returned by Get Sensor Type) this encoding applies to.
	type_code: u8,
	/// Fill in the response from the property; `None` if the property has the wrong
	/// type.
	encode: fn(v: &PropertyValue, resp: &mut ReadingResponse) -> Option<()>,
}

const LEGACY_READINGS: &[LegacyReading] = &[
	// power cap
	LegacyReading {
		type_code: 0xC2,
		encode: |v, resp| { resp.value = v.as_i64()? as u8; Some(()) },
	},
	// power supply derating
	LegacyReading {
		type_code: 0xC8,
		encode: |v, resp| { resp.indication[0] = v.as_i64()? as u8; Some(()) },
	},
	// power supply redundancy
	LegacyReading {
		type_code: 0xCA,
		encode: |v, resp| {
			resp.indication[0] = if v.as_str()? == "Enabled" { 0x02 } else { 0x01 };
			Some(())
		},
	},
];

/// The property all legacy sensor objects carry their state in.
const LEGACY_VALUE_PROPERTY: &str = "value";

/// Handle Get Sensor Reading for a sensor not in the sensor table.
pub fn get_reading(dir: &Directory, bus: &dyn Bus, number: u8) -> Result<ReadingResponse, CompletionCode> {
	let res = locator::resolve(dir, bus, number).map_err(|_| CompletionCode::SensorInvalid)?;
	let code = res.type_code();
	let Some(enc) = LEGACY_READINGS.iter().find(|r| r.type_code == code) else {
		debug!("no legacy reading support for sensor 0x{:02x} (type 0x{:02x})", number, code);
		return Err(CompletionCode::SensorInvalid);
	};

	let loc = res.locator();
	let v = bus.get(&loc.service, &loc.path, &loc.interface, LEGACY_VALUE_PROPERTY)
		.map_err(|e| {
			error!("{}: failed to read {}: {}", loc.path, LEGACY_VALUE_PROPERTY, e);
			CompletionCode::SensorInvalid
		})?;

	let mut resp = ReadingResponse::default();
	if (enc.encode)(&v, &mut resp).is_none() {
		error!("{}: unexpected {} {}", loc.path, LEGACY_VALUE_PROPERTY, v);
		return Err(CompletionCode::SensorInvalid);
	}
	Ok(resp)
}

/// A state change a legacy sensor offset maps to.
struct LegacyAction {
	sensor_type: u8,
	offset: u8,
	/// Method on the legacy object to call.
	method: &'static str,
	/// Argument for the method on assertion.
	assert: &'static str,
	/// Argument on deassertion; empty if deassertion is ignored.
	deassert: &'static str,
}

const fn action(sensor_type: u8, offset: u8, method: &'static str, assert: &'static str,
                deassert: &'static str) -> LegacyAction {
	LegacyAction { sensor_type, offset, method, assert, deassert }
}

const LEGACY_ACTIONS: &[LegacyAction] = &[
	action(0xE9, 0x00, "setValue", "Disabled", ""), // OCC inactive
	action(0xE9, 0x01, "setValue", "Enabled", ""), // OCC active
	action(0x07, 0x07, "setPresent", "True", "False"),
	action(0x07, 0x08, "setFault", "True", "False"),
	action(0x0C, 0x06, "setPresent", "True", "False"),
	action(0x0C, 0x04, "setFault", "True", "False"),
	action(0xC7, 0x01, "setFault", "True", "False"),
	action(0x1F, 0x00, "setValue", "Boot completed (00)", ""),
	action(0x1F, 0x01, "setValue", "Boot completed (01)", ""),
	action(0x1F, 0x02, "setValue", "PXE boot completed", ""),
	action(0x1F, 0x03, "setValue", "Diagnostic boot completed", ""),
	action(0x1F, 0x04, "setValue", "CD-ROM boot completed", ""),
	action(0x1F, 0x05, "setValue", "ROM boot completed", ""),
	action(0x1F, 0x06, "setValue", "Boot completed (06)", ""),
];

/// Apply a Set Sensor Reading request through the legacy system manager.
///
/// Offsets with no entry in the action table are ignored.
pub fn update_record(bus: &dyn Bus, req: &SetReadingRequest) -> Result<(), CompletionCode> {
	let loc = locator::locate_legacy(bus, req.number).map_err(|e| {
		error!("Failed to find legacy sensor 0x{:02x}: {}", req.number, e);
		CompletionCode::SensorInvalid
	})?;
	let Some(lt) = sensortype::legacy_type(path_leaf(&loc.path)) else {
		error!("{}: unknown legacy sensor type", loc.path);
		return Err(CompletionCode::SensorInvalid);
	};

	for act in LEGACY_ACTIONS.iter().filter(|a| a.sensor_type == lt.sensor_type) {
		let bit = 1u16 << act.offset;
		let arg = if req.assert & bit != 0 {
			act.assert
		} else if req.deassert & bit != 0 && !act.deassert.is_empty() {
			act.deassert
		} else {
			continue;
		};
		bus.call(&loc.service, &loc.path, &loc.interface, act.method,
		         &PropertyValue::Str(arg.into()))
			.map_err(|e| {
				error!("{}: {}({}) failed: {}", loc.path, act.method, arg, e);
				CompletionCode::UnspecifiedError
			})?;
	}
	Ok(())
}
