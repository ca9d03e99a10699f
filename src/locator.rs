//! Resolution of IPMI sensor numbers to dbus objects.

use log::{debug, error};

use crate::{
	bus::Bus,
	sensor::{Directory, SensorInfo},
	sensortype,
	types::*,
};

/// Object path of the (deprecated) legacy system manager.
pub const LEGACY_MANAGER_PATH: &str = "/org/openbmc/managers/System";

/// Category name under which the legacy system manager indexes sensors.
const LEGACY_SENSOR_CATEGORY: &str = "SENSOR";

/// Everything needed to address a sensor's properties on dbus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
	pub service: String,
	pub path: String,
	pub interface: String,
}

/// The outcome of a successful sensor number lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
	/// Found in the sensor table; the sensor type is known.
	Resolved {
		locator: Locator,
		sensor_type: u8,
	},
	/// Found via the legacy system manager; the type has to be inferred from the
	/// object path.
	ResolvedLegacy {
		locator: Locator,
	},
}

impl Resolution {
	pub fn locator(&self) -> &Locator {
		match self {
			Self::Resolved { locator, .. } | Self::ResolvedLegacy { locator } => locator,
		}
	}

	/// The sensor's type code, or 0 if it isn't a supported IPMI sensor.
	pub fn type_code(&self) -> u8 {
		let locator = self.locator();
		// sensors that exist in the host code but have no dbus object stop here
		if locator.interface.is_empty() {
			return 0;
		}
		match self {
			Self::Resolved { sensor_type, .. } => *sensor_type,
			Self::ResolvedLegacy { locator } => {
				sensortype::type_from_legacy_name(path_leaf(&locator.path))
			},
		}
	}
}

/// Build the [`Locator`] for a sensor from the sensor table, looking up its
/// service via the object mapper if the table doesn't name one.
pub fn locate(sensor: &SensorInfo, bus: &dyn Bus) -> ErrResult<Locator> {
	let service = match &sensor.service {
		Some(s) => s.clone(),
		None => bus.service_for(&sensor.path, &[sensor.interface()])?,
	};
	Ok(Locator {
		service,
		path: sensor.path.clone(),
		interface: sensor.interface().to_string(),
	})
}

/// Look a sensor up via the legacy system manager.
pub fn locate_legacy(bus: &dyn Bus, number: u8) -> ErrResult<Locator> {
	let manager = bus.service_for(LEGACY_MANAGER_PATH, &[])?;
	let (path, interface) = bus.legacy_object_from_byte_id(&manager, LEGACY_SENSOR_CATEGORY,
	                                                        number)?;
	if path.is_empty() {
		return Err(err_not_found(format!("sensor 0x{:02x} unknown to system manager", number)));
	}
	let service = bus.service_for(&path, &[])?;
	Ok(Locator {
		service,
		path,
		interface,
	})
}

/// Resolve a sensor number to its dbus object.
///
/// The sensor table is consulted first; sensors missing from it fall back to the
/// legacy system manager.  Any failure along the way is reported as not-found.
pub fn resolve(dir: &Directory, bus: &dyn Bus, number: u8) -> ErrResult<Resolution> {
	let res = match dir.sensor(number) {
		Some(sensor) => locate(sensor, bus).map(|locator| Resolution::Resolved {
			locator,
			sensor_type: sensor.sensor_type,
		}),
		None => {
			debug!("sensor 0x{:02x} not in sensor table, trying legacy lookup", number);
			locate_legacy(bus, number).map(|locator| Resolution::ResolvedLegacy { locator })
		},
	};
	res.map_err(|e| {
		error!("Failed to find sensor 0x{:02x}: {}", number, e);
		err_not_found(format!("sensor 0x{:02x}: {}", number, e))
	})
}
