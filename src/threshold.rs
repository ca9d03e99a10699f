//! Get Sensor Thresholds support.

use log::{debug, warn};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::{
	bus::{Bus, PropertyMap, prop_get_mandatory},
	ipmi::CompletionCode,
	locator::{self, Locator},
	sensor::{Directory, SensorInfo},
	types::*,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
pub enum ThresholdSeverity {
	Warning,
	Critical,
}

impl ThresholdSeverity {
	fn interface(self) -> &'static str {
		match self {
			Self::Warning => "xyz.openbmc_project.Sensor.Threshold.Warning",
			Self::Critical => "xyz.openbmc_project.Sensor.Threshold.Critical",
		}
	}
}

/// The thresholds dbus sensors expose that have an IPMI counterpart.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
pub enum ThresholdLevel {
	WarningLow,
	WarningHigh,
	CriticalLow,
	CriticalHigh,
}

impl ThresholdLevel {
	fn severity(self) -> ThresholdSeverity {
		match self {
			Self::WarningLow | Self::WarningHigh => ThresholdSeverity::Warning,
			Self::CriticalLow | Self::CriticalHigh => ThresholdSeverity::Critical,
		}
	}

	/// The dbus property holding the threshold.
	fn property(self) -> &'static str {
		match self {
			Self::WarningLow => "WarningLow",
			Self::WarningHigh => "WarningHigh",
			Self::CriticalLow => "CriticalLow",
			Self::CriticalHigh => "CriticalHigh",
		}
	}

	/// The threshold's bit in the IPMI readable-thresholds mask.
	fn mask_bit(self) -> u8 {
		match self {
			Self::WarningLow => 1 << 0,
			Self::CriticalLow => 1 << 1,
			Self::WarningHigh => 1 << 3,
			Self::CriticalHigh => 1 << 4,
		}
	}
}

/// A sensor's thresholds in IPMI raw form.
///
/// Non-recoverable thresholds have no dbus counterpart and are never valid.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ThresholdSet {
	pub valid_mask: u8,
	pub lower_non_critical: u8,
	pub lower_critical: u8,
	pub upper_non_critical: u8,
	pub upper_critical: u8,
}

impl ThresholdSet {
	fn set(&mut self, level: ThresholdLevel, raw: u8) {
		let field = match level {
			ThresholdLevel::WarningLow => &mut self.lower_non_critical,
			ThresholdLevel::CriticalLow => &mut self.lower_critical,
			ThresholdLevel::WarningHigh => &mut self.upper_non_critical,
			ThresholdLevel::CriticalHigh => &mut self.upper_critical,
		};
		*field = raw;
		self.valid_mask |= level.mask_bit();
	}

	pub fn to_bytes(&self) -> [u8; 7] {
		[
			self.valid_mask,
			self.lower_non_critical,
			self.lower_critical,
			0, // lower non-recoverable
			self.upper_non_critical,
			self.upper_critical,
			0, // upper non-recoverable
		]
	}
}

fn read_thresholds(sensor: &SensorInfo, loc: &Locator, bus: &dyn Bus) -> ErrResult<ThresholdSet> {
	let intfs = ThresholdSeverity::iter()
		.map(|sev| bus.get_all(&loc.service, &loc.path, sev.interface()).map(|p| (sev, p)))
		.collect::<ErrResult<Vec<(ThresholdSeverity, PropertyMap)>>>()?;

	let mut set = ThresholdSet::default();
	for (sev, props) in &intfs {
		for level in ThresholdLevel::iter().filter(|l| l.severity() == *sev) {
			let prop = prop_get_mandatory(props, level.property())?;
			let Some(value) = prop.as_f64() else {
				return Err(err_invalid_data(format!("{}: non-numeric {} {}", loc.path,
				                                    level.property(), prop)));
			};
			// a threshold of exactly zero means it isn't set
			if value != 0.0 {
				set.set(level, sensor.linear.to_raw(value));
			}
		}
	}
	Ok(set)
}

/// Handle Get Sensor Thresholds for `number`.
///
/// Only an unknown sensor is an error.  A sensor without thresholds, or one whose
/// thresholds can't be retrieved, reports none as readable.
pub fn get_thresholds(dir: &Directory, bus: &dyn Bus, number: u8) -> Result<ThresholdSet, CompletionCode> {
	let Some(sensor) = dir.sensor(number) else {
		return Err(CompletionCode::SensorInvalid);
	};
	if !sensor.has_value_interface() {
		debug!("sensor 0x{:02x} has no value interface, so no thresholds", number);
		return Ok(ThresholdSet::default());
	}

	let res = locator::locate(sensor, bus)
		.and_then(|loc| read_thresholds(sensor, &loc, bus));
	Ok(res.unwrap_or_else(|e| {
		warn!("failed to get thresholds for sensor 0x{:02x}: {}", number, e);
		ThresholdSet::default()
	}))
}
