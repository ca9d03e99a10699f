//! The narrow interface through which the command handler talks to the system bus.
//!
//! Everything here is synchronous: a call blocks until the backend answers (or the
//! backend's own timeout expires).

use std::collections::HashMap;
use serde::Deserialize;

use crate::types::*;

/// A property value as seen by the command handler.
///
/// This is deliberately much smaller than the full dbus type system; it covers the
/// property types IPMI sensors actually get backed by.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
	Bool(bool),
	Int(i64),
	Double(f64),
	Str(String),
}

impl PropertyValue {
	/// Numeric view of the value (integers are widened, bools are 0 or 1).
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
			Self::Int(i) => Some(*i as f64),
			Self::Double(d) => Some(*d),
			Self::Str(_) => None,
		}
	}

	/// Integer view of the value.  Doubles are only accepted if they're integral.
	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Self::Bool(b) => Some(*b as i64),
			Self::Int(i) => Some(*i),
			Self::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s),
			_ => None,
		}
	}

	/// Compare two values, treating numerically-equal ints, doubles and bools as the
	/// same (configs often say `1` where the bus has `true`).
	pub fn matches(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Str(a), Self::Str(b)) => a == b,
			(Self::Str(_), _) | (_, Self::Str(_)) => false,
			(a, b) => a.as_f64() == b.as_f64(),
		}
	}
}

impl std::fmt::Display for PropertyValue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Bool(b) => write!(f, "{}", b),
			Self::Int(i) => write!(f, "{}", i),
			Self::Double(d) => write!(f, "{}", d),
			Self::Str(s) => write!(f, "\"{}\"", s),
		}
	}
}

/// All the properties of one interface of one object.
pub type PropertyMap = HashMap<String, PropertyValue>;

/// Fetch a property from a [`PropertyMap`], failing if it's not there.
pub fn prop_get_mandatory<'a>(props: &'a PropertyMap, name: &str) -> ErrResult<&'a PropertyValue> {
	props.get(name).ok_or_else(|| err_not_found(format!("property {} not present", name)))
}

/// The operations the command handler needs from the system bus.
pub trait Bus {
	/// Find the service (bus name) owning `path`, optionally restricted to services
	/// implementing all of `interfaces`.
	fn service_for(&self, path: &str, interfaces: &[&str]) -> ErrResult<String>;

	/// Retrieve all properties of `interface` on `path`.
	fn get_all(&self, service: &str, path: &str, interface: &str) -> ErrResult<PropertyMap>;

	/// Retrieve a single property.
	fn get(&self, service: &str, path: &str, interface: &str, property: &str) -> ErrResult<PropertyValue> {
		let mut props = self.get_all(service, path, interface)?;
		props.remove(property)
			.ok_or_else(|| err_not_found(format!("{}: no property {}.{}", path, interface, property)))
	}

	/// Write a single property.
	fn set(&self, service: &str, path: &str, interface: &str, property: &str,
	       value: &PropertyValue) -> ErrResult<()>;

	/// Call a method taking a single variant argument and returning nothing.
	fn call(&self, service: &str, path: &str, interface: &str, method: &str,
	        arg: &PropertyValue) -> ErrResult<()>;

	/// Ask the legacy system manager (at `service`) for the object backing sensor
	/// `number` of the given `category`.  Returns `(path, interface)`; an empty path
	/// means the manager doesn't know the sensor.
	fn legacy_object_from_byte_id(&self, service: &str, category: &str, number: u8)
	                              -> ErrResult<(String, String)>;
}
