//! The real [`Bus`]: blocking calls on a system bus connection.

use std::{
	collections::HashMap,
	time::Duration,
};
use dbus::{
	Message,
	arg::{ArgType, RefArg, Variant, cast},
	blocking::{
		BlockingSender,
		Proxy,
		SyncConnection,
		stdintf::org_freedesktop_dbus::Properties,
	},
	strings::{BusName, Interface, Member},
};
use log::debug;

use crate::{
	bus::{Bus, PropertyMap, PropertyValue},
	locator::LEGACY_MANAGER_PATH,
	types::*,
};

const MAPPER_NAME: &str = "xyz.openbmc_project.ObjectMapper";
const MAPPER_PATH: &str = "/xyz/openbmc_project/object_mapper";
const MAPPER_INTERFACE: &str = "xyz.openbmc_project.ObjectMapper";

const LEGACY_MANAGER_INTERFACE: &str = "org.openbmc.managers.System";

/// Convert a dbus value to a [`PropertyValue`], if it's of a type we can represent.
pub fn refarg_to_value(v: &(dyn RefArg + 'static)) -> Option<PropertyValue> {
	match v.arg_type() {
		ArgType::Boolean => cast::<bool>(v).copied().map(PropertyValue::Bool),
		ArgType::Double => v.as_f64().map(PropertyValue::Double),
		ArgType::Byte | ArgType::Int16 | ArgType::UInt16 | ArgType::Int32 | ArgType::UInt32
			| ArgType::Int64 => v.as_i64().map(PropertyValue::Int),
		ArgType::UInt64 => v.as_u64().and_then(|u| i64::try_from(u).ok()).map(PropertyValue::Int),
		ArgType::String | ArgType::ObjectPath => v.as_str().map(|s| PropertyValue::Str(s.into())),
		_ => None,
	}
}

/// Build a call of `method` with `arg` as its single variant argument.
fn variant_call(service: &str, path: &str, interface: &str, method: &str,
                arg: &PropertyValue) -> ErrResult<Message> {
	let msg = Message::new_method_call(BusName::new(service)?, dbus::Path::new(path)?,
	                                   Interface::new(interface)?, Member::new(method)?)?;
	Ok(match arg {
		PropertyValue::Bool(b) => msg.append1(Variant(*b)),
		PropertyValue::Int(i) => msg.append1(Variant(*i)),
		PropertyValue::Double(d) => msg.append1(Variant(*d)),
		PropertyValue::Str(s) => msg.append1(Variant(s.as_str())),
	})
}

/// Unpack a `getObjectFromByteId` reply, a single `(ss)` struct of object path
/// and interface.
fn legacy_object_reply(reply: &Message) -> ErrResult<(String, String)> {
	let ((path, intf),): ((String, String),) = reply.read_all()?;
	Ok((path, intf))
}

/// A [`Bus`] talking to the system bus, with a fixed timeout on every call.
pub struct DBusBackend {
	conn: SyncConnection,
	timeout: Duration,
}

impl DBusBackend {
	pub fn new_system(timeout: Duration) -> ErrResult<Self> {
		Ok(Self {
			conn: SyncConnection::new_system()?,
			timeout,
		})
	}

	fn proxy<'a>(&'a self, service: &'a str, path: &'a str) -> ErrResult<Proxy<'a, &'a SyncConnection>> {
		let service = BusName::new(service)?;
		let path = dbus::Path::new(path)?;
		Ok(Proxy::new(service, path, self.timeout, &self.conn))
	}
}

impl Bus for DBusBackend {
	fn service_for(&self, path: &str, interfaces: &[&str]) -> ErrResult<String> {
		let p = self.proxy(MAPPER_NAME, MAPPER_PATH)?;
		let (services,): (HashMap<String, Vec<String>>,) =
			p.method_call(MAPPER_INTERFACE, "GetObject", (path, interfaces.to_vec()))?;
		// lowest-sorting name if there's more than one
		services.into_keys().min()
			.ok_or_else(|| err_not_found(format!("mapper has no service for {}", path)))
	}

	fn get_all(&self, service: &str, path: &str, interface: &str) -> ErrResult<PropertyMap> {
		let props = self.proxy(service, path)?.get_all(interface)?;
		let mut map = PropertyMap::new();
		for (name, v) in props {
			match refarg_to_value(&*v.0) {
				Some(pv) => {
					map.insert(name, pv);
				},
				None => debug!("{}: skipping {}.{} of unsupported type {:?}", path, interface,
				               name, v.0.arg_type()),
			}
		}
		Ok(map)
	}

	fn set(&self, service: &str, path: &str, interface: &str, property: &str,
	       value: &PropertyValue) -> ErrResult<()> {
		let p = self.proxy(service, path)?;
		match value {
			PropertyValue::Bool(b) => p.set(interface, property, *b),
			PropertyValue::Int(i) => p.set(interface, property, *i),
			PropertyValue::Double(d) => p.set(interface, property, *d),
			PropertyValue::Str(s) => p.set(interface, property, s.as_str()),
		}?;
		Ok(())
	}

	fn call(&self, service: &str, path: &str, interface: &str, method: &str,
	        arg: &PropertyValue) -> ErrResult<()> {
		let msg = variant_call(service, path, interface, method, arg)?;
		self.conn.send_with_reply_and_block(msg, self.timeout)?;
		Ok(())
	}

	fn legacy_object_from_byte_id(&self, service: &str, category: &str, number: u8)
	                              -> ErrResult<(String, String)> {
		let msg = Message::new_method_call(BusName::new(service)?, LEGACY_MANAGER_PATH,
		                                   LEGACY_MANAGER_INTERFACE, "getObjectFromByteId")?
			.append2(category, number);
		let reply = self.conn.send_with_reply_and_block(msg, self.timeout)?;
		legacy_object_reply(&reply)
	}
}
