//! Exposing a [`SensorHandler`] on dbus.

use dbus::{
	arg::PropMap,
	blocking::Connection,
};
use dbus_crossroads::{Crossroads, IfaceBuilder, IfaceToken};
use log::{info, warn};

use crate::{
	bus::Bus,
	ipmi::{Privilege, SensorHandler},
	types::*,
};

pub const DBUS_NAME: &str = "xyz.openbmc_project.Ipmi.SensorHandler";
pub const OBJECT_PATH: &str = "/xyz/openbmc_project/Ipmi";
pub const INTERFACE: &str = "xyz.openbmc_project.Ipmi.Server";

/// Extract the requester's privilege level from an `execute` call's options.
///
/// Callers that don't say are trusted (admin); callers that say something
/// unintelligible get the lowest level.
pub fn privilege_from_options(options: &PropMap) -> Privilege {
	let Some(v) = options.get("privilege") else {
		return Privilege::Admin;
	};
	match v.0.as_i64().map(Privilege::try_from) {
		Some(Ok(p)) => p,
		_ => {
			warn!("invalid privilege option {:?}", v);
			Privilege::Callback
		},
	}
}

/// Register the IPMI server interface with `cr`.
pub fn build_interface<B: Bus + Send + 'static>(cr: &mut Crossroads) -> IfaceToken<SensorHandler<B>> {
	cr.register(INTERFACE, |b: &mut IfaceBuilder<SensorHandler<B>>| {
		b.method("execute", ("netfn", "lun", "cmd", "data", "options"),
		         ("netfn", "lun", "cmd", "cc", "data"),
		         |_ctx, handler, (netfn, lun, cmd, data, options): (u8, u8, u8, Vec<u8>, PropMap)| {
			let privilege = privilege_from_options(&options);
			let (cc, resp) = handler.execute(netfn, cmd, &data, privilege);
			Ok((netfn | 1, lun, cmd, cc as u8, resp))
		});
	})
}

/// Claim [`DBUS_NAME`] on the system bus and serve requests until the
/// connection fails.
pub fn serve<B: Bus + Send + 'static>(handler: SensorHandler<B>) -> ErrResult<()> {
	let conn = Connection::new_system()?;
	conn.request_name(DBUS_NAME, false, true, false)?;

	let mut cr = Crossroads::new();
	let token = build_interface(&mut cr);
	info!("serving {} sensors and {} FRUs at {}", handler.directory().sensor_count(),
	      handler.directory().fru_count(), OBJECT_PATH);
	cr.insert(OBJECT_PATH, &[token], handler);

	cr.serve(&conn)?;
	Ok(())
}
