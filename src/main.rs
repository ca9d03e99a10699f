use std::{
	path::PathBuf,
	time::Duration,
};
use clap::Parser;
use log::{error, info};

mod types;
mod bus;
mod sensor;
mod sensortype;
mod config;
mod locator;
mod reading;
mod legacy;
mod threshold;
mod sdr;
mod ipmi;
mod dbus_helpers;
mod server;

use types::*;

#[derive(Parser)]
#[command(version, about = "IPMI sensor and SDR command handler backed by dbus sensors")]
struct Args {
	/// YAML sensor table
	#[arg(long)]
	sensors: PathBuf,

	/// YAML FRU table
	#[arg(long)]
	frus: Option<PathBuf>,

	/// Timeout for calls to other dbus services, in seconds
	#[arg(long, default_value_t = 30)]
	bus_timeout: u64,
}

fn run(args: Args) -> ErrResult<()> {
	let dir = config::load_directory(&args.sensors, args.frus.as_deref())?;
	info!("loaded {} sensors and {} FRUs", dir.sensor_count(), dir.fru_count());

	let backend = dbus_helpers::DBusBackend::new_system(Duration::from_secs(args.bus_timeout))?;
	server::serve(ipmi::SensorHandler::new(dir, backend))
}

fn main() -> ErrResult<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	run(Args::parse()).map_err(|e| {
		error!("{}", e);
		e
	})
}
