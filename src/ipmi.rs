//! The IPMI sensor/event network function: command decoding, privilege checks
//! and completion codes.

use log::{debug, warn};

use crate::{
	bus::Bus,
	locator,
	reading::{self, SetReadingRequest},
	sdr::{self, GetSdrRequest},
	sensor::Directory,
	threshold,
};

/// The sensor/event network function.
pub const NETFN_SENSOR: u8 = 0x04;

/// Second byte of the Get Sensor Type response: the sensor-specific
/// event/reading type.
const SENSOR_SPECIFIC_READING_TYPE: u8 = 0x6F;

/// IPMI completion codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum CompletionCode {
	Ok = 0x00,
	InvalidCommand = 0xC1,
	ReqDataLenInvalid = 0xC7,
	/// Requested sensor, data, or record not present.
	SensorInvalid = 0xCB,
	/// Command illegal for specified sensor or record type.
	IllegalCommand = 0xCD,
	InsufficientPrivilege = 0xD4,
	UnspecifiedError = 0xFF,
}

/// Session privilege levels, in increasing order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Privilege {
	Callback = 1,
	User = 2,
	Operator = 3,
	Admin = 4,
}

impl TryFrom<i64> for Privilege {
	type Error = i64;
	fn try_from(n: i64) -> Result<Self, i64> {
		match n {
			1 => Ok(Self::Callback),
			2 => Ok(Self::User),
			3 => Ok(Self::Operator),
			4 => Ok(Self::Admin),
			_ => Err(n),
		}
	}
}

/// The commands of the sensor network function we implement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SensorCommand {
	GetSdrInfo,
	GetSdr,
	ReserveSdr,
	GetThresholds,
	GetReading,
	GetType,
	SetReading,
}

impl SensorCommand {
	fn from_u8(cmd: u8) -> Option<Self> {
		match cmd {
			0x20 => Some(Self::GetSdrInfo),
			0x21 => Some(Self::GetSdr),
			0x22 => Some(Self::ReserveSdr),
			0x27 => Some(Self::GetThresholds),
			0x2D => Some(Self::GetReading),
			0x2F => Some(Self::GetType),
			0x30 => Some(Self::SetReading),
			_ => None,
		}
	}

	fn privilege(self) -> Privilege {
		match self {
			Self::SetReading => Privilege::Operator,
			_ => Privilege::User,
		}
	}
}

type CmdResult = Result<Vec<u8>, CompletionCode>;

/// Serves sensor-domain IPMI commands from a sensor/FRU [`Directory`] and a
/// [`Bus`].
pub struct SensorHandler<B: Bus> {
	dir: Directory,
	bus: B,
}

impl<B: Bus> SensorHandler<B> {
	pub fn new(dir: Directory, bus: B) -> Self {
		Self { dir, bus }
	}

	pub fn directory(&self) -> &Directory {
		&self.dir
	}

	/// Process one request, returning the completion code and response data
	/// (always empty on failure).
	pub fn execute(&self, netfn: u8, cmd: u8, data: &[u8], privilege: Privilege) -> (CompletionCode, Vec<u8>) {
		let command = match (netfn, SensorCommand::from_u8(cmd)) {
			(NETFN_SENSOR, Some(c)) => c,
			_ => {
				debug!("unsupported command: netfn 0x{:02x} cmd 0x{:02x}", netfn, cmd);
				return (CompletionCode::InvalidCommand, vec![]);
			},
		};

		if privilege < command.privilege() {
			warn!("{:?} requires {:?} privilege, have {:?}", command, command.privilege(), privilege);
			return (CompletionCode::InsufficientPrivilege, vec![]);
		}

		let res = match command {
			SensorCommand::GetSdrInfo => Ok(sdr::sdr_info(&self.dir, data).to_vec()),
			SensorCommand::GetSdr => self.get_sdr(data),
			SensorCommand::ReserveSdr => Ok(sdr::RESERVATION_ID.to_le_bytes().to_vec()),
			SensorCommand::GetThresholds => self.get_thresholds(data),
			SensorCommand::GetReading => self.get_reading(data),
			SensorCommand::GetType => self.get_type(data),
			SensorCommand::SetReading => self.set_reading(data),
		};

		match res {
			Ok(resp) => (CompletionCode::Ok, resp),
			Err(cc) => (cc, vec![]),
		}
	}

	fn get_sdr(&self, data: &[u8]) -> CmdResult {
		let req = GetSdrRequest::from_bytes(data).ok_or(CompletionCode::ReqDataLenInvalid)?;
		sdr::get_sdr(&self.dir, &req)
	}

	fn get_thresholds(&self, data: &[u8]) -> CmdResult {
		let &[number] = data else {
			return Err(CompletionCode::ReqDataLenInvalid);
		};
		threshold::get_thresholds(&self.dir, &self.bus, number).map(|t| t.to_bytes().to_vec())
	}

	fn get_reading(&self, data: &[u8]) -> CmdResult {
		let &number = data.first().ok_or(CompletionCode::ReqDataLenInvalid)?;
		reading::get_reading(&self.dir, &self.bus, number).map(|r| r.to_bytes().to_vec())
	}

	fn get_type(&self, data: &[u8]) -> CmdResult {
		let &number = data.first().ok_or(CompletionCode::ReqDataLenInvalid)?;
		let res = locator::resolve(&self.dir, &self.bus, number)
			.map_err(|_| CompletionCode::SensorInvalid)?;
		match res.type_code() {
			0 => Err(CompletionCode::SensorInvalid),
			code => Ok(vec![code, SENSOR_SPECIFIC_READING_TYPE]),
		}
	}

	fn set_reading(&self, data: &[u8]) -> CmdResult {
		let req = SetReadingRequest::from_bytes(data).ok_or(CompletionCode::ReqDataLenInvalid)?;
		reading::set_reading(&self.dir, &self.bus, &req).map(|()| vec![])
	}
}
