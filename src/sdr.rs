//! Synthesis of Sensor Data Records from the sensor and FRU tables.
//!
//! There's no stored repository; records are built on demand from the
//! [`Directory`].  Sensors occupy record IDs 0-255 (the ID is the sensor
//! number), FRUs follow at [`FRU_RECORD_ID_START`] + FRU ID.

use log::debug;

use crate::{
	ipmi::CompletionCode,
	sensor::{Directory, FruInfo, SensorInfo},
	sensortype,
};

/// Size of a Full Sensor Record.
pub const FULL_RECORD_SIZE: usize = 64;
/// Size of a FRU Device Locator Record.
pub const FRU_RECORD_SIZE: usize = 32;

/// The record ID of the first FRU record.
pub const FRU_RECORD_ID_START: u16 = 256;
/// The "next record ID" reported with the last record.
pub const END_OF_RECORDS: u16 = 0xFFFF;

const SDR_VERSION: u8 = 0x51;
const RECORD_TYPE_FULL: u8 = 0x01;
const RECORD_TYPE_FRU: u8 = 0x11;

const HEADER_SIZE: usize = 5;
/// Our own IPMB address, used as the owner of every record.
const BMC_SLAVE_ADDR: u8 = 0x20;
const ID_STRING_MAX: usize = 16;

/// Full record key and body field offsets.
mod full {
	pub const OWNER_ID: usize = 5;
	pub const OWNER_LUN: usize = 6;
	pub const SENSOR_NUMBER: usize = 7;
	const BODY: usize = 8;
	pub const ENTITY_ID: usize = BODY;
	pub const ENTITY_INSTANCE: usize = BODY + 1;
	pub const SENSOR_TYPE: usize = BODY + 4;
	pub const EVENT_READING_TYPE: usize = BODY + 5;
	pub const UNITS_1: usize = BODY + 12;
	pub const UNITS_2_BASE: usize = BODY + 13;
	pub const UNITS_3_MODIFIER: usize = BODY + 14;
	pub const M_LSB: usize = BODY + 16;
	pub const M_MSB_TOLERANCE: usize = BODY + 17;
	pub const B_LSB: usize = BODY + 18;
	pub const B_MSB_ACCURACY: usize = BODY + 19;
	pub const R_B_EXPONENTS: usize = BODY + 21;
	pub const ID_STRING_INFO: usize = BODY + 39;
	pub const ID_STRING: usize = BODY + 40;
}

/// FRU record key and body field offsets.
mod fru {
	pub const DEVICE_ADDRESS: usize = 5;
	pub const FRU_ID: usize = 6;
	pub const ACCESS_LUN: usize = 7;
	pub const CHANNEL: usize = 8;
	const BODY: usize = 9;
	pub const DEVICE_TYPE: usize = BODY + 1;
	pub const DEVICE_TYPE_MODIFIER: usize = BODY + 2;
	pub const ENTITY_ID: usize = BODY + 3;
	pub const ENTITY_INSTANCE: usize = BODY + 4;
	pub const DEVICE_ID_LEN: usize = BODY + 6;
	pub const DEVICE_ID: usize = BODY + 7;
}

/// Logical FRU device, accessed via FRU commands to mgmt controller.
const FRU_ACCESS_LUN_LOGICAL: u8 = 0x80;
/// "FRU inventory device behind management controller".
const FRU_DEVICE_TYPE: u8 = 0x10;
const FRU_DEVICE_TYPE_MODIFIER: u8 = 0x02;

fn write_header(rec: &mut [u8], record_id: u16, record_type: u8) {
	let [lo, hi] = record_id.to_le_bytes();
	rec[0] = lo;
	rec[1] = hi;
	rec[2] = SDR_VERSION;
	rec[3] = record_type;
	// the length field covers everything after the header
	rec[4] = (rec.len() - HEADER_SIZE) as u8;
}

/// Copy in up to [`ID_STRING_MAX`] bytes of `s` at `offset`, returning how many
/// were copied.
fn write_id_string(rec: &mut [u8], offset: usize, s: &str) -> u8 {
	let bytes = &s.as_bytes()[..s.len().min(ID_STRING_MAX)];
	rec[offset..offset + bytes.len()].copy_from_slice(bytes);
	bytes.len() as u8
}

/// Store a 10-bit two's complement coefficient split across an LSB byte and the
/// top two bits of a shared byte.
fn write_10bit(rec: &mut [u8], lsb: usize, msb: usize, value: i16) {
	let v = value as u16;
	rec[lsb] = (v & 0xff) as u8;
	rec[msb] = (rec[msb] & 0x3f) | ((v & 0x300) >> 2) as u8;
}

/// Build the Full Sensor Record for `sensor`.
pub fn full_record(sensor: &SensorInfo) -> [u8; FULL_RECORD_SIZE] {
	let mut rec = [0u8; FULL_RECORD_SIZE];
	write_header(&mut rec, sensor.number.into(), RECORD_TYPE_FULL);

	rec[full::OWNER_ID] = BMC_SLAVE_ADDR;
	rec[full::OWNER_LUN] = 0;
	rec[full::SENSOR_NUMBER] = sensor.number;

	rec[full::ENTITY_ID] = sensor.entity_type;
	rec[full::ENTITY_INSTANCE] = sensor.instance;
	rec[full::SENSOR_TYPE] = sensor.sensor_type;
	rec[full::EVENT_READING_TYPE] = sensor.reading_type;

	if sensor.is_analog() {
		let units = sensortype::unit_fields(&sensor.unit);
		rec[full::UNITS_1] = (units.rate & 0x07) << 3;
		rec[full::UNITS_2_BASE] = units.base;
		rec[full::UNITS_3_MODIFIER] = units.modifier;

		let lin = &sensor.linear;
		write_10bit(&mut rec, full::M_LSB, full::M_MSB_TOLERANCE, lin.m);
		write_10bit(&mut rec, full::B_LSB, full::B_MSB_ACCURACY, lin.b);
		rec[full::R_B_EXPONENTS] = ((lin.r_exp as u8 & 0x0f) << 4) | (lin.b_exp as u8 & 0x0f);
	}

	// ID string type stays 0 (unicode)
	let len = write_id_string(&mut rec, full::ID_STRING, &sensor.id_string());
	rec[full::ID_STRING_INFO] = len & 0x1f;
	rec
}

/// Build the FRU Device Locator Record for `fru`.
pub fn fru_record(fru: &FruInfo) -> [u8; FRU_RECORD_SIZE] {
	let mut rec = [0u8; FRU_RECORD_SIZE];
	write_header(&mut rec, FRU_RECORD_ID_START + u16::from(fru.fru_id), RECORD_TYPE_FRU);

	rec[fru::DEVICE_ADDRESS] = BMC_SLAVE_ADDR;
	rec[fru::FRU_ID] = fru.fru_id;
	rec[fru::ACCESS_LUN] = FRU_ACCESS_LUN_LOGICAL;
	rec[fru::CHANNEL] = 0;

	rec[fru::DEVICE_TYPE] = FRU_DEVICE_TYPE;
	rec[fru::DEVICE_TYPE_MODIFIER] = FRU_DEVICE_TYPE_MODIFIER;
	rec[fru::ENTITY_ID] = fru.entity_id;
	rec[fru::ENTITY_INSTANCE] = fru.entity_instance;

	let len = write_id_string(&mut rec, fru::DEVICE_ID, fru.device_id());
	rec[fru::DEVICE_ID_LEN] = len & 0x1f;
	rec
}

/// A record in the synthesized repository.
#[derive(Debug, Copy, Clone)]
enum Record<'a> {
	Sensor(&'a SensorInfo),
	Fru(&'a FruInfo),
}

impl<'a> Record<'a> {
	/// Find the record with ID `id`; ID 0 means "the first record".
	fn find(dir: &'a Directory, id: u16) -> Option<Self> {
		if id == 0 {
			return dir.first_sensor().map(Self::Sensor)
				.or_else(|| dir.first_fru().map(Self::Fru));
		}
		match u8::try_from(id) {
			Ok(num) => dir.sensor(num).map(Self::Sensor),
			Err(_) => {
				let fru_id = u8::try_from(id - FRU_RECORD_ID_START).ok()?;
				dir.fru(fru_id).map(Self::Fru)
			},
		}
	}

	/// The ID of the record after this one.
	fn next_id(self, dir: &Directory) -> u16 {
		let next_fru = |f: Option<&FruInfo>| {
			f.map_or(END_OF_RECORDS, |f| FRU_RECORD_ID_START + u16::from(f.fru_id))
		};
		match self {
			Self::Sensor(s) => match dir.sensor_after(s.number) {
				Some(next) => next.number.into(),
				None => next_fru(dir.first_fru()),
			},
			Self::Fru(f) => next_fru(dir.fru_after(f.fru_id)),
		}
	}

	fn to_bytes(self) -> Vec<u8> {
		match self {
			Self::Sensor(s) => full_record(s).to_vec(),
			Self::Fru(f) => fru_record(f).to_vec(),
		}
	}
}

/// A Get Device SDR request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GetSdrRequest {
	/// Accepted but not checked; there's only ever one reservation.
	pub reservation_id: u16,
	pub record_id: u16,
	pub offset: u8,
	pub bytes_to_read: u8,
}

impl GetSdrRequest {
	pub fn from_bytes(data: &[u8]) -> Option<Self> {
		let &[resv_lo, resv_hi, rec_lo, rec_hi, offset, bytes_to_read] = data else {
			return None;
		};
		Some(Self {
			reservation_id: u16::from_le_bytes([resv_lo, resv_hi]),
			record_id: u16::from_le_bytes([rec_lo, rec_hi]),
			offset,
			bytes_to_read,
		})
	}
}

/// Handle Get Device SDR: the next record ID (little-endian) followed by the
/// requested slice of the record.
pub fn get_sdr(dir: &Directory, req: &GetSdrRequest) -> Result<Vec<u8>, CompletionCode> {
	let Some(rec) = Record::find(dir, req.record_id) else {
		debug!("no SDR with record ID {}", req.record_id);
		return Err(CompletionCode::SensorInvalid);
	};

	let data = rec.to_bytes();
	let offset = usize::from(req.offset);
	let len = usize::from(req.bytes_to_read).min(data.len().saturating_sub(offset));
	if len == 0 {
		return Err(CompletionCode::ReqDataLenInvalid);
	}

	let mut resp = Vec::with_capacity(len + 2);
	resp.extend_from_slice(&rec.next_id(dir).to_le_bytes());
	resp.extend_from_slice(&data[offset..offset + len]);
	Ok(resp)
}

/// LUN 0 has sensors; the sensor population is static.
const SDR_INFO_LUN_FLAGS: u8 = 0x01;

/// Handle Get Device SDR Info.
///
/// With bit 0 of the (optional) request byte set, the caller is asking for the
/// SDR count, which is always 1; otherwise it gets the sensor count, which here
/// includes the FRU records.
pub fn sdr_info(dir: &Directory, data: &[u8]) -> [u8; 2] {
	let count = match data.first() {
		Some(b) if b & 0x01 != 0 => 1,
		_ => u8::try_from(dir.sensor_count() + dir.fru_count()).unwrap_or(u8::MAX),
	};
	[count, SDR_INFO_LUN_FLAGS]
}

/// The reservation ID handed out by Reserve Device SDR Repository.
pub const RESERVATION_ID: u16 = 1;

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{config::fixtures, sensor::Directory};

	fn req(record_id: u16, offset: u8, bytes_to_read: u8) -> GetSdrRequest {
		GetSdrRequest { reservation_id: RESERVATION_ID, record_id, offset, bytes_to_read }
	}

	fn next_id(resp: &[u8]) -> u16 {
		u16::from_le_bytes([resp[0], resp[1]])
	}

	#[test]
	fn parse_request() {
		let r = GetSdrRequest::from_bytes(&[0x01, 0x00, 0x03, 0x01, 0x05, 0x10]).unwrap();
		assert_eq!(r, GetSdrRequest {
			reservation_id: 1,
			record_id: 0x103,
			offset: 5,
			bytes_to_read: 16,
		});
		assert!(GetSdrRequest::from_bytes(&[0x01, 0x00, 0x03, 0x01, 0x05]).is_none());
		assert!(GetSdrRequest::from_bytes(&[0; 7]).is_none());
	}

	#[test]
	fn enumerate_everything() {
		let dir = fixtures::directory();
		let mut id = 0;
		let mut seen = vec![];
		while id != END_OF_RECORDS {
			let resp = get_sdr(&dir, &req(id, 0, 0xff)).unwrap();
			let rec = &resp[2..];
			seen.push(u16::from_le_bytes([rec[0], rec[1]]));
			match rec[3] {
				RECORD_TYPE_FULL => assert_eq!(rec.len(), FULL_RECORD_SIZE),
				RECORD_TYPE_FRU => assert_eq!(rec.len(), FRU_RECORD_SIZE),
				t => panic!("unexpected record type {:#x}", t),
			}
			id = next_id(&resp);
			assert!(seen.len() <= 8, "runaway enumeration");
		}
		assert_eq!(seen, vec![0x01, 0x05, 0x0c, 0x1f, 0x30, 256, 259, 263]);
	}

	#[test]
	fn empty_tables() {
		let dir = Directory::default();
		assert_eq!(get_sdr(&dir, &req(0, 0, 0xff)), Err(CompletionCode::SensorInvalid));

		let frus = crate::config::parse_frus(fixtures::FRUS).unwrap();
		let dir = Directory::new(vec![], frus).unwrap();
		let resp = get_sdr(&dir, &req(0, 0, 0xff)).unwrap();
		assert_eq!(next_id(&resp), 259);
		assert_eq!(resp[2 + 3], RECORD_TYPE_FRU);
	}

	#[test]
	fn missing_records() {
		let dir = fixtures::directory();
		for id in [0x02, 0xff, 257, 511, 512, 0xfffe] {
			assert_eq!(get_sdr(&dir, &req(id, 0, 0xff)), Err(CompletionCode::SensorInvalid),
			           "record {}", id);
		}
	}

	#[test]
	fn partial_reads() {
		let dir = fixtures::directory();
		let last = (FULL_RECORD_SIZE - 1) as u8;
		let resp = get_sdr(&dir, &req(0x05, last, 10)).unwrap();
		assert_eq!(resp.len(), 3);
		assert_eq!(next_id(&resp), 0x0c);
		assert_eq!(get_sdr(&dir, &req(0x05, last + 1, 0xff)),
		           Err(CompletionCode::ReqDataLenInvalid));
		assert_eq!(get_sdr(&dir, &req(0x05, 0, 0)), Err(CompletionCode::ReqDataLenInvalid));

		let resp = get_sdr(&dir, &req(0x05, 0, 5)).unwrap();
		assert_eq!(&resp[2..], &[0x05, 0x00, SDR_VERSION, RECORD_TYPE_FULL, 59]);

		let last = (FRU_RECORD_SIZE - 1) as u8;
		let resp = get_sdr(&dir, &req(263, last, 0xff)).unwrap();
		assert_eq!(resp.len(), 3);
		assert_eq!(next_id(&resp), END_OF_RECORDS);
		assert_eq!(get_sdr(&dir, &req(263, last + 1, 1)),
		           Err(CompletionCode::ReqDataLenInvalid));
	}

	#[test]
	fn analog_full_record() {
		let dir = fixtures::directory();
		let rec = full_record(dir.sensor(0x05).unwrap());
		assert_eq!(rec[full::OWNER_ID], BMC_SLAVE_ADDR);
		assert_eq!(rec[full::SENSOR_NUMBER], 0x05);
		assert_eq!(rec[full::ENTITY_ID], 0x1d);
		assert_eq!(rec[full::SENSOR_TYPE], 0x04);
		assert_eq!(rec[full::EVENT_READING_TYPE], 0x01);
		// RPM: revolutions per minute
		assert_eq!(rec[full::UNITS_1], 0b100 << 3);
		assert_eq!(rec[full::UNITS_2_BASE], 41);
		assert_eq!(rec[full::M_LSB], 100);
		assert_eq!(rec[full::M_MSB_TOLERANCE], 0);
		// truncated to 16 bytes
		assert_eq!(rec[full::ID_STRING_INFO], 16);
		assert_eq!(&rec[full::ID_STRING..], b"Fan 0 Tach Readi");

		let rec = full_record(dir.sensor(0x30).unwrap());
		assert_eq!(rec[full::UNITS_2_BASE], 4);
		// Rexp = -2 in the high nibble, Bexp = 0
		assert_eq!(rec[full::R_B_EXPONENTS], 0xe0);
	}

	#[test]
	fn wide_coefficients() {
		let dir = fixtures::directory();
		let mut sensor = dir.sensor(0x30).unwrap().clone();
		sensor.linear.m = 0x2a5;
		sensor.linear.b = -3;
		sensor.linear.b_exp = 1;
		let rec = full_record(&sensor);
		assert_eq!(rec[full::M_LSB], 0xa5);
		assert_eq!(rec[full::M_MSB_TOLERANCE], 0x80);
		// -3 in 10 bits is 0x3fd
		assert_eq!(rec[full::B_LSB], 0xfd);
		assert_eq!(rec[full::B_MSB_ACCURACY], 0xc0);
		assert_eq!(rec[full::R_B_EXPONENTS], 0xe1);
	}

	#[test]
	fn discrete_full_record() {
		let dir = fixtures::directory();
		let rec = full_record(dir.sensor(0x0c).unwrap());
		assert_eq!(rec[full::UNITS_2_BASE], 0);
		assert_eq!(rec[full::M_LSB], 0);
		assert_eq!(rec[full::ID_STRING_INFO], 5);
		assert_eq!(&rec[full::ID_STRING..full::ID_STRING + 5], b"dimm0");

		let rec = full_record(dir.sensor(0x1f).unwrap());
		assert_eq!(&rec[full::ID_STRING..full::ID_STRING + 6], b"host0\0");
	}

	#[test]
	fn fru_records() {
		let dir = fixtures::directory();
		let rec = fru_record(dir.fru(3).unwrap());
		assert_eq!(&rec[..5], &[0x03, 0x01, SDR_VERSION, RECORD_TYPE_FRU, 27]);
		assert_eq!(&rec[5..9], &[BMC_SLAVE_ADDR, 3, FRU_ACCESS_LUN_LOGICAL, 0]);
		assert_eq!(rec[fru::DEVICE_TYPE], FRU_DEVICE_TYPE);
		assert_eq!(rec[fru::DEVICE_TYPE_MODIFIER], FRU_DEVICE_TYPE_MODIFIER);
		assert_eq!(rec[fru::ENTITY_ID], 0x0a);
		assert_eq!(rec[fru::ENTITY_INSTANCE], 1);
		assert_eq!(rec[fru::DEVICE_ID_LEN], 16);
		assert_eq!(&rec[fru::DEVICE_ID..], b"powersupply0_wit");
	}

	#[test]
	fn info() {
		let dir = fixtures::directory();
		assert_eq!(sdr_info(&dir, &[]), [8, SDR_INFO_LUN_FLAGS]);
		assert_eq!(sdr_info(&dir, &[0x00]), [8, SDR_INFO_LUN_FLAGS]);
		assert_eq!(sdr_info(&dir, &[0x01]), [1, SDR_INFO_LUN_FLAGS]);
	}
}
