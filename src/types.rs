//! Relatively generic convenience types.

use std::{
	error::Error,
	io::ErrorKind,
};

/// A generic Result type for things that can fail.
pub type ErrResult<T> = Result<T, Box<dyn Error>>;

/// Internal helper for concisely creating an ErrResult.
fn mk_err<E>(kind: ErrorKind, err: E) -> Box<dyn Error>
	where E: Into<Box<dyn Error + Send + Sync>>
{
	Box::new(std::io::Error::new(kind, err))
}

/// Construct an `Error` of kind `ErrorKind::NotFound` with the given payload.
pub fn err_not_found<E>(msg: E) -> Box<dyn Error>
	where E: Into<Box<dyn Error + Send + Sync>>
{
	mk_err(ErrorKind::NotFound, msg)
}

/// Construct an `Error` of kind `ErrorKind::InvalidData` with the given payload.
pub fn err_invalid_data<E>(msg: E) -> Box<dyn Error>
	where E: Into<Box<dyn Error + Send + Sync>>
{
	mk_err(ErrorKind::InvalidData, msg)
}

/// Return the last component of a dbus object path (everything after the final
/// `'/'`), or the whole string if it contains no `'/'`.
pub fn path_leaf(path: &str) -> &str {
	match path.rfind('/') {
		Some(i) => &path[i + 1..],
		None => path,
	}
}

/// Return the second-to-last component of a dbus object path, if there is one.
pub fn path_parent_leaf(path: &str) -> Option<&str> {
	let parent = &path[..path.rfind('/')?];
	if parent.is_empty() {
		None
	} else {
		Some(path_leaf(parent))
	}
}
