//! A platform-neutral error type for the process/pipe core.
//!
//! OS-facing call sites throughout the crate keep returning `io::Result` (via the
//! [`OrErrno`](crate::misc::OrErrno)/`FdOrErrno`/`HandleOrErrno` helpers in [`misc`](crate::misc)), and
//! convert to [`Error`] only at the public API boundary, where callers need a closed, matchable set
//! of kinds rather than raw OS error codes.

use std::io;
use thiserror::Error as ThisError;

/// Platform-neutral error kind, as required by the error handling design: every public operation
/// that can fail reports one of these, with the native error preserved for display and for
/// `Other`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
	/// Invalid argument (`EINVAL` / `ERROR_INVALID_PARAMETER` and relatives).
	Inval,
	/// Out of memory (`ENOMEM` / `ERROR_NOT_ENOUGH_MEMORY`).
	Nomem,
	/// Permission denied (`EACCES` / `ERROR_ACCESS_DENIED`).
	Acces,
	/// No such file or directory (`ENOENT` / `ERROR_FILE_NOT_FOUND` / `ERROR_PATH_NOT_FOUND`).
	Noent,
	/// Bad file descriptor/handle (`EBADF` / `ERROR_INVALID_HANDLE`).
	Badf,
	/// Is a directory (`EISDIR`).
	Isdir,
	/// Not a directory (`ENOTDIR`).
	Notdir,
	/// No such process (`ESRCH`).
	Srch,
	/// Function not implemented on this platform (`ENOSYS`).
	Nosys,
	/// Operation not supported in this configuration.
	Notsup,
	/// Broken pipe (`EPIPE` / `ERROR_BROKEN_PIPE` / `ERROR_NO_DATA`).
	Pipe,
	/// Connection reset by peer (`ECONNRESET`).
	Connreset,
	/// Resource temporarily unavailable (`EAGAIN`/`EWOULDBLOCK`, or `ERROR_PIPE_BUSY`).
	Again,
	/// Any OS error this crate does not classify further. The native code is preserved.
	Other,
}

/// The error type returned from the public API of this crate.
///
/// Internally, OS call sites keep working with `io::Result`; this type is produced only when
/// crossing the public API boundary (see the module docs).
#[derive(Debug, ThisError)]
#[error("{kind:?}: {source}")]
pub struct Error {
	kind: ErrorKind,
	#[source]
	source: io::Error,
}

impl Error {
	/// The platform-neutral kind of this error.
	#[must_use]
	pub fn kind(&self) -> ErrorKind {
		self.kind
	}

	/// The raw OS error code, if this error originated from one.
	#[must_use]
	pub fn raw_os_error(&self) -> Option<i32> {
		self.source.raw_os_error()
	}

	pub(crate) fn new(kind: ErrorKind, source: io::Error) -> Self {
		Self { kind, source }
	}

	pub(crate) fn from_kind(kind: ErrorKind) -> Self {
		let raw = match kind {
			ErrorKind::Inval => libc_errno::EINVAL,
			ErrorKind::Nomem => libc_errno::ENOMEM,
			ErrorKind::Acces => libc_errno::EACCES,
			ErrorKind::Noent => libc_errno::ENOENT,
			ErrorKind::Badf => libc_errno::EBADF,
			ErrorKind::Isdir => libc_errno::EISDIR,
			ErrorKind::Notdir => libc_errno::ENOTDIR,
			ErrorKind::Srch => libc_errno::ESRCH,
			ErrorKind::Nosys => libc_errno::ENOSYS,
			ErrorKind::Notsup => libc_errno::ENOTSUP,
			ErrorKind::Pipe => libc_errno::EPIPE,
			ErrorKind::Connreset => libc_errno::ECONNRESET,
			ErrorKind::Again => libc_errno::EAGAIN,
			ErrorKind::Other => 0,
		};
		Self { kind, source: io::Error::from_raw_os_error(raw) }
	}
}

/// A tiny table of POSIX errno values, duplicated here so `error.rs` does not need to depend on
/// `libc` on Windows just to synthesize an `io::Error` for a given [`ErrorKind`].
#[cfg(unix)]
mod libc_errno {
	pub use libc::{
		EACCES, EAGAIN, EBADF, ECONNRESET, EINVAL, EISDIR, ENOENT, ENOMEM, ENOSYS, ENOTDIR,
		ENOTSUP, EPIPE, ESRCH,
	};
}
#[cfg(windows)]
#[allow(non_upper_case_globals)]
mod libc_errno {
	pub const EINVAL: i32 = 22;
	pub const ENOMEM: i32 = 12;
	pub const EACCES: i32 = 13;
	pub const ENOENT: i32 = 2;
	pub const EBADF: i32 = 9;
	pub const EISDIR: i32 = 21;
	pub const ENOTDIR: i32 = 20;
	pub const ESRCH: i32 = 3;
	pub const ENOSYS: i32 = 38;
	pub const ENOTSUP: i32 = 95;
	pub const EPIPE: i32 = 32;
	pub const ECONNRESET: i32 = 104;
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		let kind = classify(&e);
		Self { kind, source: e }
	}
}

impl From<Error> for io::Error {
	fn from(e: Error) -> Self {
		e.source
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Self {
		Self::from_kind(kind)
	}
}

#[cfg(unix)]
fn classify(e: &io::Error) -> ErrorKind {
	match e.raw_os_error() {
		Some(libc::EINVAL) => ErrorKind::Inval,
		Some(libc::ENOMEM) => ErrorKind::Nomem,
		Some(libc::EACCES) => ErrorKind::Acces,
		Some(libc::ENOENT) => ErrorKind::Noent,
		Some(libc::EBADF) => ErrorKind::Badf,
		Some(libc::EISDIR) => ErrorKind::Isdir,
		Some(libc::ENOTDIR) => ErrorKind::Notdir,
		Some(libc::ESRCH) => ErrorKind::Srch,
		Some(libc::ENOSYS) => ErrorKind::Nosys,
		Some(libc::ENOTSUP) => ErrorKind::Notsup,
		Some(libc::EPIPE) => ErrorKind::Pipe,
		Some(libc::ECONNRESET) => ErrorKind::Connreset,
		Some(libc::EAGAIN) => ErrorKind::Again,
		_ => ErrorKind::Other,
	}
}

#[cfg(windows)]
fn classify(e: &io::Error) -> ErrorKind {
	use windows_sys::Win32::Foundation::{
		ERROR_ACCESS_DENIED, ERROR_BROKEN_PIPE, ERROR_FILE_NOT_FOUND, ERROR_INVALID_HANDLE,
		ERROR_NOT_ENOUGH_MEMORY, ERROR_NO_DATA, ERROR_PATH_NOT_FOUND, ERROR_PIPE_BUSY,
	};
	match e.raw_os_error().map(|c| c as u32) {
		Some(ERROR_FILE_NOT_FOUND) | Some(ERROR_PATH_NOT_FOUND) => ErrorKind::Noent,
		Some(ERROR_ACCESS_DENIED) => ErrorKind::Acces,
		Some(ERROR_INVALID_HANDLE) => ErrorKind::Badf,
		Some(ERROR_NOT_ENOUGH_MEMORY) => ErrorKind::Nomem,
		Some(ERROR_BROKEN_PIPE) | Some(ERROR_NO_DATA) => ErrorKind::Pipe,
		Some(ERROR_PIPE_BUSY) => ErrorKind::Again,
		_ => ErrorKind::Other,
	}
}

/// Shorthand used throughout the public API.
pub type Result<T> = std::result::Result<T, Error>;
