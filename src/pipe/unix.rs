//! POSIX backing for [`super::Pipe`]: `AF_UNIX` stream sockets and `socketpair`.

use super::{Pipe, RawEndpoint};
use crate::{error::Error, os::unix::c_wrappers};
use std::{
	io::{self, Read, Write},
	os::unix::io::RawFd,
	path::Path,
};

impl Pipe {
	pub(super) fn platform_bind(name: &Path) -> Result<RawEndpoint, Error> {
		Ok(c_wrappers::bind_unix_stream(name)?)
	}

	pub(super) fn platform_accept(listener: &RawEndpoint) -> Result<RawEndpoint, Error> {
		Ok(c_wrappers::accept_stream(*listener)?)
	}

	pub(super) fn platform_connect(name: &Path) -> Result<RawEndpoint, Error> {
		// Non-blocking so `connect(2)` actually returns `EINPROGRESS`/`EAGAIN` rather than blocking
		// until the peer accepts, per §4.1's "issues a non-blocking connect".
		let fd = unsafe {
			libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, 0)
		};
		if fd < 0 {
			return Err(io::Error::last_os_error().into());
		}
		if let Err(e) = c_wrappers::connect_unix_stream(fd, name) {
			unsafe { libc::close(fd) };
			return Err(e.into());
		}
		Ok(fd)
	}

	pub(super) fn platform_link() -> Result<(RawEndpoint, RawEndpoint), Error> {
		Ok(c_wrappers::socketpair_stream()?)
	}

	pub(super) fn apply_nonblocking_unless_spawn_safe(
		fd: &RawEndpoint,
		spawn_safe: bool,
	) -> io::Result<()> {
		if !spawn_safe {
			c_wrappers::set_nonblocking(*fd, true)?;
		}
		Ok(())
	}

	pub(super) fn platform_drop(fd: RawEndpoint) {
		unsafe { libc::close(fd) };
	}

	/// Writes `buf` to the pipe's underlying fd, blocking until the whole buffer is written.
	/// Used by tests and by callers that have disabled non-blocking mode; the production
	/// readiness-driven path goes through the driver instead.
	pub fn write_blocking(&mut self, buf: &[u8]) -> io::Result<()> {
		let fd = self.endpoint.ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
		let mut file = std::mem::ManuallyDrop::new(unsafe {
			<std::fs::File as std::os::unix::io::FromRawFd>::from_raw_fd(fd)
		});
		file.write_all(buf)
	}

	/// Reads until EOF from the pipe's underlying fd, blocking.
	pub fn read_to_end_blocking(&mut self) -> io::Result<Vec<u8>> {
		let fd = self.endpoint.ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
		c_wrappers::set_nonblocking(fd, false)?;
		let mut file = std::mem::ManuallyDrop::new(unsafe {
			<std::fs::File as std::os::unix::io::FromRawFd>::from_raw_fd(fd)
		});
		let mut out = Vec::new();
		file.read_to_end(&mut out)?;
		Ok(out)
	}

	/// The raw fd backing this pipe, if any.
	#[must_use]
	pub fn as_raw_fd(&self) -> Option<RawFd> {
		self.endpoint
	}
}
