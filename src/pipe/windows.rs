//! Windows backing for [`super::Pipe`]: named pipes under `\\.\pipe\`.

use super::{Pipe, RawEndpoint};
use crate::{error::Error, os::windows::c_wrappers};
use std::{
	io::{self, Read, Write},
	os::windows::io::{FromRawHandle, RawHandle},
	path::Path,
};

impl Pipe {
	pub(super) fn platform_bind(name: &Path) -> Result<RawEndpoint, Error> {
		let name_str = name.to_string_lossy();
		Ok(c_wrappers::create_named_pipe_server(&name_str, true)?)
	}

	pub(super) fn platform_accept(listener: &RawEndpoint) -> Result<RawEndpoint, Error> {
		c_wrappers::connect_named_pipe(listener)?;
		// The "accepted" endpoint on Windows is the same handle the server created; a fresh
		// server instance for subsequent clients is created by the caller's next `listen`/accept
		// cycle, matching `CreateNamedPipeW`'s per-instance model.
		c_wrappers::duplicate_inheritable(listener.as_raw()).map_err(Error::from)
	}

	pub(super) fn platform_connect(name: &Path) -> Result<RawEndpoint, Error> {
		let name_str = name.to_string_lossy();
		Ok(c_wrappers::open_named_pipe_client(&name_str)?)
	}

	pub(super) fn platform_link() -> Result<(RawEndpoint, RawEndpoint), Error> {
		let name = c_wrappers::unique_pipe_name("link");
		let server = c_wrappers::create_named_pipe_server(&name, true)?;
		let client = c_wrappers::open_named_pipe_client(&name)?;
		c_wrappers::connect_named_pipe(&server)?;
		Ok((server, client))
	}

	pub(super) fn apply_nonblocking_unless_spawn_safe(
		_handle: &RawEndpoint,
		_spawn_safe: bool,
	) -> io::Result<()> {
		// Named pipes opened with FILE_FLAG_OVERLAPPED (as `c_wrappers` always does) are already
		// "non-blocking" in the sense the POSIX side means; there is no Windows equivalent knob
		// to flip per spawn-safety the way `O_NONBLOCK` works on POSIX.
		Ok(())
	}

	pub(super) fn platform_drop(_handle: RawEndpoint) {
		// `RawEndpoint` is a `FileHandle`, which closes itself on drop.
	}

	/// Writes `buf` to the pipe's underlying handle, blocking until the whole buffer is written.
	pub fn write_blocking(&mut self, buf: &[u8]) -> io::Result<()> {
		let handle = self.raw_handle().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
		let mut file = std::mem::ManuallyDrop::new(unsafe { std::fs::File::from_raw_handle(handle) });
		file.write_all(buf)
	}

	/// Reads until EOF from the pipe's underlying handle, blocking.
	pub fn read_to_end_blocking(&mut self) -> io::Result<Vec<u8>> {
		let handle = self.raw_handle().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
		let mut file = std::mem::ManuallyDrop::new(unsafe { std::fs::File::from_raw_handle(handle) });
		let mut out = Vec::new();
		file.read_to_end(&mut out)?;
		Ok(out)
	}

	fn raw_handle(&self) -> Option<RawHandle> {
		self.endpoint.as_ref().map(|h| h.as_raw() as RawHandle)
	}

	/// The raw handle backing this pipe, if any.
	#[must_use]
	pub fn as_raw_handle(&self) -> Option<RawHandle> {
		self.raw_handle()
	}
}
