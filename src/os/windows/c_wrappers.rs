//! Thin wrappers around the Win32 calls the pipe and process components share: UTF-16
//! conversion, named-pipe creation, inheritable handle duplication, and the CRT stdio hand-off
//! buffer described in §6.

use super::file_handle::FileHandle;
use crate::misc::HandleOrErrno;
use std::{ffi::OsStr, io, os::windows::ffi::OsStrExt, path::Path};
use widestring::U16CString;
use windows_sys::Win32::{
	Foundation::{DuplicateHandle, DUPLICATE_SAME_ACCESS, GENERIC_READ, GENERIC_WRITE, HANDLE},
	Storage::FileSystem::{
		CreateFileW, GetFileType, FILE_ATTRIBUTE_NORMAL, FILE_FLAG_OVERLAPPED, FILE_TYPE_DISK,
		FILE_TYPE_PIPE, OPEN_EXISTING,
	},
	System::Pipes::{
		ConnectNamedPipe, CreateNamedPipeW, PIPE_ACCESS_DUPLEX, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE,
		PIPE_UNLIMITED_INSTANCES, PIPE_WAIT,
	},
	System::Threading::GetCurrentProcess,
};

/// Converts a UTF-8 Rust string into a null-terminated UTF-16 buffer suitable for `*const u16`
/// Win32 parameters.
pub fn to_wide(s: &str) -> U16CString {
	U16CString::from_os_str(OsStr::new(s)).expect("embedded NUL in Windows string argument")
}

fn to_wide_path(p: &Path) -> U16CString {
	let wide: Vec<u16> = p.as_os_str().encode_wide().collect();
	U16CString::from_vec(wide).expect("embedded NUL in path")
}

/// A generated, per-spawn-unique named-pipe path under `\\.\pipe\`, so concurrent
/// `CREATE_PIPE` stdio allocations never collide (§4.4).
#[must_use]
pub fn unique_pipe_name(tag: &str) -> String {
	// A real implementation would use a CSPRNG; `std`'s `RandomState` hasher gives us
	// process-local uniqueness without adding a dependency purely for this.
	use std::hash::{BuildHasher, Hash, Hasher};
	let mut hasher = std::collections::hash_map::RandomState::new().build_hasher();
	(tag, std::process::id(), std::time::SystemTime::now()).hash(&mut hasher);
	format!(r"\\.\pipe\uvcore-{:016x}", hasher.finish())
}

/// Creates the server end of a named pipe used as one end of a `CREATE_PIPE` stdio slot or a
/// bound [`crate::pipe::Pipe`] listener.
pub fn create_named_pipe_server(name: &str, first_instance: bool) -> io::Result<FileHandle> {
	let wide = to_wide(name);
	let mut open_mode = PIPE_ACCESS_DUPLEX | FILE_FLAG_OVERLAPPED;
	if first_instance {
		open_mode |= windows_sys::Win32::Storage::FileSystem::FILE_FLAG_FIRST_PIPE_INSTANCE;
	}
	let handle = unsafe {
		CreateNamedPipeW(
			wide.as_ptr(),
			open_mode,
			PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
			PIPE_UNLIMITED_INSTANCES,
			65536,
			65536,
			0,
			std::ptr::null(),
		)
	};
	FileHandle::checked(handle)
}

/// Opens the client end of a named pipe for `connect` (§4.1).
pub fn open_named_pipe_client(name: &str) -> io::Result<FileHandle> {
	let wide = to_wide(name);
	let handle = unsafe {
		CreateFileW(
			wide.as_ptr(),
			GENERIC_READ | GENERIC_WRITE,
			0,
			std::ptr::null(),
			OPEN_EXISTING,
			FILE_FLAG_OVERLAPPED,
			std::ptr::null_mut(),
		)
	};
	FileHandle::checked(handle)
}

/// Issues `ConnectNamedPipe`, treating `ERROR_PIPE_CONNECTED` (a client connected between
/// creation and the call) as success rather than an error.
pub fn connect_named_pipe(handle: &FileHandle) -> io::Result<()> {
	let ok = unsafe { ConnectNamedPipe(handle.as_raw(), std::ptr::null_mut()) };
	if ok != 0 {
		return Ok(());
	}
	let err = io::Error::last_os_error();
	if err.raw_os_error() == Some(windows_sys::Win32::Foundation::ERROR_PIPE_CONNECTED as i32) {
		return Ok(());
	}
	Err(err)
}

/// Duplicates `handle` as an inheritable handle in the current process, used both for stdio
/// `INHERIT_FD`/`INHERIT_HANDLE`/`INHERIT_STREAM` plans and for the child end of a `CREATE_PIPE`
/// slot.
pub fn duplicate_inheritable(handle: HANDLE) -> io::Result<FileHandle> {
	let current = unsafe { GetCurrentProcess() };
	let mut dup: HANDLE = std::ptr::null_mut();
	let ok = unsafe {
		DuplicateHandle(
			current,
			handle,
			current,
			&mut dup,
			0,
			1, // bInheritHandle = TRUE
			DUPLICATE_SAME_ACCESS,
		)
	};
	(ok != 0).then_some(()).ok_or_else(io::Error::last_os_error)?;
	dup.handle_or_errno().map(|h| unsafe { FileHandle::from_raw(h) })
}

/// Opens `\\.\NUL` (or a real file) for a stdio `IGNORE` slot (§4.4), with the access direction
/// matching the stream (read for fd 0, write for 1/2).
pub fn open_nul(writable: bool) -> io::Result<FileHandle> {
	let wide = to_wide("NUL");
	let access = if writable { GENERIC_WRITE } else { GENERIC_READ };
	let handle = unsafe {
		CreateFileW(
			wide.as_ptr(),
			access,
			0,
			std::ptr::null(),
			OPEN_EXISTING,
			FILE_ATTRIBUTE_NORMAL,
			std::ptr::null_mut(),
		)
	};
	FileHandle::checked(handle)
}

/// `crt_flags` bits for the CRT stdio hand-off buffer (§6).
pub mod crt_flags {
	/// `FOPEN`: the slot is open.
	pub const FOPEN: u8 = 0x01;
	/// `FPIPE`: the underlying handle is a pipe.
	pub const FPIPE: u8 = 0x08;
	/// `FDEV`: the underlying handle is a character device (e.g. `NUL`, a console).
	pub const FDEV: u8 = 0x40;
}

/// `crt_flags` byte for a single stdio handle, queried with `GetFileType` rather than assumed from
/// the slot index (§6): a disk file is `FOPEN`, a pipe is `FOPEN|FPIPE`, and anything else
/// (console, `NUL`, or a type `GetFileType` can't classify) is treated as `FOPEN|FDEV`, matching
/// the CRT's own disk/pipe/device trichotomy.
#[must_use]
pub fn crt_flags_for_handle(handle: HANDLE) -> u8 {
	use crt_flags::{FDEV, FOPEN, FPIPE};
	match unsafe { GetFileType(handle) } {
		FILE_TYPE_DISK => FOPEN,
		FILE_TYPE_PIPE => FOPEN | FPIPE,
		// FILE_TYPE_CHAR (NUL, a console) and FILE_TYPE_UNKNOWN both fall back to FDEV.
		_ => FOPEN | FDEV,
	}
}

/// Builds the `lpReserved2`-formatted buffer the CRT expects to reconstruct fds 0..N-1, per §6:
/// `int32 count`, then `count` flag bytes, then `count` `uintptr` handles.
#[must_use]
pub fn build_crt_stdio_buffer(slots: &[(u8, HANDLE)]) -> Vec<u8> {
	let count = slots.len() as u32;
	let mut buf = Vec::with_capacity(4 + slots.len() + slots.len() * std::mem::size_of::<usize>());
	buf.extend_from_slice(&count.to_ne_bytes());
	for (flags, _) in slots {
		buf.push(*flags);
	}
	for (_, handle) in slots {
		buf.extend_from_slice(&(*handle as usize).to_ne_bytes());
	}
	buf
}

/// Encodes a sorted list of `NAME=VALUE` entries into the double-NUL-terminated UTF-16
/// environment block `CreateProcessW` expects with `CREATE_UNICODE_ENVIRONMENT`.
#[must_use]
pub fn encode_env_block(entries: &[String]) -> Vec<u16> {
	let mut block = Vec::new();
	for entry in entries {
		block.extend(entry.encode_utf16());
		block.push(0);
	}
	block.push(0);
	block
}

pub(crate) fn path_to_wide(p: &Path) -> U16CString {
	to_wide_path(p)
}
