//! An owned, closing-on-drop wrapper around a Win32 `HANDLE`.

use crate::misc::HandleOrErrno;
use std::io;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};

/// RAII wrapper around a `HANDLE`, closing it on drop unless [`FileHandle::into_raw`] was called.
///
/// Mirrors the teacher's own `FileHandle` in spirit (own-and-close-on-drop), generalised here to
/// any handle kind rather than just file handles, since pipes, events and process handles all
/// need the same ownership discipline in this crate.
#[derive(Debug)]
pub struct FileHandle(HANDLE);

impl FileHandle {
	/// Takes ownership of an already-valid handle.
	///
	/// # Safety
	/// `handle` must be a valid, uniquely owned `HANDLE` that this wrapper is allowed to close.
	pub unsafe fn from_raw(handle: HANDLE) -> Self {
		Self(handle)
	}

	/// Wraps a handle returned by a Win32 API that signals failure with `INVALID_HANDLE_VALUE`.
	pub fn checked(handle: HANDLE) -> io::Result<Self> {
		handle.handle_or_errno().map(Self)
	}

	/// The raw handle value, borrowed.
	#[must_use]
	pub fn as_raw(&self) -> HANDLE {
		self.0
	}

	/// Releases ownership without closing, returning the raw handle.
	#[must_use]
	pub fn into_raw(self) -> HANDLE {
		let h = self.0;
		std::mem::forget(self);
		h
	}
}

impl Drop for FileHandle {
	fn drop(&mut self) {
		if self.0 != INVALID_HANDLE_VALUE && !self.0.is_null() {
			unsafe { CloseHandle(self.0) };
		}
	}
}

// SAFETY: a Win32 HANDLE is an opaque kernel object reference; moving it across threads is sound,
// the Win32 API itself is what defines per-handle thread-safety for the operations performed on
// it.
unsafe impl Send for FileHandle {}
