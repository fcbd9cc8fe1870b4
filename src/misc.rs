#![allow(dead_code)]

#[cfg(unix)]
use std::os::unix::io::RawFd;
use std::io;
#[cfg(windows)]
use windows_sys::Win32::Foundation::{HANDLE, INVALID_HANDLE_VALUE};

pub(crate) trait OrErrno<T>: Sized {
	fn true_or_errno(self, f: impl FnOnce() -> T) -> io::Result<T>;
	#[inline(always)]
	fn true_val_or_errno(self, value: T) -> io::Result<T> {
		self.true_or_errno(|| value)
	}
	fn false_or_errno(self, f: impl FnOnce() -> T) -> io::Result<T>;
	#[inline(always)]
	fn false_val_or_errno(self, value: T) -> io::Result<T> {
		self.true_or_errno(|| value)
	}
}
impl<B: ToBool, T> OrErrno<T> for B {
	#[inline]
	fn true_or_errno(self, f: impl FnOnce() -> T) -> io::Result<T> {
		if self.to_bool() {
			Ok(f())
		} else {
			Err(io::Error::last_os_error())
		}
	}
	fn false_or_errno(self, f: impl FnOnce() -> T) -> io::Result<T> {
		if !self.to_bool() {
			Ok(f())
		} else {
			Err(io::Error::last_os_error())
		}
	}
}

#[cfg(unix)]
pub(crate) trait FdOrErrno: Sized {
	fn fd_or_errno(self) -> io::Result<Self>;
}
#[cfg(unix)]
impl FdOrErrno for RawFd {
	#[inline]
	fn fd_or_errno(self) -> io::Result<Self> {
		(self != -1).true_val_or_errno(self)
	}
}

#[cfg(windows)]
pub(crate) trait HandleOrErrno: Sized {
	fn handle_or_errno(self) -> io::Result<Self>;
}
#[cfg(windows)]
impl HandleOrErrno for HANDLE {
	#[inline]
	fn handle_or_errno(self) -> io::Result<Self> {
		(self != INVALID_HANDLE_VALUE).true_val_or_errno(self)
	}
}

pub(crate) trait ToBool {
	fn to_bool(self) -> bool;
}
impl ToBool for bool {
	#[inline(always)]
	fn to_bool(self) -> bool {
		self
	}
}
impl ToBool for i32 {
	#[inline(always)]
	fn to_bool(self) -> bool {
		self != 0
	}
}
