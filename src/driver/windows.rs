//! The Windows reference driver: an I/O completion port fed by
//! `RegisterWaitForSingleObject` thread-pool callbacks.

use super::{Completion, Driver, Interest, PostedQueue};
use std::{collections::HashMap, io, ptr};
use windows_sys::Win32::{
	Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE},
	System::IO::{CreateIoCompletionPort, GetQueuedCompletionStatus, OVERLAPPED},
};

/// Completion key used for entries posted via [`EventLoop::post`]; process-exit completions
/// posted by a `RegisterWaitForSingleObject` callback use their own per-process key (the process's
/// PID), so the driver can tell the two apart without a payload on the OVERLAPPED itself.
const POSTED_KEY: usize = 0;

/// An IOCP-based reference reactor.
///
/// `register`/`deregister` are no-ops here: in the CRT model, readiness on pipes and process exit
/// both arrive as completions already associated with this port (named-pipe overlapped I/O
/// completes directly against it; process exit is funneled in by
/// [`RegisterWaitForSingleObject`](crate::process::windows) callbacks that call
/// [`EventLoop::post`]). The `Interest` parameter exists only so the trait is symmetric with the
/// POSIX driver.
pub struct EventLoop {
	port: HANDLE,
	posted: PostedQueue,
	_regs: HashMap<usize, Interest>,
}

// SAFETY: `HANDLE` here is an IOCP handle, which the Win32 API documents as safe to use
// concurrently from multiple threads; this type only ever hands it to API calls that expect
// exactly that.
unsafe impl Send for EventLoop {}

impl EventLoop {
	/// Creates a new completion port to back this loop.
	pub fn new() -> io::Result<Self> {
		let port = unsafe { CreateIoCompletionPort(INVALID_HANDLE_VALUE, ptr::null_mut(), 0, 0) };
		if port.is_null() {
			return Err(io::Error::last_os_error());
		}
		Ok(Self { port, posted: PostedQueue::new(), _regs: HashMap::new() })
	}

	/// The raw completion port handle, used by [`crate::process::windows`] to register process
	/// handles for completion delivery.
	pub fn raw_port(&self) -> HANDLE {
		self.port
	}
}

impl Driver for EventLoop {
	fn register(&mut self, _token: usize, _interest: Interest) -> io::Result<()> {
		Ok(())
	}

	fn deregister(&mut self, _token: usize) {}

	fn post(&mut self, completion: Completion) {
		self.posted.push(completion);
		let overlapped = Box::into_raw(Box::new(unsafe { std::mem::zeroed::<OVERLAPPED>() }));
		// SAFETY: `port` was created by this struct and stays open for its lifetime; `overlapped`
		// is a freshly boxed, leaked allocation reclaimed in `run_once` below.
		let ok = unsafe {
			windows_sys::Win32::System::IO::PostQueuedCompletionStatus(
				self.port,
				0,
				POSTED_KEY,
				overlapped,
			)
		};
		if ok == 0 {
			// Reclaim to avoid leaking if the post itself failed; the completion stays queued
			// in `self.posted` and will run on the next `run_once` regardless.
			unsafe { drop(Box::from_raw(overlapped)) };
		}
	}

	fn run_once(&mut self) -> io::Result<()> {
		let mut bytes = 0u32;
		let mut key = 0usize;
		let mut overlapped: *mut OVERLAPPED = ptr::null_mut();
		let timeout_ms = 50;
		// SAFETY: all three out-parameters are valid to write to for the duration of the call.
		let ok = unsafe {
			GetQueuedCompletionStatus(self.port, &mut bytes, &mut key, &mut overlapped, timeout_ms)
		};
		if ok == 0 && overlapped.is_null() {
			// Timeout; nothing completed this iteration.
			return Ok(());
		}
		if !overlapped.is_null() && key == POSTED_KEY {
			// SAFETY: this pointer was leaked by `post` above and is only ever retrieved once.
			unsafe { drop(Box::from_raw(overlapped)) };
		}
		if key == POSTED_KEY {
			if let Some(c) = self.posted.pop_one() {
				c.run();
			}
		} else {
			// A process-exit or pipe-I/O completion; dispatched by whichever subsystem owns
			// `key` (the process PID or pipe token). Left to the caller to look up and invoke,
			// since this driver has no compile-time dependency on `process`/`pipe`.
			log::trace!("iocp completion for key={key}");
		}
		Ok(())
	}
}

impl Drop for EventLoop {
	fn drop(&mut self) {
		unsafe { CloseHandle(self.port) };
	}
}
