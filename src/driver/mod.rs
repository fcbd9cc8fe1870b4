//! The narrow interface this core needs from an event loop.
//!
//! The event loop itself (poll/kqueue/IOCP proper) is an explicit non-goal: this crate is the
//! process/pipe core, not a general-purpose reactor. What the core *does* need from whatever loop
//! hosts it is exactly four things, captured in [`Driver`]:
//!
//! - registering a readable/writable interest on a descriptor (pipes),
//! - a single-shot "completion post" primitive used to defer callback delivery to the next loop
//!   iteration (the ordering guarantee in §5: exit/connect callbacks never fire synchronously),
//! - a signal watcher primitive (POSIX SIGCHLD),
//! - an endgame pass that the driver runs once per iteration to finish closing handles.
//!
//! [`EventLoop`] is the minimal concrete driver shipped so the crate is runnable standalone: a
//! `libc::poll`-based reactor with a self-pipe for signal delivery on POSIX, and an I/O completion
//! port fed by `RegisterWaitForSingleObject` thread-pool callbacks on Windows. It is a reference
//! reactor, not a replacement for mio/tokio.

use std::io;

mod posted;
pub use posted::{Completion, PostedQueue};

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::EventLoop;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::EventLoop;

/// Readiness direction a [`Driver`] is asked to watch a descriptor for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Interest {
	/// Notify when the descriptor becomes readable (e.g. a pipe server socket with a pending
	/// connection).
	Readable,
	/// Notify when the descriptor becomes writable.
	Writable,
}

/// The trait the process/pipe core depends on instead of owning a full reactor.
///
/// A loop implementation registers interest, posts deferred completions, and runs the endgame
/// pass that finishes closing handles whose resources could not be released synchronously.
pub trait Driver {
	/// Registers interest in `fd`/`handle` becoming ready in the given direction. The driver
	/// delivers readiness by invoking the registered pipe's internal readiness hook on its next
	/// iteration; this trait only describes registration, not a callback type, because the
	/// concrete hook lives on the handle itself (mirrors the loop-owns-handles data model).
	fn register(&mut self, token: usize, interest: Interest) -> io::Result<()>;

	/// Removes a previously registered interest. Safe to call on a token that was never
	/// registered or already removed.
	fn deregister(&mut self, token: usize);

	/// Queues a zero-argument completion to run on a subsequent loop iteration — never
	/// synchronously from within the call that queues it. This is how spawn failures, connect
	/// failures, and close callbacks honour the "always asynchronous" ordering guarantee.
	fn post(&mut self, completion: Completion);

	/// Runs one iteration: waits for readiness/signals/completions, dispatches them, then runs
	/// the endgame pass for any handle that finished closing this iteration.
	fn run_once(&mut self) -> io::Result<()>;
}
