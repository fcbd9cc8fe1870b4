//! Child-process spawn, exit-notification plumbing, kill/signal delivery, and handle
//! close/teardown. See §4.5 (POSIX) and §4.6 (Windows).

use crate::{
	error::{Error, ErrorKind},
	handle::{bitflags_like::bitflags, HandleBase, HandleKind},
	stdio::StdioContainer,
};
use std::{
	path::PathBuf,
	sync::{Arc, Mutex},
};

#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

bitflags! {
	/// Process spawn flags, per the external interface in §6.
	pub struct ProcessFlags: u8 {
		/// POSIX: `setsid` the child. Windows: `DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP`.
		const DETACHED = 0b0000_0001;
		/// POSIX only: apply `uid` via `setuid` (after a best-effort `setgroups(0, NULL)`).
		const SETUID = 0b0000_0010;
		/// POSIX only: apply `gid` via `setgid`.
		const SETGID = 0b0000_0100;
		/// Windows only: pass `CREATE_NO_WINDOW`-equivalent hiding to the child console.
		const WINDOWS_HIDE = 0b0000_1000;
		/// Windows only: treat `args` as already quoted; join verbatim.
		const WINDOWS_VERBATIM_ARGUMENTS = 0b0001_0000;
		/// POSIX only: reset `SIGPIPE` to `SIG_DFL` in the child before `exec`.
		const RESET_SIGPIPE = 0b0010_0000;
	}
}

/// Options for [`Process::spawn`], per the external interface in §6.
pub struct ProcessOptions {
	/// The program to execute. Required.
	pub file: String,
	/// `argv`, conventionally including `argv[0]` as the first element.
	pub args: Vec<String>,
	/// `NAME=VALUE` pairs; `None` means "inherit the current process's environment".
	pub env: Option<Vec<(String, String)>>,
	/// Working directory; `None` means "inherit".
	pub cwd: Option<PathBuf>,
	/// Per-slot stdio plan, per §4.4.
	pub stdio: Vec<StdioContainer>,
	/// Spawn flags.
	pub flags: ProcessFlags,
	/// POSIX: the uid to switch to when [`ProcessFlags::SETUID`] is set.
	pub uid: Option<u32>,
	/// POSIX: the gid to switch to when [`ProcessFlags::SETGID`] is set.
	pub gid: Option<u32>,
}

impl Default for ProcessOptions {
	fn default() -> Self {
		Self {
			file: String::new(),
			args: Vec::new(),
			env: None,
			cwd: None,
			stdio: Vec::new(),
			flags: ProcessFlags(0),
			uid: None,
			gid: None,
		}
	}
}

/// The exit callback signature, per §6: `(exit_code, term_signal)`. Normal termination sets
/// `term_signal = 0`; POSIX signal termination sets `exit_code = 0` and `term_signal` to the
/// signal; spawn failure sets `exit_code = 127`.
pub type ExitCallback = Box<dyn FnOnce(i32, i32) + Send + 'static>;

pub(crate) struct ProcessShared {
	pub(crate) exit_cb: Option<ExitCallback>,
	pub(crate) exit_result: Option<(i32, i32)>,
}

/// A spawned child process handle, per the data model in §3.
///
/// The process handle is retained by the parent even after the child exits, until the user calls
/// [`Process::close`]; exit-code retrieval through [`Process::exit_status`] is therefore always
/// possible between observing exit and closing.
pub struct Process {
	base: HandleBase,
	pid: u32,
	pub(crate) shared: Arc<Mutex<ProcessShared>>,
	#[cfg(windows)]
	pub(crate) platform: windows::WindowsProcessState,
}

impl Process {
	/// The child's process ID (POSIX) or `dwProcessId` (Windows).
	#[must_use]
	pub fn pid(&self) -> u32 {
		self.pid
	}

	/// Whether the exit callback has already fired.
	#[must_use]
	pub fn has_exited(&self) -> bool {
		self.shared.lock().unwrap_or_else(|e| e.into_inner()).exit_result.is_some()
	}

	/// The `(exit_code, term_signal)` pair observed so far, if the child has exited.
	#[must_use]
	pub fn exit_status(&self) -> Option<(i32, i32)> {
		self.shared.lock().unwrap_or_else(|e| e.into_inner()).exit_result
	}

	/// **close.** Marks the handle closing; §4.6's "Close" contract (unregister the Windows wait,
	/// re-register a one-shot close-wait) and the POSIX equivalent (simply drop) are handled by
	/// the platform module's `Drop`/explicit teardown. After this call the user must not invoke
	/// any other operation on the handle (§5).
	pub fn close(&mut self) {
		self.base.begin_close();
		self.platform_close();
	}

	fn ensure_open(&self) -> Result<(), Error> {
		if self.base.is_closing() {
			return Err(Error::from(ErrorKind::Inval));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_options_have_no_stdio() {
		let opts = ProcessOptions::default();
		assert!(opts.stdio.is_empty());
		assert!(opts.env.is_none());
	}
}
