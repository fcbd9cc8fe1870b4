//! POSIX spawn, the `SIGCHLD` reaper, and `kill`, per §4.5.

use super::{Process, ProcessFlags, ProcessOptions, ProcessShared};
use crate::{
	driver::Completion,
	error::{Error, ErrorKind},
	handle::{HandleBase, HandleKind},
	os::unix::c_wrappers,
	pipe::{Pipe, PipeFlags},
	stdio::{self, StdioContainer, StdioKind},
};
use std::{
	collections::HashMap,
	ffi::CString,
	io,
	os::unix::io::RawFd,
	sync::{Arc, Mutex, OnceLock},
};

fn registry() -> &'static Mutex<HashMap<i32, Arc<Mutex<ProcessShared>>>> {
	static REG: OnceLock<Mutex<HashMap<i32, Arc<Mutex<ProcessShared>>>>> = OnceLock::new();
	REG.get_or_init(|| Mutex::new(HashMap::new()))
}

/// One resolved stdio slot, computed before `fork` so the child end already exists in the
/// parent's fd table for fork to duplicate (§4.4/§4.5).
enum ResolvedSlot {
	/// Open `/dev/null` inside the child itself; no parent-side fd to pre-create.
	Null { writable: bool },
	/// A real fd that already exists in the parent (a fresh `CREATE_PIPE` child end, or a
	/// caller-supplied `INHERIT_FD`), to be `dup2`-ed into the child's slot.
	Existing { child_fd: RawFd },
}

impl Process {
	/// **Process — POSIX spawn** (§4.5). Always returns a handle, even on failure: a failed
	/// spawn still activates the exit callback path with `exit_code = 127`, matching the
	/// "spawn returns success-shaped" boundary behaviour in §8.
	///
	/// Returns the parent ends of any `CREATE_PIPE` stdio slots alongside the process handle, one
	/// slot per entry in `options.stdio` (padded to at least three with `None` for non-pipe
	/// slots), since Rust's ownership model hands the caller the parent pipe directly rather than
	/// filling an out-parameter the C original relies on.
	pub fn spawn(
		options: ProcessOptions,
		exit_cb: impl FnOnce(i32, i32) + Send + 'static,
	) -> (Self, Vec<Option<Pipe>>) {
		let shared = Arc::new(Mutex::new(ProcessShared {
			exit_cb: Some(Box::new(exit_cb)),
			exit_result: None,
		}));

		let (resolved, parent_pipes) = match resolve_stdio(&options.stdio) {
			Ok(r) => r,
			Err(_) => {
				return (Self::failed(shared), Vec::new());
			}
		};

		match spawn_inner(&options, &resolved) {
			Ok(pid) => {
				registry().lock().unwrap_or_else(|e| e.into_inner()).insert(pid, Arc::clone(&shared));
				log::info!("spawned pid={pid} file={}", options.file);
				let mut base = HandleBase::new(HandleKind::Process);
				base.start();
				(Self { base, pid: pid as u32, shared }, parent_pipes)
			}
			Err(errno) => {
				log::warn!("spawn failed for file={}: errno={errno}", options.file);
				(Self::failed(shared), parent_pipes)
			}
		}
	}

	fn failed(shared: Arc<Mutex<ProcessShared>>) -> Self {
		let mut base = HandleBase::new(HandleKind::Process);
		base.start();
		let mut guard = shared.lock().unwrap_or_else(|e| e.into_inner());
		guard.exit_result = Some((127, 0));
		if let Some(cb) = guard.exit_cb.take() {
			drop(guard);
			cb(127, 0);
		}
		Self { base, pid: 0, shared }
	}

	/// **Kill.** POSIX signal delivery via `kill(2)`. Signal `0` is a liveness probe.
	pub fn kill(&self, signum: i32) -> Result<(), Error> {
		self.ensure_open()?;
		if self.has_exited() {
			return Err(Error::from(ErrorKind::Srch));
		}
		let rc = unsafe { libc::kill(self.pid as libc::pid_t, signum) };
		if rc == 0 {
			return Ok(());
		}
		Err(io::Error::last_os_error().into())
	}

	pub(crate) fn platform_close(&mut self) {
		registry().lock().unwrap_or_else(|e| e.into_inner()).remove(&(self.pid as i32));
	}
}

/// Allocates the child-side fd (and, for `CREATE_PIPE`, the matching parent-side [`Pipe`]) for
/// every stdio slot, per §4.4. Returns the resolved slots plus one parent pipe per entry.
fn resolve_stdio(containers: &[StdioContainer]) -> Result<(Vec<ResolvedSlot>, Vec<Option<Pipe>>), Error> {
	let kinds = stdio::plan(containers)?;
	let mut resolved = Vec::with_capacity(kinds.len());
	let mut parent_pipes = Vec::with_capacity(kinds.len());

	for (i, kind) in kinds.iter().enumerate() {
		match kind {
			StdioKind::Ignore { writable } => {
				resolved.push(ResolvedSlot::Null { writable: *writable });
				parent_pipes.push(None);
			}
			StdioKind::CreatePipe { readable, writable } => {
				let (parent_fd, child_fd) = c_wrappers::socketpair_stream().map_err(Error::from)?;
				// The parent's end must not be inherited by *other* children; the socketpair
				// helper already sets `SOCK_CLOEXEC` on both. Clear it on the child's end only.
				c_wrappers::set_cloexec(child_fd, false).map_err(Error::from)?;
				let mut parent_flags = PipeFlags::default();
				if *readable {
					parent_flags = parent_flags | PipeFlags::READABLE;
				}
				if *writable {
					parent_flags = parent_flags | PipeFlags::WRITABLE;
				}
				let pipe = Pipe::from_raw_with_flags(parent_fd, crate::pipe::PipeState::Connected, parent_flags);
				resolved.push(ResolvedSlot::Existing { child_fd });
				parent_pipes.push(Some(pipe));
			}
			StdioKind::Inherit => {
				let fd = match containers.get(i) {
					Some(StdioContainer::InheritFd(fd)) => *fd,
					_ => return Err(Error::from(ErrorKind::Inval)),
				};
				// Dup the caller's fd rather than taking it directly: the parent loop below closes
				// every `Existing` slot's `child_fd` after fork, and the caller still owns `fd` and
				// keeps using it (§4.4). Clear CLOEXEC on the duplicate only; the caller's own fd is
				// untouched.
				let child_fd = c_wrappers::dup_cloexec(fd).map_err(Error::from)?;
				c_wrappers::set_cloexec(child_fd, false).map_err(Error::from)?;
				resolved.push(ResolvedSlot::Existing { child_fd });
				parent_pipes.push(None);
			}
			StdioKind::InheritStream => {
				// Extracting the OS fd from a live TTY/connected-pipe stream object is left to
				// the caller: hand them `/dev/null` rather than silently misbehaving, logging
				// that the intent degraded.
				log::warn!("InheritStream stdio slot {i} has no backing fd in this reference driver; falling back to /dev/null");
				resolved.push(ResolvedSlot::Null { writable: i != 0 });
				parent_pipes.push(None);
			}
		}
	}

	Ok((resolved, parent_pipes))
}

fn spawn_inner(options: &ProcessOptions, plan: &[ResolvedSlot]) -> Result<i32, i32> {
	let mask = c_wrappers::block_all_signals().map_err(|e| e.raw_os_error().unwrap_or(libc::EINVAL))?;

	let (err_read, err_write) = match c_wrappers::pipe_cloexec() {
		Ok(fds) => fds,
		Err(e) => {
			let _ = c_wrappers::restore_signal_mask(&mask);
			return Err(e.raw_os_error().unwrap_or(libc::EIO));
		}
	};

	let file_c = CString::new(options.file.as_str()).map_err(|_| libc::EINVAL)?;
	let args_c: Vec<CString> =
		options.args.iter().map(|a| CString::new(a.as_str()).unwrap_or_default()).collect();
	let mut argv: Vec<*const libc::c_char> = args_c.iter().map(|a| a.as_ptr()).collect();
	if argv.is_empty() {
		argv.push(file_c.as_ptr());
	}
	argv.push(std::ptr::null());

	let env_cstrings: Option<Vec<CString>> = options.env.as_ref().map(|vars| {
		vars.iter().map(|(k, v)| CString::new(format!("{k}={v}")).unwrap_or_default()).collect()
	});
	let mut envp: Vec<*const libc::c_char> = Vec::new();
	if let Some(cs) = &env_cstrings {
		envp = cs.iter().map(|c| c.as_ptr()).collect();
		envp.push(std::ptr::null());
	}

	let cwd_c =
		options.cwd.as_ref().map(|p| CString::new(p.to_string_lossy().as_bytes()).unwrap_or_default());

	let detach = options.flags.contains(ProcessFlags::DETACHED);
	let reset_sigpipe = options.flags.contains(ProcessFlags::RESET_SIGPIPE);
	let do_setuid = options.flags.contains(ProcessFlags::SETUID);
	let do_setgid = options.flags.contains(ProcessFlags::SETGID);

	let pid = unsafe { libc::fork() };
	if pid < 0 {
		let errno = io::Error::last_os_error().raw_os_error().unwrap_or(libc::EAGAIN);
		unsafe {
			libc::close(err_read);
			libc::close(err_write);
		}
		let _ = c_wrappers::restore_signal_mask(&mask);
		return Err(errno);
	}

	if pid == 0 {
		unsafe { libc::close(err_read) };
		child_main(ChildArgs {
			file: &file_c,
			argv: &argv,
			envp: if env_cstrings.is_some() { Some(&envp) } else { None },
			cwd: cwd_c.as_ref(),
			plan,
			saved_mask: &mask,
			detach,
			reset_sigpipe,
			do_setuid,
			do_setgid,
			uid: options.uid,
			gid: options.gid,
			err_write,
		});
	}

	unsafe { libc::close(err_write) };
	let _ = c_wrappers::restore_signal_mask(&mask);

	// The parent closes its copy of every child-side fd now that fork has duplicated the table;
	// the child keeps using its own copy until exec (or until `child_main` exits).
	for slot in plan {
		if let ResolvedSlot::Existing { child_fd } = slot {
			unsafe { libc::close(*child_fd) };
		}
	}

	let mut buf = [0u8; 4];
	let mut got = 0usize;
	loop {
		let n = unsafe { libc::read(err_read, buf.as_mut_ptr().add(got).cast(), buf.len() - got) };
		if n == 0 {
			break;
		}
		if n < 0 {
			let e = io::Error::last_os_error();
			if e.raw_os_error() == Some(libc::EINTR) {
				continue;
			}
			break;
		}
		got += n as usize;
		if got == buf.len() {
			break;
		}
	}
	unsafe { libc::close(err_read) };

	if got == buf.len() {
		let errno = i32::from_ne_bytes(buf);
		let _ = unsafe { libc::waitpid(pid, std::ptr::null_mut(), 0) };
		return Err(errno);
	}

	Ok(pid)
}

struct ChildArgs<'a> {
	file: &'a CString,
	argv: &'a [*const libc::c_char],
	envp: Option<&'a [*const libc::c_char]>,
	cwd: Option<&'a CString>,
	plan: &'a [ResolvedSlot],
	saved_mask: &'a libc::sigset_t,
	detach: bool,
	reset_sigpipe: bool,
	do_setuid: bool,
	do_setgid: bool,
	uid: Option<u32>,
	gid: Option<u32>,
	err_write: libc::c_int,
}

fn child_main(a: ChildArgs<'_>) -> ! {
	let report_and_exit = |errno: i32| -> ! {
		let bytes = errno.to_ne_bytes();
		unsafe { libc::write(a.err_write, bytes.as_ptr().cast(), bytes.len()) };
		unsafe { libc::_exit(127) };
	};

	if unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, a.saved_mask, std::ptr::null_mut()) } != 0 {
		report_and_exit(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EINVAL));
	}

	if a.detach && unsafe { libc::setsid() } < 0 {
		report_and_exit(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EINVAL));
	}

	for (i, slot) in a.plan.iter().enumerate() {
		if let Err(errno) = apply_stdio_slot(i, slot) {
			report_and_exit(errno);
		}
	}

	if let Some(cwd) = a.cwd {
		if unsafe { libc::chdir(cwd.as_ptr()) } != 0 {
			report_and_exit(io::Error::last_os_error().raw_os_error().unwrap_or(libc::ENOENT));
		}
	}

	if a.do_setuid || a.do_setgid {
		unsafe { libc::setgroups(0, std::ptr::null()) };
		if a.do_setgid {
			if let Some(gid) = a.gid {
				if unsafe { libc::setgid(gid) } != 0 {
					report_and_exit(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EINVAL));
				}
			}
		}
		if a.do_setuid {
			if let Some(uid) = a.uid {
				if unsafe { libc::setuid(uid) } != 0 {
					report_and_exit(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EINVAL));
				}
			}
		}
	}

	if a.reset_sigpipe {
		let mut sa: libc::sigaction = unsafe { std::mem::zeroed() };
		sa.sa_sigaction = libc::SIG_DFL;
		unsafe { libc::sigaction(libc::SIGPIPE, &sa, std::ptr::null_mut()) };
	}

	let rc = match a.envp {
		Some(envp) => unsafe { libc::execve(a.file.as_ptr(), a.argv.as_ptr(), envp.as_ptr()) },
		None => unsafe { libc::execvp(a.file.as_ptr(), a.argv.as_ptr()) },
	};
	debug_assert_eq!(rc, -1);
	report_and_exit(io::Error::last_os_error().raw_os_error().unwrap_or(libc::ENOENT));
}

fn apply_stdio_slot(i: usize, slot: &ResolvedSlot) -> Result<(), i32> {
	let target_fd = i as libc::c_int;
	let source_fd = match slot {
		ResolvedSlot::Null { writable } => {
			let flags = if *writable { libc::O_WRONLY } else { libc::O_RDONLY };
			let path = c"/dev/null";
			let fd = unsafe { libc::open(path.as_ptr(), flags) };
			if fd < 0 {
				return Err(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO));
			}
			fd
		}
		ResolvedSlot::Existing { child_fd } => *child_fd,
	};

	if source_fd != target_fd {
		if unsafe { libc::dup2(source_fd, target_fd) } < 0 {
			return Err(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EBADF));
		}
		unsafe { libc::close(source_fd) };
	} else {
		// Source already occupies the target slot: clear CLOEXEC instead of a self-dup2, per the
		// §4.4 stdio wiring note.
		let _ = c_wrappers::set_cloexec(target_fd, false);
	}
	Ok(())
}

/// The `SIGCHLD` reaper (§4.5): drains every registered PID on each signal delivery, coalescing
/// multiple simultaneous exits into the completions returned here. The driver pushes these onto
/// its own posted-completion queue so exit callbacks still run on a later loop iteration rather
/// than from inside the signal-observation path.
pub fn reap_all() -> Vec<Completion> {
	let mut completions = Vec::new();
	let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
	let pids: Vec<i32> = reg.keys().copied().collect();
	for pid in pids {
		let mut status: libc::c_int = 0;
		loop {
			let rc = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
			if rc == 0 {
				break;
			}
			if rc < 0 {
				let e = io::Error::last_os_error();
				if e.raw_os_error() == Some(libc::EINTR) {
					continue;
				}
				if e.raw_os_error() != Some(libc::ECHILD) {
					panic!("unexpected waitpid error: {e}");
				}
				break;
			}
			let Some(shared) = reg.remove(&pid) else { break };
			let (exit_code, term_signal) = decode_status(status);
			completions.push(Completion::new(move || {
				let mut guard = shared.lock().unwrap_or_else(|e| e.into_inner());
				guard.exit_result = Some((exit_code, term_signal));
				if let Some(cb) = guard.exit_cb.take() {
					drop(guard);
					cb(exit_code, term_signal);
				}
			}));
			break;
		}
	}
	completions
}

fn decode_status(status: libc::c_int) -> (i32, i32) {
	if libc::WIFEXITED(status) {
		(libc::WEXITSTATUS(status), 0)
	} else if libc::WIFSIGNALED(status) {
		(0, libc::WTERMSIG(status))
	} else {
		(0, 0)
	}
}
