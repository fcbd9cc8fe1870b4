//! Thin wrappers around the POSIX calls the pipe and process components share.
//!
//! Every function here returns `io::Result`; conversion to [`crate::error::Error`] happens at the
//! public API boundary, not here, matching the teacher's own `os::unix::c_wrappers` convention of
//! keeping OS call sites in `io::Result`.

use crate::misc::{FdOrErrno, OrErrno};
use std::{
	ffi::CString,
	io, mem,
	os::unix::{ffi::OsStrExt, io::RawFd},
	path::Path,
};

/// Sets or clears `O_NONBLOCK` on `fd`.
pub fn set_nonblocking(fd: RawFd, nonblocking: bool) -> io::Result<()> {
	let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
	flags.fd_or_errno()?;
	let new_flags = if nonblocking { flags | libc::O_NONBLOCK } else { flags & !libc::O_NONBLOCK };
	(unsafe { libc::fcntl(fd, libc::F_SETFL, new_flags) } != -1)
		.true_val_or_errno(())
}

/// Sets or clears `FD_CLOEXEC` on `fd`. Used both directly and as the "source fd already equals
/// its target slot" fallback in the child's stdio dup2 plan (§4.4).
pub fn set_cloexec(fd: RawFd, cloexec: bool) -> io::Result<()> {
	let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
	flags.fd_or_errno()?;
	let new_flags = if cloexec { flags | libc::FD_CLOEXEC } else { flags & !libc::FD_CLOEXEC };
	(unsafe { libc::fcntl(fd, libc::F_SETFD, new_flags) } != -1)
		.true_val_or_errno(())
}

/// Creates a connected, bidirectional pair of stream descriptors for [`crate::pipe::link`].
///
/// Tries `socketpair(AF_UNIX, SOCK_STREAM | SOCK_NONBLOCK | SOCK_CLOEXEC, 0, ...)` first; if the
/// kernel rejects the nonblocking/cloexec type flags (old kernel, despite the flags being defined
/// at build time) falls back to a plain `socketpair` followed by per-fd `fcntl` calls, per the
/// "must fall back without requiring a rebuild" requirement.
pub fn socketpair_stream() -> io::Result<(RawFd, RawFd)> {
	let mut fds = [0 as RawFd; 2];
	let flagged_ty = libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC;
	let rc = unsafe { libc::socketpair(libc::AF_UNIX, flagged_ty, 0, fds.as_mut_ptr()) };
	if rc == 0 {
		return Ok((fds[0], fds[1]));
	}
	let err = io::Error::last_os_error();
	if err.raw_os_error() != Some(libc::EINVAL) && err.raw_os_error() != Some(libc::EPROTONOSUPPORT)
	{
		return Err(err);
	}
	let rc = unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, fds.as_mut_ptr()) };
	(rc == 0).true_or_errno(|| ())?;
	for &fd in &fds {
		set_cloexec(fd, true)?;
	}
	Ok((fds[0], fds[1]))
}

/// Creates an anonymous pipe, used as the `socketpair` fallback in [`socketpair_stream`]'s
/// sibling call sites and as the exec-error channel in the POSIX spawn path (§4.5 step 5).
pub fn pipe_cloexec() -> io::Result<(RawFd, RawFd)> {
	let mut fds = [0 as RawFd; 2];
	(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } == 0).true_or_errno(|| ())?;
	Ok((fds[0], fds[1]))
}

/// Duplicates `fd` with `FD_CLOEXEC` set on the duplicate, per §4.4's requirement that an
/// `INHERIT_FD` stdio slot dup the caller's descriptor rather than hand the child the caller's own
/// fd (which the parent would then have to avoid closing, and the caller would lose on spawn).
pub fn dup_cloexec(fd: RawFd) -> io::Result<RawFd> {
	let dup = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
	dup.fd_or_errno()
}

/// Binds a fresh `AF_UNIX` stream socket to `path`, applying the `NOENT -> ACCES` normalisation
/// required for cross-platform parity with the Windows named-pipe model (§4.1).
///
/// On any failure, unlinks whatever filesystem entity may have been created and closes the
/// socket before returning, per the bind contract.
pub fn bind_unix_stream(path: &Path) -> io::Result<RawFd> {
	let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
	fd.fd_or_errno()?;

	let bind_result = (|| -> io::Result<()> {
		let c_path = CString::new(path.as_os_str().as_bytes())
			.map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
		let bytes = c_path.as_bytes_with_nul();
		if bytes.len() > mem::size_of::<libc::sockaddr_un>() - mem::offset_of!(libc::sockaddr_un, sun_path) {
			return Err(io::Error::from_raw_os_error(libc::ENAMETOOLONG));
		}
		let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
		addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
		// SAFETY: `bytes` (including the NUL) fits in `sun_path` per the length check above.
		unsafe {
			std::ptr::copy_nonoverlapping(
				bytes.as_ptr().cast::<libc::c_char>(),
				addr.sun_path.as_mut_ptr(),
				bytes.len(),
			);
		}
		let len = (mem::offset_of!(libc::sockaddr_un, sun_path) + bytes.len()) as libc::socklen_t;
		let rc = unsafe {
			libc::bind(fd, std::ptr::addr_of!(addr).cast::<libc::sockaddr>(), len)
		};
		if rc == 0 {
			return Ok(());
		}
		let mut err = io::Error::last_os_error();
		if err.raw_os_error() == Some(libc::ENOENT) {
			err = io::Error::from_raw_os_error(libc::EACCES);
		}
		Err(err)
	})();

	match bind_result {
		Ok(()) => {
			let rc = unsafe { libc::listen(fd, 0) };
			if rc != 0 {
				let err = io::Error::last_os_error();
				let _ = std::fs::remove_file(path);
				unsafe { libc::close(fd) };
				return Err(err);
			}
			Ok(fd)
		}
		Err(e) => {
			let _ = std::fs::remove_file(path);
			unsafe { libc::close(fd) };
			Err(e)
		}
	}
}

/// Connects to an existing `AF_UNIX` stream socket at `path`, retrying on `EINTR` (§4.1).
pub fn connect_unix_stream(fd: RawFd, path: &Path) -> io::Result<()> {
	let c_path = CString::new(path.as_os_str().as_bytes())
		.map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?;
	let bytes = c_path.as_bytes_with_nul();
	let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
	addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
	unsafe {
		std::ptr::copy_nonoverlapping(
			bytes.as_ptr().cast::<libc::c_char>(),
			addr.sun_path.as_mut_ptr(),
			bytes.len().min(addr.sun_path.len()),
		);
	}
	let len = (mem::offset_of!(libc::sockaddr_un, sun_path) + bytes.len()) as libc::socklen_t;
	loop {
		let rc = unsafe {
			libc::connect(fd, std::ptr::addr_of!(addr).cast::<libc::sockaddr>(), len)
		};
		if rc == 0 {
			return Ok(());
		}
		let err = io::Error::last_os_error();
		match err.raw_os_error() {
			Some(libc::EINTR) => continue,
			Some(libc::EINPROGRESS) | Some(libc::EAGAIN) => return Ok(()),
			_ => return Err(err),
		}
	}
}

/// Accepts a connection on a listening `AF_UNIX` socket, retrying on `EINTR`.
pub fn accept_stream(listen_fd: RawFd) -> io::Result<RawFd> {
	loop {
		let fd = unsafe {
			libc::accept4(listen_fd, std::ptr::null_mut(), std::ptr::null_mut(), libc::SOCK_CLOEXEC)
		};
		if fd >= 0 {
			return Ok(fd);
		}
		let err = io::Error::last_os_error();
		if err.raw_os_error() == Some(libc::EINTR) {
			continue;
		}
		return Err(err);
	}
}

/// A self-pipe used to make `SIGCHLD` (and in principle any other signal) observable through
/// `poll`, since POSIX signal handlers cannot safely do anything but write to an already-open fd.
pub struct SelfPipe {
	read_fd: RawFd,
	write_fd: RawFd,
}

static SELF_PIPE_WRITE_FD: std::sync::atomic::AtomicI32 = std::sync::atomic::AtomicI32::new(-1);

impl SelfPipe {
	/// Creates the pipe and installs a `SIGCHLD` handler that writes one byte to it.
	///
	/// Only one [`SelfPipe`] may exist per process (the handler is a bare `extern "C" fn` that
	/// reads a process-wide atomic for the fd to write to); this matches the "signal watcher as
	/// loop-owned singleton" design note in that this crate's reference driver creates exactly
	/// one loop.
	pub fn install_sigchld() -> io::Result<Self> {
		let (read_fd, write_fd) = pipe_cloexec()?;
		set_nonblocking(write_fd, true)?;
		SELF_PIPE_WRITE_FD.store(write_fd, std::sync::atomic::Ordering::SeqCst);

		let mut sa: libc::sigaction = unsafe { mem::zeroed() };
		sa.sa_sigaction = Self::handler as usize;
		sa.sa_flags = libc::SA_RESTART;
		unsafe { libc::sigemptyset(&mut sa.sa_mask) };
		(unsafe { libc::sigaction(libc::SIGCHLD, &sa, std::ptr::null_mut()) } == 0)
			.true_val_or_errno(())?;

		Ok(Self { read_fd, write_fd })
	}

	extern "C" fn handler(_signum: libc::c_int) {
		let fd = SELF_PIPE_WRITE_FD.load(std::sync::atomic::Ordering::SeqCst);
		if fd >= 0 {
			let byte = 1u8;
			// SAFETY: `write` is async-signal-safe; `fd` is kept open for the process lifetime.
			unsafe { libc::write(fd, std::ptr::addr_of!(byte).cast(), 1) };
		}
	}

	/// The read end, to be polled for readability.
	pub fn read_fd(&self) -> RawFd {
		self.read_fd
	}

	/// Drains every byte currently buffered in the pipe.
	pub fn drain(&self) {
		let mut buf = [0u8; 64];
		loop {
			let n = unsafe {
				libc::read(self.read_fd, buf.as_mut_ptr().cast(), buf.len())
			};
			if n <= 0 {
				break;
			}
		}
	}
}

impl Drop for SelfPipe {
	fn drop(&mut self) {
		SELF_PIPE_WRITE_FD.store(-1, std::sync::atomic::Ordering::SeqCst);
		unsafe {
			libc::close(self.read_fd);
			libc::close(self.write_fd);
		}
	}
}

/// Blocks all signals, returning the previous mask so it can be restored in the parent and passed
/// to the child for restoration after fork (§4.5 step 3).
pub fn block_all_signals() -> io::Result<libc::sigset_t> {
	let mut full: libc::sigset_t = unsafe { mem::zeroed() };
	unsafe { libc::sigfillset(&mut full) };
	let mut old: libc::sigset_t = unsafe { mem::zeroed() };
	(unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, &full, &mut old) } == 0)
		.true_val_or_errno(old)
}

/// Restores a previously saved signal mask.
pub fn restore_signal_mask(mask: &libc::sigset_t) -> io::Result<()> {
	(unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, mask, std::ptr::null_mut()) } == 0)
		.true_val_or_errno(())
}
