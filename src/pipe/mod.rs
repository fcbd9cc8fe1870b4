//! Local bidirectional byte stream: creation, bind to a filesystem name, listen/accept, connect,
//! linked pair, open-from-existing-descriptor, close with unlink. See §4.1.

use crate::{
	error::{Error, ErrorKind},
	handle::{bitflags_like::bitflags, HandleBase, HandleKind},
};
use std::path::{Path, PathBuf};

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

bitflags! {
	/// Capability flags a [`Pipe`] is created with, per §3.
	pub struct PipeFlags: u8 {
		/// The pipe carries framed IPC messages in addition to the raw byte stream (fd-passing
		/// on POSIX). Must be set at init time; §3 invariant (iii) forbids runtime toggling.
		const IPC = 0b0001;
		/// The pipe is safe to inherit across `fork`/`CreateProcess` without the usual
		/// non-blocking-mode conversion applied by [`link`] (§4.1).
		const SPAWN_SAFE = 0b0010;
		/// The pipe's local end may be read from.
		const READABLE = 0b0100;
		/// The pipe's local end may be written to.
		const WRITABLE = 0b1000;
	}
}

/// What state a [`Pipe`] is currently in, per the §4.1 state machine:
/// `NEW -> (BOUND | CONNECTING -> CONNECTED | ADOPTED | LINKED-END) -> CLOSING -> CLOSED`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PipeState {
	/// Freshly initialised, no OS resource allocated yet.
	New,
	/// `bind` succeeded; listening for connections (or about to).
	Bound,
	/// A `connect` is in flight; the delayed error/callback has not fired yet.
	Connecting,
	/// `connect` completed successfully.
	Connected,
	/// Adopted from an existing descriptor via `open`.
	Adopted,
	/// One end of a [`link`]ed pair.
	LinkedEnd,
}

/// The per-platform raw resource backing a pipe: a file descriptor on POSIX, a named-pipe/file
/// handle on Windows. Kept as a thin enum rather than a trait object since there are exactly two
/// platforms and no third is coming.
#[cfg(unix)]
type RawEndpoint = std::os::unix::io::RawFd;
#[cfg(windows)]
type RawEndpoint = crate::os::windows::file_handle::FileHandle;

/// A local bidirectional byte stream, used both standalone (bound/connected pipes) and as child
/// stdio (§4.4's `CREATE_PIPE`/`link`ed ends).
pub struct Pipe {
	base: HandleBase,
	flags: PipeFlags,
	state: PipeState,
	endpoint: Option<RawEndpoint>,
	/// Owned filesystem name, set only when bound; close must unlink it before releasing the fd
	/// (§4.1 invariant ii / §4.1 `close`).
	name: Option<PathBuf>,
	delayed_error: Option<Error>,
}

impl Pipe {
	/// **init(loop, pipe, flags)**: sets capability bits; allocates no OS resource. Always
	/// succeeds, per §4.1.
	#[must_use]
	pub fn init(flags: PipeFlags) -> Self {
		Self {
			base: HandleBase::new(HandleKind::Pipe),
			flags,
			state: PipeState::New,
			endpoint: None,
			name: None,
			delayed_error: None,
		}
	}

	/// The capability flags this pipe was created with.
	#[must_use]
	pub fn flags(&self) -> PipeFlags {
		self.flags
	}

	/// The pipe's current lifecycle state.
	#[must_use]
	pub fn state(&self) -> PipeState {
		self.state
	}

	fn ensure_unbound(&self) -> Result<(), Error> {
		if self.state != PipeState::New {
			return Err(Error::from(ErrorKind::Inval));
		}
		Ok(())
	}

	/// **bind(pipe, name)**: creates an `AF_UNIX` stream socket (POSIX) or named-pipe server
	/// prefix (Windows) and binds it to `name`. See §4.1 for the full contract, including the
	/// `NOENT -> ACCES` normalisation and unlink-on-failure guarantee.
	pub fn bind(&mut self, name: impl AsRef<Path>) -> Result<(), Error> {
		self.ensure_unbound()?;
		let name = name.as_ref();
		let endpoint = Self::platform_bind(name)?;
		if let Err(e) = Self::apply_nonblocking_unless_spawn_safe(&endpoint, false) {
			Self::platform_drop(endpoint);
			let _ = std::fs::remove_file(name);
			return Err(e.into());
		}
		self.endpoint = Some(endpoint);
		self.name = Some(name.to_path_buf());
		self.state = PipeState::Bound;
		self.base.start();
		log::debug!("pipe bound: name={}", name.display());
		Ok(())
	}

	/// **listen(pipe, backlog, cb)**: fails `INVAL` if unbound. The reference driver in
	/// [`crate::driver`] invokes `cb` once the registered readiness watcher reports an accepted
	/// connection; this method itself only validates state and returns whether listening was
	/// armed, leaving readiness dispatch to the caller's driver loop (§4.1).
	pub fn listen(&mut self) -> Result<(), Error> {
		if self.state != PipeState::Bound {
			return Err(Error::from(ErrorKind::Inval));
		}
		Ok(())
	}

	/// Accepts one pending connection, to be called when the driver reports the bound endpoint
	/// readable. The listening endpoint is put in non-blocking mode by [`bind`](Pipe::bind), so
	/// calling this with no connection pending returns `AGAIN` rather than blocking (§4.1).
	pub fn accept(&mut self) -> Result<Pipe, Error> {
		let endpoint = Self::platform_accept(self.endpoint.as_ref().ok_or(Error::from(ErrorKind::Inval))?)?;
		let mut accepted = Pipe::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
		accepted.endpoint = Some(endpoint);
		accepted.state = PipeState::Connected;
		accepted.base.start();
		Ok(accepted)
	}

	/// **connect(req, pipe, name, cb)**: creates the underlying socket if unbound, issues a
	/// non-blocking connect. Per §4.1, the outcome (including any error) is never observed
	/// synchronously; it is recorded in `delayed_error` and must be collected via
	/// [`Pipe::take_delayed_error`] from a completion posted on a later loop iteration.
	pub fn connect(&mut self, name: impl AsRef<Path>) -> Result<(), Error> {
		self.ensure_unbound()?;
		self.state = PipeState::Connecting;
		match Self::platform_connect(name.as_ref()) {
			Ok(endpoint) => {
				self.endpoint = Some(endpoint);
				self.state = PipeState::Connected;
			}
			Err(e) => {
				self.delayed_error = Some(e);
			}
		}
		self.base.start();
		Ok(())
	}

	/// Takes the error recorded by a prior [`connect`](Pipe::connect), if any. Intended to be
	/// called from a completion posted to the driver, never synchronously after `connect`
	/// returns.
	pub fn take_delayed_error(&mut self) -> Option<Error> {
		self.delayed_error.take()
	}

	/// Adopts an already-open endpoint with a specific capability/state combination, bypassing
	/// the public [`open`](Pipe::open)'s fixed READABLE|WRITABLE flags. Used internally to hand
	/// back the parent end of a `CREATE_PIPE` stdio slot with exactly the direction the caller
	/// requested (§4.4).
	pub(crate) fn from_raw_with_flags(endpoint: RawEndpoint, state: PipeState, flags: PipeFlags) -> Self {
		let mut p = Self::init(flags);
		p.endpoint = Some(endpoint);
		p.state = state;
		p.base.start();
		p
	}

	/// **open(pipe, fd)**: adopts an existing descriptor/handle.
	#[cfg(unix)]
	pub fn open(fd: std::os::unix::io::RawFd) -> Result<Self, Error> {
		let mut p = Self::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
		p.endpoint = Some(fd);
		p.state = PipeState::Adopted;
		p.base.start();
		Ok(p)
	}

	/// **open(pipe, handle)**: adopts an existing handle.
	#[cfg(windows)]
	pub fn open(handle: crate::os::windows::file_handle::FileHandle) -> Result<Self, Error> {
		let mut p = Self::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
		p.endpoint = Some(handle);
		p.state = PipeState::Adopted;
		p.base.start();
		Ok(p)
	}

	/// **link(read, write)**: creates a connected endpoint pair in one atomic allocation.
	/// `read` gets `READABLE`, `write` gets `WRITABLE`; IPC must not be set on both ends (§4.1
	/// invariant iv, and the §9 design note fixing the `!(flags & BIT)` bug to the intended
	/// `(flags & BIT) == 0` predicate).
	pub fn link(read_flags: PipeFlags, write_flags: PipeFlags) -> Result<(Pipe, Pipe), Error> {
		if !read_flags.contains(PipeFlags::READABLE) || !write_flags.contains(PipeFlags::WRITABLE) {
			return Err(Error::from(ErrorKind::Inval));
		}
		if read_flags.contains(PipeFlags::IPC) && write_flags.contains(PipeFlags::IPC) {
			return Err(Error::from(ErrorKind::Inval));
		}

		let (a, b) = Self::platform_link()?;

		let mut read = Pipe::init(read_flags);
		let spawn_safe_r = read_flags.contains(PipeFlags::SPAWN_SAFE);
		if let Err(e) = Self::apply_nonblocking_unless_spawn_safe(&a, spawn_safe_r) {
			Self::platform_drop(a);
			Self::platform_drop(b);
			return Err(e.into());
		}
		read.endpoint = Some(a);
		read.state = PipeState::LinkedEnd;
		read.base.start();

		let mut write = Pipe::init(write_flags);
		let spawn_safe_w = write_flags.contains(PipeFlags::SPAWN_SAFE);
		if let Err(e) = Self::apply_nonblocking_unless_spawn_safe(&b, spawn_safe_w) {
			// `a` is already owned by `read`, which will close it on drop; only `b` needs
			// synchronous cleanup here.
			Self::platform_drop(b);
			return Err(e.into());
		}
		write.endpoint = Some(b);
		write.state = PipeState::LinkedEnd;
		write.base.start();

		Ok((read, write))
	}

	/// **close(pipe)**: if a filesystem name is owned, unlinks it BEFORE releasing the
	/// descriptor (avoiding the TOCTOU race described in §4.1), then transitions to CLOSING.
	/// The actual resource release and the close callback happen in the driver's endgame pass;
	/// this method only performs the synchronous unlink-then-mark-closing part.
	pub fn close(&mut self) {
		if self.base.is_closing() {
			return;
		}
		if let Some(name) = self.name.take() {
			if let Err(e) = std::fs::remove_file(&name) {
				log::warn!("pipe close: failed to unlink {}: {e}", name.display());
			}
		}
		self.base.begin_close();
		log::debug!("pipe close requested");
	}

	/// Called by the driver's endgame pass once the descriptor is actually released.
	pub fn finish_close(&mut self) {
		self.endpoint = None;
		self.base.finish_close();
	}
}

impl Drop for Pipe {
	fn drop(&mut self) {
		if !self.base.is_closing() {
			self.close();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn init_always_succeeds_and_starts_new() {
		let p = Pipe::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
		assert_eq!(p.state(), PipeState::New);
	}

	#[test]
	fn double_bind_is_inval() {
		let dir = std::env::temp_dir().join(format!("uvcore-test-{}", std::process::id()));
		let _ = std::fs::remove_file(&dir);
		let mut p = Pipe::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
		p.bind(&dir).expect("first bind should succeed");
		let err = p.bind(&dir).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Inval);
		p.close();
		let _ = std::fs::remove_file(&dir);
	}

	#[test]
	fn bind_close_unlinks() {
		let path = std::env::temp_dir().join(format!("uvcore-test-bc-{}", std::process::id()));
		let _ = std::fs::remove_file(&path);
		let mut p = Pipe::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
		p.bind(&path).unwrap();
		assert!(path.exists());
		p.close();
		assert!(!path.exists());
	}

	#[test]
	fn link_rejects_ipc_on_both_ends() {
		let err = Pipe::link(
			PipeFlags::READABLE | PipeFlags::IPC,
			PipeFlags::WRITABLE | PipeFlags::IPC,
		)
		.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Inval);
	}

	#[test]
	fn link_roundtrip_bytes() {
		use std::io::{Read, Write};
		let (mut read, mut write) = Pipe::link(PipeFlags::READABLE, PipeFlags::WRITABLE).unwrap();
		let payload = b"hello\n";
		write.write_blocking(payload).unwrap();
		drop(write);
		let got = read.read_to_end_blocking().unwrap();
		assert_eq!(got, payload);
	}
}
