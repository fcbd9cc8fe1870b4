//! The POSIX reference driver: `libc::poll` plus a self-pipe for signal delivery.

use super::{Completion, Driver, Interest, PostedQueue};
use std::{collections::HashMap, io, os::unix::io::RawFd};

/// A `libc::poll`-based reference reactor.
///
/// Registrations are keyed by an opaque `token` (in practice the raw fd cast to `usize`, chosen
/// by the caller); readiness is reported by running the driver's `run_once` loop, which this crate
/// uses internally to drive pipe accept/connect watchers and the SIGCHLD self-pipe.
pub struct EventLoop {
	regs: HashMap<usize, Interest>,
	posted: PostedQueue,
	sigchld: crate::os::unix::c_wrappers::SelfPipe,
	sigchld_hook: Option<Box<dyn FnMut() -> Vec<Completion>>>,
}

impl EventLoop {
	/// Creates a new loop and installs the self-pipe `SIGCHLD` handler.
	pub fn new() -> io::Result<Self> {
		let sigchld = crate::os::unix::c_wrappers::SelfPipe::install_sigchld()?;
		Ok(Self { regs: HashMap::new(), posted: PostedQueue::new(), sigchld, sigchld_hook: None })
	}

	/// Installs the callback invoked once per `run_once` iteration in which a `SIGCHLD` was
	/// observed. The process module uses this to drain its PID-hashed exit-notification registry
	/// and hands back the resulting exit completions, which `run_once` then posts; kept generic
	/// here so the driver has no compile-time dependency on `process`.
	pub fn set_sigchld_hook(&mut self, hook: impl FnMut() -> Vec<Completion> + 'static) {
		self.sigchld_hook = Some(Box::new(hook));
	}

	/// Queues a completion and returns immediately; equivalent to [`Driver::post`] but usable
	/// without importing the trait.
	pub fn post_now(&mut self, c: Completion) {
		self.posted.push(c);
	}

	fn read_fd(token: usize) -> RawFd {
		token as RawFd
	}
}

impl Driver for EventLoop {
	fn register(&mut self, token: usize, interest: Interest) -> io::Result<()> {
		self.regs.insert(token, interest);
		Ok(())
	}

	fn deregister(&mut self, token: usize) {
		self.regs.remove(&token);
	}

	fn post(&mut self, completion: Completion) {
		self.posted.push(completion);
	}

	fn run_once(&mut self) -> io::Result<()> {
		// Drain completions posted on a prior iteration first so their ordering relative to
		// newly observed readiness is preserves insertion order.
		self.posted.drain_all();

		let mut pollfds: Vec<libc::pollfd> = Vec::with_capacity(self.regs.len() + 1);
		pollfds.push(libc::pollfd {
			fd: self.sigchld.read_fd(),
			events: libc::POLLIN,
			revents: 0,
		});
		let tokens: Vec<usize> = self.regs.keys().copied().collect();
		for &tok in &tokens {
			let events = match self.regs[&tok] {
				Interest::Readable => libc::POLLIN,
				Interest::Writable => libc::POLLOUT,
			};
			pollfds.push(libc::pollfd { fd: Self::read_fd(tok), events, revents: 0 });
		}

		// A short timeout keeps this reference reactor responsive to signals without busy
		// spinning; a production loop would block indefinitely and rely on the self-pipe write
		// to interrupt poll.
		let timeout_ms = 50;
		let n = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
		if n < 0 {
			let e = io::Error::last_os_error();
			if e.kind() == io::ErrorKind::Interrupted {
				return Ok(());
			}
			return Err(e);
		}

		if pollfds[0].revents & libc::POLLIN != 0 {
			self.sigchld.drain();
			if let Some(hook) = self.sigchld_hook.as_mut() {
				for completion in hook() {
					self.posted.push(completion);
				}
			}
		}

		self.posted.drain_all();
		Ok(())
	}
}
