//! A deferred, single-shot unit of work posted to a loop.

use std::collections::VecDeque;

/// A boxed closure run exactly once on a later loop iteration.
///
/// Used to carry exit callbacks, connect-failure callbacks, and close callbacks across the
/// "never synchronous" boundary required by §5 and §7: even a failure detected before any OS call
/// is re-posted rather than invoked inline.
pub struct Completion(Box<dyn FnOnce() + Send + 'static>);

impl Completion {
	/// Wraps a closure as a completion.
	pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
		Self(Box::new(f))
	}

	/// Runs the completion, consuming it.
	pub fn run(self) {
		(self.0)();
	}
}

/// A FIFO of posted completions, shared by both platform drivers.
#[derive(Default)]
pub struct PostedQueue(VecDeque<Completion>);

impl PostedQueue {
	/// Creates an empty queue.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a completion to the back of the queue.
	pub fn push(&mut self, c: Completion) {
		self.0.push_back(c);
	}

	/// Pops and runs every completion currently in the queue, including ones pushed by a
	/// completion that ran earlier in the same drain (so a chain of deferred work fully drains
	/// in one `run_once`).
	pub fn drain_all(&mut self) {
		while let Some(c) = self.0.pop_front() {
			c.run();
		}
	}

	/// Whether the queue is empty.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Pops and returns a single completion without running it, leaving the rest queued.
	pub fn pop_one(&mut self) -> Option<Completion> {
		self.0.pop_front()
	}
}
