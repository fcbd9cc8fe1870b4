//! Generates unique filesystem paths for bound pipes, retrying past any name already claimed by
//! a leftover socket file from a previous crashed run.

use std::{
	path::PathBuf,
	sync::atomic::{AtomicU32, Ordering},
};

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// Yields `/tmp`-rooted (or `%TEMP%`-rooted) paths tagged with the current PID and an
/// incrementing counter, skipping any that already exist on disk.
pub struct NameGen {
	tag: &'static str,
}

impl NameGen {
	pub fn new(tag: &'static str) -> Self {
		Self { tag }
	}

	pub fn next(&mut self) -> PathBuf {
		loop {
			let n = COUNTER.fetch_add(1, Ordering::Relaxed);
			let path = std::env::temp_dir()
				.join(format!("uvcore-test-{}-{}-{n:08x}", self.tag, std::process::id()));
			if !path.exists() {
				return path;
			}
		}
	}
}

/// Shorthand for `NameGen::new(tag).next()` at call sites that only need one name.
pub fn unique_path(tag: &'static str) -> PathBuf {
	NameGen::new(tag).next()
}
