//! Shared test helpers: unique pipe names and a small watchdog so a hung test fails loudly
//! instead of wedging the whole run.
#![allow(dead_code)]

mod namegen;

pub use namegen::*;

use std::time::Duration;

/// Runs `f` on a dedicated thread and panics if it doesn't finish within `timeout`, so a stuck
/// accept/connect doesn't hang the test binary forever.
pub fn with_timeout<T: Send + 'static>(timeout: Duration, f: impl FnOnce() -> T + Send + 'static) -> T {
	let (tx, rx) = std::sync::mpsc::channel();
	std::thread::spawn(move || {
		let _ = tx.send(f());
	});
	rx.recv_timeout(timeout).expect("test timed out")
}

/// The interpreter used to run tiny inline shell scripts for child-process tests. POSIX systems
/// always have `/bin/sh`; this crate has no Windows CI target for the demo binary, so Windows
/// tests instead shell out to `cmd.exe`.
#[cfg(unix)]
pub const SHELL: &str = "/bin/sh";
#[cfg(windows)]
pub const SHELL: &str = "cmd.exe";

#[cfg(unix)]
pub fn shell_args(script: &str) -> Vec<String> {
	vec![SHELL.to_string(), "-c".to_string(), script.to_string()]
}
#[cfg(windows)]
pub fn shell_args(script: &str) -> Vec<String> {
	vec![SHELL.to_string(), "/C".to_string(), script.to_string()]
}
