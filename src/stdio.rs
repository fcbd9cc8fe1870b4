//! Mapping of user-supplied stdio intents to inheritable descriptors/handles for the child,
//! per §4.4.

use crate::error::{Error, ErrorKind};

/// One child stdio slot's requested treatment, per the external interface in §6.
#[derive(Debug)]
pub enum StdioContainer {
	/// Open a platform null device with the access direction matching the stream.
	Ignore,
	/// Allocate a connected pair; the parent end is handed back to the caller, the child end is
	/// inheritable.
	CreatePipe {
		/// Whether the parent end should be readable.
		readable: bool,
		/// Whether the parent end should be writable.
		writable: bool,
	},
	/// Duplicate an existing descriptor/handle inheritably.
	#[cfg(unix)]
	InheritFd(std::os::unix::io::RawFd),
	/// Duplicate an existing handle inheritably.
	#[cfg(windows)]
	InheritHandle(windows_sys::Win32::Foundation::HANDLE),
	/// Extract and duplicate the OS handle underlying a live TTY or connected named-pipe stream.
	InheritStream,
}

/// The computed plan for one stdio slot: what kind of object backs it and whether it is
/// readable/writable from the child's perspective. Platform modules turn this into actual
/// dup2/DuplicateHandle calls.
#[derive(Debug)]
pub struct StdioPlan {
	/// The container this slot was requested with, validated.
	pub container: StdioKind,
}

/// A validated, platform-neutral classification of a requested stdio slot, rejecting unrecognised
/// kinds with `INVAL` rather than silently falling through (§9's "clean match per type" design
/// note).
#[derive(Debug)]
pub enum StdioKind {
	/// See [`StdioContainer::Ignore`].
	Ignore { writable: bool },
	/// See [`StdioContainer::CreatePipe`].
	CreatePipe { readable: bool, writable: bool },
	/// See [`StdioContainer::InheritFd`]/[`StdioContainer::InheritHandle`].
	Inherit,
	/// See [`StdioContainer::InheritStream`].
	InheritStream,
}

/// Validates and classifies a raw stdio request for slot index `i`, matching
/// `uv__process_init_stdio`'s per-slot validation (SPEC_FULL §4 "added" block): unrecognised
/// kinds are a fallible `INVAL`, never a silent default.
pub fn classify(i: usize, container: &StdioContainer) -> Result<StdioKind, Error> {
	let default_writable = i == 1 || i == 2;
	match container {
		StdioContainer::Ignore => Ok(StdioKind::Ignore { writable: default_writable }),
		StdioContainer::CreatePipe { readable, writable } => {
			if !*readable && !*writable {
				return Err(Error::from(ErrorKind::Inval));
			}
			Ok(StdioKind::CreatePipe { readable: *readable, writable: *writable })
		}
		#[cfg(unix)]
		StdioContainer::InheritFd(fd) => {
			if *fd < 0 {
				return Err(Error::from(ErrorKind::Badf));
			}
			Ok(StdioKind::Inherit)
		}
		#[cfg(windows)]
		StdioContainer::InheritHandle(h) => {
			if h.is_null() {
				return Err(Error::from(ErrorKind::Badf));
			}
			Ok(StdioKind::Inherit)
		}
		StdioContainer::InheritStream => Ok(StdioKind::InheritStream),
	}
}

/// Computes the stdio plan for the full slot table, ensuring at least three slots as required by
/// §4.5 step 1 and the boundary behaviour "stdio_count=0 still yields fds 0/1/2 open".
pub fn plan(containers: &[StdioContainer]) -> Result<Vec<StdioKind>, Error> {
	let count = containers.len().max(3);
	let mut out = Vec::with_capacity(count);
	for i in 0..count {
		let kind = match containers.get(i) {
			Some(c) => classify(i, c)?,
			None => classify(i, &StdioContainer::Ignore)?,
		};
		out.push(kind);
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zero_stdio_still_plans_three_slots() {
		let plan = plan(&[]).unwrap();
		assert_eq!(plan.len(), 3);
	}

	#[test]
	fn create_pipe_without_direction_is_inval() {
		let err = classify(0, &StdioContainer::CreatePipe { readable: false, writable: false })
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Inval);
	}

	#[test]
	fn ignore_defaults_writable_for_stdout_stderr() {
		let StdioKind::Ignore { writable } = classify(1, &StdioContainer::Ignore).unwrap() else {
			panic!("expected Ignore");
		};
		assert!(writable);
		let StdioKind::Ignore { writable } = classify(0, &StdioContainer::Ignore).unwrap() else {
			panic!("expected Ignore");
		};
		assert!(!writable);
	}
}
