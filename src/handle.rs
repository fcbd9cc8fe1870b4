//! Common base state carried by every I/O object owned by a loop ([`Pipe`](crate::pipe::Pipe),
//! [`Process`](crate::process::Process)).
//!
//! Lifecycle: a handle is created inactive, optionally started, optionally stopped, and finally
//! closed. Close is asynchronous: it only sets [`HandleFlags::CLOSING`] and detaches the handle
//! from the driver; the actual resource release and the close callback run in a later "endgame"
//! pass (see [`crate::driver`]), so user code is never invoked while the handle is still
//! observable by the reactor.

use std::fmt;

bitflags_like::bitflags! {
	/// Lifecycle flags carried by every handle, per the data model's handle base.
	pub struct HandleFlags: u8 {
		/// Set by `close`; the handle is no longer addressable by new operations but its
		/// resources have not been released yet.
		const CLOSING = 0b0001;
		/// Set once the endgame pass has released the handle's OS resources and invoked the
		/// close callback.
		const CLOSED = 0b0010;
		/// Set while the handle has outstanding work that should keep the loop alive (mirrors
		/// `uv_ref`/`uv_unref` accounting).
		const ACTIVE = 0b0100;
		/// Set while the handle should keep the loop alive even if otherwise idle.
		const REF = 0b1000;
	}
}

/// Tags which payload a handle carries, used for assertions and diagnostics; the payload itself
/// is the concrete [`Pipe`](crate::pipe::Pipe) or [`Process`](crate::process::Process) type, not
/// an enum member here.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandleKind {
	/// A [`Pipe`](crate::pipe::Pipe).
	Pipe,
	/// A [`Process`](crate::process::Process).
	Process,
}

impl fmt::Display for HandleKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Pipe => "pipe",
			Self::Process => "process",
		})
	}
}

/// The state shared by every handle kind, per §3 of the data model.
///
/// `Pipe` and `Process` both embed one of these rather than duplicating the flag/refcount
/// bookkeeping; this mirrors the teacher's approach of a small, copyable "base" struct that the
/// concrete handle types hold by value.
pub struct HandleBase {
	kind: HandleKind,
	flags: HandleFlags,
}

impl HandleBase {
	/// Creates a new, inactive handle base of the given kind.
	#[must_use]
	pub fn new(kind: HandleKind) -> Self {
		log::trace!("handle base created: kind={kind}");
		Self { kind, flags: HandleFlags::REF }
	}

	/// The kind tag this handle was created with.
	#[must_use]
	pub fn kind(&self) -> HandleKind {
		self.kind
	}

	/// Whether the close request has been issued (the handle may still be mid-endgame).
	#[must_use]
	pub fn is_closing(&self) -> bool {
		self.flags.contains(HandleFlags::CLOSING)
	}

	/// Whether the endgame pass has fully released this handle.
	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.flags.contains(HandleFlags::CLOSED)
	}

	/// Whether the handle currently has outstanding work keeping the loop alive.
	#[must_use]
	pub fn is_active(&self) -> bool {
		self.flags.contains(HandleFlags::ACTIVE)
	}

	/// Marks the handle active (mirrors `uv__handle_start`).
	pub fn start(&mut self) {
		self.flags.insert(HandleFlags::ACTIVE);
	}

	/// Marks the handle inactive (mirrors `uv__handle_stop`).
	pub fn stop(&mut self) {
		self.flags.remove(HandleFlags::ACTIVE);
	}

	/// Transitions into the closing phase. Idempotent: calling this twice is a no-op on the
	/// second call, matching the "user must not call any other operation after close" contract
	/// at the call-site level while still being safe to call from `Drop`.
	pub fn begin_close(&mut self) {
		if self.flags.contains(HandleFlags::CLOSING) {
			return;
		}
		log::debug!("handle begin_close: kind={}", self.kind);
		self.flags.insert(HandleFlags::CLOSING);
		self.flags.remove(HandleFlags::ACTIVE);
	}

	/// Called by the endgame pass once OS resources are released; marks the handle fully closed.
	pub fn finish_close(&mut self) {
		debug_assert!(self.flags.contains(HandleFlags::CLOSING));
		log::debug!("handle finish_close: kind={}", self.kind);
		self.flags.insert(HandleFlags::CLOSED);
	}
}

impl fmt::Debug for HandleBase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HandleBase").field("kind", &self.kind).field("flags", &self.flags).finish()
	}
}

/// A tiny hand-rolled bitflags shim.
///
/// The teacher's dependency stack has no `bitflags` crate and this core only needs a couple of
/// small, fixed flag sets (here, and [`crate::pipe`]'s capability flags), so rather than pull in
/// a new dependency we generate the same `contains`/`insert`/`remove` surface `bitflags!` would.
pub(crate) mod bitflags_like {
	macro_rules! bitflags {
		(
			$(#[$meta:meta])*
			pub struct $name:ident: $ty:ty {
				$(
					$(#[$fmeta:meta])*
					const $flag:ident = $val:expr;
				)*
			}
		) => {
			$(#[$meta])*
			#[derive(Copy, Clone, PartialEq, Eq, Default)]
			pub struct $name($ty);
			impl $name {
				$(
					$(#[$fmeta])*
					pub const $flag: Self = Self($val);
				)*
				/// Returns whether `self` contains all bits set in `other`.
				#[inline]
				pub fn contains(self, other: Self) -> bool {
					(self.0 & other.0) == other.0
				}
				/// Sets the given bits.
				#[inline]
				pub fn insert(&mut self, other: Self) {
					self.0 |= other.0;
				}
				/// Clears the given bits.
				#[inline]
				pub fn remove(&mut self, other: Self) {
					self.0 &= !other.0;
				}
			}
			impl std::ops::BitOr for $name {
				type Output = Self;
				fn bitor(self, rhs: Self) -> Self {
					Self(self.0 | rhs.0)
				}
			}
			impl std::fmt::Debug for $name {
				fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
					write!(f, "{:#06b}", self.0)
				}
			}
		};
	}
	pub(crate) use bitflags;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lifecycle() {
		let mut h = HandleBase::new(HandleKind::Pipe);
		assert!(!h.is_closing());
		assert!(!h.is_closed());
		h.start();
		assert!(h.is_active());
		h.begin_close();
		assert!(h.is_closing());
		assert!(!h.is_active());
		h.finish_close();
		assert!(h.is_closed());
	}

	#[test]
	fn begin_close_idempotent() {
		let mut h = HandleBase::new(HandleKind::Process);
		h.begin_close();
		h.begin_close();
		assert!(h.is_closing());
	}
}
