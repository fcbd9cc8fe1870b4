#![doc = include_str!("../README.md")]
#![cfg_attr(feature = "doc_cfg", feature(doc_cfg))]
#![warn(
	missing_docs,
	clippy::panic_in_result_fn,
	clippy::missing_assert_message,
	clippy::indexing_slicing,
	clippy::arithmetic_side_effects
)]

pub mod driver;
pub mod error;
pub mod handle;
pub mod pipe;
pub mod process;
pub mod stdio;

/// Platform-specific functionality backing [`pipe`] and [`process`].
///
/// This module houses two modules: `unix` and `windows`, although only one at a time will be
/// visible, depending on which platform the documentation was built on. If you're using
/// [Docs.rs](https://docs.rs/uvcore/latest/uvcore), you can view the documentation for Windows,
/// macOS, Linux and FreeBSD using the Platform menu on the Docs.rs-specific header bar at the top
/// of the page. Docs.rs builds also have the nightly-only `doc_cfg` feature enabled by default,
/// with which everything platform-specific has a badge next to it which specifies the `cfg(...)`
/// conditions for that item to be available.
pub mod os {
	#[cfg(unix)]
	#[cfg_attr(feature = "doc_cfg", doc(cfg(unix)))]
	pub mod unix;
	#[cfg(windows)]
	#[cfg_attr(feature = "doc_cfg", doc(cfg(windows)))]
	pub mod windows;
}

mod misc;
pub(crate) use misc::*;
