//! Windows-specific plumbing: raw Win32 wrappers, argument/environment marshalling, and
//! executable search, shared by [`crate::pipe`] and [`crate::process`].

pub mod args;
pub mod c_wrappers;
pub mod env;
pub mod file_handle;
pub mod path_search;
