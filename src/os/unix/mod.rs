//! POSIX-specific plumbing: raw syscall wrappers shared by [`crate::pipe`] and
//! [`crate::process`].

pub mod c_wrappers;
