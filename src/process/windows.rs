//! Windows spawn, the thread-pool exit wait, and `kill`/`close`, per §4.6.

use super::{Process, ProcessFlags, ProcessOptions, ProcessShared};
use crate::{
	error::{Error, ErrorKind},
	handle::{HandleBase, HandleKind},
	os::windows::{args, c_wrappers, env, file_handle::FileHandle, path_search},
	pipe::{Pipe, PipeFlags, PipeState},
	stdio::{self, StdioContainer, StdioKind},
};
use std::{
	io,
	sync::{
		atomic::{AtomicI32, Ordering},
		Arc, Mutex,
	},
};
use windows_sys::Win32::{
	Foundation::{CloseHandle, HANDLE, STILL_ACTIVE},
	System::{
		Environment::GetEnvironmentVariableW,
		Threading::{
			CreateProcessW, GetExitCodeProcess, RegisterWaitForSingleObject, TerminateProcess,
			UnregisterWait, CREATE_NEW_PROCESS_GROUP, CREATE_UNICODE_ENVIRONMENT, DETACHED_PROCESS,
			INFINITE, PROCESS_INFORMATION, STARTF_USESTDHANDLES, STARTUPINFOW,
			WT_EXECUTEINWAITTHREAD, WT_EXECUTEONLYONCE,
		},
	},
};

/// Windows-only process bookkeeping: the open process handle, the registered thread-pool wait,
/// and the spawn error captured if `CreateProcessW` failed, per the data model in §3.
pub struct WindowsProcessState {
	process_handle: Option<FileHandle>,
	wait_handle: HANDLE,
	spawn_error: Option<io::Error>,
	/// The signal most recently passed to [`Process::kill`], shared with [`exit_wait_callback`] so
	/// the exit notification can report it as `exit_signal`, per §4.6.
	last_signal: Arc<AtomicI32>,
}

// SAFETY: these are kernel handles; the Win32 API documents them as safe to hand across threads.
unsafe impl Send for WindowsProcessState {}

impl Process {
	/// **Process — Windows spawn** (§4.6). Always returns a handle, even on failure, mirroring
	/// the POSIX side: a failed `CreateProcessW` still delivers `exit_code = 127` through the
	/// exit callback (§8 scenario 2).
	pub fn spawn(
		options: ProcessOptions,
		exit_cb: impl FnOnce(i32, i32) + Send + 'static,
	) -> (Self, Vec<Option<Pipe>>) {
		let shared = Arc::new(Mutex::new(ProcessShared {
			exit_cb: Some(Box::new(exit_cb)),
			exit_result: None,
		}));

		let (child_handles, parent_pipes) = match resolve_stdio(&options.stdio) {
			Ok(r) => r,
			Err(_) => return (Self::failed(shared, None), Vec::new()),
		};

		match spawn_inner(&options, &child_handles) {
			Ok((proc_handle, pid)) => {
				let last_signal = Arc::new(AtomicI32::new(0));
				let wait_handle = register_exit_wait(
					proc_handle.as_raw(),
					Arc::clone(&shared),
					Arc::clone(&last_signal),
				);
				let mut base = HandleBase::new(HandleKind::Process);
				base.start();
				log::info!("spawned pid={pid} file={}", options.file);
				(
					Self {
						base,
						pid,
						shared,
						platform: WindowsProcessState {
							process_handle: Some(proc_handle),
							wait_handle,
							spawn_error: None,
							last_signal,
						},
					},
					parent_pipes,
				)
			}
			Err(e) => {
				log::warn!("CreateProcessW failed for file={}: {e}", options.file);
				write_spawn_error_to_child_stderr(&child_handles, &options.file, &e);
				(Self::failed(shared, Some(e)), parent_pipes)
			}
		}
	}

	fn failed(shared: Arc<Mutex<ProcessShared>>, spawn_error: Option<io::Error>) -> Self {
		let mut base = HandleBase::new(HandleKind::Process);
		base.start();
		let mut guard = shared.lock().unwrap_or_else(|e| e.into_inner());
		guard.exit_result = Some((127, 0));
		if let Some(cb) = guard.exit_cb.take() {
			drop(guard);
			cb(127, 0);
		}
		Self {
			base,
			pid: 0,
			shared,
			platform: WindowsProcessState {
				process_handle: None,
				wait_handle: std::ptr::null_mut(),
				spawn_error,
				last_signal: Arc::new(AtomicI32::new(0)),
			},
		}
	}

	/// **Kill.** `TERM`/`KILL`/`INT` map to `TerminateProcess` with exit code 1; signal `0` is a
	/// liveness probe returning `Ok` if `STILL_ACTIVE`, `Srch` otherwise; every other signal is
	/// `Nosys` (§4.6).
	pub fn kill(&self, signum: i32) -> Result<(), Error> {
		self.ensure_open()?;
		let Some(handle) = self.platform.process_handle.as_ref() else {
			return Err(Error::from(ErrorKind::Srch));
		};
		if signum == 0 {
			let mut code = 0u32;
			let ok = unsafe { GetExitCodeProcess(handle.as_raw(), &mut code) };
			if ok == 0 {
				return Err(io::Error::last_os_error().into());
			}
			return if code == STILL_ACTIVE as u32 { Ok(()) } else { Err(Error::from(ErrorKind::Srch)) };
		}
		const SIGTERM: i32 = 15;
		const SIGKILL: i32 = 9;
		const SIGINT: i32 = 2;
		if !matches!(signum, SIGTERM | SIGKILL | SIGINT) {
			return Err(Error::from(ErrorKind::Nosys));
		}
		let ok = unsafe { TerminateProcess(handle.as_raw(), 1) };
		if ok == 0 {
			return Err(io::Error::last_os_error().into());
		}
		self.platform.last_signal.store(signum, Ordering::SeqCst);
		Ok(())
	}

	/// **Close.** Unregisters the thread-pool wait (if any) and releases the process handle. A
	/// production driver would re-register a one-shot close-wait that posts a completion so the
	/// close callback fires from the loop thread (§4.6); this reference implementation performs
	/// the unregister synchronously since it owns no loop-thread affinity of its own.
	pub(crate) fn platform_close(&mut self) {
		if !self.platform.wait_handle.is_null() {
			unsafe { UnregisterWait(self.platform.wait_handle) };
			self.platform.wait_handle = std::ptr::null_mut();
		}
		self.platform.process_handle = None;
	}
}

type ExitWaitContext = (HANDLE, Arc<Mutex<ProcessShared>>, Arc<AtomicI32>);

extern "system" fn exit_wait_callback(context: *mut std::ffi::c_void, _timer_or_wait_fired: u8) {
	// SAFETY: `context` was produced by `Box::into_raw` in `register_exit_wait` and is only ever
	// passed back here once, with `WT_EXECUTEONLYONCE` guaranteeing a single invocation.
	let boxed = unsafe { Box::from_raw(context.cast::<ExitWaitContext>()) };
	let (process_handle, shared, last_signal) = *boxed;
	let mut code = 0u32;
	let ok = unsafe { GetExitCodeProcess(process_handle, &mut code) };
	let exit_code = if ok != 0 { code as i32 } else { 127 };
	// Whatever was last passed to `kill`, or 0 if the process exited on its own (§4.6).
	let exit_signal = last_signal.load(Ordering::SeqCst);
	let mut guard = shared.lock().unwrap_or_else(|e| e.into_inner());
	guard.exit_result = Some((exit_code, exit_signal));
	if let Some(cb) = guard.exit_cb.take() {
		drop(guard);
		cb(exit_code, exit_signal);
	}
}

fn register_exit_wait(
	process_handle: HANDLE,
	shared: Arc<Mutex<ProcessShared>>,
	last_signal: Arc<AtomicI32>,
) -> HANDLE {
	let ctx: *mut ExitWaitContext = Box::into_raw(Box::new((process_handle, shared, last_signal)));
	let mut wait_handle: HANDLE = std::ptr::null_mut();
	let ok = unsafe {
		RegisterWaitForSingleObject(
			&mut wait_handle,
			process_handle,
			Some(exit_wait_callback),
			ctx.cast(),
			INFINITE,
			WT_EXECUTEINWAITTHREAD | WT_EXECUTEONLYONCE,
		)
	};
	if ok == 0 {
		// Reclaim so we don't leak; the process handle stays open and the caller will never see
		// an exit callback, which is the best this reference driver can do for a registration
		// failure (the real libuv aborts here since it indicates thread-pool exhaustion).
		unsafe { drop(Box::from_raw(ctx)) };
		return std::ptr::null_mut();
	}
	wait_handle
}

fn resolve_stdio(containers: &[StdioContainer]) -> Result<(Vec<HANDLE>, Vec<Option<Pipe>>), Error> {
	let kinds = stdio::plan(containers)?;
	let mut child_handles = Vec::with_capacity(kinds.len());
	let mut parent_pipes = Vec::with_capacity(kinds.len());

	for (i, kind) in kinds.iter().enumerate() {
		match kind {
			StdioKind::Ignore { writable } => {
				let h = c_wrappers::open_nul(*writable).map_err(Error::from)?;
				child_handles.push(h.into_raw());
				parent_pipes.push(None);
			}
			StdioKind::CreatePipe { readable, writable } => {
				let name = c_wrappers::unique_pipe_name("stdio");
				let server = c_wrappers::create_named_pipe_server(&name, true).map_err(Error::from)?;
				let client = c_wrappers::open_named_pipe_client(&name).map_err(Error::from)?;
				c_wrappers::connect_named_pipe(&server).map_err(Error::from)?;
				let child_inheritable = c_wrappers::duplicate_inheritable(client.as_raw()).map_err(Error::from)?;
				child_handles.push(child_inheritable.into_raw());
				let mut parent_flags = PipeFlags::default();
				if *readable {
					parent_flags = parent_flags | PipeFlags::READABLE;
				}
				if *writable {
					parent_flags = parent_flags | PipeFlags::WRITABLE;
				}
				let pipe = Pipe::from_raw_with_flags(server, PipeState::Connected, parent_flags);
				parent_pipes.push(Some(pipe));
			}
			StdioKind::Inherit => {
				let h = match containers.get(i) {
					Some(StdioContainer::InheritHandle(h)) => *h,
					_ => return Err(Error::from(ErrorKind::Inval)),
				};
				let dup = c_wrappers::duplicate_inheritable(h).map_err(Error::from)?;
				child_handles.push(dup.into_raw());
				parent_pipes.push(None);
			}
			StdioKind::InheritStream => {
				log::warn!("InheritStream stdio slot {i} has no backing handle in this reference driver; falling back to NUL");
				let h = c_wrappers::open_nul(i != 0).map_err(Error::from)?;
				child_handles.push(h.into_raw());
				parent_pipes.push(None);
			}
		}
	}

	Ok((child_handles, parent_pipes))
}

fn env_lookup(name: &str) -> Option<String> {
	let wide = c_wrappers::to_wide(name);
	let mut buf = [0u16; 1024];
	let len = unsafe { GetEnvironmentVariableW(wide.as_ptr(), buf.as_mut_ptr(), buf.len() as u32) };
	if len == 0 || len as usize >= buf.len() {
		return None;
	}
	Some(String::from_utf16_lossy(&buf[..len as usize]))
}

fn spawn_inner(options: &ProcessOptions, child_handles: &[HANDLE]) -> io::Result<(FileHandle, u32)> {
	let cwd_string = options.cwd.as_ref().map(|p| p.to_string_lossy().to_string());
	let resolved_file = path_search::search(
		&options.file,
		&options.cwd.clone().unwrap_or_default(),
		&env_lookup("PATH").unwrap_or_default(),
	)
	.map(|p| p.to_string_lossy().to_string())
	.unwrap_or_else(|| options.file.clone());

	let mut full_args = options.args.clone();
	if full_args.is_empty() {
		full_args.push(options.file.clone());
	}
	let quote_mode = if options.flags.contains(ProcessFlags::WINDOWS_VERBATIM_ARGUMENTS) {
		args::QuoteMode::Verbatim
	} else {
		args::QuoteMode::Auto
	};
	let cmdline = args::build_command_line(&full_args, quote_mode);
	let mut cmdline_wide = c_wrappers::to_wide(&cmdline).into_vec();
	cmdline_wide.push(0);

	let env_block_strings = options.env.as_ref().map(|vars| env::build_env_block(vars, env_lookup));
	let env_block_wide =
		env_block_strings.as_ref().map(|entries| c_wrappers::encode_env_block(entries));

	let crt_buf: Vec<u8> = c_wrappers::build_crt_stdio_buffer(
		&child_handles
			.iter()
			.map(|h| (c_wrappers::crt_flags_for_handle(*h), *h))
			.collect::<Vec<_>>(),
	);

	let mut startup: STARTUPINFOW = unsafe { std::mem::zeroed() };
	startup.cb = std::mem::size_of::<STARTUPINFOW>() as u32;
	startup.dwFlags = STARTF_USESTDHANDLES;
	if let Some(h) = child_handles.first() {
		startup.hStdInput = *h;
	}
	if let Some(h) = child_handles.get(1) {
		startup.hStdOutput = *h;
	}
	if let Some(h) = child_handles.get(2) {
		startup.hStdError = *h;
	}
	startup.cbReserved2 = crt_buf.len() as u16;
	startup.lpReserved2 = crt_buf.as_ptr().cast_mut();

	let mut flags = CREATE_UNICODE_ENVIRONMENT;
	if options.flags.contains(ProcessFlags::DETACHED) {
		flags |= DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP;
	}

	let mut info: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };
	let app_name_wide = c_wrappers::to_wide(&resolved_file);
	let cwd_wide = cwd_string.as_ref().map(|s| c_wrappers::to_wide(s));

	let ok = unsafe {
		CreateProcessW(
			app_name_wide.as_ptr(),
			cmdline_wide.as_mut_ptr(),
			std::ptr::null(),
			std::ptr::null(),
			1,
			flags,
			env_block_wide.as_ref().map_or(std::ptr::null(), |v| v.as_ptr()).cast(),
			cwd_wide.as_ref().map_or(std::ptr::null(), |w| w.as_ptr()),
			&startup,
			&mut info,
		)
	};

	if ok == 0 {
		return Err(io::Error::last_os_error());
	}

	unsafe { CloseHandle(info.hThread) };
	let handle = FileHandle::checked(info.hProcess)?;
	Ok((handle, info.dwProcessId))
}

fn write_spawn_error_to_child_stderr(child_handles: &[HANDLE], file: &str, err: &io::Error) {
	let Some(&stderr_handle) = child_handles.get(2) else { return };
	if stderr_handle.is_null() {
		return;
	}
	let message = format!("CreateProcessW: {err} (file: {file})\r\n");
	unsafe {
		let mut written = 0u32;
		windows_sys::Win32::Storage::FileSystem::WriteFile(
			stderr_handle,
			message.as_ptr(),
			message.len() as u32,
			&mut written,
			std::ptr::null_mut(),
		);
	}
}
