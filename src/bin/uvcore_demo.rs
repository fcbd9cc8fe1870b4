//! Minimal demo CLI: spawns a child process with piped stdio, drives the reference event loop
//! until the child exits, and prints what it captured.
//!
//! ```text
//! uvcore-demo <program> [args...]
//! ```

use std::{
	io::Read,
	process::ExitCode,
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use uvcore::{
	driver::{Driver, EventLoop},
	pipe::Pipe,
	process::{Process, ProcessFlags, ProcessOptions},
	stdio::StdioContainer,
};

struct ExitState {
	code: i32,
	signal: i32,
}

fn main() -> ExitCode {
	env_logger::init();

	let mut argv: Vec<String> = std::env::args().skip(1).collect();
	if argv.is_empty() {
		eprintln!("usage: uvcore-demo <program> [args...]");
		return ExitCode::FAILURE;
	}
	let file = argv.remove(0);
	let mut args = vec![file.clone()];
	args.extend(argv);

	let options = ProcessOptions {
		file,
		args,
		env: None,
		cwd: None,
		stdio: vec![
			StdioContainer::Ignore,
			StdioContainer::CreatePipe { readable: true, writable: false },
			StdioContainer::CreatePipe { readable: true, writable: false },
		],
		flags: ProcessFlags::default(),
		uid: None,
		gid: None,
	};

	let exit_state: Arc<Mutex<Option<ExitState>>> = Arc::new(Mutex::new(None));
	let exit_state_cb = Arc::clone(&exit_state);

	#[cfg(unix)]
	let mut event_loop = match EventLoop::new() {
		Ok(l) => l,
		Err(e) => {
			eprintln!("failed to create event loop: {e}");
			return ExitCode::FAILURE;
		}
	};
	#[cfg(unix)]
	event_loop.set_sigchld_hook(uvcore::process::unix::reap_all);

	let (process, mut pipes): (Process, Vec<Option<Pipe>>) = Process::spawn(options, move |code, signal| {
		*exit_state_cb.lock().unwrap_or_else(|e| e.into_inner()) = Some(ExitState { code, signal });
	});
	log::info!("spawned pid={}", process.pid());

	let deadline = Instant::now() + Duration::from_secs(30);
	#[cfg(unix)]
	loop {
		if exit_state.lock().unwrap_or_else(|e| e.into_inner()).is_some() {
			break;
		}
		if Instant::now() >= deadline {
			eprintln!("timed out waiting for child to exit");
			return ExitCode::FAILURE;
		}
		if let Err(e) = event_loop.run_once() {
			eprintln!("event loop error: {e}");
			return ExitCode::FAILURE;
		}
	}
	#[cfg(windows)]
	{
		while exit_state.lock().unwrap_or_else(|e| e.into_inner()).is_none() {
			if Instant::now() >= deadline {
				eprintln!("timed out waiting for child to exit");
				return ExitCode::FAILURE;
			}
			std::thread::sleep(Duration::from_millis(20));
		}
	}

	let mut stdout_buf = Vec::new();
	if let Some(Some(pipe)) = pipes.get_mut(1) {
		let _ = read_pipe(pipe, &mut stdout_buf);
	}
	let mut stderr_buf = Vec::new();
	if let Some(Some(pipe)) = pipes.get_mut(2) {
		let _ = read_pipe(pipe, &mut stderr_buf);
	}

	print!("{}", String::from_utf8_lossy(&stdout_buf));
	eprint!("{}", String::from_utf8_lossy(&stderr_buf));

	let state = exit_state.lock().unwrap_or_else(|e| e.into_inner());
	match state.as_ref() {
		Some(ExitState { signal, .. }) if *signal != 0 => {
			eprintln!("child terminated by signal {signal}");
			ExitCode::from(128u8.saturating_add(*signal as u8))
		}
		Some(ExitState { code, .. }) => ExitCode::from(*code as u8),
		None => ExitCode::FAILURE,
	}
}

#[cfg(unix)]
fn read_pipe(pipe: &mut Pipe, out: &mut Vec<u8>) -> std::io::Result<()> {
	use std::os::unix::io::FromRawFd;
	let Some(fd) = pipe.as_raw_fd() else { return Ok(()) };
	let mut file = std::mem::ManuallyDrop::new(unsafe { std::fs::File::from_raw_fd(fd) });
	file.read_to_end(out)?;
	Ok(())
}

#[cfg(windows)]
fn read_pipe(pipe: &mut Pipe, out: &mut Vec<u8>) -> std::io::Result<()> {
	use std::os::windows::io::FromRawHandle;
	let Some(handle) = pipe.as_raw_handle() else { return Ok(()) };
	let mut file = std::mem::ManuallyDrop::new(unsafe { std::fs::File::from_raw_handle(handle) });
	file.read_to_end(out)?;
	Ok(())
}
