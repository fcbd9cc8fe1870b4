//! Exercises child-process spawn, stdio plumbing, exit-status reporting, and `kill`.

use std::{
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use uvcore::{
	pipe::Pipe,
	process::{Process, ProcessFlags, ProcessOptions},
	stdio::StdioContainer,
};

use crate::util::shell_args;

#[cfg(unix)]
use uvcore::driver::{Driver, EventLoop};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Spawns `options`, pumps the reference event loop (POSIX) or polls (Windows) until the exit
/// callback fires, and returns the process handle, any `CREATE_PIPE` parent ends, and the
/// observed `(exit_code, term_signal)`.
fn spawn_and_wait(options: ProcessOptions) -> (Process, Vec<Option<Pipe>>, (i32, i32)) {
	let state: Arc<Mutex<Option<(i32, i32)>>> = Arc::new(Mutex::new(None));
	let state_cb = Arc::clone(&state);
	let (process, pipes) = Process::spawn(options, move |code, sig| {
		*state_cb.lock().unwrap_or_else(|e| e.into_inner()) = Some((code, sig));
	});

	let deadline = Instant::now() + TIMEOUT;

	#[cfg(unix)]
	{
		let mut ev = EventLoop::new().expect("event loop creation");
		ev.set_sigchld_hook(uvcore::process::unix::reap_all);
		loop {
			if state.lock().unwrap_or_else(|e| e.into_inner()).is_some() {
				break;
			}
			assert!(Instant::now() < deadline, "timed out waiting for child to exit");
			ev.run_once().expect("event loop iteration");
		}
	}
	#[cfg(windows)]
	{
		while state.lock().unwrap_or_else(|e| e.into_inner()).is_none() {
			assert!(Instant::now() < deadline, "timed out waiting for child to exit");
			std::thread::sleep(Duration::from_millis(20));
		}
	}

	let result = state.lock().unwrap_or_else(|e| e.into_inner()).unwrap();
	(process, pipes, result)
}

fn options_for(script: &str, stdio: Vec<StdioContainer>) -> ProcessOptions {
	let args = shell_args(script);
	ProcessOptions {
		file: args[0].clone(),
		args,
		env: None,
		cwd: None,
		stdio,
		flags: ProcessFlags::default(),
		uid: None,
		gid: None,
	}
}

#[test]
fn exit_code_is_reported() {
	let options = options_for("exit 7", Vec::new());
	let (process, _pipes, (code, signal)) = spawn_and_wait(options);
	assert_eq!((code, signal), (7, 0));
	assert!(process.has_exited());
	assert_eq!(process.exit_status(), Some((7, 0)));
}

#[test]
fn stdout_is_captured_through_create_pipe() {
	let stdio = vec![
		StdioContainer::Ignore,
		StdioContainer::CreatePipe { readable: true, writable: false },
		StdioContainer::Ignore,
	];
	let options = options_for("echo hello", stdio);
	let (_process, mut pipes, (code, signal)) = spawn_and_wait(options);
	assert_eq!((code, signal), (0, 0));

	let stdout_pipe = pipes.get_mut(1).and_then(Option::as_mut).expect("stdout pipe present");
	let got = stdout_pipe.read_to_end_blocking().expect("read child stdout");
	assert_eq!(String::from_utf8_lossy(&got).trim_end(), "hello");
}

#[test]
fn zero_stdio_slots_still_spawn() {
	let options = options_for("exit 0", Vec::new());
	let (_process, pipes, (code, signal)) = spawn_and_wait(options);
	assert_eq!((code, signal), (0, 0));
	assert_eq!(pipes.len(), 3);
	assert!(pipes.iter().all(Option::is_none));
}

#[test]
fn unresolvable_program_reports_exit_127() {
	let options = ProcessOptions {
		file: "uvcore-test-definitely-not-a-real-binary".to_string(),
		args: vec!["uvcore-test-definitely-not-a-real-binary".to_string()],
		env: None,
		cwd: None,
		stdio: Vec::new(),
		flags: ProcessFlags::default(),
		uid: None,
		gid: None,
	};
	let (_process, _pipes, (code, _signal)) = spawn_and_wait(options);
	assert_eq!(code, 127);
}

#[cfg(unix)]
#[test]
fn kill_terminates_child_with_signal() {
	let options = options_for("sleep 30", Vec::new());
	let state: Arc<Mutex<Option<(i32, i32)>>> = Arc::new(Mutex::new(None));
	let state_cb = Arc::clone(&state);
	let (process, _pipes) = Process::spawn(options, move |code, sig| {
		*state_cb.lock().unwrap_or_else(|e| e.into_inner()) = Some((code, sig));
	});

	process.kill(libc::SIGTERM).expect("kill should succeed while child is alive");

	let mut ev = EventLoop::new().expect("event loop creation");
	ev.set_sigchld_hook(uvcore::process::unix::reap_all);
	let deadline = Instant::now() + TIMEOUT;
	loop {
		if state.lock().unwrap_or_else(|e| e.into_inner()).is_some() {
			break;
		}
		assert!(Instant::now() < deadline, "timed out waiting for kill to take effect");
		ev.run_once().expect("event loop iteration");
	}

	let (code, signal) = state.lock().unwrap_or_else(|e| e.into_inner()).unwrap();
	assert_eq!(code, 0);
	assert_eq!(signal, libc::SIGTERM);
}

#[cfg(unix)]
#[test]
fn kill_on_already_exited_child_is_srch() {
	let options = options_for("exit 0", Vec::new());
	let (process, _pipes, _status) = spawn_and_wait(options);
	let err = process.kill(0).expect_err("probing an exited child should fail");
	assert_eq!(err.kind(), uvcore::error::ErrorKind::Srch);
}
