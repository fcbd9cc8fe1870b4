//! Exercises the standalone `Pipe` API: bind/listen/accept/connect and the linked-pair fast path.

use std::time::Duration;

use uvcore::{
	error::ErrorKind,
	pipe::{Pipe, PipeFlags, PipeState},
};

use crate::util::{unique_path, with_timeout};

/// Polls [`Pipe::accept`] until it succeeds or `timeout` elapses, since [`Pipe::bind`] leaves the
/// listener non-blocking and a connection may not have arrived yet.
fn accept_eventually(server: &mut Pipe, timeout: Duration) -> Pipe {
	let deadline = std::time::Instant::now() + timeout;
	loop {
		match server.accept() {
			Ok(accepted) => return accepted,
			Err(e) if e.kind() == ErrorKind::Again => {
				assert!(std::time::Instant::now() < deadline, "timed out waiting for a connection");
				std::thread::sleep(Duration::from_millis(5));
			}
			Err(e) => panic!("accept failed: {e}"),
		}
	}
}

#[test]
fn init_is_infallible_and_starts_unbound() {
	let p = Pipe::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
	assert_eq!(p.state(), PipeState::New);
}

#[test]
fn bind_listen_accept_connect_roundtrip() {
	let path = unique_path("bind-roundtrip");
	let mut server = Pipe::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
	server.bind(&path).expect("bind");
	server.listen().expect("listen");

	let client_path = path.clone();
	let client_thread = std::thread::spawn(move || {
		let mut client = Pipe::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
		client.connect(&client_path).expect("connect");
		if let Some(e) = client.take_delayed_error() {
			panic!("connect failed: {e}");
		}
		client.write_blocking(b"ping").expect("write");
		drop(client);
	});

	let mut accepted =
		with_timeout(Duration::from_secs(5), move || accept_eventually(&mut server, Duration::from_secs(5)));
	client_thread.join().expect("client thread panicked");

	let got = accepted.read_to_end_blocking().expect("read");
	assert_eq!(got, b"ping");
}

#[test]
fn accept_with_nothing_pending_is_again() {
	let path = unique_path("accept-again");
	let mut server = Pipe::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
	server.bind(&path).expect("bind");
	server.listen().expect("listen");

	let err = server.accept().unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Again);
}

#[test]
fn double_bind_is_inval() {
	let path = unique_path("double-bind");
	let mut p = Pipe::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
	p.bind(&path).expect("first bind");
	let err = p.bind(&path).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Inval);
}

#[test]
fn close_unlinks_bound_name() {
	let path = unique_path("close-unlinks");
	let mut p = Pipe::init(PipeFlags::READABLE | PipeFlags::WRITABLE);
	p.bind(&path).expect("bind");
	assert!(path.exists());
	p.close();
	assert!(!path.exists());
}

#[test]
fn link_produces_a_connected_pair() {
	let (mut read, mut write) = Pipe::link(PipeFlags::READABLE, PipeFlags::WRITABLE).expect("link");
	assert_eq!(read.state(), PipeState::LinkedEnd);
	assert_eq!(write.state(), PipeState::LinkedEnd);
	write.write_blocking(b"hello").expect("write");
	drop(write);
	let got = read.read_to_end_blocking().expect("read");
	assert_eq!(got, b"hello");
}

#[test]
fn link_rejects_ipc_on_both_ends() {
	let err = Pipe::link(PipeFlags::READABLE | PipeFlags::IPC, PipeFlags::WRITABLE | PipeFlags::IPC)
		.unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Inval);
}

#[test]
fn link_rejects_wrong_direction_flags() {
	let err = Pipe::link(PipeFlags::WRITABLE, PipeFlags::WRITABLE).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Inval);
}
