use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

use mips_emulator::MipsCpu;
use mips_gdb_stub::{DisconnectReason, GDBStub, StubConfig};

fn exchange(stream: &mut TcpStream, request: &[u8], reply_len: usize) -> String {
    stream.write_all(request).unwrap();
    let mut buf = vec![0; reply_len];
    stream.read_exact(&mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

#[test]
fn session_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let client = std::thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        let stop = exchange(&mut stream, b"$?#3f", 8);
        let detach = exchange(&mut stream, b"+$D#44", 7);
        (stop, detach)
    });

    let (stream, _) = listener.accept().unwrap();
    let mut cpu = MipsCpu::new();
    let mut stub = GDBStub::new(stream, &mut cpu, StubConfig::default());
    assert_eq!(stub.run_blocking().unwrap(), DisconnectReason::Detach);

    let (stop, detach) = client.join().unwrap();
    assert_eq!(stop, "+$S05#b8");
    assert_eq!(detach, "+$OK#9a");
}

#[test]
fn closed_connection_ends_the_session() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = std::thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"+").unwrap();
    });

    let (stream, _) = listener.accept().unwrap();
    client.join().unwrap();
    let mut cpu = MipsCpu::new();
    let mut stub = GDBStub::new(stream, &mut cpu, StubConfig::default());
    assert_eq!(
        stub.run_blocking().unwrap(),
        DisconnectReason::ConnectionClosed
    );
}
