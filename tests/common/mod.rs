//! Shared helpers for integration tests: a blocking mock TCP server.

#![allow(dead_code)]

use rsedis::endpoint::Endpoint;

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

/// Spawn a server that serves one scripted reply per request, in order,
/// on a single accepted connection.
pub fn mock_server(script: Vec<&'static [u8]>) -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            for reply in script {
                let mut buf = [0u8; 4096];
                if stream.read(&mut buf).unwrap_or(0) == 0 {
                    break;
                }
                if stream.write_all(reply).is_err() {
                    break;
                }
            }
        }
    });
    Endpoint::tcp(addr.ip().to_string(), addr.port())
}

/// Spawn a server that answers every request with the same reply, for as
/// long as the connection stays open.
pub fn mock_server_repeating(reply: &'static [u8]) -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            loop {
                let mut buf = [0u8; 4096];
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if stream.write_all(reply).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
    Endpoint::tcp(addr.ip().to_string(), addr.port())
}
