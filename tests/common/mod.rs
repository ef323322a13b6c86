#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use infra_plugins::collectors::{create_collector, Error};
use infra_plugins::{plugin, Env};
use serde_json::Value;

/// One request and the reply the fake server sends once the request ends with `until`.
pub struct Step {
    pub until: &'static str,
    pub reply: Vec<u8>,
    pub hold_open: bool,
}

impl Step {
    pub fn new<T: Into<Vec<u8>>>(until: &'static str, reply: T) -> Step {
        Step { until, reply: reply.into(), hold_open: false }
    }

    /// Keeps the connection open after the reply until the client hangs up.
    pub fn hold_open(mut self) -> Step {
        self.hold_open = true;
        self
    }

    /// Answers one HTTP request with `status` and `body`.
    pub fn http(status: &str, body: &str) -> Step {
        let reply = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        Step::new("\r\n\r\n", reply)
    }
}

/// A throwaway server on localhost that plays back scripted conversations.
///
/// Each conversation is served on its own connection, in order. The join
/// handle yields every request the server received.
pub struct FakeServer {
    pub host: &'static str,
    pub port: String,
    handle: JoinHandle<Vec<String>>,
}

impl FakeServer {
    pub fn start(conversations: Vec<Vec<Step>>) -> FakeServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port().to_string();

        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for steps in conversations {
                let (mut stream, _) = listener.accept().unwrap();
                for step in steps {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.ends_with(step.until.as_bytes()) {
                        let n = stream.read(&mut buf).unwrap();
                        if n == 0 {
                            break;
                        }
                        request.extend_from_slice(&buf[..n]);
                    }
                    requests.push(String::from_utf8_lossy(&request).into_owned());
                    stream.write_all(&step.reply).unwrap();
                    stream.flush().unwrap();
                    if step.hold_open {
                        stream.set_read_timeout(Some(Duration::from_secs(30))).unwrap();
                        while let Ok(n) = stream.read(&mut buf) {
                            if n == 0 {
                                break;
                            }
                        }
                    }
                }
            }
            requests
        });

        FakeServer { host: "127.0.0.1", port, handle }
    }

    pub fn requests(self) -> Vec<String> {
        self.handle.join().unwrap()
    }
}

/// Runs the collector `name` against `env` and returns the printed envelope.
pub fn run_plugin(name: &str, env: Vec<(&str, &str)>) -> Result<Value, Error> {
    let collector = create_collector(name, &Env::from_pairs(env))?;
    let data = infra_plugins::run(collector.as_ref())?;

    let mut out = Vec::new();
    plugin::emit(&mut out, &data, false)?;
    Ok(serde_json::from_slice(&out)?)
}
