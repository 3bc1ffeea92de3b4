//! HTTP driver for the turntable's motor / laser board.

use std::time::Duration;

use scan_core::config::CaptureConfig;
use scan_runner::{CaptureController, ControlError};

pub const LASER_ON_PATH: &str = "/esp32/laser-on";
pub const LASER_OFF_PATH: &str = "/esp32/laser-off";
pub const STEP_PATH: &str = "/esp32/step360";
pub const STATUS_PATH: &str = "/esp32/status";

/// Talks to the board with plain `GET http://<host><path>` requests.
pub struct HttpController {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpController {
    pub fn new(config: &CaptureConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build();
        Self {
            agent,
            base_url: format!("http://{}", config.controller_host.trim_end_matches('/')),
        }
    }

    /// Sends one command and returns the response body.
    pub fn send(&self, command: &'static str, path: &str) -> Result<String, ControlError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);
        match self.agent.get(&url).call() {
            Ok(response) => response
                .into_string()
                .map_err(|e| ControlError::Unreachable(e.to_string())),
            Err(ureq::Error::Status(code, response)) => Err(ControlError::Rejected {
                command,
                message: format!(
                    "HTTP {}: {}",
                    code,
                    response.into_string().unwrap_or_default().trim()
                ),
            }),
            Err(ureq::Error::Transport(e)) => Err(ControlError::Unreachable(e.to_string())),
        }
    }

    pub fn status(&self) -> Result<String, ControlError> {
        self.send("status", STATUS_PATH)
    }
}

impl CaptureController for HttpController {
    fn laser_on(&self) -> Result<(), ControlError> {
        self.send("laser on", LASER_ON_PATH).map(drop)
    }

    fn laser_off(&self) -> Result<(), ControlError> {
        self.send("laser off", LASER_OFF_PATH).map(drop)
    }

    fn step_motor(&self) -> Result<(), ControlError> {
        self.send("step motor", STEP_PATH).map(drop)
    }

    fn check_status(&self) -> Result<(), ControlError> {
        self.status().map(drop)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{BufRead as _, BufReader, Write as _},
        net::TcpListener,
        thread::{self, JoinHandle},
    };

    use super::*;

    /// Answers one request with `status` and `body`, returning the request line.
    fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let host = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut header = String::new();
            while reader.read_line(&mut header).unwrap() > 2 {
                header.clear();
            }
            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            request_line.trim_end().to_string()
        });
        (host, handle)
    }

    fn controller(host: String, request_timeout_ms: u64) -> HttpController {
        HttpController::new(&CaptureConfig {
            controller_host: host,
            request_timeout_ms,
            ..CaptureConfig::default()
        })
    }

    #[test]
    fn commands_hit_board_endpoints() {
        type Command = fn(&HttpController) -> Result<(), ControlError>;
        let commands: [(&str, Command); 4] = [
            (LASER_ON_PATH, HttpController::laser_on),
            (LASER_OFF_PATH, HttpController::laser_off),
            (STEP_PATH, HttpController::step_motor),
            (STATUS_PATH, HttpController::check_status),
        ];
        for (path, call) in commands {
            let (host, server) = serve_once("200 OK", "OK");
            call(&controller(host, 5000)).unwrap();
            assert_eq!(server.join().unwrap(), format!("GET {path} HTTP/1.1"));
        }
    }

    #[test]
    fn status_returns_body() {
        let (host, server) = serve_once("200 OK", "ready");
        assert_eq!(controller(host, 5000).status().unwrap(), "ready");
        server.join().unwrap();
    }

    #[test]
    fn error_status_is_rejected() {
        let (host, server) = serve_once("500 Internal Server Error", "motor jammed");
        let err = controller(host, 5000).step_motor().unwrap_err();
        match err {
            ControlError::Rejected { command, message } => {
                assert_eq!(command, "step motor");
                assert_eq!(message, "HTTP 500: motor jammed");
            }
            other => panic!("unexpected error {other:?}"),
        }
        server.join().unwrap();
    }

    #[test]
    fn closed_port_is_unreachable() {
        let host = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        assert!(matches!(
            controller(host, 1000).laser_on(),
            Err(ControlError::Unreachable(_))
        ));
    }

    #[test]
    fn silent_board_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let host = listener.local_addr().unwrap().to_string();
        assert!(matches!(
            controller(host, 100).laser_off(),
            Err(ControlError::Unreachable(_))
        ));
        drop(listener);
    }
}
