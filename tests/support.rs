use std::ffi::OsStr;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub struct ServerHandle {
    shutdown: mpsc::Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _send_result = self.shutdown.send(());
        if let Some(handle) = self.thread.take() {
            drop(handle.join());
        }
    }
}

/// Kills the child when dropped so failing tests do not leak processes.
pub struct ChildGuard(pub Child);

impl Drop for ChildGuard {
    fn drop(&mut self) {
        drop(self.0.kill());
        drop(self.0.wait());
    }
}

/// Spawn a lightweight HTTP target answering `200 OK` for tests.
///
/// # Errors
///
/// Returns an error if the listener cannot be created or configured.
pub fn spawn_http_server() -> Result<(String, ServerHandle), String> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("bind test server failed: {}", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| format!("server addr failed: {}", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| format!("set_nonblocking failed: {}", err))?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            match listener.accept() {
                Ok((stream, _)) => {
                    thread::spawn(move || handle_client(stream));
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(_) => break,
            }
        }
    });

    Ok((
        format!("http://{}", addr),
        ServerHandle {
            shutdown: shutdown_tx,
            thread: Some(handle),
        },
    ))
}

/// Spawn a test server or skip when socket permissions are unavailable.
///
/// # Errors
///
/// Returns an error if the server fails for reasons other than insufficient
/// socket permissions.
pub fn spawn_http_server_or_skip() -> Result<Option<(String, ServerHandle)>, String> {
    match spawn_http_server() {
        Ok(result) => Ok(Some(result)),
        Err(err) if err.contains("Operation not permitted") => {
            eprintln!("Skipping e2e test: {}", err);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn handle_client(mut stream: TcpStream) {
    let mut buffer = [0u8; 2048];
    if stream.read(&mut buffer).is_err() {
        return;
    }
    if stream
        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nOK")
        .is_err()
    {
        return;
    }
    if stream.flush().is_err() {
        return;
    }
    drop(stream.shutdown(Shutdown::Both));
}

/// Writes `config` as a JSON config file, with a leading comment line.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_config(
    dir: &tempfile::TempDir,
    name: &str,
    config: &serde_json::Value,
) -> Result<String, String> {
    let path = dir.path().join(name);
    let body = serde_json::to_string_pretty(config)
        .map_err(|err| format!("serialize config failed: {}", err))?;
    std::fs::write(&path, format!("// generated by test\n{}\n", body))
        .map_err(|err| format!("write config failed: {}", err))?;
    Ok(path.to_string_lossy().into_owned())
}

/// Run the `dreq` binary to completion and capture output.
///
/// # Errors
///
/// Returns an error if the binary cannot be executed.
pub fn run_dreq<I, S>(args: I) -> Result<Output, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = dreq_bin()?;
    Command::new(bin)
        .args(args)
        .env("DREQ_LOG", "error")
        .output()
        .map_err(|err| format!("run dreq failed: {}", err))
}

/// Spawn the `dreq` binary in the background with output discarded.
///
/// # Errors
///
/// Returns an error if the process cannot be started.
pub fn spawn_dreq<I, S>(args: I) -> Result<ChildGuard, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = dreq_bin()?;
    Command::new(bin)
        .args(args)
        .env("DREQ_LOG", "error")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(ChildGuard)
        .map_err(|err| format!("spawn dreq failed: {}", err))
}

/// Pick an available local TCP port.
///
/// # Errors
///
/// Returns an error if a local port cannot be allocated.
pub fn pick_port() -> Result<u16, String> {
    TcpListener::bind("127.0.0.1:0")
        .map_err(|err| format!("bind port failed: {}", err))?
        .local_addr()
        .map_err(|err| format!("port addr failed: {}", err))
        .map(|addr| addr.port())
}

/// `GET path` against a local port, returning the parsed JSON body.
///
/// # Errors
///
/// Returns an error if the connection fails or the body is not JSON.
pub fn get_json(port: u16, path: &str) -> Result<serde_json::Value, String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .map_err(|err| format!("connect failed: {}", err))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .map_err(|err| format!("set timeout failed: {}", err))?;
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n",
        path
    );
    stream
        .write_all(request.as_bytes())
        .map_err(|err| format!("write failed: {}", err))?;
    let mut response = String::new();
    stream
        .read_to_string(&mut response)
        .map_err(|err| format!("read failed: {}", err))?;
    let (_, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| format!("malformed response: {}", response))?;
    serde_json::from_str(body).map_err(|err| format!("bad JSON body '{}': {}", body, err))
}

fn dreq_bin() -> Result<String, String> {
    option_env!("CARGO_BIN_EXE_dreq").map_or_else(
        || Err("CARGO_BIN_EXE_dreq missing at compile time.".to_owned()),
        |path| Ok(path.to_owned()),
    )
}
