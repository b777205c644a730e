use crate::constants::{limits, network as network_constants, ui};
use crate::errors::ExecError;
use crate::services::config::SshSettings;
use crate::services::known_hosts::{HostKeyCheck, KnownHosts};
use crate::services::logger::Logger;
use crate::services::registry::{Credential, Host};
use base64::Engine;
use ssh2::Session;
use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ExecOutput {
    pub fn new(stdout: &str, stderr: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: None,
        }
    }

    /// The single text shown to the operator.
    pub fn report(&self) -> String {
        normalize_output(&self.stdout, &self.stderr)
    }
}

/// Trimmed stdout, else trimmed stderr, else `OK`.
pub fn normalize_output(stdout: &str, stderr: &str) -> String {
    let out = stdout.trim();
    if !out.is_empty() {
        return out.to_string();
    }
    let err = stderr.trim();
    if !err.is_empty() {
        return err.to_string();
    }
    ui::OK_SENTINEL.to_string()
}

#[async_trait::async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, host: &Host, command: &str) -> Result<ExecOutput, ExecError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Connect,
    Auth,
    Exec,
}

/// Opens a fresh SSH session per call and tears it down after reading output.
#[derive(Clone)]
pub struct SshExecutor {
    logger: Logger,
    known_hosts: KnownHosts,
    connect_timeout: Duration,
    exec_timeout: Duration,
}

impl SshExecutor {
    pub fn new(logger: Logger, settings: &SshSettings, known_hosts: KnownHosts) -> Self {
        Self {
            logger: logger.child("ssh"),
            known_hosts,
            connect_timeout: settings.connect_timeout,
            exec_timeout: settings.exec_timeout,
        }
    }

    fn execute_blocking(&self, host: &Host, command: &str) -> Result<ExecOutput, ExecError> {
        let credential = host.credential().ok_or_else(|| {
            ExecError::Connection(format!("no credentials configured for host {}", host.alias))
        })?;
        let session = self.connect_session(host, credential)?;
        let result = run_command(&session, command, self.exec_timeout);
        session.set_blocking(true);
        let _ = session.disconnect(None, "bye", None);
        result
    }

    fn connect_session(&self, host: &Host, credential: Credential<'_>) -> Result<Session, ExecError> {
        let tcp = connect_tcp(host, self.connect_timeout)?;
        let mut session = Session::new()
            .map_err(|_| ExecError::Connection("failed to create SSH session".to_string()))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(u32::try_from(self.exec_timeout.as_millis()).unwrap_or(u32::MAX));
        session
            .handshake()
            .map_err(|err| map_ssh_error(err, Stage::Connect))?;

        let observed = fingerprint_host_key_sha256(&session).ok_or_else(|| {
            ExecError::Connection(format!("{} presented no host key", host.endpoint()))
        })?;
        match self.known_hosts.check_and_remember(&host.endpoint(), &observed) {
            HostKeyCheck::Learned | HostKeyCheck::Matched => {}
            HostKeyCheck::Mismatch { expected } => {
                return Err(ExecError::Connection(format!(
                    "host key for {} changed (expected {}, got {})",
                    host.endpoint(),
                    expected,
                    observed
                )));
            }
        }

        match credential {
            Credential::KeyFile { path, passphrase } => session
                .userauth_pubkey_file(&host.login, None, path, passphrase)
                .map_err(|err| map_ssh_error(err, Stage::Auth))?,
            Credential::Password(password) => session
                .userauth_password(&host.login, password)
                .map_err(|err| map_ssh_error(err, Stage::Auth))?,
        }
        if !session.authenticated() {
            return Err(ExecError::Auth(format!(
                "server rejected credentials for {}@{}",
                host.login, host.alias
            )));
        }
        Ok(session)
    }
}

#[async_trait::async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, host: &Host, command: &str) -> Result<ExecOutput, ExecError> {
        self.logger.info(
            "Executing action",
            Some(&serde_json::json!({"host": host.alias, "endpoint": host.endpoint(), "command": command})),
        );
        let started = Instant::now();
        let executor = self.clone();
        let host_clone = host.clone();
        let command_clone = command.to_string();
        let result =
            tokio::task::spawn_blocking(move || executor.execute_blocking(&host_clone, &command_clone))
                .await
                .map_err(|err| ExecError::Connection(format!("SSH task failed: {}", err)))?;
        match &result {
            Ok(output) => self.logger.debug(
                "Action finished",
                Some(&serde_json::json!({
                    "host": host.alias,
                    "exit_code": output.exit_code,
                    "duration_ms": started.elapsed().as_millis(),
                })),
            ),
            Err(err) => self.logger.warn(
                "Action failed",
                Some(&serde_json::json!({
                    "host": host.alias,
                    "error": err.to_string(),
                    "kind": err.code(),
                    "duration_ms": started.elapsed().as_millis(),
                })),
            ),
        }
        result
    }
}

fn connect_tcp(host: &Host, timeout: Duration) -> Result<TcpStream, ExecError> {
    let addrs: Vec<SocketAddr> = (host.address.as_str(), host.port)
        .to_socket_addrs()
        .map_err(|err| ExecError::Connection(format!("cannot resolve {}: {}", host.address, err)))?
        .collect();
    let mut last_err = None;
    for addr in &addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(match last_err {
        Some(err) if err.kind() == std::io::ErrorKind::TimedOut => ExecError::Connection(format!(
            "{} did not answer within {} ms",
            host.endpoint(),
            timeout.as_millis()
        )),
        Some(err) => ExecError::Connection(format!("{}: {}", host.endpoint(), err)),
        None => ExecError::Connection(format!("no addresses found for {}", host.address)),
    })
}

fn run_command(session: &Session, command: &str, timeout: Duration) -> Result<ExecOutput, ExecError> {
    let mut channel = session
        .channel_session()
        .map_err(|err| map_ssh_error(err, Stage::Exec))?;
    channel
        .exec(command)
        .map_err(|err| map_ssh_error(err, Stage::Exec))?;
    session.set_blocking(false);

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut stderr_stream = channel.stderr();
    let mut buf = [0u8; 8192];
    let started = Instant::now();

    loop {
        let mut progressed = drain(&mut channel, &mut buf, &mut stdout, "stdout")?;
        progressed |= drain(&mut stderr_stream, &mut buf, &mut stderr, "stderr")?;
        if channel.eof() {
            break;
        }
        if started.elapsed() > timeout {
            let _ = channel.close();
            return Err(ExecError::Timeout(format!(
                "no completion after {} ms",
                timeout.as_millis()
            )));
        }
        if !progressed {
            std::thread::sleep(Duration::from_millis(network_constants::SSH_POLL_INTERVAL_MS));
        }
    }
    while drain(&mut channel, &mut buf, &mut stdout, "stdout")?
        | drain(&mut stderr_stream, &mut buf, &mut stderr, "stderr")?
    {}

    session.set_blocking(true);
    let _ = channel.wait_close();
    let exit_code = channel.exit_status().ok();

    Ok(ExecOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    })
}

/// One non-blocking read into `sink`, capped at the capture limit.
fn drain(
    reader: &mut impl Read,
    buf: &mut [u8],
    sink: &mut Vec<u8>,
    label: &str,
) -> Result<bool, ExecError> {
    match reader.read(buf) {
        Ok(0) => Ok(false),
        Ok(n) => {
            let room = limits::MAX_CAPTURE_BYTES.saturating_sub(sink.len());
            sink.extend_from_slice(&buf[..n.min(room)]);
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
        Err(err) => Err(ExecError::Connection(format!(
            "SSH {} read failed: {}",
            label, err
        ))),
    }
}

fn fingerprint_host_key_sha256(session: &Session) -> Option<String> {
    let hash = session.host_key_hash(ssh2::HashType::Sha256)?;
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    Some(format!("SHA256:{}", encoded))
}

fn map_ssh_error(err: ssh2::Error, stage: Stage) -> ExecError {
    let message = err.message().to_string();
    let io_err: std::io::Error = err.into();
    if io_err.kind() == std::io::ErrorKind::TimedOut {
        return match stage {
            Stage::Exec => ExecError::Timeout(format!("SSH operation timed out: {}", message)),
            _ => ExecError::Connection(format!("SSH handshake timed out: {}", message)),
        };
    }
    match stage {
        Stage::Auth => ExecError::Auth(message),
        Stage::Connect => ExecError::Connection(format!("SSH handshake failed: {}", message)),
        Stage::Exec => ExecError::Connection(format!("SSH error: {}", message)),
    }
}
