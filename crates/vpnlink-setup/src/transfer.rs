//! Trust bundle transfer from the exit node over SSH/SCP.
//!
//! Every failure is returned as a [`TransferError`]; the caller decides the
//! fallback (manual placement on the relay).

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ssh2::{CheckResult, HostKeyType, KnownHostFileKind, KnownHostKeyFormat, Session};

use crate::certs::write_private_file;
use crate::config::HostKeyPolicy;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("no authentication method provided")]
    NoAuthMethod,

    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("host key for {host} rejected: {reason}")]
    HostKey { host: String, reason: String },

    #[error("authentication as {user} failed: {reason}")]
    AuthFailed { user: String, reason: String },

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// SSH credential. Password and key file are mutually exclusive.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password(String),
    KeyFile(PathBuf),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(<redacted>)"),
            Self::KeyFile(p) => f.debug_tuple("KeyFile").field(p).finish(),
        }
    }
}

/// One remote file to copy from the exit node.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credentials: Option<Credentials>,
    pub remote_path: PathBuf,
}

/// Fetches the trust bundle from the exit node into `dest`.
pub trait BundleFetcher {
    fn fetch(&self, request: &TransferRequest, dest: &Path) -> Result<(), TransferError>;
}

/// Pick the usable credential. A key file that does not exist or an empty
/// password counts as no credential.
pub fn usable_credentials(credentials: Option<&Credentials>) -> Result<&Credentials, TransferError> {
    let Some(credentials) = credentials else {
        return Err(TransferError::NoAuthMethod);
    };
    let usable = match credentials {
        Credentials::KeyFile(path) => path.exists(),
        Credentials::Password(password) => !password.is_empty(),
    };
    if usable {
        Ok(credentials)
    } else {
        Err(TransferError::NoAuthMethod)
    }
}

/// Result of looking the presented host key up in known-hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownHostStatus {
    Match,
    NotFound,
    Mismatch,
    Failure,
}

impl From<CheckResult> for KnownHostStatus {
    fn from(r: CheckResult) -> Self {
        match r {
            CheckResult::Match => Self::Match,
            CheckResult::NotFound => Self::NotFound,
            CheckResult::Mismatch => Self::Mismatch,
            CheckResult::Failure => Self::Failure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyDecision {
    Accept,
    AcceptAndRecord,
    Reject(&'static str),
}

pub const fn host_key_decision(policy: HostKeyPolicy, status: KnownHostStatus) -> HostKeyDecision {
    match (status, policy) {
        (KnownHostStatus::Match, _) => HostKeyDecision::Accept,
        (KnownHostStatus::NotFound, HostKeyPolicy::TrustOnFirstUse) => {
            HostKeyDecision::AcceptAndRecord
        }
        (KnownHostStatus::NotFound, HostKeyPolicy::Strict) => {
            HostKeyDecision::Reject("host is not in known-hosts and the policy is strict")
        }
        (KnownHostStatus::Mismatch, _) => {
            HostKeyDecision::Reject("host key differs from the recorded one")
        }
        (KnownHostStatus::Failure, _) => HostKeyDecision::Reject("known-hosts lookup failed"),
    }
}

/// Known-hosts entry name; OpenSSH brackets non-default ports.
fn known_hosts_entry(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

/// Render the known-hosts line for one key. Uses a scratch collection so
/// nothing read from the operator's file is re-serialized.
fn known_hosts_line(
    session: &Session,
    entry: &str,
    key: &[u8],
    key_type: HostKeyType,
) -> Result<String, TransferError> {
    let mut single = session.known_hosts()?;
    single.add(entry, key, "added by vpnlink", KnownHostKeyFormat::from(key_type))?;
    let hosts = single.hosts()?;
    let host = hosts.first().ok_or_else(|| TransferError::HostKey {
        host: entry.to_string(),
        reason: "could not render known-hosts entry".to_string(),
    })?;
    Ok(single.write_string(host, KnownHostFileKind::OpenSSH)?)
}

/// Append one line to a known-hosts file, leaving existing content as is.
fn append_known_host(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let unterminated = fs::read(path)
        .ok()
        .and_then(|content| content.last().copied())
        .is_some_and(|last| last != b'\n');

    let mut file = OpenOptions::new().append(true).create(true).open(path)?;
    if unterminated {
        file.write_all(b"\n")?;
    }
    writeln!(file, "{}", line.trim_end())
}

/// SCP client built on libssh2.
#[derive(Debug, Clone)]
pub struct ScpFetcher {
    timeout: Duration,
    policy: HostKeyPolicy,
    known_hosts: Option<PathBuf>,
}

impl ScpFetcher {
    /// `known_hosts` defaults to `~/.ssh/known_hosts` when `None`.
    pub fn new(timeout: Duration, policy: HostKeyPolicy, known_hosts: Option<PathBuf>) -> Self {
        let known_hosts =
            known_hosts.or_else(|| dirs::home_dir().map(|h| h.join(".ssh").join("known_hosts")));
        Self {
            timeout,
            policy,
            known_hosts,
        }
    }

    fn connect(&self, host: &str, port: u16) -> Result<Session, TransferError> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransferError::Resolve {
                host: host.to_string(),
                source,
            })?
            .collect();

        let mut last_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses");
        let mut stream = None;
        for addr in &addrs {
            tracing::debug!(%addr, "connecting");
            match TcpStream::connect_timeout(addr, self.timeout) {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = e,
            }
        }
        let stream = stream.ok_or_else(|| TransferError::Connect {
            addr: format!("{host}:{port}"),
            source: last_err,
        })?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        let mut session = Session::new()?;
        session.set_timeout(u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(stream);
        session.handshake()?;
        Ok(session)
    }

    fn verify_host_key(&self, session: &Session, host: &str, port: u16) -> Result<(), TransferError> {
        let (key, key_type) = session.host_key().ok_or_else(|| TransferError::HostKey {
            host: host.to_string(),
            reason: "server presented no host key".to_string(),
        })?;

        let mut known = session.known_hosts()?;
        if let Some(path) = self.known_hosts.as_deref().filter(|p| p.exists()) {
            known.read_file(path, KnownHostFileKind::OpenSSH)?;
        }

        let status = KnownHostStatus::from(known.check_port(host, port, key));
        match host_key_decision(self.policy, status) {
            HostKeyDecision::Accept => Ok(()),
            HostKeyDecision::AcceptAndRecord => {
                tracing::warn!(
                    host,
                    port,
                    "trusting unknown host key on first use; verify the exit node out of band"
                );
                let Some(path) = self.known_hosts.as_deref() else {
                    return Ok(());
                };
                let entry = known_hosts_entry(host, port);
                let recorded = known_hosts_line(session, &entry, key, key_type)
                    .and_then(|line| append_known_host(path, &line).map_err(TransferError::from));
                if let Err(e) = recorded {
                    tracing::warn!("could not record host key in {}: {e}", path.display());
                }
                Ok(())
            }
            HostKeyDecision::Reject(reason) => Err(TransferError::HostKey {
                host: host.to_string(),
                reason: reason.to_string(),
            }),
        }
    }
}

fn authenticate(session: &Session, user: &str, credentials: &Credentials) -> Result<(), TransferError> {
    let auth_failed = |e: ssh2::Error| TransferError::AuthFailed {
        user: user.to_string(),
        reason: e.to_string(),
    };
    match credentials {
        Credentials::Password(password) => session
            .userauth_password(user, password)
            .map_err(auth_failed)?,
        Credentials::KeyFile(path) => session
            .userauth_pubkey_file(user, None, path, None)
            .map_err(auth_failed)?,
    }
    if !session.authenticated() {
        return Err(TransferError::AuthFailed {
            user: user.to_string(),
            reason: "server did not accept the credential".to_string(),
        });
    }
    Ok(())
}

impl BundleFetcher for ScpFetcher {
    fn fetch(&self, request: &TransferRequest, dest: &Path) -> Result<(), TransferError> {
        let credentials = usable_credentials(request.credentials.as_ref())?;

        let session = self.connect(&request.host, request.port)?;
        self.verify_host_key(&session, &request.host, request.port)?;
        authenticate(&session, &request.user, credentials)?;

        let (mut channel, stat) = session.scp_recv(&request.remote_path)?;
        let mut contents = Vec::with_capacity(usize::try_from(stat.size()).unwrap_or(0));
        channel.read_to_end(&mut contents)?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        write_private_file(dest, &contents)?;

        tracing::info!(
            host = %request.host,
            remote = %request.remote_path.display(),
            local = %dest.display(),
            bytes = contents.len(),
            "trust bundle downloaded"
        );
        Ok(())
    }
}
