//! SSH reachability probing and `ssh` invocation helpers.
//!
//! Readiness is decided at the transport level: a host counts as reachable
//! once it accepts a TCP connection and sends an SSH identification banner.
//! The lifecycle never runs `ssh` itself; [`SshClient`] only builds the
//! argument vector for the system client.

use std::ffi::OsString;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;

use camino::Utf8PathBuf;
use shell_escape::unix::escape;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

const BANNER_PREFIX: &[u8; 4] = b"SSH-";

/// Future returned by [`SshProbe::probe`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Checks whether an SSH server answers on an address.
pub trait SshProbe: Send + Sync {
    /// Resolves to `true` when an SSH server answered on `addr`.
    fn probe(&self, addr: SocketAddr) -> ProbeFuture<'_>;
}

/// Probe that opens a TCP connection and waits for the `SSH-` banner.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    /// Creates a probe bounding connect and banner read by `connect_timeout`.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn handshake(addr: SocketAddr) -> std::io::Result<bool> {
        let mut stream = TcpStream::connect(addr).await?;
        let mut prefix = [0_u8; 4];
        stream.read_exact(&mut prefix).await?;
        Ok(&prefix == BANNER_PREFIX)
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl SshProbe for TcpProbe {
    fn probe(&self, addr: SocketAddr) -> ProbeFuture<'_> {
        Box::pin(async move {
            match timeout(self.connect_timeout, Self::handshake(addr)).await {
                Ok(Ok(banner)) => banner,
                Ok(Err(err)) => {
                    trace!(%addr, error = %err, "ssh probe failed");
                    false
                }
                Err(_) => {
                    trace!(%addr, "ssh probe timed out");
                    false
                }
            }
        })
    }
}

/// Options controlling how `ssh` is invoked.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshOptions {
    /// Pass `BatchMode=yes` so `ssh` never prompts.
    pub batch_mode: bool,
    /// Verify the host key against the known hosts file.
    pub strict_host_key_checking: bool,
    /// Known hosts file; `None` uses the client default.
    pub known_hosts_file: Option<Utf8PathBuf>,
    /// Private key passed with `-i`.
    pub identity_file: Option<Utf8PathBuf>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            batch_mode: true,
            strict_host_key_checking: false,
            known_hosts_file: Some(Utf8PathBuf::from("/dev/null")),
            identity_file: None,
        }
    }
}

/// Connection details for reaching an instance with the system `ssh` client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshClient {
    /// Remote user.
    pub user: String,
    /// Public address of the instance.
    pub host: IpAddr,
    /// SSH port.
    pub port: u16,
    /// Client options.
    pub options: SshOptions,
    /// Password from the descriptor credentials, if any.
    pub password: Option<String>,
}

impl SshClient {
    /// Socket address of the SSH server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// `user@host` destination.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Builds the `ssh` arguments that run `command` on the instance.
    ///
    /// Each word of `command` is shell-escaped before being joined, so the
    /// remote shell receives the words unchanged.
    #[must_use]
    pub fn ssh_args(&self, command: &[&str]) -> Vec<OsString> {
        let mut args = self.common_options();
        args.push(OsString::from(self.destination()));
        if !command.is_empty() {
            let remote = command
                .iter()
                .map(|word| escape((*word).into()).into_owned())
                .collect::<Vec<_>>()
                .join(" ");
            args.push(OsString::from(remote));
        }
        args
    }

    fn common_options(&self) -> Vec<OsString> {
        let mut args = vec![OsString::from("-p"), OsString::from(self.port.to_string())];

        if let Some(identity_file) = &self.options.identity_file {
            args.push(OsString::from("-i"));
            args.push(OsString::from(identity_file.as_str()));
        }

        if self.options.batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.options.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if let Some(known_hosts) = &self.options.known_hosts_file {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!("UserKnownHostsFile={known_hosts}")));
        }

        args
    }
}
