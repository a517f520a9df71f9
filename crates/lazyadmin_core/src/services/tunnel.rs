//! SSH tunnel forwarding.
//!
//! A [`Tunnel`] binds an ephemeral loopback listener and forwards every
//! accepted connection to one fixed remote endpoint through a
//! [`RemoteDialer`]. For SSH the dialer opens a `direct-tcpip` channel over a
//! single authenticated session.

use crate::error::{LazyAdminError, Result};
use crate::models::connection::{HostKeyPolicy, SshAuth, TunnelDescriptor};
use async_trait::async_trait;
use russh::client;
use russh_keys::key::{KeyPair, PublicKey};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Opens streams to the tunnel's remote endpoint.
#[async_trait]
pub trait RemoteDialer: Send + Sync + 'static {
    /// Stream type produced by [`dial`](Self::dial).
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a new stream to `host:port`.
    async fn dial(&self, host: &str, port: u16) -> Result<Self::Stream>;

    /// Terminate the underlying session. Called once when the tunnel closes.
    async fn shutdown(&self) {}
}

/// Dialer that connects directly over TCP, without any session.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl RemoteDialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream> {
        Ok(TcpStream::connect((host, port)).await?)
    }
}

/// Observable tunnel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// Accepting connections, none in flight.
    Listening,
    /// Accepting connections with `n` forwarded pairs in flight.
    Forwarding(usize),
    /// Closed; no new connections are accepted.
    Closed,
}

/// A running local-to-remote forwarder.
pub struct Tunnel<D: RemoteDialer> {
    local_addr: SocketAddr,
    remote_host: String,
    remote_port: u16,
    dialer: Arc<D>,
    active: Arc<AtomicUsize>,
    cancel_token: CancellationToken,
}

/// Tunnel over an authenticated SSH session.
pub type SshTunnel = Tunnel<SshDialer>;

impl<D: RemoteDialer> Tunnel<D> {
    /// Bind a loopback listener and start forwarding to `remote_host:remote_port`.
    ///
    /// At most `max_connections` pairs are forwarded at once; further local
    /// connections wait in the listen backlog.
    pub async fn start(
        dialer: D,
        remote_host: impl Into<String>,
        remote_port: u16,
        max_connections: usize,
    ) -> Result<Self> {
        let dialer = Arc::new(dialer);
        let listener = match TcpListener::bind("127.0.0.1:0").await {
            Ok(listener) => listener,
            Err(e) => {
                dialer.shutdown().await;
                return Err(LazyAdminError::connection_with_hint(
                    format!("Failed to bind local port for tunnel: {e}"),
                    "Check that loopback networking is available",
                ));
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                dialer.shutdown().await;
                return Err(e.into());
            }
        };

        let tunnel = Self {
            local_addr,
            remote_host: remote_host.into(),
            remote_port,
            dialer,
            active: Arc::new(AtomicUsize::new(0)),
            cancel_token: CancellationToken::new(),
        };

        tracing::info!(
            local = %local_addr,
            remote_host = %tunnel.remote_host,
            remote_port,
            max_connections,
            "Tunnel listening"
        );

        tokio::spawn(accept_loop(
            listener,
            Arc::clone(&tunnel.dialer),
            tunnel.remote_host.clone(),
            remote_port,
            Arc::new(Semaphore::new(max_connections.max(1))),
            Arc::clone(&tunnel.active),
            tunnel.cancel_token.clone(),
        ));

        Ok(tunnel)
    }

    /// Address of the local listener.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current state.
    pub fn state(&self) -> TunnelState {
        if self.cancel_token.is_cancelled() {
            return TunnelState::Closed;
        }
        match self.active.load(Ordering::SeqCst) {
            0 => TunnelState::Listening,
            n => TunnelState::Forwarding(n),
        }
    }

    /// Stop accepting connections and terminate the session.
    ///
    /// In-flight pairs observe the cancellation and exit. Calling this more
    /// than once is a no-op.
    pub async fn close(&self) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        self.cancel_token.cancel();
        self.dialer.shutdown().await;
        tracing::info!(local = %self.local_addr, "Tunnel closed");
    }
}

impl<D: RemoteDialer> Drop for Tunnel<D> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl<D: RemoteDialer> std::fmt::Debug for Tunnel<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("local_addr", &self.local_addr)
            .field("remote_host", &self.remote_host)
            .field("remote_port", &self.remote_port)
            .field("state", &self.state())
            .finish()
    }
}

/// Decrements the in-flight counter when a forwarded pair ends.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn accept_loop<D: RemoteDialer>(
    listener: TcpListener,
    dialer: Arc<D>,
    remote_host: String,
    remote_port: u16,
    slots: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    cancel_token: CancellationToken,
) {
    loop {
        let permit = tokio::select! {
            _ = cancel_token.cancelled() => break,
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (local_stream, peer_addr) = tokio::select! {
            _ = cancel_token.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept tunnel connection");
                    continue;
                }
            },
        };

        tracing::debug!(peer = %peer_addr, "New tunnel connection");

        let dialer = Arc::clone(&dialer);
        let remote_host = remote_host.clone();
        let active = Arc::clone(&active);
        let cancel = cancel_token.clone();

        tokio::spawn(async move {
            let _permit = permit;
            forward_connection(local_stream, dialer, &remote_host, remote_port, active, cancel)
                .await;
        });
    }

    tracing::debug!("Tunnel accept loop stopped");
}

/// Forward one local connection. A failed dial drops the local side only.
async fn forward_connection<D: RemoteDialer>(
    mut local_stream: TcpStream,
    dialer: Arc<D>,
    remote_host: &str,
    remote_port: u16,
    active: Arc<AtomicUsize>,
    cancel_token: CancellationToken,
) {
    let dialed = tokio::select! {
        _ = cancel_token.cancelled() => return,
        dialed = dialer.dial(remote_host, remote_port) => dialed,
    };
    let mut remote_stream = match dialed {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(
                remote_host,
                remote_port,
                error = %e,
                "Tunnel forward failed; dropping local connection"
            );
            return;
        }
    };

    let _guard = ActiveGuard::enter(&active);

    tokio::select! {
        result = tokio::io::copy_bidirectional(&mut local_stream, &mut remote_stream) => {
            match result {
                Ok((up, down)) => {
                    tracing::debug!(bytes_up = up, bytes_down = down, "Tunnel pair finished");
                }
                Err(e) => tracing::debug!(error = %e, "Tunnel pair ended with error"),
            }
        }
        _ = cancel_token.cancelled() => {}
    }
}

// ========== SSH ==========

/// russh client handler enforcing the host-key policy.
struct SshClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Option<PathBuf>,
}

#[async_trait]
impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        if self.policy == HostKeyPolicy::AcceptAny {
            tracing::warn!(host = %self.host, "Host key verification disabled for SSH tunnel");
            return Ok(true);
        }

        let known = match &self.known_hosts {
            Some(path) => russh_keys::check_known_hosts_path(
                &self.host,
                self.port,
                server_public_key,
                path,
            ),
            None => russh_keys::check_known_hosts(&self.host, self.port, server_public_key),
        };

        match known {
            Ok(true) => Ok(true),
            Ok(false) => {
                tracing::warn!(
                    host = %self.host,
                    port = self.port,
                    "SSH host key not in known_hosts"
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "SSH host key check failed");
                Ok(false)
            }
        }
    }
}

/// Dialer that opens `direct-tcpip` channels over one SSH session.
pub struct SshDialer {
    handle: client::Handle<SshClientHandler>,
}

impl std::fmt::Debug for SshDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshDialer").finish_non_exhaustive()
    }
}

impl SshDialer {
    /// Connect and authenticate to the SSH server described by `desc`.
    ///
    /// The authentication method is resolved first, so a descriptor without
    /// credentials fails before any network I/O.
    pub async fn connect(desc: &TunnelDescriptor) -> Result<Self> {
        let auth = desc.auth()?;
        let key = match &auth {
            SshAuth::PrivateKey { path, passphrase } => {
                Some(load_private_key(path, passphrase.as_deref()).await?)
            }
            SshAuth::Password(_) => None,
        };

        let port = desc.effective_port();
        tracing::info!(host = %desc.host, port, user = %desc.user, "Connecting SSH tunnel");

        let handler = SshClientHandler {
            host: desc.host.clone(),
            port,
            policy: desc.host_key_policy,
            known_hosts: desc.known_hosts.clone(),
        };
        let config = Arc::new(client::Config::default());

        let mut handle = client::connect(config, (desc.host.as_str(), port), handler)
            .await
            .map_err(|e| match e {
                russh::Error::UnknownKey => LazyAdminError::ssh_with_hint(
                    format!("SSH host key for {}:{} is not trusted", desc.host, port),
                    "Add the host to known_hosts (ssh-keyscan) \
                     or set host_key_policy to accept-any",
                ),
                e => LazyAdminError::Ssh {
                    message: format!("Failed to connect to SSH server {}:{}: {e}", desc.host, port),
                    hint: Some("Verify the SSH server is running and reachable".to_string()),
                    source: Some(Box::new(e)),
                },
            })?;

        let authenticated = match (&auth, key) {
            (SshAuth::PrivateKey { .. }, Some(key)) => {
                handle.authenticate_publickey(&desc.user, key).await
            }
            (SshAuth::Password(password), _) => {
                handle.authenticate_password(&desc.user, password).await
            }
            (SshAuth::PrivateKey { .. }, None) => {
                return Err(LazyAdminError::internal("private key was not loaded"));
            }
        }
        .map_err(|e| {
            LazyAdminError::ssh_with_hint(
                format!("SSH authentication error: {e}"),
                "Check your SSH username and credentials",
            )
        })?;

        if !authenticated {
            let _ = handle.disconnect(russh::Disconnect::ByApplication, "", "en").await;
            return Err(LazyAdminError::ssh_with_hint(
                format!("SSH authentication failed for {}@{}", desc.user, desc.host),
                "Check your SSH username and credentials",
            ));
        }

        tracing::info!(host = %desc.host, user = %desc.user, "SSH authentication successful");
        Ok(Self { handle })
    }
}

#[async_trait]
impl RemoteDialer for SshDialer {
    type Stream = russh::ChannelStream<client::Msg>;

    async fn dial(&self, host: &str, port: u16) -> Result<Self::Stream> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(host, u32::from(port), "127.0.0.1", 0)
            .await
            .map_err(|e| {
                LazyAdminError::ssh_with_hint(
                    format!("Failed to open SSH channel to {host}:{port}: {e}"),
                    "The SSH server may not allow TCP forwarding",
                )
            })?;
        Ok(channel.into_stream())
    }

    async fn shutdown(&self) {
        if let Err(e) =
            self.handle.disconnect(russh::Disconnect::ByApplication, "tunnel closed", "en").await
        {
            tracing::warn!(error = %e, "SSH disconnect failed");
        }
    }
}

impl SshTunnel {
    /// Open an SSH session and forward a local port to `remote_host:remote_port`.
    pub async fn open(
        desc: &TunnelDescriptor,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<Self> {
        let dialer = SshDialer::connect(desc).await?;
        Self::start(dialer, remote_host, remote_port, desc.effective_max_connections()).await
    }
}

async fn load_private_key(
    path: &std::path::Path,
    passphrase: Option<&str>,
) -> Result<Arc<KeyPair>> {
    let key_data = tokio::fs::read_to_string(path).await.map_err(|e| {
        LazyAdminError::ssh_with_hint(
            format!("Failed to read SSH key file {}: {e}", path.display()),
            "Check that the key file exists and is readable",
        )
    })?;

    let key = russh_keys::decode_secret_key(&key_data, passphrase).map_err(|e| {
        let hint = if passphrase.is_some() {
            "Check your key passphrase is correct"
        } else {
            "The key may be encrypted; set the tunnel password to its passphrase"
        };
        LazyAdminError::ssh_with_hint(format!("Failed to decode SSH key: {e}"), hint)
    })?;

    Ok(Arc::new(key))
}
