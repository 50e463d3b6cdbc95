//! Load-generating attach client.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::codec::{self, CodecError, IMSI_MAX_DIGITS, IMSI_MIN_DIGITS};

/// Default time to wait for a verdict.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest verdict the gateway sends.
const MAX_REPLY: usize = 64;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("MCC must be 100..=999, got {0}")]
    InvalidMcc(u16),

    #[error("MNC must be 10..=999, got {0}")]
    InvalidMnc(u16),

    #[error("IMSI length must be {min}..={max}, got {len}")]
    InvalidLength { len: usize, min: usize, max: usize },

    #[error("invalid IMSI: {0}")]
    Codec(#[from] CodecError),

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Generate a random IMSI: 3-digit MCC, 2 or 3-digit MNC, random MSIN.
pub fn generate_imsi(mcc: u16, mnc: u16, len: usize) -> Result<String, ClientError> {
    if !(100..=999).contains(&mcc) {
        return Err(ClientError::InvalidMcc(mcc));
    }
    if !(10..=999).contains(&mnc) {
        return Err(ClientError::InvalidMnc(mnc));
    }
    if !(IMSI_MIN_DIGITS..=IMSI_MAX_DIGITS).contains(&len) {
        return Err(ClientError::InvalidLength {
            len,
            min: IMSI_MIN_DIGITS,
            max: IMSI_MAX_DIGITS,
        });
    }

    let mut imsi = if mnc < 100 {
        format!("{mcc:03}{mnc:02}")
    } else {
        format!("{mcc:03}{mnc:03}")
    };

    let mut rng = rand::thread_rng();
    while imsi.len() < len {
        imsi.push(char::from(b'0' + rng.gen_range(0..10u8)));
    }

    Ok(imsi)
}

/// UDP client bound to one gateway.
pub struct UdpClient {
    socket: UdpSocket,
    server: SocketAddr,
    timeout: Duration,
}

impl UdpClient {
    /// Bind an ephemeral local port and connect it to `server`.
    pub async fn connect(server: SocketAddr) -> Result<Self, ClientError> {
        let local: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(server).await?;

        Ok(Self {
            socket,
            server,
            timeout: DEFAULT_RECEIVE_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// BCD-encode and send one attach request.
    pub async fn send_imsi(&self, imsi: &str) -> Result<(), ClientError> {
        let payload = codec::encode(imsi)?;
        self.send_raw(&payload).await
    }

    /// Send an arbitrary payload.
    pub async fn send_raw(&self, payload: &[u8]) -> Result<(), ClientError> {
        self.socket.send(payload).await?;
        debug!(server = %self.server, bytes = payload.len(), "attach sent");
        Ok(())
    }

    /// Wait for one verdict.
    pub async fn receive(&self) -> Result<String, ClientError> {
        let mut buf = [0u8; MAX_REPLY];
        let len = tokio::time::timeout(self.timeout, self.socket.recv(&mut buf))
            .await
            .map_err(|_| ClientError::Timeout(self.timeout))??;

        Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
    }

    /// Send one attach and wait for its verdict.
    pub async fn attach(&self, imsi: &str) -> Result<String, ClientError> {
        self.send_imsi(imsi).await?;
        self.receive().await
    }
}
