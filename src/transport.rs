//! Link transport
//!
//! Connections never touch sockets directly. They dial or listen through a
//! [`Transport`], which lets tests substitute scripted links for TCP.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

/// A bidirectional byte stream to one peer
pub trait Link: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Link for T {}

/// Type-erased link
pub type BoxLink = Box<dyn Link>;

/// Factory for outbound links and listeners
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a link to `address`
    async fn dial(&self, address: &str) -> io::Result<BoxLink>;

    /// Bind a listener on `address`
    async fn listen(&self, address: &str) -> io::Result<Box<dyn Acceptor>>;
}

/// A bound listener
#[async_trait]
pub trait Acceptor: Send + Sync {
    /// The address actually bound (resolves port 0)
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Wait for the next peer
    async fn accept(&mut self) -> io::Result<(BoxLink, SocketAddr)>;
}

/// TCP transport
#[derive(Debug, Clone)]
pub struct TcpTransport {
    /// Disable Nagle's algorithm on every link
    pub nodelay: bool,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self { nodelay: true }
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn configure_socket(&self, socket: &TcpStream) -> io::Result<()> {
        if self.nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn dial(&self, address: &str) -> io::Result<BoxLink> {
        let socket = TcpStream::connect(address).await?;
        self.configure_socket(&socket)?;
        Ok(Box::new(socket))
    }

    async fn listen(&self, address: &str) -> io::Result<Box<dyn Acceptor>> {
        let listener = TcpListener::bind(address).await?;
        Ok(Box::new(TcpAcceptor {
            listener,
            transport: self.clone(),
        }))
    }
}

struct TcpAcceptor {
    listener: TcpListener,
    transport: TcpTransport,
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    async fn accept(&mut self) -> io::Result<(BoxLink, SocketAddr)> {
        let (socket, peer_addr) = self.listener.accept().await?;
        self.transport.configure_socket(&socket)?;
        let link: BoxLink = Box::new(socket);
        Ok((link, peer_addr))
    }
}
