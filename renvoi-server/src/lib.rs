use futures::stream::StreamExt;
use prelude::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;

pub mod prelude;
pub mod receiver;
pub mod sender;
pub mod tcp;

pub use tcp::TcpServer;

/// Largest datagram a listener reads, matching an EDNS(0) payload.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// How many queries a listener resolves concurrently.
const CONCURRENCY: usize = 64;

#[async_trait::async_trait]
pub trait Handler {
    /// Resolves one inbound message. Returning `None` drops it silently.
    async fn handle(&self, message: Message) -> Option<Message>;
}

#[async_trait::async_trait]
impl<H: Handler + Send + Sync> Handler for Arc<H> {
    async fn handle(&self, message: Message) -> Option<Message> {
        self.as_ref().handle(message).await
    }
}

pub struct UdpServer<H> {
    socket: Arc<UdpSocket>,
    handler: H,
}

impl<H: Handler> UdpServer<H> {
    /// Binds a fresh socket on `address`.
    pub async fn bind(address: SocketAddr, handler: H) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(address).await?;
        Ok(Self::from_socket(socket, handler))
    }

    /// Wraps a pre-bound socket, for service managers that hand them over.
    pub fn from_socket(socket: UdpSocket, handler: H) -> Self {
        Self {
            socket: Arc::new(socket),
            handler,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serves datagrams until `shutdown` fires, then drains the queries
    /// already in flight before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let receiver = receiver::Receiver::new(self.socket.clone());
        let sender = sender::Sender::new(self.socket.clone());

        let stream = receiver
            .into_stream()
            .take_until(async move {
                let _ = shutdown.changed().await;
            })
            .map(|item| async { self.handler.handle(item).await })
            .buffer_unordered(CONCURRENCY)
            .filter_map(|response| async move { response });

        tokio::pin!(stream);

        while let Some(item) = stream.next().await {
            if let Err(error) = sender.send(&item).await {
                tracing::error!("couldn't send message to {:?}: {error:?}", item.address);
            }
        }

        Ok(())
    }
}
