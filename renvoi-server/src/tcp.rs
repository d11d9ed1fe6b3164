use crate::prelude::{Message, Transport};
use crate::Handler;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

pub struct TcpServer<H> {
    listener: TcpListener,
    handler: Arc<H>,
}

impl<H: Handler + Send + Sync + 'static> TcpServer<H> {
    /// Binds a fresh listener on `address`.
    pub async fn bind(address: SocketAddr, handler: H) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self::from_listener(listener, handler))
    }

    /// Wraps a pre-bound listener, for service managers that hand them over.
    pub fn from_listener(listener: TcpListener, handler: H) -> Self {
        Self {
            listener,
            handler: Arc::new(handler),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` fires, then waits for the open
    /// connections to finish their in-flight exchange.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let mut connections: JoinSet<()> = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => {
                    let (stream, address) = accepted?;
                    tracing::debug!("accepted connection from {address:?}");
                    let handler = Arc::clone(&self.handler);
                    let signal = shutdown.clone();
                    connections.spawn(async move {
                        if let Err(error) = serve_connection(stream, address, handler, signal).await {
                            tracing::debug!("connection from {address:?} ended: {error:?}");
                        }
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

/// One query/response exchange at a time, each message prefixed with its
/// length on two bytes.
async fn serve_connection<H: Handler + Send + Sync>(
    mut stream: TcpStream,
    address: SocketAddr,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    loop {
        let length = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            length = stream.read_u16() => match length {
                Ok(length) => length as usize,
                // the client closing between queries is the normal way out
                Err(_) => return Ok(()),
            },
        };
        let mut buffer = vec![0u8; length];
        stream.read_exact(&mut buffer).await?;
        let message = Message {
            address,
            transport: Transport::Tcp,
            buffer,
        };
        match handler.handle(message).await {
            Some(response) => {
                stream.write_u16(response.buffer.len() as u16).await?;
                stream.write_all(&response.buffer).await?;
            }
            // a dropped query ends the stream, there is nothing sensible to write
            None => return Ok(()),
        }
    }
}
