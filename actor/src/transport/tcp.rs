// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # TCP transport
//!
//! Frames are `[length: u32 little-endian][bincode body]`. A client opens one connection per
//! call, writes a single request frame and reads a single response frame. The server keeps
//! serving frames on a connection until the peer closes it.
//!

use super::{
    CacheEntry, CreateActorRequest, ElectionMessage, EnqueueRequest,
    EnqueueResponse, NodeService, Transport,
};
use crate::{actor::ActorDescriptor, Error, HostId};

use async_trait::async_trait;
use futures::{stream, stream::BoxStream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use std::{io::ErrorKind, net::SocketAddr, sync::Arc, time::Duration};

/// Largest accepted frame body.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize, Deserialize)]
enum RpcRequest {
    CreateActorAsLeader(CreateActorRequest),
    CreateLocalActor(CreateActorRequest),
    GetActor(String),
    Enqueue(EnqueueRequest),
    SyncRegistrations(Vec<ActorDescriptor>),
    Ping(String),
    Election(ElectionMessage),
    SyncCache(Vec<CacheEntry>),
}

#[derive(Debug, Serialize, Deserialize)]
enum RpcResponse {
    Actor(ActorDescriptor),
    MaybeActor(Option<ActorDescriptor>),
    Enqueued(EnqueueResponse),
    Pong(String),
    Leader(ElectionMessage),
    Done,
    Failed(Error),
}

fn io_error(peer: &str, error: std::io::Error) -> Error {
    Error::Transport(peer.to_owned(), error.to_string())
}

async fn write_frame<W, T>(writer: &mut W, peer: &str, value: &T) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = bincode::serialize(value)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(Error::Transport(
            peer.to_owned(),
            format!("frame too large: {} bytes", body.len()),
        ));
    }
    writer
        .write_all(&(body.len() as u32).to_le_bytes())
        .await
        .map_err(|e| io_error(peer, e))?;
    writer.write_all(&body).await.map_err(|e| io_error(peer, e))?;
    writer.flush().await.map_err(|e| io_error(peer, e))
}

/// Reads one frame. `Ok(None)` means the peer closed the connection between frames.
async fn read_frame<R, T>(reader: &mut R, peer: &str) -> Result<Option<T>, Error>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut length = [0u8; 4];
    match reader.read_exact(&mut length).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(io_error(peer, e)),
    }
    let length = u32::from_le_bytes(length) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(Error::Transport(
            peer.to_owned(),
            format!("frame too large: {} bytes", length),
        ));
    }
    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|e| io_error(peer, e))?;
    Ok(Some(bincode::deserialize(&body)?))
}

/// Client transport over TCP.
///
/// Every call has a deadline covering the request and the response. Pings and election
/// messages use the short ping deadline so a frozen peer is seen as dead.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    connect_timeout: Duration,
    ping_timeout: Duration,
    request_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..Self::new()
        }
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn deadline(&self, request: &RpcRequest) -> Duration {
        match request {
            RpcRequest::Ping(_) | RpcRequest::Election(_) => self.ping_timeout,
            RpcRequest::Enqueue(EnqueueRequest {
                timeout_ms: Some(ms),
                ..
            }) => self.request_timeout.max(Duration::from_millis(*ms)),
            _ => self.request_timeout,
        }
    }

    async fn call(
        &self,
        target: &HostId,
        request: RpcRequest,
    ) -> Result<RpcResponse, Error> {
        let peer = target.to_string();
        let mut stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((target.address.as_str(), target.port)),
        )
        .await
        .map_err(|_| Error::Transport(peer.clone(), "connect timed out".to_owned()))?
        .map_err(|e| io_error(&peer, e))?;

        let deadline = self.deadline(&request);
        let exchange = async {
            write_frame(&mut stream, &peer, &request).await?;
            read_frame(&mut stream, &peer).await
        };
        let response = tokio::time::timeout(deadline, exchange)
            .await
            .map_err(|_| {
                Error::Transport(
                    peer.clone(),
                    format!("no response within {} ms", deadline.as_millis()),
                )
            })??;
        match response {
            Some(RpcResponse::Failed(error)) => Err(error),
            Some(response) => Ok(response),
            None => Err(Error::Transport(
                peer,
                "connection closed before response".to_owned(),
            )),
        }
    }
}

fn unexpected(target: &HostId, response: RpcResponse) -> Error {
    Error::Transport(
        target.to_string(),
        format!("unexpected response {:?}", response),
    )
}

#[async_trait]
impl Transport for TcpTransport {
    async fn create_actor_as_leader(
        &self,
        target: &HostId,
        request: CreateActorRequest,
    ) -> Result<ActorDescriptor, Error> {
        match self
            .call(target, RpcRequest::CreateActorAsLeader(request))
            .await?
        {
            RpcResponse::Actor(descriptor) => Ok(descriptor),
            other => Err(unexpected(target, other)),
        }
    }

    async fn create_local_actor(
        &self,
        target: &HostId,
        request: CreateActorRequest,
    ) -> Result<ActorDescriptor, Error> {
        match self.call(target, RpcRequest::CreateLocalActor(request)).await? {
            RpcResponse::Actor(descriptor) => Ok(descriptor),
            other => Err(unexpected(target, other)),
        }
    }

    async fn get_actor(
        &self,
        target: &HostId,
        locator: String,
    ) -> Result<Option<ActorDescriptor>, Error> {
        match self.call(target, RpcRequest::GetActor(locator)).await? {
            RpcResponse::MaybeActor(descriptor) => Ok(descriptor),
            other => Err(unexpected(target, other)),
        }
    }

    async fn enqueue(
        &self,
        target: &HostId,
        request: EnqueueRequest,
    ) -> Result<EnqueueResponse, Error> {
        match self.call(target, RpcRequest::Enqueue(request)).await? {
            RpcResponse::Enqueued(response) => Ok(response),
            other => Err(unexpected(target, other)),
        }
    }

    async fn sync_registrations(
        &self,
        target: &HostId,
        registrations: BoxStream<'static, ActorDescriptor>,
    ) -> Result<(), Error> {
        let registrations = registrations.collect::<Vec<_>>().await;
        match self
            .call(target, RpcRequest::SyncRegistrations(registrations))
            .await?
        {
            RpcResponse::Done => Ok(()),
            other => Err(unexpected(target, other)),
        }
    }

    async fn ping(&self, target: &HostId, message: String) -> Result<String, Error> {
        match self.call(target, RpcRequest::Ping(message)).await? {
            RpcResponse::Pong(message) => Ok(message),
            other => Err(unexpected(target, other)),
        }
    }

    async fn election(
        &self,
        target: &HostId,
        message: ElectionMessage,
    ) -> Result<ElectionMessage, Error> {
        match self.call(target, RpcRequest::Election(message)).await? {
            RpcResponse::Leader(leader) => Ok(leader),
            other => Err(unexpected(target, other)),
        }
    }

    async fn sync_cache(
        &self,
        target: &HostId,
        entries: BoxStream<'static, CacheEntry>,
    ) -> Result<(), Error> {
        let entries = entries.collect::<Vec<_>>().await;
        match self.call(target, RpcRequest::SyncCache(entries)).await? {
            RpcResponse::Done => Ok(()),
            other => Err(unexpected(target, other)),
        }
    }
}

/// Accepts node protocol connections and dispatches them to a `NodeService`.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Binds the listening socket, e.g. `0.0.0.0:6161`.
    pub async fn bind(addr: &str) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| io_error(addr, e))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.listener
            .local_addr()
            .map_err(|e| Error::Transport("listener".to_owned(), e.to_string()))
    }

    /// Serves connections until the token is cancelled.
    pub async fn serve(self, service: Arc<dyn NodeService>, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Node server stopped.");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let service = service.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, &peer.to_string(), service).await {
                                    warn!("Connection with {} failed: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => error!("Accept failed: {}", e),
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: &str,
    service: Arc<dyn NodeService>,
) -> Result<(), Error> {
    while let Some(request) = read_frame::<_, RpcRequest>(&mut stream, peer).await? {
        let response = dispatch(service.as_ref(), request).await;
        write_frame(&mut stream, peer, &response).await?;
    }
    Ok(())
}

async fn dispatch(service: &dyn NodeService, request: RpcRequest) -> RpcResponse {
    let response = match request {
        RpcRequest::CreateActorAsLeader(request) => service
            .create_actor_as_leader(request)
            .await
            .map(RpcResponse::Actor),
        RpcRequest::CreateLocalActor(request) => service
            .create_local_actor(request)
            .await
            .map(RpcResponse::Actor),
        RpcRequest::GetActor(locator) => service
            .get_actor(locator)
            .await
            .map(RpcResponse::MaybeActor),
        RpcRequest::Enqueue(request) => {
            service.enqueue(request).await.map(RpcResponse::Enqueued)
        }
        RpcRequest::SyncRegistrations(registrations) => service
            .sync_registrations(stream::iter(registrations).boxed())
            .await
            .map(|_| RpcResponse::Done),
        RpcRequest::Ping(message) => service.ping(message).await.map(RpcResponse::Pong),
        RpcRequest::Election(message) => {
            service.election(message).await.map(RpcResponse::Leader)
        }
        RpcRequest::SyncCache(entries) => service
            .sync_cache(stream::iter(entries).boxed())
            .await
            .map(|_| RpcResponse::Done),
    };
    response.unwrap_or_else(RpcResponse::Failed)
}

#[cfg(test)]
mod tests {

    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip_over_duplex() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        let message = ElectionMessage {
            host: "node-1".to_owned(),
            port: 6161,
            priority: Some(7),
        };
        write_frame(&mut client, "peer", &RpcRequest::Election(message.clone()))
            .await
            .unwrap();
        drop(client);

        let request: Option<RpcRequest> = read_frame(&mut server, "peer").await.unwrap();
        match request {
            Some(RpcRequest::Election(received)) => assert_eq!(received, message),
            other => panic!("unexpected frame {:?}", other),
        }
        let next: Option<RpcRequest> = read_frame(&mut server, "peer").await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_FRAME_SIZE as u32) + 1).to_le_bytes())
            .await
            .unwrap();
        let result: Result<Option<RpcRequest>, Error> =
            read_frame(&mut server, "peer").await;
        assert!(matches!(result, Err(Error::Transport(..))));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_delivery_failure() {
        let transport = TcpTransport::with_connect_timeout(Duration::from_millis(200));
        let result = transport
            .ping(&HostId::new("127.0.0.1", 1), "ping".to_owned())
            .await;
        assert!(result.unwrap_err().is_delivery_failure());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        // Accepts connections and never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let transport = TcpTransport::new().ping_timeout(Duration::from_millis(200));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            transport.ping(&HostId::new("127.0.0.1", port), "ping".to_owned()),
        )
        .await
        .expect("ping must give up on its own");
        let error = result.unwrap_err();
        assert!(error.is_delivery_failure());
        assert!(error.to_string().contains("no response within 200 ms"));
        silent.abort();
    }
}
