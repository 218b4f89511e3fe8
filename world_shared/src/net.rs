//! Networking primitives.
//!
//! - Message types exchanged between clients and the world server.
//! - A reference transport: u32 big-endian length + JSON payload frames.
//!
//! The frame codec stands in for the game's real wire format; only the
//! semantic payload of each message is fixed here.

use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context};
use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    time,
};

use crate::{
    appearance::Appearance,
    combat::FightMode,
    location::{Direction, Location},
    skills::SkillSnapshot,
};

/// Largest payload a single frame may carry.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Client -> server intents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientMsg {
    Login {
        username: String,
    },
    /// Walk along explicit waypoints; the last one is the destination.
    WalkTo {
        waypoints: Vec<Location>,
    },
    /// Use the object at `(x, y)`. `secondary` picks the second command.
    InteractObject {
        x: i32,
        y: i32,
        secondary: bool,
    },
    Chat {
        text: String,
    },
    /// Operator/player command line without the leading `::`.
    Command {
        line: String,
    },
    ChangeAppearance(Appearance),
    SetFightMode {
        mode: FightMode,
    },
    Ping,
    Logout,
}

/// Outcome of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginCode {
    Success,
    WorldFull,
    AlreadyOnline,
    InvalidName,
}

/// Server -> client messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerMsg {
    LoginResponse(LoginResponse),
    Positions(PositionDelta),
    Appearances(AppearanceDelta),
    Objects(ObjectDelta),
    /// Plain game message.
    Message {
        text: String,
    },
    /// Public chat from a nearby player.
    Chat {
        index: usize,
        username: String,
        text: String,
    },
    Pong,
    Logout {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginResponse {
    pub code: LoginCode,
    /// Player index on success.
    pub index: Option<usize>,
    pub location: Option<Location>,
    pub skills: Option<SkillSnapshot>,
}

impl LoginResponse {
    pub fn rejected(code: LoginCode) -> Self {
        Self {
            code,
            index: None,
            location: None,
            skills: None,
        }
    }
}

/// Position and facing of a mob.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MobUpdate {
    pub index: usize,
    pub location: Location,
    pub direction: Direction,
}

/// An NPC as seen by a client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NpcUpdate {
    pub index: usize,
    /// Definition id.
    pub id: u32,
    pub location: Location,
    pub direction: Direction,
}

/// Mob movement since the previous tick, relative to what the client knows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PositionDelta {
    /// The observer's own position when it moved, turned or teleported.
    pub own: Option<MobUpdate>,
    pub players_entering: Vec<MobUpdate>,
    pub players_leaving: Vec<usize>,
    pub players_moved: Vec<MobUpdate>,
    pub npcs_entering: Vec<NpcUpdate>,
    pub npcs_leaving: Vec<usize>,
    pub npcs_moved: Vec<NpcUpdate>,
}

impl PositionDelta {
    pub fn is_empty(&self) -> bool {
        self.own.is_none()
            && self.players_entering.is_empty()
            && self.players_leaving.is_empty()
            && self.players_moved.is_empty()
            && self.npcs_entering.is_empty()
            && self.npcs_leaving.is_empty()
            && self.npcs_moved.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppearanceUpdate {
    pub index: usize,
    pub username: String,
    pub appearance: Appearance,
    pub combat_level: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppearanceDelta {
    pub entries: Vec<AppearanceUpdate>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectUpdate {
    pub index: usize,
    pub id: u32,
    pub location: Location,
    pub direction: u8,
    pub boundary: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectDelta {
    pub entering: Vec<ObjectUpdate>,
    pub leaving: Vec<ObjectUpdate>,
}

impl ObjectDelta {
    pub fn is_empty(&self) -> bool {
        self.entering.is_empty() && self.leaving.is_empty()
    }
}

/// Serializes a message into a frame payload.
pub fn encode<T: Serialize>(msg: &T) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode<T: DeserializeOwned>(b: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(b).context("deserialize")
}

/// Writes one length-prefixed frame.
pub async fn write_frame<W>(w: &mut W, payload: &[u8]) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        bail!("frame of {} bytes exceeds {}", payload.len(), MAX_FRAME_LEN);
    }
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    w.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

/// Reads one length-prefixed frame. Returns `None` when the peer closed the
/// stream cleanly between frames.
pub async fn read_frame<R>(r: &mut R) -> anyhow::Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match r.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("tcp read len"),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("peer announced a {} byte frame (limit {})", len, MAX_FRAME_LEN);
    }
    let mut payload = BytesMut::zeroed(len);
    r.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    Ok(Some(payload.freeze()))
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("set nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send<T: Serialize>(&mut self, msg: &T) -> anyhow::Result<()> {
        let payload = encode(msg)?;
        write_frame(&mut self.stream, &payload).await
    }

    pub async fn recv<T: DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        match read_frame(&mut self.stream).await? {
            Some(payload) => decode(&payload),
            None => bail!("connection closed"),
        }
    }

    /// Receives a message within the given timeout.
    pub async fn recv_timeout<T: DeserializeOwned>(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<Option<T>> {
        match time::timeout(timeout, self.recv()).await {
            Ok(msg) => msg.map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently owned read and write halves.
    pub fn into_split(self) -> (OwnedReadHalf, OwnedWriteHalf) {
        self.stream.into_split()
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("set nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
