//! Shared helpers for the integration tests: a background server handle, a
//! small line-of-sight test client and definition builders.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use world_server::server::{bind_ephemeral, ServerContext};
use world_shared::{
    definitions::{Definitions, NpcDef, ObjectDef},
    net::{ClientMsg, LoginCode, LoginResponse, ReliableConn, ServerMsg},
    world::World,
};

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A server ticking on a background task until [`RunningServer::stop`].
pub struct RunningServer {
    pub addr: SocketAddr,
    pub world: Arc<World>,
    pub ctx: Arc<ServerContext>,
    console: mpsc::Sender<String>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningServer {
    pub async fn start(tick_ms: u64, definitions: Definitions) -> anyhow::Result<Self> {
        let (mut server, _cfg) = bind_ephemeral(tick_ms, definitions).await?;
        let (console, rx) = mpsc::channel(8);
        server.set_console_input(rx);
        let addr = server.local_addr();
        let world = Arc::clone(server.world());
        let ctx = Arc::clone(server.context());
        let handle = tokio::spawn(async move { server.run().await });
        Ok(Self {
            addr,
            world,
            ctx,
            console,
            handle,
        })
    }

    /// Queues an operator console line for the next tick.
    pub async fn console(&self, line: &str) -> anyhow::Result<()> {
        self.console
            .send(line.to_string())
            .await
            .context("console closed")
    }

    /// Types `quit` on the console and waits for the loop to exit.
    pub async fn stop(self) -> anyhow::Result<()> {
        self.console("quit").await?;
        self.handle.await.context("server task panicked")?
    }
}

/// Polls `f` until it returns true or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut f: F) -> anyhow::Result<()>
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !f() {
        if Instant::now() >= deadline {
            bail!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// Minimal client speaking the frame protocol.
pub struct TestClient {
    conn: ReliableConn,
    pub index: usize,
    pub response: LoginResponse,
}

impl TestClient {
    /// Connects and sends a login, returning whatever the server answered.
    pub async fn try_login(
        addr: SocketAddr,
        username: &str,
    ) -> anyhow::Result<(ReliableConn, LoginResponse)> {
        let mut conn = ReliableConn::connect(addr).await?;
        conn.send(&ClientMsg::Login {
            username: username.to_string(),
        })
        .await?;
        loop {
            match conn.recv_timeout::<ServerMsg>(Duration::from_secs(5)).await? {
                Some(ServerMsg::LoginResponse(resp)) => return Ok((conn, resp)),
                Some(_) => continue,
                None => bail!("no login response for {}", username),
            }
        }
    }

    pub async fn login(addr: SocketAddr, username: &str) -> anyhow::Result<Self> {
        let (conn, response) = Self::try_login(addr, username).await?;
        if response.code != LoginCode::Success {
            bail!("login for {} failed: {:?}", username, response.code);
        }
        let index = response.index.context("login response without an index")?;
        Ok(Self {
            conn,
            index,
            response,
        })
    }

    pub async fn send(&mut self, msg: ClientMsg) -> anyhow::Result<()> {
        self.conn.send(&msg).await
    }

    /// Reads messages until one satisfies `pred`, discarding the rest.
    pub async fn recv_until<F>(&mut self, timeout: Duration, mut pred: F) -> anyhow::Result<ServerMsg>
    where
        F: FnMut(&ServerMsg) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.conn.recv_timeout::<ServerMsg>(left).await? {
                Some(msg) if pred(&msg) => return Ok(msg),
                Some(_) => continue,
                None => bail!("no matching message within {:?}", timeout),
            }
        }
    }

    /// Dismisses the character design screen new characters start on.
    pub async fn accept_design(&mut self) -> anyhow::Result<()> {
        self.send(ClientMsg::ChangeAppearance(Default::default())).await
    }
}

pub fn npc_def(id: u32, name: &str) -> NpcDef {
    NpcDef {
        id,
        name: name.to_string(),
        command: String::new(),
        hits: 10,
        attack: 5,
        strength: 5,
        defense: 5,
        attackable: true,
    }
}

pub fn object_def(id: u32, name: &str, commands: [&str; 2], solid: bool) -> ObjectDef {
    ObjectDef {
        id,
        name: name.to_string(),
        commands: commands.map(str::to_string),
        solid,
    }
}
