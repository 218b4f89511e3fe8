//! Full socket-based integration tests for client <-> server communication.

use std::time::Duration;

use anyhow::bail;
use tokio::net::TcpStream;
use world_shared::{
    definitions::Definitions,
    location::Location,
    net::{decode, encode, read_frame, write_frame, ClientMsg, LoginCode, ServerMsg},
};
use world_server::store::{PlayerRecord, PlayerStore};
use world_tests::{init_tracing, wait_until, RunningServer, TestClient};

const TICK_MS: u64 = 20;
const WAIT: Duration = Duration::from_secs(5);

async fn saved_record(server: &RunningServer, username: &str) -> anyhow::Result<PlayerRecord> {
    for _ in 0..500 {
        if let Some(record) = server.ctx.store.load(username).await? {
            return Ok(record);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("{} was never saved", username)
}

/// Login, walk a few tiles, log out; the new position is persisted.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn login_walk_logout_roundtrip() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(TICK_MS, Definitions::default()).await?;

    let mut alice = TestClient::login(server.addr, "alice").await?;
    assert_eq!(alice.response.location, Some(Location::SPAWN));
    assert!(alice.response.skills.is_some());
    assert_eq!(server.world.player_count(), 1);

    let dest = Location::new(Location::SPAWN.x + 3, Location::SPAWN.y);
    alice.accept_design().await?;
    alice
        .send(ClientMsg::WalkTo {
            waypoints: vec![dest],
        })
        .await?;
    alice
        .recv_until(WAIT, |m| {
            matches!(m, ServerMsg::Positions(d) if d.own.map(|o| o.location) == Some(dest))
        })
        .await?;

    alice.send(ClientMsg::Logout).await?;
    let msg = alice
        .recv_until(WAIT, |m| matches!(m, ServerMsg::Logout { .. }))
        .await?;
    assert_eq!(
        msg,
        ServerMsg::Logout {
            reason: "logout".to_string()
        }
    );

    let world = server.world.clone();
    wait_until(WAIT, || world.player_count() == 0).await?;
    let record = saved_record(&server, "alice").await?;
    assert_eq!(record.location, dest);
    assert!(!record.needs_design);

    // Coming back puts the character where it left off.
    let again = TestClient::login(server.addr, "Alice").await?;
    assert_eq!(again.response.location, Some(dest));

    server.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_and_invalid_logins_are_rejected() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(TICK_MS, Definitions::default()).await?;

    let _bob = TestClient::login(server.addr, "bob").await?;

    let (mut conn, resp) = TestClient::try_login(server.addr, "BOB").await?;
    assert_eq!(resp.code, LoginCode::AlreadyOnline);
    assert!(resp.index.is_none());
    assert!(conn.recv::<ServerMsg>().await.is_err());

    let (_conn, resp) = TestClient::try_login(server.addr, "no!pe").await?;
    assert_eq!(resp.code, LoginCode::InvalidName);

    let (_conn, resp) = TestClient::try_login(server.addr, "muchtoolongname").await?;
    assert_eq!(resp.code, LoginCode::InvalidName);

    assert_eq!(server.world.player_count(), 1);
    server.stop().await
}

/// A connection that does not start with a login is dropped unanswered.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn intent_before_login_closes_connection() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(TICK_MS, Definitions::default()).await?;

    let mut conn = world_shared::net::ReliableConn::connect(server.addr).await?;
    conn.send(&ClientMsg::Ping).await?;
    assert!(conn.recv::<ServerMsg>().await.is_err());
    assert_eq!(server.world.player_count(), 0);

    server.stop().await
}

/// Garbage frames are skipped; the connection keeps working.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_frame_is_tolerated() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(TICK_MS, Definitions::default()).await?;

    let mut stream = TcpStream::connect(server.addr).await?;
    let login = ClientMsg::Login {
        username: "carol".to_string(),
    };
    write_frame(&mut stream, &encode(&login)?).await?;
    write_frame(&mut stream, b"{ not json").await?;
    write_frame(&mut stream, &encode(&ClientMsg::Ping)?).await?;

    let mut got_login = false;
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(tokio::time::Instant::now());
        let Ok(frame) = tokio::time::timeout(left, read_frame(&mut stream)).await else {
            bail!("no pong after a malformed frame");
        };
        let Some(payload) = frame? else {
            bail!("server closed the connection");
        };
        match decode::<ServerMsg>(&payload)? {
            ServerMsg::LoginResponse(resp) => {
                assert_eq!(resp.code, LoginCode::Success);
                got_login = true;
            }
            ServerMsg::Pong => break,
            _ => {}
        }
    }
    assert!(got_login);
    assert_eq!(server.world.player_count(), 1);

    server.stop().await
}

/// Two players logging in at the same spot see each other and can talk.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nearby_players_see_and_hear_each_other() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(TICK_MS, Definitions::default()).await?;

    let mut alice = TestClient::login(server.addr, "alice").await?;
    let mut bob = TestClient::login(server.addr, "bob").await?;
    let bob_index = bob.index;

    alice
        .recv_until(WAIT, |m| {
            matches!(m, ServerMsg::Positions(d)
                if d.players_entering.iter().any(|u| u.index == bob_index))
        })
        .await?;

    bob.send(ClientMsg::Chat {
        text: "hello".to_string(),
    })
    .await?;
    let heard = alice
        .recv_until(WAIT, |m| matches!(m, ServerMsg::Chat { .. }))
        .await?;
    assert_eq!(
        heard,
        ServerMsg::Chat {
            index: bob_index,
            username: "bob".to_string(),
            text: "hello".to_string(),
        }
    );

    bob.send(ClientMsg::Command {
        line: "where".to_string(),
    })
    .await?;
    let msg = bob
        .recv_until(WAIT, |m| matches!(m, ServerMsg::Message { .. }))
        .await?;
    let ServerMsg::Message { text } = msg else {
        unreachable!()
    };
    assert!(text.starts_with("You are at (122, 657)"), "{}", text);

    // Bob leaving shows up on Alice's side.
    bob.send(ClientMsg::Logout).await?;
    alice
        .recv_until(WAIT, |m| {
            matches!(m, ServerMsg::Positions(d) if d.players_leaving.contains(&bob_index))
        })
        .await?;

    server.stop().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operator_can_kick_from_console() -> anyhow::Result<()> {
    init_tracing();
    let server = RunningServer::start(TICK_MS, Definitions::default()).await?;

    let mut dave = TestClient::login(server.addr, "dave").await?;
    server.console("kick dave").await?;
    let msg = dave
        .recv_until(WAIT, |m| matches!(m, ServerMsg::Logout { .. }))
        .await?;
    assert_eq!(
        msg,
        ServerMsg::Logout {
            reason: "kicked".to_string()
        }
    );
    let world = server.world.clone();
    wait_until(WAIT, || world.player_count() == 0).await?;

    server.stop().await
}
