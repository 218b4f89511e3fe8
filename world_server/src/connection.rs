//! Per-connection tasks.
//!
//! Every socket gets three tasks:
//! - a reader that decodes frames into intents on a bounded queue,
//! - a writer that drains the player's bounded outbound queue onto the socket,
//! - the coordinator (this module's [`serve`]) that logs the player in,
//!   dispatches intents, and tears everything down once the connection's
//!   [`KillSignal`] fires.
//!
//! Teardown waits for both I/O tasks before the player leaves the world, so
//! nothing is written for a player that is no longer registered.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::AsyncWriteExt,
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::mpsc,
    time,
};
use tracing::{debug, info, warn};
use world_shared::{
    entity::{MobState, MobileEntity},
    kill::KillSignal,
    net::{
        decode, encode, read_frame, write_frame, ClientMsg, LoginCode, LoginResponse,
        ReliableConn, ServerMsg,
    },
    player::{Player, Session},
    skills::SkillTable,
};

use crate::{
    handlers,
    server::ServerContext,
    store::PlayerRecord,
};

/// Longest accepted username.
pub const MAX_USERNAME_LEN: usize = 12;

fn valid_username(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && name.len() <= MAX_USERNAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '_')
}

/// Serves one client connection until it closes.
pub async fn serve(conn: ReliableConn, peer: SocketAddr, ctx: Arc<ServerContext>) {
    let (rd, wr) = conn.into_split();
    let (session, outbound_rx) = Session::new(ctx.cfg.outbound_capacity);
    let kill = session.kill.clone();
    let (intent_tx, mut intent_rx) = mpsc::channel(ctx.cfg.inbound_capacity);
    let idle = Duration::from_millis(ctx.cfg.idle_timeout_ms);

    let reader = tokio::spawn(read_loop(rd, intent_tx, kill.clone(), idle, peer));
    let writer = tokio::spawn(write_loop(wr, outbound_rx, kill.clone(), peer));

    let player = login(&ctx, &mut intent_rx, session.clone(), peer).await;

    if let Some(player) = &player {
        loop {
            tokio::select! {
                _ = kill.closed() => break,
                intent = intent_rx.recv() => match intent {
                    Some(msg) => handlers::dispatch(&ctx, player, msg),
                    None => break,
                },
            }
        }
    }

    if !kill.is_closed() {
        kill.close();
    }
    // Leftover intents are discarded; the reader may be parked on a full queue.
    drop(intent_rx);
    if let Err(e) = reader.await {
        warn!(%peer, error = %e, "Reader task failed");
    }
    if let Err(e) = writer.await {
        warn!(%peer, error = %e, "Writer task failed");
    }

    if let Some(player) = player {
        teardown(&ctx, &player).await;
    }
    debug!(%peer, "Connection closed");
}

/// Waits for the login intent and registers the player. Failures are
/// answered on the outbound queue and close the connection.
async fn login(
    ctx: &ServerContext,
    intents: &mut mpsc::Receiver<ClientMsg>,
    session: Session,
    peer: SocketAddr,
) -> Option<Arc<Player>> {
    let kill = session.kill.clone();
    let first = tokio::select! {
        _ = kill.closed() => None,
        msg = intents.recv() => msg,
    };
    let username = match first {
        Some(ClientMsg::Login { username }) => username.trim().to_string(),
        Some(other) => {
            warn!(%peer, ?other, "Expected a login");
            kill.close();
            return None;
        }
        None => return None,
    };

    let reject = |code: LoginCode| {
        info!(%peer, %username, ?code, "Login rejected");
        let _ = session
            .outbound
            .try_send(ServerMsg::LoginResponse(LoginResponse::rejected(code)));
        kill.close();
    };

    if !valid_username(&username) {
        reject(LoginCode::InvalidName);
        return None;
    }
    let record = match ctx.store.load(&username).await {
        Ok(Some(record)) => record,
        Ok(None) => PlayerRecord::new_character(ctx.cfg.spawn),
        Err(e) => {
            warn!(%peer, %username, error = %e, "Could not load player");
            reject(LoginCode::InvalidName);
            return None;
        }
    };

    let player = match ctx.world.add_player(
        &username,
        record.location,
        SkillTable::from_snapshot(record.skills),
        record.appearance,
        session.clone(),
    ) {
        Ok(p) => p,
        Err(code) => {
            reject(code);
            return None;
        }
    };
    player.core().set_fight_mode(record.fight_mode);
    if record.needs_design {
        player.core().add_state(MobState::CHANGING_APPEARANCE);
    }

    let response = ServerMsg::LoginResponse(LoginResponse {
        code: LoginCode::Success,
        index: Some(player.index()),
        location: Some(player.location()),
        skills: Some(player.skills().snapshot()),
    });
    if let Err(e) = player.send(response) {
        warn!(%peer, error = %e, "Could not queue login response");
        player.disconnect();
    }
    info!(%peer, index = player.index(), %username, location = %player.location(), "Player logged in");
    Some(player)
}

/// Removes a player from the world and saves it.
async fn teardown(ctx: &ServerContext, player: &Arc<Player>) {
    ctx.world.reset_fighting(player.as_ref(), chrono::Utc::now());
    if ctx.world.remove_player(player.index()).is_none() {
        warn!(index = player.index(), "Player was already removed");
        return;
    }
    let record = PlayerRecord::capture(player);
    if let Err(e) = ctx.store.save(player.username(), &record).await {
        warn!(player = %player.username(), error = %e, "Could not save player");
    }
    info!(index = player.index(), username = %player.username(), "Player logged out");
}

async fn read_loop(
    mut rd: OwnedReadHalf,
    intents: mpsc::Sender<ClientMsg>,
    kill: KillSignal,
    idle: Duration,
    peer: SocketAddr,
) {
    loop {
        let frame = tokio::select! {
            _ = kill.closed() => break,
            frame = time::timeout(idle, read_frame(&mut rd)) => frame,
        };
        let payload = match frame {
            Err(_) => {
                info!(%peer, "Connection idle for too long");
                break;
            }
            Ok(Ok(Some(payload))) => payload,
            Ok(Ok(None)) => {
                debug!(%peer, "Peer closed the connection");
                break;
            }
            Ok(Err(e)) => {
                debug!(%peer, error = %e, "Read failed");
                break;
            }
        };
        let msg = match decode::<ClientMsg>(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(%peer, error = %e, "Dropping malformed frame");
                continue;
            }
        };
        tokio::select! {
            _ = kill.closed() => break,
            sent = intents.send(msg) => if sent.is_err() { break },
        }
    }
    if !kill.is_closed() {
        kill.close();
    }
}

async fn write_loop(
    mut wr: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<ServerMsg>,
    kill: KillSignal,
    peer: SocketAddr,
) {
    loop {
        tokio::select! {
            biased;
            msg = outbound.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = write_msg(&mut wr, &msg).await {
                    debug!(%peer, error = %e, "Write failed");
                    break;
                }
            }
            _ = kill.closed() => {
                // Flush what was queued before the close, e.g. a logout.
                while let Ok(msg) = outbound.try_recv() {
                    if write_msg(&mut wr, &msg).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }
    let _ = wr.shutdown().await;
    if !kill.is_closed() {
        kill.close();
    }
}

async fn write_msg(wr: &mut OwnedWriteHalf, msg: &ServerMsg) -> anyhow::Result<()> {
    let payload = encode(msg)?;
    write_frame(wr, &payload).await
}
