//! Connected players.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, RwLock,
};

use anyhow::bail;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::{
    appearance::Appearance,
    entity::{MobCore, MobKind, MobileEntity},
    grid::Grid,
    kill::KillSignal,
    location::Location,
    lock,
    net::{ObjectUpdate, ServerMsg},
    skills::SkillTable,
    world::World,
};

/// Deferred intent, re-run every tick until it reports completion.
pub type DistancedAction = Box<dyn FnMut(&World, &Arc<Player>) -> bool + Send>;

/// The connection side a player is bound to.
#[derive(Debug, Clone)]
pub struct Session {
    pub outbound: mpsc::Sender<ServerMsg>,
    pub kill: KillSignal,
}

impl Session {
    /// A session with a fresh outbound queue; the receiver goes to the
    /// connection's writer.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ServerMsg>) {
        let (outbound, rx) = mpsc::channel(capacity);
        (
            Self {
                outbound,
                kill: KillSignal::new(),
            },
            rx,
        )
    }
}

/// What a player was last told about. Objects keep the state that was sent
/// so a replaced object reusing an index is still noticed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownSets {
    pub players: HashSet<usize>,
    pub npcs: HashSet<usize>,
    pub objects: HashMap<usize, ObjectUpdate>,
}

pub struct Player {
    core: MobCore,
    username: String,
    appearance: RwLock<Appearance>,
    appearance_changed: AtomicBool,
    connected: AtomicBool,
    removing: AtomicBool,
    known: Mutex<KnownSets>,
    session: Session,
    action: Mutex<Option<DistancedAction>>,
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("index", &self.core.index())
            .field("username", &self.username)
            .field("location", &self.core.location())
            .finish()
    }
}

impl Player {
    /// Builds a player. Grid registration is done by the world.
    pub fn new(
        index: usize,
        username: impl Into<String>,
        location: Location,
        skills: SkillTable,
        appearance: Appearance,
        session: Session,
    ) -> Self {
        Self {
            core: MobCore::new(index, location, skills),
            username: username.into(),
            appearance: RwLock::new(appearance),
            // Everybody needs to learn what a fresh login looks like.
            appearance_changed: AtomicBool::new(true),
            connected: AtomicBool::new(true),
            removing: AtomicBool::new(false),
            known: Mutex::new(KnownSets::default()),
            session,
            action: Mutex::new(None),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn appearance(&self) -> Appearance {
        *lock::read(&self.appearance)
    }

    pub fn set_appearance(&self, appearance: Appearance) {
        *lock::write(&self.appearance) = appearance;
        self.appearance_changed.store(true, Ordering::Release);
    }

    pub fn appearance_changed(&self) -> bool {
        self.appearance_changed.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_removing(&self) -> bool {
        self.removing.load(Ordering::Acquire)
    }

    /// Marks the player as leaving. Returns `false` if it already was.
    pub(crate) fn begin_removal(&self) -> bool {
        self.connected.store(false, Ordering::Release);
        !self.removing.swap(true, Ordering::AcqRel)
    }

    pub fn kill_signal(&self) -> &KillSignal {
        &self.session.kill
    }

    /// Asks the connection to shut down.
    pub fn disconnect(&self) {
        if !self.session.kill.is_closed() {
            self.session.kill.close();
        }
    }

    /// Queues a message without waiting. A full queue means the client is not
    /// keeping up; that is reported as an error so the caller can drop it.
    pub fn send(&self, msg: ServerMsg) -> anyhow::Result<()> {
        match self.session.outbound.try_send(msg) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => bail!("outbound queue of {} is full", self.username),
            Err(TrySendError::Closed(_)) => {
                debug!(player = %self.username, "Outbound queue closed");
                Ok(())
            }
        }
    }

    /// Queues a game message, disconnecting the player if it cannot keep up.
    pub fn message(&self, text: impl Into<String>) {
        if let Err(e) = self.send(ServerMsg::Message { text: text.into() }) {
            warn!(error = %e, "Dropping slow client");
            self.disconnect();
        }
    }

    pub fn known(&self) -> KnownSets {
        lock::lock(&self.known).clone()
    }

    pub fn replace_known(&self, known: KnownSets) {
        *lock::lock(&self.known) = known;
    }

    /// Queues an action for the tick to retry until it completes. Replaces
    /// any action already waiting.
    pub fn set_distanced_action(&self, action: DistancedAction) {
        *lock::lock(&self.action) = Some(action);
    }

    pub fn clear_distanced_action(&self) {
        lock::lock(&self.action).take();
    }

    pub fn has_distanced_action(&self) -> bool {
        lock::lock(&self.action).is_some()
    }

    /// Runs the waiting action, if any. Keeps it for the next tick unless it
    /// completed or a new one was queued while it ran.
    pub fn run_distanced_action(self: &Arc<Self>, world: &World) {
        let Some(mut action) = lock::lock(&self.action).take() else {
            return;
        };
        if action(world, self) {
            return;
        }
        let mut slot = lock::lock(&self.action);
        if slot.is_none() {
            *slot = Some(action);
        }
    }

    /// Clears per-tick flags after view sync.
    pub fn reset_tick_flags(&self) {
        self.core.reset_sync_flags();
        self.appearance_changed.store(false, Ordering::Release);
    }
}

impl MobileEntity for Player {
    fn core(&self) -> &MobCore {
        &self.core
    }

    fn kind(&self) -> MobKind {
        MobKind::Player
    }

    fn set_location(self: &Arc<Self>, grid: &Grid, to: Location, teleport: bool) {
        if !to.is_valid() {
            warn!(player = %self.username, %to, "Refusing to move player outside the world");
            return;
        }
        let mut loc = lock::write(self.core.location_lock());
        if self.is_removing() {
            return;
        }
        let from = *loc;
        if !Grid::same_cell(from, to) {
            grid.cell_for(from).remove_player(self.core.index());
            grid.cell_for(to).add_player(Arc::clone(self));
        }
        *loc = to;
        drop(loc);
        self.core.note_relocation(from, to, teleport);
    }
}
