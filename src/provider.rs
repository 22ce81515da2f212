use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::auth::AuthClient;
use crate::coordinator::MutationCoordinator;
use crate::error::SyncError;
use crate::models::{Article, Collection, MatchResult, RecordId, Resource, Team};
use crate::state::{Delta, MutationAction, ProviderCommand};
use crate::store::CollectionStore;
use crate::transport::Transport;

/// Everything a worker needs to run a command. Clones share the same stores.
#[derive(Clone)]
pub struct SyncContext {
    pub articles: MutationCoordinator<Article>,
    pub teams: MutationCoordinator<Team>,
    pub results: MutationCoordinator<MatchResult>,
    pub auth: AuthClient,
}

impl SyncContext {
    pub fn new(transport: Arc<dyn Transport>, max_upload_bytes: u64) -> Self {
        Self {
            articles: MutationCoordinator::new(
                CollectionStore::new(),
                Arc::clone(&transport),
                max_upload_bytes,
            ),
            teams: MutationCoordinator::new(
                CollectionStore::new(),
                Arc::clone(&transport),
                max_upload_bytes,
            ),
            results: MutationCoordinator::new(
                CollectionStore::new(),
                Arc::clone(&transport),
                max_upload_bytes,
            ),
            auth: AuthClient::new(transport),
        }
    }

    pub fn snapshot_delta(&self, collection: Collection) -> Delta {
        match collection {
            Collection::Articles => Delta::SetArticles(self.articles.store().snapshot()),
            Collection::Teams => Delta::SetTeams(self.teams.store().snapshot()),
            Collection::Results => Delta::SetResults(self.results.store().snapshot()),
        }
    }

    fn fetch(&self, collection: Collection, force: bool) -> Result<usize, SyncError> {
        match (collection, force) {
            (Collection::Articles, false) => self.articles.load().map(|r| r.len()),
            (Collection::Articles, true) => self.articles.refresh().map(|r| r.len()),
            (Collection::Teams, false) => self.teams.load().map(|r| r.len()),
            (Collection::Teams, true) => self.teams.refresh().map(|r| r.len()),
            (Collection::Results, false) => self.results.load().map(|r| r.len()),
            (Collection::Results, true) => self.results.refresh().map(|r| r.len()),
        }
    }

    fn delete(&self, collection: Collection, id: RecordId) -> Result<(), SyncError> {
        match collection {
            Collection::Articles => self.articles.delete(id),
            Collection::Teams => self.teams.delete(id),
            Collection::Results => self.results.delete(id),
        }
    }

    /// Runs one command to completion on the calling thread, reporting through `tx`.
    pub fn run(&self, command: ProviderCommand, tx: &Sender<Delta>) {
        match command {
            ProviderCommand::Load(collection) => self.reload(collection, false, tx),
            ProviderCommand::RefreshAll => {
                for collection in Collection::ALL {
                    self.reload(collection, true, tx);
                }
            }
            ProviderCommand::SaveArticle { id, payload } => {
                save(&self.articles, id, payload, tx);
                let _ = tx.send(self.snapshot_delta(Collection::Articles));
            }
            ProviderCommand::SaveTeam { id, payload } => {
                save(&self.teams, id, payload, tx);
                let _ = tx.send(self.snapshot_delta(Collection::Teams));
            }
            ProviderCommand::SaveResult { id, payload } => {
                save(&self.results, id, payload, tx);
                let _ = tx.send(self.snapshot_delta(Collection::Results));
            }
            ProviderCommand::Delete { collection, id } => {
                let error = self.delete(collection, id).err();
                let _ = tx.send(Delta::MutationFinished {
                    collection,
                    action: MutationAction::Delete,
                    id: Some(id),
                    error,
                });
                let _ = tx.send(self.snapshot_delta(collection));
            }
            ProviderCommand::Login(credentials) => {
                let delta = match self.auth.login(&credentials) {
                    Ok(session) => Delta::SignedIn(session),
                    Err(err) => Delta::AuthFailed(err),
                };
                let _ = tx.send(delta);
            }
            ProviderCommand::Register(registration) => {
                let delta = match self.auth.register(&registration) {
                    Ok(()) => Delta::SignedUp {
                        email: registration.email,
                    },
                    Err(err) => Delta::AuthFailed(err),
                };
                let _ = tx.send(delta);
            }
            ProviderCommand::UpdateProfile { session, update } => {
                let result = self.auth.update_profile(&session, &update);
                let _ = tx.send(Delta::ProfileSaved(result));
            }
        }
    }

    fn reload(&self, collection: Collection, force: bool, tx: &Sender<Delta>) {
        if let Err(err) = self.fetch(collection, force) {
            let _ = tx.send(Delta::Log(format!(
                "[WARN] Loading {} failed: {}",
                collection.path(),
                err.user_message()
            )));
        }
        let _ = tx.send(self.snapshot_delta(collection));
    }
}

fn save<R: Resource>(
    coordinator: &MutationCoordinator<R>,
    id: Option<RecordId>,
    payload: R::Payload,
    tx: &Sender<Delta>,
) {
    let (action, result) = match id {
        Some(id) => (
            MutationAction::Update,
            coordinator.update(id, payload).map(|r| Some(r.id())),
        ),
        None => (
            MutationAction::Create,
            coordinator.create(payload).map(|r| r.map(|r| r.id())),
        ),
    };
    let (id, error) = match result {
        Ok(saved) => (saved.or(id), None),
        Err(err) => (id, Some(err)),
    };
    let _ = tx.send(Delta::MutationFinished {
        collection: R::COLLECTION,
        action,
        id,
        error,
    });
}

/// Starts the provider thread. Every command runs on its own worker thread; when no
/// command arrives for `poll_interval` all collections are refreshed.
pub fn spawn_provider(
    ctx: SyncContext,
    tx: Sender<Delta>,
    cmd_rx: Receiver<ProviderCommand>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        for collection in Collection::ALL {
            let _ = tx.send(ctx.snapshot_delta(collection));
            dispatch(&ctx, &tx, ProviderCommand::Load(collection));
        }

        let mut last_poll = Instant::now();
        loop {
            let wait = poll_interval.saturating_sub(last_poll.elapsed());
            match cmd_rx.recv_timeout(wait) {
                Ok(command) => dispatch(&ctx, &tx, command),
                Err(RecvTimeoutError::Timeout) => {
                    log::debug!("poll refresh after {}s", poll_interval.as_secs());
                    last_poll = Instant::now();
                    dispatch(&ctx, &tx, ProviderCommand::RefreshAll);
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::info!("provider stopped");
    })
}

fn dispatch(ctx: &SyncContext, tx: &Sender<Delta>, command: ProviderCommand) {
    let ctx = ctx.clone();
    let tx = tx.clone();
    thread::spawn(move || ctx.run(command, &tx));
}
