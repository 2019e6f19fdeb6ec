//! Session coordinator bridging UI intents to repository calls.
//!
//! # Responsibility
//! - Run writes as background tasks that never block the caller.
//! - Publish the login outcome as observable session state.
//! - Share live queries between observers of the same arguments.
//!
//! # Invariants
//! - Write methods return immediately; the returned `PendingWrite` may be
//!   awaited or dropped (fire-and-forget).
//! - Only the most recent `login` may publish; `logout` supersedes any
//!   login still in flight.
//! - A live query stays subscribed only while somebody observes it, and
//!   keeps retrying while its subscription cannot be opened.

pub mod live;

use crate::config::CoreConfig;
use crate::model::note::Note;
use crate::model::user::User;
use crate::repo::note_repo::NoteRepository;
use crate::repo::user_repo::UserRepository;
use crate::repo::RepoError;
use live::{LiveCache, LiveKey, LiveValue};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Failure of a background view-model task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewModelError {
    Repo(RepoError),
    /// Task panicked or was cancelled by runtime shutdown.
    TaskFailed(String),
}

impl Display for ViewModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::TaskFailed(message) => write!(f, "background task failed: {message}"),
        }
    }
}

impl Error for ViewModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::TaskFailed(_) => None,
        }
    }
}

impl From<RepoError> for ViewModelError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Completion handle of a background write.
///
/// Dropping it detaches the task; the write still runs to completion.
pub struct PendingWrite<T> {
    handle: JoinHandle<Result<T, ViewModelError>>,
}

impl<T> PendingWrite<T> {
    /// Waits for the store to acknowledge the write.
    pub async fn wait(self) -> Result<T, ViewModelError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(ViewModelError::TaskFailed(err.to_string())),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Behavior switches for [`NoteViewModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewModelOptions {
    /// `register` rejects usernames that already exist.
    pub enforce_unique_usernames: bool,
}

impl Default for ViewModelOptions {
    fn default() -> Self {
        Self {
            enforce_unique_usernames: true,
        }
    }
}

impl From<&CoreConfig> for ViewModelOptions {
    fn from(config: &CoreConfig) -> Self {
        Self {
            enforce_unique_usernames: config.enforce_unique_usernames,
        }
    }
}

/// UI-facing coordinator over a repository.
pub struct NoteViewModel<R> {
    repo: Arc<R>,
    runtime: Handle,
    options: ViewModelOptions,
    login_result: Arc<watch::Sender<Option<User>>>,
    login_generation: Arc<AtomicU64>,
    note_lists: LiveCache<Vec<Note>>,
    single_notes: LiveCache<Option<Note>>,
}

impl<R> NoteViewModel<R>
where
    R: UserRepository + NoteRepository + Send + Sync + 'static,
{
    /// Creates a coordinator that runs its tasks on `runtime`.
    pub fn new(repo: Arc<R>, runtime: Handle, options: ViewModelOptions) -> Self {
        let (login_result, _) = watch::channel(None);
        Self {
            repo,
            runtime,
            options,
            login_result: Arc::new(login_result),
            login_generation: Arc::new(AtomicU64::new(0)),
            note_lists: LiveCache::default(),
            single_notes: LiveCache::default(),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    // --- notes ---

    /// Stores a new note in the background; resolves to the stored copy.
    pub fn add_note(&self, note: Note) -> PendingWrite<Note> {
        self.dispatch("add_note", move |repo| repo.insert_note(&note))
    }

    /// Overwrites a stored note in the background.
    pub fn update_note(&self, note: Note) -> PendingWrite<()> {
        self.dispatch("update_note", move |repo| repo.update_note(&note))
    }

    /// Deletes a stored note in the background.
    pub fn delete_note(&self, note: Note) -> PendingWrite<()> {
        self.dispatch("delete_note", move |repo| repo.delete_note(&note))
    }

    /// Observes every note owned by `user_id`.
    pub fn get_all_notes(&self, user_id: &str) -> watch::Receiver<LiveValue<Vec<Note>>> {
        let key = LiveKey::AllNotes {
            user_id: user_id.to_string(),
        };
        let repo = self.repo.clone();
        let user_id = user_id.to_string();
        self.note_lists
            .get_or_start(&self.runtime, key, move || repo.get_all_notes(&user_id))
    }

    /// Observes one note; the value is `Ready(None)` while it does not exist.
    pub fn get_note_by_id(&self, id: &str) -> watch::Receiver<LiveValue<Option<Note>>> {
        let key = LiveKey::NoteById { id: id.to_string() };
        let repo = self.repo.clone();
        let id = id.to_string();
        self.single_notes
            .get_or_start(&self.runtime, key, move || repo.get_note_by_id(&id))
    }

    /// Observes `user_id`'s notes matching `query`; see
    /// [`NoteRepository::search_note`].
    pub fn search_note(
        &self,
        query: Option<&str>,
        user_id: &str,
    ) -> watch::Receiver<LiveValue<Vec<Note>>> {
        let query = query.map(str::to_string);
        let user_id = user_id.to_string();
        let key = LiveKey::Search {
            query: query.clone(),
            user_id: user_id.clone(),
        };
        let repo = self.repo.clone();
        self.note_lists.get_or_start(&self.runtime, key, move || {
            repo.search_note(query.as_deref(), &user_id)
        })
    }

    /// Number of live queries currently pumped.
    pub fn active_live_queries(&self) -> usize {
        self.note_lists.active() + self.single_notes.active()
    }

    // --- session ---

    /// Registers an account in the background; resolves to the stored user.
    pub fn register(&self, user: User) -> PendingWrite<User> {
        let unique = self.options.enforce_unique_usernames;
        self.dispatch("register", move |repo| {
            if unique {
                repo.register_user_unique(&user)
            } else {
                repo.register_user(&user)
            }
        })
    }

    /// Checks credentials in the background and publishes the outcome to
    /// [`NoteViewModel::login_result`] unless a newer login or a logout
    /// happened meanwhile. A failed check publishes `None`.
    pub fn login(&self, username: String, password: String) -> PendingWrite<Option<User>> {
        let generation = self.login_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.login_generation.clone();
        let login_result = self.login_result.clone();

        self.dispatch("login", move |repo| {
            let outcome = repo.login(&username, &password);
            let published = login_result.send_if_modified(|slot| {
                if current.load(Ordering::SeqCst) != generation {
                    return false;
                }
                *slot = outcome.as_ref().ok().cloned().flatten();
                true
            });
            if !published {
                info!("event=login_superseded module=viewmodel status=skipped");
            }
            outcome
        })
    }

    /// Clears the session synchronously.
    pub fn logout(&self) {
        let generation = &self.login_generation;
        self.login_result.send_modify(|slot| {
            generation.fetch_add(1, Ordering::SeqCst);
            *slot = None;
        });
        info!("event=logout module=viewmodel status=ok");
    }

    /// Observes the latest published login outcome.
    pub fn login_result(&self) -> watch::Receiver<Option<User>> {
        self.login_result.subscribe()
    }

    /// Current login outcome without subscribing.
    pub fn current_user(&self) -> Option<User> {
        self.login_result.borrow().clone()
    }

    fn dispatch<T, F>(&self, op: &'static str, task: F) -> PendingWrite<T>
    where
        T: Send + 'static,
        F: FnOnce(&R) -> Result<T, RepoError> + Send + 'static,
    {
        let repo = self.repo.clone();
        let handle = self.runtime.spawn_blocking(move || {
            task(&repo).map_err(|err| {
                warn!("event=task_failed module=viewmodel status=error op={op} error={err}");
                ViewModelError::from(err)
            })
        });
        PendingWrite { handle }
    }
}
