use notesync_core::{
    open_session, CoreConfig, LiveQuery, LiveValue, MemoryStore, Note, NoteRepository,
    NoteViewModel, RepoError, RepoResult, StoreError, StoreRepository, User, UserRepository,
    ViewModelError, ViewModelOptions,
};
use std::collections::HashSet;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn view_model() -> (Arc<MemoryStore>, NoteViewModel<StoreRepository>) {
    let store = Arc::new(MemoryStore::new());
    let repo = Arc::new(StoreRepository::new(store.clone()));
    let vm = NoteViewModel::new(repo, Handle::current(), ViewModelOptions::default());
    (store, vm)
}

/// Repository whose logins for one username block until released.
///
/// Dropping the release sender also unblocks the login.
struct GatedLogins {
    inner: StoreRepository,
    gated: String,
    release: Mutex<mpsc::Receiver<()>>,
}

impl UserRepository for GatedLogins {
    fn register_user(&self, user: &User) -> RepoResult<User> {
        self.inner.register_user(user)
    }

    fn register_user_unique(&self, user: &User) -> RepoResult<User> {
        self.inner.register_user_unique(user)
    }

    fn login(&self, username: &str, password: &str) -> RepoResult<Option<User>> {
        if username == self.gated {
            let _ = self.release.lock().unwrap().recv();
        }
        self.inner.login(username, password)
    }

    fn check_username(&self, username: &str) -> RepoResult<Option<User>> {
        self.inner.check_username(username)
    }
}

impl NoteRepository for GatedLogins {
    fn insert_note(&self, note: &Note) -> RepoResult<Note> {
        self.inner.insert_note(note)
    }

    fn update_note(&self, note: &Note) -> RepoResult<()> {
        self.inner.update_note(note)
    }

    fn delete_note(&self, note: &Note) -> RepoResult<()> {
        self.inner.delete_note(note)
    }

    fn find_note(&self, id: &str) -> RepoResult<Option<Note>> {
        self.inner.find_note(id)
    }

    fn get_all_notes(&self, user_id: &str) -> RepoResult<LiveQuery<Vec<Note>>> {
        self.inner.get_all_notes(user_id)
    }

    fn get_note_by_id(&self, id: &str) -> RepoResult<LiveQuery<Option<Note>>> {
        self.inner.get_note_by_id(id)
    }

    fn search_note(
        &self,
        query: Option<&str>,
        user_id: &str,
    ) -> RepoResult<LiveQuery<Vec<Note>>> {
        self.inner.search_note(query, user_id)
    }
}

fn gated_view_model(gated: &str) -> (NoteViewModel<GatedLogins>, mpsc::Sender<()>) {
    let (release_tx, release_rx) = mpsc::channel();
    let repo = GatedLogins {
        inner: StoreRepository::new(Arc::new(MemoryStore::new())),
        gated: gated.to_string(),
        release: Mutex::new(release_rx),
    };
    let vm = NoteViewModel::new(
        Arc::new(repo),
        Handle::current(),
        ViewModelOptions::default(),
    );
    (vm, release_tx)
}

async fn wait_for_notes<F>(rx: &mut watch::Receiver<LiveValue<Vec<Note>>>, predicate: F) -> Vec<Note>
where
    F: Fn(&[Note]) -> bool,
{
    let value = timeout(
        WAIT,
        rx.wait_for(|value| value.ready().is_some_and(|notes| predicate(notes.as_slice()))),
    )
    .await
    .expect("live value did not arrive in time")
    .expect("live query closed");
    value.ready().cloned().unwrap_or_default()
}

#[tokio::test]
async fn register_then_login_publishes_user() {
    let (_, vm) = view_model();
    let mut login = vm.login_result();

    let stored = vm.register(User::new("alice", "pw")).wait().await.unwrap();
    assert!(!stored.id.is_empty());

    let pending = vm.login("alice".to_string(), "pw".to_string());
    timeout(WAIT, login.changed()).await.unwrap().unwrap();
    let published = login.borrow().clone().unwrap();
    assert_eq!(published.id, stored.id);
    assert_eq!(pending.wait().await.unwrap(), Some(published));
}

#[tokio::test]
async fn wrong_password_publishes_absent_and_logout_clears() {
    let (_, vm) = view_model();
    vm.register(User::new("alice", "pw")).wait().await.unwrap();

    assert_eq!(
        vm.login("alice".to_string(), "nope".to_string())
            .wait()
            .await
            .unwrap(),
        None
    );
    assert!(vm.current_user().is_none());

    vm.login("alice".to_string(), "pw".to_string())
        .wait()
        .await
        .unwrap();
    assert!(vm.current_user().is_some());

    vm.logout();
    assert!(vm.current_user().is_none());
}

#[tokio::test]
async fn duplicate_registration_is_rejected_when_enforced() {
    let (_, vm) = view_model();
    vm.register(User::new("kim", "a")).wait().await.unwrap();
    let err = vm.register(User::new("kim", "b")).wait().await.unwrap_err();
    assert_eq!(
        err,
        ViewModelError::Repo(RepoError::UsernameTaken("kim".to_string()))
    );
}

#[tokio::test]
async fn duplicate_registration_is_allowed_when_not_enforced() {
    let store = Arc::new(MemoryStore::new());
    let repo = Arc::new(StoreRepository::new(store));
    let vm = NoteViewModel::new(
        repo,
        Handle::current(),
        ViewModelOptions {
            enforce_unique_usernames: false,
        },
    );
    vm.register(User::new("kim", "a")).wait().await.unwrap();
    vm.register(User::new("kim", "b")).wait().await.unwrap();
}

#[tokio::test]
async fn fire_and_forget_writes_reach_live_list() {
    let (_, vm) = view_model();
    let mut notes = vm.get_all_notes("u1");

    drop(vm.add_note(Note::new("Groceries", "milk eggs", "u1")));
    drop(vm.add_note(Note::new("Work", "eggs report", "u1")));

    let listed = wait_for_notes(&mut notes, |notes| notes.len() == 2).await;
    let titles: HashSet<_> = listed.iter().map(|note| note.note_title.as_str()).collect();
    assert_eq!(titles, HashSet::from(["Groceries", "Work"]));
    assert!(listed.iter().all(|note| !note.id.is_empty()));
}

#[tokio::test]
async fn update_and_delete_flow_through_live_views() {
    let (_, vm) = view_model();
    let stored = vm
        .add_note(Note::new("Draft", "body", "u1"))
        .wait()
        .await
        .unwrap();
    let mut single = vm.get_note_by_id(&stored.id);
    assert_eq!(single.borrow().ready(), Some(&Some(stored.clone())));

    let mut edited = stored.clone();
    edited.note_title = "Final".to_string();
    vm.update_note(edited.clone()).wait().await.unwrap();
    timeout(
        WAIT,
        single.wait_for(|value| value.ready() == Some(&Some(edited.clone()))),
    )
    .await
    .unwrap()
    .unwrap();

    vm.delete_note(edited).wait().await.unwrap();
    timeout(WAIT, single.wait_for(|value| value.ready() == Some(&None)))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn search_scenario_scopes_results_to_owner() {
    let (_, vm) = view_model();
    vm.add_note(Note::new("Groceries", "milk eggs", "u1"))
        .wait()
        .await
        .unwrap();
    vm.add_note(Note::new("Work", "eggs report", "u1"))
        .wait()
        .await
        .unwrap();

    let mut mine = vm.search_note(Some("eggs"), "u1");
    let found = wait_for_notes(&mut mine, |notes| notes.len() == 2).await;
    assert!(found.iter().all(|note| note.user_id == "u1"));

    let other = vm.search_note(Some("eggs"), "u2");
    assert_eq!(other.borrow().ready(), Some(&Vec::new()));
}

#[tokio::test]
async fn identical_reads_share_one_subscription_until_released() {
    let (store, vm) = view_model();
    let first = vm.get_all_notes("u1");
    let second = vm.get_all_notes("u1");
    assert_eq!(vm.active_live_queries(), 1);
    assert_eq!(store.listener_count(), 1);

    drop(first);
    drop(second);
    timeout(WAIT, async {
        while store.listener_count() > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
    assert_eq!(vm.active_live_queries(), 0);

    let _again = vm.get_all_notes("u1");
    assert_eq!(store.listener_count(), 1);
}

#[tokio::test]
async fn transport_failure_surfaces_on_writes_and_live_values() {
    let (store, vm) = view_model();
    let mut notes = vm.get_all_notes("u1");

    store.set_reachable(false).unwrap();
    let err = vm
        .add_note(Note::new("t", "d", "u1"))
        .wait()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ViewModelError::Repo(RepoError::Store(StoreError::Transport(_)))
    ));
    timeout(
        WAIT,
        notes.wait_for(|value| matches!(value, LiveValue::Failed(_))),
    )
    .await
    .unwrap()
    .unwrap();

    store.set_reachable(true).unwrap();
    wait_for_notes(&mut notes, |notes| notes.is_empty()).await;
}

#[tokio::test]
async fn live_query_opened_offline_recovers_after_reconnect() {
    let (store, vm) = view_model();
    store.set_reachable(false).unwrap();

    let mut notes = vm.get_all_notes("u1");
    assert!(matches!(
        *notes.borrow(),
        LiveValue::Failed(RepoError::Store(StoreError::Transport(_)))
    ));
    assert_eq!(vm.active_live_queries(), 1);

    store.set_reachable(true).unwrap();
    vm.add_note(Note::new("Groceries", "milk", "u1"))
        .wait()
        .await
        .unwrap();

    let listed = wait_for_notes(&mut notes, |notes| notes.len() == 1).await;
    assert_eq!(listed[0].note_title, "Groceries");
    assert_eq!(store.listener_count(), 1);
}

#[tokio::test]
async fn offline_live_query_stops_retrying_once_unobserved() {
    let (store, vm) = view_model();
    store.set_reachable(false).unwrap();

    drop(vm.get_note_by_id("missing"));
    timeout(WAIT, async {
        while vm.active_live_queries() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    store.set_reachable(true).unwrap();
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test]
async fn newer_login_wins_over_slower_earlier_login() {
    let (vm, release) = gated_view_model("alice");
    let alice = vm.register(User::new("alice", "pw")).wait().await.unwrap();
    let bob = vm.register(User::new("bob", "pw")).wait().await.unwrap();

    let slow = vm.login("alice".to_string(), "pw".to_string());
    let fast = vm.login("bob".to_string(), "pw".to_string());
    assert_eq!(fast.wait().await.unwrap(), Some(bob.clone()));
    assert_eq!(vm.current_user(), Some(bob.clone()));

    release.send(()).unwrap();
    assert_eq!(slow.wait().await.unwrap(), Some(alice));
    assert_eq!(vm.current_user(), Some(bob));
}

#[tokio::test]
async fn logout_supersedes_login_in_flight() {
    let (vm, release) = gated_view_model("alice");
    vm.register(User::new("alice", "pw")).wait().await.unwrap();
    let bob = vm.register(User::new("bob", "pw")).wait().await.unwrap();
    vm.login("bob".to_string(), "pw".to_string())
        .wait()
        .await
        .unwrap();
    assert_eq!(vm.current_user(), Some(bob));

    let slow = vm.login("alice".to_string(), "pw".to_string());
    vm.logout();
    assert!(vm.current_user().is_none());

    release.send(()).unwrap();
    assert!(slow.wait().await.unwrap().is_some());
    assert!(vm.current_user().is_none());
}

#[tokio::test]
async fn failed_login_clears_previous_result() {
    let (store, vm) = view_model();
    vm.register(User::new("alice", "pw")).wait().await.unwrap();
    vm.login("alice".to_string(), "pw".to_string())
        .wait()
        .await
        .unwrap();
    assert!(vm.current_user().is_some());

    store.set_reachable(false).unwrap();
    let err = vm
        .login("alice".to_string(), "pw".to_string())
        .wait()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ViewModelError::Repo(RepoError::Store(StoreError::Transport(_)))
    ));
    assert!(vm.current_user().is_none());
}

#[tokio::test]
async fn open_session_uses_configured_endpoint() {
    let config = CoreConfig::from_json_str(r#"{"store_url":"sqlite::memory:"}"#).unwrap();
    let vm = open_session(&config, Handle::current()).unwrap();
    vm.register(User::new("dana", "pw")).wait().await.unwrap();
    assert!(vm
        .login("dana".to_string(), "pw".to_string())
        .wait()
        .await
        .unwrap()
        .is_some());

    let remote = CoreConfig::from_json_str(r#"{"store_url":"https://example.invalid/"}"#).unwrap();
    assert!(open_session(&remote, Handle::current()).is_err());
}
