//! CLI smoke entry point.
//!
//! Opens a session from `NOTESYNC_*` environment settings, runs one
//! register/login/add/search round and prints what the UI would observe.

use notesync_core::{open_session, CoreConfig, Note, User};
use std::error::Error;
use std::process::ExitCode;
use tokio::runtime::Handle;

#[tokio::main]
async fn main() -> ExitCode {
    println!("notesync_core ping={}", notesync_core::ping());
    println!("notesync_core version={}", notesync_core::core_version());

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("notesync smoke failed: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env()?;
    let vm = open_session(&config, Handle::current())?;
    println!("store={}", config.store_url);

    let username = format!("smoke-{}", std::process::id());
    let user = vm.register(User::new(username.as_str(), "smoke")).wait().await?;
    let session = vm
        .login(username, "smoke".to_string())
        .wait()
        .await?
        .ok_or("login rejected for freshly registered user")?;
    println!("login user_id={}", session.id);

    vm.add_note(Note::new("Groceries", "milk eggs", user.id.as_str()))
        .wait()
        .await?;
    vm.add_note(Note::new("Work", "eggs report", user.id.as_str()))
        .wait()
        .await?;

    let mut search = vm.search_note(Some("eggs"), &user.id);
    let hits = search
        .wait_for(|value| value.ready().is_some_and(|notes| notes.len() == 2))
        .await?
        .ready()
        .map_or(0, Vec::len);
    println!("search query=eggs hits={hits}");

    vm.logout();
    Ok(())
}
