//! Note CRUD and live queries over the `notes` collection.
//!
//! # Responsibility
//! - Create, overwrite and delete notes by store key.
//! - Expose per-user live lists, single-note watches and text search.
//!
//! # Invariants
//! - `update_note` is a full overwrite; omitted fields are lost.
//! - Live lists always emit the complete current list in store order.
//! - Search never returns notes owned by another user.
//! - An absent or empty search query applies no text filter.

use super::live::LiveQuery;
use super::{
    decode, decode_all, encode, Keyed, RepoResult, StoreRepository, NOTES_COLLECTION,
};
use crate::model::note::{Note, NOTE_OWNER_FIELD};
use crate::store::Query;
use log::info;

impl Keyed for Note {
    fn set_key(&mut self, key: &str) {
        self.id = key.to_string();
    }
}

/// Note use cases.
pub trait NoteRepository {
    /// Assigns a fresh id, stores the note and returns the stored copy.
    fn insert_note(&self, note: &Note) -> RepoResult<Note>;
    /// Replaces the whole note stored under `note.id`.
    fn update_note(&self, note: &Note) -> RepoResult<()>;
    /// Hard-deletes the note stored under `note.id`.
    fn delete_note(&self, note: &Note) -> RepoResult<()>;
    /// One-shot read of a single note.
    fn find_note(&self, id: &str) -> RepoResult<Option<Note>>;
    /// Live list of every note owned by `user_id`.
    fn get_all_notes(&self, user_id: &str) -> RepoResult<LiveQuery<Vec<Note>>>;
    /// Live view of one note; `None` while it does not exist.
    fn get_note_by_id(&self, id: &str) -> RepoResult<LiveQuery<Option<Note>>>;
    /// Live list of `user_id`'s notes whose title or description contains
    /// `query`, ignoring case.
    fn search_note(&self, query: Option<&str>, user_id: &str)
        -> RepoResult<LiveQuery<Vec<Note>>>;
}

/// Applies the search rule to one snapshot of a user's notes.
pub fn filter_notes(notes: Vec<Note>, query: Option<&str>) -> Vec<Note> {
    match query.filter(|value| !value.is_empty()) {
        Some(needle) => notes
            .into_iter()
            .filter(|note| note.matches_text(needle))
            .collect(),
        None => notes,
    }
}

fn owned_by(user_id: &str) -> Query {
    Query::equals(NOTE_OWNER_FIELD, user_id)
}

impl NoteRepository for StoreRepository {
    fn insert_note(&self, note: &Note) -> RepoResult<Note> {
        note.validate()?;
        let id = self.store().generate_id(NOTES_COLLECTION)?;
        let stored = note.with_id(id);
        self.store()
            .write(NOTES_COLLECTION, &stored.id, encode(&stored)?)?;
        info!("event=note_insert module=repo status=ok note_id={}", stored.id);
        Ok(stored)
    }

    fn update_note(&self, note: &Note) -> RepoResult<()> {
        note.validate_persisted()?;
        self.store()
            .write(NOTES_COLLECTION, &note.id, encode(note)?)?;
        info!("event=note_update module=repo status=ok note_id={}", note.id);
        Ok(())
    }

    fn delete_note(&self, note: &Note) -> RepoResult<()> {
        note.require_id()?;
        self.store().remove(NOTES_COLLECTION, &note.id)?;
        info!("event=note_delete module=repo status=ok note_id={}", note.id);
        Ok(())
    }

    fn find_note(&self, id: &str) -> RepoResult<Option<Note>> {
        let records = self.store().read_once(NOTES_COLLECTION, &Query::record(id))?;
        records.first().map(decode).transpose()
    }

    fn get_all_notes(&self, user_id: &str) -> RepoResult<LiveQuery<Vec<Note>>> {
        let subscription = self.store().subscribe(NOTES_COLLECTION, &owned_by(user_id))?;
        Ok(LiveQuery::new(subscription, |records| {
            Ok(decode_all(NOTES_COLLECTION, &records))
        }))
    }

    fn get_note_by_id(&self, id: &str) -> RepoResult<LiveQuery<Option<Note>>> {
        let subscription = self.store().subscribe(NOTES_COLLECTION, &Query::record(id))?;
        Ok(LiveQuery::new(subscription, |records| {
            records.first().map(decode).transpose()
        }))
    }

    fn search_note(
        &self,
        query: Option<&str>,
        user_id: &str,
    ) -> RepoResult<LiveQuery<Vec<Note>>> {
        let needle = query.map(str::to_string);
        let subscription = self.store().subscribe(NOTES_COLLECTION, &owned_by(user_id))?;
        Ok(LiveQuery::new(subscription, move |records| {
            let notes = decode_all(NOTES_COLLECTION, &records);
            Ok(filter_notes(notes, needle.as_deref()))
        }))
    }
}
