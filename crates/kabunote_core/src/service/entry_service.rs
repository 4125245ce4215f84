//! Entry use-cases.
//!
//! Content shaping, summary derivation and counter upkeep live in the
//! repository transaction; this layer adds lookups and structured logs.

use super::{ServiceError, ServiceResult};
use crate::model::account::UserId;
use crate::model::entry::{Entry, EntryDraft, EntryId, EntryRelation, RelationId, RelationType};
use crate::model::notebook::NotebookId;
use crate::repo::entry_repo::{EntryListQuery, EntryRepository, EntryWithNotebook};

pub struct EntryService<E: EntryRepository> {
    repo: E,
}

impl<E: EntryRepository> EntryService<E> {
    pub fn new(repo: E) -> Self {
        Self { repo }
    }

    pub fn create_entry(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        draft: &EntryDraft,
    ) -> ServiceResult<Entry> {
        let entry = self.repo.create_entry(user_id, notebook_id, draft)?;
        log::info!(
            "event=entry_create module=notes status=ok user_id={user_id} notebook_id={notebook_id} entry_id={} type={}",
            entry.id,
            entry.entry_type.as_str()
        );
        Ok(entry)
    }

    pub fn update_entry(
        &self,
        user_id: UserId,
        entry_id: EntryId,
        draft: &EntryDraft,
    ) -> ServiceResult<Entry> {
        let entry = self.repo.update_entry(user_id, entry_id, draft)?;
        log::info!("event=entry_update module=notes status=ok user_id={user_id} entry_id={entry_id}");
        Ok(entry)
    }

    pub fn delete_entry(&self, user_id: UserId, entry_id: EntryId) -> ServiceResult<()> {
        self.repo.delete_entry(user_id, entry_id)?;
        log::info!("event=entry_delete module=notes status=ok user_id={user_id} entry_id={entry_id}");
        Ok(())
    }

    pub fn get_entry(&self, user_id: UserId, entry_id: EntryId) -> ServiceResult<Entry> {
        self.repo
            .get_entry(user_id, entry_id)?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "entry",
                id: entry_id.to_string(),
            })
    }

    pub fn list_entries(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        query: &EntryListQuery,
    ) -> ServiceResult<Vec<Entry>> {
        Ok(self.repo.list_entries(user_id, notebook_id, query)?)
    }

    pub fn recent_entries(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> ServiceResult<Vec<EntryWithNotebook>> {
        Ok(self.repo.recent_entries(user_id, limit)?)
    }

    /// Returns the new bookmark state.
    pub fn toggle_bookmark(&self, user_id: UserId, entry_id: EntryId) -> ServiceResult<bool> {
        Ok(self.repo.toggle_bookmark(user_id, entry_id)?)
    }

    pub fn set_important(
        &self,
        user_id: UserId,
        entry_id: EntryId,
        important: bool,
    ) -> ServiceResult<()> {
        Ok(self.repo.set_important(user_id, entry_id, important)?)
    }

    pub fn create_relation(
        &self,
        user_id: UserId,
        from_entry_id: EntryId,
        to_entry_id: EntryId,
        relation_type: RelationType,
        notes: &str,
    ) -> ServiceResult<EntryRelation> {
        let relation =
            self.repo
                .create_relation(user_id, from_entry_id, to_entry_id, relation_type, notes)?;
        log::info!(
            "event=relation_create module=notes status=ok user_id={user_id} relation_id={} type={}",
            relation.id,
            relation_type.as_str()
        );
        Ok(relation)
    }

    pub fn list_relations(
        &self,
        user_id: UserId,
        entry_id: EntryId,
    ) -> ServiceResult<Vec<EntryRelation>> {
        Ok(self.repo.list_relations(user_id, entry_id)?)
    }

    pub fn delete_relation(&self, user_id: UserId, relation_id: RelationId) -> ServiceResult<()> {
        Ok(self.repo.delete_relation(user_id, relation_id)?)
    }
}
