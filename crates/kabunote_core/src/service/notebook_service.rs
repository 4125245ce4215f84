//! Notebook use-cases.
//!
//! # Responsibility
//! - Normalize drafts and forward owner-scoped notebook writes.
//! - Assemble list pages and the notebook detail view.
//!
//! # Invariants
//! - Listing is sorted by `updated_at DESC, id ASC`.
//! - `page` is 1-based; out-of-range pages return an empty item list with
//!   the real `total`.

use super::{ServiceError, ServiceResult};
use crate::model::account::UserId;
use crate::model::entry::Entry;
use crate::model::notebook::{
    Notebook, NotebookDraft, NotebookId, NotebookStats, NotebookStatus, NotebookType,
    SubNotebook, SubNotebookId,
};
use crate::repo::entry_repo::{EntryListQuery, EntryRepository};
use crate::repo::notebook_repo::{normalize_notebook_limit, NotebookListQuery, NotebookRepository};
use serde::Serialize;

pub const RECENT_ENTRIES_DEFAULT_LIMIT: u32 = 5;

/// List request as received from callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotebookListParams {
    pub q: Option<String>,
    pub status: Option<NotebookStatus>,
    pub notebook_type: Option<NotebookType>,
    pub tag: Option<String>,
    /// 1-based page; `None` or `0` mean the first page.
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotebookListResult {
    pub items: Vec<Notebook>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

/// Notebook detail view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotebookDetail {
    pub notebook: Notebook,
    pub sub_notebooks: Vec<SubNotebook>,
    pub recent_entries: Vec<Entry>,
    pub stats: NotebookStats,
}

pub struct NotebookService<N: NotebookRepository, E: EntryRepository> {
    notebooks: N,
    entries: E,
}

impl<N: NotebookRepository, E: EntryRepository> NotebookService<N, E> {
    pub fn new(notebooks: N, entries: E) -> Self {
        Self { notebooks, entries }
    }

    pub fn create_notebook(
        &self,
        user_id: UserId,
        mut draft: NotebookDraft,
    ) -> ServiceResult<Notebook> {
        draft.normalize();
        let notebook = self.notebooks.create_notebook(user_id, &draft)?;
        log::info!(
            "event=notebook_create module=notes status=ok user_id={user_id} notebook_id={} tags={}",
            notebook.id,
            notebook.tags.len()
        );
        Ok(notebook)
    }

    pub fn update_notebook(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        mut draft: NotebookDraft,
    ) -> ServiceResult<Notebook> {
        draft.normalize();
        let notebook = self.notebooks.update_notebook(user_id, notebook_id, &draft)?;
        log::info!(
            "event=notebook_update module=notes status=ok user_id={user_id} notebook_id={notebook_id}"
        );
        Ok(notebook)
    }

    pub fn delete_notebook(&self, user_id: UserId, notebook_id: NotebookId) -> ServiceResult<()> {
        self.notebooks.delete_notebook(user_id, notebook_id)?;
        log::info!(
            "event=notebook_delete module=notes status=ok user_id={user_id} notebook_id={notebook_id}"
        );
        Ok(())
    }

    pub fn get_notebook(&self, user_id: UserId, notebook_id: NotebookId) -> ServiceResult<Notebook> {
        self.notebooks
            .get_notebook(user_id, notebook_id)?
            .ok_or_else(|| not_found("notebook", notebook_id))
    }

    /// Notebook with sub-notebooks, the latest entries and statistics.
    pub fn notebook_detail(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
    ) -> ServiceResult<NotebookDetail> {
        let notebook = self.get_notebook(user_id, notebook_id)?;
        Ok(NotebookDetail {
            sub_notebooks: self.notebooks.list_sub_notebooks(user_id, notebook_id)?,
            recent_entries: self.recent_entries(user_id, notebook_id, None)?,
            stats: self.notebooks.notebook_stats(user_id, notebook_id)?,
            notebook,
        })
    }

    pub fn list_notebooks(
        &self,
        user_id: UserId,
        params: &NotebookListParams,
    ) -> ServiceResult<NotebookListResult> {
        let per_page = normalize_notebook_limit(params.per_page);
        let page = params.page.unwrap_or(1).max(1);
        let offset = (page - 1).saturating_mul(per_page);
        let result = self.notebooks.list_notebooks(
            user_id,
            &NotebookListQuery {
                text: params.q.clone(),
                status: params.status,
                notebook_type: params.notebook_type,
                tag: params.tag.clone(),
                limit: Some(per_page),
                offset,
            },
        )?;
        let total_pages = if result.total == 0 {
            0
        } else {
            u32::try_from((result.total + i64::from(per_page) - 1) / i64::from(per_page))
                .unwrap_or(u32::MAX)
        };
        Ok(NotebookListResult {
            items: result.items,
            total: result.total,
            page,
            per_page,
            total_pages,
        })
    }

    pub fn notebook_stats(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
    ) -> ServiceResult<NotebookStats> {
        Ok(self.notebooks.notebook_stats(user_id, notebook_id)?)
    }

    /// Newest entries of one notebook (default 5).
    pub fn recent_entries(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        limit: Option<u32>,
    ) -> ServiceResult<Vec<Entry>> {
        let limit = match limit {
            Some(0) | None => RECENT_ENTRIES_DEFAULT_LIMIT,
            Some(value) => value,
        };
        Ok(self.entries.list_entries(
            user_id,
            notebook_id,
            &EntryListQuery {
                limit: Some(limit),
                ..EntryListQuery::default()
            },
        )?)
    }

    pub fn list_sub_notebooks(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
    ) -> ServiceResult<Vec<SubNotebook>> {
        Ok(self.notebooks.list_sub_notebooks(user_id, notebook_id)?)
    }

    pub fn create_sub_notebook(
        &self,
        user_id: UserId,
        notebook_id: NotebookId,
        title: &str,
        description: &str,
    ) -> ServiceResult<SubNotebook> {
        Ok(self
            .notebooks
            .create_sub_notebook(user_id, notebook_id, title, description)?)
    }

    pub fn update_sub_notebook(
        &self,
        user_id: UserId,
        sub_notebook_id: SubNotebookId,
        title: &str,
        description: &str,
    ) -> ServiceResult<SubNotebook> {
        Ok(self
            .notebooks
            .update_sub_notebook(user_id, sub_notebook_id, title, description)?)
    }

    pub fn move_sub_notebook(
        &self,
        user_id: UserId,
        sub_notebook_id: SubNotebookId,
        target_index: i64,
    ) -> ServiceResult<Vec<SubNotebook>> {
        Ok(self
            .notebooks
            .move_sub_notebook(user_id, sub_notebook_id, target_index)?)
    }

    pub fn delete_sub_notebook(
        &self,
        user_id: UserId,
        sub_notebook_id: SubNotebookId,
    ) -> ServiceResult<()> {
        Ok(self.notebooks.delete_sub_notebook(user_id, sub_notebook_id)?)
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> ServiceError {
    ServiceError::NotFound {
        entity,
        id: id.to_string(),
    }
}
