//! Dashboard assembly.
//!
//! # Invariants
//! - Statistics are recomputed on every dashboard read.
//! - Sections disabled in the user's settings come back empty (`None` for
//!   statistics) instead of being queried.

use super::ServiceResult;
use crate::db::now_ms;
use crate::model::account::UserId;
use crate::model::activity::{relative_time_label, DashboardStats, RecentActivity};
use crate::model::notebook::Notebook;
use crate::model::tag::Tag;
use crate::repo::account_repo::AccountRepository;
use crate::repo::activity_repo::DashboardRepository;
use crate::repo::notebook_repo::{NotebookListQuery, NotebookRepository};
use crate::repo::tag_repo::TagRepository;
use serde::Serialize;

pub const DASHBOARD_ACTIVITY_LIMIT: u32 = 5;
pub const DASHBOARD_NOTEBOOK_LIMIT: u32 = 5;
pub const DASHBOARD_TRENDING_TAG_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityItem {
    #[serde(flatten)]
    pub activity: RecentActivity,
    /// Human label such as `3分前`.
    pub relative_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub stats: Option<DashboardStats>,
    pub recent_activities: Vec<ActivityItem>,
    pub recent_notebooks: Vec<Notebook>,
    pub trending_tags: Vec<Tag>,
}

pub struct DashboardService<A, D, N, T>
where
    A: AccountRepository,
    D: DashboardRepository,
    N: NotebookRepository,
    T: TagRepository,
{
    accounts: A,
    dashboard: D,
    notebooks: N,
    tags: T,
}

impl<A, D, N, T> DashboardService<A, D, N, T>
where
    A: AccountRepository,
    D: DashboardRepository,
    N: NotebookRepository,
    T: TagRepository,
{
    pub fn new(accounts: A, dashboard: D, notebooks: N, tags: T) -> Self {
        Self {
            accounts,
            dashboard,
            notebooks,
            tags,
        }
    }

    pub fn refresh_stats(&self, user_id: UserId) -> ServiceResult<DashboardStats> {
        Ok(self.dashboard.refresh_stats(user_id)?)
    }

    pub fn dashboard(&self, user_id: UserId) -> ServiceResult<Dashboard> {
        self.accounts.ensure_provisioned(user_id)?;
        let settings = self.accounts.get_settings(user_id)?.unwrap_or_default();

        let stats = if settings.show_statistics {
            Some(self.dashboard.refresh_stats(user_id)?)
        } else {
            None
        };

        let recent_activities = if settings.show_recent_activity {
            let now = now_ms();
            self.dashboard
                .recent_activities(user_id, DASHBOARD_ACTIVITY_LIMIT)?
                .into_iter()
                .map(|activity| ActivityItem {
                    relative_time: relative_time_label(activity.created_at, now),
                    activity,
                })
                .collect()
        } else {
            Vec::new()
        };

        let recent_notebooks = self
            .notebooks
            .list_notebooks(
                user_id,
                &NotebookListQuery {
                    limit: Some(DASHBOARD_NOTEBOOK_LIMIT),
                    ..NotebookListQuery::default()
                },
            )?
            .items;

        let trending_tags = if settings.show_trending_tags {
            self.tags
                .popular_tags(user_id, None, Some(DASHBOARD_TRENDING_TAG_LIMIT))?
        } else {
            Vec::new()
        };

        log::debug!(
            "event=dashboard_load module=dashboard status=ok user_id={user_id} activities={} notebooks={} tags={}",
            recent_activities.len(),
            recent_notebooks.len(),
            trending_tags.len()
        );
        Ok(Dashboard {
            stats,
            recent_activities,
            recent_notebooks,
            trending_tags,
        })
    }
}
