//! Demo and sample data provisioning for local development.
//!
//! Accounts are created through the repository directly so the reserved
//! `admin` name can be provisioned. Each step commits on its own; rerunning
//! skips anything that already exists.

use super::account_service::hash_password;
use super::notebook_service::NotebookService;
use super::ServiceResult;
use crate::model::account::{
    InvestmentExperience, InvestmentStyle, ProfilePatch, Theme, User, UserId, ITEMS_PER_PAGE_MAX,
};
use crate::model::entry::{EntryDraft, EntryType};
use crate::model::notebook::{NotebookDraft, NotebookStatus, NotebookType};
use crate::model::tag::TagCategory;
use crate::repo::account_repo::{AccountRepository, NewUser, SqliteAccountRepository};
use crate::repo::entry_repo::{EntryRepository, SqliteEntryRepository};
use crate::repo::notebook_repo::SqliteNotebookRepository;
use crate::repo::tag_repo::{NewTag, SqliteTagRepository, TagRepository};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;

pub const DEMO_PASSWORD: &str = "demo123456";
pub const ADMIN_PASSWORD: &str = "admin123456";
pub const SAMPLE_USERNAME: &str = "sample_user";
pub const SAMPLE_PASSWORD: &str = "password123";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoOptions {
    pub users: u32,
    pub with_admin: bool,
    /// Run even when the database already has users.
    pub force: bool,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            users: 1,
            with_admin: false,
            force: false,
        }
    }
}

/// Login details printed after provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DemoAccount {
    pub username: String,
    pub email: String,
    pub password: &'static str,
    pub is_admin: bool,
    pub experience: InvestmentExperience,
    pub style: InvestmentStyle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DemoReport {
    /// Set when users already existed and `force` was off.
    pub skipped_existing: bool,
    pub created: Vec<DemoAccount>,
    /// Usernames that already existed.
    pub existing: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleDataReport {
    pub user_created: bool,
    pub tags_created: usize,
    pub notebooks_created: usize,
    pub entries_created: usize,
}

/// Creates demo users (and optionally an admin) with varied profiles.
pub fn create_demo_users(conn: &Connection, options: &DemoOptions) -> ServiceResult<DemoReport> {
    let accounts = SqliteAccountRepository::try_new(conn)?;
    let mut report = DemoReport::default();
    if !options.force && accounts.count_users()? > 0 {
        log::warn!("event=demo_users module=demo status=skipped reason=users_exist");
        report.skipped_existing = true;
        return Ok(report);
    }

    if options.with_admin {
        let admin = NewUser {
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            password_hash: hash_password(ADMIN_PASSWORD)?,
            first_name: "管理者".to_string(),
            is_staff: true,
            is_superuser: true,
        };
        let patch = ProfilePatch {
            display_name: Some("管理者".to_string()),
            bio: Some("システム管理者アカウント".to_string()),
            investment_experience: Some(InvestmentExperience::Expert),
            investment_style: Some(InvestmentStyle::Moderate),
            show_statistics: Some(true),
            ..ProfilePatch::default()
        };
        match create_if_missing(&accounts, &admin, &patch)? {
            Some(_) => report.created.push(DemoAccount {
                username: admin.username,
                email: admin.email,
                password: ADMIN_PASSWORD,
                is_admin: true,
                experience: InvestmentExperience::Expert,
                style: InvestmentStyle::Moderate,
            }),
            None => report.existing.push(admin.username),
        }
    }

    for index in 1..=options.users.max(1) {
        let (username, email) = if index > 1 {
            (format!("demo_user{index}"), format!("demo{index}@example.com"))
        } else {
            ("demo_user".to_string(), "demo@example.com".to_string())
        };
        let slot = (index as usize - 1) % 4;
        let experience = [
            InvestmentExperience::Beginner,
            InvestmentExperience::Intermediate,
            InvestmentExperience::Advanced,
            InvestmentExperience::Expert,
        ][slot];
        let style = [
            InvestmentStyle::Conservative,
            InvestmentStyle::Moderate,
            InvestmentStyle::Aggressive,
            InvestmentStyle::Speculative,
        ][slot];

        let new_user = NewUser {
            username: username.clone(),
            email: email.clone(),
            password_hash: hash_password(DEMO_PASSWORD)?,
            first_name: format!("デモ{index}"),
            is_staff: false,
            is_superuser: false,
        };
        let patch = ProfilePatch {
            display_name: Some(format!("デモユーザー{index}")),
            bio: Some(format!(
                "これはデモ用のテストアカウント{index}です。投資分析の記録機能をお試しください。"
            )),
            investment_experience: Some(experience),
            investment_style: Some(style),
            public_profile: Some(index % 2 == 0),
            ..ProfilePatch::default()
        };
        let Some(user) = create_if_missing(&accounts, &new_user, &patch)? else {
            report.existing.push(username);
            continue;
        };

        let mut settings = accounts.get_settings(user.id)?.unwrap_or_default();
        settings.theme = if index % 2 == 1 { Theme::Dark } else { Theme::Light };
        settings.items_per_page = (12 + (index - 1) * 3).min(ITEMS_PER_PAGE_MAX);
        accounts.update_settings(user.id, &settings)?;

        if index == 1 {
            create_toyota_notebook(conn, user.id)?;
        }
        report.created.push(DemoAccount {
            username,
            email,
            password: DEMO_PASSWORD,
            is_admin: false,
            experience,
            style,
        });
    }

    log::info!(
        "event=demo_users module=demo status=ok created={} existing={}",
        report.created.len(),
        report.existing.len()
    );
    Ok(report)
}

/// Creates `sample_user` with categorized tags, two stock notebooks and an
/// analysis entry in each.
pub fn create_sample_data(conn: &Connection) -> ServiceResult<SampleDataReport> {
    let accounts = SqliteAccountRepository::try_new(conn)?;
    let mut report = SampleDataReport::default();

    let user = match accounts.find_user_by_login(SAMPLE_USERNAME)? {
        Some(user) => user,
        None => {
            report.user_created = true;
            accounts.create_user(&NewUser {
                username: SAMPLE_USERNAME.to_string(),
                email: "sample@example.com".to_string(),
                password_hash: hash_password(SAMPLE_PASSWORD)?,
                first_name: String::new(),
                is_staff: true,
                is_superuser: true,
            })?
        }
    };

    let tags = SqliteTagRepository::try_new(conn)?;
    for (name, category) in [
        ("#7203トヨタ", TagCategory::Stock),
        ("#高配当", TagCategory::Style),
        ("#長期投資", TagCategory::Strategy),
        ("#自動車", TagCategory::Sector),
        ("#決算分析", TagCategory::Analysis),
        ("#業績好調", TagCategory::Market),
        ("#6758ソニー", TagCategory::Stock),
        ("#成長株", TagCategory::Style),
        ("#エンタメ", TagCategory::Sector),
    ] {
        let (_, created) = tags.create_tag(
            user.id,
            &NewTag {
                name: name.to_string(),
                category: Some(category),
                ..NewTag::default()
            },
        )?;
        if created {
            report.tags_created += 1;
        }
    }

    let samples = [
        (
            NotebookDraft {
                title: "7203 トヨタ自動車".to_string(),
                subtitle: "長期保有・配当重視".to_string(),
                stock_code: "7203".to_string(),
                company_name: "トヨタ自動車".to_string(),
                investment_strategy: "安定した配当政策と自動車業界でのリーダーシップ。電動化への取り組みも評価。"
                    .to_string(),
                target_price: "3,200円".to_string(),
                sell_timing: "配当利回り3%を下回った時点".to_string(),
                key_criteria: strings(&["継続的な配当増配", "電動化技術への投資", "グローバル市場での競争力"]),
                risk_factors: strings(&["為替変動リスク", "電動化競争の激化", "半導体不足の影響"]),
                notebook_type: NotebookType::Stock,
                status: NotebookStatus::Active,
                tags: strings(&["#7203トヨタ", "#高配当", "#長期投資"]),
                ..NotebookDraft::default()
            },
            "トヨタ自動車",
        ),
        (
            NotebookDraft {
                title: "6758 ソニーグループ".to_string(),
                subtitle: "エンタメ・半導体事業分析".to_string(),
                stock_code: "6758".to_string(),
                company_name: "ソニーグループ".to_string(),
                investment_strategy: "エンターテインメント事業の安定性と半導体事業の成長性を評価。"
                    .to_string(),
                target_price: "15,000円".to_string(),
                sell_timing: "PER 20倍を超えた時点".to_string(),
                key_criteria: strings(&["PlayStation事業の安定性", "半導体事業の成長", "音楽・映画事業の収益性"]),
                risk_factors: strings(&["ゲーム市場の競争激化", "半導体市場の変動", "為替リスク"]),
                notebook_type: NotebookType::Stock,
                status: NotebookStatus::Monitoring,
                tags: strings(&["#6758ソニー", "#成長株", "#長期投資"]),
                ..NotebookDraft::default()
            },
            "ソニーグループ",
        ),
    ];

    let notes = NotebookService::new(
        SqliteNotebookRepository::try_new(conn)?,
        SqliteEntryRepository::try_new(conn)?,
    );
    let entries = SqliteEntryRepository::try_new(conn)?;
    for (draft, company) in samples {
        if notebook_id_by_title(conn, user.id, &draft.title)?.is_some() {
            continue;
        }
        let tag_names = draft.tags.clone();
        let notebook = notes.create_notebook(user.id, draft)?;
        report.notebooks_created += 1;
        entries.create_entry(
            user.id,
            notebook.id,
            &EntryDraft {
                tags: tag_names,
                ..quarterly_analysis(company)
            },
        )?;
        report.entries_created += 1;
    }

    log::info!(
        "event=sample_data module=demo status=ok user_created={} tags={} notebooks={} entries={}",
        report.user_created,
        report.tags_created,
        report.notebooks_created,
        report.entries_created
    );
    Ok(report)
}

fn create_if_missing(
    accounts: &SqliteAccountRepository<'_>,
    new_user: &NewUser,
    patch: &ProfilePatch,
) -> ServiceResult<Option<User>> {
    if accounts.username_taken(&new_user.username)? {
        return Ok(None);
    }
    let user = accounts.create_user(new_user)?;
    accounts.update_profile(user.id, patch)?;
    Ok(Some(user))
}

fn create_toyota_notebook(conn: &Connection, user_id: UserId) -> ServiceResult<()> {
    let notes = NotebookService::new(
        SqliteNotebookRepository::try_new(conn)?,
        SqliteEntryRepository::try_new(conn)?,
    );
    let notebook = notes.create_notebook(
        user_id,
        NotebookDraft {
            title: "7203 トヨタ自動車".to_string(),
            stock_code: "7203".to_string(),
            company_name: "トヨタ自動車".to_string(),
            notebook_type: NotebookType::Stock,
            status: NotebookStatus::Active,
            investment_strategy: "安定した配当政策と自動車業界でのリーダーシップを評価".to_string(),
            target_price: "3,200円".to_string(),
            sell_timing: "配当利回り3%を下回った時点".to_string(),
            key_criteria: strings(&["継続的な配当増配", "電動化技術への投資", "グローバル市場での競争力"]),
            risk_factors: strings(&["為替変動リスク", "電動化競争の激化", "半導体不足の影響"]),
            tags: strings(&["#7203トヨタ", "#高配当", "#長期投資", "#自動車"]),
            ..NotebookDraft::default()
        },
    )?;
    SqliteEntryRepository::try_new(conn)?.create_entry(
        user_id,
        notebook.id,
        &quarterly_analysis("トヨタ"),
    )?;
    Ok(())
}

fn quarterly_analysis(company: &str) -> EntryDraft {
    EntryDraft {
        entry_type: EntryType::Analysis,
        title: "第3四半期決算分析".to_string(),
        content: json!({
            "summary": format!("{company}の第3四半期決算は予想を上回る好調な結果となりました。"),
            "key_metrics": {
                "revenue": "8.7兆円 (+8.2%)",
                "operating_profit": "2.1兆円 (+12.1%)",
                "net_income": "1.8兆円 (+15.3%)",
                "eps": "285円"
            },
            "analysis": "売上高は前年同期比で大幅な増加を記録し、営業効率の改善も見られます。",
            "outlook": "通期予想を上方修正。今後も成長が期待できる状況です。"
        }),
        ..EntryDraft::default()
    }
}

fn notebook_id_by_title(conn: &Connection, user_id: UserId, title: &str) -> ServiceResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM notebooks WHERE user_id = ?1 AND title = ?2 LIMIT 1;",
            params![user_id.to_string(), title],
            |row| row.get(0),
        )
        .optional()?)
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
