//! User, profile, settings, login history and session persistence.
//!
//! # Responsibility
//! - Create users together with their profile and settings rows.
//! - Keep profile totals (`total_notebooks`, `total_entries`) recountable.
//!
//! # Invariants
//! - Provisioning inserts are conditional on absence, so running them twice
//!   never yields a second profile or settings row.
//! - Usernames and emails are unique case-insensitively.

use super::{ensure_schema, invalid_enum, is_unique_violation, parse_uuid, RepoError, RepoResult};
use crate::db::{bool_to_int, now_ms};
use crate::model::account::{
    default_display_name, InvestmentExperience, InvestmentStyle, Language, LoginRecord,
    ProfilePatch, Session, Theme, User, UserId, UserProfile, UserSettings,
};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const USER_SELECT_SQL: &str = "SELECT
    id,
    username,
    email,
    password_hash,
    first_name,
    is_staff,
    is_superuser,
    is_active,
    created_at,
    updated_at
FROM users";

/// Input for user creation. `password_hash` must already be hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

pub trait AccountRepository {
    /// Inserts the user and provisions profile + settings atomically.
    fn create_user(&self, user: &NewUser) -> RepoResult<User>;
    /// Get-or-create for profile and settings rows.
    fn ensure_provisioned(&self, user_id: UserId) -> RepoResult<()>;
    fn get_user(&self, user_id: UserId) -> RepoResult<Option<User>>;
    /// Looks up by username or email, both case-insensitive.
    fn find_user_by_login(&self, login: &str) -> RepoResult<Option<User>>;
    fn username_taken(&self, username: &str) -> RepoResult<bool>;
    fn email_taken(&self, email: &str, except: Option<UserId>) -> RepoResult<bool>;
    fn list_users(&self, limit: u32, offset: u32) -> RepoResult<Vec<User>>;
    fn count_users(&self) -> RepoResult<i64>;
    fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> RepoResult<()>;
    fn delete_user(&self, user_id: UserId) -> RepoResult<()>;

    fn get_profile(&self, user_id: UserId) -> RepoResult<Option<UserProfile>>;
    fn update_profile(&self, user_id: UserId, patch: &ProfilePatch) -> RepoResult<()>;
    fn refresh_profile_totals(&self, user_id: UserId) -> RepoResult<()>;
    fn get_settings(&self, user_id: UserId) -> RepoResult<Option<UserSettings>>;
    fn update_settings(&self, user_id: UserId, settings: &UserSettings) -> RepoResult<()>;

    /// Appends a login attempt; a success also stores `last_login_ip`.
    fn record_login(
        &self,
        user_id: UserId,
        ip_address: Option<&str>,
        user_agent: &str,
        success: bool,
    ) -> RepoResult<()>;
    fn list_login_history(&self, user_id: UserId, limit: u32) -> RepoResult<Vec<LoginRecord>>;

    fn create_session(&self, session: &Session) -> RepoResult<()>;
    fn get_session(&self, token: &str) -> RepoResult<Option<Session>>;
    fn delete_session(&self, token: &str) -> RepoResult<bool>;
    fn purge_expired_sessions(&self, now_ms: i64) -> RepoResult<usize>;
}

pub struct SqliteAccountRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAccountRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema(
            conn,
            &[
                ("users", &["id", "username", "email", "password_hash"]),
                ("user_profiles", &["user_id", "total_notebooks", "total_entries"]),
                ("user_settings", &["user_id", "items_per_page"]),
                ("login_history", &["user_id", "success"]),
                ("sessions", &["token", "user_id", "expires_at"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl AccountRepository for SqliteAccountRepository<'_> {
    fn create_user(&self, user: &NewUser) -> RepoResult<User> {
        let user_id = Uuid::new_v4();
        let now = now_ms();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT INTO users (
                id, username, email, password_hash, first_name,
                is_staff, is_superuser, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8);",
            params![
                user_id.to_string(),
                user.username.as_str(),
                user.email.as_str(),
                user.password_hash.as_str(),
                user.first_name.as_str(),
                bool_to_int(user.is_staff),
                bool_to_int(user.is_superuser),
                now,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(RepoError::Conflict(format!(
                    "username or email already registered: {}",
                    user.username
                )))
            }
            Err(err) => return Err(err.into()),
        }

        provision_user_rows(
            &tx,
            user_id,
            &default_display_name(&user.first_name, &user.username),
        )?;
        tx.commit()?;

        self.get_user(user_id)?
            .ok_or_else(|| RepoError::not_found("user", user_id))
    }

    fn ensure_provisioned(&self, user_id: UserId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let names: Option<(String, String)> = tx
            .query_row(
                "SELECT first_name, username FROM users WHERE id = ?1;",
                [user_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((first_name, username)) = names else {
            return Err(RepoError::not_found("user", user_id));
        };
        provision_user_rows(&tx, user_id, &default_display_name(&first_name, &username))?;
        tx.commit()?;
        Ok(())
    }

    fn get_user(&self, user_id: UserId) -> RepoResult<Option<User>> {
        let sql = format!("{USER_SELECT_SQL} WHERE id = ?1;");
        self.conn
            .query_row(&sql, [user_id.to_string()], |row| Ok(user_from_row(row)))
            .optional()?
            .transpose()
    }

    fn find_user_by_login(&self, login: &str) -> RepoResult<Option<User>> {
        let login = login.trim();
        if login.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "{USER_SELECT_SQL}
             WHERE username = ?1 COLLATE NOCASE
                OR (email <> '' AND email = ?1 COLLATE NOCASE)
             ORDER BY CASE WHEN username = ?1 COLLATE NOCASE THEN 0 ELSE 1 END
             LIMIT 1;"
        );
        self.conn
            .query_row(&sql, [login], |row| Ok(user_from_row(row)))
            .optional()?
            .transpose()
    }

    fn username_taken(&self, username: &str) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 COLLATE NOCASE);",
            [username.trim()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn email_taken(&self, email: &str, except: Option<UserId>) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM users
                WHERE email <> ''
                  AND email = ?1 COLLATE NOCASE
                  AND (?2 IS NULL OR id <> ?2)
            );",
            params![email.trim(), except.map(|id| id.to_string())],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn list_users(&self, limit: u32, offset: u32) -> RepoResult<Vec<User>> {
        let sql = format!("{USER_SELECT_SQL} ORDER BY created_at ASC, id ASC LIMIT ?1 OFFSET ?2;");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params![i64::from(limit), i64::from(offset)])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(user_from_row(row)?);
        }
        Ok(users)
    }

    fn count_users(&self) -> RepoResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM users;", [], |row| row.get(0))?)
    }

    fn update_password_hash(&self, user_id: UserId, password_hash: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1;",
            params![user_id.to_string(), password_hash, now_ms()],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("user", user_id));
        }
        Ok(())
    }

    fn delete_user(&self, user_id: UserId) -> RepoResult<()> {
        // Owned rows (profile, settings, history, notebooks, tags, activity)
        // go through ON DELETE CASCADE.
        let changed = self
            .conn
            .execute("DELETE FROM users WHERE id = ?1;", [user_id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::not_found("user", user_id));
        }
        Ok(())
    }

    fn get_profile(&self, user_id: UserId) -> RepoResult<Option<UserProfile>> {
        self.conn
            .query_row(
                "SELECT
                    user_id,
                    display_name,
                    bio,
                    investment_experience,
                    investment_style,
                    email_notifications,
                    public_profile,
                    show_statistics,
                    last_login_ip,
                    total_notebooks,
                    total_entries,
                    created_at,
                    updated_at
                 FROM user_profiles
                 WHERE user_id = ?1
                 ORDER BY id ASC
                 LIMIT 1;",
                [user_id.to_string()],
                |row| Ok(profile_from_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn update_profile(&self, user_id: UserId, patch: &ProfilePatch) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE user_profiles
             SET
                display_name = COALESCE(?2, display_name),
                bio = COALESCE(?3, bio),
                investment_experience = COALESCE(?4, investment_experience),
                investment_style = COALESCE(?5, investment_style),
                email_notifications = COALESCE(?6, email_notifications),
                public_profile = COALESCE(?7, public_profile),
                show_statistics = COALESCE(?8, show_statistics),
                updated_at = ?9
             WHERE user_id = ?1;",
            params![
                user_id.to_string(),
                patch.display_name.as_deref().map(str::trim),
                patch.bio.as_deref(),
                patch.investment_experience.map(InvestmentExperience::as_str),
                patch.investment_style.map(InvestmentStyle::as_str),
                patch.email_notifications.map(bool_to_int),
                patch.public_profile.map(bool_to_int),
                patch.show_statistics.map(bool_to_int),
                now_ms(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("profile", user_id));
        }
        Ok(())
    }

    fn refresh_profile_totals(&self, user_id: UserId) -> RepoResult<()> {
        refresh_profile_totals_in(self.conn, user_id)
    }

    fn get_settings(&self, user_id: UserId) -> RepoResult<Option<UserSettings>> {
        self.conn
            .query_row(
                "SELECT
                    theme,
                    language,
                    items_per_page,
                    show_recent_activity,
                    show_trending_tags,
                    show_statistics,
                    price_alert_enabled,
                    news_notification_enabled
                 FROM user_settings
                 WHERE user_id = ?1
                 ORDER BY id ASC
                 LIMIT 1;",
                [user_id.to_string()],
                |row| Ok(settings_from_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn update_settings(&self, user_id: UserId, settings: &UserSettings) -> RepoResult<()> {
        settings.validate()?;
        let changed = self.conn.execute(
            "UPDATE user_settings
             SET
                theme = ?2,
                language = ?3,
                items_per_page = ?4,
                show_recent_activity = ?5,
                show_trending_tags = ?6,
                show_statistics = ?7,
                price_alert_enabled = ?8,
                news_notification_enabled = ?9,
                updated_at = ?10
             WHERE user_id = ?1;",
            params![
                user_id.to_string(),
                settings.theme.as_str(),
                settings.language.as_str(),
                i64::from(settings.items_per_page),
                bool_to_int(settings.show_recent_activity),
                bool_to_int(settings.show_trending_tags),
                bool_to_int(settings.show_statistics),
                bool_to_int(settings.price_alert_enabled),
                bool_to_int(settings.news_notification_enabled),
                now_ms(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("settings", user_id));
        }
        Ok(())
    }

    fn record_login(
        &self,
        user_id: UserId,
        ip_address: Option<&str>,
        user_agent: &str,
        success: bool,
    ) -> RepoResult<()> {
        let now = now_ms();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO login_history (user_id, ip_address, user_agent, success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                user_id.to_string(),
                ip_address,
                user_agent,
                bool_to_int(success),
                now
            ],
        )?;
        if success {
            tx.execute(
                "UPDATE user_profiles
                 SET last_login_ip = COALESCE(?2, last_login_ip), updated_at = ?3
                 WHERE user_id = ?1;",
                params![user_id.to_string(), ip_address, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn list_login_history(&self, user_id: UserId, limit: u32) -> RepoResult<Vec<LoginRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, ip_address, user_agent, success, created_at
             FROM login_history
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2;",
        )?;
        let mut rows = stmt.query(params![user_id.to_string(), i64::from(limit)])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let user_text: String = row.get("user_id")?;
            records.push(LoginRecord {
                id: row.get("id")?,
                user_id: parse_uuid(&user_text, "login_history.user_id")?,
                ip_address: row.get("ip_address")?,
                user_agent: row.get("user_agent")?,
                success: row.get::<_, i64>("success")? == 1,
                created_at: row.get("created_at")?,
            });
        }
        Ok(records)
    }

    fn create_session(&self, session: &Session) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                session.token.as_str(),
                session.user_id.to_string(),
                session.created_at,
                session.expires_at
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, token: &str) -> RepoResult<Option<Session>> {
        let row: Option<(String, String, i64, i64)> = self
            .conn
            .query_row(
                "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?1;",
                [token],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let Some((token, user_text, created_at, expires_at)) = row else {
            return Ok(None);
        };
        Ok(Some(Session {
            token,
            user_id: parse_uuid(&user_text, "sessions.user_id")?,
            created_at,
            expires_at,
        }))
    }

    fn delete_session(&self, token: &str) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM sessions WHERE token = ?1;", [token])?;
        Ok(changed > 0)
    }

    fn purge_expired_sessions(&self, now_ms: i64) -> RepoResult<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM sessions WHERE expires_at <= ?1;", [now_ms])?)
    }
}

/// Inserts profile and settings rows when absent.
pub(crate) fn provision_user_rows(
    conn: &Connection,
    user_id: UserId,
    display_name: &str,
) -> RepoResult<(bool, bool)> {
    let now = now_ms();
    let user_text = user_id.to_string();
    let profile_created = conn.execute(
        "INSERT INTO user_profiles (user_id, display_name, created_at, updated_at)
         SELECT ?1, ?2, ?3, ?3
         WHERE NOT EXISTS (SELECT 1 FROM user_profiles WHERE user_id = ?1);",
        params![user_text, display_name, now],
    )? > 0;
    let settings_created = conn.execute(
        "INSERT INTO user_settings (user_id, created_at, updated_at)
         SELECT ?1, ?2, ?2
         WHERE NOT EXISTS (SELECT 1 FROM user_settings WHERE user_id = ?1);",
        params![user_text, now],
    )? > 0;
    Ok((profile_created, settings_created))
}

/// Recomputes `total_notebooks` / `total_entries` from the owned rows.
pub(crate) fn refresh_profile_totals_in(conn: &Connection, user_id: UserId) -> RepoResult<()> {
    conn.execute(
        "UPDATE user_profiles
         SET
            total_notebooks = (SELECT COUNT(*) FROM notebooks WHERE user_id = ?1),
            total_entries = (
                SELECT COUNT(*)
                FROM entries e
                INNER JOIN notebooks n ON n.id = e.notebook_id
                WHERE n.user_id = ?1
            ),
            updated_at = ?2
         WHERE user_id = ?1;",
        params![user_id.to_string(), now_ms()],
    )?;
    Ok(())
}

fn user_from_row(row: &Row<'_>) -> RepoResult<User> {
    let id_text: String = row.get("id")?;
    Ok(User {
        id: parse_uuid(&id_text, "users.id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        first_name: row.get("first_name")?,
        is_staff: row.get::<_, i64>("is_staff")? == 1,
        is_superuser: row.get::<_, i64>("is_superuser")? == 1,
        is_active: row.get::<_, i64>("is_active")? == 1,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn profile_from_row(row: &Row<'_>) -> RepoResult<UserProfile> {
    let user_text: String = row.get("user_id")?;
    let experience: String = row.get("investment_experience")?;
    let style: String = row.get("investment_style")?;
    Ok(UserProfile {
        user_id: parse_uuid(&user_text, "user_profiles.user_id")?,
        display_name: row.get("display_name")?,
        bio: row.get("bio")?,
        investment_experience: InvestmentExperience::parse(&experience)
            .ok_or_else(|| invalid_enum("user_profiles.investment_experience", &experience))?,
        investment_style: InvestmentStyle::parse(&style)
            .ok_or_else(|| invalid_enum("user_profiles.investment_style", &style))?,
        email_notifications: row.get::<_, i64>("email_notifications")? == 1,
        public_profile: row.get::<_, i64>("public_profile")? == 1,
        show_statistics: row.get::<_, i64>("show_statistics")? == 1,
        last_login_ip: row.get("last_login_ip")?,
        total_notebooks: row.get("total_notebooks")?,
        total_entries: row.get("total_entries")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn settings_from_row(row: &Row<'_>) -> RepoResult<UserSettings> {
    let theme: String = row.get("theme")?;
    let language: String = row.get("language")?;
    let items_per_page: i64 = row.get("items_per_page")?;
    Ok(UserSettings {
        theme: Theme::parse(&theme).ok_or_else(|| invalid_enum("user_settings.theme", &theme))?,
        language: Language::parse(&language)
            .ok_or_else(|| invalid_enum("user_settings.language", &language))?,
        items_per_page: u32::try_from(items_per_page).map_err(|_| {
            RepoError::InvalidData(format!("items_per_page out of range: {items_per_page}"))
        })?,
        show_recent_activity: row.get::<_, i64>("show_recent_activity")? == 1,
        show_trending_tags: row.get::<_, i64>("show_trending_tags")? == 1,
        show_statistics: row.get::<_, i64>("show_statistics")? == 1,
        price_alert_enabled: row.get::<_, i64>("price_alert_enabled")? == 1,
        news_notification_enabled: row.get::<_, i64>("news_notification_enabled")? == 1,
    })
}
