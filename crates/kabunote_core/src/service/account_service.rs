//! Account use-cases: registration, login sessions, profile and settings.
//!
//! # Responsibility
//! - Validate sign-up input and provision user rows.
//! - Hash and verify passwords (Argon2id PHC strings).
//! - Issue, resolve and revoke bearer sessions.
//!
//! # Invariants
//! - Profile and settings reads go through `ensure_provisioned`, so a user
//!   never observes a missing row.
//! - Failed logins are recorded only when the login names a known user.
//! - Log lines carry ids and outcomes, never passwords or tokens.

use super::{ServiceError, ServiceResult};
use crate::db::now_ms;
use crate::model::account::{
    username_shape_error, validate_email, validate_password, LoginRecord, ProfilePatch, Session,
    User, UserId, UserProfile, UserSettings, UsernameCheck,
};
use crate::repo::account_repo::{AccountRepository, NewUser};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::Deserialize;
use uuid::Uuid;

pub const DEFAULT_SESSION_DAYS: u32 = 14;
pub const LOGIN_HISTORY_DEFAULT_LIMIT: u32 = 10;
const LOGIN_HISTORY_MAX_LIMIT: u32 = 100;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Sign-up form input.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    /// When present it must equal `password`.
    pub password_confirm: Option<String>,
    pub first_name: String,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub session: Session,
}

pub struct AccountService<R: AccountRepository> {
    repo: R,
    session_days: u32,
}

impl<R: AccountRepository> AccountService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_session_days(repo, DEFAULT_SESSION_DAYS)
    }

    pub fn with_session_days(repo: R, session_days: u32) -> Self {
        Self {
            repo,
            session_days: session_days.max(1),
        }
    }

    /// Availability check used by the sign-up form; never fails on bad input.
    pub fn check_username(&self, username: &str) -> ServiceResult<UsernameCheck> {
        if let Some(message) = username_shape_error(username) {
            return Ok(UsernameCheck {
                available: false,
                message: message.to_string(),
            });
        }
        if self.repo.username_taken(username)? {
            return Ok(UsernameCheck {
                available: false,
                message: "このユーザー名は既に使用されています".to_string(),
            });
        }
        Ok(UsernameCheck {
            available: true,
            message: "このユーザー名は使用可能です".to_string(),
        })
    }

    /// Creates a user with profile and settings.
    pub fn register(&self, input: &Registration) -> ServiceResult<User> {
        self.register_with_roles(input, false, false)
    }

    /// Registration variant used by provisioning commands.
    pub fn register_with_roles(
        &self,
        input: &Registration,
        is_staff: bool,
        is_superuser: bool,
    ) -> ServiceResult<User> {
        let username = input.username.trim();
        if let Some(message) = username_shape_error(username) {
            return Err(ServiceError::validation("username", message));
        }
        if self.repo.username_taken(username)? {
            return Err(ServiceError::validation(
                "username",
                "このユーザー名は既に使用されています",
            ));
        }
        let email = input.email.trim();
        validate_email(email)?;
        if self.repo.email_taken(email, None)? {
            return Err(ServiceError::validation(
                "email",
                "このメールアドレスは既に登録されています",
            ));
        }
        validate_password(&input.password)?;
        if let Some(confirm) = input.password_confirm.as_deref() {
            if confirm != input.password {
                return Err(ServiceError::validation(
                    "password_confirm",
                    "passwords do not match",
                ));
            }
        }

        let user = self.repo.create_user(&NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(&input.password)?,
            first_name: input.first_name.trim().to_string(),
            is_staff,
            is_superuser,
        })?;
        log::info!(
            "event=account_register module=account status=ok user_id={} staff={}",
            user.id,
            is_staff
        );
        Ok(user)
    }

    /// Verifies credentials (username or email) and opens a session.
    pub fn authenticate(
        &self,
        login: &str,
        password: &str,
        ip_address: Option<&str>,
        user_agent: &str,
    ) -> ServiceResult<LoginOutcome> {
        let Some(user) = self.repo.find_user_by_login(login)? else {
            log::info!("event=account_login module=account status=error reason=unknown_user");
            return Err(ServiceError::InvalidCredentials);
        };
        if !user.is_active || !verify_password(password, &user.password_hash) {
            self.repo.record_login(user.id, ip_address, user_agent, false)?;
            log::info!(
                "event=account_login module=account status=error user_id={} reason=bad_credentials",
                user.id
            );
            return Err(ServiceError::InvalidCredentials);
        }

        self.repo.ensure_provisioned(user.id)?;
        self.repo.record_login(user.id, ip_address, user_agent, true)?;
        let session = self.open_session(user.id)?;
        log::info!(
            "event=account_login module=account status=ok user_id={}",
            user.id
        );
        Ok(LoginOutcome { user, session })
    }

    /// Revokes a session token. Returns `false` for unknown tokens.
    pub fn logout(&self, token: &str) -> ServiceResult<bool> {
        Ok(self.repo.delete_session(token)?)
    }

    /// Resolves a bearer token to its active user.
    pub fn resolve_session(&self, token: &str) -> ServiceResult<User> {
        let Some(session) = self.repo.get_session(token)? else {
            return Err(ServiceError::Unauthorized);
        };
        let now = now_ms();
        if session.expires_at <= now {
            let purged = self.repo.purge_expired_sessions(now)?;
            log::debug!(
                "event=session_expired module=account status=ok user_id={} purged={purged}",
                session.user_id
            );
            return Err(ServiceError::Unauthorized);
        }
        match self.repo.get_user(session.user_id)? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(ServiceError::Unauthorized),
        }
    }

    pub fn get_user(&self, user_id: UserId) -> ServiceResult<User> {
        self.repo
            .get_user(user_id)?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })
    }

    pub fn get_profile(&self, user_id: UserId) -> ServiceResult<UserProfile> {
        self.repo.ensure_provisioned(user_id)?;
        self.repo
            .get_profile(user_id)?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "profile",
                id: user_id.to_string(),
            })
    }

    /// Applies a partial profile update and returns the changed field names.
    pub fn update_profile(
        &self,
        user_id: UserId,
        patch: &ProfilePatch,
    ) -> ServiceResult<(UserProfile, Vec<&'static str>)> {
        if patch.is_empty() {
            return Err(ServiceError::validation("profile", "nothing to update"));
        }
        patch.validate()?;
        self.repo.ensure_provisioned(user_id)?;
        self.repo.update_profile(user_id, patch)?;
        let fields = patch.updated_fields();
        log::info!(
            "event=profile_update module=account status=ok user_id={user_id} fields={}",
            fields.join(",")
        );
        Ok((self.get_profile(user_id)?, fields))
    }

    /// Recomputes notebook/entry totals on the profile.
    pub fn update_statistics(&self, user_id: UserId) -> ServiceResult<UserProfile> {
        self.repo.ensure_provisioned(user_id)?;
        self.repo.refresh_profile_totals(user_id)?;
        self.get_profile(user_id)
    }

    pub fn get_settings(&self, user_id: UserId) -> ServiceResult<UserSettings> {
        self.repo.ensure_provisioned(user_id)?;
        self.repo
            .get_settings(user_id)?
            .ok_or_else(|| ServiceError::NotFound {
                entity: "settings",
                id: user_id.to_string(),
            })
    }

    pub fn update_settings(
        &self,
        user_id: UserId,
        settings: &UserSettings,
    ) -> ServiceResult<UserSettings> {
        settings.validate()?;
        self.repo.ensure_provisioned(user_id)?;
        self.repo.update_settings(user_id, settings)?;
        self.get_settings(user_id)
    }

    pub fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        let user = self.get_user(user_id)?;
        if !verify_password(current_password, &user.password_hash) {
            return Err(ServiceError::InvalidCredentials);
        }
        validate_password(new_password)?;
        self.repo
            .update_password_hash(user_id, &hash_password(new_password)?)?;
        log::info!("event=password_change module=account status=ok user_id={user_id}");
        Ok(())
    }

    /// Deletes the user and everything they own after a password check.
    pub fn delete_account(&self, user_id: UserId, password: &str) -> ServiceResult<()> {
        let user = self.get_user(user_id)?;
        if !verify_password(password, &user.password_hash) {
            return Err(ServiceError::InvalidCredentials);
        }
        self.repo.delete_user(user_id)?;
        log::info!("event=account_delete module=account status=ok user_id={user_id}");
        Ok(())
    }

    pub fn login_history(&self, user_id: UserId, limit: Option<u32>) -> ServiceResult<Vec<LoginRecord>> {
        let limit = match limit {
            Some(0) | None => LOGIN_HISTORY_DEFAULT_LIMIT,
            Some(value) => value.min(LOGIN_HISTORY_MAX_LIMIT),
        };
        Ok(self.repo.list_login_history(user_id, limit)?)
    }

    fn open_session(&self, user_id: UserId) -> ServiceResult<Session> {
        let now = now_ms();
        let session = Session {
            token: Uuid::new_v4().simple().to_string(),
            user_id,
            created_at: now,
            expires_at: now + i64::from(self.session_days) * DAY_MS,
        };
        self.repo.create_session(&session)?;
        Ok(session)
    }
}

/// Hashes a password into an Argon2id PHC string.
pub fn hash_password(password: &str) -> ServiceResult<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|err| ServiceError::Internal(format!("password salt: {err}")))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| ServiceError::Internal(format!("password hash: {err}")))
}

/// Checks a password against a stored PHC string; malformed hashes never match.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}
