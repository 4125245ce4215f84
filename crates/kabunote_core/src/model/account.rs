//! Account domain model: users, profiles, settings and login history.
//!
//! # Invariants
//! - Every user owns exactly one `UserProfile` and one `UserSettings`.
//! - `items_per_page` stays within `5..=50`.
//! - Password hashes are PHC strings and never leave the core crate via serde.

use super::{check_max_chars, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

pub const USERNAME_MIN_CHARS: usize = 3;
pub const USERNAME_MAX_CHARS: usize = 150;
pub const PASSWORD_MIN_CHARS: usize = 8;
pub const DISPLAY_NAME_MAX_CHARS: usize = 50;
pub const BIO_MAX_CHARS: usize = 500;
pub const ITEMS_PER_PAGE_MIN: u32 = 5;
pub const ITEMS_PER_PAGE_MAX: u32 = 50;
pub const ITEMS_PER_PAGE_DEFAULT: u32 = 12;

/// Usernames that can never be registered, compared case-insensitively.
pub const RESERVED_USERNAMES: &[&str] = &["admin", "api", "www", "mail", "ftp", "root", "test", "demo"];

/// Words a display name must not contain.
const DISPLAY_NAME_BLOCKLIST: &[&str] = &["admin", "moderator", "system", "test"];

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9@.+\-_]+$").expect("valid username regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentExperience {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl InvestmentExperience {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "BEGINNER",
            Self::Intermediate => "INTERMEDIATE",
            Self::Advanced => "ADVANCED",
            Self::Expert => "EXPERT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BEGINNER" => Some(Self::Beginner),
            "INTERMEDIATE" => Some(Self::Intermediate),
            "ADVANCED" => Some(Self::Advanced),
            "EXPERT" => Some(Self::Expert),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentStyle {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
    Speculative,
}

impl InvestmentStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conservative => "CONSERVATIVE",
            Self::Moderate => "MODERATE",
            Self::Aggressive => "AGGRESSIVE",
            Self::Speculative => "SPECULATIVE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CONSERVATIVE" => Some(Self::Conservative),
            "MODERATE" => Some(Self::Moderate),
            "AGGRESSIVE" => Some(Self::Aggressive),
            "SPECULATIVE" => Some(Self::Speculative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub bio: String,
    pub investment_experience: InvestmentExperience,
    pub investment_style: InvestmentStyle,
    pub email_notifications: bool,
    pub public_profile: bool,
    pub show_statistics: bool,
    pub last_login_ip: Option<String>,
    pub total_notebooks: i64,
    pub total_entries: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Partial profile update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub investment_experience: Option<InvestmentExperience>,
    pub investment_style: Option<InvestmentStyle>,
    pub email_notifications: Option<bool>,
    pub public_profile: Option<bool>,
    pub show_statistics: Option<bool>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.updated_fields().is_empty()
    }

    /// Names of the fields this patch would change.
    pub fn updated_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.display_name.is_some() {
            fields.push("display_name");
        }
        if self.bio.is_some() {
            fields.push("bio");
        }
        if self.investment_experience.is_some() {
            fields.push("investment_experience");
        }
        if self.investment_style.is_some() {
            fields.push("investment_style");
        }
        if self.email_notifications.is_some() {
            fields.push("email_notifications");
        }
        if self.public_profile.is_some() {
            fields.push("public_profile");
        }
        if self.show_statistics.is_some() {
            fields.push("show_statistics");
        }
        fields
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = self.display_name.as_deref() {
            validate_display_name(name)?;
        }
        if let Some(bio) = self.bio.as_deref() {
            check_max_chars("bio", bio, BIO_MAX_CHARS)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    Auto,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "DARK",
            Self::Light => "LIGHT",
            Self::Auto => "AUTO",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DARK" => Some(Self::Dark),
            "LIGHT" => Some(Self::Light),
            "AUTO" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ja,
    En,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ja => "ja",
            Self::En => "en",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ja" => Some(Self::Ja),
            "en" => Some(Self::En),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub theme: Theme,
    pub language: Language,
    pub items_per_page: u32,
    pub show_recent_activity: bool,
    pub show_trending_tags: bool,
    pub show_statistics: bool,
    pub price_alert_enabled: bool,
    pub news_notification_enabled: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            language: Language::default(),
            items_per_page: ITEMS_PER_PAGE_DEFAULT,
            show_recent_activity: true,
            show_trending_tags: true,
            show_statistics: true,
            price_alert_enabled: true,
            news_notification_enabled: true,
        }
    }
}

impl UserSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(ITEMS_PER_PAGE_MIN..=ITEMS_PER_PAGE_MAX).contains(&self.items_per_page) {
            return Err(ValidationError::new(
                "items_per_page",
                format!("must be between {ITEMS_PER_PAGE_MIN} and {ITEMS_PER_PAGE_MAX}"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginRecord {
    pub id: i64,
    pub user_id: UserId,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub success: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Result of a username availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsernameCheck {
    pub available: bool,
    pub message: String,
}

/// Checks username shape rules that do not need storage.
///
/// Returns the rejection message when the name is unusable.
pub fn username_shape_error(username: &str) -> Option<&'static str> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Some("ユーザー名を入力してください");
    }
    if trimmed.chars().count() < USERNAME_MIN_CHARS {
        return Some("ユーザー名は3文字以上で入力してください");
    }
    if trimmed.chars().count() > USERNAME_MAX_CHARS {
        return Some("ユーザー名は150文字以内で入力してください");
    }
    if !USERNAME_RE.is_match(trimmed) {
        return Some("ユーザー名には英数字と @/./+/-/_ のみ使用できます");
    }
    let lowered = trimmed.to_ascii_lowercase();
    if RESERVED_USERNAMES.contains(&lowered.as_str()) {
        return Some("このユーザー名は使用できません");
    }
    None
}

/// One `@`, a non-empty local part and a dotted domain.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let trimmed = email.trim();
    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(ValidationError::new("email", "invalid email address"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(ValidationError::new(
            "password",
            format!("must be at least {PASSWORD_MIN_CHARS} characters"),
        ));
    }
    Ok(())
}

/// Display names are optional; when set they need 2+ chars and no staff-like words.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    if trimmed.chars().count() < 2 {
        return Err(ValidationError::new(
            "display_name",
            "must be at least 2 characters",
        ));
    }
    check_max_chars("display_name", trimmed, DISPLAY_NAME_MAX_CHARS)?;
    let lowered = trimmed.to_lowercase();
    if let Some(word) = DISPLAY_NAME_BLOCKLIST
        .iter()
        .find(|word| lowered.contains(*word))
    {
        return Err(ValidationError::new(
            "display_name",
            format!("must not contain `{word}`"),
        ));
    }
    Ok(())
}

/// Display name used when a profile is provisioned.
pub fn default_display_name(first_name: &str, username: &str) -> String {
    let first = first_name.trim();
    if first.is_empty() {
        username.to_string()
    } else {
        first.to_string()
    }
}
