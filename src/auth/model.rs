use std::{fmt, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::{password, repo::UserStore},
    error::AuthError,
};

pub const MIN_PASSWORD_LEN: usize = 6;

pub const NAME_REQUIRED: &str = "Please include a name!";
pub const EMAIL_REQUIRED: &str = "Please include an email!";
pub const EMAIL_INVALID: &str = "Please add a valid email";
pub const EMAIL_TAKEN: &str = "Email already taken!";
pub const PASSWORD_REQUIRED: &str = "Please add a password!";
pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 6 characters!";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            other => Err(AuthError::validation(format!("`{other}` is not a valid role"))),
        }
    }
}

/// A password as typed by the user. Never printed, never stored.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Plaintext(String);

impl Plaintext {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }

    fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Debug for Plaintext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Plaintext(***)")
    }
}

/// Whether a write carries a new password.
#[derive(Debug)]
pub enum PasswordUpdate {
    Unchanged,
    Set(Plaintext),
}

/// A reset waiting to be consumed: hash of the emailed token and its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReset {
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub reset: Option<PendingReset>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Rehashes only when the update carries a new password.
    pub async fn apply_password(&mut self, update: PasswordUpdate) -> Result<(), AuthError> {
        if let Some(hash) = password::commit_hash(update).await? {
            self.password_hash = hash;
        }
        Ok(())
    }

    pub async fn check_password(&self, candidate: &Plaintext) -> Result<bool, AuthError> {
        password::verify_password(candidate, &self.password_hash).await
    }
}

/// Registration input that passed validation but has not been hashed yet.
#[derive(Debug)]
pub struct StagedUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    password: Plaintext,
}

impl StagedUser {
    /// Hashes the password and produces a user ready to be persisted.
    pub async fn commit(self) -> Result<User, AuthError> {
        let StagedUser {
            name,
            email,
            role,
            password,
        } = self;
        let password_hash = password::hash_password(password).await?;
        Ok(User {
            id: Uuid::new_v4(),
            name,
            email,
            role,
            password_hash,
            reset: None,
            created_at: OffsetDateTime::now_utc(),
        })
    }
}

#[derive(Debug, Default)]
pub struct NewUserFields {
    pub name: String,
    pub email: String,
    pub role: Option<String>,
    pub password: Option<Plaintext>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^\w+([\.-]?\w+)*@\w+([\.-]?\w+)*(\.\w{2,3})+$").expect("email regex");
    }
    EMAIL_RE.is_match(email)
}

pub fn check_password_len(password: &Plaintext) -> Result<(), AuthError> {
    if password.char_len() < MIN_PASSWORD_LEN {
        return Err(AuthError::validation(PASSWORD_TOO_SHORT));
    }
    Ok(())
}

/// Validates registration fields and checks that the email is free.
pub async fn validate_and_stage(
    store: &dyn UserStore,
    fields: NewUserFields,
) -> Result<StagedUser, AuthError> {
    let mut reasons = Vec::new();

    let name = fields.name.trim().to_string();
    if name.is_empty() {
        reasons.push(NAME_REQUIRED.to_string());
    }

    let email = normalize_email(&fields.email);
    if email.is_empty() {
        reasons.push(EMAIL_REQUIRED.to_string());
    } else if !is_valid_email(&email) {
        reasons.push(EMAIL_INVALID.to_string());
    }

    let role = match fields.role.as_deref().map(str::trim) {
        None | Some("") => Role::default(),
        Some(raw) => match raw.parse::<Role>() {
            Ok(role) => role,
            Err(AuthError::Validation(mut r)) => {
                reasons.append(&mut r);
                Role::default()
            }
            Err(e) => return Err(e),
        },
    };

    match &fields.password {
        None => reasons.push(PASSWORD_REQUIRED.to_string()),
        Some(p) if p.char_len() == 0 => reasons.push(PASSWORD_REQUIRED.to_string()),
        Some(p) if p.char_len() < MIN_PASSWORD_LEN => {
            reasons.push(PASSWORD_TOO_SHORT.to_string())
        }
        Some(_) => {}
    }

    let password = match fields.password {
        Some(p) if reasons.is_empty() => p,
        _ => return Err(AuthError::Validation(reasons)),
    };

    if store.email_taken(&email).await? {
        return Err(AuthError::Duplicate(EMAIL_TAKEN.to_string()));
    }

    Ok(StagedUser {
        name,
        email,
        role,
        password,
    })
}
