use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        delivery::ResetTokenSender,
        jwt::JwtKeys,
        model::{is_valid_email, normalize_email, validate_and_stage, NewUserFields, Plaintext, User},
        password::verify_decoy,
        repo::UserStore,
        reset::{consume_reset_token, hash_token, issue_reset_token},
    },
    error::AuthError,
};

/// A user together with a freshly signed session token.
#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub token: String,
}

pub async fn register(
    store: &dyn UserStore,
    keys: &JwtKeys,
    fields: NewUserFields,
) -> Result<Session, AuthError> {
    let staged = validate_and_stage(store, fields).await?;
    let user = store.create(staged.commit().await?).await?;
    let token = keys.issue_session_token(&user)?;
    info!(user_id = %user.id, "user registered");
    Ok(Session { user, token })
}

pub async fn login(
    store: &dyn UserStore,
    keys: &JwtKeys,
    email: &str,
    password: &Plaintext,
) -> Result<Session, AuthError> {
    let email = normalize_email(email);
    if email.is_empty() || password.expose().is_empty() {
        return Err(AuthError::validation("Please provide an email and password"));
    }
    if !is_valid_email(&email) {
        return Err(AuthError::Authentication);
    }

    let user = match store.find_by_email(&email).await? {
        Some(u) => u,
        None => {
            verify_decoy(password).await?;
            warn!("login unknown email");
            return Err(AuthError::Authentication);
        }
    };

    if !user.check_password(password).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AuthError::Authentication);
    }

    let token = keys.issue_session_token(&user)?;
    info!(user_id = %user.id, "user logged in");
    Ok(Session { user, token })
}

/// A valid token for a user that no longer exists is treated as a bad token.
pub async fn current_user(store: &dyn UserStore, user_id: Uuid) -> Result<User, AuthError> {
    store
        .find_by_id(user_id)
        .await?
        .ok_or(AuthError::Authentication)
}

pub async fn delete_user(
    store: &dyn UserStore,
    caller: Uuid,
    target: Uuid,
) -> Result<(), AuthError> {
    if caller != target {
        warn!(%caller, %target, "attempt to delete another user");
        return Err(AuthError::Forbidden);
    }
    if !store.delete(target).await? {
        return Err(AuthError::NotFound("User"));
    }
    info!(user_id = %target, "user deleted");
    Ok(())
}

/// Issues a reset token and hands it to the sender. Unknown emails succeed
/// silently so the endpoint cannot be used to discover which accounts exist.
pub async fn forgot_password(
    store: &dyn UserStore,
    sender: &dyn ResetTokenSender,
    email: &str,
) -> Result<(), AuthError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AuthError::validation("Please include an email!"));
    }

    let mut user = match store.find_by_email(&email).await? {
        Some(u) => u,
        None => {
            info!("reset requested for unknown email");
            return Ok(());
        }
    };

    let issued = issue_reset_token(&mut user);
    store.save(&user).await?;

    if let Err(e) = sender
        .send_reset_token(&user, &issued.token, issued.expires_at)
        .await
    {
        error!(error = %e, user_id = %user.id, "reset token delivery failed");
        user.reset = None;
        store.save(&user).await?;
        return Err(AuthError::Internal(e.context("deliver reset token")));
    }
    Ok(())
}

pub async fn reset_password(
    store: &dyn UserStore,
    keys: &JwtKeys,
    presented: &str,
    new_password: Plaintext,
) -> Result<Session, AuthError> {
    let token_hash = hash_token(presented.trim());
    let mut user = store
        .find_by_reset_token(&token_hash)
        .await?
        .ok_or(AuthError::ResetToken)?;

    consume_reset_token(&mut user, presented, new_password).await?;
    // Fails if another request consumed or replaced the token in the meantime.
    store.complete_reset(&user, &token_hash).await?;

    let token = keys.issue_session_token(&user)?;
    info!(user_id = %user.id, "password reset");
    Ok(Session { user, token })
}
