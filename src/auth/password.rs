use anyhow::Context;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tokio::sync::OnceCell;
use tracing::error;

use crate::{
    auth::model::{PasswordUpdate, Plaintext},
    error::AuthError,
};

fn hash_blocking(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

fn verify_blocking(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Hashes on the blocking pool; the plaintext is dropped when the task ends.
pub async fn hash_password(plain: Plaintext) -> Result<String, AuthError> {
    let hash = tokio::task::spawn_blocking(move || hash_blocking(plain.expose()))
        .await
        .context("password hashing task")??;
    Ok(hash)
}

/// Argon2 does the comparison; a mismatch is `Ok(false)`.
pub async fn verify_password(candidate: &Plaintext, hash: &str) -> Result<bool, AuthError> {
    let candidate = candidate.clone();
    let hash = hash.to_owned();
    let ok = tokio::task::spawn_blocking(move || verify_blocking(candidate.expose(), &hash))
        .await
        .context("password verification task")??;
    Ok(ok)
}

static DECOY_HASH: OnceCell<String> = OnceCell::const_new();

/// Runs a full verification against a throwaway hash so a lookup miss costs
/// the same as a wrong password. Always `false`.
pub async fn verify_decoy(candidate: &Plaintext) -> Result<bool, AuthError> {
    let decoy = DECOY_HASH
        .get_or_try_init(|| hash_password(Plaintext::new("decoy-password-never-matches")))
        .await?;
    verify_password(candidate, decoy).await?;
    Ok(false)
}

/// Returns the new hash, or `None` when the write leaves the password alone.
pub async fn commit_hash(update: PasswordUpdate) -> Result<Option<String>, AuthError> {
    match update {
        PasswordUpdate::Unchanged => Ok(None),
        PasswordUpdate::Set(plain) => hash_password(plain).await.map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(Plaintext::new(password))
            .await
            .expect("hashing should succeed");
        assert!(hash.starts_with("$argon2"));
        assert!(!hash.contains(password));
        assert!(verify_password(&Plaintext::new(password), &hash)
            .await
            .expect("verify should succeed"));
    }

    #[tokio::test]
    async fn verify_rejects_wrong_password() {
        let hash = hash_password(Plaintext::new("correct-horse-battery-staple"))
            .await
            .expect("hashing should succeed");
        assert!(!verify_password(&Plaintext::new("wrong-password"), &hash)
            .await
            .expect("verify should not error"));
    }

    #[tokio::test]
    async fn same_password_gets_fresh_salt() {
        let a = hash_password(Plaintext::new("secret1")).await.unwrap();
        let b = hash_password(Plaintext::new("secret1")).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn verify_errors_on_malformed_hash() {
        let err = verify_password(&Plaintext::new("anything"), "not-a-valid-hash")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[tokio::test]
    async fn decoy_never_matches() {
        assert!(!verify_decoy(&Plaintext::new("decoy-password-never-matches"))
            .await
            .unwrap());
        assert!(!verify_decoy(&Plaintext::new("secret1")).await.unwrap());
        let decoy = DECOY_HASH.get().expect("decoy initialised");
        assert!(decoy.starts_with("$argon2"));
    }

    #[tokio::test]
    async fn commit_hash_skips_unchanged() {
        assert!(commit_hash(PasswordUpdate::Unchanged).await.unwrap().is_none());
        let hash = commit_hash(PasswordUpdate::Set(Plaintext::new("secret1")))
            .await
            .unwrap()
            .expect("new hash");
        assert!(verify_password(&Plaintext::new("secret1"), &hash).await.unwrap());
    }
}
