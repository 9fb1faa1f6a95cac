//! Linking two users into a couple.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::calendar::Calendar;
use crate::constants::{JOIN_CODE_ALPHABET, JOIN_CODE_LEN};
use crate::error::{WeTimeError, WeTimeResult};
use crate::event::{CoupleId, UserId};
use crate::store::Store;
use crate::user::{Couple, User};
use crate::visibility::{partner_of, require_user};

/// Attempts at finding an unused join code before giving up.
const MAX_CODE_ATTEMPTS: usize = 16;

/// Bytes of a v4 UUID that carry no version or variant bits.
const RANDOM_BYTES: [usize; JOIN_CODE_LEN] = [0, 1, 2, 3, 4, 5, 7, 9];

/// A random join code over an alphabet without look-alike characters.
pub fn generate_join_code() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    // 32 symbols divide 256 evenly, so every symbol is equally likely
    RANDOM_BYTES
        .iter()
        .map(|i| JOIN_CODE_ALPHABET[bytes[*i] as usize % JOIN_CODE_ALPHABET.len()] as char)
        .collect()
}

/// Create a couple for `user_id` together with its shared calendar.
pub async fn create_couple(store: &dyn Store, user_id: UserId) -> WeTimeResult<(Couple, Calendar)> {
    let user = require_user(store, user_id).await?;
    if user.couple_id.is_some() {
        return Err(WeTimeError::Couple("already_in_couple".to_string()));
    }

    let mut code = generate_join_code();
    let mut attempts = 1;
    while store.couple_by_code(&code).await?.is_some() {
        if attempts >= MAX_CODE_ATTEMPTS {
            return Err(WeTimeError::Couple(
                "could not allocate a unique join code".to_string(),
            ));
        }
        code = generate_join_code();
        attempts += 1;
    }

    let couple = Couple {
        id: Uuid::new_v4(),
        join_code: code,
        created_at: Utc::now(),
    };
    let shared = Calendar::shared(couple.id);

    store
        .create_couple(couple.clone(), shared.clone(), user.id)
        .await?;

    tracing::info!(user = %user.id, couple = %couple.id, "Created couple");

    Ok((couple, shared))
}

/// Join the couple identified by `code`.
pub async fn join_couple(store: &dyn Store, user_id: UserId, code: &str) -> WeTimeResult<Couple> {
    let code = code.trim().to_ascii_uppercase();
    if !(6..=12).contains(&code.len()) {
        return Err(WeTimeError::Invalid("join code must be 6 to 12 characters".to_string()));
    }

    let couple = store
        .couple_by_code(&code)
        .await?
        .ok_or_else(|| WeTimeError::NotFound("invalid_code".to_string()))?;

    store.join_couple(couple.id, user_id).await?;

    tracing::info!(user = %user_id, couple = %couple.id, "Joined couple");

    Ok(couple)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerInfo {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoupleStatus {
    pub id: CoupleId,
    pub code: String,
    pub partner: Option<PartnerInfo>,
    pub created_at: DateTime<Utc>,
}

/// The caller's couple and partner, if linked.
pub async fn couple_status(store: &dyn Store, user: &User) -> WeTimeResult<Option<CoupleStatus>> {
    let Some(couple_id) = user.couple_id else {
        return Ok(None);
    };
    let Some(couple) = store.couple(couple_id).await? else {
        return Ok(None);
    };

    let partner = partner_of(store, user).await?.map(|p| PartnerInfo {
        id: p.id,
        name: p.name,
        email: p.email,
    });

    Ok(Some(CoupleStatus {
        id: couple.id,
        code: couple.join_code,
        partner,
        created_at: couple.created_at,
    }))
}
