use std::num::IntErrorKind;

use sea_orm::ConnectionTrait;
use tracing::{debug, info};

use crate::{entities::household, error::AppError, store};

/// Raw RSVP form as posted by the invitation page. Every field is optional
/// text; nothing here is allowed to reject the submission.
#[derive(Debug, Clone, Default)]
pub struct RsvpForm {
    pub nb_mairie: Option<String>,
    pub nb_soiree: Option<String>,
    pub comments: Option<String>,
}

impl RsvpForm {
    /// Reads an `application/x-www-form-urlencoded` body. Unknown keys are
    /// ignored and a repeated key keeps its last value.
    pub fn from_urlencoded(body: &[u8]) -> Self {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).unwrap_or_else(|err| {
            debug!("Unreadable RSVP body, treating it as empty: {err}");
            Vec::new()
        });

        let mut form = RsvpForm::default();
        for (key, value) in pairs {
            match key.as_str() {
                "nb_mairie" => form.nb_mairie = Some(value),
                "nb_soiree" => form.nb_soiree = Some(value),
                "comments" => form.comments = Some(value),
                _ => {}
            }
        }
        form
    }
}

pub async fn resolve_household<C: ConnectionTrait>(
    db: &C,
    token: &str,
) -> Result<household::Model, AppError> {
    store::find_household_by_token(db, token)
        .await?
        .ok_or(AppError::NotFound)
}

/// Records a household's answer and mirrors the derived attendance onto
/// every guest it owns. Safe to call any number of times; the last call wins.
pub async fn submit_rsvp<C: ConnectionTrait>(
    db: &C,
    token: &str,
    form: &RsvpForm,
) -> Result<household::Model, AppError> {
    let household = resolve_household(db, token).await?;
    let max_guests = store::count_guests(db, household.id).await?;

    let (mairie, reception) = parse_counts(form.nb_mairie.as_deref(), form.nb_soiree.as_deref());
    let mairie = clamp_count(mairie, max_guests);
    let reception = clamp_count(reception, max_guests);
    let is_attending = mairie + reception > 0;
    let comments = form.comments.as_deref().unwrap_or("").trim().to_string();

    let household = store::save_rsvp(db, household, mairie, reception, is_attending, comments)
        .await?;

    // Not atomic with the household write; a failure here leaves guests stale
    // until the next submission.
    let guests = store::bulk_set_guest_attendance(db, household.id, Some(is_attending)).await?;

    info!(
        household_id = household.id,
        mairie, reception, is_attending, guests, "RSVP recorded"
    );
    Ok(household)
}

/// Reads both submitted counts. If either one is not a number, both are
/// reset to zero.
pub fn parse_counts(mairie: Option<&str>, reception: Option<&str>) -> (i64, i64) {
    match (parse_count(mairie), parse_count(reception)) {
        (Some(mairie), Some(reception)) => (mairie, reception),
        _ => {
            debug!(?mairie, ?reception, "Unparseable RSVP count, using 0 for both");
            (0, 0)
        }
    }
}

/// Reads one submitted count. Missing and blank input count as zero;
/// numerals beyond the integer range saturate; anything else is `None`.
pub fn parse_count(raw: Option<&str>) -> Option<i64> {
    let raw = raw.unwrap_or("").trim();
    if raw.is_empty() {
        return Some(0);
    }
    match raw.parse::<i64>() {
        Ok(value) => Some(value),
        Err(err) => match err.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

/// Caps a count to `[0, max_guests]`.
pub fn clamp_count(value: i64, max_guests: u64) -> i32 {
    let upper = i64::try_from(max_guests).unwrap_or(i64::MAX).min(i32::MAX as i64);
    value.clamp(0, upper) as i32
}
