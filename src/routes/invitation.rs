use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Redirect},
    routing::get,
};
use minijinja::context;

use crate::{
    error::AppError,
    router::AppState,
    rsvp::{self, RsvpForm},
    store,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/invitation/{token}/", get(invitation).post(submit))
        .route("/rsvp/confirm/{token}/", get(confirm))
}

pub async fn invitation(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let household = rsvp::resolve_household(&state.db, &token).await?;
    let guests = store::guests_of(&state.db, household.id).await?;
    let max_guests = guests.len();

    state.render(
        "invitation.html",
        context! {
            household => household,
            guests => guests,
            max_guests => max_guests,
            couple_name => state.config.couple_name,
            website_url => state.config.info_url,
        },
    )
}

/// Reads the raw body: any content type and repeated fields are accepted.
pub async fn submit(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    rsvp::resolve_household(&state.db, &token).await?;
    let form = RsvpForm::from_urlencoded(&body);
    rsvp::submit_rsvp(&state.db, &token, &form).await?;
    Ok(Redirect::to(&format!("/rsvp/confirm/{token}/")))
}

pub async fn confirm(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let household = rsvp::resolve_household(&state.db, &token).await?;

    state.render(
        "rsvp_confirmation.html",
        context! {
            household => household,
            support_email => state.config.email.reply_to,
            couple_name => state.config.couple_name,
            website_url => state.config.info_url,
        },
    )
}
