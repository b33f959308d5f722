//! Administrator console: guest list, household editing, CSV export and
//! email previews. Everything here sits behind HTTP Basic auth.

use axum::{
    Form, Json, Router,
    extract::{Path, Request, State},
    http::{HeaderMap, Method, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
    typed_header::TypedHeaderRejection,
};
use minijinja::context;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::{
    entities::{guest, household},
    error::AppError,
    import::export_guests,
    notify::{EmailKind, invitation_message, invitation_url, render_email},
    router::AppState,
    store::{self, GuestFields},
};

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/", get(dashboard))
        .route("/admin/households", post(create_household))
        .route(
            "/admin/households/{id}",
            get(household_detail).post(update_household),
        )
        .route("/admin/households/{id}/delete", post(delete_household))
        .route("/admin/households/{id}/guests", post(add_guest))
        .route(
            "/admin/households/{id}/email/{kind}",
            get(email_preview),
        )
        .route(
            "/admin/households/{id}/email/{kind}/test",
            post(email_test),
        )
        .route("/admin/guests/{id}", post(update_guest))
        .route("/admin/guests/{id}/delete", post(delete_guest))
        .route("/admin/export.csv", get(export_csv))
        .route("/admin/api/households", get(api_households))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}

pub async fn require_admin(
    State(state): State<AppState>,
    auth: Result<TypedHeader<Authorization<Basic>>, TypedHeaderRejection>,
    request: Request,
    next: Next,
) -> Response {
    // No password configured means no admin console at all.
    let Some(password) = state.config.admin_password.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let authorized = match &auth {
        Ok(TypedHeader(creds)) => credentials_match(
            (creds.username(), creds.password()),
            (state.config.admin_username.as_str(), password),
        ),
        Err(_) => false,
    };
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, r#"Basic realm="admin""#)],
        )
            .into_response();
    }

    // Browsers replay Basic credentials on cross-site form posts.
    let method = request.method();
    if method != Method::GET
        && method != Method::HEAD
        && !is_same_origin(request.headers(), &state.config.site_url)
    {
        warn!(%method, uri = %request.uri(), "Refusing cross-origin admin request");
        return (StatusCode::FORBIDDEN, "Cross-origin request refused").into_response();
    }

    next.run(request).await
}

fn credentials_match(given: (&str, &str), expected: (&str, &str)) -> bool {
    let username = given.0.as_bytes().ct_eq(expected.0.as_bytes());
    let password = given.1.as_bytes().ct_eq(expected.1.as_bytes());
    bool::from(username & password)
}

/// `scheme://host[:port]/...` to `host[:port]`.
fn authority(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let end = rest.find('/').unwrap_or(rest.len());
    Some(&rest[..end]).filter(|a| !a.is_empty())
}

/// A request is same-origin when `Sec-Fetch-Site` says so, or when its
/// `Origin` matches the `Host` header or the public site URL. Requests with
/// neither header do not come from a browser form and pass.
fn is_same_origin(headers: &HeaderMap, site_url: &str) -> bool {
    if let Some(site) = headers.get("sec-fetch-site") {
        return matches!(site.to_str(), Ok("same-origin" | "none"));
    }
    let Some(origin) = headers.get(header::ORIGIN) else {
        return true;
    };
    let Some(origin) = origin.to_str().ok().and_then(authority) else {
        return false;
    };

    let host = headers.get(header::HOST).and_then(|h| h.to_str().ok());
    [host, authority(site_url)]
        .into_iter()
        .flatten()
        .any(|allowed| allowed.eq_ignore_ascii_case(origin))
}

#[derive(Deserialize)]
pub struct HouseholdForm {
    name: String,
    comments: Option<String>,
}

/// HTML form encoding of a guest: checkboxes are absent when unticked and
/// attendance is `""`, `"yes"` or `"no"`.
#[derive(Deserialize)]
pub struct GuestForm {
    first_name: String,
    last_name: Option<String>,
    is_child: Option<String>,
    is_attending: Option<String>,
    comments: Option<String>,
}

impl GuestForm {
    fn into_fields(self) -> Option<GuestFields> {
        let first_name = self.first_name.trim().to_string();
        if first_name.is_empty() {
            return None;
        }
        Some(GuestFields {
            first_name,
            last_name: non_empty(self.last_name),
            is_child: self.is_child.is_some(),
            is_attending: match self.is_attending.as_deref() {
                Some("yes") => Some(true),
                Some("no") => Some(false),
                _ => None,
            },
            comments: non_empty(self.comments),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn household_url(id: i32) -> String {
    format!("/admin/households/{id}")
}

#[derive(Serialize)]
struct HouseholdRow {
    #[serde(flatten)]
    household: household::Model,
    invitation_url: String,
    guests: Vec<guest::Model>,
}

async fn household_rows(state: &AppState) -> Result<Vec<HouseholdRow>, AppError> {
    let rows = store::list_households_with_guests(&state.db)
        .await?
        .into_iter()
        .map(|(household, guests)| HouseholdRow {
            invitation_url: invitation_url(&state.config.site_url, &household.invitation_token),
            household,
            guests,
        })
        .collect();
    Ok(rows)
}

pub async fn dashboard(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let summary = store::summary(&state.db).await?;
    let households = household_rows(&state).await?;
    let unassigned = store::unassigned_guests(&state.db).await?;

    state.render(
        "admin/dashboard.html",
        context! {
            summary => summary,
            households => households,
            unassigned => unassigned,
            couple_name => state.config.couple_name,
            website_url => state.config.info_url,
        },
    )
}

pub async fn create_household(
    State(state): State<AppState>,
    Form(form): Form<HouseholdForm>,
) -> Result<Response, AppError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Household name is required").into_response());
    }
    let household = store::create_household(&state.db, name).await?;
    info!(household_id = household.id, "Household created");
    Ok(Redirect::to(&household_url(household.id)).into_response())
}

pub async fn household_detail(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let household = store::find_household(&state.db, id)
        .await?
        .ok_or(AppError::NotFound)?;
    let guests = store::guests_of(&state.db, id).await?;
    let message = invitation_message(&state.templates, &state.config, &household)?;

    state.render(
        "admin/household.html",
        context! {
            invitation_url => invitation_url(&state.config.site_url, &household.invitation_token),
            invitation_message => message,
            household => household,
            guests => guests,
            test_recipient => state.config.email.test_recipient,
        },
    )
}

pub async fn update_household(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Form(form): Form<HouseholdForm>,
) -> Result<Response, AppError> {
    let name = form.name.trim();
    if name.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, "Household name is required").into_response());
    }
    store::update_household_details(&state.db, id, name, non_empty(form.comments))
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Redirect::to(&household_url(id)).into_response())
}

pub async fn delete_household(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    if !store::delete_household(&state.db, id).await? {
        return Err(AppError::NotFound);
    }
    info!(household_id = id, "Household deleted");
    Ok(Redirect::to("/admin/"))
}

pub async fn add_guest(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Form(form): Form<GuestForm>,
) -> Result<Response, AppError> {
    store::find_household(&state.db, id)
        .await?
        .ok_or(AppError::NotFound)?;
    let Some(fields) = form.into_fields() else {
        return Ok((StatusCode::BAD_REQUEST, "First name is required").into_response());
    };
    store::insert_guest(&state.db, Some(id), fields).await?;
    Ok(Redirect::to(&household_url(id)).into_response())
}

pub async fn update_guest(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Form(form): Form<GuestForm>,
) -> Result<Response, AppError> {
    let Some(fields) = form.into_fields() else {
        return Ok((StatusCode::BAD_REQUEST, "First name is required").into_response());
    };
    let guest = store::update_guest(&state.db, id, fields)
        .await?
        .ok_or(AppError::NotFound)?;
    let back = guest.household_id.map_or_else(|| "/admin/".to_string(), household_url);
    Ok(Redirect::to(&back).into_response())
}

pub async fn delete_guest(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let guest = store::find_guest(&state.db, id)
        .await?
        .ok_or(AppError::NotFound)?;
    store::delete_guest(&state.db, id).await?;
    let back = guest.household_id.map_or_else(|| "/admin/".to_string(), household_url);
    Ok(Redirect::to(&back))
}

pub async fn export_csv(State(state): State<AppState>) -> Result<Response, AppError> {
    let csv = export_guests(&state.db, b';').await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=all-guests.csv",
            ),
        ],
        csv,
    )
        .into_response())
}

pub async fn email_preview(
    State(state): State<AppState>,
    Path((id, kind)): Path<(i32, EmailKind)>,
) -> Result<impl IntoResponse, AppError> {
    let household = store::find_household(&state.db, id)
        .await?
        .ok_or(AppError::NotFound)?;
    let guests = store::guests_of(&state.db, id).await?;
    let email = render_email(&state.templates, &state.config, kind, &household, &guests)?;
    Ok(Html(email.html))
}

pub async fn email_test(
    State(state): State<AppState>,
    Path((id, kind)): Path<(i32, EmailKind)>,
) -> Result<Response, AppError> {
    let Some(recipient) = state.config.email.test_recipient.clone() else {
        return Ok((
            StatusCode::BAD_REQUEST,
            "DEFAULT_WEDDING_TEST_EMAIL is not configured",
        )
            .into_response());
    };
    let household = store::find_household(&state.db, id)
        .await?
        .ok_or(AppError::NotFound)?;
    let guests = store::guests_of(&state.db, id).await?;
    let email = render_email(&state.templates, &state.config, kind, &household, &guests)?;
    state.notifier.send(&email, &[recipient]).await?;
    Ok("sent!".into_response())
}

pub async fn api_households(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(household_rows(&state).await?))
}
