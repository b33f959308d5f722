//! Every query against the household and guest tables goes through here.

use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    TransactionTrait,
    sea_query::{Expr, Func},
};
use serde::Serialize;

use crate::{
    entities::{guest, household},
    error::AppError,
    token::new_token,
};

/// Outcome of [`upsert_guest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Created(guest::Model),
    Updated(guest::Model),
}

impl Upsert {
    pub fn guest(&self) -> &guest::Model {
        match self {
            Upsert::Created(g) | Upsert::Updated(g) => g,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GuestFields {
    pub first_name: String,
    pub last_name: Option<String>,
    pub is_child: bool,
    pub is_attending: Option<bool>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub households: u64,
    pub pending_households: u64,
    pub guests: u64,
    pub attending_guests: u64,
    pub not_coming_guests: u64,
    pub pending_guests: u64,
    pub total_mairie: i64,
    pub total_soiree: i64,
}

pub async fn find_household<C: ConnectionTrait>(
    db: &C,
    id: i32,
) -> Result<Option<household::Model>, DbErr> {
    household::Entity::find_by_id(id).one(db).await
}

pub async fn find_household_by_token<C: ConnectionTrait>(
    db: &C,
    token: &str,
) -> Result<Option<household::Model>, DbErr> {
    household::Entity::find()
        .filter(household::Column::InvitationToken.eq(token))
        .one(db)
        .await
}

/// Case-insensitive name lookup. The oldest household wins when several match.
pub async fn find_household_by_name_ci<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<Option<household::Model>, DbErr> {
    household::Entity::find()
        .filter(
            Expr::expr(Func::lower(Expr::col((
                household::Entity,
                household::Column::Name,
            ))))
            .eq(Func::lower(Expr::val(name))),
        )
        .order_by_asc(household::Column::Id)
        .one(db)
        .await
}

pub async fn create_household<C: ConnectionTrait>(
    db: &C,
    name: &str,
) -> Result<household::Model, AppError> {
    insert_household(db, name, new_token()).await
}

pub(crate) async fn insert_household<C: ConnectionTrait>(
    db: &C,
    name: &str,
    invitation_token: String,
) -> Result<household::Model, AppError> {
    let model = household::ActiveModel {
        id: NotSet,
        name: Set(name.to_string()),
        invitation_token: Set(invitation_token),
        comments: Set(None),
        mairie_count: Set(0),
        reception_count: Set(0),
        is_attending: Set(None),
    };
    model.insert(db).await.map_err(|err| match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::DuplicateIdentifier,
        _ => AppError::Seaorm(err),
    })
}

/// Updates the administrator-editable household fields. Counts, attendance
/// and the token are left alone.
pub async fn update_household_details<C: ConnectionTrait>(
    db: &C,
    id: i32,
    name: &str,
    comments: Option<String>,
) -> Result<Option<household::Model>, DbErr> {
    let Some(existing) = find_household(db, id).await? else {
        return Ok(None);
    };
    let mut model = existing.into_active_model();
    model.name = Set(name.to_string());
    model.comments = Set(comments);
    model.update(db).await.map(Some)
}

/// Deletes a household together with its guests.
pub async fn delete_household<C>(db: &C, id: i32) -> Result<bool, DbErr>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;
    guest::Entity::delete_many()
        .filter(guest::Column::HouseholdId.eq(id))
        .exec(&txn)
        .await?;
    let res = household::Entity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;
    Ok(res.rows_affected > 0)
}

pub async fn list_households_with_guests<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<(household::Model, Vec<guest::Model>)>, DbErr> {
    household::Entity::find()
        .order_by_asc(household::Column::Name)
        .order_by_asc(household::Column::Id)
        .find_with_related(guest::Entity)
        .order_by_asc(guest::Column::Id)
        .all(db)
        .await
}

pub async fn unassigned_guests<C: ConnectionTrait>(db: &C) -> Result<Vec<guest::Model>, DbErr> {
    guest::Entity::find()
        .filter(guest::Column::HouseholdId.is_null())
        .order_by_asc(guest::Column::Id)
        .all(db)
        .await
}

/// Every guest paired with its household, ordered by household name then guest id.
/// Guests without a household come first.
pub async fn all_guests_with_household<C: ConnectionTrait>(
    db: &C,
) -> Result<Vec<(guest::Model, Option<household::Model>)>, DbErr> {
    let mut rows = guest::Entity::find()
        .find_also_related(household::Entity)
        .all(db)
        .await?;
    rows.sort_by(|(a, ha), (b, hb)| {
        let name_a = ha.as_ref().map(|h| h.name.as_str());
        let name_b = hb.as_ref().map(|h| h.name.as_str());
        name_a.cmp(&name_b).then(a.id.cmp(&b.id))
    });
    Ok(rows)
}

pub async fn guests_of<C: ConnectionTrait>(
    db: &C,
    household_id: i32,
) -> Result<Vec<guest::Model>, DbErr> {
    guest::Entity::find()
        .filter(guest::Column::HouseholdId.eq(household_id))
        .order_by_asc(guest::Column::Id)
        .all(db)
        .await
}

pub async fn count_guests<C: ConnectionTrait>(db: &C, household_id: i32) -> Result<u64, DbErr> {
    guest::Entity::find()
        .filter(guest::Column::HouseholdId.eq(household_id))
        .count(db)
        .await
}

/// Inserts or updates a guest keyed on `(first_name, last_name, household)`.
/// Only `is_child` is touched on an existing guest.
pub async fn upsert_guest<C: ConnectionTrait>(
    db: &C,
    first_name: &str,
    last_name: Option<&str>,
    household_id: Option<i32>,
    is_child: bool,
) -> Result<Upsert, DbErr> {
    let mut query = guest::Entity::find().filter(guest::Column::FirstName.eq(first_name));
    query = match last_name {
        Some(last) => query.filter(guest::Column::LastName.eq(last)),
        None => query.filter(guest::Column::LastName.is_null()),
    };
    query = match household_id {
        Some(id) => query.filter(guest::Column::HouseholdId.eq(id)),
        None => query.filter(guest::Column::HouseholdId.is_null()),
    };

    match query.order_by_asc(guest::Column::Id).one(db).await? {
        Some(existing) => {
            let mut model = existing.into_active_model();
            model.is_child = Set(is_child);
            Ok(Upsert::Updated(model.update(db).await?))
        }
        None => {
            let fields = GuestFields {
                first_name: first_name.to_string(),
                last_name: last_name.map(String::from),
                is_child,
                ..Default::default()
            };
            Ok(Upsert::Created(insert_guest(db, household_id, fields).await?))
        }
    }
}

pub async fn find_guest<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<guest::Model>, DbErr> {
    guest::Entity::find_by_id(id).one(db).await
}

pub async fn insert_guest<C: ConnectionTrait>(
    db: &C,
    household_id: Option<i32>,
    fields: GuestFields,
) -> Result<guest::Model, DbErr> {
    guest::ActiveModel {
        id: NotSet,
        household_id: Set(household_id),
        first_name: Set(fields.first_name),
        last_name: Set(fields.last_name),
        is_child: Set(fields.is_child),
        is_attending: Set(fields.is_attending),
        comments: Set(fields.comments),
    }
    .insert(db)
    .await
}

pub async fn update_guest<C: ConnectionTrait>(
    db: &C,
    id: i32,
    fields: GuestFields,
) -> Result<Option<guest::Model>, DbErr> {
    let Some(existing) = guest::Entity::find_by_id(id).one(db).await? else {
        return Ok(None);
    };
    let mut model = existing.into_active_model();
    model.first_name = Set(fields.first_name);
    model.last_name = Set(fields.last_name);
    model.is_child = Set(fields.is_child);
    model.is_attending = Set(fields.is_attending);
    model.comments = Set(fields.comments);
    model.update(db).await.map(Some)
}

pub async fn delete_guest<C: ConnectionTrait>(db: &C, id: i32) -> Result<bool, DbErr> {
    let res = guest::Entity::delete_by_id(id).exec(db).await?;
    Ok(res.rows_affected > 0)
}

/// Overwrites the attendance of every guest currently in the household.
pub async fn bulk_set_guest_attendance<C: ConnectionTrait>(
    db: &C,
    household_id: i32,
    is_attending: Option<bool>,
) -> Result<u64, DbErr> {
    let res = guest::Entity::update_many()
        .col_expr(guest::Column::IsAttending, Expr::value(is_attending))
        .filter(guest::Column::HouseholdId.eq(household_id))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

/// Writes the four RSVP fields of a household in a single UPDATE.
pub async fn save_rsvp<C: ConnectionTrait>(
    db: &C,
    household: household::Model,
    mairie_count: i32,
    reception_count: i32,
    is_attending: bool,
    comments: String,
) -> Result<household::Model, DbErr> {
    let mut model = household.into_active_model();
    model.mairie_count = Set(mairie_count);
    model.reception_count = Set(reception_count);
    model.is_attending = Set(Some(is_attending));
    model.comments = Set(Some(comments));
    model.update(db).await
}

pub async fn summary<C: ConnectionTrait>(db: &C) -> Result<Summary, DbErr> {
    let totals: Option<(Option<i64>, Option<i64>)> = household::Entity::find()
        .select_only()
        .column_as(
            Expr::col((household::Entity, household::Column::MairieCount)).sum(),
            "total_mairie",
        )
        .column_as(
            Expr::col((household::Entity, household::Column::ReceptionCount)).sum(),
            "total_soiree",
        )
        .into_tuple()
        .one(db)
        .await?;
    let (total_mairie, total_soiree) = totals.unwrap_or_default();

    Ok(Summary {
        households: household::Entity::find().count(db).await?,
        pending_households: household::Entity::find()
            .filter(household::Column::IsAttending.is_null())
            .count(db)
            .await?,
        guests: guest::Entity::find().count(db).await?,
        attending_guests: guest::Entity::find()
            .filter(guest::Column::IsAttending.eq(true))
            .count(db)
            .await?,
        not_coming_guests: guest::Entity::find()
            .filter(guest::Column::IsAttending.eq(false))
            .count(db)
            .await?,
        pending_guests: guest::Entity::find()
            .filter(guest::Column::IsAttending.is_null())
            .count(db)
            .await?,
        total_mairie: total_mairie.unwrap_or(0),
        total_soiree: total_soiree.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::test_db;

    fn named(first: &str) -> GuestFields {
        GuestFields {
            first_name: first.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn created_household_gets_a_token_and_no_answer() {
        let db = test_db().await;
        let household = create_household(&db, "Famille Martin").await.unwrap();

        assert_eq!(household.invitation_token.len(), 32);
        assert_eq!(household.mairie_count, 0);
        assert_eq!(household.reception_count, 0);
        assert_eq!(household.is_attending, None);

        let found = find_household_by_token(&db, &household.invitation_token)
            .await
            .unwrap();
        assert_eq!(found, Some(household));
    }

    #[tokio::test]
    async fn token_collision_is_a_hard_failure() {
        let db = test_db().await;
        insert_household(&db, "A", "0".repeat(32)).await.unwrap();

        let err = insert_household(&db, "B", "0".repeat(32)).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateIdentifier), "{err:?}");

        let kept = find_household_by_token(&db, &"0".repeat(32)).await.unwrap().unwrap();
        assert_eq!(kept.name, "A");
    }

    #[tokio::test]
    async fn name_lookup_ignores_case_and_prefers_oldest() {
        let db = test_db().await;
        let first = create_household(&db, "Smith Family").await.unwrap();
        create_household(&db, "SMITH FAMILY").await.unwrap();

        let found = find_household_by_name_ci(&db, "smith family").await.unwrap();
        assert_eq!(found.map(|h| h.id), Some(first.id));
        assert!(find_household_by_name_ci(&db, "Jones").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_matches_on_full_natural_key() {
        let db = test_db().await;
        let household = create_household(&db, "Doe").await.unwrap();

        let first = upsert_guest(&db, "John", Some("Doe"), Some(household.id), false)
            .await
            .unwrap();
        assert!(matches!(first, Upsert::Created(_)));

        let again = upsert_guest(&db, "John", Some("Doe"), Some(household.id), true)
            .await
            .unwrap();
        assert!(matches!(again, Upsert::Updated(ref g) if g.is_child));
        assert_eq!(again.guest().id, first.guest().id);

        // Same names without a household or last name are distinct guests.
        let orphan = upsert_guest(&db, "John", Some("Doe"), None, false).await.unwrap();
        assert!(matches!(orphan, Upsert::Created(_)));
        let no_last = upsert_guest(&db, "John", None, Some(household.id), false)
            .await
            .unwrap();
        assert!(matches!(no_last, Upsert::Created(_)));
        let no_last_again = upsert_guest(&db, "John", None, Some(household.id), false)
            .await
            .unwrap();
        assert!(matches!(no_last_again, Upsert::Updated(_)));

        assert_eq!(count_guests(&db, household.id).await.unwrap(), 2);
        assert_eq!(unassigned_guests(&db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bulk_attendance_only_touches_the_household() {
        let db = test_db().await;
        let a = create_household(&db, "A").await.unwrap();
        let b = create_household(&db, "B").await.unwrap();
        insert_guest(&db, Some(a.id), named("Ann")).await.unwrap();
        insert_guest(&db, Some(a.id), named("Al")).await.unwrap();
        insert_guest(&db, Some(b.id), named("Bob")).await.unwrap();

        let updated = bulk_set_guest_attendance(&db, a.id, Some(true)).await.unwrap();
        assert_eq!(updated, 2);

        assert!(guests_of(&db, a.id).await.unwrap().iter().all(|g| g.is_attending == Some(true)));
        assert_eq!(guests_of(&db, b.id).await.unwrap()[0].is_attending, None);
    }

    #[tokio::test]
    async fn deleting_a_household_removes_its_guests() {
        let db = test_db().await;
        let a = create_household(&db, "A").await.unwrap();
        let b = create_household(&db, "B").await.unwrap();
        insert_guest(&db, Some(a.id), named("Ann")).await.unwrap();
        insert_guest(&db, Some(b.id), named("Bob")).await.unwrap();

        assert!(delete_household(&db, a.id).await.unwrap());
        assert!(!delete_household(&db, a.id).await.unwrap());

        assert!(find_household(&db, a.id).await.unwrap().is_none());
        assert_eq!(guest::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn admin_edits_leave_rsvp_fields_alone() {
        let db = test_db().await;
        let household = create_household(&db, "A").await.unwrap();
        let household = save_rsvp(&db, household, 2, 1, true, "hello".into())
            .await
            .unwrap();

        let edited = update_household_details(&db, household.id, "Famille A", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edited.name, "Famille A");
        assert_eq!(edited.mairie_count, 2);
        assert_eq!(edited.reception_count, 1);
        assert_eq!(edited.is_attending, Some(true));
        assert_eq!(edited.invitation_token, household.invitation_token);

        assert!(update_household_details(&db, 999, "x", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn summary_counts_answers() {
        let db = test_db().await;
        assert_eq!(summary(&db).await.unwrap(), Summary::default());

        let a = create_household(&db, "A").await.unwrap();
        let b = create_household(&db, "B").await.unwrap();
        create_household(&db, "C").await.unwrap();
        insert_guest(&db, Some(a.id), named("Ann")).await.unwrap();
        insert_guest(&db, Some(a.id), named("Al")).await.unwrap();
        insert_guest(&db, Some(b.id), named("Bob")).await.unwrap();
        save_rsvp(&db, a.clone(), 2, 1, true, String::new()).await.unwrap();
        bulk_set_guest_attendance(&db, a.id, Some(true)).await.unwrap();
        save_rsvp(&db, b.clone(), 0, 0, false, String::new()).await.unwrap();
        bulk_set_guest_attendance(&db, b.id, Some(false)).await.unwrap();

        let stats = summary(&db).await.unwrap();
        assert_eq!(stats.households, 3);
        assert_eq!(stats.pending_households, 1);
        assert_eq!(stats.guests, 3);
        assert_eq!(stats.attending_guests, 2);
        assert_eq!(stats.not_coming_guests, 1);
        assert_eq!(stats.pending_guests, 0);
        assert_eq!(stats.total_mairie, 2);
        assert_eq!(stats.total_soiree, 1);
    }

    #[tokio::test]
    async fn guests_listed_with_their_household() {
        let db = test_db().await;
        let zed = create_household(&db, "Zed").await.unwrap();
        let abe = create_household(&db, "Abe").await.unwrap();
        insert_guest(&db, Some(zed.id), named("Zoe")).await.unwrap();
        insert_guest(&db, Some(abe.id), named("Amy")).await.unwrap();
        insert_guest(&db, None, named("Solo")).await.unwrap();

        let names: Vec<String> = all_guests_with_household(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|(g, _)| g.first_name)
            .collect();
        assert_eq!(names, vec!["Solo", "Amy", "Zoe"]);

        let grouped = list_households_with_guests(&db).await.unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0.name, "Abe");
        assert_eq!(grouped[0].1.len(), 1);
    }
}
