use sea_orm_migration::{prelude::*, schema::*};

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create Household Table
        let table = table_auto(Household::Table)
            .col(pk_auto(Household::Id))
            .col(text(Household::Name))
            .col(string_len_uniq(Household::InvitationToken, 32))
            .col(text_null(Household::Comments))
            .col(integer(Household::MairieCount).default(0))
            .col(integer(Household::ReceptionCount).default(0))
            .col(boolean_null(Household::IsAttending))
            .check(Expr::col(Household::MairieCount).gte(0))
            .check(Expr::col(Household::ReceptionCount).gte(0))
            .to_owned();
        manager.create_table(table).await?;

        // Create Guest Table
        let table = table_auto(Guest::Table)
            .col(pk_auto(Guest::Id))
            .col(integer_null(Guest::HouseholdId))
            .col(text(Guest::FirstName))
            .col(text_null(Guest::LastName))
            .col(boolean(Guest::IsChild).default(false))
            .col(boolean_null(Guest::IsAttending))
            .col(text_null(Guest::Comments))
            .foreign_key(
                ForeignKey::create()
                    .name("fk_guest_household")
                    .from(Guest::Table, Guest::HouseholdId)
                    .to(Household::Table, Household::Id)
                    .on_delete(ForeignKeyAction::Cascade),
            )
            .to_owned();
        manager.create_table(table).await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_guest_household")
                    .table(Guest::Table)
                    .col(Guest::HouseholdId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Guest::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Household::Table).to_owned())
            .await?;

        Ok(())
    }
}
