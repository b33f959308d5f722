use sea_orm_migration::prelude::*;

use crate::iden::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Importer upserts look guests up by name within a household.
        manager
            .create_index(
                Index::create()
                    .name("idx_guest_natural_key")
                    .table(Guest::Table)
                    .col(Guest::HouseholdId)
                    .col(Guest::FirstName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_household_name")
                    .table(Household::Table)
                    .col(Household::Name)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_household_name")
                    .table(Household::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_guest_natural_key")
                    .table(Guest::Table)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
