use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
pub enum Household {
    Table,
    Id,
    Name,
    InvitationToken,
    Comments,
    MairieCount,
    ReceptionCount,
    IsAttending,
}

#[derive(DeriveIden)]
pub enum Guest {
    Table,
    Id,
    HouseholdId,
    FirstName,
    LastName,
    IsChild,
    IsAttending,
    Comments,
}
