pub use sea_orm_migration::prelude::*;

mod iden;
mod m20250901_000001_create_table;
mod m20250915_000002_guest_lookup_index;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_create_table::Migration),
            Box::new(m20250915_000002_guest_lookup_index::Migration),
        ]
    }
}
