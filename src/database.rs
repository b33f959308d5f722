use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

pub async fn setup_database(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(db_url);
    options.sqlx_logging(false);
    let db = Database::connect(options).await?;
    Migrator::up(&db, None).await?;

    Ok(db)
}
