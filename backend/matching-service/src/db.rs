use db_pool::{create_pool, migrate, DbConfig, DbPoolError, Migration, PgPool};

const SERVICE_NAME: &str = "matching-service";

pub static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "matching_core",
    sql: include_str!("../migrations/0001_matching_core.sql"),
}];

pub async fn init_pool(database_url: &str) -> Result<PgPool, DbPoolError> {
    let cfg = DbConfig::with_url(SERVICE_NAME, database_url);
    cfg.log_config();
    create_pool(cfg).await
}

/// Apply pending schema migrations. Returns how many ran.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, DbPoolError> {
    let applied = migrate(pool, MIGRATIONS).await?;
    if applied > 0 {
        tracing::info!(applied, "database migrations applied");
    }
    Ok(applied)
}
