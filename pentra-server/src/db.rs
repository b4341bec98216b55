use anyhow::{Context, Result, anyhow};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use url::Url;

/// Reject obviously unusable database URLs before sqlx produces a less
/// helpful connection error.
pub fn validate_database_url(base: &str) -> Result<()> {
    let url = Url::parse(base).context("invalid PostgreSQL URL")?;
    let name = url.path().trim_start_matches('/');
    if name.is_empty() {
        return Err(anyhow!("database URL must include a database name"));
    }
    Ok(())
}

pub async fn connect(database_url: &str) -> Result<PgPool> {
    validate_database_url(database_url)?;
    PgPoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await
        .context("failed to connect to PostgreSQL")
}

pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .context("database migration failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_database_name_is_rejected() {
        assert!(validate_database_url("postgres://user:pw@localhost:5432").is_err());
        assert!(validate_database_url("postgres://user:pw@localhost:5432/pentra").is_ok());
        assert!(validate_database_url("not a url").is_err());
    }
}
