//! DB-backed test, skipped if DATABASE_URL is not set: migrating twice on a
//! clean database must be idempotent.

#[tokio::test]
async fn migrate_idempotent_on_clean_db() -> anyhow::Result<()> {
    let url = match std::env::var(ctk_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: {} not set", ctk_db::ENV_DB_URL);
            return Ok(());
        }
    };

    let pool = ctk_db::connect(&url, 2).await?;
    ctk_db::migrate(&pool).await?;
    ctk_db::migrate(&pool).await?;

    let st = ctk_db::status(&pool).await?;
    assert!(st.ok);
    assert!(st.has_runs_table);

    Ok(())
}
