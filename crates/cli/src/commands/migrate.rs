use migrator::{MigrationRecord, Migrator};

/// `connect` has already created the tracking table; report what it holds
pub async fn init(migrator: &dyn Migrator) -> anyhow::Result<()> {
    let records = migrator.migrations(&[]).await?;
    println!(
        "Migration tracking table is ready ({} migration(s) recorded)",
        records.len()
    );
    Ok(())
}

pub async fn run(migrator: &dyn Migrator) -> anyhow::Result<()> {
    let result = migrator.migrate().await?;

    if result.applied_migrations.is_empty() {
        println!("Nothing to migrate ({} already applied)", result.skipped_count);
        return Ok(());
    }

    for id in &result.applied_migrations {
        println!("Applied migration: {}", id);
    }
    println!(
        "Applied {} migration(s) in {} ms",
        result.applied_count(),
        result.execution_time_ms
    );
    Ok(())
}

pub async fn rollback(migrator: &dyn Migrator, steps: u32) -> anyhow::Result<()> {
    let result = migrator.rollback(steps).await?;

    if result.rolled_back_migrations.is_empty() {
        println!("Nothing to roll back");
        return Ok(());
    }

    for id in &result.rolled_back_migrations {
        println!("Rolled back migration: {}", id);
    }
    Ok(())
}

pub async fn redo(migrator: &dyn Migrator, steps: u32) -> anyhow::Result<()> {
    let result = migrator.redo(steps).await?;

    for id in &result.rolled_back.rolled_back_migrations {
        println!("Rolled back migration: {}", id);
    }
    for id in &result.reapplied.applied_migrations {
        println!("Applied migration: {}", id);
    }
    Ok(())
}

pub async fn up(migrator: &dyn Migrator, id: &str) -> anyhow::Result<()> {
    migrator.up(id).await?;
    println!("Migration {} is up", id);
    Ok(())
}

pub async fn down(migrator: &dyn Migrator, id: &str) -> anyhow::Result<()> {
    migrator.down(id).await?;
    println!("Migration {} is down", id);
    Ok(())
}

pub async fn status(migrator: &dyn Migrator, ids: &[String], json: bool) -> anyhow::Result<()> {
    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    let records = migrator.migrations(&ids).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print!("{}", format_status(&records));
    }
    Ok(())
}

/// Plain-text status listing, one line per record
pub fn format_status(records: &[MigrationRecord]) -> String {
    let mut out = String::from("Migration Status:\n================\n");

    if records.is_empty() {
        out.push_str("No migrations found\n");
        return out;
    }

    for record in records {
        out.push_str(&format!(
            "  {:<5} {}  {}  (updated {})\n",
            record.status,
            record.id,
            record.name,
            record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    out
}
