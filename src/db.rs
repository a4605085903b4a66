use sea_orm::sea_query::{Index, IndexCreateStatement, TableCreateStatement};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Schema,
    Statement,
};
use std::time::Duration;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::entity::{company, company_member, department, department_member, op_log, user};

/// Connect to the database and auto-migrate tables
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let database_url = config.connection_url();

    info!("Connecting to database: {}:{}/{}", config.host, config.port, config.name);

    let mut opt = ConnectOptions::new(&database_url);
    opt.max_connections(config.max_connections)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .set_schema_search_path("public");

    let db = Database::connect(opt).await?;
    info!("Database connection established");

    auto_migrate(&db).await?;

    Ok(db)
}

async fn auto_migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    info!("Running auto-migration for all entities...");

    create_table_if_not_exists(db, backend, schema.create_table_from_entity(user::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(company::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(company_member::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(department::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(department_member::Entity)).await?;
    create_table_if_not_exists(db, backend, schema.create_table_from_entity(op_log::Entity)).await?;

    for stmt in unique_indexes() {
        db.execute(backend.build(&stmt)).await?;
    }

    info!("Auto-migration completed successfully");
    Ok(())
}

/// One membership per user per department / company
fn unique_indexes() -> Vec<IndexCreateStatement> {
    vec![
        Index::create()
            .name("uq_department_member_user")
            .table(department_member::Entity)
            .col(department_member::Column::DepartmentId)
            .col(department_member::Column::UserId)
            .unique()
            .if_not_exists()
            .to_owned(),
        Index::create()
            .name("uq_company_member_user")
            .table(company_member::Entity)
            .col(company_member::Column::CompanyId)
            .col(company_member::Column::UserId)
            .unique()
            .if_not_exists()
            .to_owned(),
    ]
}

async fn create_table_if_not_exists(
    db: &DatabaseConnection,
    backend: DbBackend,
    mut stmt: TableCreateStatement,
) -> Result<(), DbErr> {
    stmt.if_not_exists();

    let sql = backend.build(&stmt);

    db.execute(Statement::from_string(backend, sql.to_string())).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_index_sql() {
        let sql = DbBackend::Postgres.build(&unique_indexes()[0]).to_string();
        assert!(sql.contains("CREATE UNIQUE INDEX IF NOT EXISTS"));
        assert!(sql.contains("\"org_department_members\""));
        assert!(sql.contains("\"department_id\", \"user_id\""));
    }
}
