use sqlx::SqlitePool;

use crate::models::Maintenance;

pub struct MaintenanceRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct MaintenanceRow {
    id: i64,
    remote_ref: Option<String>,
    bike_id: i64,
    name: String,
    value: f64,
    date: i64,
    is_done: bool,
}

impl From<MaintenanceRow> for Maintenance {
    fn from(row: MaintenanceRow) -> Self {
        Maintenance {
            id: row.id,
            remote_ref: row.remote_ref,
            name: row.name,
            value: row.value,
            date: row.date,
            is_done: row.is_done,
            bike_id: row.bike_id,
        }
    }
}

impl MaintenanceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, maintenance: &Maintenance) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO maintenances (remote_ref, bike_id, name, value, date, is_done)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&maintenance.remote_ref)
        .bind(maintenance.bike_id)
        .bind(&maintenance.name)
        .bind(maintenance.value)
        .bind(maintenance.date)
        .bind(maintenance.is_done)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Maintenance>, sqlx::Error> {
        let row: Option<MaintenanceRow> = sqlx::query_as("SELECT * FROM maintenances WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Maintenance::from))
    }

    /// Pending items first, then completed ones, most recent first.
    pub async fn list_for_bike(&self, bike_id: i64) -> Result<Vec<Maintenance>, sqlx::Error> {
        let rows: Vec<MaintenanceRow> = sqlx::query_as(
            "SELECT * FROM maintenances WHERE bike_id = ? ORDER BY is_done, date DESC, name, id",
        )
        .bind(bike_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Maintenance::from).collect())
    }

    pub async fn update(&self, maintenance: &Maintenance) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE maintenances
            SET remote_ref = ?, bike_id = ?, name = ?, value = ?, date = ?, is_done = ?
            WHERE id = ?
            "#,
        )
        .bind(&maintenance.remote_ref)
        .bind(maintenance.bike_id)
        .bind(&maintenance.name)
        .bind(maintenance.value)
        .bind(maintenance.date)
        .bind(maintenance.is_done)
        .bind(maintenance.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM maintenances WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
