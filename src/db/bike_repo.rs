use sqlx::SqlitePool;

use crate::models::{Bike, CountingMethod};

pub struct BikeRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct BikeRow {
    id: i64,
    remote_ref: Option<String>,
    name: String,
    counting_method: String,
}

impl From<BikeRow> for Bike {
    fn from(row: BikeRow) -> Self {
        Bike {
            id: row.id,
            remote_ref: row.remote_ref,
            name: row.name,
            counting_method: row
                .counting_method
                .parse::<CountingMethod>()
                .unwrap_or_default(),
        }
    }
}

impl BikeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts the bike and returns its new local id. The `id` field of the
    /// argument is ignored.
    pub async fn create(&self, bike: &Bike) -> Result<i64, sqlx::Error> {
        let result =
            sqlx::query("INSERT INTO bikes (remote_ref, name, counting_method) VALUES (?, ?, ?)")
                .bind(&bike.remote_ref)
                .bind(&bike.name)
                .bind(bike.counting_method.as_str())
                .execute(&self.pool)
                .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Bike>, sqlx::Error> {
        let row: Option<BikeRow> = sqlx::query_as("SELECT * FROM bikes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Bike::from))
    }

    pub async fn get_by_remote_ref(&self, remote_ref: &str) -> Result<Option<Bike>, sqlx::Error> {
        let row: Option<BikeRow> = sqlx::query_as("SELECT * FROM bikes WHERE remote_ref = ?")
            .bind(remote_ref)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Bike::from))
    }

    pub async fn list(&self) -> Result<Vec<Bike>, sqlx::Error> {
        let rows: Vec<BikeRow> = sqlx::query_as("SELECT * FROM bikes ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Bike::from).collect())
    }

    pub async fn update(&self, bike: &Bike) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE bikes
            SET remote_ref = ?, name = ?, counting_method = ?
            WHERE id = ?
            "#,
        )
        .bind(&bike.remote_ref)
        .bind(&bike.name)
        .bind(bike.counting_method.as_str())
        .bind(bike.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(())
    }

    /// Deletes the bike together with all of its maintenances.
    pub async fn delete(&self, id: i64) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM maintenances WHERE bike_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM bikes WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
