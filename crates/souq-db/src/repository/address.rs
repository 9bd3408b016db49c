//! # Address Repository
//!
//! Saved customer addresses. Lookups are always scoped to the owner.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use souq_core::{new_id, UserAddress, ValidationError};

/// Fields of a new address.
#[derive(Debug, Clone, Default)]
pub struct NewAddress {
    pub label: Option<String>,
    pub city: String,
    pub street: String,
    pub landmark: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Repository for address database operations.
#[derive(Debug, Clone)]
pub struct AddressRepository {
    pool: SqlitePool,
}

impl AddressRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AddressRepository { pool }
    }

    pub async fn create(&self, user_id: &str, new: NewAddress) -> DbResult<UserAddress> {
        for (field, value) in [("city", &new.city), ("street", &new.street)] {
            if value.trim().is_empty() {
                return Err(ValidationError::Required {
                    field: field.to_string(),
                }
                .into());
            }
        }

        let address = UserAddress {
            id: new_id(),
            user_id: user_id.to_string(),
            label: new.label,
            city: new.city,
            street: new.street,
            landmark: new.landmark,
            latitude: new.latitude,
            longitude: new.longitude,
            created_at: Utc::now(),
        };
        debug!(id = %address.id, user_id, "Creating address");

        sqlx::query(
            r#"
            INSERT INTO user_addresses (
                id, user_id, label, city, street, landmark, latitude, longitude, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&address.id)
        .bind(&address.user_id)
        .bind(&address.label)
        .bind(&address.city)
        .bind(&address.street)
        .bind(&address.landmark)
        .bind(address.latitude)
        .bind(address.longitude)
        .bind(address.created_at)
        .execute(&self.pool)
        .await?;

        Ok(address)
    }

    /// Edits the street in place. Orders already placed keep their snapshot.
    pub async fn update_street(&self, user_id: &str, id: &str, street: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE user_addresses SET street = ?1 WHERE id = ?2 AND user_id = ?3")
            .bind(street)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_user(&self, user_id: &str) -> DbResult<Vec<UserAddress>> {
        let addresses = sqlx::query_as::<_, UserAddress>(
            r#"
            SELECT id, user_id, label, city, street, landmark, latitude, longitude, created_at
            FROM user_addresses
            WHERE user_id = ?1
            ORDER BY id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(addresses)
    }

    pub async fn find_for_user(&self, user_id: &str, id: &str) -> DbResult<Option<UserAddress>> {
        let mut conn = self.pool.acquire().await?;
        find_for_user(&mut conn, user_id, id).await
    }
}

/// `None` when the address doesn't exist or belongs to someone else.
pub(crate) async fn find_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
    id: &str,
) -> DbResult<Option<UserAddress>> {
    let address = sqlx::query_as::<_, UserAddress>(
        r#"
        SELECT id, user_id, label, city, street, landmark, latitude, longitude, created_at
        FROM user_addresses
        WHERE id = ?1 AND user_id = ?2
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};

    fn home() -> NewAddress {
        NewAddress {
            label: Some("Home".to_string()),
            city: "Riyadh".to_string(),
            street: "Tahlia St".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_lookup_is_scoped_to_owner() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let addresses = db.addresses();

        let address = addresses.create("u1", home()).await.unwrap();

        assert!(addresses.find_for_user("u1", &address.id).await.unwrap().is_some());
        assert!(addresses.find_for_user("u2", &address.id).await.unwrap().is_none());
        assert!(!addresses.update_street("u2", &address.id, "Elsewhere").await.unwrap());
        assert_eq!(addresses.list_for_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_city_required() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .addresses()
            .create(
                "u1",
                NewAddress {
                    city: "  ".to_string(),
                    ..home()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }
}
