use async_trait::async_trait;
use sqlx::PgPool;
use storefront_core::{CoreError, CoreResult, IdentityDirectory, Role, UserAccount};

/// Reads the `users` table maintained by the auth service.
pub struct PgIdentityDirectory {
    pool: PgPool,
}

impl PgIdentityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert an account unless one with the same email exists.
    pub async fn register(&self, account: &UserAccount) -> CoreResult<()> {
        let role = match account.role {
            Role::Admin => "ADMIN",
            Role::Customer => "CUSTOMER",
        };
        sqlx::query(
            r#"
            INSERT INTO users (id, email, full_name, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.full_name)
        .bind(role)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::IdentityError(e.to_string()))?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    full_name: String,
    role: String,
}

#[async_trait]
impl IdentityDirectory for PgIdentityDirectory {
    async fn find_by_email(&self, email: &str) -> CoreResult<Option<UserAccount>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, email, full_name, role FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CoreError::IdentityError(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let role = match row.role.as_str() {
            "ADMIN" => Role::Admin,
            "CUSTOMER" => Role::Customer,
            other => return Err(CoreError::IdentityError(format!("unknown role {}", other))),
        };

        Ok(Some(UserAccount {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            role,
        }))
    }
}
