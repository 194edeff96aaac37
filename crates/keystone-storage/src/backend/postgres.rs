//! PostgreSQL storage backend.
//!
//! Expects the schema created by `keystone-migrations`.

use super::{AdminGuarded, AuditStore, PermissionStore, UserStore, SYSTEM_ACTOR};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keystone_core::{
    AuditDimension, AuditEntryId, AuditFilter, AuditLogEntry, Page, PageRequest, Permission,
    PermissionId, Role, TimeRange, User, UserId,
};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

/// PostgreSQL-backed implementation of every store trait.
#[derive(Clone)]
pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Creates a backend over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password: Option<String>,
    name: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StorageError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role: Role = row
            .role
            .parse()
            .map_err(|e: keystone_core::CoreError| StorageError::Serialization(e.to_string()))?;

        Ok(User {
            id: UserId::from_uuid(row.id),
            email: row.email,
            password_hash: row.password,
            name: row.name,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct PermissionRow {
    id: Uuid,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Self {
            id: PermissionId::from_uuid(row.id),
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: Option<Uuid>,
    action: String,
    resource: String,
    resource_id: Option<String>,
    old_values: Option<serde_json::Value>,
    new_values: Option<serde_json::Value>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    success: bool,
    error: Option<String>,
    timestamp: DateTime<Utc>,
}

impl From<AuditRow> for AuditLogEntry {
    fn from(row: AuditRow) -> Self {
        Self {
            id: AuditEntryId::from_uuid(row.id),
            user_id: row.user_id.map(UserId::from_uuid),
            action: row.action,
            resource: row.resource,
            resource_id: row.resource_id,
            old_values: row.old_values,
            new_values: row.new_values,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            success: row.success,
            error: row.error,
            timestamp: row.timestamp,
        }
    }
}

const USER_COLUMNS: &str = "id, email, password, name, role, created_at, updated_at";
const PERMISSION_COLUMNS: &str = "id, name, description, created_at, updated_at";
const AUDIT_COLUMNS: &str = "id, user_id, action, resource, resource_id, old_values, new_values, \
                             ip_address, user_agent, success, error, timestamp";

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Appends `WHERE ...` clauses for an audit filter.
fn push_audit_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &AuditFilter) {
    builder.push(" WHERE TRUE");

    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id.into_uuid());
    }
    if let Some(ref action) = filter.action {
        builder
            .push(" AND action LIKE ")
            .push_bind(format!("%{}%", escape_like(action)));
    }
    if let Some(ref resource) = filter.resource {
        builder
            .push(" AND resource LIKE ")
            .push_bind(format!("%{}%", escape_like(resource)));
    }
    if let Some(ref resource_id) = filter.resource_id {
        builder.push(" AND resource_id = ").push_bind(resource_id.clone());
    }
    if let Some(success) = filter.success {
        builder.push(" AND success = ").push_bind(success);
    }
    push_range(builder, filter.range);
}

fn push_range(builder: &mut QueryBuilder<'_, Postgres>, range: TimeRange) {
    if let Some(from) = range.from {
        builder.push(" AND timestamp >= ").push_bind(from);
    }
    if let Some(to) = range.to {
        builder.push(" AND timestamp < ").push_bind(to);
    }
}

/// Row-locks every admin and returns how many there are.
///
/// Concurrent demotions and deletes serialize on these locks, so the count
/// stays valid until the transaction ends.
async fn lock_admins(tx: &mut Transaction<'_, Postgres>) -> StorageResult<u64> {
    let ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM users WHERE role = $1 ORDER BY id FOR UPDATE")
            .bind(Role::Admin.as_str())
            .fetch_all(&mut **tx)
            .await?;
    Ok(ids.len() as u64)
}

async fn lock_user(
    tx: &mut Transaction<'_, Postgres>,
    id: UserId,
) -> StorageResult<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.into_uuid())
    .fetch_optional(&mut **tx)
    .await?;
    row.map(User::try_from).transpose()
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl UserStore for PostgresBackend {
    async fn create_user(&self, user: &User) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO users (id, email, password, name, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(user.id.into_uuid())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> StorageResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn list_users(&self, page: PageRequest) -> StorageResult<Page<User>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at, email LIMIT $1 OFFSET $2"
        ))
        .bind(to_i64(page.limit))
        .bind(to_i64(page.offset))
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(User::try_from)
                .collect::<StorageResult<Vec<_>>>()?,
            total: to_u64(total),
            offset: page.offset,
            limit: page.limit,
        })
    }

    async fn update_user_role(
        &self,
        id: UserId,
        role: Role,
    ) -> StorageResult<AdminGuarded<(User, User)>> {
        let mut tx = self.pool.begin().await?;
        let admins = lock_admins(&mut tx).await?;

        let Some(before) = lock_user(&mut tx, id).await? else {
            return Ok(AdminGuarded::NotFound);
        };
        if before.role == role {
            return Ok(AdminGuarded::Applied((before.clone(), before)));
        }
        if before.is_admin() && !role.is_admin() && admins <= 1 {
            return Ok(AdminGuarded::LastAdmin);
        }

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id.into_uuid())
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(AdminGuarded::Applied((before, User::try_from(row)?)))
    }

    async fn delete_user(&self, id: UserId) -> StorageResult<AdminGuarded<User>> {
        let mut tx = self.pool.begin().await?;
        let admins = lock_admins(&mut tx).await?;

        let Some(user) = lock_user(&mut tx, id).await? else {
            return Ok(AdminGuarded::NotFound);
        };
        if user.is_admin() && admins <= 1 {
            return Ok(AdminGuarded::LastAdmin);
        }

        // user_permissions rows go with the user via ON DELETE CASCADE.
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.into_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(AdminGuarded::Applied(user))
    }

    async fn count_users_with_role(&self, role: Role) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(to_u64(count))
    }
}

#[async_trait]
impl PermissionStore for PostgresBackend {
    async fn upsert_permission(&self, name: &str, description: &str) -> StorageResult<Permission> {
        let row = sqlx::query_as::<_, PermissionRow>(&format!(
            "INSERT INTO permissions (id, name, description) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO UPDATE SET description = EXCLUDED.description, \
             updated_at = CASE WHEN permissions.description = EXCLUDED.description \
                          THEN permissions.updated_at ELSE NOW() END \
             RETURNING {PERMISSION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn create_permission(&self, permission: &Permission) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO permissions (id, name, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(permission.id.into_uuid())
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(permission.created_at)
        .bind(permission.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_permission(&self, id: PermissionId) -> StorageResult<Option<Permission>> {
        let row = sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id = $1"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn find_permission_by_name(&self, name: &str) -> StorageResult<Option<Permission>> {
        let row = sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_permissions(&self) -> StorageResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(&format!(
            "SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_permission(&self, permission: &Permission) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE permissions SET name = $2, description = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(permission.id.into_uuid())
        .bind(&permission.name)
        .bind(&permission.description)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("permission {}", permission.id)));
        }
        Ok(())
    }

    async fn delete_permission(&self, id: PermissionId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id.into_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn permission_holders(&self, id: PermissionId) -> StorageResult<Vec<UserId>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM user_permissions WHERE permission_id = $1")
                .bind(id.into_uuid())
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().map(UserId::from_uuid).collect())
    }

    async fn user_permissions(&self, user_id: UserId) -> StorageResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            "SELECT p.id, p.name, p.description, p.created_at, p.updated_at \
             FROM permissions p \
             JOIN user_permissions up ON up.permission_id = p.id \
             WHERE up.user_id = $1 \
             ORDER BY p.name",
        )
        .bind(user_id.into_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn add_grant(&self, user_id: UserId, permission_id: PermissionId) -> StorageResult<bool> {
        let result = sqlx::query(
            "INSERT INTO user_permissions (user_id, permission_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id.into_uuid())
        .bind(permission_id.into_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_grant(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> StorageResult<bool> {
        let result =
            sqlx::query("DELETE FROM user_permissions WHERE user_id = $1 AND permission_id = $2")
                .bind(user_id.into_uuid())
                .bind(permission_id.into_uuid())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditStore for PostgresBackend {
    async fn insert_entry(&self, entry: &AuditLogEntry) -> StorageResult<()> {
        sqlx::query(&format!(
            "INSERT INTO audit_log ({AUDIT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(entry.id.into_uuid())
        .bind(entry.user_id.map(UserId::into_uuid))
        .bind(&entry.action)
        .bind(&entry.resource)
        .bind(&entry.resource_id)
        .bind(&entry.old_values)
        .bind(&entry.new_values)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.success)
        .bind(&entry.error)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn query_entries(
        &self,
        filter: &AuditFilter,
        page: PageRequest,
    ) -> StorageResult<Page<AuditLogEntry>> {
        let total = self.count_entries(filter).await?;

        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_log"));
        push_audit_filter(&mut builder, filter);
        builder
            .push(" ORDER BY timestamp DESC LIMIT ")
            .push_bind(to_i64(page.limit))
            .push(" OFFSET ")
            .push_bind(to_i64(page.offset));

        let rows = builder
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items: rows.into_iter().map(Into::into).collect(),
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    async fn count_entries(&self, filter: &AuditFilter) -> StorageResult<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_log");
        push_audit_filter(&mut builder, filter);
        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(to_u64(count))
    }

    async fn group_counts(
        &self,
        range: TimeRange,
        dimension: AuditDimension,
        limit: Option<u64>,
    ) -> StorageResult<Vec<(String, u64)>> {
        let column = match dimension {
            AuditDimension::Action => "action".to_string(),
            AuditDimension::Resource => "resource".to_string(),
            AuditDimension::User => format!("COALESCE(user_id::text, '{SYSTEM_ACTOR}')"),
        };

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {column} AS key, COUNT(*) AS count FROM audit_log WHERE TRUE"
        ));
        push_range(&mut builder, range);
        builder.push(" GROUP BY key ORDER BY count DESC, key ASC");
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(to_i64(limit));
        }

        let rows: Vec<(String, i64)> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(k, c)| (k, to_u64(c))).collect())
    }

    async fn delete_entries_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM audit_log WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }

    #[test]
    fn test_audit_filter_sql() {
        let filter = AuditFilter::new()
            .action_contains("grant")
            .with_success(true);
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_log");
        push_audit_filter(&mut builder, &filter);
        let sql = builder.sql();
        assert!(sql.contains("action LIKE $1"));
        assert!(sql.contains("success = $2"));
        assert!(!sql.contains("user_id"));
    }
}
