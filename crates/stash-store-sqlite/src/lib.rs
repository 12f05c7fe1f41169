use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqliteConnection, SqlitePool};
use stash_storage::{
    BatchResult, EncryptedField, EnvName, NewSecret, Scope, SecretId, SecretQuery, SecretRecord,
    SecretType, SecretUpdate, Store, StoreError, UserId, WorkspaceId,
};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const SECRET_COLUMNS: &str = "id, workspace_id, environment, owner_user_id, secret_type, version,
    key_ciphertext, key_iv, key_tag, key_hash,
    value_ciphertext, value_iv, value_tag, value_hash,
    comment_ciphertext, comment_iv, comment_tag, comment_hash,
    created_at, updated_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        // Every connection to `:memory:` is a separate database, so keep exactly one.
        Self::connect("sqlite::memory:", 1).await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        Self::connect(url, 4).await
    }

    async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        tracing::debug!(url, max_connections, "sqlite store ready");
        Ok(Self { pool })
    }
}

/// Raw row as stored; converted into a [`SecretRecord`] with typed ids.
#[derive(sqlx::FromRow)]
struct SecretRow {
    id: String,
    workspace_id: String,
    environment: String,
    owner_user_id: Option<String>,
    secret_type: String,
    version: i64,
    key_ciphertext: String,
    key_iv: String,
    key_tag: String,
    key_hash: String,
    value_ciphertext: String,
    value_iv: String,
    value_tag: String,
    value_hash: String,
    comment_ciphertext: Option<String>,
    comment_iv: Option<String>,
    comment_tag: Option<String>,
    comment_hash: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::try_parse(raw).map_err(|e| StoreError::Backend(e.to_string()))
}

impl TryFrom<SecretRow> for SecretRecord {
    type Error = StoreError;

    fn try_from(row: SecretRow) -> Result<Self, Self::Error> {
        let owner_user_id = row
            .owner_user_id
            .as_deref()
            .map(parse_uuid)
            .transpose()?
            .map(UserId);
        let comment = row.comment_ciphertext.map(|ciphertext| EncryptedField {
            ciphertext,
            iv: row.comment_iv.unwrap_or_default(),
            auth_tag: row.comment_tag.unwrap_or_default(),
            hash: row.comment_hash.unwrap_or_default(),
        });

        Ok(SecretRecord {
            id: SecretId(parse_uuid(&row.id)?),
            workspace_id: WorkspaceId(parse_uuid(&row.workspace_id)?),
            environment: EnvName(row.environment),
            owner_user_id,
            secret_type: row.secret_type.parse().map_err(StoreError::Backend)?,
            version: row.version,
            key: EncryptedField {
                ciphertext: row.key_ciphertext,
                iv: row.key_iv,
                auth_tag: row.key_tag,
                hash: row.key_hash,
            },
            value: EncryptedField {
                ciphertext: row.value_ciphertext,
                iv: row.value_iv,
                auth_tag: row.value_tag,
                hash: row.value_hash,
            },
            comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn new_record(secret: &NewSecret, now: DateTime<Utc>) -> SecretRecord {
    SecretRecord {
        id: SecretId::new(),
        workspace_id: secret.scope.workspace_id,
        environment: secret.scope.environment.clone(),
        owner_user_id: secret.owner_user_id,
        secret_type: secret.secret_type,
        version: 1,
        key: secret.key.clone(),
        value: secret.value.clone(),
        comment: secret.comment.clone(),
        created_at: now,
        updated_at: now,
    }
}

async fn insert_record(conn: &mut SqliteConnection, r: &SecretRecord) -> Result<(), StoreError> {
    let comment = r.comment.as_ref();
    sqlx::query(
        "INSERT INTO secrets(
            id, workspace_id, environment, owner_user_id, secret_type, version,
            key_ciphertext, key_iv, key_tag, key_hash,
            value_ciphertext, value_iv, value_tag, value_hash,
            comment_ciphertext, comment_iv, comment_tag, comment_hash,
            created_at, updated_at)
         VALUES(?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
    )
    .bind(r.id.0.to_string())
    .bind(r.workspace_id.0.to_string())
    .bind(&r.environment.0)
    .bind(r.owner_user_id.map(|u| u.0.to_string()))
    .bind(r.secret_type.as_str())
    .bind(r.version)
    .bind(&r.key.ciphertext)
    .bind(&r.key.iv)
    .bind(&r.key.auth_tag)
    .bind(&r.key.hash)
    .bind(&r.value.ciphertext)
    .bind(&r.value.iv)
    .bind(&r.value.auth_tag)
    .bind(&r.value.hash)
    .bind(comment.map(|c| c.ciphertext.as_str()))
    .bind(comment.map(|c| c.iv.as_str()))
    .bind(comment.map(|c| c.auth_tag.as_str()))
    .bind(comment.map(|c| c.hash.as_str()))
    .bind(r.created_at)
    .bind(r.updated_at)
    .execute(conn)
    .await
    .map_err(|e| {
        let s = e.to_string();
        if s.contains("CHECK constraint") || s.contains("NOT NULL constraint") {
            StoreError::Validation(s)
        } else {
            StoreError::Backend(s)
        }
    })?;
    Ok(())
}

impl SqliteStore {
    async fn apply_update(&self, update: &SecretUpdate) -> Result<(), StoreError> {
        let patch = &update.patch;
        let key = patch.key.as_ref();
        let value = patch.value.as_ref();
        let comment = patch.comment.as_ref();

        let result = sqlx::query(
            "UPDATE secrets SET
                key_ciphertext = COALESCE(?, key_ciphertext),
                key_iv = COALESCE(?, key_iv),
                key_tag = COALESCE(?, key_tag),
                key_hash = COALESCE(?, key_hash),
                value_ciphertext = COALESCE(?, value_ciphertext),
                value_iv = COALESCE(?, value_iv),
                value_tag = COALESCE(?, value_tag),
                value_hash = COALESCE(?, value_hash),
                comment_ciphertext = COALESCE(?, comment_ciphertext),
                comment_iv = COALESCE(?, comment_iv),
                comment_tag = COALESCE(?, comment_tag),
                comment_hash = COALESCE(?, comment_hash),
                version = version + 1,
                updated_at = ?
             WHERE id = ? AND workspace_id = ? AND environment = ?
               AND (? IS NULL OR version = ?)",
        )
        .bind(key.map(|f| f.ciphertext.as_str()))
        .bind(key.map(|f| f.iv.as_str()))
        .bind(key.map(|f| f.auth_tag.as_str()))
        .bind(key.map(|f| f.hash.as_str()))
        .bind(value.map(|f| f.ciphertext.as_str()))
        .bind(value.map(|f| f.iv.as_str()))
        .bind(value.map(|f| f.auth_tag.as_str()))
        .bind(value.map(|f| f.hash.as_str()))
        .bind(comment.map(|f| f.ciphertext.as_str()))
        .bind(comment.map(|f| f.iv.as_str()))
        .bind(comment.map(|f| f.auth_tag.as_str()))
        .bind(comment.map(|f| f.hash.as_str()))
        .bind(Utc::now())
        .bind(update.id.0.to_string())
        .bind(update.scope.workspace_id.0.to_string())
        .bind(&update.scope.environment.0)
        .bind(update.expected_version)
        .bind(update.expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing matched: either the record left the scope or the version moved on.
        let current: Option<(i64,)> = sqlx::query_as(
            "SELECT version FROM secrets WHERE id = ? AND workspace_id = ? AND environment = ?",
        )
        .bind(update.id.0.to_string())
        .bind(update.scope.workspace_id.0.to_string())
        .bind(&update.scope.environment.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        match (current, update.expected_version) {
            (Some((actual,)), Some(expected)) => Err(StoreError::Conflict { expected, actual }),
            _ => Err(StoreError::NotFound),
        }
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Create ─────────────────────────────

    async fn create_secret(&self, secret: &NewSecret) -> Result<SecretRecord, StoreError> {
        secret.validate()?;
        let record = new_record(secret, Utc::now());

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        insert_record(&mut conn, &record).await?;
        Ok(record)
    }

    async fn create_secrets(
        &self,
        secrets: &[NewSecret],
    ) -> Result<Vec<SecretRecord>, StoreError> {
        for (index, secret) in secrets.iter().enumerate() {
            secret.validate().map_err(|e| match e {
                StoreError::Validation(msg) => {
                    StoreError::Validation(format!("secrets[{}]: {}", index, msg))
                }
                other => other,
            })?;
        }

        let now = Utc::now();
        let records: Vec<SecretRecord> = secrets.iter().map(|s| new_record(s, now)).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        for record in &records {
            insert_record(&mut tx, record).await?;
        }
        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(records)
    }

    // ────────────────────────────── Read ──────────────────────────────

    async fn get_secret(&self, id: &SecretId) -> Result<SecretRecord, StoreError> {
        let sql = format!("SELECT {} FROM secrets WHERE id = ?", SECRET_COLUMNS);
        let row = sqlx::query_as::<_, SecretRow>(&sql)
            .bind(id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
            .ok_or(StoreError::NotFound)?;
        row.try_into()
    }

    async fn list_secrets(&self, query: &SecretQuery) -> Result<Vec<SecretRecord>, StoreError> {
        // `owner_user_id = NULL` never matches, so an anonymous query sees shared secrets only.
        let sql = format!(
            "SELECT {} FROM secrets
             WHERE workspace_id = ? AND environment = ?
               AND (owner_user_id IS NULL OR owner_user_id = ?)
             ORDER BY id",
            SECRET_COLUMNS
        );
        let rows = sqlx::query_as::<_, SecretRow>(&sql)
            .bind(query.scope.workspace_id.0.to_string())
            .bind(&query.scope.environment.0)
            .bind(query.caller.map(|u| u.0.to_string()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.into_iter().map(SecretRecord::try_from).collect()
    }

    async fn list_secret_ids(&self, scope: &Scope) -> Result<Vec<SecretId>, StoreError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT id FROM secrets WHERE workspace_id = ? AND environment = ?",
        )
        .bind(scope.workspace_id.0.to_string())
        .bind(&scope.environment.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for (id_str,) in rows {
            out.push(SecretId(parse_uuid(&id_str)?));
        }
        Ok(out)
    }

    // ──────────────────────────── Mutations ───────────────────────────

    async fn update_secrets(&self, updates: &[SecretUpdate]) -> Result<BatchResult, StoreError> {
        for update in updates {
            update.patch.validate()?;
        }

        let mut result = BatchResult::default();
        for update in updates {
            match self.apply_update(update).await {
                Ok(()) => result.ok(update.id),
                Err(e) => {
                    tracing::debug!(id = %update.id, error = %e, "secret update not applied");
                    result.fail(update.id, e);
                }
            }
        }
        Ok(result)
    }

    async fn delete_secrets(
        &self,
        scope: &Scope,
        ids: &[SecretId],
    ) -> Result<BatchResult, StoreError> {
        let mut result = BatchResult::default();
        for id in ids {
            let outcome = sqlx::query(
                "DELETE FROM secrets WHERE id = ? AND workspace_id = ? AND environment = ?",
            )
            .bind(id.0.to_string())
            .bind(scope.workspace_id.0.to_string())
            .bind(&scope.environment.0)
            .execute(&self.pool)
            .await;

            match outcome {
                Ok(done) if done.rows_affected() > 0 => result.ok(*id),
                Ok(_) => result.fail(*id, StoreError::NotFound),
                Err(e) => result.fail(*id, StoreError::Backend(e.to_string())),
            }
        }
        Ok(result)
    }
}
