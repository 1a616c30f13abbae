//! The platform store: all SQL and transactional writes live here.

use crate::error::{StoreError, StoreResult};
use crate::records::{
    EnvelopeRecord, InviteRecord, ProjectRecord, ProjectStatus, ResetTokenRecord, UserRecord,
};
use duckdb::{params, Connection};
use parcel_crypto::{SealedKey, VaultedKey};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Persistent store for users, projects, envelopes, invites and reset
/// tokens, backed by a single DuckDB connection.
pub struct PlatformStore {
    conn: Arc<Mutex<Connection>>,
}

impl PlatformStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        // Cap memory/threads; DuckDB defaults to ~80% RAM per connection
        conn.execute_batch("PRAGMA memory_limit='64MB'; PRAGMA threads=1;")?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory store (tests, ephemeral deployments).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.ensure_tables()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                user_id VARCHAR PRIMARY KEY,
                public_key BLOB NOT NULL,
                vaulted_key BLOB NOT NULL,
                active BOOLEAN NOT NULL,
                created_at BIGINT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS projects (
                project_id VARCHAR PRIMARY KEY,
                status VARCHAR NOT NULL,
                created_at BIGINT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS project_envelopes (
                project_id VARCHAR NOT NULL,
                user_id VARCHAR NOT NULL,
                sealed_key BLOB NOT NULL,
                created_at BIGINT NOT NULL,
                PRIMARY KEY (project_id, user_id)
            );
            CREATE TABLE IF NOT EXISTS invites (
                email VARCHAR PRIMARY KEY,
                token VARCHAR NOT NULL,
                sponsor_user_id VARCHAR NOT NULL,
                vaulted_secret BLOB NOT NULL,
                pending_grants BLOB NOT NULL,
                expires_at BIGINT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS reset_tokens (
                token VARCHAR PRIMARY KEY,
                user_id VARCHAR NOT NULL,
                expires_at BIGINT NOT NULL,
                used BOOLEAN NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Runs `f` inside a single transaction, rolling back on any error.
    fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION;")?;
        match f(&conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT;")?;
                Ok(value)
            }
            Err(err) => {
                let _ = conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn insert_user(&self, user: &UserRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        insert_user_row(&conn, user)
    }

    pub fn get_user(&self, user_id: &str) -> StoreResult<Option<UserRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT user_id, public_key, vaulted_key, active, created_at
                 FROM users WHERE user_id = ?",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .map(Some)
            .or_else(none_on_missing_row)?;

        row.map(|(user_id, pk, vaulted, active, created_at)| {
            Ok(UserRecord {
                user_id,
                public_key: public_key_from_bytes(&pk)?,
                vaulted_key: serde_json::from_slice(&vaulted)?,
                active,
                created_at,
            })
        })
        .transpose()
    }

    pub fn set_user_active(&self, user_id: &str, active: bool) -> StoreResult<()> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE users SET active = ? WHERE user_id = ?",
            params![active, user_id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    /// Replaces the vault blob (encrypted private key + salt + params) in a
    /// single write. Used by password change/reset; the public key is
    /// untouched.
    pub fn replace_user_vault(&self, user_id: &str, vaulted: &VaultedKey) -> StoreResult<()> {
        let conn = self.lock()?;
        let blob = serde_json::to_vec(vaulted)?;
        let affected = conn.execute(
            "UPDATE users SET vaulted_key = ? WHERE user_id = ?",
            params![blob, user_id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    /// Swaps the public key and vault blob in one write, leaving envelope
    /// rows untouched. Used by token-based password reset, which rotates
    /// the key pair; the stale envelopes are detected by renewal and
    /// repaired by re-grant.
    pub fn update_user_keys(
        &self,
        user_id: &str,
        public_key: &[u8; 32],
        vaulted: &VaultedKey,
    ) -> StoreResult<()> {
        let conn = self.lock()?;
        let blob = serde_json::to_vec(vaulted)?;
        let affected = conn.execute(
            "UPDATE users SET public_key = ?, vaulted_key = ? WHERE user_id = ?",
            params![public_key.to_vec(), blob, user_id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    /// Key-pair rotation: swaps the public key and vault blob and replaces
    /// the user's entire envelope set, all in one transaction.
    pub fn replace_user_identity(
        &self,
        user_id: &str,
        public_key: &[u8; 32],
        vaulted: &VaultedKey,
        envelopes: &[EnvelopeRecord],
    ) -> StoreResult<()> {
        let vault_blob = serde_json::to_vec(vaulted)?;
        self.in_transaction(|conn| {
            let affected = conn.execute(
                "UPDATE users SET public_key = ?, vaulted_key = ? WHERE user_id = ?",
                params![public_key.to_vec(), vault_blob.clone(), user_id],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("user {user_id}")));
            }
            conn.execute(
                "DELETE FROM project_envelopes WHERE user_id = ?",
                params![user_id],
            )?;
            for envelope in envelopes {
                insert_envelope_row(conn, envelope)?;
            }
            Ok(())
        })
    }

    /// Account deletion: purges the user row and every envelope referencing
    /// it in one transaction.
    pub fn delete_user(&self, user_id: &str) -> StoreResult<()> {
        self.in_transaction(|conn| {
            conn.execute(
                "DELETE FROM project_envelopes WHERE user_id = ?",
                params![user_id],
            )?;
            conn.execute(
                "DELETE FROM reset_tokens WHERE user_id = ?",
                params![user_id],
            )?;
            conn.execute("DELETE FROM users WHERE user_id = ?", params![user_id])?;
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub fn insert_project(&self, project: &ProjectRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO projects (project_id, status, created_at) VALUES (?, ?, ?)",
            params![
                project.project_id,
                project.status.as_str(),
                project.created_at
            ],
        )?;
        Ok(())
    }

    pub fn get_project(&self, project_id: &str) -> StoreResult<Option<ProjectRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT project_id, status, created_at FROM projects WHERE project_id = ?",
                params![project_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .map(Some)
            .or_else(none_on_missing_row)?;

        row.map(|(project_id, status, created_at)| {
            let status = ProjectStatus::parse(&status)
                .ok_or_else(|| StoreError::Storage(format!("unknown project status {status}")))?;
            Ok(ProjectRecord {
                project_id,
                status,
                created_at,
            })
        })
        .transpose()
    }

    pub fn set_project_status(&self, project_id: &str, status: ProjectStatus) -> StoreResult<()> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE projects SET status = ? WHERE project_id = ?",
            params![status.as_str(), project_id],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(format!("project {project_id}")));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Envelopes
    // ------------------------------------------------------------------

    /// Inserts a sealed envelope. The `(project_id, user_id)` primary key
    /// serializes concurrent grants; the loser gets [`StoreError::Conflict`].
    pub fn insert_envelope(&self, envelope: &EnvelopeRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        insert_envelope_row(&conn, envelope)
    }

    pub fn get_envelope(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> StoreResult<Option<EnvelopeRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT project_id, user_id, sealed_key, created_at
                 FROM project_envelopes WHERE project_id = ? AND user_id = ?",
                params![project_id, user_id],
                envelope_row,
            )
            .map(Some)
            .or_else(none_on_missing_row)?;
        row.map(envelope_from_row).transpose()
    }

    pub fn list_user_envelopes(&self, user_id: &str) -> StoreResult<Vec<EnvelopeRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT project_id, user_id, sealed_key, created_at
             FROM project_envelopes WHERE user_id = ? ORDER BY project_id",
        )?;
        let rows = stmt
            .query_map(params![user_id], envelope_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(envelope_from_row).collect()
    }

    pub fn list_project_envelopes(&self, project_id: &str) -> StoreResult<Vec<EnvelopeRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT project_id, user_id, sealed_key, created_at
             FROM project_envelopes WHERE project_id = ? ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map(params![project_id], envelope_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(envelope_from_row).collect()
    }

    /// Replaces a member's envelope in one transaction: the old row (if
    /// any) is deleted and the new one inserted under the same commit, so
    /// a failed re-seal never leaves the pair without a row.
    pub fn replace_envelope(&self, envelope: &EnvelopeRecord) -> StoreResult<()> {
        self.in_transaction(|conn| {
            conn.execute(
                "DELETE FROM project_envelopes WHERE project_id = ? AND user_id = ?",
                params![envelope.project_id, envelope.user_id],
            )?;
            insert_envelope_row(conn, envelope)
        })
    }

    /// Deletes an envelope. Returns whether a row existed; revoking absent
    /// access is a no-op for the caller.
    pub fn delete_envelope(&self, project_id: &str, user_id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "DELETE FROM project_envelopes WHERE project_id = ? AND user_id = ?",
            params![project_id, user_id],
        )?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Invites
    // ------------------------------------------------------------------

    /// Creates or refreshes the pending invite for an email address.
    pub fn upsert_invite(&self, invite: &InviteRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        let vaulted_secret = serde_json::to_vec(&invite.vaulted_secret)?;
        let pending_grants = serde_json::to_vec(&invite.pending_grants)?;
        conn.execute(
            "INSERT OR REPLACE INTO invites
                 (email, token, sponsor_user_id, vaulted_secret, pending_grants, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                invite.email,
                invite.token,
                invite.sponsor_user_id,
                vaulted_secret,
                pending_grants,
                invite.expires_at
            ],
        )?;
        Ok(())
    }

    pub fn get_invite(&self, email: &str) -> StoreResult<Option<InviteRecord>> {
        self.invite_query("email", email)
    }

    pub fn get_invite_by_token(&self, token: &str) -> StoreResult<Option<InviteRecord>> {
        self.invite_query("token", token)
    }

    fn invite_query(&self, column: &str, value: &str) -> StoreResult<Option<InviteRecord>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT email, token, sponsor_user_id, vaulted_secret, pending_grants, expires_at
                     FROM invites WHERE {column} = ?"
                ),
                params![value],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .map(Some)
            .or_else(none_on_missing_row)?;

        row.map(
            |(email, token, sponsor_user_id, vaulted_secret, pending_grants, expires_at)| {
                Ok(InviteRecord {
                    email,
                    token,
                    sponsor_user_id,
                    vaulted_secret: serde_json::from_slice(&vaulted_secret)?,
                    pending_grants: serde_json::from_slice(&pending_grants)?,
                    expires_at,
                })
            },
        )
        .transpose()
    }

    /// Invite acceptance: creates the user row, stores every granted
    /// envelope and consumes the invite, all-or-nothing. A partial commit
    /// (user created, no access granted) cannot occur.
    pub fn accept_invite(
        &self,
        invite_email: &str,
        user: &UserRecord,
        envelopes: &[EnvelopeRecord],
    ) -> StoreResult<()> {
        self.in_transaction(|conn| {
            insert_user_row(conn, user)?;
            for envelope in envelopes {
                insert_envelope_row(conn, envelope)?;
            }
            conn.execute("DELETE FROM invites WHERE email = ?", params![invite_email])?;
            Ok(())
        })
    }

    pub fn delete_invite(&self, email: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM invites WHERE email = ?", params![email])?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reset tokens
    // ------------------------------------------------------------------

    pub fn insert_reset_token(&self, record: &ResetTokenRecord) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO reset_tokens (token, user_id, expires_at, used) VALUES (?, ?, ?, ?)",
            params![
                record.token,
                record.user_id,
                record.expires_at,
                record.used
            ],
        )?;
        Ok(())
    }

    /// Atomically marks a reset token as used and returns its prior state.
    /// A second take of the same token sees `used = true`.
    ///
    /// The token is only burnt when `user_id` matches the one it was
    /// issued for; a mismatched take returns the record untouched, so a
    /// redemption attempt against the wrong account cannot consume the
    /// rightful owner's token.
    pub fn take_reset_token(
        &self,
        token: &str,
        user_id: &str,
    ) -> StoreResult<Option<ResetTokenRecord>> {
        self.in_transaction(|conn| {
            let row = conn
                .query_row(
                    "SELECT token, user_id, expires_at, used FROM reset_tokens WHERE token = ?",
                    params![token],
                    |row| {
                        Ok(ResetTokenRecord {
                            token: row.get(0)?,
                            user_id: row.get(1)?,
                            expires_at: row.get(2)?,
                            used: row.get(3)?,
                        })
                    },
                )
                .map(Some)
                .or_else(none_on_missing_row)?;

            if row.as_ref().is_some_and(|r| r.user_id == user_id) {
                conn.execute(
                    "UPDATE reset_tokens SET used = TRUE WHERE token = ?",
                    params![token],
                )?;
            }
            Ok(row)
        })
    }
}

// ----------------------------------------------------------------------
// Row helpers
// ----------------------------------------------------------------------

type EnvelopeRow = (String, String, Vec<u8>, i64);

fn envelope_row(row: &duckdb::Row<'_>) -> Result<EnvelopeRow, duckdb::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn envelope_from_row(row: EnvelopeRow) -> StoreResult<EnvelopeRecord> {
    let (project_id, user_id, sealed_blob, created_at) = row;
    let sealed_key: SealedKey = serde_json::from_slice(&sealed_blob)?;
    Ok(EnvelopeRecord {
        project_id,
        user_id,
        sealed_key,
        created_at,
    })
}

fn insert_user_row(conn: &Connection, user: &UserRecord) -> StoreResult<()> {
    let vault_blob = serde_json::to_vec(&user.vaulted_key)?;
    conn.execute(
        "INSERT INTO users (user_id, public_key, vaulted_key, active, created_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
            user.user_id,
            user.public_key.to_vec(),
            vault_blob,
            user.active,
            user.created_at
        ],
    )?;
    Ok(())
}

fn insert_envelope_row(conn: &Connection, envelope: &EnvelopeRecord) -> StoreResult<()> {
    let sealed_blob = serde_json::to_vec(&envelope.sealed_key)?;
    conn.execute(
        "INSERT INTO project_envelopes (project_id, user_id, sealed_key, created_at)
         VALUES (?, ?, ?, ?)",
        params![
            envelope.project_id,
            envelope.user_id,
            sealed_blob,
            envelope.created_at
        ],
    )?;
    Ok(())
}

fn public_key_from_bytes(bytes: &[u8]) -> StoreResult<[u8; 32]> {
    if bytes.len() != 32 {
        return Err(StoreError::Storage(format!(
            "invalid public key length {}",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(bytes);
    Ok(arr)
}

fn none_on_missing_row<T>(err: duckdb::Error) -> StoreResult<Option<T>> {
    match err {
        duckdb::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other.into()),
    }
}
