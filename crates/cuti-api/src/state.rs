//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! ## Architecture
//!
//! - In-memory [`Store`]s are the serving copy of every table.
//! - When a Postgres pool is configured, every mutation is written to the
//!   database first and applied to the store only after the write succeeds;
//!   stores are hydrated from the database on start-up.
//! - Writers that check a uniqueness or quota rule before writing hold a
//!   lock across check and write: [`QuotaLocks`] per (personnel, leave type,
//!   year) and [`WriteLocks`] per registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use cuti_core::registry::default_leave_types;
use cuti_core::{
    AuditEntry, Holiday, LeaveRecord, LeaveType, Personnel, QuotaKey, User,
};
use parking_lot::{Mutex, RwLock};
use rand_core::{OsRng, RngCore};
use sqlx::PgPool;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::auth::TokenService;
use crate::evidence::EvidenceStore;
use crate::notify::Notifier;

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// The lock is `parking_lot` and is never held across `.await` points.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// First record matching the predicate.
    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.data.read().values().find(|v| pred(v)).cloned()
    }

    /// All records matching the predicate.
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.data.read().values().filter(|v| pred(v)).cloned().collect()
    }

    /// Whether any record matches the predicate.
    pub fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.data.read().values().any(pred)
    }

    /// Update a record in place. Returns the updated record, or `None` if not found.
    pub fn update(&self, id: &Uuid, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut guard = self.data.write();
        if let Some(entry) = guard.get_mut(id) {
            f(entry);
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Remove a record by ID.
    pub fn remove(&self, id: &Uuid) -> Option<T> {
        self.data.write().remove(id)
    }

    /// Remove every record matching the predicate, returning them.
    pub fn remove_where(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        let mut guard = self.data.write();
        let ids: Vec<Uuid> = guard
            .iter()
            .filter(|(_, v)| pred(v))
            .map(|(id, _)| *id)
            .collect();
        ids.iter().filter_map(|id| guard.remove(id)).collect()
    }

    /// Run a batch of changes under a single write lock.
    pub fn with_write<R>(&self, f: impl FnOnce(&mut HashMap<Uuid, T>) -> R) -> R {
        f(&mut self.data.write())
    }

    /// Check if a record exists.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.data.read().contains_key(id)
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- Write serialization ------------------------------------------------------

/// Per-(personnel, leave type, year) async locks.
///
/// A leave record create or update holds the lock for its target group from
/// usage read through persistence, so two requests for the same group can
/// never both pass validation against the same usage.
#[derive(Debug, Clone, Default)]
pub struct QuotaLocks {
    inner: Arc<Mutex<HashMap<QuotaKey, Arc<tokio::sync::Mutex<()>>>>>,
}

impl QuotaLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`'s group.
    pub async fn acquire(&self, key: QuotaKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock();
            // Entries only the map refers to are idle.
            map.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(map.entry(key).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of groups currently locked or awaited.
    pub fn active(&self) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|l| Arc::strong_count(l) > 1)
            .count()
    }
}

/// One async lock per registry whose writes check uniqueness first.
#[derive(Debug, Clone, Default)]
pub struct WriteLocks {
    pub roster: Arc<tokio::sync::Mutex<()>>,
    pub leave_types: Arc<tokio::sync::Mutex<()>>,
    pub users: Arc<tokio::sync::Mutex<()>>,
    pub holidays: Arc<tokio::sync::Mutex<()>>,
}

// -- Configuration ------------------------------------------------------------

/// Application configuration.
///
/// Custom `Debug` redacts secrets to prevent credential leakage in logs.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// HMAC secret for access tokens.
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    /// Directory evidence files are written to.
    pub upload_dir: PathBuf,
    pub bcrypt_cost: u32,
    pub audit_retention_days: i64,
    pub audit_purge_interval_secs: u64,
    pub cors_origins: Vec<String>,
    pub login_rate_limit: u64,
    pub login_rate_window_secs: u64,
    /// When set and no accounts exist, an `admin` super admin is created.
    pub bootstrap_admin_password: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("jwt_secret", &"[REDACTED]")
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .field("upload_dir", &self.upload_dir)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("audit_retention_days", &self.audit_retention_days)
            .field("audit_purge_interval_secs", &self.audit_purge_interval_secs)
            .field("cors_origins", &self.cors_origins)
            .field("login_rate_limit", &self.login_rate_limit)
            .field("login_rate_window_secs", &self.login_rate_window_secs)
            .field(
                "bootstrap_admin_password",
                &self.bootstrap_admin_password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            jwt_secret: random_hex(32),
            token_ttl_minutes: 24 * 60,
            upload_dir: PathBuf::from("uploads/evidence"),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            audit_retention_days: 365,
            audit_purge_interval_secs: 24 * 60 * 60,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
            login_rate_limit: 10,
            login_rate_window_secs: 300,
            bootstrap_admin_password: None,
        }
    }
}

impl AppConfig {
    /// Build configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        let defaults = Self::default();
        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ => {
                tracing::warn!(
                    "JWT_SECRET not set, generating an ephemeral secret. \
                     Issued tokens will not survive a restart."
                );
                defaults.jwt_secret.clone()
            }
        };

        Self {
            port: var("PORT").unwrap_or(defaults.port),
            jwt_secret,
            token_ttl_minutes: var("TOKEN_TTL_MINUTES").unwrap_or(defaults.token_ttl_minutes),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            bcrypt_cost: var("BCRYPT_COST").unwrap_or(defaults.bcrypt_cost),
            audit_retention_days: var("AUDIT_RETENTION_DAYS")
                .unwrap_or(defaults.audit_retention_days),
            audit_purge_interval_secs: var("AUDIT_PURGE_INTERVAL_SECS")
                .unwrap_or(defaults.audit_purge_interval_secs),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_origins),
            login_rate_limit: var("LOGIN_RATE_LIMIT").unwrap_or(defaults.login_rate_limit),
            login_rate_window_secs: var("LOGIN_RATE_WINDOW_SECS")
                .unwrap_or(defaults.login_rate_window_secs),
            bootstrap_admin_password: std::env::var("BOOTSTRAP_ADMIN_PASSWORD")
                .ok()
                .filter(|p| !p.is_empty()),
        }
    }
}

/// Hex-encoded random bytes from the OS generator.
pub fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// -- Application State --------------------------------------------------------

/// Shared application state accessible to all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub personnel: Store<Personnel>,
    pub leave_types: Store<LeaveType>,
    pub leave_records: Store<LeaveRecord>,
    pub users: Store<User>,
    pub audit_log: Store<AuditEntry>,
    pub holidays: Store<Holiday>,

    pub quota_locks: QuotaLocks,
    pub write_locks: WriteLocks,

    /// Change-event fan-out for connected WebSocket clients.
    pub notifier: Notifier,
    pub evidence: EvidenceStore,
    pub tokens: TokenService,

    /// PostgreSQL pool. `None` means in-memory-only mode.
    pub db_pool: Option<PgPool>,

    pub config: AppConfig,
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        Self {
            personnel: Store::new(),
            leave_types: Store::new(),
            leave_records: Store::new(),
            users: Store::new(),
            audit_log: Store::new(),
            holidays: Store::new(),
            quota_locks: QuotaLocks::new(),
            write_locks: WriteLocks::default(),
            notifier: Notifier::new(256),
            evidence: EvidenceStore::new(config.upload_dir.clone()),
            tokens: TokenService::new(&config.jwt_secret, config.token_ttl_minutes),
            db_pool,
            config,
        }
    }

    /// Hydrate in-memory stores from the database.
    ///
    /// Called once on startup when a database pool is available.
    pub async fn hydrate_from_db(&self) -> Result<(), String> {
        let pool = match &self.db_pool {
            Some(pool) => pool,
            None => return Ok(()),
        };

        let users = crate::db::users::load_all(pool)
            .await
            .map_err(|e| format!("failed to load users: {e}"))?;
        let user_count = users.len();
        for record in users {
            self.users.insert(record.id, record);
        }

        let leave_types = crate::db::leave_types::load_all(pool)
            .await
            .map_err(|e| format!("failed to load leave types: {e}"))?;
        let leave_type_count = leave_types.len();
        for record in leave_types {
            self.leave_types.insert(record.id, record);
        }

        let personnel = crate::db::personnel::load_all(pool)
            .await
            .map_err(|e| format!("failed to load personnel: {e}"))?;
        let personnel_count = personnel.len();
        for record in personnel {
            self.personnel.insert(record.id, record);
        }

        let records = crate::db::leave_records::load_all(pool)
            .await
            .map_err(|e| format!("failed to load leave records: {e}"))?;
        let record_count = records.len();
        for record in records {
            self.leave_records.insert(record.id, record);
        }

        let audit = crate::db::audit::load_since(
            pool,
            Utc::now() - chrono::Duration::days(self.config.audit_retention_days),
        )
        .await
        .map_err(|e| format!("failed to load audit log: {e}"))?;
        let audit_count = audit.len();
        for entry in audit {
            self.audit_log.insert(entry.id, entry);
        }

        let holidays = crate::db::holidays::load_all(pool)
            .await
            .map_err(|e| format!("failed to load holidays: {e}"))?;
        let holiday_count = holidays.len();
        for holiday in holidays {
            self.holidays.insert(holiday.id, holiday);
        }

        tracing::info!(
            users = user_count,
            leave_types = leave_type_count,
            personnel = personnel_count,
            leave_records = record_count,
            audit_entries = audit_count,
            holidays = holiday_count,
            "Hydrated in-memory stores from database"
        );

        Ok(())
    }

    /// Seed the default leave types when the registry is empty.
    pub async fn seed_leave_types_if_empty(&self) -> Result<usize, sqlx::Error> {
        let _guard = self.write_locks.leave_types.lock().await;
        if !self.leave_types.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let seeds: Vec<LeaveType> = default_leave_types()
            .iter()
            .map(|s| LeaveType {
                id: Uuid::new_v4(),
                name: s.name.to_string(),
                code: s.code.to_string(),
                default_quota: s.default_quota,
                gender_specific: s.gender_specific,
                color: s.color.to_string(),
                is_active: true,
                created_at: now,
            })
            .collect();
        for lt in &seeds {
            if let Some(pool) = &self.db_pool {
                crate::db::leave_types::insert(pool, lt).await?;
            }
            self.leave_types.insert(lt.id, lt.clone());
        }
        tracing::info!(count = seeds.len(), "Seeded default leave types");
        Ok(seeds.len())
    }

    /// Resolve a personnel record by service number.
    pub fn personnel_by_nrp(&self, nrp: &str) -> Option<Personnel> {
        self.personnel.find(|p| p.nrp == nrp)
    }

    pub fn user_by_username(&self, username: &str) -> Option<User> {
        self.users.find(|u| u.username == username)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_record(personnel_id: Uuid, days: i32) -> LeaveRecord {
        LeaveRecord {
            id: Uuid::new_v4(),
            personnel_id,
            leave_type_id: Uuid::new_v4(),
            days_requested: days,
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            reason: "test".into(),
            evidence_path: None,
            balance_remaining: 0,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    #[test]
    fn store_insert_get_update_remove() {
        let store: Store<LeaveRecord> = Store::new();
        let rec = sample_record(Uuid::new_v4(), 2);
        assert!(store.insert(rec.id, rec.clone()).is_none());
        assert_eq!(store.get(&rec.id).unwrap().days_requested, 2);

        let updated = store.update(&rec.id, |r| r.days_requested = 5).unwrap();
        assert_eq!(updated.days_requested, 5);
        assert!(store.update(&Uuid::new_v4(), |_| {}).is_none());

        assert!(store.contains(&rec.id));
        assert_eq!(store.remove(&rec.id).unwrap().id, rec.id);
        assert!(store.is_empty());
    }

    #[test]
    fn store_remove_where_returns_removed() {
        let store: Store<LeaveRecord> = Store::new();
        let owner = Uuid::new_v4();
        for days in 1..=3 {
            let r = sample_record(owner, days);
            store.insert(r.id, r);
        }
        let other = sample_record(Uuid::new_v4(), 9);
        store.insert(other.id, other.clone());

        let removed = store.remove_where(|r| r.personnel_id == owner);
        assert_eq!(removed.len(), 3);
        assert_eq!(store.len(), 1);
        assert!(store.find(|r| r.days_requested == 9).is_some());
        assert!(!store.any(|r| r.personnel_id == owner));
    }

    #[test]
    fn store_clones_share_data() {
        let a: Store<LeaveRecord> = Store::new();
        let b = a.clone();
        let r = sample_record(Uuid::new_v4(), 1);
        a.insert(r.id, r.clone());
        assert!(b.contains(&r.id));
    }

    #[tokio::test]
    async fn quota_locks_serialize_same_key() {
        let locks = QuotaLocks::new();
        let key = QuotaKey::new(Uuid::new_v4(), Uuid::new_v4(), 2025);

        let guard = locks.acquire(key).await;
        assert_eq!(locks.active(), 1);

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(key).await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn quota_locks_do_not_block_other_keys() {
        let locks = QuotaLocks::new();
        let a = QuotaKey::new(Uuid::new_v4(), Uuid::new_v4(), 2025);
        let b = QuotaKey::new(a.personnel_id, a.leave_type_id, 2026);
        let _ga = locks.acquire(a).await;
        let acquired =
            tokio::time::timeout(std::time::Duration::from_millis(100), locks.acquire(b)).await;
        assert!(acquired.is_ok());
    }

    #[test]
    fn config_debug_redacts_secrets() {
        let config = AppConfig {
            jwt_secret: "super-secret".into(),
            bootstrap_admin_password: Some("admin123".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("admin123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_secret_is_random() {
        assert_ne!(AppConfig::default().jwt_secret, AppConfig::default().jwt_secret);
        assert_eq!(random_hex(16).len(), 32);
    }

    #[tokio::test]
    async fn seeding_leave_types_is_idempotent() {
        let state = AppState::new();
        assert_eq!(state.seed_leave_types_if_empty().await.unwrap(), 7);
        assert_eq!(state.seed_leave_types_if_empty().await.unwrap(), 0);
        assert_eq!(state.leave_types.len(), 7);
    }
}
