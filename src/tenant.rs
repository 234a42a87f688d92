use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;
use crate::outbox::{self, Courier, LogCourier, RetryPolicy};
use crate::sweeper;

/// Per-tenant engines, created on first use. Tenant = database name from the
/// pgwire connection; each gets its own WAL, sweeper, compactor and outbox.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    sweep_interval: Duration,
    courier: Arc<dyn Courier>,
    cancel: CancellationToken,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, sweep_interval: Duration) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            sweep_interval,
            courier: Arc::new(LogCourier),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_courier(mut self, courier: Arc<dyn Courier>) -> Self {
        self.courier = courier;
        self
    }

    /// Get or lazily create the engine of `tenant`.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        // Path traversal guard.
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Entry lock so two first connections can't open the same WAL twice.
        let engine = match self.engines.entry(tenant.to_string()) {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(slot) => {
                let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
                let engine = Arc::new(Engine::new(wal_path, Arc::new(NotifyHub::new()))?);
                self.spawn_background(tenant, &engine);
                slot.insert(engine.clone());
                engine
            }
        };

        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        info!("tenant {tenant} loaded");
        Ok(engine)
    }

    fn spawn_background(&self, tenant: &str, engine: &Arc<Engine>) {
        tokio::spawn(sweeper::run_sweeper(
            engine.clone(),
            self.sweep_interval,
            self.cancel.child_token(),
        ));
        tokio::spawn(sweeper::run_compactor(
            engine.clone(),
            self.compact_threshold,
            self.cancel.child_token(),
        ));
        tokio::spawn(outbox::run_dispatcher(
            tenant.to_string(),
            engine.notify.subscribe(),
            self.courier.clone(),
            RetryPolicy::default(),
            self.cancel.child_token(),
        ));
    }

    pub fn tenant_count(&self) -> usize {
        self.engines.len()
    }

    /// Stop every tenant's background tasks. Engines stay readable.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::fs;
    use ulid::Ulid;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("slotd_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn manager(dir: PathBuf) -> TenantManager {
        TenantManager::new(dir, 1000, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let tm = manager(test_data_dir("isolation"));
        let eng_a = tm.get_or_create("salon_a").unwrap();
        let eng_b = tm.get_or_create("salon_b").unwrap();

        let sid = Ulid::new();
        eng_a
            .upsert_service(Service::new(sid, ServiceKind::TimeSlot))
            .await
            .unwrap();

        assert_eq!(eng_a.list_services().await.len(), 1);
        assert!(eng_b.list_services().await.is_empty());
        // Same id is free in the other tenant.
        assert!(eng_b
            .upsert_service(Service::new(sid, ServiceKind::NightRange))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn tenant_lazy_creation() {
        let dir = test_data_dir("lazy");
        let tm = manager(dir.clone());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);

        let _eng = tm.get_or_create("my_db").unwrap();
        assert!(dir.join("my_db.wal").exists());
        assert_eq!(tm.tenant_count(), 1);
    }

    #[tokio::test]
    async fn tenant_same_engine_returned() {
        let tm = manager(test_data_dir("same_eng"));
        let eng1 = tm.get_or_create("foo").unwrap();
        let eng2 = tm.get_or_create("foo").unwrap();
        assert!(Arc::ptr_eq(&eng1, &eng2));
    }

    #[tokio::test]
    async fn tenant_reloads_from_wal() {
        let dir = test_data_dir("reload");
        let sid = Ulid::new();
        {
            let tm = manager(dir.clone());
            let eng = tm.get_or_create("cafe").unwrap();
            eng.upsert_service(Service::new(sid, ServiceKind::TimeSlot))
                .await
                .unwrap();
            tm.shutdown();
        }
        let tm = manager(dir);
        let eng = tm.get_or_create("cafe").unwrap();
        let services = eng.list_services().await;
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].id, sid);
    }

    #[tokio::test]
    async fn tenant_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let tm = manager(dir.clone());

        let _eng = tm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());

        assert!(tm.get_or_create("../..").is_err());
    }

    #[tokio::test]
    async fn tenant_name_too_long() {
        let tm = manager(test_data_dir("name_too_long"));
        let long_name = "x".repeat(MAX_TENANT_NAME_LEN + 1);
        let err = tm.get_or_create(&long_name).err().unwrap();
        assert!(err.to_string().contains("tenant name too long"));
    }

    #[tokio::test]
    async fn tenant_count_limit() {
        let tm = manager(test_data_dir("count_limit"));
        for i in 0..MAX_TENANTS {
            tm.get_or_create(&format!("t{i}")).unwrap();
        }
        let err = tm.get_or_create("one_more").err().unwrap();
        assert!(err.to_string().contains("too many tenants"));
        tm.shutdown();
    }

    #[tokio::test]
    async fn shutdown_cancels_background() {
        let tm = manager(test_data_dir("shutdown"));
        let _eng = tm.get_or_create("bistro").unwrap();
        assert!(!tm.is_shut_down());
        tm.shutdown();
        assert!(tm.is_shut_down());
    }
}
