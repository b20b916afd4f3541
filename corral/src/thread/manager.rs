use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use crate::thread::config::ThreadPoolConfig;
use crate::thread::error::{PoolError, PoolResult};
use crate::thread::pool::ThreadPool;

/// Registry of named thread pools.
///
/// Pools are addressed by name or by the numeric id they received when they
/// were registered. Id 0 is always the default pool.
#[derive(Debug)]
pub struct ThreadPoolManager {
    pools: RwLock<Vec<Arc<ThreadPool>>>,
}

impl Default for ThreadPoolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadPoolManager {
    /// Manager whose default pool is an unbounded `default-threadpool`.
    pub fn new() -> Self {
        Self {
            pools: RwLock::new(vec![Arc::new(ThreadPool::unbounded())]),
        }
    }

    /// Manager whose default pool is built from `config`.
    pub fn with_default(config: ThreadPoolConfig) -> PoolResult<Self> {
        let pool = ThreadPool::new(config)?;
        Ok(Self {
            pools: RwLock::new(vec![Arc::new(pool)]),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<ThreadPool>>> {
        self.pools.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<ThreadPool>>> {
        self.pools.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds and registers a pool. Names are unique within a manager.
    pub fn create_pool(&self, config: ThreadPoolConfig) -> PoolResult<Arc<ThreadPool>> {
        let mut pools = self.write();
        if pools.iter().any(|p| p.name() == config.name) {
            return Err(PoolError::PoolAlreadyExists(config.name));
        }
        let pool = Arc::new(ThreadPool::new(config)?);
        pools.push(Arc::clone(&pool));
        info!(pool = %pool.name(), id = pools.len() - 1, "thread pool registered");
        Ok(pool)
    }

    pub fn get(&self, name: &str) -> PoolResult<Arc<ThreadPool>> {
        self.read()
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| PoolError::NoSuchThreadPool(name.to_string()))
    }

    pub fn get_by_id(&self, id: usize) -> PoolResult<Arc<ThreadPool>> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| PoolError::NoSuchThreadPool(format!("#{}", id)))
    }

    pub fn numeric_id(&self, name: &str) -> PoolResult<usize> {
        self.read()
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| PoolError::NoSuchThreadPool(name.to_string()))
    }

    pub fn default_pool(&self) -> Arc<ThreadPool> {
        // The default pool is installed by every constructor and never removed.
        Arc::clone(&self.read()[0])
    }

    pub fn pool_names(&self) -> Vec<String> {
        self.read().iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Shuts every pool down, in registration order.
    pub fn shutdown(&self) {
        let pools: Vec<Arc<ThreadPool>> = self.read().clone();
        for pool in pools {
            pool.shutdown();
        }
    }
}
