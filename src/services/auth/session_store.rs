//! 本地会话登记与账号级互斥
//!
//! `SessionRegistry` 由调用方创建并注入，不使用进程级全局变量。

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct SessionEntry {
    identity: String,
    expires_at: Instant,
}

/// 本地会话登记表：会话 ID → 账号，带有效期
#[derive(Debug)]
pub struct SessionRegistry {
    ttl: Duration,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 登记一个新会话，返回会话 ID
    pub async fn register(&self, identity: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let entry = SessionEntry {
            identity: identity.to_string(),
            expires_at: Instant::now() + self.ttl,
        };
        self.sessions.write().await.insert(id.clone(), entry);
        debug!("登记会话 {} → {}", id, identity);
        id
    }

    /// 查询会话对应的账号，已过期的视为不存在
    pub async fn lookup(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.identity.clone())
    }

    /// 注销会话
    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// 清理过期会话，返回清理数量
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.expires_at > now);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!("清理过期会话 {} 个", removed);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// 同一账号的导入串行执行
///
/// 登录会话不能被并发的抓取复用，所以同一账号同一时间只允许一个导入。
/// 最后一个持有者释放后条目即被移除，表的大小只随并发账号数变化
#[derive(Debug, Default)]
pub struct IdentityLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取账号锁，持有返回的 guard 期间其他同账号导入会等待
    pub async fn acquire(&self, identity: &str) -> IdentityGuard<'_> {
        let key = identity.to_ascii_lowercase();
        let lock = self
            .map()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        IdentityGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// 当前登记的账号数
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 没有其他人持有或等待时移除条目
    fn release(&self, key: &str) {
        let mut locks = self.map();
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
            debug!("释放账号锁 {}", key);
        }
    }
}

/// 账号锁的持有凭证，drop 时解锁并清理空闲条目
#[derive(Debug)]
pub struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        // 先解锁，表里的 Arc 才可能只剩一份
        drop(self.guard.take());
        self.locks.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = SessionRegistry::new(Duration::from_secs(60));
        let id = registry.register("reader").await;

        assert_eq!(registry.lookup(&id).await.as_deref(), Some("reader"));
        assert!(registry.lookup("missing").await.is_none());
        assert!(registry.remove(&id).await);
        assert!(registry.lookup(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_swept() {
        let registry = SessionRegistry::new(Duration::ZERO);
        let id = registry.register("reader").await;

        assert!(registry.lookup(&id).await.is_none());
        assert_eq!(registry.sweep_expired().await, 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_same_identity_is_serialized() {
        let locks = IdentityLocks::new();
        let guard = locks.acquire("Reader").await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire("reader")).await;
        assert!(blocked.is_err());

        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire("someone-else")).await;
        assert!(other.is_ok());

        drop(guard);
        let after = tokio::time::timeout(Duration::from_millis(50), locks.acquire("reader")).await;
        assert!(after.is_ok());
    }

    #[tokio::test]
    async fn test_released_identities_are_removed() {
        let locks = IdentityLocks::new();
        for name in ["a", "b", "c"] {
            let _guard = locks.acquire(name).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_someone_waits() {
        let locks = Arc::new(IdentityLocks::new());
        let guard = locks.acquire("reader").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire("READER").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert!(waiter.await.is_ok());
        assert!(locks.is_empty());
    }
}
