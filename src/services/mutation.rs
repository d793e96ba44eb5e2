use dashmap::{mapref::entry::Entry, DashMap};
use std::{fmt::Display, future::Future, hash::Hash, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{error::Result, services::messages::MessageBus};

/// 本地乐观修改的结果
#[derive(Debug)]
pub enum LocalPatch<S> {
    /// 已在本地应用，附带回滚所需的快照
    Applied(S),
    /// 不做本地修改，等待服务端结果后再刷新
    Deferred,
    /// 无需任何操作（例如已读通知再次标记已读）
    Skipped,
}

/// 一次变更的最终结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    Committed,
    Skipped,
    /// 请求期间实体已被重新拉取的数据覆盖，响应被丢弃
    Superseded,
}

#[derive(Debug)]
struct Slot {
    lock: Arc<Mutex<()>>,
    pending: usize,
    sequence: u64,
}

/// 乐观更新控制器
///
/// 同一实体键上的变更按提交顺序串行执行（tokio `Mutex` 为 FIFO），
/// 后一个变更基于前一个变更落定后的状态计算。每次本地应用分配一个序号，
/// 重新拉取数据时调用 [`MutationController::supersede`] 使在途响应作废。
pub struct MutationController<K> {
    name: &'static str,
    slots: Arc<DashMap<K, Slot>>,
    bus: Arc<MessageBus>,
}

impl<K> MutationController<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    pub fn new(name: &'static str, bus: Arc<MessageBus>) -> Self {
        Self {
            name,
            slots: Arc::new(DashMap::new()),
            bus,
        }
    }

    /// 该实体是否有排队或在途的变更
    pub fn is_mutating(&self, key: &K) -> bool {
        self.slots.get(key).map(|slot| slot.pending > 0).unwrap_or(false)
    }

    pub fn pending_keys(&self) -> Vec<K> {
        self.slots
            .iter()
            .filter(|slot| slot.pending > 0)
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// 实体被服务端数据整体替换后调用，在途响应将不再写回
    pub fn supersede(&self, key: &K) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.sequence += 1;
            debug!("[{}] superseded in-flight mutation on {}", self.name, key);
        }
    }

    /// 执行一次乐观变更
    ///
    /// `apply` 同步计算并应用本地状态，`dispatch` 发出网络请求，
    /// 成功时调用 `commit`（参数为服务端返回的数据），失败时以快照调用 `rollback`。
    pub async fn execute<S, R, A, D, Fut, C, B>(
        &self,
        key: &K,
        operation: &str,
        apply: A,
        dispatch: D,
        commit: C,
        rollback: B,
    ) -> Result<Settled>
    where
        A: FnOnce() -> Result<LocalPatch<S>>,
        D: FnOnce() -> Fut,
        Fut: Future<Output = Result<R>>,
        C: FnOnce(R),
        B: FnOnce(S),
    {
        let guard = PendingGuard::enter(self.slots.clone(), key.clone());
        let _permit = guard.lock.lock().await;

        let snapshot = match apply() {
            Ok(LocalPatch::Applied(snapshot)) => Some(snapshot),
            Ok(LocalPatch::Deferred) => None,
            Ok(LocalPatch::Skipped) => {
                debug!("[{}] {} on {} skipped, nothing to change", self.name, operation, key);
                return Ok(Settled::Skipped);
            }
            Err(err) => {
                debug!("[{}] {} on {} rejected locally: {}", self.name, operation, key, err);
                self.bus.error(operation, err.user_message());
                return Err(err);
            }
        };

        let sequence = self.advance(key);
        debug!("[{}] dispatching {} on {} (seq {})", self.name, operation, key, sequence);

        let outcome = dispatch().await;
        let is_current = self.sequence_of(key) == Some(sequence);

        match outcome {
            Ok(response) if is_current => {
                commit(response);
                info!("[{}] {} on {} committed", self.name, operation, key);
                Ok(Settled::Committed)
            }
            Ok(_) => {
                warn!("[{}] discarded stale {} response for {} (seq {})", self.name, operation, key, sequence);
                Ok(Settled::Superseded)
            }
            Err(err) => {
                match snapshot {
                    Some(snapshot) if is_current => {
                        rollback(snapshot);
                        warn!("[{}] {} on {} failed, rolled back: {}", self.name, operation, key, err);
                    }
                    Some(_) => {
                        warn!("[{}] {} on {} failed after refresh, keeping refreshed state: {}", self.name, operation, key, err);
                    }
                    None => {
                        warn!("[{}] {} on {} failed: {}", self.name, operation, key, err);
                    }
                }
                self.bus.error(operation, err.user_message());
                Err(err)
            }
        }
    }

    fn advance(&self, key: &K) -> u64 {
        match self.slots.get_mut(key) {
            Some(mut slot) => {
                slot.sequence += 1;
                slot.sequence
            }
            None => 0,
        }
    }

    fn sequence_of(&self, key: &K) -> Option<u64> {
        self.slots.get(key).map(|slot| slot.sequence)
    }
}

/// 记录排队/在途数量；最后一个变更结束时移除该键的槽位
struct PendingGuard<K: Eq + Hash + Clone> {
    slots: Arc<DashMap<K, Slot>>,
    key: K,
    lock: Arc<Mutex<()>>,
}

impl<K: Eq + Hash + Clone> PendingGuard<K> {
    fn enter(slots: Arc<DashMap<K, Slot>>, key: K) -> Self {
        let lock = {
            let mut slot = slots.entry(key.clone()).or_insert_with(|| Slot {
                lock: Arc::new(Mutex::new(())),
                pending: 0,
                sequence: 0,
            });
            slot.pending += 1;
            slot.lock.clone()
        };

        Self { slots, key, lock }
    }
}

impl<K: Eq + Hash + Clone> Drop for PendingGuard<K> {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.slots.entry(self.key.clone()) {
            let slot = entry.get_mut();
            slot.pending = slot.pending.saturating_sub(1);
            if slot.pending == 0 {
                entry.remove();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;

    fn controller() -> Arc<MutationController<String>> {
        Arc::new(MutationController::new("test", Arc::new(MessageBus::new(8))))
    }

    #[tokio::test]
    async fn test_commit_and_rollback() {
        let ctl = controller();
        let value = Arc::new(SyncMutex::new(1));

        let v = value.clone();
        let v2 = value.clone();
        let settled = ctl
            .execute(
                &"k".to_string(),
                "inc",
                || {
                    let before = *v.lock();
                    *v.lock() = before + 1;
                    Ok(LocalPatch::Applied(before))
                },
                || async { Ok::<_, AppError>(Some(10)) },
                |server: Option<i32>| {
                    if let Some(canonical) = server {
                        *v2.lock() = canonical;
                    }
                },
                |_| unreachable!(),
            )
            .await
            .unwrap();
        assert_eq!(settled, Settled::Committed);
        assert_eq!(*value.lock(), 10);

        let v = value.clone();
        let v2 = value.clone();
        let result = ctl
            .execute(
                &"k".to_string(),
                "inc",
                || {
                    let before = *v.lock();
                    *v.lock() = before + 1;
                    Ok(LocalPatch::Applied(before))
                },
                || async { Err::<(), _>(AppError::network("connection reset")) },
                |_| unreachable!(),
                |snapshot| *v2.lock() = snapshot,
            )
            .await;
        assert!(matches!(result, Err(AppError::NetworkFailure(_))));
        assert_eq!(*value.lock(), 10);
        assert!(!ctl.is_mutating(&"k".to_string()));
    }

    #[tokio::test]
    async fn test_same_key_runs_in_submission_order() {
        let ctl = controller();
        let log = Arc::new(SyncMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3u64 {
            let ctl = ctl.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let log_apply = log.clone();
                ctl.execute(
                    &"same".to_string(),
                    "op",
                    move || {
                        log_apply.lock().push(format!("apply-{}", i));
                        Ok(LocalPatch::Applied(()))
                    },
                    move || async move {
                        tokio::time::sleep(Duration::from_millis(30 - i * 10)).await;
                        Ok::<_, AppError>(())
                    },
                    move |_| log.lock().push(format!("commit-{}", i)),
                    |_| {},
                )
                .await
            }));
            // 保证提交顺序
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(
            *log.lock(),
            vec!["apply-0", "commit-0", "apply-1", "commit-1", "apply-2", "commit-2"]
        );
    }

    #[tokio::test]
    async fn test_superseded_response_is_discarded() {
        let ctl = controller();
        let key = "p1".to_string();
        let committed = Arc::new(SyncMutex::new(false));

        let ctl2 = ctl.clone();
        let key2 = key.clone();
        let flag = committed.clone();
        let task = tokio::spawn(async move {
            ctl2.execute(
                &key2,
                "toggle",
                || Ok(LocalPatch::Applied(())),
                || async {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    Ok::<_, AppError>(())
                },
                move |_| *flag.lock() = true,
                |_| {},
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ctl.is_mutating(&key));
        ctl.supersede(&key);

        assert_eq!(task.await.unwrap().unwrap(), Settled::Superseded);
        assert!(!*committed.lock());
    }

    #[tokio::test]
    async fn test_validation_error_skips_dispatch_and_publishes_message() {
        let bus = Arc::new(MessageBus::new(8));
        let mut rx = bus.subscribe();
        let ctl = MutationController::<String>::new("test", bus);

        let result = ctl
            .execute(
                &"r1".to_string(),
                "reject",
                || Err::<LocalPatch<()>, _>(AppError::validation("拒绝理由太短")),
                || async { Err::<(), _>(AppError::internal("must not dispatch")) },
                |_: ()| {},
                |_| {},
            )
            .await;

        assert!(matches!(result, Err(AppError::ValidationFailure(_))));
        assert_eq!(rx.recv().await.unwrap().text, "拒绝理由太短");
    }
}
