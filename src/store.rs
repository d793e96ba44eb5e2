use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::broadcast;

/// 存储变更通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange<K> {
    /// 单个实体被写入或修改
    Updated(K),
    /// 单个实体被移除
    Removed(K),
    /// 当前可见页被整体替换
    PageReplaced,
}

#[derive(Debug)]
struct StoreInner<K, V> {
    entries: HashMap<K, V>,
    /// 当前可见页的顺序；每次翻页整体替换
    order: Vec<K>,
}

/// 按 ID 索引的资源存储
///
/// 会话级缓存，不设过期时间；服务端数据是权威值，这里只保存副本。
#[derive(Debug)]
pub struct ResourceStore<K, V> {
    inner: RwLock<StoreInner<K, V>>,
    changes: broadcast::Sender<StoreChange<K>>,
}

impl<K, V> ResourceStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            inner: RwLock::new(StoreInner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
            changes,
        }
    }

    /// 订阅变更；接收端落后太多时会收到 `Lagged`，重新读取快照即可
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange<K>> {
        self.changes.subscribe()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.read().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// 写入实体；不在可见页中的实体只进入索引
    pub fn insert(&self, key: K, value: V) {
        self.inner.write().entries.insert(key.clone(), value);
        self.notify(StoreChange::Updated(key));
    }

    /// 就地修改实体，返回修改后的值；实体不存在时返回 None
    pub fn update<F>(&self, key: &K, f: F) -> Option<V>
    where
        F: FnOnce(&mut V),
    {
        let updated = {
            let mut inner = self.inner.write();
            let entry = inner.entries.get_mut(key)?;
            f(entry);
            entry.clone()
        };
        self.notify(StoreChange::Updated(key.clone()));
        Some(updated)
    }

    /// 移除实体，返回被移除的值及其在可见页中的位置
    pub fn remove(&self, key: &K) -> Option<(V, Option<usize>)> {
        let removed = {
            let mut inner = self.inner.write();
            let value = inner.entries.remove(key)?;
            let position = inner.order.iter().position(|k| k == key);
            if let Some(index) = position {
                inner.order.remove(index);
            }
            (value, position)
        };
        self.notify(StoreChange::Removed(key.clone()));
        Some(removed)
    }

    /// 将实体放回可见页的指定位置（用于回滚删除）
    pub fn restore(&self, key: K, value: V, position: Option<usize>) {
        {
            let mut inner = self.inner.write();
            inner.entries.insert(key.clone(), value);
            if let Some(index) = position {
                if !inner.order.contains(&key) {
                    let index = index.min(inner.order.len());
                    inner.order.insert(index, key.clone());
                }
            }
        }
        self.notify(StoreChange::Updated(key));
    }

    /// 用新的一页替换可见窗口；不在新页中的旧实体一并清除
    pub fn replace_page(&self, items: Vec<(K, V)>) {
        {
            let mut inner = self.inner.write();
            inner.entries.clear();
            inner.order.clear();
            for (key, value) in items {
                if inner.entries.insert(key.clone(), value).is_none() {
                    inner.order.push(key);
                }
            }
        }
        self.notify(StoreChange::PageReplaced);
    }

    /// 按可见页顺序返回实体
    pub fn page(&self) -> Vec<V> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|key| inner.entries.get(key).cloned())
            .collect()
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.read().order.clone()
    }

    /// 在同一把写锁下修改全部实体
    pub fn update_all<F>(&self, mut f: F)
    where
        F: FnMut(&K, &mut V),
    {
        {
            let mut inner = self.inner.write();
            for (key, value) in inner.entries.iter_mut() {
                f(key, value);
            }
        }
        self.notify(StoreChange::PageReplaced);
    }

    pub fn clear(&self) {
        {
            let mut inner = self.inner.write();
            inner.entries.clear();
            inner.order.clear();
        }
        self.notify(StoreChange::PageReplaced);
    }

    fn notify(&self, change: StoreChange<K>) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.changes.send(change);
    }
}

impl<K, V> Default for ResourceStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
