use parking_lot::RwLock;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    models::{FeedStatus, Notification, PageInfo},
    services::{
        api::BackendApi,
        messages::MessageBus,
        mutation::{LocalPatch, MutationController, Settled},
    },
    store::{ResourceStore, StoreChange},
    utils::validation::validate_entity_id,
};

/// "全部已读" 使用的实体键
const MARK_ALL_KEY: &str = "*mark-all*";

#[derive(Debug)]
struct FeedState {
    status: FeedStatus,
    page_info: Option<PageInfo>,
    requested_page: u32,
    unread_count: u64,
    load_sequence: u64,
}

/// 通知列表的一致性快照
#[derive(Debug, Clone)]
pub struct NotificationFeedSnapshot {
    pub status: FeedStatus,
    pub items: Vec<Notification>,
    pub page_info: Option<PageInfo>,
    pub unread_count: u64,
}

struct ReadPatch {
    decremented: bool,
}

struct MarkAllPatch {
    flipped: Vec<String>,
    previous_count: u64,
}

struct DeletePatch {
    notification: Notification,
    position: Option<usize>,
    decremented: bool,
}

/// 通知服务：分页列表 + 独立维护的未读数
///
/// 列表项的已读标记与未读数在同一把写锁下修改，读取快照时两者不会不一致。
pub struct NotificationService {
    api: Arc<dyn BackendApi>,
    items: Arc<ResourceStore<String, Notification>>,
    feed: Arc<RwLock<FeedState>>,
    unread_tx: watch::Sender<u64>,
    controller: MutationController<String>,
    bus: Arc<MessageBus>,
    page_size: u32,
}

impl NotificationService {
    pub fn new(api: Arc<dyn BackendApi>, bus: Arc<MessageBus>, page_size: u32) -> Self {
        let (unread_tx, _) = watch::channel(0);

        Self {
            api,
            items: Arc::new(ResourceStore::new()),
            feed: Arc::new(RwLock::new(FeedState {
                status: FeedStatus::Idle,
                page_info: None,
                requested_page: 1,
                unread_count: 0,
                load_sequence: 0,
            })),
            unread_tx,
            controller: MutationController::new("notifications", bus.clone()),
            bus,
            page_size: page_size.max(1),
        }
    }

    pub fn snapshot(&self) -> NotificationFeedSnapshot {
        let feed = self.feed.read();
        NotificationFeedSnapshot {
            status: feed.status.clone(),
            items: self.items.page(),
            page_info: feed.page_info,
            unread_count: feed.unread_count,
        }
    }

    pub fn get(&self, notification_id: &str) -> Option<Notification> {
        self.items.get(&notification_id.to_string())
    }

    pub fn status(&self) -> FeedStatus {
        self.feed.read().status.clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.feed.read().unread_count
    }

    pub fn is_mutating(&self, notification_id: &str) -> bool {
        self.controller.is_mutating(&notification_id.to_string())
    }

    pub fn is_marking_all(&self) -> bool {
        self.controller.is_mutating(&MARK_ALL_KEY.to_string())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange<String>> {
        self.items.subscribe()
    }

    /// 订阅未读角标
    pub fn watch_unread(&self) -> watch::Receiver<u64> {
        self.unread_tx.subscribe()
    }

    /// 加载指定页，整体替换当前可见窗口
    ///
    /// 并发加载时只有最后发起的那次会写入。
    pub async fn load_page(&self, page: u32) -> Result<Vec<Notification>> {
        let page = page.max(1);
        let sequence = {
            let mut feed = self.feed.write();
            feed.status = FeedStatus::Loading;
            feed.requested_page = page;
            feed.load_sequence += 1;
            feed.load_sequence
        };
        debug!("Loading notifications page {} (seq {})", page, sequence);

        let result = self.api.list_notifications(page, self.page_size).await;

        let mut feed = self.feed.write();
        if feed.load_sequence != sequence {
            debug!("Discarding stale notifications page {} (seq {})", page, sequence);
            return result.map(|p| p.items);
        }

        match result {
            Ok(loaded) => {
                // 有变更在途的条目保留本地版本，由该变更的提交或回滚决定最终状态
                let merged: Vec<(String, Notification)> = loaded
                    .items
                    .iter()
                    .map(|n| match self.items.get(&n.id) {
                        Some(local) if self.controller.is_mutating(&n.id) => (n.id.clone(), local),
                        _ => (n.id.clone(), n.clone()),
                    })
                    .collect();
                self.items.replace_page(merged);
                feed.page_info = Some(loaded.info);
                feed.status = FeedStatus::Loaded;
                info!("Loaded {} notifications (page {})", loaded.items.len(), loaded.info.page);
                Ok(loaded.items)
            }
            Err(err) => {
                feed.status = FeedStatus::Error(err.user_message());
                drop(feed);
                warn!("Failed to load notifications page {}: {}", page, err);
                self.bus.error("load_notifications", err.user_message());
                Err(err)
            }
        }
    }

    /// 重新加载当前页与未读数
    pub async fn refresh(&self) -> Result<()> {
        let page = self.feed.read().requested_page;
        self.load_page(page).await?;
        self.refresh_unread_count().await?;
        Ok(())
    }

    /// 从服务端拉取未读数并覆盖本地值
    pub async fn refresh_unread_count(&self) -> Result<u64> {
        let count = self.api.unread_count().await?;
        let mut feed = self.feed.write();
        feed.unread_count = count;
        self.unread_tx.send_replace(count);
        debug!("Unread notification count refreshed: {}", count);
        Ok(count)
    }

    /// 标记单条通知已读
    ///
    /// 已读的通知直接返回，不发请求也不改动未读数。
    pub async fn mark_read(&self, notification_id: &str) -> Result<Option<Notification>> {
        validate_entity_id("Notification", notification_id)?;
        let key = notification_id.to_string();
        let deferred = AtomicBool::new(false);

        self.controller
            .execute(
                &key,
                "mark_read",
                || {
                    let mut feed = self.feed.write();
                    match self.items.get(&key) {
                        Some(n) if n.is_read => Ok(LocalPatch::Skipped),
                        Some(_) => {
                            self.items.update(&key, |n| n.is_read = true);
                            let decremented = self.decrement_unread(&mut feed);
                            Ok(LocalPatch::Applied(ReadPatch { decremented }))
                        }
                        None => {
                            deferred.store(true, Ordering::SeqCst);
                            Ok(LocalPatch::Deferred)
                        }
                    }
                },
                || self.api.mark_notification_read(notification_id),
                |server: Option<Notification>| {
                    let mut feed = self.feed.write();
                    if let Some(canonical) = server {
                        self.items.update(&key, |n| *n = canonical);
                    }
                    if deferred.load(Ordering::SeqCst) {
                        self.decrement_unread(&mut feed);
                    }
                },
                |patch: ReadPatch| {
                    let mut feed = self.feed.write();
                    self.items.update(&key, |n| n.is_read = false);
                    if patch.decremented {
                        self.increment_unread(&mut feed, 1);
                    }
                },
            )
            .await?;

        Ok(self.items.get(&key))
    }

    /// 全部标记已读：当前页所有条目置为已读，未读数归零
    pub async fn mark_all_read(&self) -> Result<NotificationFeedSnapshot> {
        let key = MARK_ALL_KEY.to_string();

        let settled = self
            .controller
            .execute(
                &key,
                "mark_all_read",
                || {
                    let mut feed = self.feed.write();
                    let flipped: Vec<String> = self
                        .items
                        .page()
                        .into_iter()
                        .filter(|n| !n.is_read)
                        .map(|n| n.id)
                        .collect();

                    if flipped.is_empty() && feed.unread_count == 0 {
                        return Ok(LocalPatch::Skipped);
                    }

                    // 在途的单条已读请求不再写回，失败时也不会把条目改回未读
                    for pending in self.controller.pending_keys() {
                        if self.items.contains(&pending) {
                            self.controller.supersede(&pending);
                        }
                    }

                    self.items.update_all(|_, n| n.is_read = true);
                    let previous_count = feed.unread_count;
                    self.set_unread(&mut feed, 0);
                    Ok(LocalPatch::Applied(MarkAllPatch { flipped, previous_count }))
                },
                || self.api.mark_all_notifications_read(),
                |_| {},
                |patch: MarkAllPatch| {
                    let mut feed = self.feed.write();
                    for id in &patch.flipped {
                        self.items.update(id, |n| n.is_read = false);
                    }
                    self.increment_unread(&mut feed, patch.previous_count);
                },
            )
            .await?;

        if settled == Settled::Committed {
            self.bus.success("mark_all_read", "已将全部通知标记为已读");
        }
        Ok(self.snapshot())
    }

    /// 删除通知；删除未读通知时未读数减一
    pub async fn delete(&self, notification_id: &str) -> Result<()> {
        validate_entity_id("Notification", notification_id)?;
        let key = notification_id.to_string();

        self.controller
            .execute(
                &key,
                "delete_notification",
                || {
                    let mut feed = self.feed.write();
                    match self.items.remove(&key) {
                        Some((notification, position)) => {
                            let decremented = !notification.is_read && self.decrement_unread(&mut feed);
                            if let Some(info) = feed.page_info.as_mut() {
                                info.total_items = info.total_items.saturating_sub(1);
                            }
                            Ok(LocalPatch::Applied(DeletePatch {
                                notification,
                                position,
                                decremented,
                            }))
                        }
                        None => Ok(LocalPatch::Deferred),
                    }
                },
                || self.api.delete_notification(notification_id),
                |_| {},
                |patch: DeletePatch| {
                    let mut feed = self.feed.write();
                    if let Some(info) = feed.page_info.as_mut() {
                        info.total_items += 1;
                    }
                    self.items
                        .restore(key.clone(), patch.notification, patch.position);
                    if patch.decremented {
                        self.increment_unread(&mut feed, 1);
                    }
                },
            )
            .await?;

        Ok(())
    }

    fn decrement_unread(&self, feed: &mut FeedState) -> bool {
        if feed.unread_count == 0 {
            return false;
        }
        let next = feed.unread_count - 1;
        self.set_unread(feed, next);
        true
    }

    fn increment_unread(&self, feed: &mut FeedState, by: u64) {
        let next = feed.unread_count.saturating_add(by);
        self.set_unread(feed, next);
    }

    fn set_unread(&self, feed: &mut FeedState, count: u64) {
        feed.unread_count = count;
        self.unread_tx.send_replace(count);
    }
}
