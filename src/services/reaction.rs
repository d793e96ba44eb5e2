use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, Result},
    models::{PageInfo, Post, ReactionState, ReactionSummary, ReactionType},
    services::{
        api::BackendApi,
        messages::MessageBus,
        mutation::{LocalPatch, MutationController},
    },
    store::{ResourceStore, StoreChange},
    utils::validation::validate_entity_id,
};

/// 帖子列表与表态服务
pub struct ReactionService {
    api: Arc<dyn BackendApi>,
    posts: Arc<ResourceStore<String, Post>>,
    page_info: RwLock<Option<PageInfo>>,
    load_sequence: RwLock<u64>,
    controller: MutationController<String>,
    bus: Arc<MessageBus>,
    page_size: u32,
}

impl ReactionService {
    pub fn new(api: Arc<dyn BackendApi>, bus: Arc<MessageBus>, page_size: u32) -> Self {
        Self {
            api,
            posts: Arc::new(ResourceStore::new()),
            page_info: RwLock::new(None),
            load_sequence: RwLock::new(0),
            controller: MutationController::new("reactions", bus.clone()),
            bus,
            page_size: page_size.max(1),
        }
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.page()
    }

    pub fn post(&self, post_id: &str) -> Option<Post> {
        self.posts.get(&post_id.to_string())
    }

    pub fn reactions(&self, post_id: &str) -> Option<ReactionState> {
        self.post(post_id).map(|p| p.reactions)
    }

    pub fn page_info(&self) -> Option<PageInfo> {
        *self.page_info.read()
    }

    pub fn is_mutating(&self, post_id: &str) -> bool {
        self.controller.is_mutating(&post_id.to_string())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange<String>> {
        self.posts.subscribe()
    }

    /// 直接放入一篇帖子（例如从详情页进入）
    pub fn upsert(&self, post: Post) {
        let key = post.id.clone();
        self.controller.supersede(&key);
        self.posts.insert(key, post);
    }

    /// 加载帖子页；新数据覆盖在途的表态请求
    pub async fn load_page(&self, page: u32) -> Result<Vec<Post>> {
        let page = page.max(1);
        let sequence = {
            let mut seq = self.load_sequence.write();
            *seq += 1;
            *seq
        };

        let loaded = match self.api.list_posts(page, self.page_size).await {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!("Failed to load posts page {}: {}", page, err);
                self.bus.error("load_posts", err.user_message());
                return Err(err);
            }
        };

        if *self.load_sequence.read() != sequence {
            debug!("Discarding stale posts page {} (seq {})", page, sequence);
            return Ok(loaded.items);
        }

        for post in &loaded.items {
            self.controller.supersede(&post.id);
        }
        self.posts.replace_page(
            loaded
                .items
                .iter()
                .map(|p| (p.id.clone(), p.clone()))
                .collect(),
        );
        *self.page_info.write() = Some(loaded.info);
        info!("Loaded {} posts (page {})", loaded.items.len(), loaded.info.page);

        Ok(loaded.items)
    }

    /// 切换当前用户对帖子的表态
    ///
    /// 本地立即生效；服务端返回完整计数时以服务端为准，失败时恢复到调用前的状态。
    pub async fn toggle_reaction(&self, post_id: &str, reaction: ReactionType) -> Result<ReactionState> {
        validate_entity_id("Post", post_id)?;
        let key = post_id.to_string();

        self.controller
            .execute(
                &key,
                "toggle_reaction",
                || {
                    let before = self
                        .posts
                        .get(&key)
                        .ok_or_else(|| AppError::not_found("Post"))?
                        .reactions;
                    let next = before.toggled(reaction);
                    debug!(
                        "Toggling {} on post {}: {:?} -> {:?}",
                        reaction, key, before.current_reaction, next.current_reaction
                    );
                    self.posts.update(&key, |p| p.reactions = next);
                    Ok(LocalPatch::Applied(before))
                },
                || self.api.toggle_reaction(post_id, reaction),
                |server: Option<ReactionSummary>| {
                    if let Some(summary) = server {
                        let canonical = ReactionState::from(summary);
                        self.posts.update(&key, |p| p.reactions = canonical);
                    }
                },
                |before: ReactionState| {
                    self.posts.update(&key, |p| p.reactions = before);
                },
            )
            .await?;

        self.reactions(post_id)
            .ok_or_else(|| AppError::not_found("Post"))
    }
}
