use std::sync::Arc;

use crate::{
    config::Config,
    error::Result,
    services::{
        api::{BackendApi, HttpBackend},
        messages::MessageBus,
        notification::NotificationService,
        reaction::ReactionService,
        registration::RegistrationService,
    },
};

/// 客户端会话的共享状态
/// 包含所有服务和配置的引用
#[derive(Clone)]
pub struct ClientState {
    /// 应用配置
    pub config: Config,

    /// 后端接口
    pub api: Arc<dyn BackendApi>,

    /// 用户状态消息
    pub bus: Arc<MessageBus>,

    /// 通知服务
    pub notifications: Arc<NotificationService>,

    /// 帖子表态服务
    pub reactions: Arc<ReactionService>,

    /// 活动报名服务
    pub registrations: Arc<RegistrationService>,
}

impl ClientState {
    /// 使用 HTTP 后端与进程级消息总线创建
    pub fn new(config: Config) -> Result<Self> {
        let api: Arc<dyn BackendApi> = Arc::new(HttpBackend::new(&config)?);
        let bus = MessageBus::init_global(config.message_buffer_size);
        Ok(Self::with_api(config, api, bus))
    }

    pub fn with_api(config: Config, api: Arc<dyn BackendApi>, bus: Arc<MessageBus>) -> Self {
        let notifications = Arc::new(NotificationService::new(
            api.clone(),
            bus.clone(),
            config.notifications_per_page,
        ));
        let reactions = Arc::new(ReactionService::new(
            api.clone(),
            bus.clone(),
            config.posts_per_page,
        ));
        let registrations = Arc::new(RegistrationService::new(
            api.clone(),
            bus.clone(),
            config.events_per_page,
        ));

        Self {
            config,
            api,
            bus,
            notifications,
            reactions,
            registrations,
        }
    }
}
