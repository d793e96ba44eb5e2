use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::{
        notification::UnreadCountResponse,
        reaction::ToggleReactionRequest,
        registration::RejectRegistrationRequest,
        response::extract_error_message,
        ApiResponse, Event, Notification, Page, Post, ReactionSummary, ReactionType, Registration,
    },
};

/// 活动负责人对报名的处理
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerDecision {
    Approve,
    Reject(RejectRegistrationRequest),
    Complete,
}

impl ManagerDecision {
    fn path_segment(&self) -> &'static str {
        match self {
            ManagerDecision::Approve => "approve",
            ManagerDecision::Reject(_) => "reject",
            ManagerDecision::Complete => "complete",
        }
    }
}

/// 后端 REST 接口
///
/// 所有方法已拆开响应信封：`success:false` 或非 2xx 返回 `ServerRejected`，
/// 请求未能完成返回 `NetworkFailure`。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn list_notifications(&self, page: u32, limit: u32) -> Result<Page<Notification>>;
    async fn unread_count(&self) -> Result<u64>;
    async fn mark_notification_read(&self, notification_id: &str) -> Result<Option<Notification>>;
    async fn mark_all_notifications_read(&self) -> Result<()>;
    async fn delete_notification(&self, notification_id: &str) -> Result<()>;

    async fn list_posts(&self, page: u32, limit: u32) -> Result<Page<Post>>;
    async fn toggle_reaction(&self, post_id: &str, reaction: ReactionType) -> Result<Option<ReactionSummary>>;

    async fn list_events(&self, page: u32, limit: u32) -> Result<Page<Event>>;
    async fn get_event(&self, event_id: &str) -> Result<Event>;
    async fn register_for_event(&self, event_id: &str) -> Result<Option<Registration>>;
    async fn cancel_registration(&self, event_id: &str) -> Result<()>;
    async fn list_event_registrations(&self, event_id: &str) -> Result<Vec<Registration>>;
    async fn decide_registration(
        &self,
        registration_id: &str,
        decision: ManagerDecision,
    ) -> Result<Option<Registration>>;
}

/// 基于 reqwest 的后端实现
#[derive(Clone)]
pub struct HttpBackend {
    http_client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        // 保证以 "/" 结尾，join 时才不会丢掉最后一段路径
        let mut base = config.api_base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)
            .map_err(|e| AppError::Config(format!("Invalid API_BASE_URL {}: {}", config.api_base_url, e)))?;

        Ok(Self {
            http_client,
            base_url,
            token: config.api_token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| AppError::Internal(format!("Invalid request path {}: {}", path, e)))?;

        let mut builder = self.http_client.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<Option<T>> {
        let response = builder.send().await.map_err(|e| {
            error!("Request for {} failed: {}", what, e);
            AppError::NetworkFailure(e.to_string())
        })?;

        Self::read_envelope(response, what).await
    }

    async fn read_envelope<T: DeserializeOwned>(response: Response, what: &str) -> Result<Option<T>> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!("Failed to read {} response body: {}", what, e);
            AppError::NetworkFailure(e.to_string())
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .as_ref()
                .and_then(extract_error_message)
                .or_else(|| Some(format!("请求失败（HTTP {}）", status.as_u16())));
            warn!("Backend returned {} for {}", status, what);
            return Err(AppError::rejected(message));
        }

        if body.trim().is_empty() {
            debug!("Empty body for {}", what);
            return Ok(None);
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse {} response: {}", what, e);
            AppError::Serialization(e)
        })?;
        envelope.into_result()
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        item_keys: &[&str],
        page: u32,
        limit: u32,
    ) -> Result<Page<T>> {
        let builder = self
            .request(Method::GET, path)?
            .query(&[("page", page), ("limit", limit)]);
        let data: Option<Value> = self.send(builder, path).await?;

        Page::from_data(data.unwrap_or(Value::Null), item_keys, page, limit)
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn list_notifications(&self, page: u32, limit: u32) -> Result<Page<Notification>> {
        self.get_page("notifications", &["notifications"], page, limit).await
    }

    async fn unread_count(&self) -> Result<u64> {
        let builder = self.request(Method::GET, "notifications/unread-count")?;
        let data: Option<Value> = self.send(builder, "unread count").await?;

        match data {
            Some(Value::Number(n)) => Ok(n.as_u64().unwrap_or(0)),
            Some(other) => Ok(serde_json::from_value::<UnreadCountResponse>(other)?.count),
            None => Ok(0),
        }
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<Option<Notification>> {
        let path = format!("notifications/{}/read", notification_id);
        let builder = self.request(Method::PUT, &path)?;
        // 部分版本只返回 {success:true}，也有返回更新后的通知
        let data: Option<Value> = self.send(builder, &path).await?;
        Ok(data.and_then(|v| serde_json::from_value(v).ok()))
    }

    async fn mark_all_notifications_read(&self) -> Result<()> {
        let builder = self.request(Method::PUT, "notifications/mark-all-read")?;
        self.send::<Value>(builder, "mark all read").await?;
        Ok(())
    }

    async fn delete_notification(&self, notification_id: &str) -> Result<()> {
        let path = format!("notifications/{}", notification_id);
        let builder = self.request(Method::DELETE, &path)?;
        self.send::<Value>(builder, &path).await?;
        Ok(())
    }

    async fn list_posts(&self, page: u32, limit: u32) -> Result<Page<Post>> {
        self.get_page("posts", &["posts"], page, limit).await
    }

    async fn toggle_reaction(&self, post_id: &str, reaction: ReactionType) -> Result<Option<ReactionSummary>> {
        let path = format!("reactions/posts/{}", post_id);
        let builder = self
            .request(Method::POST, &path)?
            .json(&ToggleReactionRequest { reaction_type: reaction });
        let data: Option<Value> = self.send(builder, &path).await?;
        // 只有包含计数时才视为完整的权威状态
        Ok(data
            .filter(|v| v.get("counts").is_some() || v.get("reactionCounts").is_some() || v.get("countsByType").is_some())
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    async fn list_events(&self, page: u32, limit: u32) -> Result<Page<Event>> {
        self.get_page("events", &["events"], page, limit).await
    }

    async fn get_event(&self, event_id: &str) -> Result<Event> {
        let path = format!("events/{}", event_id);
        let builder = self.request(Method::GET, &path)?;
        let data: Option<Value> = self.send(builder, &path).await?;

        let value = data.ok_or_else(|| AppError::not_found("Event"))?;
        // 详情接口有时把活动包在 {event: {...}} 中
        let value = match value.get("event") {
            Some(inner) if inner.is_object() => inner.clone(),
            _ => value,
        };
        Ok(serde_json::from_value(value)?)
    }

    async fn register_for_event(&self, event_id: &str) -> Result<Option<Registration>> {
        let path = format!("registrations/events/{}", event_id);
        let builder = self.request(Method::POST, &path)?;
        let data: Option<Value> = self.send(builder, &path).await?;
        Ok(data.and_then(|v| serde_json::from_value(v).ok()))
    }

    async fn cancel_registration(&self, event_id: &str) -> Result<()> {
        let path = format!("registrations/events/{}", event_id);
        let builder = self.request(Method::DELETE, &path)?;
        self.send::<Value>(builder, &path).await?;
        Ok(())
    }

    async fn list_event_registrations(&self, event_id: &str) -> Result<Vec<Registration>> {
        let path = format!("registrations/events/{}", event_id);
        let builder = self.request(Method::GET, &path)?;
        let data: Option<Value> = self.send(builder, &path).await?;

        let page: Page<Registration> =
            Page::from_data(data.unwrap_or(Value::Null), &["registrations"], 1, 0)?;
        Ok(page.items)
    }

    async fn decide_registration(
        &self,
        registration_id: &str,
        decision: ManagerDecision,
    ) -> Result<Option<Registration>> {
        let path = format!("registrations/{}/{}", registration_id, decision.path_segment());
        let mut builder = self.request(Method::PATCH, &path)?;
        if let ManagerDecision::Reject(body) = &decision {
            builder = builder.json(body);
        }
        let data: Option<Value> = self.send(builder, &path).await?;
        Ok(data.and_then(|v| serde_json::from_value(v).ok()))
    }
}
