use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, Result},
    models::{
        registration::Transition, Event, PageInfo, Registration, RegistrationAction,
        RegistrationStatus,
    },
    services::{
        api::{BackendApi, ManagerDecision},
        messages::MessageBus,
        mutation::{LocalPatch, MutationController, Settled},
    },
    store::{ResourceStore, StoreChange},
    utils::validation::{validate_entity_id, validate_reject_reason},
};

/// 活动与报名服务
///
/// 报名者的状态缓存按活动 ID 索引；负责人的审核结果不做乐观修改，
/// 成功后重新拉取该活动的报名列表。
pub struct RegistrationService {
    api: Arc<dyn BackendApi>,
    events: Arc<ResourceStore<String, Event>>,
    statuses: Arc<ResourceStore<String, RegistrationStatus>>,
    rosters: Arc<ResourceStore<String, Vec<Registration>>>,
    events_page_info: RwLock<Option<PageInfo>>,
    load_sequence: RwLock<u64>,
    viewer_controller: MutationController<String>,
    manager_controller: MutationController<String>,
    bus: Arc<MessageBus>,
    page_size: u32,
}

impl RegistrationService {
    pub fn new(api: Arc<dyn BackendApi>, bus: Arc<MessageBus>, page_size: u32) -> Self {
        Self {
            api,
            events: Arc::new(ResourceStore::new()),
            statuses: Arc::new(ResourceStore::new()),
            rosters: Arc::new(ResourceStore::new()),
            events_page_info: RwLock::new(None),
            load_sequence: RwLock::new(0),
            viewer_controller: MutationController::new("registrations", bus.clone()),
            manager_controller: MutationController::new("registration-decisions", bus.clone()),
            bus,
            page_size: page_size.max(1),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.page()
    }

    pub fn event(&self, event_id: &str) -> Option<Event> {
        self.events.get(&event_id.to_string())
    }

    pub fn events_page_info(&self) -> Option<PageInfo> {
        *self.events_page_info.read()
    }

    /// 当前用户在该活动上的报名状态；未缓存时视为 `None`
    pub fn status(&self, event_id: &str) -> RegistrationStatus {
        self.statuses
            .get(&event_id.to_string())
            .unwrap_or_default()
    }

    pub fn roster(&self, event_id: &str) -> Option<Vec<Registration>> {
        self.rosters.get(&event_id.to_string())
    }

    pub fn is_mutating(&self, event_id: &str) -> bool {
        self.viewer_controller.is_mutating(&event_id.to_string())
    }

    pub fn is_deciding(&self, registration_id: &str) -> bool {
        self.manager_controller.is_mutating(&registration_id.to_string())
    }

    pub fn subscribe_statuses(&self) -> broadcast::Receiver<StoreChange<String>> {
        self.statuses.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreChange<String>> {
        self.events.subscribe()
    }

    /// 加载活动页，并用活动上携带的报名状态刷新状态缓存
    pub async fn load_events(&self, page: u32) -> Result<Vec<Event>> {
        let page = page.max(1);
        let sequence = {
            let mut seq = self.load_sequence.write();
            *seq += 1;
            *seq
        };

        let loaded = match self.api.list_events(page, self.page_size).await {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!("Failed to load events page {}: {}", page, err);
                self.bus.error("load_events", err.user_message());
                return Err(err);
            }
        };

        if *self.load_sequence.read() != sequence {
            debug!("Discarding stale events page {} (seq {})", page, sequence);
            return Ok(loaded.items);
        }

        for event in &loaded.items {
            self.absorb_status(event);
        }
        self.events.replace_page(
            loaded
                .items
                .iter()
                .map(|e| (e.id.clone(), e.clone()))
                .collect(),
        );
        *self.events_page_info.write() = Some(loaded.info);
        info!("Loaded {} events (page {})", loaded.items.len(), loaded.info.page);

        Ok(loaded.items)
    }

    /// 重新拉取单个活动
    pub async fn refresh_event(&self, event_id: &str) -> Result<Event> {
        validate_entity_id("Event", event_id)?;
        let event = self.api.get_event(event_id).await?;

        self.absorb_status(&event);
        self.events.insert(event.id.clone(), event.clone());
        debug!("Refreshed event {}", event_id);
        Ok(event)
    }

    /// 重新拉取活动的报名列表（负责人视角）
    pub async fn refresh_roster(&self, event_id: &str) -> Result<Vec<Registration>> {
        validate_entity_id("Event", event_id)?;
        let registrations = self.api.list_event_registrations(event_id).await?;

        for registration in &registrations {
            self.manager_controller.supersede(&registration.id);
        }
        self.rosters
            .insert(event_id.to_string(), registrations.clone());
        debug!("Refreshed roster of event {} ({} registrations)", event_id, registrations.len());
        Ok(registrations)
    }

    /// 报名状态转换的统一入口
    pub async fn transition_registration(
        &self,
        event_id: &str,
        action: RegistrationAction,
    ) -> Result<RegistrationStatus> {
        validate_entity_id("Event", event_id)?;

        if action.is_manager_action() {
            self.decide(event_id, action).await
        } else {
            self.viewer_transition(event_id, action).await
        }
    }

    pub async fn register(&self, event_id: &str) -> Result<RegistrationStatus> {
        self.transition_registration(event_id, RegistrationAction::Register).await
    }

    pub async fn cancel(&self, event_id: &str) -> Result<RegistrationStatus> {
        self.transition_registration(event_id, RegistrationAction::Cancel).await
    }

    async fn viewer_transition(
        &self,
        event_id: &str,
        action: RegistrationAction,
    ) -> Result<RegistrationStatus> {
        let key = event_id.to_string();

        let settled = self
            .viewer_controller
            .execute(
                &key,
                action.name(),
                || {
                    let current = self.statuses.get(&key).unwrap_or_default();
                    match current.transition(&action)? {
                        Transition::Unchanged => Ok(LocalPatch::Skipped),
                        Transition::To(next) => {
                            debug!("Event {} registration {} -> {}", key, current, next);
                            self.statuses.insert(key.clone(), next);
                            Ok(LocalPatch::Applied(current))
                        }
                    }
                },
                || async {
                    match action {
                        RegistrationAction::Register => self
                            .api
                            .register_for_event(event_id)
                            .await
                            .map(|registration| registration.map(|r| r.status)),
                        _ => self
                            .api
                            .cancel_registration(event_id)
                            .await
                            .map(|_| Some(RegistrationStatus::None)),
                    }
                },
                |server: Option<RegistrationStatus>| {
                    if let Some(status) = server {
                        self.statuses.insert(key.clone(), status);
                    }
                },
                |before: RegistrationStatus| {
                    self.statuses.insert(key.clone(), before);
                },
            )
            .await?;

        if settled == Settled::Committed {
            let text = match action {
                RegistrationAction::Register => "报名成功，等待审核",
                _ => "已取消报名",
            };
            self.bus.success(action.name(), text);

            // 名额等信息以服务端为准
            if let Err(err) = self.refresh_event(event_id).await {
                warn!("Failed to refresh event {} after {}: {}", event_id, action.name(), err);
            }
        }

        Ok(self.status(event_id))
    }

    async fn decide(&self, event_id: &str, action: RegistrationAction) -> Result<RegistrationStatus> {
        let (registration_id, decision) = match self.decision_for(&action) {
            Ok(parts) => parts,
            Err(err) => {
                self.bus.error(action.name(), err.user_message());
                return Err(err);
            }
        };
        let key = registration_id.clone();
        let outcome: Mutex<Option<RegistrationStatus>> = Mutex::new(None);

        let settled = self
            .manager_controller
            .execute(
                &key,
                action.name(),
                || {
                    let cached = self
                        .roster(event_id)
                        .and_then(|list| list.into_iter().find(|r| r.id == key));
                    if let Some(registration) = cached {
                        if let Transition::To(next) = registration.status.transition(&action)? {
                            *outcome.lock() = Some(next);
                        }
                    }
                    Ok(LocalPatch::<()>::Deferred)
                },
                || self.api.decide_registration(&registration_id, decision),
                |server: Option<Registration>| {
                    if let Some(updated) = server {
                        *outcome.lock() = Some(updated.status);
                        self.rosters.update(&event_id.to_string(), |list| {
                            if let Some(entry) = list.iter_mut().find(|r| r.id == updated.id) {
                                *entry = updated;
                            }
                        });
                    }
                },
                |_| {},
            )
            .await?;

        if settled == Settled::Committed {
            self.bus.success(action.name(), "操作成功");
            if let Err(err) = self.refresh_roster(event_id).await {
                warn!("Failed to refresh roster of event {}: {}", event_id, err);
            }
        }

        let refreshed = self
            .roster(event_id)
            .and_then(|list| list.into_iter().find(|r| r.id == registration_id))
            .map(|r| r.status);

        refreshed
            .or_else(|| *outcome.lock())
            .ok_or_else(|| AppError::not_found("Registration"))
    }

    fn decision_for(&self, action: &RegistrationAction) -> Result<(String, ManagerDecision)> {
        let (registration_id, decision) = match action {
            RegistrationAction::Approve { registration_id } => {
                (registration_id, ManagerDecision::Approve)
            }
            RegistrationAction::Complete { registration_id } => {
                (registration_id, ManagerDecision::Complete)
            }
            RegistrationAction::Reject { registration_id, reason } => {
                (registration_id, ManagerDecision::Reject(validate_reject_reason(reason)?))
            }
            RegistrationAction::Register | RegistrationAction::Cancel => {
                return Err(AppError::internal("viewer action routed to manager decision"))
            }
        };

        validate_entity_id("Registration", registration_id)?;
        Ok((registration_id.clone(), decision))
    }

    fn absorb_status(&self, event: &Event) {
        if let Some(status) = event.my_registration_status {
            self.viewer_controller.supersede(&event.id);
            self.statuses.insert(event.id.clone(), status);
        }
    }
}
