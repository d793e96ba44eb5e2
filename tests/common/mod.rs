#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};
use tokio::sync::Semaphore;

use rainbow_volunteer::{
    error::{AppError, Result},
    models::{
        Event, Notification, NotificationType, Page, PageInfo, Post, ReactionState, ReactionSummary,
        ReactionType, Registration, RegistrationStatus,
    },
    services::{BackendApi, ManagerDecision, MessageBus},
    ClientState, Config,
};

/// 内存后端：按操作名排队失败，按需用闸门挂起指定操作
pub struct FakeBackend {
    pub notifications: Mutex<Vec<Notification>>,
    pub unread: Mutex<u64>,
    pub posts: Mutex<Vec<Post>>,
    pub events: Mutex<Vec<Event>>,
    pub rosters: Mutex<HashMap<String, Vec<Registration>>>,
    pub reaction_summaries: Mutex<VecDeque<ReactionSummary>>,
    pub calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, VecDeque<AppError>>>,
    held: Mutex<HashSet<&'static str>>,
    gate: Semaphore,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            notifications: Mutex::new(Vec::new()),
            unread: Mutex::new(0),
            posts: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            rosters: Mutex::new(HashMap::new()),
            reaction_summaries: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            held: Mutex::new(HashSet::new()),
            gate: Semaphore::new(0),
        })
    }

    pub fn fail_next(&self, operation: &'static str, err: AppError) {
        self.failures
            .lock()
            .entry(operation)
            .or_default()
            .push_back(err);
    }

    /// 之后的该类请求挂起，直到 `release`
    pub fn hold(&self, operation: &'static str) {
        self.held.lock().insert(operation);
    }

    pub fn hold_reactions(&self) {
        self.hold("toggle_reaction");
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == operation).count()
    }

    async fn pass_gate(&self, operation: &'static str) {
        let held = self.held.lock().contains(operation);
        if held {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn record(&self, operation: &'static str) -> Result<()> {
        self.calls.lock().push(operation.to_string());
        match self.failures.lock().get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn page_of<T: Clone>(items: &[T], page: u32, limit: u32) -> Page<T> {
        let start = ((page.max(1) - 1) * limit) as usize;
        Page {
            items: items.iter().skip(start).take(limit as usize).cloned().collect(),
            info: PageInfo::new(page, limit, items.len() as u64),
        }
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn list_notifications(&self, page: u32, limit: u32) -> Result<Page<Notification>> {
        self.record("list_notifications")?;
        Ok(Self::page_of(&self.notifications.lock(), page, limit))
    }

    async fn unread_count(&self) -> Result<u64> {
        self.record("unread_count")?;
        Ok(*self.unread.lock())
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<Option<Notification>> {
        self.pass_gate("mark_notification_read").await;
        self.record("mark_notification_read")?;
        let mut list = self.notifications.lock();
        if let Some(n) = list.iter_mut().find(|n| n.id == notification_id) {
            if !n.is_read {
                n.is_read = true;
                let mut unread = self.unread.lock();
                *unread = unread.saturating_sub(1);
            }
        }
        Ok(None)
    }

    async fn mark_all_notifications_read(&self) -> Result<()> {
        self.record("mark_all_notifications_read")?;
        self.notifications.lock().iter_mut().for_each(|n| n.is_read = true);
        *self.unread.lock() = 0;
        Ok(())
    }

    async fn delete_notification(&self, notification_id: &str) -> Result<()> {
        self.record("delete_notification")?;
        self.notifications.lock().retain(|n| n.id != notification_id);
        Ok(())
    }

    async fn list_posts(&self, page: u32, limit: u32) -> Result<Page<Post>> {
        self.record("list_posts")?;
        Ok(Self::page_of(&self.posts.lock(), page, limit))
    }

    async fn toggle_reaction(&self, _post_id: &str, _reaction: ReactionType) -> Result<Option<ReactionSummary>> {
        self.pass_gate("toggle_reaction").await;
        self.record("toggle_reaction")?;
        Ok(self.reaction_summaries.lock().pop_front())
    }

    async fn list_events(&self, page: u32, limit: u32) -> Result<Page<Event>> {
        self.record("list_events")?;
        Ok(Self::page_of(&self.events.lock(), page, limit))
    }

    async fn get_event(&self, event_id: &str) -> Result<Event> {
        self.record("get_event")?;
        self.events
            .lock()
            .iter()
            .find(|e| e.id == event_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Event"))
    }

    async fn register_for_event(&self, event_id: &str) -> Result<Option<Registration>> {
        self.record("register_for_event")?;
        let mut events = self.events.lock();
        if let Some(event) = events.iter_mut().find(|e| e.id == event_id) {
            event.registered_count += 1;
            event.my_registration_status = Some(RegistrationStatus::Pending);
        }
        Ok(Some(registration("r-new", event_id, RegistrationStatus::Pending)))
    }

    async fn cancel_registration(&self, event_id: &str) -> Result<()> {
        self.record("cancel_registration")?;
        let mut events = self.events.lock();
        if let Some(event) = events.iter_mut().find(|e| e.id == event_id) {
            event.registered_count = event.registered_count.saturating_sub(1);
            event.my_registration_status = Some(RegistrationStatus::None);
        }
        Ok(())
    }

    async fn list_event_registrations(&self, event_id: &str) -> Result<Vec<Registration>> {
        self.record("list_event_registrations")?;
        Ok(self.rosters.lock().get(event_id).cloned().unwrap_or_default())
    }

    async fn decide_registration(
        &self,
        registration_id: &str,
        decision: ManagerDecision,
    ) -> Result<Option<Registration>> {
        self.record("decide_registration")?;
        let next = match decision {
            ManagerDecision::Approve => RegistrationStatus::Approved,
            ManagerDecision::Reject(_) => RegistrationStatus::Rejected,
            ManagerDecision::Complete => RegistrationStatus::Completed,
        };
        let mut rosters = self.rosters.lock();
        for list in rosters.values_mut() {
            if let Some(entry) = list.iter_mut().find(|r| r.id == registration_id) {
                entry.status = next;
                if let ManagerDecision::Reject(body) = &decision {
                    entry.reason = Some(body.reason.clone());
                }
            }
        }
        Ok(None)
    }
}

pub fn notification(id: &str, is_read: bool) -> Notification {
    Notification {
        id: id.to_string(),
        notification_type: NotificationType::RegistrationApproved,
        payload: serde_json::Value::Null,
        is_read,
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
    }
}

pub fn post(id: &str, reactions: ReactionState) -> Post {
    Post {
        id: id.to_string(),
        author: None,
        content: "Saturday food bank shift".to_string(),
        comment_count: 0,
        reactions,
        created_at: Utc.with_ymd_and_hms(2024, 5, 2, 18, 30, 0).unwrap(),
    }
}

pub fn event(id: &str, status: Option<RegistrationStatus>) -> Event {
    Event {
        id: id.to_string(),
        title: "River cleanup".to_string(),
        description: None,
        location: Some("East bank".to_string()),
        starts_at: Utc.with_ymd_and_hms(2024, 6, 8, 8, 0, 0).unwrap(),
        ends_at: None,
        capacity: Some(20),
        registered_count: 5,
        organizer: None,
        my_registration_status: status,
    }
}

pub fn registration(id: &str, event_id: &str, status: RegistrationStatus) -> Registration {
    Registration {
        id: id.to_string(),
        event_id: event_id.to_string(),
        user: None,
        status,
        reason: None,
        registered_at: None,
    }
}

pub fn state_with(api: Arc<FakeBackend>) -> (ClientState, Arc<MessageBus>) {
    let bus = Arc::new(MessageBus::new(32));
    let state = ClientState::with_api(Config::default(), api, bus.clone());
    (state, bus)
}
