use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::{
    models::{registration::RegistrationStatus, user::UserSummary},
    utils::serde_helpers::flexible_id,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(with = "flexible_id", alias = "_id")]
    pub id: String,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(alias = "start_time", alias = "startTime", alias = "startDate")]
    pub starts_at: DateTime<Utc>,
    #[serde(default, alias = "end_time", alias = "endTime", alias = "endDate")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "maxParticipants", alias = "max_participants")]
    pub capacity: Option<u32>,
    #[serde(default, alias = "currentParticipants", alias = "participantCount")]
    pub registered_count: u32,
    #[serde(default, alias = "manager", alias = "creator")]
    pub organizer: Option<UserSummary>,
    #[serde(default, alias = "registrationStatus", alias = "userRegistrationStatus")]
    pub my_registration_status: Option<RegistrationStatus>,
}

impl Event {
    pub fn is_full(&self) -> bool {
        self.capacity
            .map(|capacity| self.registered_count >= capacity)
            .unwrap_or(false)
    }
}
