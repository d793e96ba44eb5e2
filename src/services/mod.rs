pub mod api;
pub mod messages;
pub mod mutation;
pub mod notification;
pub mod reaction;
pub mod registration;

// 重新导出常用类型
pub use api::{BackendApi, HttpBackend, ManagerDecision};
pub use messages::{MessageBus, MessageLevel, MessageLogger, StatusMessage};
pub use mutation::{LocalPatch, MutationController, Settled};
pub use notification::{NotificationFeedSnapshot, NotificationService};
pub use reaction::ReactionService;
pub use registration::RegistrationService;
