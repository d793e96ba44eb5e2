pub mod event;
pub mod notification;
pub mod post;
pub mod reaction;
pub mod registration;
pub mod response;
pub mod user;

// 重新导出常用类型
pub use event::Event;
pub use notification::{FeedStatus, Notification, NotificationType};
pub use post::Post;
pub use reaction::{ReactionState, ReactionSummary, ReactionType};
pub use registration::{Registration, RegistrationAction, RegistrationStatus};
pub use response::{ApiResponse, Page, PageInfo};
pub use user::UserSummary;
