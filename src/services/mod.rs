pub mod chat;
pub mod notifier;
pub mod reconciler;
pub mod session;

pub use chat::ChatService;
pub use notifier::{
    ChannelReminderSink, DueTaskNotifier, NotifierHandle, PermissionSource, PermissionState,
    Reminder, ReminderSink, StaticPermission, TracingReminderSink,
};
pub use reconciler::TaskReconciler;
pub use session::{SessionService, SessionState};
