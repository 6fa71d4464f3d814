pub mod item;
pub mod diff;
pub mod volatility;
pub mod subscription;
pub mod notification;
pub mod tracking;

pub use item::{Category, Item, Snapshot};
pub use diff::{DiffEntry, DiffKind, DiffResult};
pub use volatility::{Direction, Severity, VolatilityEvent};
pub use subscription::Subscription;
pub use notification::{
    DispatchLogEntry, DispatchStatus, IntentItems, NotificationIntent, NotificationRecord,
    NotificationType,
};
pub use tracking::TrackingRecord;
