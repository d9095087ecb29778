//! Services
//!
//! Analysis session management and the pieces it is built from.

pub mod hub;
pub mod recovery;
pub mod session;
pub mod transport;
pub mod views;

pub use hub::{SessionUpdate, SubscriberHub, Subscription};
pub use recovery::{NotificationManager, Notifier, RecoveryAction, RecoveryPrompt, StatusNotice};
pub use session::{AnalysisSessionManager, StartOutcome, StopOutcome};
pub use transport::{AnalysisTransport, EventStream, HistorianApiClient, HttpTransport};
pub use views::{StatusBarItem, StatusBarView, StatusIcon};
