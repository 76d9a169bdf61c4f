pub mod advisor;
pub mod manager;
pub mod webhook_sender;

pub use advisor::{DecisionAdvisor, NoOpAdvisor};
pub use manager::NotificationManager;
pub use webhook_sender::{HttpWebhookSender, WebhookSender};
