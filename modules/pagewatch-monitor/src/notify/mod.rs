pub mod backend;
pub mod noop;
pub mod router;
pub mod webhook;

pub use backend::NotifyBackend;
pub use noop::NoopBackend;
pub use router::NotifyRouter;
pub use webhook::WebhookBackend;
