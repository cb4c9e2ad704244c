pub mod ingest;
pub mod mailer;
pub mod matcher;
pub mod monitor;
pub mod notifier;
pub mod oracle;
