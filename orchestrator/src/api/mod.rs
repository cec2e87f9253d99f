pub mod common;
pub mod receivers;
pub mod slackbots;
pub mod webhooks;
