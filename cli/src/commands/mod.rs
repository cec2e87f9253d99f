pub mod dev;
pub mod serve;
pub mod slackbot;
pub mod webhook;
