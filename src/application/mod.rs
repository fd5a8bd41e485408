pub mod action_dispatcher;
pub mod bootstrap;
pub mod chat;
pub mod chat_stream;
pub mod commands;
pub mod event_store;
pub mod session;
