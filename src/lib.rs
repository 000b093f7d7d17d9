//! A client library for a Scratch project's cloud variables: a
//! real-time transport fan with quorum echo suppression, a polled
//! change-log path that carries setter identity, and a single
//! arbitrator deciding which of the two feeds a given variable name
//! listens on.
//!
//! See [`CloudClient`] for the public entry point.

mod changelog;
mod client;
mod config;
mod event;
mod fan;
mod login;
mod poller;
mod state;
mod subscribe;
mod supervisor;
mod transport;
mod wire;

pub use client::CloudClient;
pub use config::ClientConfig;
pub use event::{Source, VariableChanged};
pub use subscribe::{Callback, SubscriptionHandle};
