//! Core library for the appauth login flow: session state, OpenID Connect
//! protocol client, and session persistence.

pub mod auth;
pub mod config;
