//! Questlog server crate: the HTTP surface over [`questlog_core`].

pub mod api;
