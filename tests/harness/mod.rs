//! In-process broadcast targets for assessment tests.
//!
//! A [`Hub`] plays the part of the server under assessment: it ticks on a
//! fixed interval and pushes coordinates to every upgraded connection, and
//! answers plain `GET /` with a static page. [`BroadcastServer`] puts a hub
//! behind a TCP listener; [`PipeDialer`] hands probes in-memory streams to
//! the same hub so runs can use paused time.

#![allow(dead_code)]

mod pipe;
mod server;

pub use pipe::PipeDialer;
pub use server::{BroadcastServer, Behavior, Feed, Hub, DEFAULT_PAGE};
