#![doc = "bi-bucket: session brokering and artifact transfer for an analytics platform."]

//! This crate brokers a remote analytics platform's REST sessions behind
//! opaque caller tokens and mirrors workbook/datasource packages into
//! durable object storage.
//!
//! # Usage
//! Wire the concrete collaborators ([`upstream::RestUpstream`],
//! [`blob::S3Sink`], [`session::InMemorySessionStore`]) into a
//! [`service::BridgeService`] and call its operations, or swap any of
//! them through the traits in [`contract`].

pub mod auth;
pub mod blob;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod connections;
pub mod contract;
pub mod error;
pub mod service;
pub mod session;
pub mod transfer;
pub mod upstream;
