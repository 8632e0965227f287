//! CmisSync Core - Domain model, ports and configuration
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - canonical `SyncEvent`s, `SituationType`, `MappedObject`,
//!   `RemoteObject`, `InteractionDetail` and validated identifiers
//! - **Port definitions** - Traits for adapters: `IMetaDataStorage`,
//!   `IRemoteSession`, `ILocalFileSystem`, `INotificationService`
//! - **Configuration** - the YAML configuration file model
//!
//! # Architecture
//!
//! The domain module contains pure data and validation with no I/O.
//! Ports define trait interfaces that adapter crates implement. The
//! decision engine in `cmisync-sync` drives both.

pub mod config;
pub mod domain;
pub mod ports;
