//! # Commands
//!
//! Business logic, one module per operation family. Every command is a plain
//! function generic over [`Executor`](crate::store::Executor) and
//! [`Permissions`]: it reads, checks and writes through the executor it is
//! given and never opens a transaction. The API facade decides the
//! transaction boundaries.
//!
//! Commands return [`CmdResult`]: the typed outcome plus user-facing messages.

use crate::access::Permissions;
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::model::{Caller, Container};

pub mod attach;
pub mod bounds;
pub mod delete;
pub mod helpers;
pub mod ingest;
pub mod list;
pub mod navigate;
pub mod propagate;
pub mod reference;
pub mod review;
pub mod setup;
pub mod update;

/// Who is asking, what they may do, and how the catalog is configured.
pub struct Ctx<'a, P: Permissions> {
    pub permissions: &'a P,
    pub caller: Caller,
    pub config: &'a CatalogConfig,
}

impl<'a, P: Permissions> Ctx<'a, P> {
    pub fn new(permissions: &'a P, caller: Caller, config: &'a CatalogConfig) -> Self {
        Self {
            permissions,
            caller,
            config,
        }
    }

    pub fn can_read(&self, container: Container) -> bool {
        self.permissions.can_read(container, &self.caller)
    }

    pub fn can_write(&self, container: Container) -> bool {
        self.permissions.can_write(container, &self.caller)
    }

    /// Unreadable entities are reported exactly like missing ones.
    pub fn check_read(&self, container: Container, kind: &'static str, id: impl ToString) -> Result<()> {
        if self.can_read(container) {
            Ok(())
        } else {
            Err(CatalogError::not_found(kind, id))
        }
    }

    pub fn check_write(&self, container: Container) -> Result<()> {
        if self.can_write(container) {
            Ok(())
        } else {
            Err(CatalogError::Forbidden(format!(
                "user {} cannot write to {}",
                self.caller.id, container
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdMessage {
    pub level: MessageLevel,
    pub content: String,
}

impl CmdMessage {
    pub fn info(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            content: content.into(),
        }
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Success,
            content: content.into(),
        }
    }

    pub fn warning(content: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CmdResult<T> {
    pub data: T,
    pub messages: Vec<CmdMessage>,
}

impl<T> CmdResult<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            messages: Vec::new(),
        }
    }

    pub fn add_message(&mut self, message: CmdMessage) {
        self.messages.push(message);
    }

    pub fn with_message(mut self, message: CmdMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn into_data(self) -> T {
        self.data
    }
}
