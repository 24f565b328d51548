// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Messages
//!
//! Messages are what sits in an actor's mailbox: a message kind, a JSON payload and, for
//! ask-style requests only, the channel the reply goes back on.
//!

use crate::{Error, HostId};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

/// Type of the startup system message.
pub const STARTUP_MESSAGE_TYPE: &str = "ferry:startup";
/// Type of the transfer system message.
pub const TRANSFER_MESSAGE_TYPE: &str = "ferry:transfer";
/// Type of the system message telling a parent that a child moved.
pub const CHILD_MOVED_MESSAGE_TYPE: &str = "ferry:child-moved";
/// Type of the system message telling a parent that a child is gone.
pub const CHILD_REMOVED_MESSAGE_TYPE: &str = "ferry:child-removed";
/// Message type used when the sender does not name one.
pub const DEFAULT_MESSAGE_TYPE: &str = "default";

/// Kind of a message. System kinds are reserved and never reach user handlers, except
/// `Startup` which a behavior may choose to handle.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Startup,
    Transfer,
    ChildMoved,
    ChildRemoved,
    User(String),
}

impl MessageKind {
    pub fn parse(message_type: &str) -> Self {
        match message_type {
            STARTUP_MESSAGE_TYPE => MessageKind::Startup,
            TRANSFER_MESSAGE_TYPE => MessageKind::Transfer,
            CHILD_MOVED_MESSAGE_TYPE => MessageKind::ChildMoved,
            CHILD_REMOVED_MESSAGE_TYPE => MessageKind::ChildRemoved,
            other => MessageKind::User(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Startup => STARTUP_MESSAGE_TYPE,
            MessageKind::Transfer => TRANSFER_MESSAGE_TYPE,
            MessageKind::ChildMoved => CHILD_MOVED_MESSAGE_TYPE,
            MessageKind::ChildRemoved => CHILD_REMOVED_MESSAGE_TYPE,
            MessageKind::User(message_type) => message_type,
        }
    }

    pub fn is_system(&self) -> bool {
        !matches!(self, MessageKind::User(_))
    }
}

impl From<&str> for MessageKind {
    fn from(message_type: &str) -> Self {
        MessageKind::parse(message_type)
    }
}

/// Tell (fire-and-forget) or ask (request/response).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    Tell,
    Ask,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Tell => "tell",
            ActionType::Ask => "ask",
        }
    }
}

/// Reply channel of an ask.
pub type Reply = oneshot::Sender<Result<Value, Error>>;

/// A mailbox entry.
#[derive(Debug)]
pub struct Message {
    kind: MessageKind,
    payload: Value,
    reply: Option<Reply>,
}

impl Message {
    /// Creates a tell-style message.
    pub fn new(kind: MessageKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            reply: None,
        }
    }

    /// Creates an ask-style message carrying its reply channel.
    pub fn with_reply(kind: MessageKind, payload: Value, reply: Reply) -> Self {
        Self {
            kind,
            payload,
            reply: Some(reply),
        }
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn is_ask(&self) -> bool {
        self.reply.is_some()
    }

    /// Splits the message into its parts.
    pub fn into_parts(self) -> (MessageKind, Value, Option<Reply>) {
        (self.kind, self.payload, self.reply)
    }
}

/// Payload of the transfer system message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub target: HostId,
}

/// Payload of the child-removed system message. The link is only dropped while it still
/// points at `host`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChildRemoved {
    pub name: String,
    pub host: HostId,
}
