// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Behaviors
//!
//! A behavior is the dispatch table of an actor kind: message type → handler, plus a
//! distinguished default handler and an optional startup handler. Behaviors are built once and
//! shared by every instance of the kind; the `BehaviorRegistry` resolves the behavior identifier
//! carried on the wire to the statically registered table on each node.
//!

use crate::{
    ActorContext, Error,
    message::DEFAULT_MESSAGE_TYPE,
};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use std::{collections::HashMap, sync::Arc};

/// Handles one message type for an actor kind.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Processes `payload` in the context of the actor. The returned value is the reply of an
    /// ask and is ignored for a tell.
    ///
    /// # Errors
    ///
    /// An error is logged by the mailbox loop and returned to an ask caller; it never stops the
    /// actor.
    ///
    async fn handle(
        &self,
        ctx: &mut ActorContext,
        payload: Value,
    ) -> Result<Value, Error>;
}

/// Called after a handler of the actor failed.
#[async_trait]
pub trait ErrorHandler: Send + Sync + 'static {
    async fn on_error(
        &self,
        ctx: &mut ActorContext,
        message_type: &str,
        error: &Error,
    );
}

/// Dispatch table of an actor kind.
#[derive(Default)]
pub struct Behavior {
    handlers: HashMap<String, Arc<dyn Handler>>,
    default: Option<Arc<dyn Handler>>,
    startup: Option<Arc<dyn Handler>>,
}

impl Behavior {
    pub fn builder() -> BehaviorBuilder {
        BehaviorBuilder {
            behavior: Behavior::default(),
        }
    }

    /// The handler for `message_type`, falling back to the default handler.
    pub fn handler(&self, message_type: &str) -> Option<Arc<dyn Handler>> {
        self.handlers
            .get(message_type)
            .or(self.default.as_ref())
            .cloned()
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Dispatches a user message.
    ///
    /// # Errors
    ///
    /// Returns `Error::MessageProcessing` if neither a handler for `message_type` nor a default
    /// handler exists, otherwise whatever the handler returns.
    ///
    pub async fn dispatch(
        &self,
        message_type: &str,
        ctx: &mut ActorContext,
        payload: Value,
    ) -> Result<Value, Error> {
        let handler = self.handler(message_type).ok_or_else(|| {
            Error::MessageProcessing(format!(
                "The behavior for {} is not defined.",
                message_type
            ))
        })?;
        handler.handle(ctx, payload).await
    }

    /// Runs the startup handler, if any.
    pub async fn startup(
        &self,
        ctx: &mut ActorContext,
        payload: Value,
    ) -> Result<(), Error> {
        if let Some(startup) = self.startup.as_ref() {
            startup.handle(ctx, payload).await?;
        }
        Ok(())
    }
}

/// Builder for `Behavior`.
pub struct BehaviorBuilder {
    behavior: Behavior,
}

impl BehaviorBuilder {
    /// Registers `handler` for `message_type`. Registering the `default` type sets the default
    /// handler.
    pub fn on(mut self, message_type: &str, handler: impl Handler) -> Self {
        if message_type == DEFAULT_MESSAGE_TYPE {
            self.behavior.default = Some(Arc::new(handler));
        } else {
            self.behavior
                .handlers
                .insert(message_type.to_owned(), Arc::new(handler));
        }
        self
    }

    /// Sets the fallback handler for message types without their own entry.
    pub fn default_handler(mut self, handler: impl Handler) -> Self {
        self.behavior.default = Some(Arc::new(handler));
        self
    }

    /// Sets the handler run when an instance is materialized.
    pub fn on_startup(mut self, handler: impl Handler) -> Self {
        self.behavior.startup = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Behavior {
        self.behavior
    }
}

/// Maps behavior and error handler identifiers to their local definitions.
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    behaviors: HashMap<String, Arc<Behavior>>,
    error_handlers: HashMap<String, Arc<dyn ErrorHandler>>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, id: &str, behavior: Behavior) -> Self {
        debug!("Registering behavior {}.", id);
        self.behaviors.insert(id.to_owned(), Arc::new(behavior));
        self
    }

    pub fn register_error_handler(
        mut self,
        id: &str,
        handler: impl ErrorHandler,
    ) -> Self {
        debug!("Registering error handler {}.", id);
        self.error_handlers.insert(id.to_owned(), Arc::new(handler));
        self
    }

    /// Resolves a behavior identifier.
    ///
    /// # Errors
    ///
    /// Returns `Error::ActorCreation` if the identifier is unknown on this node.
    ///
    pub fn behavior(&self, id: &str) -> Result<Arc<Behavior>, Error> {
        self.behaviors.get(id).cloned().ok_or_else(|| {
            Error::ActorCreation(format!("unknown behavior {}", id))
        })
    }

    pub fn error_handler(&self, id: &str) -> Option<Arc<dyn ErrorHandler>> {
        self.error_handlers.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.behaviors.contains_key(id)
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn handle(
            &self,
            _ctx: &mut ActorContext,
            payload: Value,
        ) -> Result<Value, Error> {
            Ok(payload)
        }
    }

    #[test]
    fn test_handler_lookup_falls_back_to_default() {
        let behavior = Behavior::builder().on("echo", Echo).build();
        assert!(behavior.handler("echo").is_some());
        assert!(behavior.handler("other").is_none());

        let behavior = Behavior::builder().default_handler(Echo).build();
        assert!(behavior.has_default());
        assert!(behavior.handler("anything").is_some());

        let behavior = Behavior::builder().on("default", Echo).build();
        assert!(behavior.has_default());
    }

    #[test]
    fn test_registry_resolves_identifiers() {
        let registry = BehaviorRegistry::new()
            .register("echo", Behavior::builder().default_handler(Echo).build());
        assert!(registry.contains("echo"));
        assert!(registry.behavior("echo").is_ok());
        assert!(matches!(
            registry.behavior("missing"),
            Err(Error::ActorCreation(_))
        ));
        assert!(registry.error_handler("missing").is_none());
    }
}
