//! Actor wrapper: serializes every operation against one kernel instance
//! behind a single-consumer mailbox, so a given agent never runs two
//! handlers concurrently while still letting many agents run in parallel.

use std::sync::Arc;

use gagent_primitives::{AgentId, Direction, EventEnvelope};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::error::KernelError;
use crate::handlers::CONFIG_EVENT_TYPE;
use crate::kernel::{ChildForwarder, DispatchOutcome, GAgentKernel, LifecycleHooks};
use crate::lifecycle::AgentState;

/// Default mailbox capacity for a new actor.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

enum Command<S, C> {
    Activate {
        state: Option<S>,
        version: u64,
        config: Option<C>,
        reply: oneshot::Sender<Result<(), KernelError>>,
    },
    Deactivate {
        reply: oneshot::Sender<Result<Option<S>, KernelError>>,
    },
    Publish {
        event_type: String,
        payload: Value,
        direction: Direction,
        reply: oneshot::Sender<Result<EventEnvelope, KernelError>>,
    },
    HandleEvent {
        envelope: EventEnvelope,
        reply: oneshot::Sender<Result<DispatchOutcome, KernelError>>,
    },
    SetParent {
        parent: AgentId,
        reply: oneshot::Sender<()>,
    },
    ClearParent {
        reply: oneshot::Sender<()>,
    },
    AddChild {
        child: AgentId,
        reply: oneshot::Sender<Result<(), KernelError>>,
    },
    RemoveChild {
        child: AgentId,
        reply: oneshot::Sender<()>,
    },
    SetForwarder {
        forwarder: Arc<dyn ChildForwarder>,
        reply: oneshot::Sender<()>,
    },
    LifecycleState {
        reply: oneshot::Sender<AgentState>,
    },
}

/// Errors surfaced by [`ActorHandle`] operations.
#[derive(Debug, Error)]
pub enum ActorError {
    /// The actor's mailbox task has already stopped.
    #[error("actor mailbox closed")]
    MailboxClosed,
    /// The kernel rejected the operation.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

type ActorResult<T> = Result<T, ActorError>;

/// A handle to a running actor. Cloning shares the same mailbox, so every
/// clone still serializes through one task.
#[derive(Clone)]
pub struct ActorHandle<S, C> {
    sender: mpsc::Sender<Command<S, C>>,
}

impl<S, C> ActorHandle<S, C>
where
    S: Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    /// Wraps `kernel` in an actor, spawning its mailbox task with the
    /// given queue capacity.
    #[must_use]
    pub fn spawn(kernel: GAgentKernel<S, C>, mailbox_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(mailbox_capacity.max(1));
        tokio::spawn(run(kernel, receiver));
        Self { sender }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command<S, C>,
    ) -> ActorResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(build(reply_tx))
            .await
            .map_err(|_| ActorError::MailboxClosed)?;
        reply_rx.await.map_err(|_| ActorError::MailboxClosed)
    }

    /// Activates the kernel with already-loaded state/config.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::MailboxClosed`] if the actor has stopped, or
    /// [`ActorError::Kernel`] if activation is not valid from the current
    /// lifecycle state.
    pub async fn activate(
        &self,
        state: Option<S>,
        version: u64,
        config: Option<C>,
    ) -> ActorResult<()> {
        self.call(|reply| Command::Activate {
            state,
            version,
            config,
            reply,
        })
        .await??;
        Ok(())
    }

    /// Deactivates the kernel, returning the final state for the caller
    /// to persist.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::MailboxClosed`] if the actor has stopped, or
    /// [`ActorError::Kernel`] if deactivation is not valid from the
    /// current lifecycle state.
    pub async fn deactivate(&self) -> ActorResult<Option<S>> {
        Ok(self.call(|reply| Command::Deactivate { reply }).await??)
    }

    /// Publishes an event, as [`GAgentKernel::publish`].
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::MailboxClosed`] or propagates [`KernelError`].
    pub async fn publish(
        &self,
        event_type: impl Into<String>,
        payload: Value,
        direction: Direction,
    ) -> ActorResult<EventEnvelope> {
        let event_type = event_type.into();
        Ok(self
            .call(|reply| Command::Publish {
                event_type,
                payload,
                direction,
                reply,
            })
            .await??)
    }

    /// Publishes `payload` under [`CONFIG_EVENT_TYPE`], as
    /// [`GAgentKernel::publish_config`].
    ///
    /// # Errors
    ///
    /// As [`ActorHandle::publish`].
    pub async fn publish_config(&self, payload: Value, direction: Direction) -> ActorResult<EventEnvelope> {
        self.publish(CONFIG_EVENT_TYPE, payload, direction).await
    }

    /// Dispatches an inbound envelope, as
    /// [`GAgentKernel::handle_event_async`].
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::MailboxClosed`] or propagates [`KernelError`].
    pub async fn handle_event_async(&self, envelope: EventEnvelope) -> ActorResult<DispatchOutcome> {
        Ok(self
            .call(|reply| Command::HandleEvent { envelope, reply })
            .await??)
    }

    /// Sets the parent, as [`GAgentKernel::set_parent`].
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::MailboxClosed`] if the actor has stopped.
    pub async fn set_parent(&self, parent: AgentId) -> ActorResult<()> {
        self.call(|reply| Command::SetParent { parent, reply }).await
    }

    /// Clears the parent, as [`GAgentKernel::clear_parent`].
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::MailboxClosed`] if the actor has stopped.
    pub async fn clear_parent(&self) -> ActorResult<()> {
        self.call(|reply| Command::ClearParent { reply }).await
    }

    /// Adds a child, as [`GAgentKernel::add_child`].
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::MailboxClosed`] or propagates [`KernelError`].
    pub async fn add_child(&self, child: AgentId) -> ActorResult<()> {
        Ok(self.call(|reply| Command::AddChild { child, reply }).await??)
    }

    /// Removes a child, as [`GAgentKernel::remove_child`].
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::MailboxClosed`] if the actor has stopped.
    pub async fn remove_child(&self, child: AgentId) -> ActorResult<()> {
        self.call(|reply| Command::RemoveChild { child, reply }).await
    }

    /// Installs the child forwarder.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::MailboxClosed`] if the actor has stopped.
    pub async fn set_forwarder(&self, forwarder: Arc<dyn ChildForwarder>) -> ActorResult<()> {
        self.call(|reply| Command::SetForwarder { forwarder, reply }).await
    }

    /// Returns the current lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns [`ActorError::MailboxClosed`] if the actor has stopped.
    pub async fn lifecycle_state(&self) -> ActorResult<AgentState> {
        self.call(|reply| Command::LifecycleState { reply }).await
    }
}

async fn run<S, C>(mut kernel: GAgentKernel<S, C>, mut receiver: mpsc::Receiver<Command<S, C>>)
where
    S: Clone + Send + Sync + 'static,
    C: Send + Sync + 'static,
{
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Activate {
                state,
                version,
                config,
                reply,
            } => {
                let result = kernel.activate(state, version, config).await;
                let _ = reply.send(result);
            }
            Command::Deactivate { reply } => {
                let result = match kernel.deactivate().await {
                    Ok(()) => Ok(kernel.state_snapshot().await),
                    Err(err) => Err(err),
                };
                let _ = reply.send(result);
            }
            Command::Publish {
                event_type,
                payload,
                direction,
                reply,
            } => {
                let result = kernel.publish(event_type, payload, direction).await;
                let _ = reply.send(result);
            }
            Command::HandleEvent { envelope, reply } => {
                let result = kernel.handle_event_async(&envelope).await;
                let _ = reply.send(result);
            }
            Command::SetParent { parent, reply } => {
                kernel.set_parent(parent);
                let _ = reply.send(());
            }
            Command::ClearParent { reply } => {
                kernel.clear_parent();
                let _ = reply.send(());
            }
            Command::AddChild { child, reply } => {
                let result = kernel.add_child(child);
                let _ = reply.send(result);
            }
            Command::RemoveChild { child, reply } => {
                kernel.remove_child(child);
                let _ = reply.send(());
            }
            Command::SetForwarder { forwarder, reply } => {
                kernel.set_forwarder(forwarder);
                let _ = reply.send(());
            }
            Command::LifecycleState { reply } => {
                let _ = reply.send(kernel.lifecycle_state());
            }
        }
    }
}

/// Convenience re-export so callers can install custom lifecycle hooks
/// before spawning the actor without reaching into [`crate::kernel`].
pub fn hooks<S, C, H>(hooks: H) -> Arc<dyn LifecycleHooks<S, C>>
where
    H: LifecycleHooks<S, C> + 'static,
    S: Send + Sync,
    C: Send + Sync,
{
    Arc::new(hooks)
}
