use std::{any::Any, error::Error, fmt};

use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisionStrategy {
    /// Replace the actor with a fresh one from its factory.
    Restart,
    /// Keep the current actor and continue with the next message.
    Resume,
    /// Shut the actor down. Further messages are rejected.
    Stop,
}

pub trait Actor: Send + Sync + 'static {
    /// Called when a handler on the actor panics. The return value represents the
    /// supervision strategy used to handle the panic.
    /// NOTE: If this method panics, the actor can not recover from the panic.
    #[allow(unused_variables)]
    fn on_fail(&mut self, error: Box<dyn Any + Send>) -> SupervisionStrategy {
        SupervisionStrategy::Restart
    }

    /// Called once after the mailbox was closed, right before the actor is dropped.
    fn on_stop(&mut self) {}
}

#[derive(Debug)]
pub enum ActorError {
    /// The actor is not running anymore.
    Stopped,
    /// The mailbox is full. Only returned by non-waiting sends.
    MailboxFull,
    /// The actor dropped the message without answering, most likely because
    /// the handler panicked.
    NoAnswer(oneshot::error::RecvError),
}

impl fmt::Display for ActorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "actor is stopped"),
            Self::MailboxFull => write!(f, "actor mailbox is full"),
            Self::NoAnswer(why) => write!(f, "actor did not answer: {}", why),
        }
    }
}

impl Error for ActorError {}

impl From<oneshot::error::RecvError> for ActorError {
    fn from(why: oneshot::error::RecvError) -> Self {
        Self::NoAnswer(why)
    }
}
