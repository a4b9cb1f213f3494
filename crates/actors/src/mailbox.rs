use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{actor::ActorError, handler::MessageHandler, Actor};

pub type Envelope<A> = Box<dyn MessageHandler<A>>;

pub struct Mailbox<A: Actor>(mpsc::Sender<Envelope<A>>);

impl<A: Actor> Clone for Mailbox<A> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<A: Actor> Mailbox<A> {
    /// Waits for room in the mailbox.
    pub async fn send<M>(&self, message: M) -> Result<(), ActorError>
    where
        M: MessageHandler<A> + 'static,
    {
        self.0
            .send(Box::new(message))
            .await
            .map_err(|_| ActorError::Stopped)
    }

    /// Fails instead of waiting if the mailbox is full.
    pub fn try_send<M>(&self, message: M) -> Result<(), ActorError>
    where
        M: MessageHandler<A> + 'static,
    {
        self.0.try_send(Box::new(message)).map_err(|why| match why {
            TrySendError::Full(_) => ActorError::MailboxFull,
            TrySendError::Closed(_) => ActorError::Stopped,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

pub struct MailboxReceiver<A: Actor>(mpsc::Receiver<Envelope<A>>);

impl<A: Actor> MailboxReceiver<A> {
    pub async fn recv(&mut self) -> Option<Envelope<A>> {
        self.0.recv().await
    }

    pub fn close(&mut self) {
        self.0.close()
    }
}

pub fn bounded_mailbox<A>(buffer: usize) -> (Mailbox<A>, MailboxReceiver<A>)
where
    A: Actor,
{
    let (tx, rx) = mpsc::channel(buffer);
    (Mailbox(tx), MailboxReceiver(rx))
}
