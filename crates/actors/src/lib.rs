use std::panic::AssertUnwindSafe;

use actor::{Actor, SupervisionStrategy};
use actor_ref::ActorRef;
use futures::FutureExt;
use mailbox::bounded_mailbox;

pub mod actor;
pub mod actor_ref;
pub mod handler;
pub mod mailbox;

pub const DEFAULT_MAILBOX_SIZE: usize = 32;

/// Spawns the actor built by `actor_factory`. After a panic `Actor::on_fail()`
/// decides whether it is rebuilt, resumed or stopped.
/// The actor stops once every `ActorRef` to it has been dropped.
pub fn run<A, F>(actor_factory: F) -> ActorRef<A>
where
    A: Actor,
    F: 'static + Send + Fn() -> A,
{
    run_with_capacity(DEFAULT_MAILBOX_SIZE, actor_factory)
}

pub fn run_with_capacity<A, F>(capacity: usize, actor_factory: F) -> ActorRef<A>
where
    A: Actor,
    F: 'static + Send + Fn() -> A,
{
    let (tx, mut rx) = bounded_mailbox(capacity);
    let mut actor = actor_factory();
    let actor_ref = ActorRef::new(tx);

    tokio::spawn(async move {
        while let Some(mut message) = rx.recv().await {
            let result = AssertUnwindSafe(message.handle(&mut actor))
                .catch_unwind()
                .await;
            // handler paniced?
            if let Err(why) = result {
                log::error!("actor paniced: {:?}", why);
                match actor.on_fail(why) {
                    SupervisionStrategy::Restart => {
                        actor = actor_factory();
                    }
                    SupervisionStrategy::Resume => {}
                    SupervisionStrategy::Stop => {
                        rx.close();
                        break;
                    }
                };
            }
        }
        actor.on_stop();
    });

    actor_ref
}

/// Run an actor without supervision. A panicking handler takes the actor down.
pub fn run_unsupervised<A: Actor>(mut actor: A) -> ActorRef<A> {
    let (tx, mut rx) = bounded_mailbox(DEFAULT_MAILBOX_SIZE);
    let actor_ref = ActorRef::new(tx);

    tokio::spawn(async move {
        while let Some(mut message) = rx.recv().await {
            message.handle(&mut actor).await;
        }
        actor.on_stop();
    });

    actor_ref
}
