use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, watch};
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use viewer_core::{ObservableState, SubscriptionGuard};

/// Mirror a capability's state into a `watch` channel.
///
/// The receiver starts at the current snapshot and sees every later one (a
/// slow reader observes only the latest). The channel stays fed until the
/// guard is dropped or the plugin is torn down.
pub fn watch_state<C>(capability: &C) -> (watch::Receiver<Arc<C::State>>, SubscriptionGuard)
where
    C: ObservableState,
{
    let (tx, rx) = watch::channel(capability.state());
    let guard = capability
        .on_state_change(move |next| {
            tx.send_replace(Arc::clone(next));
        })
        .guard();
    (rx, guard)
}

/// Every snapshot published after the call, in order, as a stream.
///
/// The stream ends when the plugin is torn down. Dropping it unsubscribes.
pub fn state_stream<C>(capability: &C) -> StateStream<C::State>
where
    C: ObservableState,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let guard = capability
        .on_state_change(move |next| {
            // The receiver only disappears together with the guard.
            let _ = tx.send(Arc::clone(next));
        })
        .guard();
    StateStream {
        inner: UnboundedReceiverStream::new(rx),
        _subscription: guard,
    }
}

#[derive(Debug)]
pub struct StateStream<S> {
    inner: UnboundedReceiverStream<Arc<S>>,
    _subscription: SubscriptionGuard,
}

impl<S> Stream for StateStream<S> {
    type Item = Arc<S>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
