//! The async `Stream` side of the bridge.

use crate::events::CoreEvent;
use futures_core::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc::Receiver;

pin_project! {
    /// Yields [`CoreEvent`]s as the core's `EventListener` callbacks fire.
    ///
    /// Backed by a bounded `tokio::sync::mpsc` channel rather than a manual
    /// `Notify` + buffer, since `Receiver::poll_recv` already registers the
    /// task's waker with the channel — there is no separate polling safety
    /// net to build here.
    pub struct EventStream {
        #[pin]
        rx: Receiver<CoreEvent>,
    }
}

impl EventStream {
    pub(crate) fn new(rx: Receiver<CoreEvent>) -> Self {
        Self { rx }
    }
}

impl Stream for EventStream {
    type Item = CoreEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().rx.poll_recv(cx)
    }
}
