//! File d'événements moteur, un seul consommateur par vue.
//!
//! Renderer threads post native signals through cloned [`EventSender`]s; the
//! owning view drains them in FIFO order on its consumption context
//! (`EngineView::pump_events`). Two navigations on the same view therefore
//! never interleave their state transitions.

use std::sync::mpsc::{self, Receiver, Sender};

use tracing::debug;

/// Côté émetteur, clonable et utilisable depuis n'importe quel thread.
#[derive(Debug)]
pub struct EventSender<E> {
    tx: Sender<E>,
}

impl<E> Clone for EventSender<E> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<E> EventSender<E> {
    /// Poste un événement. Renvoie `false` si la vue a été détruite.
    pub fn send(&self, event: E) -> bool {
        if self.tx.send(event).is_err() {
            debug!("Event dropped, view already destroyed");
            return false;
        }
        true
    }
}

/// Côté consommateur, possédé par la vue.
#[derive(Debug)]
pub struct EventQueue<E> {
    rx: Receiver<E>,
    tx: Sender<E>,
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { rx, tx }
    }

    pub fn sender(&self) -> EventSender<E> {
        EventSender { tx: self.tx.clone() }
    }

    /// Prochain événement en attente, sans bloquer.
    pub fn try_next(&self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}
