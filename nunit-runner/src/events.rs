// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fan-out of engine records to independent consumers.
//!
//! The engine produces one record per lifecycle transition. Each record is
//! parsed once and handed, in arrival order, to every subscriber. Subscribers
//! own their state: the TeamCity flow tracker, the IDE execution listener and
//! the console label writer never share anything but the record itself.

use crate::{errors::WriteEventError, xml::XmlNode};
use tracing::debug;

/// A consumer of engine records.
pub trait TestEventSubscriber {
    /// Handles one record.
    ///
    /// Records arrive in the order the engine emitted them.
    fn on_event(&mut self, event: &XmlNode) -> Result<(), WriteEventError>;
}

impl<T: TestEventSubscriber + ?Sized> TestEventSubscriber for &mut T {
    fn on_event(&mut self, event: &XmlNode) -> Result<(), WriteEventError> {
        (**self).on_event(event)
    }
}

/// Delivers each record to every registered subscriber.
#[derive(Default)]
pub struct EventBroadcaster<'a> {
    subscribers: Vec<Box<dyn TestEventSubscriber + 'a>>,
}

impl<'a> EventBroadcaster<'a> {
    /// Creates a broadcaster with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber. Subscribers see each record in the order they were added.
    pub fn add(&mut self, subscriber: impl TestEventSubscriber + 'a) -> &mut Self {
        self.subscribers.push(Box::new(subscriber));
        self
    }

    /// Returns the number of subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns true if there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Parses a raw record and delivers it.
    ///
    /// Malformed records are skipped.
    pub fn handle_record(&mut self, record: &str) -> Result<(), WriteEventError> {
        match XmlNode::parse(record) {
            Ok(event) => self.broadcast(&event),
            Err(error) => {
                debug!("skipping malformed engine record ({error}): {record}");
                Ok(())
            }
        }
    }

    /// Delivers a parsed record to every subscriber, stopping at the first error.
    pub fn broadcast(&mut self, event: &XmlNode) -> Result<(), WriteEventError> {
        for subscriber in &mut self.subscribers {
            subscriber.on_event(event)?;
        }
        Ok(())
    }
}
