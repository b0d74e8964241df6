use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use futures::{FutureExt, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use super::{ReplayError, ReplayScript, Step};
use crate::{
    StoreError,
    store::{JsonStore, Lifecycle, Listening, Subscription},
};

/// Something observable that happened during a replay.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Event {
    /// The store got its first listener.
    Woke,
    /// The store lost its last listener.
    Slept,
    /// A callback listener received a value.
    Delivered {
        /// Listener name from the script
        listener: String,
        /// The value delivered
        value: Value,
    },
    /// A subscription yielded a value when drained.
    Pulled {
        /// Subscription name from the script
        listener: String,
        /// The value pulled
        value: Value,
    },
    /// An update step changed the store.
    Changed,
    /// An update step left the store as it was.
    Unchanged,
    /// A listener failure was reported.
    Failed {
        /// The reported error
        message: String,
    },
}

/// The ordered record of a replay run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Transcript {
    /// Events in the order they happened.
    pub events: Vec<Event>,
    /// The store's value after the last step.
    pub final_value: Value,
}

impl Transcript {
    /// One line per event, for terminal output.
    pub fn to_text(&self) -> String {
        let mut lines: Vec<String> = self.events.iter().map(describe).collect();
        lines.push(format!("final {}", self.final_value));
        lines.join("\n")
    }

    /// The transcript as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns `ReplayError::Serialize` if rendering fails.
    pub fn to_json(&self) -> Result<String, ReplayError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn describe(event: &Event) -> String {
    match event {
        Event::Woke => "woke".to_string(),
        Event::Slept => "slept".to_string(),
        Event::Delivered { listener, value } => format!("{listener} <- {value}"),
        Event::Pulled { listener, value } => format!("{listener} <~ {value}"),
        Event::Changed => "changed".to_string(),
        Event::Unchanged => "unchanged".to_string(),
        Event::Failed { message } => format!("failed: {message}"),
    }
}

type EventLog = Rc<RefCell<Vec<Event>>>;

struct TranscriptHooks {
    events: EventLog,
}

impl Lifecycle for TranscriptHooks {
    fn wake(&self) {
        self.events.borrow_mut().push(Event::Woke);
    }

    fn sleep(&self) {
        self.events.borrow_mut().push(Event::Slept);
    }

    fn listener_failed(&self, error: &StoreError) {
        warn!(%error, "listener failed during replay");
        self.events.borrow_mut().push(Event::Failed {
            message: error.to_string(),
        });
    }
}

enum Consumer {
    Callback(Listening),
    Stream(Subscription<Map<String, Value>>),
}

/// Runs replay scripts against a fresh [`JsonStore`].
pub struct Replayer {
    store: JsonStore,
    events: EventLog,
    consumers: BTreeMap<String, Consumer>,
}

impl Replayer {
    /// Create a replayer with the script's initial value.
    ///
    /// # Errors
    /// Returns `ReplayError::Store` if the initial value is not an object.
    pub fn new(initial: Value) -> Result<Self, ReplayError> {
        let store = JsonStore::from_json(initial)?;
        let events = EventLog::default();
        store.set_hooks(TranscriptHooks {
            events: Rc::clone(&events),
        });

        Ok(Self {
            store,
            events,
            consumers: BTreeMap::new(),
        })
    }

    /// Run a whole script, flushing once more at the end.
    ///
    /// # Errors
    /// Stops at the first step that fails.
    #[instrument(skip_all, fields(steps = script.steps.len()))]
    pub fn run(script: &ReplayScript) -> Result<Transcript, ReplayError> {
        let mut replayer = Self::new(script.initial.clone())?;
        for step in &script.steps {
            replayer.apply(step)?;
        }
        replayer.flush();

        let transcript = replayer.finish();
        info!(events = transcript.events.len(), "replay finished");
        Ok(transcript)
    }

    /// The store being driven.
    pub fn store(&self) -> &JsonStore {
        &self.store
    }

    /// Run one step.
    ///
    /// # Errors
    /// Returns `ReplayError::UnknownListener` or
    /// `ReplayError::DuplicateListener` for bad names and `ReplayError::Store`
    /// for rejected patches.
    pub fn apply(&mut self, step: &Step) -> Result<(), ReplayError> {
        match step {
            Step::Listen { name } => {
                self.ensure_free(name)?;
                let events = Rc::clone(&self.events);
                let listener = name.clone();
                let listening = self.store.listen(move |value| {
                    events.borrow_mut().push(Event::Delivered {
                        listener: listener.clone(),
                        value: Value::Object(value.clone()),
                    });
                });
                self.consumers
                    .insert(name.clone(), Consumer::Callback(listening));
            }
            Step::Subscribe { name } => {
                self.ensure_free(name)?;
                let subscription = self.store.subscribe();
                self.consumers
                    .insert(name.clone(), Consumer::Stream(subscription));
            }
            Step::Cancel { name } => {
                let consumer = self
                    .consumers
                    .remove(name)
                    .ok_or_else(|| ReplayError::UnknownListener(name.clone()))?;
                match consumer {
                    Consumer::Callback(listening) => listening.cancel(),
                    Consumer::Stream(subscription) => subscription.cancel(),
                }
            }
            Step::Update { patch } => {
                let changed = self.store.update(patch.clone())?;
                let event = if changed {
                    Event::Changed
                } else {
                    Event::Unchanged
                };
                self.events.borrow_mut().push(event);
            }
            Step::Flush => self.flush(),
        }
        Ok(())
    }

    /// Run deferred store work, then drain every subscription of what it has buffered.
    pub fn flush(&mut self) {
        self.store.flush();

        for (name, consumer) in &mut self.consumers {
            let Consumer::Stream(subscription) = consumer else {
                continue;
            };
            while let Some(Some(value)) = subscription.next().now_or_never() {
                self.events.borrow_mut().push(Event::Pulled {
                    listener: name.clone(),
                    value: Value::Object(Map::clone(&value)),
                });
            }
        }
    }

    /// Drop all consumers and return what was recorded.
    pub fn finish(self) -> Transcript {
        let final_value = Value::Object(self.store.get());
        drop(self.consumers);
        let events = self.events.borrow().clone();

        Transcript {
            events,
            final_value,
        }
    }

    fn ensure_free(&self, name: &str) -> Result<(), ReplayError> {
        if self.consumers.contains_key(name) {
            return Err(ReplayError::DuplicateListener(name.to_string()));
        }
        Ok(())
    }
}
