//! Per-page annotation store with change notification
//!
//! Holds the ordered annotation sequence of the active page. Insertion order
//! is render order: later objects draw on top. Observers are called
//! synchronously after every effective mutation.

use crate::annotation::{Annotation, AnnotationId, AnnotationPatch};
use std::fmt;

/// What changed in the store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Appended(AnnotationId),
    Updated(AnnotationId),
    Removed(AnnotationId),
    Cleared,
    Replaced { count: usize },
}

/// Handle returned by [`AnnotationStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&StoreEvent, &[Annotation])>;

/// Ordered annotation collection for one page
#[derive(Default)]
pub struct AnnotationStore {
    page_number: u32,
    objects: Vec<Annotation>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl fmt::Debug for AnnotationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationStore")
            .field("page_number", &self.page_number)
            .field("objects", &self.objects)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl AnnotationStore {
    /// Create an empty store for a 1-based page number
    pub fn new(page_number: u32) -> Self {
        Self { page_number, ..Self::default() }
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn objects(&self) -> &[Annotation] {
        &self.objects
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.objects.iter().find(|object| object.id() == id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Register an observer; it sees the event and the store contents after it
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent, &[Annotation]) + 'static,
    {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns `true` if the subscription existed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    pub fn append(&mut self, object: Annotation) -> AnnotationId {
        let id = object.id();
        self.objects.push(object);
        self.notify(StoreEvent::Appended(id));
        id
    }

    /// Merge a patch into the object with `id`
    ///
    /// Unknown ids are tolerated: the target may already have been erased.
    /// Returns `true` if an object changed.
    pub fn update(&mut self, id: AnnotationId, patch: AnnotationPatch) -> bool {
        let Some(object) = self.objects.iter_mut().find(|object| object.id() == id) else {
            return false;
        };

        if !object.apply(patch) {
            return false;
        }

        self.notify(StoreEvent::Updated(id));
        true
    }

    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let index = self.objects.iter().position(|object| object.id() == id)?;
        let removed = self.objects.remove(index);
        self.notify(StoreEvent::Removed(id));
        Some(removed)
    }

    pub fn remove_all(&mut self) {
        if self.objects.is_empty() {
            return;
        }
        self.objects.clear();
        self.notify(StoreEvent::Cleared);
    }

    pub fn replace_all(&mut self, objects: Vec<Annotation>) {
        let count = objects.len();
        self.objects = objects;
        self.notify(StoreEvent::Replaced { count });
    }

    fn notify(&mut self, event: StoreEvent) {
        let objects = &self.objects;
        for (_, observer) in self.observers.iter_mut() {
            observer(&event, objects);
        }
    }
}
