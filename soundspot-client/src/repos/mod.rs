//! Repositories mirror server collections in memory and keep the mirrors consistent
//! with every mutation made through them.
//!
//! Fetches replace a mirror wholesale. Mutations apply their result to every mirror that can
//! hold the entity, following the policy documented on each operation.

mod audio_items;
mod favorites;
mod payments;
mod soundspots;
mod subscriptions;

pub use audio_items::*;
pub use favorites::*;
pub use payments::*;
pub use soundspots::*;
pub use subscriptions::*;

use std::{future::Future, sync::Arc};

use crossbeam::atomic::AtomicCell;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

use crate::{ClientError, ClientResult, Identified, SessionStore};

/// The loading flag, last error, and cancellation shared by all operations of a repository
pub struct Tracker {
    in_flight: AtomicCell<usize>,
    error: Mutex<Option<String>>,
    root: CancellationToken,
    cancel: Mutex<CancellationToken>,
}

/// Counts an operation as in flight for as long as it lives
struct InFlight<'a>(&'a AtomicCell<usize>);

impl<'a> InFlight<'a> {
    fn new(counter: &'a AtomicCell<usize>) -> Self {
        counter.fetch_add(1);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1);
    }
}

impl Tracker {
    pub fn new(root: &CancellationToken) -> Self {
        Self {
            in_flight: AtomicCell::new(0),
            error: Default::default(),
            root: root.clone(),
            cancel: Mutex::new(root.child_token()),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load() > 0
    }

    /// The message of the last failed operation, kept until the next attempt starts
    pub fn error(&self) -> Option<String> {
        self.error.lock().clone()
    }

    pub fn clear_error(&self) {
        self.error.lock().take();
    }

    /// Cancels everything in flight. Later operations run normally.
    pub fn detach(&self) {
        let mut cancel = self.cancel.lock();
        cancel.cancel();
        *cancel = self.root.child_token();
    }

    /// Runs an operation, racing it against cancellation.
    ///
    /// A cancelled operation yields [ClientError::Cancelled] and leaves the error untouched, so
    /// callers must only touch mirrors after this returns successfully.
    pub async fn run<T, F>(&self, operation: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        let cancel = self.cancel.lock().clone();

        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let _in_flight = InFlight::new(&self.in_flight);
        self.clear_error();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = operation => result,
        };

        match &result {
            Err(ClientError::Cancelled) => {}
            Err(e) => *self.error.lock() = Some(e.to_string()),
            Ok(_) => {}
        }

        result
    }

    /// Records a failure that happened before any request was made
    pub(crate) fn reject<T>(&self, error: ClientError) -> ClientResult<T> {
        *self.error.lock() = Some(error.to_string());
        Err(error)
    }
}

/// An in-memory copy of a server collection
pub struct Mirror<T> {
    items: RwLock<Vec<T>>,
    owner: Option<Owner>,
}

/// The regular session a user-scoped mirror was filled under
struct Owner {
    session: Arc<SessionStore>,
    generation: AtomicCell<u64>,
}

impl<T> Default for Mirror<T> {
    fn default() -> Self {
        Self {
            items: Default::default(),
            owner: None,
        }
    }
}

impl<T> Mirror<T> {
    /// A mirror of data private to the logged in user.
    /// It empties itself as soon as the regular session ends or changes hands.
    pub fn user_scoped(session: &Arc<SessionStore>) -> Self {
        Self {
            items: Default::default(),
            owner: Some(Owner {
                generation: AtomicCell::new(session.user_generation()),
                session: session.clone(),
            }),
        }
    }

    /// The session generation this mirror accepts data from
    pub(crate) fn generation(&self) -> u64 {
        self.owner
            .as_ref()
            .map(|o| o.session.user_generation())
            .unwrap_or_default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        if self.is_stale() {
            self.items.write().clear();
        }

        self.items.read()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        let mut items = self.items.write();

        if self.is_stale() {
            items.clear();
        }

        items
    }

    /// True once for every change of the owning session
    fn is_stale(&self) -> bool {
        match &self.owner {
            Some(owner) => {
                let current = owner.session.user_generation();
                owner.generation.swap(current) != current
            }
            None => false,
        }
    }
}

impl<T> Mirror<T>
where
    T: Identified + Clone,
{
    pub fn snapshot(&self) -> Vec<T> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        self.read().iter().find(|i| i.id() == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().iter().any(|i| i.id() == id)
    }

    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.read().iter().find(|i| predicate(i)).cloned()
    }

    pub(crate) fn replace(&self, items: Vec<T>) {
        *self.write() = items;
    }

    /// Replaces the contents with a fetch result, unless the session it was fetched under
    /// has ended since
    pub(crate) fn replace_from(&self, generation: u64, items: Vec<T>) -> bool {
        let mut current = self.write();

        if generation != self.generation() {
            return false;
        }

        *current = items;
        true
    }

    /// Puts an item first, dropping any older copy
    pub(crate) fn prepend(&self, item: T) {
        let mut items = self.write();
        items.retain(|i| i.id() != item.id());
        items.insert(0, item);
    }

    /// Puts an item last, dropping any older copy
    pub(crate) fn append(&self, item: T) {
        let mut items = self.write();
        items.retain(|i| i.id() != item.id());
        items.push(item);
    }

    /// Removes an item, returning where it was so it can be restored
    pub(crate) fn remove(&self, id: &str) -> Option<(usize, T)> {
        let mut items = self.write();
        let index = items.iter().position(|i| i.id() == id)?;

        Some((index, items.remove(index)))
    }

    pub(crate) fn restore(&self, index: usize, item: T) {
        let mut items = self.write();

        if items.iter().any(|i| i.id() == item.id()) {
            return;
        }

        let index = index.min(items.len());
        items.insert(index, item);
    }

    /// Replaces the copy with the same id, if there is one
    pub(crate) fn replace_item(&self, item: &T) -> bool {
        let mut items = self.write();

        match items.iter_mut().find(|i| i.id() == item.id()) {
            Some(existing) => {
                *existing = item.clone();
                true
            }
            None => false,
        }
    }

    /// Mutates every item matching the id in place
    pub(crate) fn update(&self, id: &str, mut f: impl FnMut(&mut T)) {
        self.write()
            .iter_mut()
            .filter(|i| i.id() == id)
            .for_each(|i| f(i));
    }

    /// Mutates every item in place
    pub(crate) fn update_all(&self, f: impl FnMut(&mut T)) {
        self.write().iter_mut().for_each(f);
    }
}
