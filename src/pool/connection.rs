use std::fmt;
use std::ops::{Deref, DerefMut};

use deadpool::managed::Object;

use super::manager::ConnectionManager;
use crate::connection::Connection;

/// A connection leased from a [`super::MiddlewarePool`].
///
/// The lease has exclusive use of the connection until it is handed back with
/// [`super::MiddlewarePool::release`]. Dropping it also returns the connection; one
/// left disconnected or inside a transaction is discarded rather than reused.
pub struct MiddlewarePoolConnection {
    object: Object<ConnectionManager>,
}

impl MiddlewarePoolConnection {
    pub(crate) fn new(object: Object<ConnectionManager>) -> Self {
        Self { object }
    }

    /// Remove the connection from the pool; its slot becomes free for a new one.
    pub(crate) fn detach(self) -> Connection {
        Object::take(self.object)
    }
}

impl Deref for MiddlewarePoolConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.object
    }
}

impl DerefMut for MiddlewarePoolConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.object
    }
}

impl fmt::Debug for MiddlewarePoolConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MiddlewarePoolConnection")
            .field(&*self.object)
            .finish()
    }
}
