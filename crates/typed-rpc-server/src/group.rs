//! Method groups
//!
//! A [`Group`] owns no storage. Registering through it prefixes the method
//! name and puts the group's middleware between the global chain and the
//! method's own. Nested groups concatenate prefixes and middleware, so a
//! group of a group behaves like one group with the combined prefix.

use std::sync::Arc;

use crate::middleware::{MiddlewareChain, RpcMiddleware};
use crate::registry::{DynMethod, Registerer};
use crate::server::RpcServer;

#[derive(Clone, Debug)]
pub struct Group {
    server: RpcServer,
    prefix: String,
    middleware: MiddlewareChain,
}

impl Group {
    pub(crate) fn new(server: RpcServer, prefix: String, middleware: MiddlewareChain) -> Self {
        Self {
            server,
            prefix,
            middleware,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Add middleware for methods registered through this group from now on
    pub fn use_middleware(&mut self, middleware: Arc<dyn RpcMiddleware>) {
        self.middleware.push(middleware);
    }

    /// A nested group: `prefix` is appended to this group's prefix and
    /// `middleware` runs inside this group's middleware
    pub fn group<I>(&self, prefix: &str, middleware: I) -> Group
    where
        I: IntoIterator<Item = Arc<dyn RpcMiddleware>>,
    {
        let inner: MiddlewareChain = middleware.into_iter().collect();
        Group {
            server: self.server.clone(),
            prefix: format!("{}{}", self.prefix, prefix),
            middleware: self.middleware.concat(&inner),
        }
    }
}

impl Registerer for Group {
    fn register_method(&self, name: &str, method: Arc<dyn DynMethod>, middleware: MiddlewareChain) {
        let full_name = format!("{}{}", self.prefix, name);
        self.server
            .register_method(&full_name, method, self.middleware.concat(&middleware));
    }
}
