use std::sync::Arc;

use axum::extract::FromRef;
use deck_collab::Collab;

#[derive(Clone, FromRef)]
pub struct ServerContext {
    pub collab: Arc<Collab>,
}

impl ServerContext {
    pub fn new(collab: Arc<Collab>) -> Self {
        Self { collab }
    }
}
