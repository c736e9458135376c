//! Shared application state, created once at startup and handed to every
//! handler.

use std::sync::Arc;

use relay_core::adapter::ConversationAdapter;
use relay_core::{ConnectionManager, DestinationRouter};

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub conn: Arc<ConnectionManager>,
    pub router: Arc<DestinationRouter>,
    pub adapter: Arc<dyn ConversationAdapter>,
    pub config: Arc<Config>,
}
