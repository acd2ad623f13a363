use std::sync::Arc;

use crate::application::{groups::GroupService, repos::HealthRepo};
use crate::cache::CacheState;

#[derive(Clone)]
pub struct AdminState {
    pub health: Arc<dyn HealthRepo>,
    pub groups: Arc<GroupService>,
    pub cache: Option<CacheState>,
}
