//! Handle slots shared between the guard, monitor, and controller

use crate::role::{Lifecycle, Role, Side};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Everything protected by the manager's reader/writer lock
///
/// Role and both handles live under one lock so a reader never observes a
/// role that disagrees with the installed handles.
pub(crate) struct Slots<H> {
    pub primary: Option<Arc<H>>,
    pub replica: Option<Arc<H>>,
    pub role: Role,
    pub lifecycle: Lifecycle,
}

impl<H> Slots<H> {
    pub fn new() -> Self {
        Self {
            primary: None,
            replica: None,
            role: Role::PrimaryActive,
            lifecycle: Lifecycle::Idle,
        }
    }

    pub fn get(&self, side: Side) -> Option<Arc<H>> {
        match side {
            Side::Primary => self.primary.clone(),
            Side::Replica => self.replica.clone(),
        }
    }

    pub fn slot_mut(&mut self, side: Side) -> &mut Option<Arc<H>> {
        match side {
            Side::Primary => &mut self.primary,
            Side::Replica => &mut self.replica,
        }
    }
}

pub(crate) type SharedSlots<H> = Arc<RwLock<Slots<H>>>;
