//! Mount/unmount tracking for screens.
//!
//! A screen owns a `MountScope`; every async continuation it spawns carries a `Liveness`
//! token and checks it before touching screen state or navigating. Dropping the scope
//! (or calling `unmount`) kills all outstanding tokens.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn is_alive(&self) -> bool { self.0.load(Ordering::Acquire) }
}

#[derive(Debug)]
pub struct MountScope {
    alive: Arc<AtomicBool>,
}

impl Default for MountScope {
    fn default() -> Self { Self::new() }
}

impl MountScope {
    pub fn new() -> Self { Self { alive: Arc::new(AtomicBool::new(true)) } }

    pub fn token(&self) -> Liveness { Liveness(self.alive.clone()) }

    pub fn is_mounted(&self) -> bool { self.alive.load(Ordering::Acquire) }

    pub fn unmount(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

impl Drop for MountScope {
    fn drop(&mut self) { self.unmount(); }
}
