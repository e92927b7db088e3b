use crossbeam_channel::{Receiver, Sender, bounded};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::GeometryEngine;

/// Bounded pool of [`GeometryEngine`]s.
///
/// Engines are created lazily up to `capacity`; once all of them are lent out
/// `checkout` blocks until one is returned.
#[derive(Debug)]
pub struct EnginePool {
    idle_tx: Sender<GeometryEngine>,
    idle_rx: Receiver<GeometryEngine>,
    created: AtomicUsize,
    capacity: usize,
}

impl EnginePool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (idle_tx, idle_rx) = bounded(capacity);
        Self {
            idle_tx,
            idle_rx,
            created: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Engines constructed so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Engines currently waiting in the pool.
    pub fn idle(&self) -> usize {
        self.idle_rx.len()
    }

    pub fn checkout(&self) -> EngineGuard<'_> {
        let engine = match self.idle_rx.try_recv() {
            Ok(engine) => engine,
            Err(_) => match self.reserve() {
                Some(serial) => GeometryEngine::new(serial),
                None => match self.idle_rx.recv() {
                    Ok(engine) => engine,
                    // unreachable while the pool holds its own sender
                    Err(_) => GeometryEngine::new(usize::MAX),
                },
            },
        };
        EngineGuard { pool: self, engine }
    }

    fn reserve(&self) -> Option<usize> {
        self.created
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .ok()
    }
}

/// Scoped checkout; the engine goes back to the pool when the guard drops.
#[derive(Debug)]
pub struct EngineGuard<'a> {
    pool: &'a EnginePool,
    engine: GeometryEngine,
}

impl Deref for EngineGuard<'_> {
    type Target = GeometryEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

impl DerefMut for EngineGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.engine
    }
}

impl Drop for EngineGuard<'_> {
    fn drop(&mut self) {
        let mut engine = std::mem::take(&mut self.engine);
        engine.set_srid(None);
        // never full: at most `capacity` engines exist
        let _ = self.pool.idle_tx.try_send(engine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn reuses_returned_engines() {
        let pool = EnginePool::new(2);
        let first = pool.checkout().serial();
        let second = pool.checkout().serial();
        assert_eq!(first, second);
        assert_eq!(pool.created(), 1);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn creates_up_to_capacity() {
        let pool = EnginePool::new(2);
        let a = pool.checkout();
        let b = pool.checkout();
        assert_ne!(a.serial(), b.serial());
        assert_eq!(pool.created(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn guard_resets_srid() {
        let pool = EnginePool::new(1);
        {
            let mut engine = pool.checkout();
            engine.set_srid(Some(4326));
        }
        assert_eq!(pool.checkout().srid(), None);
    }

    #[test]
    fn never_lends_an_engine_twice() {
        let pool = EnginePool::new(3);
        let in_use = Mutex::new(HashSet::new());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        let engine = pool.checkout();
                        assert!(in_use.lock().unwrap().insert(engine.serial()));
                        std::thread::yield_now();
                        assert!(in_use.lock().unwrap().remove(&engine.serial()));
                    }
                });
            }
        });

        assert!(pool.created() <= 3);
        assert_eq!(pool.idle(), pool.created());
    }
}
