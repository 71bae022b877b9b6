// ============================================================================
// OFFSCREEN POOL - recycle scratch surfaces to avoid allocation churn
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::canvas::Offscreen;

/// Key for pooled surfaces: (width, height).
type PoolKey = (u32, u32);

#[derive(Default)]
struct PoolInner {
    free: HashMap<PoolKey, Vec<Offscreen>>,
    /// Buffers currently lent out.
    outstanding: usize,
    /// Buffers ever allocated because no free one matched.
    allocations: usize,
}

/// A pool of scratch surfaces keyed by dimensions.
///
/// [`OffscreenPool::acquire`] hands out a [`PooledOffscreen`] guard that
/// returns the surface when dropped, so every exit path gives it back.
/// Cloning the pool shares the same free lists.
#[derive(Clone)]
pub struct OffscreenPool {
    inner: Rc<RefCell<PoolInner>>,
    /// Maximum number of free surfaces kept per key.
    max_per_key: usize,
}

impl Default for OffscreenPool {
    fn default() -> Self {
        Self::new()
    }
}

impl OffscreenPool {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(PoolInner::default())),
            max_per_key: 4,
        }
    }

    /// Borrow a cleared `width`×`height` surface.
    pub fn acquire(&self, width: u32, height: u32) -> PooledOffscreen {
        let mut inner = self.inner.borrow_mut();
        let surface = match inner.free.get_mut(&(width, height)).and_then(|v| v.pop()) {
            Some(mut s) => {
                s.clear();
                s
            }
            None => {
                inner.allocations += 1;
                Offscreen::new(width, height)
            }
        };
        inner.outstanding += 1;
        tracing::trace!(width, height, outstanding = inner.outstanding, "pool acquire");
        PooledOffscreen {
            surface: Some(surface),
            pool: Rc::clone(&self.inner),
            max_per_key: self.max_per_key,
        }
    }

    /// Number of guards not yet dropped.
    pub fn outstanding(&self) -> usize {
        self.inner.borrow().outstanding
    }

    /// Total number of surfaces currently idle in the pool.
    pub fn pooled_count(&self) -> usize {
        self.inner.borrow().free.values().map(|v| v.len()).sum()
    }

    pub fn allocations(&self) -> usize {
        self.inner.borrow().allocations
    }

    /// Drop all idle surfaces.
    pub fn clear(&self) {
        self.inner.borrow_mut().free.clear();
    }
}

/// A surface on loan from an [`OffscreenPool`]. Returned on drop.
///
/// Contents carry no meaning across loans: every acquire starts cleared.
pub struct PooledOffscreen {
    surface: Option<Offscreen>,
    pool: Rc<RefCell<PoolInner>>,
    max_per_key: usize,
}

impl Deref for PooledOffscreen {
    type Target = Offscreen;

    fn deref(&self) -> &Offscreen {
        self.surface.as_ref().expect("pooled surface present until drop")
    }
}

impl DerefMut for PooledOffscreen {
    fn deref_mut(&mut self) -> &mut Offscreen {
        self.surface.as_mut().expect("pooled surface present until drop")
    }
}

impl Drop for PooledOffscreen {
    fn drop(&mut self) {
        let Some(surface) = self.surface.take() else { return };
        let mut inner = self.pool.borrow_mut();
        inner.outstanding -= 1;
        let entry = inner.free.entry(surface.dimensions()).or_default();
        if entry.len() < self.max_per_key {
            entry.push(surface);
        }
        // else: surface is dropped here, freeing its memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn guard_returns_surface_on_drop() {
        let pool = OffscreenPool::new();
        {
            let a = pool.acquire(8, 8);
            let _b = pool.acquire(8, 8);
            assert_eq!(a.dimensions(), (8, 8));
            assert_eq!(pool.outstanding(), 2);
        }
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.pooled_count(), 2);
    }

    #[test]
    fn reacquired_surface_is_cleared_and_reused() {
        let pool = OffscreenPool::new();
        {
            let mut s = pool.acquire(4, 4);
            s.fill(Rgba([1, 2, 3, 255]));
        }
        let s = pool.acquire(4, 4);
        assert!(s.pixels().iter().all(|p| *p == [0, 0, 0, 0]));
        assert_eq!(pool.allocations(), 1);
    }

    #[test]
    fn early_return_path_still_releases() {
        fn work(pool: &OffscreenPool, bail: bool) -> Option<u32> {
            let s = pool.acquire(2, 2);
            if bail {
                return None;
            }
            Some(s.width())
        }
        let pool = OffscreenPool::new();
        assert_eq!(work(&pool, true), None);
        assert_eq!(work(&pool, false), Some(2));
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn free_list_is_capped_per_key() {
        let pool = OffscreenPool::new();
        let guards: Vec<_> = (0..6).map(|_| pool.acquire(3, 3)).collect();
        drop(guards);
        assert_eq!(pool.pooled_count(), 4);
    }
}
