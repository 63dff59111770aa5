//! Tri-state cache for lazily initialized sub-objects.

use crate::error::{Error, Failure};

/// A value that is computed on first use.
///
/// A failed initialization is remembered: later accesses return
/// `Error::Cached` with the original error code instead of retrying.
#[derive(Debug)]
pub enum Lazy<T> {
    NotAttempted,
    Failed(Failure),
    Ready(T),
}

impl<T> Default for Lazy<T> {
    fn default() -> Self {
        Lazy::NotAttempted
    }
}

impl<T> Lazy<T> {
    pub fn new() -> Self {
        Lazy::NotAttempted
    }

    /// Returns `true` if no initialization was attempted yet.
    pub fn is_pending(&self) -> bool {
        match self {
            Lazy::NotAttempted => true,
            _ => false,
        }
    }

    /// Stores the outcome of an initialization attempt.
    ///
    /// Does nothing if an outcome was already stored.
    pub fn resolve(&mut self, result: Result<T, Error>) {
        if !self.is_pending() {
            return;
        }
        *self = match result {
            Ok(value) => Lazy::Ready(value),
            Err(e) => {
                debug!("caching failed initialization: {}", e);
                Lazy::Failed(Failure::from(&e))
            }
        };
    }

    /// Returns the stored value.
    ///
    /// Not-yet-attempted initializations are reported as `NotFound`.
    pub fn get(&self) -> Result<&T, Error> {
        match self {
            Lazy::Ready(value) => Ok(value),
            Lazy::Failed(failure) => Err(Error::Cached(failure.clone())),
            Lazy::NotAttempted => Err(Error::NotFound("value was never loaded".to_string())),
        }
    }

    pub fn get_mut(&mut self) -> Result<&mut T, Error> {
        match self {
            Lazy::Ready(value) => Ok(value),
            Lazy::Failed(failure) => Err(Error::Cached(failure.clone())),
            Lazy::NotAttempted => Err(Error::NotFound("value was never loaded".to_string())),
        }
    }

    /// Returns the value, running `init` first if nothing was attempted yet.
    pub fn get_or_try_init<F>(&mut self, init: F) -> Result<&T, Error>
    where
        F: FnOnce() -> Result<T, Error>,
    {
        if self.is_pending() {
            let result = init();
            self.resolve(result);
        }
        self.get()
    }

    /// Returns the value if it was loaded successfully.
    pub fn ready(&self) -> Option<&T> {
        match self {
            Lazy::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Drops the cached value or failure.
    pub fn clear(&mut self) {
        *self = Lazy::NotAttempted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_cached() {
        let mut lazy = Lazy::new();
        let mut calls = 0;
        for _ in 0..3 {
            let value = lazy
                .get_or_try_init(|| {
                    calls += 1;
                    Ok(42)
                })
                .unwrap();
            assert_eq!(*value, 42);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn failure_is_cached() {
        let mut lazy: Lazy<u32> = Lazy::new();
        let mut calls = 0;
        for _ in 0..3 {
            let err = lazy
                .get_or_try_init(|| {
                    calls += 1;
                    Err(Error::NotFound("icon".to_string()))
                })
                .unwrap_err();
            assert_eq!(err.code(), -2);
        }
        assert_eq!(calls, 1);
        match lazy.get() {
            Err(Error::Cached(_)) => {}
            other => panic!("expected cached failure, got {:?}", other),
        }
    }

    #[test]
    fn clear_allows_retry() {
        let mut lazy: Lazy<u8> = Lazy::new();
        lazy.resolve(Err(Error::Closed));
        lazy.clear();
        assert!(lazy.is_pending());
        assert_eq!(*lazy.get_or_try_init(|| Ok(1)).unwrap(), 1);
    }
}
