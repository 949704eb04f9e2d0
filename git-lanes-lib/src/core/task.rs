//! Sharing non-`Sync` resources between worker threads.

use std::sync::Mutex;

/// A factory which produces a resource for use with [`ResourcePool`].
pub trait Resource {
    /// The type of the resource to be produced.
    type Output;

    /// An error type.
    type Error;

    /// Constructor for the resource.
    fn try_create(&self) -> Result<Self::Output, Self::Error>;
}

/// An unbounded pool of resources created on demand.
///
/// Each borrow takes an idle resource out of the pool (creating one if there
/// is none), so a resource is only ever used by one thread at a time. This is
/// how a `git2::Repository`, which is `Send` but not `Sync`, is shared
/// between loader threads and the update worker.
///
/// ```
/// # use std::sync::atomic::{AtomicUsize, Ordering};
/// # use lanes::core::task::{Resource, ResourcePool};
/// struct Counter(AtomicUsize);
///
/// impl Resource for Counter {
///     type Output = usize;
///     type Error = std::convert::Infallible;
///     fn try_create(&self) -> Result<Self::Output, Self::Error> {
///         Ok(self.0.fetch_add(1, Ordering::SeqCst))
///     }
/// }
///
/// let pool = ResourcePool::new(Counter(AtomicUsize::new(0)));
/// assert_eq!(pool.with(|n| *n), Ok(0));
///
/// // The resource went back into the pool and is reused.
/// assert_eq!(pool.with(|n| *n), Ok(0));
/// assert_eq!(pool.idle_count(), 1);
/// ```
pub struct ResourcePool<R: Resource> {
    factory: R,
    idle: Mutex<Vec<R::Output>>,
}

impl<R: Resource> std::fmt::Debug for ResourcePool<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("factory", &"<not shown>")
            .field(
                "idle.len()",
                &match self.idle.try_lock() {
                    Ok(idle) => idle.len().to_string(),
                    Err(_) => "<could not determine>".to_string(),
                },
            )
            .finish()
    }
}

impl<R: Resource> ResourcePool<R> {
    /// Constructor.
    pub fn new(factory: R) -> Self {
        ResourcePool {
            factory,
            idle: Default::default(),
        }
    }

    /// Run `f` with exclusive use of a resource, then return the resource to
    /// the pool. Fails only if a new resource had to be created and creating
    /// it failed.
    pub fn with<T>(&self, f: impl FnOnce(&R::Output) -> T) -> Result<T, R::Error> {
        let resource = {
            let mut idle = self.idle.lock().expect("Poisoned mutex for ResourcePool");
            idle.pop()
        };
        let resource = match resource {
            Some(resource) => resource,
            None => self.factory.try_create()?,
        };

        let result = f(&resource);
        self.idle
            .lock()
            .expect("Poisoned mutex for ResourcePool")
            .push(resource);
        Ok(result)
    }

    /// How many resources are waiting in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .expect("Poisoned mutex for ResourcePool")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    use super::*;

    struct Counter(AtomicUsize);

    impl Resource for Counter {
        type Output = usize;
        type Error = std::convert::Infallible;

        fn try_create(&self) -> Result<Self::Output, Self::Error> {
            Ok(self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[test]
    fn test_concurrent_borrows_get_distinct_resources() {
        let pool = ResourcePool::new(Counter(AtomicUsize::new(0)));
        let barrier = Barrier::new(2);
        let mut seen = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    scope.spawn(|_| {
                        pool.with(|n| {
                            barrier.wait();
                            *n
                        })
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap().unwrap())
                .collect::<Vec<_>>()
        })
        .unwrap();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(pool.idle_count(), 2);
    }
}
