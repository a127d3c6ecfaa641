use futures::future::BoxFuture;
use log::warn;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type SyncCallback<T> = Arc<dyn Fn(T) + Send + Sync>;
type AsyncCallback<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

fn generate_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[derive(Clone)]
enum CallbackFn<T> {
    Sync(SyncCallback<T>),
    Async(AsyncCallback<T>),
}

/// How many times a listener fires before it removes itself.
#[derive(Clone, Default)]
pub enum TListener {
    #[default]
    Simple,
    Count(Arc<AtomicUsize>),
    Once(Arc<AtomicBool>),
}

impl TListener {
    pub fn count(count: usize) -> Self {
        TListener::Count(Arc::new(AtomicUsize::new(count)))
    }

    pub fn once() -> Self {
        TListener::Once(Arc::new(AtomicBool::new(false)))
    }
}

#[derive(Clone)]
struct ListenerWrapper<T> {
    id: u64,
    callback: CallbackFn<T>,
    t_callback: TListener,
    is_removed: Arc<AtomicBool>,
}

impl<T> ListenerWrapper<T> {
    fn new(id: u64, t_callback: TListener, callback: CallbackFn<T>) -> Self {
        Self {
            id,
            t_callback,
            callback,
            is_removed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Consumes one invocation. `Some(true)` means this was the last one.
    fn consume(&self) -> Option<bool> {
        if self.is_removed.load(Ordering::Acquire) {
            return None;
        }
        let exhausted = match &self.t_callback {
            TListener::Simple => false,
            TListener::Count(counter) => {
                match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
                    Ok(old) => old == 1,
                    Err(_) => return None,
                }
            }
            TListener::Once(consumed) => {
                if consumed.swap(true, Ordering::SeqCst) {
                    return None;
                }
                true
            }
        };
        if exhausted {
            self.is_removed.store(true, Ordering::Release);
        }
        Some(exhausted)
    }
}

/// Listener registry the presentation layer subscribes through.
///
/// Sync listeners run inline on the invoking task, async listeners are
/// spawned onto the current tokio runtime.
pub struct EventHub<T> {
    listeners: Arc<Mutex<Vec<ListenerWrapper<T>>>>,
}

impl<T: Clone + Send + 'static> EventHub<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ListenerWrapper<T>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, t_callback: TListener, callback: CallbackFn<T>) -> Option<u64> {
        if let TListener::Count(counter) = &t_callback {
            if counter.load(Ordering::Relaxed) == 0 {
                return None;
            }
        }
        let id = generate_id();
        self.lock().push(ListenerWrapper::new(id, t_callback, callback));
        Some(id)
    }

    pub fn add_sync_listener<F>(&self, callback: F, t_callback: TListener) -> Option<u64>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.push(t_callback, CallbackFn::Sync(Arc::new(callback)))
    }

    pub fn add_async_listener<F, Fut>(&self, callback: F, t_callback: TListener) -> Option<u64>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.push(
            t_callback,
            CallbackFn::Async(Arc::new(move |value| -> BoxFuture<'static, ()> {
                Box::pin(callback(value))
            })),
        )
    }

    pub fn remove_listener(&self, id: u64) -> bool {
        let mut guard = self.lock();
        if let Some(pos) = guard.iter().position(|w| w.id == id) {
            let removed = guard.remove(pos);
            removed.is_removed.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    pub fn invoke(&self, value: T) {
        let snapshot = self.lock().clone();
        let mut exhausted = vec![];

        for wrapper in snapshot.iter() {
            let Some(last) = wrapper.consume() else {
                continue;
            };
            match &wrapper.callback {
                CallbackFn::Sync(cb) => cb(value.clone()),
                CallbackFn::Async(cb) => match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(cb(value.clone()));
                    }
                    Err(_) => warn!("async listener {} skipped: no tokio runtime", wrapper.id),
                },
            }
            if last {
                exhausted.push(wrapper.id);
            }
        }

        if !exhausted.is_empty() {
            self.lock().retain(|w| !exhausted.contains(&w.id));
        }
    }
}

impl<T: Clone + Send + 'static> Default for EventHub<T> {
    fn default() -> Self {
        Self::new()
    }
}
