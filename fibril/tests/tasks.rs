use fibril::green::{self, CancelPolicy, await_future};
use fibril::task::JoinHandle;
use fibril::{EventLoop, EventLoopBuilder, JoinError, yield_now};

use std::future::{self, Future};
use std::hint::black_box;
use std::panic;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, mpsc};
use std::task::{Context, Poll, Wake, Waker};
use std::thread;
use std::time::Duration;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Runs `f` on its own thread and fails if it does not return in time.
fn within_deadline<R, F>(f: F) -> R
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let _ = tx.send(f());
    });

    rx.recv_timeout(Duration::from_secs(5))
        .expect("event loop did not return in time")
}

/// Counts how many times it is woken.
#[derive(Default)]
struct WakeCounter(AtomicUsize);

impl Wake for WakeCounter {
    fn wake(self: Arc<Self>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sets a flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_run_until_complete_native_task() {
    init_logger();

    let event_loop = EventLoop::new();
    let result = event_loop.run_until_complete(async {
        let handle = fibril::task::spawn(async {
            yield_now().await;
            40
        });

        handle.await.unwrap() + 2
    });

    assert_eq!(result, Ok(42));
}

#[test]
fn test_native_and_bridge_panics_look_the_same() {
    init_logger();

    let event_loop = EventLoop::new();

    let native = event_loop.spawn(async {
        let n: i32 = black_box(0);
        if n == 0 {
            panic!("task failed");
        }
        n
    });
    let bridged = event_loop.spawn_task(|| -> i32 { panic!("task failed") });

    let native = event_loop.run_until_done(&native);
    let bridged = event_loop.run_until_done(&bridged);

    assert_eq!(native, Err(JoinError::Panicked("task failed".to_owned())));
    assert_eq!(native, bridged);
}

#[test]
fn test_result_is_idempotent() {
    init_logger();

    let event_loop = EventLoop::new();

    let ok = event_loop.spawn_task(|| await_future(async { 7 }).unwrap());
    let failed = event_loop.spawn_task(|| -> i32 { panic!("only once") });

    assert_eq!(ok.result(), None);

    let first_ok = event_loop.run_until_done(&ok);
    let first_failed = event_loop.run_until_done(&failed);

    for _ in 0..3 {
        assert_eq!(ok.result(), Some(first_ok.clone()));
        assert_eq!(failed.result(), Some(first_failed.clone()));
    }

    let again = failed.clone();
    let awaited = event_loop.run_until_complete(async move { again.await });
    assert_eq!(awaited, Ok(first_failed));
    assert_eq!(first_ok, Ok(7));

    // Cancelling a finished task changes nothing.
    assert!(!ok.cancel());
    assert_eq!(ok.result(), Some(Ok(7)));
}

#[test]
fn test_done_callbacks() {
    init_logger();

    let event_loop = EventLoop::new();
    let (tx, rx) = mpsc::channel();

    let task = event_loop.spawn_task(|| await_future(yield_now()).map(|()| 7).unwrap());

    let early = tx.clone();
    task.add_done_callback(move |result| {
        let _ = early.send(("early", result.clone()));
    });

    assert!(rx.try_recv().is_err());
    event_loop.run_until_done(&task).unwrap();
    assert_eq!(rx.try_recv(), Ok(("early", Ok(7))));

    // Registered after completion: runs right away.
    task.add_done_callback(move |result| {
        let _ = tx.send(("late", result.clone()));
    });
    assert_eq!(rx.try_recv(), Ok(("late", Ok(7))));
}

#[test]
fn test_panicking_callback_does_not_stop_others() {
    init_logger();

    let event_loop = EventLoop::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let task = event_loop.spawn(async { 1 });

    task.add_done_callback(|_| panic!("callback failed"));

    let counter = calls.clone();
    task.add_done_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(event_loop.run_until_done(&task), Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cancel_detaches_awaited_future() {
    init_logger();

    let event_loop = EventLoop::new();
    let finished = Arc::new(AtomicBool::new(false));

    let flag = finished.clone();
    let task = event_loop.spawn_task(move || {
        await_future(async move {
            for _ in 0..3 {
                yield_now().await;
            }
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
    });

    let target = task.clone();
    let canceller = event_loop.spawn(async move {
        yield_now().await;
        target.cancel()
    });

    assert_eq!(event_loop.run_until_done(&canceller), Ok(true));
    assert_eq!(task.result(), Some(Err(JoinError::Cancelled)));

    let done = finished.clone();
    let waited = event_loop.run_until_complete(async move {
        while !done.load(Ordering::SeqCst) {
            yield_now().await;
        }
    });

    assert_eq!(waited, Ok(()));
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(task.result(), Some(Err(JoinError::Cancelled)));
}

#[test]
fn test_cancel_drops_awaited_future() {
    init_logger();

    let event_loop = EventLoopBuilder::new()
        .cancel_policy(CancelPolicy::Drop)
        .build();

    let finished = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicBool::new(false));

    let flag = finished.clone();
    let guard = DropFlag(dropped.clone());
    let task = event_loop.spawn_task(move || {
        await_future(async move {
            let _guard = guard;
            for _ in 0..3 {
                yield_now().await;
            }
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
    });

    let target = task.clone();
    let canceller = event_loop.spawn(async move {
        yield_now().await;
        target.cancel()
    });

    assert_eq!(event_loop.run_until_done(&canceller), Ok(true));
    assert!(dropped.load(Ordering::SeqCst));

    let idle = event_loop.run_until_complete(async {
        for _ in 0..10 {
            yield_now().await;
        }
    });

    assert_eq!(idle, Ok(()));
    assert!(!finished.load(Ordering::SeqCst));
    assert_eq!(task.result(), Some(Err(JoinError::Cancelled)));
}

#[test]
fn test_cancel_before_first_run() {
    init_logger();

    let event_loop = EventLoop::new();
    let started = Arc::new(AtomicBool::new(false));

    let flag = started.clone();
    let task = event_loop.spawn_task(move || flag.store(true, Ordering::SeqCst));

    assert!(task.cancel());
    assert!(task.is_done());

    assert_eq!(event_loop.run_until_complete(async { yield_now().await }), Ok(()));
    assert!(!started.load(Ordering::SeqCst));
    assert_eq!(task.result(), Some(Err(JoinError::Cancelled)));
}

#[test]
fn test_spawn_on_dropped_loop_is_cancelled() {
    init_logger();

    let handle = {
        let event_loop = EventLoop::new();
        event_loop.handle().clone()
    };

    assert!(handle.is_closed());

    let task = handle.spawn(async { 1 });
    assert_eq!(task.result(), Some(Err(JoinError::Cancelled)));
}

#[test]
fn test_dropping_loop_cancels_pending_bridge_task() {
    init_logger();

    let event_loop = EventLoop::new();
    let (tx, rx) = mpsc::channel::<()>();

    let task = event_loop.spawn_task(move || {
        let _signal = tx;
        await_future(future::pending::<()>()).unwrap();
    });

    let step = event_loop.run_until_complete(async { yield_now().await });
    assert_eq!(step, Ok(()));
    assert!(!task.is_done());

    drop(event_loop);

    assert_eq!(task.result(), Some(Err(JoinError::Cancelled)));

    // The abandoned fiber unwinds and drops the sender.
    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)),
        Err(mpsc::RecvTimeoutError::Disconnected)
    );
}

#[test]
fn test_run_while_running_panics() {
    init_logger();

    let event_loop = Arc::new(EventLoop::new());
    let inner = event_loop.clone();

    let result = event_loop.run_until_complete(async move {
        let _ = inner.run_until_complete(async { 1 });
    });

    let message = result.unwrap_err();
    assert!(message.panic_message().unwrap().contains("already running"));
}

#[fibril::test]
async fn test_join_native_and_bridge_tasks() {
    init_logger();

    let a = green::spawn_task(|| await_future(async { 1 }).unwrap());
    let b = fibril::task::spawn(async {
        yield_now().await;
        2
    });
    let c = green::spawn_coroutine(async { 3 });

    let (a, b, c) = fibril::join!(a, b, c);

    assert_eq!((a, b, c), (Ok(1), Ok(2), Ok(3)));
}

#[fibril::test]
async fn test_join_single_and_empty() {
    let single = fibril::join!(async { 42 });
    let () = fibril::join!();

    assert_eq!(single, 42);
}

#[fibril::test]
async fn test_task_ids_are_unique() {
    let a = fibril::task::spawn(async {});
    let b = green::spawn_task(|| ());

    assert_ne!(a.id(), b.id());

    let _ = fibril::join!(a, b);
}

#[test]
fn test_native_task_cancels_itself_after_wake() {
    init_logger();

    let result = within_deadline(|| {
        let event_loop = EventLoop::new();
        let slot = Arc::new(OnceLock::<JoinHandle<()>>::new());

        let me = slot.clone();
        let task = event_loop.spawn(future::poll_fn(move |cx| {
            cx.waker().wake_by_ref();

            if let Some(handle) = me.get() {
                handle.cancel();
            }

            Poll::Ready(())
        }));

        let _ = slot.set(task.clone());
        event_loop.run_until_done(&task)
    });

    assert_eq!(result, Err(JoinError::Cancelled));
}

#[test]
fn test_coroutine_cancels_itself_after_wake() {
    init_logger();

    let (result, reusable) = within_deadline(|| {
        let event_loop = EventLoop::new();
        let slot = Arc::new(OnceLock::<JoinHandle<&'static str>>::new());

        let me = slot.clone();
        let task = event_loop.spawn_coroutine(async move {
            future::poll_fn(|cx| {
                cx.waker().wake_by_ref();

                if let Some(handle) = me.get() {
                    handle.cancel();
                }

                Poll::Ready(())
            })
            .await;

            "finished"
        });

        let _ = slot.set(task.clone());
        let result = event_loop.run_until_done(&task);

        let next = event_loop.spawn_task(|| await_future(async { 1 }).unwrap());
        (result, event_loop.run_until_done(&next))
    });

    assert_eq!(result, Err(JoinError::Cancelled));
    assert_eq!(reusable, Ok(1));
}

#[test]
fn test_bridge_task_cancels_itself_then_returns() {
    init_logger();

    let event_loop = EventLoop::new();
    let slot = Arc::new(OnceLock::<JoinHandle<i32>>::new());
    let returned = Arc::new(AtomicBool::new(false));

    let me = slot.clone();
    let flag = returned.clone();
    let task = event_loop.spawn_task(move || {
        let cancelled = me.get().is_some_and(|handle| handle.cancel());

        // Still running: cancellation does not interrupt the fiber.
        flag.store(cancelled, Ordering::SeqCst);
        7
    });

    let _ = slot.set(task.clone());

    let err = event_loop.run_until_done(&task).unwrap_err();
    assert!(err.is_cancelled());
    assert!(returned.load(Ordering::SeqCst));
    assert_eq!(task.result(), Some(Err(JoinError::Cancelled)));

    let next = event_loop.spawn_task(|| await_future(yield_now()).map(|()| 2).unwrap());
    assert_eq!(event_loop.run_until_done(&next), Ok(2));
}

#[test]
fn test_bridge_task_cancelled_while_running_is_never_resumed() {
    init_logger();

    let event_loop = EventLoop::new();
    let slot = Arc::new(OnceLock::<JoinHandle<()>>::new());
    let resumed = Arc::new(AtomicBool::new(false));

    let me = slot.clone();
    let flag = resumed.clone();
    let task = event_loop.spawn_task(move || {
        if let Some(handle) = me.get() {
            handle.cancel();
        }

        await_future(yield_now()).unwrap();
        flag.store(true, Ordering::SeqCst);
    });

    let _ = slot.set(task.clone());

    assert_eq!(event_loop.run_until_done(&task), Err(JoinError::Cancelled));

    let idle = event_loop.run_until_complete(async {
        for _ in 0..5 {
            yield_now().await;
        }
    });

    assert_eq!(idle, Ok(()));
    assert!(!resumed.load(Ordering::SeqCst));
}

#[test]
fn test_cancelled_fiber_stays_parked_until_loop_drop() {
    init_logger();

    let event_loop = EventLoop::new();
    let caught = Arc::new(AtomicUsize::new(0));
    let reached_end = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel::<()>();

    let counter = caught.clone();
    let flag = reached_end.clone();
    let task = event_loop.spawn_task(move || {
        let _signal = tx;

        if panic::catch_unwind(|| await_future(future::pending::<()>())).is_err() {
            counter.fetch_add(1, Ordering::SeqCst);
        }

        let _ = await_future(future::pending::<()>());
        flag.store(true, Ordering::SeqCst);
    });

    let step = event_loop.run_until_complete(async { yield_now().await });
    assert_eq!(step, Ok(()));

    assert!(task.cancel());

    let idle = event_loop.run_until_complete(async {
        for _ in 0..5 {
            yield_now().await;
        }
    });
    assert_eq!(idle, Ok(()));

    thread::sleep(Duration::from_millis(50));

    assert_eq!(caught.load(Ordering::SeqCst), 0);
    assert_eq!(rx.try_recv(), Err(mpsc::TryRecvError::Empty));

    drop(event_loop);

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)),
        Err(mpsc::RecvTimeoutError::Disconnected)
    );
    assert_eq!(caught.load(Ordering::SeqCst), 1);
    assert!(!reached_end.load(Ordering::SeqCst));
}

#[test]
fn test_repeated_polls_register_one_waiter() {
    init_logger();

    let event_loop = EventLoop::new();
    let task = event_loop.spawn(async {
        yield_now().await;
        1
    });

    let wakes = Arc::new(WakeCounter::default());
    let waker = Waker::from(wakes.clone());
    let mut cx = Context::from_waker(&waker);

    let mut observer = task.clone();
    for _ in 0..100 {
        assert!(Pin::new(&mut observer).poll(&mut cx).is_pending());
    }

    assert_eq!(event_loop.run_until_done(&task), Ok(1));
    assert_eq!(wakes.0.load(Ordering::SeqCst), 1);
}
