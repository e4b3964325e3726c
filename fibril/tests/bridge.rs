use fibril::fiber::{self, Payload};
use fibril::green::{self, await_future};
use fibril::{BridgeError, EventLoop, JoinError, yield_now};

use std::hint::black_box;
use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn bar() -> i32 {
    yield_now().await;
    30
}

async fn foo() -> i32 {
    await_future(bar()).unwrap() + 12
}

async fn explode() -> i32 {
    yield_now().await;
    panic!("inner future failed")
}

async fn relay() -> i32 {
    await_future(explode()).unwrap()
}

#[test]
fn test_coroutine_awaits_future_through_plain_coroutine() {
    init_logger();

    let event_loop = EventLoop::new();
    let task = event_loop.spawn_coroutine(async { foo().await });

    assert_eq!(event_loop.run_until_done(&task), Ok(42));
}

#[test]
fn test_bridge_task_adds_to_awaited_value() {
    init_logger();

    let event_loop = EventLoop::new();

    for v in [-7, 0, 30, 1_000] {
        let task = event_loop.spawn_task(move || {
            await_future(async move {
                yield_now().await;
                v
            })
            .map(|value| value + 12)
        });

        assert_eq!(event_loop.run_until_done(&task), Ok(Ok(v + 12)));
    }
}

#[test]
fn test_future_ready_on_first_poll() {
    init_logger();

    let event_loop = EventLoop::new();
    let task = event_loop.spawn_task(|| await_future(async { 30 }).unwrap() + 12);

    assert_eq!(event_loop.run_until_done(&task), Ok(42));
}

#[fibril::test]
async fn test_bridge_task_awaited_by_native_task() {
    init_logger();

    let task = green::spawn_task(|| await_future(bar()).unwrap() + 12);

    assert_eq!(task.await, Ok(42));
}

#[test]
fn test_division_by_zero_after_two_steps_fails_once() {
    init_logger();

    let event_loop = EventLoop::new();

    let failing = event_loop.spawn_task(|| {
        await_future(yield_now()).unwrap();
        await_future(yield_now()).unwrap();

        let zero: i32 = black_box(0);
        10 / zero
    });

    let observed = Arc::new(AtomicUsize::new(0));
    let counter = observed.clone();

    let watcher = event_loop.spawn_coroutine(async move {
        match failing.await {
            Err(err) if err.is_panic() => {
                counter.fetch_add(1, Ordering::SeqCst);
                err.panic_message().map(str::to_owned)
            }
            _ => None,
        }
    });

    let message = event_loop.run_until_done(&watcher).unwrap();

    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert!(message.unwrap().contains("divide by zero"));
}

#[test]
fn test_panic_in_awaited_future_propagates_through_layers() {
    init_logger();

    let event_loop = EventLoop::new();
    let task = event_loop.spawn_coroutine(async { relay().await });

    assert_eq!(
        event_loop.run_until_done(&task),
        Err(JoinError::Panicked("inner future failed".to_owned()))
    );
}

#[test]
fn test_panic_in_awaited_future_can_be_caught_in_fiber() {
    init_logger();

    let event_loop = EventLoop::new();
    let task = event_loop.spawn_task(|| {
        let caught = panic::catch_unwind(|| await_future(explode())).is_err();

        // The task can keep awaiting after recovering.
        let after = await_future(bar()).unwrap();

        (caught, after)
    });

    assert_eq!(event_loop.run_until_done(&task), Ok((true, 30)));
}

#[test]
fn test_nested_bridge_tasks() {
    init_logger();

    let event_loop = EventLoop::new();
    let outer = event_loop.spawn_task(|| {
        let inner = green::spawn_task(|| await_future(bar()).unwrap());
        await_future(inner).unwrap().unwrap() + 12
    });

    assert_eq!(event_loop.run_until_done(&outer), Ok(42));
}

#[test]
fn test_coroutine_yields_to_loop() {
    init_logger();

    let event_loop = EventLoop::new();

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();

    let ticker = event_loop.spawn(async move {
        for _ in 0..3 {
            counter.fetch_add(1, Ordering::SeqCst);
            yield_now().await;
        }
    });

    let seen = ticks.clone();
    let task = event_loop.spawn_coroutine(async move {
        for _ in 0..3 {
            yield_now().await;
        }

        assert!(seen.load(Ordering::SeqCst) > 0);
        5
    });

    assert_eq!(event_loop.run_until_done(&task), Ok(5));
    assert_eq!(event_loop.run_until_done(&ticker), Ok(()));
    assert_eq!(ticks.load(Ordering::SeqCst), 3);
}

#[test]
fn test_other_tasks_run_while_fiber_waits() {
    init_logger();

    let event_loop = EventLoop::new();
    let released = Arc::new(AtomicBool::new(false));

    let flag = released.clone();
    let waiter = event_loop.spawn_task(move || {
        await_future(async move {
            while !flag.load(Ordering::SeqCst) {
                yield_now().await;
            }
        })
        .unwrap();

        "released"
    });

    let releaser = event_loop.spawn(async move {
        yield_now().await;
        released.store(true, Ordering::SeqCst);
    });

    assert_eq!(event_loop.run_until_done(&waiter), Ok("released"));
    assert!(releaser.is_done());
}

#[test]
fn test_suspending_with_non_future_is_protocol_violation() {
    init_logger();

    let event_loop = EventLoop::new();

    let resumed = Arc::new(AtomicBool::new(false));
    let flag = resumed.clone();

    let task = event_loop.spawn_task(move || {
        let _ = fiber::suspend_current(Payload::new(7u32));
        flag.store(true, Ordering::SeqCst);
    });

    let err = event_loop.run_until_done(&task).unwrap_err();

    assert_eq!(
        err,
        JoinError::Bridge(BridgeError::ProtocolViolation {
            task: task.id(),
            payload: "u32",
        })
    );

    let message = err.to_string();
    assert!(message.contains("u32"));
    assert!(message.contains(&task.id().to_string()));

    assert!(!resumed.load(Ordering::SeqCst));
    assert_eq!(task.result(), Some(Err(err)));
}

#[test]
fn test_bridge_tasks_spawned_from_coroutine() {
    init_logger();

    let event_loop = EventLoop::new();
    let task = event_loop.spawn_coroutine(async {
        let a = green::spawn_task(|| await_future(bar()).unwrap());
        let b = green::spawn_coroutine(async { foo().await });

        let (a, b) = fibril::join!(a, b);
        a.unwrap() + b.unwrap()
    });

    assert_eq!(event_loop.run_until_done(&task), Ok(72));
}

#[fibril::test(stack_size = 512 * 1024)]
async fn test_stack_size_attribute() {
    init_logger();

    let task = green::spawn_task(|| {
        let buffer = [1u8; 64 * 1024];
        black_box(buffer).iter().map(|&b| b as usize).sum::<usize>()
    });

    assert_eq!(task.await, Ok(64 * 1024));
}
