use std::future::poll_fn;
use std::task::Poll;

/// Yields execution back to the event loop for exactly one step.
///
/// The current task is re-queued behind every task that is already ready,
/// then resumes.
///
/// # Examples
///
/// ```rust,ignore
/// async fn bar() -> u32 {
///     // Let the other tasks run once
///     yield_now().await;
///     30
/// }
/// ```
pub async fn yield_now() {
    let mut yielded = false;

    poll_fn(|cx| {
        if yielded {
            return Poll::Ready(());
        }

        yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    })
    .await
}
