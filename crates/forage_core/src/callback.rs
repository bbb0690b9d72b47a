//! Callback adaptation for callers that prefer callbacks to futures.

use crate::error::ForageResult;
use std::future::Future;

/// Completion callback receiving the outcome of an operation.
pub type Callback<T> = Box<dyn FnOnce(ForageResult<T>) + Send>;

/// Awaits `future`, hands its outcome to `callback` if one is given, and
/// returns the same outcome.
///
/// # Example
///
/// ```
/// use forage_core::{execute_callback, ForageResult};
/// use std::sync::mpsc;
///
/// # futures::executor::block_on(async {
/// let (tx, rx) = mpsc::channel();
/// let result = execute_callback(
///     async { Ok::<_, forage_core::ForageError>(42) },
///     Some(Box::new(move |r: ForageResult<i32>| tx.send(r).unwrap())),
/// )
/// .await;
/// assert_eq!(result, Ok(42));
/// assert_eq!(rx.recv().unwrap(), Ok(42));
/// # });
/// ```
pub async fn execute_callback<T, F>(future: F, callback: Option<Callback<T>>) -> ForageResult<T>
where
    T: Clone,
    F: Future<Output = ForageResult<T>>,
{
    let result = future.await;
    if let Some(callback) = callback {
        callback(result.clone());
    }
    result
}
