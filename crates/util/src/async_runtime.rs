//! Async runtime helpers for blocking callers.
//!
//! This module provides a single entry point for executing async futures
//! from synchronous code paths, reusing the current Tokio runtime when
//! available.

use std::future::Future;

use tokio::{runtime::Handle, task};

use postmortem_types::ReportError;

/// Execute an async future from synchronous code.
///
/// # Arguments
/// - `future`: The future to run to completion.
///
/// # Returns
/// Returns the future's output or an error if a Tokio runtime cannot be
/// created.
///
/// # Notes
/// - Reuses the current runtime when available.
/// - Falls back to a single-threaded runtime for call sites outside Tokio.
pub fn block_on_future<F, T>(future: F) -> Result<T, ReportError>
where
    F: Future<Output = Result<T, ReportError>>,
{
    if let Ok(handle) = Handle::try_current() {
        task::block_in_place(|| handle.block_on(future))
    } else {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ReportError::Io)?
            .block_on(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_a_future_outside_a_runtime() {
        let result = block_on_future(async { Ok::<_, ReportError>(21 * 2) }).unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reuses_the_ambient_runtime() {
        let result = block_on_future(async { Ok::<_, ReportError>("ok") }).unwrap();
        assert_eq!(result, "ok");
    }
}
