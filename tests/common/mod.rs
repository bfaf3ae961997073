#![allow(dead_code, unused_imports)]

pub use initdag_test_utils::builders;
pub use initdag_test_utils::recorder::Recorder;
pub use initdag_test_utils::{init_tracing, with_timeout};

use std::time::Duration;

/// Assert that `fut` is still pending after `wait`.
pub async fn assert_still_pending<F>(fut: F, wait: Duration)
where
    F: std::future::Future,
{
    assert!(
        tokio::time::timeout(wait, fut).await.is_err(),
        "future settled but was expected to stay pending"
    );
}
