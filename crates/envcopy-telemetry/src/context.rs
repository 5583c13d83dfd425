//! Run-scoped tracing context.
//!
//! # Design
//! - Keeps the run identifier in task-local storage so collaborators can tag
//!   their own records and external hooks with it.

use std::future::Future;

use tracing::Span;
use uuid::Uuid;

tokio::task_local! {
    static ACTIVE_RUN: Uuid;
}

/// Build the top-level span for one refresh run.
#[must_use]
pub fn run_span(run_id: Uuid, dry_run: bool) -> Span {
    tracing::info_span!("refresh", run_id = %run_id, dry_run)
}

/// Execute `fut` with `run_id` available through [`current_run_id`].
pub async fn with_run_context<Fut, T>(run_id: Uuid, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    ACTIVE_RUN.scope(run_id, fut).await
}

/// Identifier of the run executing on the current task, if any.
#[must_use]
pub fn current_run_id() -> Option<Uuid> {
    ACTIVE_RUN.try_with(|id| *id).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_id_is_visible_inside_scope_only() {
        let run_id = Uuid::new_v4();
        assert_eq!(current_run_id(), None);
        let seen = with_run_context(run_id, async { current_run_id() }).await;
        assert_eq!(seen, Some(run_id));
        assert_eq!(current_run_id(), None);
    }

    #[test]
    fn run_span_carries_metadata() {
        let span = run_span(Uuid::nil(), true);
        // Without an installed subscriber the span may be disabled; it must
        // still be constructible.
        let _entered = span.enter();
    }
}
