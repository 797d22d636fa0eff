use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::table::Handle;
use crate::{ExchangeError, IncomingResponse};

/// The resource behind an in-flight exchange handle.
///
/// Resolves exactly once; awaiting again returns the cached result.
/// Releasing the handle while still pending aborts the exchange task, which
/// cancels the underlying transport work.
pub struct FutureResponse {
    pub(crate) state: FutureState,
}

pub(crate) enum FutureState {
    Pending {
        rx: oneshot::Receiver<Result<IncomingResponse, ExchangeError>>,
        _task: AbortOnDropHandle,
    },
    Resolved(Result<Handle<IncomingResponse>, ExchangeError>),
}

impl FutureResponse {
    pub(crate) fn pending(
        rx: oneshot::Receiver<Result<IncomingResponse, ExchangeError>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            state: FutureState::Pending {
                rx,
                _task: AbortOnDropHandle(task),
            },
        }
    }
}

/// Task handle that aborts the task when dropped.
pub(crate) struct AbortOnDropHandle(JoinHandle<()>);

impl Drop for AbortOnDropHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}
