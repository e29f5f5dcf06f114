use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info};

use super::channel_frontend::{ChannelFrontend, DispatchStatistics};
use super::worker::{BatchWorkerHandle, WorkerSignal};
use crate::backend::RuntimeTensor;
use crate::communication::{InferenceRequest, InferenceResponse, Outcome, QueueItem};
use crate::error::ServingError;
use crate::execution::ModelInstance;
use crate::model::Model;

/// How long an idle worker sleeps before checking the queue again.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Resolves to the terminal outcome of one submitted request.
pub struct ResponseHandle {
    receiver: oneshot::Receiver<Outcome>,
}

impl Future for ResponseHandle {
    type Output = Result<InferenceResponse, ServingError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|outcome| {
                outcome.unwrap_or_else(|_| {
                    Err(ServingError::unavailable("request dropped before it was executed"))
                })
            })
    }
}

/// Feeds queued requests to a [`ModelInstance`], one cycle at a time.
///
/// Each cycle takes as many queued requests, in arrival order, as fit the
/// instance's maximum batch size. A single request larger than that is
/// still handed over alone so it fails with the instance's overflow error.
pub struct InstanceDispatcher<M, T> {
    instance: Arc<ModelInstance<M, T>>,
    frontend: Arc<ChannelFrontend>,
    waiting_requests: Arc<Mutex<VecDeque<QueueItem>>>,
    handle: BatchWorkerHandle,
}

impl<M, T> InstanceDispatcher<M, T>
where
    M: Model<T> + 'static,
    T: RuntimeTensor,
{
    /// Start dispatching to `instance`. Must be called within a tokio runtime.
    pub fn new(instance: ModelInstance<M, T>) -> Self {
        let instance = Arc::new(instance);
        let frontend = Arc::new(ChannelFrontend::new());
        let waiting_requests = Arc::new(Mutex::new(VecDeque::new()));

        let handle = BatchWorkerHandle::spawn({
            let instance = instance.clone();
            let frontend = frontend.clone();
            let waiting_requests = waiting_requests.clone();
            move |signal| dispatch_loop(instance, frontend, waiting_requests, signal)
        });
        info!(model = instance.name(), "dispatcher started");

        Self {
            instance,
            frontend,
            waiting_requests,
            handle,
        }
    }

    pub fn instance(&self) -> &Arc<ModelInstance<M, T>> {
        &self.instance
    }

    /// Queue `request` for the next cycle with room for it.
    pub async fn submit(&self, request: InferenceRequest) -> ResponseHandle {
        let (tx, rx) = oneshot::channel();
        let batching = self.instance.config().batching_enabled();
        {
            let mut waiting = self.waiting_requests.lock().await;
            waiting.push_back(QueueItem::new(request, batching, tx));
        }
        self.handle.notify();
        ResponseHandle { receiver: rx }
    }

    /// Requests queued but not yet handed to a cycle.
    pub async fn pending(&self) -> usize {
        self.waiting_requests.lock().await.len()
    }

    pub fn statistics(&self) -> DispatchStatistics {
        self.frontend.statistics()
    }
}

async fn dispatch_loop<M, T>(
    instance: Arc<ModelInstance<M, T>>,
    frontend: Arc<ChannelFrontend>,
    waiting_requests: Arc<Mutex<VecDeque<QueueItem>>>,
    signal: WorkerSignal,
) where
    M: Model<T> + 'static,
    T: RuntimeTensor,
{
    let capacity = instance.max_batch_size().max(1);
    while signal.is_running() {
        let items = drain_possible_requests(capacity, &waiting_requests).await;
        if items.is_empty() {
            signal.idle(IDLE_POLL).await;
            continue;
        }

        let requests = items
            .into_iter()
            .map(|item| {
                let (request, sender) = item.into_parts();
                frontend.register(request.id(), sender);
                Some(request)
            })
            .collect::<Vec<_>>();
        debug!(model = instance.name(), requests = requests.len(), "dispatching cycle");
        instance.execute(requests, frontend.as_ref()).await;
    }
    debug!(model = instance.name(), "dispatcher stopped");
}

/// Take queued requests from the front while their rows fit `capacity`.
///
/// The first request is always taken.
async fn drain_possible_requests(
    capacity: usize,
    waiting_requests: &Mutex<VecDeque<QueueItem>>,
) -> Vec<QueueItem> {
    let mut waiting = waiting_requests.lock().await;
    let mut rows = 0;
    let mut take = 0;
    for item in waiting.iter() {
        if take > 0 && rows + item.batch_size() > capacity {
            break;
        }
        rows += item.batch_size();
        take += 1;
    }
    waiting.drain(..take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::RequestInput;
    use crate::dtype::DataType;

    fn item(rows: usize) -> QueueItem {
        let (tx, _rx) = oneshot::channel();
        let request = InferenceRequest::new().with_input(RequestInput::from_values(
            "INPUT__0",
            DataType::Int64,
            vec![rows],
            &vec![0i64; rows],
        ));
        QueueItem::new(request, true, tx)
    }

    #[tokio::test]
    async fn test_drain_respects_capacity() {
        let waiting = Mutex::new(VecDeque::from(vec![item(2), item(3), item(4), item(1)]));

        let first = drain_possible_requests(6, &waiting).await;
        assert_eq!(first.iter().map(QueueItem::batch_size).collect::<Vec<_>>(), vec![2, 3]);

        let second = drain_possible_requests(6, &waiting).await;
        assert_eq!(second.iter().map(QueueItem::batch_size).collect::<Vec<_>>(), vec![4, 1]);

        assert!(drain_possible_requests(6, &waiting).await.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_request_taken_alone() {
        let waiting = Mutex::new(VecDeque::from(vec![item(9), item(1)]));
        let drained = drain_possible_requests(4, &waiting).await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].batch_size(), 9);
        assert_eq!(waiting.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_request_resolves_handle() {
        let (tx, rx) = oneshot::channel::<Outcome>();
        drop(tx);
        let err = ResponseHandle { receiver: rx }.await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Unavailable);
    }
}
