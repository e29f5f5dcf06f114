use tokio::sync::oneshot;

use super::{InferenceRequest, InferenceResponse};
use crate::error::ServingError;

/// The terminal outcome delivered for one request.
pub(crate) type Outcome = Result<InferenceResponse, ServingError>;

/// # QueueItem
///
/// A queued request paired with the channel its outcome is delivered on.
///
/// The item keeps the rows the request adds to a cycle so the dispatcher can
/// size a cycle without looking at the inputs again.
pub(crate) struct QueueItem {
    request: InferenceRequest,

    batch_size: usize,

    /// Channel for sending the outcome back to the requester
    sender: oneshot::Sender<Outcome>,
}

impl QueueItem {
    /// Creates a new `QueueItem`; with `batching` off every request is one
    /// row regardless of its shape.
    pub fn new(request: InferenceRequest, batching: bool, sender: oneshot::Sender<Outcome>) -> Self {
        let batch_size = if batching {
            request.batch_size().unwrap_or(1)
        } else {
            1
        };
        Self {
            request,
            batch_size,
            sender,
        }
    }

    pub fn request(&self) -> &InferenceRequest {
        &self.request
    }

    /// The rows this request adds to a cycle.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn into_parts(self) -> (InferenceRequest, oneshot::Sender<Outcome>) {
        (self.request, self.sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::RequestInput;
    use crate::dtype::DataType;
    use tokio::sync::oneshot::channel;
    use tokio::test;

    fn request(rows: usize) -> InferenceRequest {
        InferenceRequest::new().with_input(RequestInput::from_values(
            "INPUT__0",
            DataType::Fp32,
            vec![rows, 2],
            &vec![0f32; rows * 2],
        ))
    }

    #[test]
    async fn test_queue_item_batch_size() {
        let (tx, _rx) = channel();
        let item = QueueItem::new(request(3), true, tx);
        assert_eq!(item.batch_size(), 3, "leading dimension counts when batching");

        let (tx, _rx) = channel();
        let item = QueueItem::new(request(3), false, tx);
        assert_eq!(item.batch_size(), 1, "each request is one row without batching");
    }

    #[test]
    async fn test_queue_item_delivers_outcome() {
        let (tx, rx) = channel();
        let item = QueueItem::new(request(1), true, tx);
        let id = item.request().id();

        let (request, sender) = item.into_parts();
        sender.send(Ok(InferenceResponse::new(request.id()))).unwrap();

        let received = rx.await.unwrap().unwrap();
        assert_eq!(received.request_id(), id, "outcome should carry the request id");
    }

    #[test]
    async fn test_dropped_item_closes_channel() {
        let (tx, rx) = channel();
        drop(QueueItem::new(request(1), true, tx));
        assert!(rx.await.is_err(), "receiver should observe the dropped sender");
    }
}
