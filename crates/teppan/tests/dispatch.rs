#![cfg(feature = "dispatch")]

mod common;

use std::sync::Arc;

use common::{Broken, Scale, config, pairs};
use teppan::prelude::*;

fn dispatcher<M: Model<HostTensor> + 'static>(max_batch_size: usize, model: M) -> InstanceDispatcher<M, HostTensor> {
    let instance = ModelInstance::new(config(max_batch_size), model, Arc::new(HostMemoryManager::new())).unwrap();
    InstanceDispatcher::new(instance)
}

#[tokio::test]
async fn concurrent_requests_get_their_own_rows() {
    let dispatcher = dispatcher(4, Scale { factor: 2.0 });

    let first = dispatcher.submit(pairs(1, 1.0)).await;
    let second = dispatcher.submit(pairs(2, 10.0)).await;
    let third = dispatcher.submit(pairs(1, 100.0)).await;

    let (first, second, third) = tokio::join!(first, second, third);
    assert_eq!(first.unwrap().output("OUTPUT__0").unwrap().values::<f32>(), vec![2.0, 4.0]);
    assert_eq!(
        second.unwrap().output("OUTPUT__0").unwrap().values::<f32>(),
        vec![20.0, 22.0, 24.0, 26.0]
    );
    assert_eq!(third.unwrap().output("OUTPUT__0").unwrap().values::<f32>(), vec![200.0, 202.0]);

    let statistics = dispatcher.statistics();
    assert_eq!(statistics.success_count, 3);
    assert_eq!(statistics.failure_count, 0);
    assert_eq!(statistics.batched_rows, 4);
    assert_eq!(dispatcher.pending().await, 0);
}

#[tokio::test]
async fn cycles_never_exceed_the_maximum_batch() {
    let dispatcher = dispatcher(2, Scale { factor: 1.0 });

    let mut handles = Vec::new();
    for i in 0..5 {
        handles.push(dispatcher.submit(pairs(1, i as f32)).await);
    }
    for (i, handle) in handles.into_iter().enumerate() {
        let response = handle.await.unwrap();
        let start = i as f32;
        assert_eq!(response.output("OUTPUT__0").unwrap().values::<f32>(), vec![start, start + 1.0]);
    }

    let statistics = dispatcher.statistics();
    assert_eq!(statistics.success_count, 5);
    assert!(statistics.batch_count >= 3);
    assert_eq!(statistics.batched_rows, 5);
}

#[tokio::test]
async fn oversized_request_is_rejected() {
    let dispatcher = dispatcher(2, Scale { factor: 1.0 });

    let err = dispatcher.submit(pairs(3, 0.0)).await.await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert_eq!(err.message(), "batch size 3 for 'pairs', max allowed is 2");

    let ok = dispatcher.submit(pairs(2, 0.0)).await.await;
    assert!(ok.is_ok());
}

#[tokio::test]
async fn model_errors_are_delivered() {
    let dispatcher = dispatcher(4, Broken::default());

    let err = dispatcher.submit(pairs(1, 0.0)).await.await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);
    assert_eq!(err.message(), "model execute failure: CUDA out of memory");
    assert_eq!(dispatcher.statistics().failure_count, 1);
}
