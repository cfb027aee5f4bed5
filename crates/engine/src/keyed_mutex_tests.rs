// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[tokio::test]
async fn same_key_serialises_across_tasks() {
    let mutex = Arc::new(KeyedMutex::new());
    let order = Arc::new(SyncMutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..5 {
        let mutex = mutex.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            let _guard = mutex.lock("sess-1").await;
            tokio::time::sleep(Duration::from_millis(1)).await;
            order.lock().push(i);
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(order.lock().len(), 5);
}

#[tokio::test]
async fn different_keys_do_not_block_each_other() {
    let mutex = Arc::new(KeyedMutex::new());
    let counter = Arc::new(AtomicU32::new(0));

    let a = {
        let mutex = mutex.clone();
        let counter = counter.clone();
        tokio::spawn(async move {
            let _guard = mutex.lock("sess-a").await;
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
        })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    let b = {
        let mutex = mutex.clone();
        let counter = counter.clone();
        tokio::spawn(async move {
            let _guard = mutex.lock("sess-b").await;
            counter.fetch_add(1, Ordering::SeqCst);
        })
    };

    b.await.unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    a.await.unwrap();
}

#[tokio::test]
async fn uncontended_key_is_pruned_after_release() {
    let mutex = KeyedMutex::new();
    {
        let _guard = mutex.lock("sess-1").await;
    }
    assert!(mutex.locks.lock().is_empty());
}
