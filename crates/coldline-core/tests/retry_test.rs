// Copyright (C) 2025 Coldline Project
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for transient-failure retries and failure consistency.

mod common;

use std::sync::Arc;

use common::*;

use coldline_core::persistence::{JobStatus, PRODUCT_MODEL, Persistence};

#[tokio::test]
async fn test_transient_export_failures_are_retried() {
    // Two injected failures fit inside the three allowed attempts.
    let flaky = Arc::new(FlakyStorage::new(2, 0));
    let blobs = Arc::new(flaky.inner().clone());
    let ctx = TestContext::with_pipeline_storage(flaky, blobs).await;

    ctx.insert_product("soap", 199).await;
    let response = ctx.jobs.request_archive(PRODUCT_MODEL, None).await.unwrap();
    ctx.worker.run_once().await.unwrap();

    let job = ctx.jobs.get_job(&response.job_id).await.unwrap();
    assert_eq!(job.job_status().unwrap(), JobStatus::Succeeded);
    assert_eq!(ctx.live_count().await, 0);
    assert_eq!(ctx.storage.len().await, 1);
}

#[tokio::test]
async fn test_exhausted_retries_fail_job_and_leave_record_live() {
    // More failures than attempts; the export cannot complete.
    let flaky = Arc::new(FlakyStorage::new(10, 0));
    let blobs = Arc::new(flaky.inner().clone());
    let ctx = TestContext::with_pipeline_storage(flaky, blobs).await;

    let soap = ctx.insert_product("soap", 199).await;
    let response = ctx.jobs.request_archive(PRODUCT_MODEL, None).await.unwrap();
    ctx.worker.run_once().await.unwrap();

    let job = ctx.jobs.get_job(&response.job_id).await.unwrap();
    assert_eq!(job.job_status().unwrap(), JobStatus::Failed);
    let error = job.error.expect("failure reason recorded");
    assert!(error.contains("injected failure"), "got: {}", error);

    // The record stayed fully live: still queryable, no mapping, no blob,
    // and no lingering claim blocking a later export.
    assert!(ctx.persistence.get_product(&soap.id).await.unwrap().is_some());
    assert_eq!(ctx.mapping_count().await, 0);
    assert!(ctx.storage.is_empty().await);

    let retry = ctx.jobs.request_archive(PRODUCT_MODEL, None).await.unwrap();
    // Storage is still broken, but the record must be claimable again.
    ctx.worker.run_once().await.unwrap();
    let job = ctx.jobs.get_job(&retry.job_id).await.unwrap();
    let error = job.error.expect("second job also failed on storage");
    assert!(error.contains("injected failure"), "got: {}", error);
}

#[tokio::test]
async fn test_transient_import_failures_are_retried() {
    let flaky = Arc::new(FlakyStorage::new(0, 2));
    let blobs = Arc::new(flaky.inner().clone());
    let ctx = TestContext::with_pipeline_storage(flaky, blobs).await;

    ctx.insert_product("soap", 199).await;
    ctx.jobs.request_archive(PRODUCT_MODEL, None).await.unwrap();
    ctx.worker.run_once().await.unwrap();
    assert_eq!(ctx.live_count().await, 0);

    let retrieval = ctx.jobs.request_retrieval(PRODUCT_MODEL, None).await.unwrap();
    ctx.jobs.trigger_import(&retrieval.job_id).await.unwrap();
    ctx.worker.run_once().await.unwrap();

    let job = ctx.jobs.get_job(&retrieval.job_id).await.unwrap();
    assert_eq!(job.job_status().unwrap(), JobStatus::Succeeded);
    assert_eq!(ctx.live_count().await, 1);
    assert_eq!(ctx.mapping_count().await, 0);
}

#[tokio::test]
async fn test_failed_import_keeps_mapping_and_blob() {
    let flaky = Arc::new(FlakyStorage::new(0, 10));
    let blobs = Arc::new(flaky.inner().clone());
    let ctx = TestContext::with_pipeline_storage(flaky, blobs).await;

    ctx.insert_product("soap", 199).await;
    ctx.jobs.request_archive(PRODUCT_MODEL, None).await.unwrap();
    ctx.worker.run_once().await.unwrap();

    let retrieval = ctx.jobs.request_retrieval(PRODUCT_MODEL, None).await.unwrap();
    ctx.jobs.trigger_import(&retrieval.job_id).await.unwrap();
    ctx.worker.run_once().await.unwrap();

    let job = ctx.jobs.get_job(&retrieval.job_id).await.unwrap();
    assert_eq!(job.job_status().unwrap(), JobStatus::Failed);

    // The record stayed fully archived; a later retrieval can still
    // restore it.
    assert_eq!(ctx.live_count().await, 0);
    assert_eq!(ctx.mapping_count().await, 1);
    assert_eq!(ctx.storage.len().await, 1);
}
