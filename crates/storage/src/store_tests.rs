// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::state::RowEvent;
use mrec_core::{Job, JobStatus};
use tempfile::tempdir;

fn job_event() -> (mrec_core::JobId, RowEvent) {
    let job = Job::builder().build();
    (job.id, RowEvent::JobCreated { job })
}

#[test]
fn commit_applies_and_persists() {
    let dir = tempdir().unwrap();
    let (id, event) = job_event();
    {
        let store = Store::open(dir.path()).unwrap();
        store.commit(event).unwrap();
        assert!(store.read(|s| s.jobs.contains_key(id.as_str())));
    }
    let store = Store::open(dir.path()).unwrap();
    assert!(store.read(|s| s.jobs.contains_key(id.as_str())));
}

#[test]
fn commit_if_rejects_without_writing() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let (id, event) = job_event();

    let applied = store.commit_if(|_| false, event.clone()).unwrap();
    assert!(!applied);
    assert!(store.read(|s| s.jobs.is_empty()));

    assert!(store.commit_if(|_| true, event).unwrap());
    assert!(store.read(|s| s.jobs.contains_key(id.as_str())));
}

#[test]
fn checkpoint_then_reopen_replays_nothing_twice() {
    let dir = tempdir().unwrap();
    let (id, event) = job_event();
    {
        let store = Store::open(dir.path()).unwrap();
        store.commit(event).unwrap();
        store.checkpoint().unwrap();
        store
            .commit(RowEvent::JobUpdated {
                id,
                status: JobStatus::Starting,
                update: crate::repository::JobUpdate::default(),
            })
            .unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    let status = store.read(|s| s.jobs.get(id.as_str()).map(|j| j.status));
    assert_eq!(status, Some(JobStatus::Starting));
    assert_eq!(store.read(|s| s.jobs.len()), 1);
}
