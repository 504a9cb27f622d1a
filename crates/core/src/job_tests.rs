// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

fn ts(sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, sec).unwrap()
}

#[yare::parameterized(
    succeeded = { JobStatus::Succeeded },
    failed    = { JobStatus::Failed },
    canceled  = { JobStatus::Canceled },
)]
fn terminal_statuses(status: JobStatus) {
    assert!(status.is_terminal());
}

#[yare::parameterized(
    queued        = { JobStatus::Queued },
    starting      = { JobStatus::Starting },
    joining       = { JobStatus::Joining },
    waiting_lobby = { JobStatus::WaitingLobby },
    recording     = { JobStatus::Recording },
    finalizing    = { JobStatus::Finalizing },
    uploading     = { JobStatus::Uploading },
)]
fn non_terminal_statuses(status: JobStatus) {
    assert!(!status.is_terminal());
}

#[yare::parameterized(
    queued_starting       = { JobStatus::Queued, JobStatus::Starting },
    starting_joining      = { JobStatus::Starting, JobStatus::Joining },
    joining_lobby         = { JobStatus::Joining, JobStatus::WaitingLobby },
    joining_recording     = { JobStatus::Joining, JobStatus::Recording },
    lobby_recording       = { JobStatus::WaitingLobby, JobStatus::Recording },
    recording_finalizing  = { JobStatus::Recording, JobStatus::Finalizing },
    finalizing_succeeded  = { JobStatus::Finalizing, JobStatus::Succeeded },
    succeeded_uploading   = { JobStatus::Succeeded, JobStatus::Uploading },
    uploading_succeeded   = { JobStatus::Uploading, JobStatus::Succeeded },
    starting_failed       = { JobStatus::Starting, JobStatus::Failed },
    recording_canceled    = { JobStatus::Recording, JobStatus::Canceled },
    lobby_canceled        = { JobStatus::WaitingLobby, JobStatus::Canceled },
    retry_requeue         = { JobStatus::Joining, JobStatus::Queued },
)]
fn allowed_transitions(from: JobStatus, to: JobStatus) {
    assert!(JobStatus::can_transition(from, to));
}

#[yare::parameterized(
    succeeded_failed     = { JobStatus::Succeeded, JobStatus::Failed },
    failed_recording     = { JobStatus::Failed, JobStatus::Recording },
    canceled_queued      = { JobStatus::Canceled, JobStatus::Queued },
    succeeded_canceled   = { JobStatus::Succeeded, JobStatus::Canceled },
    queued_recording     = { JobStatus::Queued, JobStatus::Recording },
    recording_succeeded  = { JobStatus::Recording, JobStatus::Succeeded },
    failed_failed        = { JobStatus::Failed, JobStatus::Failed },
)]
fn rejected_transitions(from: JobStatus, to: JobStatus) {
    assert!(!JobStatus::can_transition(from, to));
}

#[test]
fn terminal_statuses_are_never_rewritten() {
    for from in [JobStatus::Failed, JobStatus::Canceled] {
        for to in [
            JobStatus::Queued,
            JobStatus::Starting,
            JobStatus::Recording,
            JobStatus::Succeeded,
            JobStatus::Uploading,
        ] {
            assert!(!JobStatus::can_transition(from, to), "{from} -> {to} must be rejected");
        }
    }
}

#[test]
fn error_code_display_is_screaming_snake() {
    assert_eq!(ErrorCode::LobbyTimeout.to_string(), "LOBBY_TIMEOUT");
    assert_eq!(ErrorCode::FfmpegError.to_string(), "FFMPEG_ERROR");
    assert_eq!(
        serde_json::to_string(&ErrorCode::VirtualEnvError).unwrap(),
        "\"VIRTUAL_ENV_ERROR\""
    );
}

#[test]
fn effective_min_duration_clamps_to_duration() {
    let job = Job::builder().duration_sec(600).min_duration_sec(30u64).build();
    assert_eq!(job.effective_min_duration_sec(), 30);

    let job = Job::builder().duration_sec(600).build();
    assert_eq!(job.effective_min_duration_sec(), 600);

    let job = Job::builder().duration_sec(60).min_duration_sec(300u64).build();
    assert_eq!(job.effective_min_duration_sec(), 60);
}

#[test]
fn timestamps_ordering_invariant() {
    let mut stamps = JobTimestamps {
        started_at: Some(ts(0)),
        joined_at: Some(ts(5)),
        recording_started_at: Some(ts(6)),
        recording_stopped_at: Some(ts(50)),
        completed_at: Some(ts(51)),
        ..Default::default()
    };
    assert!(stamps.is_ordered());

    stamps.joined_at = None;
    assert!(stamps.is_ordered(), "nulls are skipped");

    stamps.recording_stopped_at = Some(ts(2));
    assert!(!stamps.is_ordered());
}

#[test]
fn job_row_serde_roundtrip() {
    let job = Job::builder()
        .status(JobStatus::Failed)
        .error_code(ErrorCode::LobbyTimeout)
        .error_message("Lobby timeout - not admitted to meeting")
        .end_reason(EndReason::Failed)
        .build();
    let json = serde_json::to_string(&job).unwrap();
    let parsed: Job = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, job);
    assert!(json.contains("\"LOBBY_TIMEOUT\""));
}
