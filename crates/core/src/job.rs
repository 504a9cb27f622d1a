// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording job rows and the job status state machine.
//!
//! A `Job` is one execution of a recording. It snapshots every meeting field
//! needed to join at creation time, so concurrent edits to the `Meeting` or
//! `Schedule` never change a run in flight.

use crate::meeting::ProviderKind;
use crate::schedule::{AutoDetectMode, DurationMode, ScheduleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Opaque short job id: 8 lowercase hex characters.
    pub struct JobId(hex 8);
}

/// Recording job status.
///
/// Terminal statuses are never rewritten; see [`JobStatus::can_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Starting,
    Joining,
    WaitingLobby,
    Recording,
    Finalizing,
    Uploading,
    Succeeded,
    Failed,
    Canceled,
}

crate::simple_display! {
    JobStatus {
        Queued => "queued",
        Starting => "starting",
        Joining => "joining",
        WaitingLobby => "waiting_lobby",
        Recording => "recording",
        Finalizing => "finalizing",
        Uploading => "uploading",
        Succeeded => "succeeded",
        Failed => "failed",
        Canceled => "canceled",
    }
}

impl JobStatus {
    /// Statuses that end a job's lifecycle. `uploading` is not terminal:
    /// the upload path moves `succeeded → uploading → succeeded`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed | JobStatus::Canceled)
    }

    /// Whether `from → to` is an allowed transition.
    ///
    /// `canceled` may preempt any non-terminal status, and `failed` is
    /// reachable from any non-terminal status (the worker can fail in every
    /// phase). Everything else follows the forward path.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        use JobStatus::*;
        if from == to {
            return false;
        }
        match (from, to) {
            // Failure and cancellation preempt any non-terminal state.
            (f, Failed) if !f.is_terminal() => true,
            (f, Canceled) if !f.is_terminal() => true,
            // Retry reset: the runner re-queues a job between attempts.
            (f, Queued) if !f.is_terminal() => true,
            (Queued, Starting) => true,
            (Starting, Joining) => true,
            (Joining, WaitingLobby | Recording) => true,
            (WaitingLobby, Recording) => true,
            (Recording, Finalizing) => true,
            (Finalizing, Succeeded) => true,
            // Upload path; no status regression on upload failure.
            (Succeeded, Uploading) => true,
            (Uploading, Succeeded) => true,
            _ => false,
        }
    }
}

/// Stable error codes surfaced on failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Join
    JoinTimeout,
    JoinFailed,
    InvalidUrl,
    MeetingNotFound,
    PasswordRequired,
    PasswordIncorrect,
    // Lobby
    LobbyTimeout,
    LobbyRejected,
    // Recording
    RecordingStartFailed,
    RecordingInterrupted,
    FfmpegError,
    // Meeting
    MeetingEnded,
    KickedFromMeeting,
    ConnectionLost,
    // System
    BrowserCrashed,
    VirtualEnvError,
    DiskFull,
    InternalError,
    // User
    Canceled,
}

crate::simple_display! {
    ErrorCode {
        JoinTimeout => "JOIN_TIMEOUT",
        JoinFailed => "JOIN_FAILED",
        InvalidUrl => "INVALID_URL",
        MeetingNotFound => "MEETING_NOT_FOUND",
        PasswordRequired => "PASSWORD_REQUIRED",
        PasswordIncorrect => "PASSWORD_INCORRECT",
        LobbyTimeout => "LOBBY_TIMEOUT",
        LobbyRejected => "LOBBY_REJECTED",
        RecordingStartFailed => "RECORDING_START_FAILED",
        RecordingInterrupted => "RECORDING_INTERRUPTED",
        FfmpegError => "FFMPEG_ERROR",
        MeetingEnded => "MEETING_ENDED",
        KickedFromMeeting => "KICKED_FROM_MEETING",
        ConnectionLost => "CONNECTION_LOST",
        BrowserCrashed => "BROWSER_CRASHED",
        VirtualEnvError => "VIRTUAL_ENV_ERROR",
        DiskFull => "DISK_FULL",
        InternalError => "INTERNAL_ERROR",
        Canceled => "CANCELED",
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Duration window elapsed or an operator finished the run early.
    Completed,
    /// The detection ensemble voted the meeting over.
    AutoDetected,
    Canceled,
    Failed,
    /// The meeting-end deadline passed before recording could start.
    Timeout,
}

crate::simple_display! {
    EndReason {
        Completed => "completed",
        AutoDetected => "auto_detected",
        Canceled => "canceled",
        Failed => "failed",
        Timeout => "timeout",
    }
}

/// Artifact metadata for a completed recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub output_path: PathBuf,
    pub file_size: u64,
    pub duration_sec: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Diagnostic bundle flags; each flag reflects whether the file existed when
/// the bundle was written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticInfo {
    pub dir: PathBuf,
    pub has_screenshot: bool,
    pub has_html_dump: bool,
    pub has_console_log: bool,
}

/// Lifecycle timestamps, all UTC. Each is set at most once, in order:
/// `started ≤ joined ≤ recording_started ≤ recording_stopped ≤ completed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobTimestamps {
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub joined_at: Option<DateTime<Utc>>,
    pub recording_started_at: Option<DateTime<Utc>>,
    pub recording_stopped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl JobTimestamps {
    /// Check the ordering invariant over the non-null phase timestamps.
    pub fn is_ordered(&self) -> bool {
        let phases = [
            self.started_at,
            self.joined_at,
            self.recording_started_at,
            self.recording_stopped_at,
            self.completed_at,
        ];
        let mut last: Option<DateTime<Utc>> = None;
        for ts in phases.into_iter().flatten() {
            if let Some(prev) = last {
                if ts < prev {
                    return false;
                }
            }
            last = Some(ts);
        }
        true
    }
}

/// One execution of a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub schedule_id: Option<ScheduleId>,

    // Snapshot of the meeting/schedule fields needed to join.
    pub provider: ProviderKind,
    pub meeting_code: String,
    pub display_name: String,
    pub base_url: Option<String>,
    pub password: Option<String>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,

    pub duration_sec: u64,
    pub lobby_wait_sec: u64,
    pub resolution_w: u32,
    pub resolution_h: u32,
    pub layout_preset: String,
    pub duration_mode: DurationMode,
    pub auto_detect_mode: Option<AutoDetectMode>,
    pub min_duration_sec: Option<u64>,
    pub stillness_timeout_sec: u64,
    pub dry_run: bool,
    /// Wall-clock instant past which no retry is attempted and a fixed-mode
    /// window is re-clamped.
    pub deadline_at: Option<DateTime<Utc>>,

    pub status: JobStatus,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub end_reason: Option<EndReason>,

    #[serde(flatten)]
    pub timestamps: JobTimestamps,

    pub recording: Option<RecordingInfo>,
    pub diagnostics: Option<DiagnosticInfo>,

    pub upload_enabled: bool,
    pub upload_privacy: String,
    pub upload_video_id: Option<String>,
    /// Opaque message id returned by the notifier's `started` event, kept
    /// for in-place updates.
    pub notify_message_id: Option<String>,
}

impl Job {
    /// Interval from recording start during which end detection is
    /// suppressed: `min(min_duration ?? duration, duration)`.
    pub fn effective_min_duration_sec(&self) -> u64 {
        self.min_duration_sec
            .unwrap_or(self.duration_sec)
            .min(self.duration_sec)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            meeting_code: String = "testroom-1",
            display_name: String = "Recorder Bot",
            layout_preset: String = "speaker",
            upload_privacy: String = "unlisted",
        }
        set {
            provider: ProviderKind = ProviderKind::Jitsi,
            duration_sec: u64 = 60,
            lobby_wait_sec: u64 = 900,
            resolution_w: u32 = 1280,
            resolution_h: u32 = 720,
            duration_mode: DurationMode = DurationMode::Fixed,
            stillness_timeout_sec: u64 = 180,
            dry_run: bool = false,
            status: JobStatus = JobStatus::Queued,
            upload_enabled: bool = false,
            timestamps: JobTimestamps = JobTimestamps::default(),
        }
        option {
            schedule_id: ScheduleId = None,
            base_url: String = None,
            password: String = None,
            guest_name: String = None,
            guest_email: String = None,
            auto_detect_mode: AutoDetectMode = None,
            min_duration_sec: u64 = None,
            deadline_at: DateTime<Utc> = None,
            error_code: ErrorCode = None,
            error_message: String = None,
            end_reason: EndReason = None,
            recording: RecordingInfo = None,
            diagnostics: DiagnosticInfo = None,
            upload_video_id: String = None,
            notify_message_id: String = None,
        }
        computed {
            id: JobId = JobId::new_random(),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
