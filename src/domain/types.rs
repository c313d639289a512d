//! Shared domain enumerations aligned with persisted database enums.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "post_status", rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

impl FromStr for PostStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            other => Err(DomainError::unknown_variant("post status", other)),
        }
    }
}

/// Moderation state of a friend link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "friend_link_status", rename_all = "snake_case")]
pub enum FriendLinkStatus {
    Applying,
    Up,
    Down,
}

/// Mail sent to the applicant after a moderation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendLinkNotice {
    Pass,
    Reject,
}

impl FriendLinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applying => "applying",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// Status-to-mail table; statuses without an entry send nothing.
    pub fn notification(self) -> Option<FriendLinkNotice> {
        match self {
            Self::Up => Some(FriendLinkNotice::Pass),
            Self::Down => Some(FriendLinkNotice::Reject),
            Self::Applying => None,
        }
    }
}

impl FromStr for FriendLinkStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "applying" => Ok(Self::Applying),
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(DomainError::unknown_variant("friend link status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Normal,
    Pause,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Pause => "pause",
        }
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "0" => Ok(Self::Normal),
            "pause" | "paused" | "1" => Ok(Self::Pause),
            other => Err(DomainError::unknown_variant("job status", other)),
        }
    }
}

/// How a scheduled job treats fire times it missed while busy or asleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "misfire_policy", rename_all = "snake_case")]
pub enum MisfirePolicy {
    Default,
    IgnoreMisfires,
    FireAndProceed,
    DoNothing,
}

impl MisfirePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::IgnoreMisfires => "ignore_misfires",
            Self::FireAndProceed => "fire_and_proceed",
            Self::DoNothing => "do_nothing",
        }
    }
}

impl FromStr for MisfirePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "0" => Ok(Self::Default),
            "ignore_misfires" | "1" => Ok(Self::IgnoreMisfires),
            "fire_and_proceed" | "2" => Ok(Self::FireAndProceed),
            "do_nothing" | "3" => Ok(Self::DoNothing),
            other => Err(DomainError::unknown_variant("misfire policy", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "job_run_status", rename_all = "snake_case")]
pub enum JobRunStatus {
    Success,
    Failure,
}

impl JobRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl FromStr for JobRunStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(DomainError::unknown_variant("job run status", other)),
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Display for $ty {
                fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                    f.write_str(self.as_str())
                }
            }
        )+
    };
}

display_as_str!(
    PostStatus,
    FriendLinkStatus,
    JobStatus,
    MisfirePolicy,
    JobRunStatus
);
