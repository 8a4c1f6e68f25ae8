use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

pub type UserId = Uuid;
pub type RoomId = Uuid;
pub type MessageId = Uuid;

/// Epoch milliseconds.
pub type Millis = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub bio: String,
    pub year: Option<i32>,
    pub major: Option<String>,
    pub interests: Vec<String>,
    pub photo_url: Option<String>,
    pub created_at: Millis,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SwipeAction {
    Like,
    Pass,
}

impl SwipeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwipeAction::Like => "like",
            SwipeAction::Pass => "pass",
        }
    }
}

impl fmt::Display for SwipeAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwipeAction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(SwipeAction::Like),
            "pass" => Ok(SwipeAction::Pass),
            other => Err(EngineError::Internal(format!("unknown swipe action {other:?}"))),
        }
    }
}

/// Result of a swipe as seen by the swiping user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwipeOutcome {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_profile: Option<Profile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

impl SwipeOutcome {
    pub fn no_match() -> Self {
        SwipeOutcome {
            matched: false,
            matched_profile: None,
            room_id: None,
        }
    }
}

/// A conversation between the two members of a match.
///
/// `member_a < member_b` always holds, so one pair maps to one room no matter
/// who swiped first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub member_a: UserId,
    pub member_b: UserId,
    pub last_message_preview: Option<String>,
    pub last_activity_at: Millis,
    pub created_at: Millis,
}

impl Room {
    pub fn has_member(&self, user: UserId) -> bool {
        self.member_a == user || self.member_b == user
    }

    pub fn peer_of(&self, user: UserId) -> Option<UserId> {
        if user == self.member_a {
            Some(self.member_b)
        } else if user == self.member_b {
            Some(self.member_a)
        } else {
            None
        }
    }

    pub fn members(&self) -> [UserId; 2] {
        [self.member_a, self.member_b]
    }
}

/// Orders an unordered pair the way rooms and matches store it.
pub fn canonical_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b { (a, b) } else { (b, a) }
}

/// One entry of a user's conversation list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSummary {
    pub room: Room,
    pub peer: Option<Profile>,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            other => Err(EngineError::Internal(format!("unknown message status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub body: String,
    pub status: MessageStatus,
    pub created_at: Millis,
    /// Insertion sequence, breaks `created_at` ties.
    pub seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingState {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub is_typing: bool,
    pub updated_at: Millis,
}
