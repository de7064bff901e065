use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Account role. Closed set — route handlers match exhaustively so an
/// unhandled role is a compile error, not a silent fall-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Alumni,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Alumni => "alumni",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "alumni" => Ok(Role::Alumni),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direct/batch message payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            other => Err(format!("unknown message type: {}", other)),
        }
    }
}

impl Default for MessageType {
    fn default() -> Self {
        MessageType::Text
    }
}

/// Subscription tier. Monthly unlocks one alumni, quarterly unlocks all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Monthly,
    Quarterly,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Monthly => "monthly",
            SubscriptionTier::Quarterly => "quarterly",
        }
    }
}

impl FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(SubscriptionTier::Monthly),
            "quarterly" => Ok(SubscriptionTier::Quarterly),
            other => Err(format!("unknown subscription type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Student, Role::Alumni, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn tier_serde_uses_lowercase() {
        let json = serde_json::to_string(&SubscriptionTier::Quarterly).unwrap();
        assert_eq!(json, "\"quarterly\"");
        let tier: SubscriptionTier = serde_json::from_str("\"monthly\"").unwrap();
        assert_eq!(tier, SubscriptionTier::Monthly);
    }
}
