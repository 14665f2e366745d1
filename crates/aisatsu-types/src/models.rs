use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A registered user. Ids are zero-padded 6-digit strings, assigned at
/// registration and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// The two fixed greeting kinds a user can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Morning,
    Night,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Morning => "morning",
            MessageType::Night => "night",
        }
    }

    /// Fixed notification template for this greeting, personalized with the
    /// sender's display name.
    pub fn template(&self, sender_name: &str) -> Greeting {
        match self {
            MessageType::Morning => Greeting {
                title: "🌅 おはよう！".to_string(),
                body: format!("{sender_name}さんからおはようメッセージ！"),
                greeting: "おはようございます！良い一日を！".to_string(),
            },
            MessageType::Night => Greeting {
                title: "🌙 おやすみ！".to_string(),
                body: format!("{sender_name}さんからおやすみメッセージ！"),
                greeting: "おやすみなさい！良い夢を！".to_string(),
            },
        }
    }
}

impl FromStr for MessageType {
    type Err = UnknownMessageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morning" => Ok(MessageType::Morning),
            "night" => Ok(MessageType::Night),
            other => Err(UnknownMessageType(other.to_string())),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct UnknownMessageType(pub String);

impl fmt::Display for UnknownMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown message type: {}", self.0)
    }
}

impl std::error::Error for UnknownMessageType {}

/// Rendered greeting content: `title`/`body` go into the push payload,
/// `greeting` is echoed back to the sender for the confirmation UI.
#[derive(Debug, Clone)]
pub struct Greeting {
    pub title: String,
    pub body: String,
    pub greeting: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_parses_known_values() {
        assert_eq!("morning".parse::<MessageType>().unwrap(), MessageType::Morning);
        assert_eq!("night".parse::<MessageType>().unwrap(), MessageType::Night);
        assert!("evening".parse::<MessageType>().is_err());
    }

    #[test]
    fn templates_are_personalized() {
        let g = MessageType::Morning.template("Alice");
        assert_eq!(g.title, "🌅 おはよう！");
        assert_eq!(g.body, "Aliceさんからおはようメッセージ！");
        assert_eq!(g.greeting, "おはようございます！良い一日を！");

        let g = MessageType::Night.template("Bob");
        assert_eq!(g.greeting, "おやすみなさい！良い夢を！");
    }
}
