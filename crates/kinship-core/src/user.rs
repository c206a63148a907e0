use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Kept exactly as supplied; never parsed as a number.
    pub age: String,
    #[serde(default)]
    pub friends: Vec<String>,
}

/// Creation input. An `id` sent by a client is ignored; the store assigns one.
/// Absent fields decode to their empty value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewUser {
    pub name: String,
    pub age: String,
    pub friends: Option<Vec<String>>,
}

impl NewUser {
    pub fn new(name: impl Into<String>, age: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age: age.into(),
            friends: None,
        }
    }
}
