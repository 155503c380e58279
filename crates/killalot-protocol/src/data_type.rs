use std::fmt;

use serde::Serialize;

/// The four kinds of application payload a transaction can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Channel,
    Command,
    Image,
    Binary,
}

impl DataType {
    pub const ALL: [DataType; 4] = [
        DataType::Channel,
        DataType::Command,
        DataType::Image,
        DataType::Binary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Channel => "channel",
            DataType::Command => "command",
            DataType::Image => "image",
            DataType::Binary => "binary",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
