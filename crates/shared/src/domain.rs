use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(MemberId);
id_newtype!(MessageId);
id_newtype!(ClassroomId);
id_newtype!(LessonId);

/// Length of the hex object ids the backend hands out for members.
pub const OBJECT_ID_HEX_LEN: usize = 24;

/// Whether `value` follows the 24-hex object id convention.
pub fn is_object_id(value: &str) -> bool {
    value.len() == OBJECT_ID_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A chat room: either classroom-wide or nested under a single lesson.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomKey {
    pub classroom_id: ClassroomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lesson_id: Option<LessonId>,
}

impl RoomKey {
    pub fn classroom(classroom_id: impl Into<String>) -> Self {
        Self {
            classroom_id: ClassroomId(classroom_id.into()),
            lesson_id: None,
        }
    }

    pub fn lesson(classroom_id: impl Into<String>, lesson_id: impl Into<String>) -> Self {
        Self {
            classroom_id: ClassroomId(classroom_id.into()),
            lesson_id: Some(LessonId(lesson_id.into())),
        }
    }

    pub fn is_lesson_room(&self) -> bool {
        self.lesson_id.is_some()
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lesson_id {
            Some(lesson_id) => write!(f, "classroom:{}/lesson:{}", self.classroom_id, lesson_id),
            None => write!(f, "classroom:{}", self.classroom_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Teachers and admins moderate every message in their rooms.
    pub fn can_moderate(self) -> bool {
        matches!(self, Role::Teacher | Role::Admin)
    }
}
