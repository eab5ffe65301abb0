//! 会话类型

use crate::errors::DomainError;

/// 会话类型（单聊、群聊、超级群、通知）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionType {
    Single,
    Group,
    SuperGroup,
    Notification,
}

impl SessionType {
    pub fn code(self) -> i32 {
        match self {
            SessionType::Single => 1,
            SessionType::Group => 2,
            SessionType::SuperGroup => 3,
            SessionType::Notification => 4,
        }
    }
}

impl TryFrom<i32> for SessionType {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SessionType::Single),
            2 => Ok(SessionType::Group),
            3 => Ok(SessionType::SuperGroup),
            4 => Ok(SessionType::Notification),
            _ => Err(DomainError::UnknownSessionType { value }),
        }
    }
}
