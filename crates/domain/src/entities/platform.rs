//! 客户端平台

use std::fmt;

use crate::errors::DomainError;

/// 客户端平台
///
/// 推送令牌按 (用户, 平台名) 分组保存。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Ios,
    Android,
    Windows,
    Osx,
    Web,
    MiniWeb,
    Linux,
    AndroidPad,
    IPad,
}

impl Platform {
    pub fn id(self) -> i32 {
        match self {
            Platform::Ios => 1,
            Platform::Android => 2,
            Platform::Windows => 3,
            Platform::Osx => 4,
            Platform::Web => 5,
            Platform::MiniWeb => 6,
            Platform::Linux => 7,
            Platform::AndroidPad => 8,
            Platform::IPad => 9,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::Ios => "IOS",
            Platform::Android => "Android",
            Platform::Windows => "Windows",
            Platform::Osx => "OSX",
            Platform::Web => "Web",
            Platform::MiniWeb => "MiniWebApp",
            Platform::Linux => "Linux",
            Platform::AndroidPad => "APad",
            Platform::IPad => "IPad",
        }
    }
}

impl TryFrom<i32> for Platform {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Platform::Ios),
            2 => Ok(Platform::Android),
            3 => Ok(Platform::Windows),
            4 => Ok(Platform::Osx),
            5 => Ok(Platform::Web),
            6 => Ok(Platform::MiniWeb),
            7 => Ok(Platform::Linux),
            8 => Ok(Platform::AndroidPad),
            9 => Ok(Platform::IPad),
            _ => Err(DomainError::UnknownPlatform { value }),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
