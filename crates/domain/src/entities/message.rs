//! 缓存消息实体

use serde::{Deserialize, Serialize};

use super::encoding::base64_bytes;
use crate::errors::DomainError;

/// 消息状态
///
/// 线格式上是整数，与客户端约定的状态码一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum MsgStatus {
    #[default]
    Normal,
    SendSuccess,
    SendFailed,
    Deleted,
}

impl From<MsgStatus> for i32 {
    fn from(value: MsgStatus) -> Self {
        match value {
            MsgStatus::Normal => 1,
            MsgStatus::SendSuccess => 2,
            MsgStatus::SendFailed => 3,
            MsgStatus::Deleted => 4,
        }
    }
}

impl TryFrom<i32> for MsgStatus {
    type Error = DomainError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MsgStatus::Normal),
            2 => Ok(MsgStatus::SendSuccess),
            3 => Ok(MsgStatus::SendFailed),
            4 => Ok(MsgStatus::Deleted),
            other => Err(DomainError::validation_error(
                "status",
                format!("unknown message status {other}"),
            )),
        }
    }
}

/// 消息数据
///
/// 以 `(ownerID, seq)` 为键写入缓存，缓存只是近期消息层，
/// 未命中时需要回源到持久化存储。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgData {
    #[serde(rename = "sendID")]
    pub send_id: String,
    #[serde(rename = "recvID", default)]
    pub recv_id: String,
    #[serde(rename = "groupID", default)]
    pub group_id: String,
    #[serde(rename = "clientMsgID")]
    pub client_msg_id: String,
    #[serde(rename = "serverMsgID", default)]
    pub server_msg_id: String,
    #[serde(rename = "senderPlatformID", default)]
    pub sender_platform_id: i32,
    #[serde(default)]
    pub session_type: i32,
    #[serde(default)]
    pub content_type: i32,
    #[serde(with = "base64_bytes", default)]
    pub content: Vec<u8>,
    #[serde(default)]
    pub seq: i64,
    #[serde(default)]
    pub send_time: i64,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub status: MsgStatus,
}

impl MsgData {
    pub fn is_deleted(&self) -> bool {
        self.status == MsgStatus::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_integer_on_the_wire() {
        let msg = MsgData {
            send_id: "u1".into(),
            client_msg_id: "c1".into(),
            status: MsgStatus::Deleted,
            ..Default::default()
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["status"], 4);
        assert_eq!(json["sendID"], "u1");
        assert_eq!(json["clientMsgID"], "c1");
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result: Result<MsgData, _> =
            serde_json::from_str(r#"{"sendID":"u1","clientMsgID":"c1","status":9}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_to_normal_status() {
        let msg: MsgData = serde_json::from_str(r#"{"sendID":"u1","clientMsgID":"c1"}"#).unwrap();
        assert_eq!(msg.status, MsgStatus::Normal);
        assert!(!msg.is_deleted());
    }
}
