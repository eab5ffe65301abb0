//! 实时音视频信令实体
//!
//! 信令负载是一个带标签的和类型，只有邀请类变体需要进入邀请队列。

use serde::{Deserialize, Serialize};

/// 一次呼叫邀请
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    #[serde(rename = "inviterUserID")]
    pub inviter_user_id: String,
    #[serde(rename = "inviteeUserIDList", default)]
    pub invitee_user_id_list: Vec<String>,
    #[serde(rename = "groupID", default)]
    pub group_id: String,
    #[serde(rename = "roomID", default)]
    pub room_id: String,
    /// 响铃超时（秒），由客户端给出
    #[serde(default)]
    pub timeout: i32,
    #[serde(default)]
    pub media_type: String,
    #[serde(rename = "platformID", default)]
    pub platform_id: i32,
    #[serde(default)]
    pub session_type: i32,
    #[serde(default)]
    pub initiate_time: i64,
    #[serde(default)]
    pub custom_data: String,
}

macro_rules! signal_payload {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            #[serde(rename = "opUserID")]
            pub op_user_id: String,
            pub invitation: Invitation,
        }
    };
}

signal_payload!(
    /// 单聊邀请
    SignalInviteReq
);
signal_payload!(
    /// 群内邀请
    SignalInviteInGroupReq
);
signal_payload!(SignalCancelReq);
signal_payload!(SignalAcceptReq);
signal_payload!(SignalHungUpReq);
signal_payload!(SignalRejectReq);

/// 信令请求
///
/// 未识别的 `type` 统一落到 [`SignalReq::Unknown`]。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SignalReq {
    Invite(SignalInviteReq),
    InviteInGroup(SignalInviteInGroupReq),
    Cancel(SignalCancelReq),
    Accept(SignalAcceptReq),
    HungUp(SignalHungUpReq),
    Reject(SignalRejectReq),
    #[serde(other)]
    Unknown,
}

impl SignalReq {
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// 邀请类信令转换为统一的邀请信息，其余返回 `None`
    pub fn into_invite(self) -> Option<SignalInviteReq> {
        match self {
            SignalReq::Invite(req) => Some(req),
            SignalReq::InviteInGroup(req) => Some(SignalInviteReq {
                op_user_id: req.op_user_id,
                invitation: req.invitation,
            }),
            SignalReq::Cancel(_)
            | SignalReq::Accept(_)
            | SignalReq::HungUp(_)
            | SignalReq::Reject(_)
            | SignalReq::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation() -> Invitation {
        Invitation {
            inviter_user_id: "alice".into(),
            invitee_user_id_list: vec!["bob".into(), "carol".into()],
            room_id: "room-1".into(),
            timeout: 30,
            ..Default::default()
        }
    }

    #[test]
    fn test_invite_tagging() {
        let req = SignalReq::Invite(SignalInviteReq {
            op_user_id: "alice".into(),
            invitation: invitation(),
        });
        let bytes = req.to_vec().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["type"], "invite");
        assert_eq!(json["opUserID"], "alice");
        assert_eq!(SignalReq::from_slice(&bytes).unwrap(), req);
    }

    #[test]
    fn test_unknown_variant() {
        let req = SignalReq::from_slice(br#"{"type":"getRoomByGroupID","opUserID":"x"}"#).unwrap();
        assert_eq!(req, SignalReq::Unknown);
        assert!(req.into_invite().is_none());
    }

    #[test]
    fn test_invite_in_group_converts_to_invite() {
        let req = SignalReq::InviteInGroup(SignalInviteInGroupReq {
            op_user_id: "alice".into(),
            invitation: invitation(),
        });
        let invite = req.into_invite().unwrap();
        assert_eq!(invite.op_user_id, "alice");
        assert_eq!(invite.invitation.invitee_user_id_list.len(), 2);
    }

    #[test]
    fn test_non_invite_variants_have_no_invite() {
        let cancel = SignalReq::Cancel(SignalCancelReq::default());
        assert!(cancel.into_invite().is_none());
        let hung_up = SignalReq::from_slice(br#"{"type":"hungUp","opUserID":"a","invitation":{"inviterUserID":"a"}}"#).unwrap();
        assert!(matches!(hung_up, SignalReq::HungUp(_)));
    }
}
