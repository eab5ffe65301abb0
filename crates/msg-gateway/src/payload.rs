//! 默认处理器使用的请求/响应负载

use domain::MsgData;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNewestSeqResp {
    pub max_seq: i64,
    pub min_seq: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullMsgBySeqListReq {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(default)]
    pub seq_list: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullMsgBySeqListResp {
    pub list: Vec<MsgData>,
    /// 缓存未命中，需要回源拉取的序列号
    #[serde(default)]
    pub failed_seq_list: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendMsgResp {
    #[serde(rename = "serverMsgID")]
    pub server_msg_id: String,
    #[serde(rename = "clientMsgID")]
    pub client_msg_id: String,
    #[serde(rename = "sendTime")]
    pub send_time: i64,
    pub seq: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalSendResp {
    #[serde(rename = "clientMsgID")]
    pub client_msg_id: String,
    /// 是否需要离线推送给接收方
    pub sendable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBackgroundStatusReq {
    pub is_background: bool,
}
