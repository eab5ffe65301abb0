//! 基于缓存组件的默认业务处理器
//!
//! 让网关在没有下游业务服务时也能独立运行：序列号、消息缓存与信令队列
//! 都直接落到同一个 KV 存储上。

use std::sync::Arc;

use application::{CacheError, MessageCache, SequenceAllocator, SignalInviteQueue};
use async_trait::async_trait;
use chrono::Utc;
use domain::{MsgData, MsgStatus, Req, SessionType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::handler::{HandlerError, MessageHandler, RequestContext};
use crate::payload::{
    GetNewestSeqResp, PullMsgBySeqListReq, PullMsgBySeqListResp, SendMsgResp,
    SetBackgroundStatusReq, SignalSendResp,
};

pub struct StoreBackedHandler {
    sequences: Arc<SequenceAllocator>,
    messages: Arc<MessageCache>,
    signals: Arc<SignalInviteQueue>,
}

impl StoreBackedHandler {
    pub fn new(
        sequences: Arc<SequenceAllocator>,
        messages: Arc<MessageCache>,
        signals: Arc<SignalInviteQueue>,
    ) -> Self {
        Self {
            sequences,
            messages,
            signals,
        }
    }

    /// 未初始化的最小水位视为 0
    async fn user_min_seq(&self, user_id: &str) -> Result<i64, HandlerError> {
        match self.sequences.get_user_min_seq(user_id).await {
            Ok(seq) => Ok(seq),
            Err(err) if err.is_not_found() => Ok(0),
            Err(err) => Err(map_cache_err(err)),
        }
    }

    async fn user_max_seq(&self, user_id: &str) -> Result<i64, HandlerError> {
        match self.sequences.get_user_max_seq(user_id).await {
            Ok(seq) => Ok(seq),
            Err(err) if err.is_not_found() => Ok(0),
            Err(err) => Err(map_cache_err(err)),
        }
    }

    /// 为 `owner_id` 分配序列号并写入缓存
    async fn store_for_owner(&self, owner_id: &str, msg: &MsgData, group: bool) -> Result<i64, HandlerError> {
        let allocated = if group {
            self.sequences.incr_group_max_seq(owner_id).await
        } else {
            self.sequences.incr_user_seq(owner_id).await
        };
        let seq = allocated.map_err(map_cache_err)?;

        let mut stored = msg.clone();
        stored.seq = seq;
        let failed = self
            .messages
            .set_messages(owner_id, std::slice::from_ref(&stored))
            .await
            .map_err(map_cache_err)?;
        if failed > 0 {
            return Err(HandlerError::internal("failed to cache message"));
        }
        Ok(seq)
    }
}

fn map_cache_err(err: CacheError) -> HandlerError {
    match err {
        CacheError::Serialization(_) | CacheError::InvalidSessionType(_) => {
            HandlerError::args(err.to_string())
        }
        other => HandlerError::internal(other.to_string()),
    }
}

fn parse<T: DeserializeOwned>(req: &Req) -> Result<T, HandlerError> {
    serde_json::from_slice(&req.data).map_err(|err| HandlerError::args(err.to_string()))
}

fn to_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, HandlerError> {
    serde_json::to_vec(value).map_err(|err| HandlerError::internal(err.to_string()))
}

fn parse_msg(ctx: &RequestContext, req: &Req) -> Result<MsgData, HandlerError> {
    let msg: MsgData = parse(req)?;
    if msg.send_id != ctx.user_id {
        return Err(HandlerError::new(
            HandlerError::NO_PERMISSION,
            "sendID does not match the connection",
        ));
    }
    if msg.client_msg_id.is_empty() {
        return Err(HandlerError::args("clientMsgID is required"));
    }
    Ok(msg)
}

#[async_trait]
impl MessageHandler for StoreBackedHandler {
    async fn get_seq(&self, ctx: &RequestContext, _req: &Req) -> Result<Vec<u8>, HandlerError> {
        let resp = GetNewestSeqResp {
            max_seq: self.user_max_seq(&ctx.user_id).await?,
            min_seq: self.user_min_seq(&ctx.user_id).await?,
        };
        to_payload(&resp)
    }

    async fn send_msg(&self, ctx: &RequestContext, req: &Req) -> Result<Vec<u8>, HandlerError> {
        let mut msg = parse_msg(ctx, req)?;
        let session_type = SessionType::try_from(msg.session_type)
            .map_err(|err| HandlerError::args(err.to_string()))?;

        let now = Utc::now().timestamp_millis();
        msg.server_msg_id = Uuid::new_v4().to_string();
        msg.sender_platform_id = ctx.platform_id;
        msg.create_time = now;
        if msg.send_time == 0 {
            msg.send_time = now;
        }
        msg.status = MsgStatus::SendSuccess;

        let seq = match session_type {
            SessionType::Single | SessionType::Notification => {
                if msg.recv_id.is_empty() {
                    return Err(HandlerError::args("recvID is required"));
                }
                let seq = self.store_for_owner(&msg.recv_id, &msg, false).await?;
                if msg.recv_id != msg.send_id {
                    self.store_for_owner(&msg.send_id, &msg, false).await?;
                }
                seq
            }
            SessionType::Group | SessionType::SuperGroup => {
                if msg.group_id.is_empty() {
                    return Err(HandlerError::args("groupID is required"));
                }
                self.store_for_owner(&msg.group_id, &msg, true).await?
            }
        };

        if let Err(err) = self
            .messages
            .set_send_msg_status(&msg.client_msg_id, i32::from(MsgStatus::SendSuccess))
            .await
        {
            tracing::warn!(
                operation_id = %ctx.operation_id,
                client_msg_id = %msg.client_msg_id,
                error = %err,
                "记录发送状态失败"
            );
        }
        tracing::debug!(
            operation_id = %ctx.operation_id,
            client_msg_id = %msg.client_msg_id,
            seq,
            "消息已写入缓存"
        );

        to_payload(&SendMsgResp {
            server_msg_id: msg.server_msg_id,
            client_msg_id: msg.client_msg_id,
            send_time: msg.send_time,
            seq,
        })
    }

    async fn send_signal_msg(&self, ctx: &RequestContext, req: &Req) -> Result<Vec<u8>, HandlerError> {
        let msg = parse_msg(ctx, req)?;
        let sendable = self
            .signals
            .handle_signal_invite(&msg, &msg.recv_id)
            .await
            .map_err(map_cache_err)?;
        to_payload(&SignalSendResp {
            client_msg_id: msg.client_msg_id,
            sendable,
        })
    }

    async fn pull_msg_by_seq_list(
        &self,
        ctx: &RequestContext,
        req: &Req,
    ) -> Result<Vec<u8>, HandlerError> {
        let pull: PullMsgBySeqListReq = parse(req)?;
        if pull.user_id != ctx.user_id {
            return Err(HandlerError::new(
                HandlerError::NO_PERMISSION,
                "cannot pull messages of another user",
            ));
        }
        if pull.seq_list.is_empty() {
            return Err(HandlerError::args("seqList is empty"));
        }

        let cached = self
            .messages
            .get_messages_by_seq(&pull.user_id, &pull.seq_list)
            .await;
        to_payload(&PullMsgBySeqListResp {
            list: cached.messages,
            failed_seq_list: cached.failed_seqs,
        })
    }

    async fn user_logout(&self, ctx: &RequestContext, _req: &Req) -> Result<Vec<u8>, HandlerError> {
        self.signals
            .drain_signal_invitations(&ctx.user_id)
            .await
            .map_err(map_cache_err)?;
        tracing::info!(user_id = %ctx.user_id, platform_id = ctx.platform_id, "用户登出");
        Ok(Vec::new())
    }

    async fn set_background_status(
        &self,
        ctx: &RequestContext,
        req: &Req,
    ) -> Result<(Vec<u8>, bool), HandlerError> {
        let status: SetBackgroundStatusReq = parse(req)?;
        tracing::debug!(
            user_id = %ctx.user_id,
            platform_id = ctx.platform_id,
            is_background = status.is_background,
            "更新前后台状态"
        );
        Ok((Vec::new(), status.is_background))
    }
}
