use std::sync::Arc;
use std::time::Duration;

use domain::{MsgData, SignalInviteReq, SignalReq};

use crate::error::{CacheError, CacheResult};
use crate::store::{Batch, KvStore};

const SIGNAL_CACHE: &str = "SIGNAL_CACHE:";
const SIGNAL_LIST_CACHE: &str = "SIGNAL_LIST_CACHE:";

/// 实时音视频邀请队列
///
/// 每个被邀请人有一个待处理的 clientMsgID 列表，邀请内容单独按
/// clientMsgID 保存；两者使用相同的响铃超时，作为同一个邀请的两半一起过期。
pub struct SignalInviteQueue {
    store: Arc<dyn KvStore>,
    signal_timeout: Duration,
}

impl SignalInviteQueue {
    pub fn new(store: Arc<dyn KvStore>, signal_timeout: Duration) -> Self {
        Self {
            store,
            signal_timeout,
        }
    }

    fn invitation_key(&self, client_msg_id: &str) -> String {
        format!("{SIGNAL_CACHE}{client_msg_id}")
    }

    fn pending_list_key(&self, user_id: &str) -> String {
        format!("{SIGNAL_LIST_CACHE}{user_id}")
    }

    /// 处理一条信令消息，返回是否需要推送给 `push_to_user_id`
    ///
    /// 只有邀请和群内邀请会入队；群内邀请仅当推送目标在被邀请人列表中时才入队。
    /// 挂断、取消、拒绝、接受以及未识别的信令不会修改队列。
    pub async fn handle_signal_invite(
        &self,
        msg: &MsgData,
        push_to_user_id: &str,
    ) -> CacheResult<bool> {
        let invitees = match SignalReq::from_slice(&msg.content)? {
            SignalReq::Invite(req) => req.invitation.invitee_user_id_list,
            SignalReq::InviteInGroup(req) => {
                let invitees = req.invitation.invitee_user_id_list;
                if !invitees.iter().any(|id| id == push_to_user_id) {
                    return Ok(false);
                }
                invitees
            }
            SignalReq::HungUp(_)
            | SignalReq::Cancel(_)
            | SignalReq::Reject(_)
            | SignalReq::Accept(_) => {
                tracing::debug!(client_msg_id = %msg.client_msg_id, "信令无需离线推送");
                return Ok(false);
            }
            SignalReq::Unknown => return Ok(false),
        };

        let mut batch = Batch::new();
        for invitee in &invitees {
            let list_key = self.pending_list_key(invitee);
            batch
                .lpush(list_key.as_str(), msg.client_msg_id.as_str())
                .expire(list_key, self.signal_timeout);
        }
        batch.set(
            self.invitation_key(&msg.client_msg_id),
            msg.content.clone(),
            Some(self.signal_timeout),
        );
        for reply in self.store.execute(batch).await? {
            reply?;
        }

        tracing::info!(
            client_msg_id = %msg.client_msg_id,
            invitees = invitees.len(),
            "信令邀请已入队"
        );
        Ok(true)
    }

    /// 只读查询：根据 clientMsgID 取邀请内容与发起人
    pub async fn get_signal_invitation(&self, client_msg_id: &str) -> CacheResult<SignalInviteReq> {
        let key = self.invitation_key(client_msg_id);
        let raw = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| CacheError::not_found(key.clone()))?;
        SignalReq::from_slice(&raw)?
            .into_invite()
            .ok_or_else(|| CacheError::invalid_value(key, "not an invitation"))
    }

    /// 弹出最新的一个邀请，保留其余待处理邀请
    pub async fn pop_signal_invitation(&self, user_id: &str) -> CacheResult<Option<SignalInviteReq>> {
        let Some(client_msg_id) = self.store.lpop(&self.pending_list_key(user_id)).await? else {
            return Ok(None);
        };
        self.get_signal_invitation(&client_msg_id).await.map(Some)
    }

    /// 取出最新的一个邀请，并清空该用户剩余的全部待处理邀请
    pub async fn take_available_signal_invitation(
        &self,
        user_id: &str,
    ) -> CacheResult<Option<SignalInviteReq>> {
        let Some(invitation) = self.pop_signal_invitation(user_id).await? else {
            return Ok(None);
        };
        self.drain_signal_invitations(user_id).await?;
        Ok(Some(invitation))
    }

    /// 丢弃该用户的全部待处理邀请
    pub async fn drain_signal_invitations(&self, user_id: &str) -> CacheResult<()> {
        self.store.del(&[self.pending_list_key(user_id)]).await?;
        Ok(())
    }
}
