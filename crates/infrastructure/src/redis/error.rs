//! Redis 错误映射

use application::StoreError;

/// 将 redis 客户端错误映射为存储错误
///
/// 网络类故障归为连接错误，服务端返回的命令错误归为命令错误。
pub(crate) fn map_redis_err(err: redis::RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        StoreError::connection(err.to_string())
    } else {
        StoreError::command(err.to_string())
    }
}
