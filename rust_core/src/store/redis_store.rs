use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::future::Future;
use std::time::Duration;

use super::{KvStore, StoreError, StoreResult};

/// Deletes KEYS[1] only if it holds ARGV[1].
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    op_timeout: Duration,
    compare_and_delete: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, op_timeout: Duration) -> StoreResult<Self> {
        let client = Client::open(redis_url)?;
        let connection = bounded("connect", op_timeout, ConnectionManager::new(client)).await?;
        Ok(Self {
            connection,
            op_timeout,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
        })
    }
}

async fn bounded<T, F>(op: &'static str, timeout: Duration, fut: F) -> StoreResult<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(StoreError::Timeout {
            op,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection.clone();
        bounded("get", self.op_timeout, conn.get::<_, Option<String>>(key)).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let cmd = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .to_owned();
        bounded("set", self.op_timeout, cmd.query_async::<_, ()>(&mut conn)).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let cmd = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .to_owned();
        // Nil reply when the key already exists
        let reply: Option<String> =
            bounded("set_nx", self.op_timeout, cmd.query_async(&mut conn)).await?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let mut invocation = self.compare_and_delete.key(key);
        invocation.arg(expected);
        let deleted: i64 = bounded(
            "compare_and_delete",
            self.op_timeout,
            invocation.invoke_async(&mut conn),
        )
        .await?;
        Ok(deleted > 0)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
